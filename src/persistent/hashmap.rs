//! Persistent (immutable) hash map based on CHAMP, with a transient view.
//!
//! This module provides [`PersistentHashMap`], an immutable hash map that
//! uses structural sharing, and [`TransientHashMap`], a temporarily mutable
//! view over the same trie that batches edits in place.
//!
//! # Overview
//!
//! The map is a Compressed Hash-Array Mapped Prefix-tree (CHAMP): a 32-way
//! trie where each level consumes 5 bits of the key hash and each node
//! keeps direct entries and sub-nodes in two separate bitmaps.
//!
//! - O(log32 N) get (effectively O(1) for practical sizes)
//! - O(log32 N) insert
//! - O(log32 N) remove
//! - O(1) len and `is_empty`
//! - O(1) conversion between persistent and transient form
//!
//! # Examples
//!
//! ```rust
//! use trie_collections::persistent::PersistentHashMap;
//!
//! let map = PersistentHashMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2)
//!     .insert("three".to_string(), 3);
//!
//! assert_eq!(map.get("one"), Some(&1));
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));       // Original unchanged
//! assert_eq!(updated.get("one"), Some(&100)); // New version
//! ```
//!
//! # Transient-Persistent Pattern
//!
//! ```rust
//! use trie_collections::persistent::PersistentHashMap;
//!
//! let snapshot: PersistentHashMap<i32, i32> = (0..100).map(|i| (i, i)).collect();
//!
//! let mut transient = snapshot.to_transient();
//! for i in 0..100 {
//!     transient.insert(i, i * 2);
//! }
//! let doubled = transient.to_persistent();
//!
//! assert_eq!(snapshot.get(&10), Some(&10)); // Snapshot untouched
//! assert_eq!(doubled.get(&10), Some(&20));
//! ```
//!
//! # Internal Structure
//!
//! - 32-way branching (5 bits per level), 13 levels for a 64-bit hash
//! - Collision buckets once every hash bit has been consumed
//! - Sub-nodes reduced to one entry are inlined on removal
//! - Structural sharing via `Arc` (feature `arc`) or `Rc`

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::iter::{FromIterator, FusedIterator};
use std::marker::PhantomData;
use std::ops::Index;
use std::rc::Rc;

use super::ReferenceCounter;
use super::change_event::ChangeEvent;
use super::error::CursorError;
use super::hash::{combine_unordered, compute_hash};
use super::iter::{PersistentHashMapIntoIterator, PersistentHashMapIterator, Walker};
use super::mutator::MutatorToken;
use super::node::Node;

// =============================================================================
// PersistentHashMap Definition
// =============================================================================

/// A persistent (immutable) hash map based on CHAMP.
///
/// Every "modifying" operation returns a new map and leaves the receiver
/// untouched. Unmodified subtrees are shared between versions.
///
/// # Time Complexity
///
/// | Operation      | Complexity  |
/// |----------------|-------------|
/// | `new`          | O(1)        |
/// | `get`          | O(log32 N)  |
/// | `insert`       | O(log32 N)  |
/// | `remove`       | O(log32 N)  |
/// | `len`          | O(1)        |
/// | `transient`    | O(1)        |
/// | `to_transient` | O(1)        |
///
/// # Examples
///
/// ```rust
/// use trie_collections::persistent::PersistentHashMap;
///
/// let map = PersistentHashMap::singleton("key".to_string(), 42);
/// assert_eq!(map.get("key"), Some(&42));
/// ```
pub struct PersistentHashMap<K, V> {
    /// Root node of the trie
    root: ReferenceCounter<Node<K, V>>,
    /// Number of entries
    length: usize,
}

impl<K, V> PersistentHashMap<K, V> {
    /// Creates a new empty map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map: PersistentHashMap<String, i32> = PersistentHashMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: ReferenceCounter::new(Node::empty()),
            length: 0,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// assert_eq!(map.len(), 2);
    /// ```
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns an iterator over key-value pairs.
    ///
    /// Entries come in trie order, which depends on the key hashes only.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// let mut pairs: Vec<_> = map.iter().collect();
    /// pairs.sort();
    /// assert_eq!(pairs, vec![(&"a".to_string(), &1), (&"b".to_string(), &2)]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentHashMapIterator<'_, K, V> {
        PersistentHashMapIterator::new(&self.root, self.length)
    }

    /// Returns an iterator over keys.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> + FusedIterator {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// let sum: i32 = map.values().sum();
    /// assert_eq!(sum, 3);
    /// ```
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> + FusedIterator {
        self.iter().map(|(_, value)| value)
    }

    /// Returns `true` if both maps share the same root node.
    ///
    /// Maps that share a root are equal; the converse does not hold.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::singleton(1, "one");
    /// let copy = map.clone();
    /// assert!(map.ptr_eq(&copy));
    /// assert!(!map.ptr_eq(&map.insert(2, "two")));
    /// ```
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        ReferenceCounter::ptr_eq(&self.root, &other.root)
    }

    /// Returns `true` if `transient` still holds this map's root node, i.e.
    /// neither side has been edited since they were derived from each other.
    #[inline]
    #[must_use]
    pub fn shares_root_with(&self, transient: &TransientHashMap<K, V>) -> bool {
        ReferenceCounter::ptr_eq(&self.root, &transient.root)
    }

    /// Converts this map into a transient map for batch updates.
    ///
    /// The transient starts with no mutator token, so its first edit of each
    /// node copies it; `self` is consumed but other clones are unaffected.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn transient(self) -> TransientHashMap<K, V> {
        TransientHashMap::from_parts(self.root, self.length)
    }

    /// Creates a transient map sharing this map's root.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::singleton(1, "one");
    /// let mut transient = map.to_transient();
    /// assert!(map.shares_root_with(&transient));
    ///
    /// transient.insert(2, "two");
    /// assert!(!map.shares_root_with(&transient));
    /// assert_eq!(map.len(), 1);
    /// ```
    #[must_use]
    pub fn to_transient(&self) -> TransientHashMap<K, V> {
        TransientHashMap::from_parts(ReferenceCounter::clone(&self.root), self.length)
    }
}

impl<K: Hash + Eq, V> PersistentHashMap<K, V> {
    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash` and
    /// `Eq` on the borrowed form must match those for the key type.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert("hello".to_string(), 42);
    ///
    /// // Can use &str to look up String keys
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, value)| value)
    }

    /// Returns the stored key and value corresponding to the key.
    #[must_use]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.root
            .find(key, compute_hash(key), 0)
            .map(|entry| (&entry.key, &entry.value))
    }

    /// Returns `true` if the map contains the key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).is_some()
    }

    /// Returns `true` if the map maps `key` to a value equal to `value`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::singleton("a", 1);
    /// assert!(map.contains_entry("a", &1));
    /// assert!(!map.contains_entry("a", &2));
    /// assert!(!map.contains_entry("b", &1));
    /// ```
    #[must_use]
    pub fn contains_entry<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        self.get(key) == Some(value)
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PersistentHashMap<K, V> {
    /// Creates a map containing a single key-value pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::singleton("key".to_string(), 42);
    /// assert_eq!(map.len(), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::new().insert(key, value)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// Returns a new map with the key-value pair. If the key already exists
    /// with an equal value, the returned map shares this map's root.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map1 = PersistentHashMap::new().insert("key".to_string(), 1);
    /// let map2 = map1.insert("key".to_string(), 2);
    ///
    /// assert_eq!(map1.get("key"), Some(&1)); // Original unchanged
    /// assert_eq!(map2.get("key"), Some(&2)); // New version
    /// assert!(map2.ptr_eq(&map2.insert("key".to_string(), 2)));
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let hash = compute_hash(&key);
        let mut root = ReferenceCounter::clone(&self.root);
        let mut event = ChangeEvent::default();
        Node::update(&mut root, None, key, value, hash, 0, &mut event);
        self.with_root(root, &event)
    }

    /// Removes a key from the map.
    ///
    /// Returns a new map without the key. If the key doesn't exist, the
    /// returned map shares this map's root.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// let removed = map.remove("a");
    ///
    /// assert_eq!(map.len(), 2);     // Original unchanged
    /// assert_eq!(removed.len(), 1); // New version
    /// assert_eq!(removed.get("a"), None);
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut root = ReferenceCounter::clone(&self.root);
        let mut event = ChangeEvent::default();
        Node::remove(&mut root, None, key, compute_hash(key), 0, &mut event);
        self.with_root(root, &event)
    }

    /// Removes `key` only if it is mapped to a value equal to `value`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::singleton("a", 1);
    /// assert_eq!(map.remove_entry("a", &2).len(), 1);
    /// assert!(map.remove_entry("a", &1).is_empty());
    /// ```
    #[must_use]
    pub fn remove_entry<Q>(&self, key: &Q, value: &V) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.contains_entry(key, value) {
            self.remove(key)
        } else {
            self.clone()
        }
    }

    /// Returns an empty map.
    #[must_use]
    pub fn clear(&self) -> Self {
        Self::new()
    }

    fn with_root(&self, root: ReferenceCounter<Node<K, V>>, event: &ChangeEvent<V>) -> Self {
        let length = match event {
            ChangeEvent::Inserted => self.length + 1,
            ChangeEvent::Removed(_) => self.length - 1,
            ChangeEvent::Unchanged | ChangeEvent::Replaced(_) => self.length,
        };
        Self { root, length }
    }
}

// =============================================================================
// TransientHashMap Definition
// =============================================================================

/// A transient (temporarily mutable) hash map for efficient batch updates.
///
/// A transient edits in place every node it exclusively owns and copies
/// every node it shares with a persistent map or another transient.
/// Ownership is tracked with a [`MutatorToken`] that is created lazily on
/// the first modification and cleared by [`to_persistent`](Self::to_persistent),
/// so nodes handed out in a snapshot are never edited again.
///
/// # Design
///
/// - `PhantomData<Rc<()>>` ensures `!Send` and `!Sync`
/// - `Clone` is intentionally not implemented; use [`fork`](Self::fork)
/// - Every structural modification bumps a modification count that
///   [`TransientHashMapCursor`] uses to fail fast
///
/// # Examples
///
/// ```rust
/// use trie_collections::persistent::TransientHashMap;
///
/// let mut transient = TransientHashMap::new();
/// transient.insert("a", 1);
/// transient.insert("b", 2);
/// assert_eq!(transient.remove("a"), Some(1));
///
/// let persistent = transient.persistent();
/// assert_eq!(persistent.len(), 1);
/// assert_eq!(persistent.get("b"), Some(&2));
/// ```
pub struct TransientHashMap<K, V> {
    root: ReferenceCounter<Node<K, V>>,
    length: usize,
    mutator: Option<MutatorToken>,
    modification_count: u64,
    /// Marker to ensure `!Send` and `!Sync`.
    _marker: PhantomData<Rc<()>>,
}

// Static assertions to verify TransientHashMap is not Send/Sync
static_assertions::assert_not_impl_any!(TransientHashMap<i32, i32>: Send, Sync);
static_assertions::assert_not_impl_any!(TransientHashMap<String, String>: Send, Sync);

// Arc feature verification: even with Arc, TransientHashMap remains !Send/!Sync
#[cfg(feature = "arc")]
mod arc_send_sync_verification_hashmap {
    use super::{PersistentHashMap, TransientHashMap, TransientHashMapCursor};
    use std::sync::Arc;

    static_assertions::assert_not_impl_any!(TransientHashMap<Arc<i32>, Arc<i32>>: Send, Sync);
    static_assertions::assert_not_impl_any!(TransientHashMapCursor<Arc<i32>, Arc<i32>>: Send, Sync);
    static_assertions::assert_impl_all!(PersistentHashMap<String, i32>: Send, Sync);
}

impl<K, V> TransientHashMap<K, V> {
    const fn from_parts(root: ReferenceCounter<Node<K, V>>, length: usize) -> Self {
        Self {
            root,
            length,
            mutator: None,
            modification_count: 0,
            _marker: PhantomData,
        }
    }

    /// Creates a new empty transient map.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(ReferenceCounter::new(Node::empty()), 0)
    }

    /// Returns the number of entries in the map.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of structural modifications made through this transient.
    ///
    /// Replacing a value counts; storing an equal value or removing an
    /// absent key does not.
    #[inline]
    #[must_use]
    pub const fn modification_count(&self) -> u64 {
        self.modification_count
    }

    /// Returns an iterator over key-value pairs.
    #[must_use]
    pub fn iter(&self) -> PersistentHashMapIterator<'_, K, V> {
        PersistentHashMapIterator::new(&self.root, self.length)
    }

    /// Returns an iterator over keys.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> + FusedIterator {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> + FusedIterator {
        self.iter().map(|(_, value)| value)
    }

    /// Returns `true` if `persistent` holds this transient's root node.
    #[inline]
    #[must_use]
    pub fn shares_root_with(&self, persistent: &PersistentHashMap<K, V>) -> bool {
        persistent.shares_root_with(self)
    }

    /// Returns a fail-fast cursor positioned before the first entry.
    ///
    /// The cursor does not borrow the map; every cursor operation takes the
    /// map as an argument and fails once the map was modified by anything
    /// but the cursor itself.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::TransientHashMap;
    ///
    /// let mut map: TransientHashMap<i32, i32> = (0..10).map(|i| (i, i)).collect();
    /// let mut cursor = map.cursor();
    /// while cursor.has_next(&map)? {
    ///     let (key, _) = cursor.next_entry(&map)?;
    ///     if key % 2 == 0 {
    ///         cursor.remove(&mut map)?;
    ///     }
    /// }
    /// assert_eq!(map.len(), 5);
    /// # Ok::<(), trie_collections::persistent::CursorError>(())
    /// ```
    #[must_use]
    pub fn cursor(&self) -> TransientHashMapCursor<K, V> {
        TransientHashMapCursor {
            walker: Walker::new(&self.root),
            current: None,
            expected_modification_count: self.modification_count,
            _marker: PhantomData,
        }
    }

    /// Creates a persistent map sharing this transient's root.
    ///
    /// Clears the mutator token, so subsequent edits through this transient
    /// copy every node before touching it and the returned map can never
    /// observe them.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::TransientHashMap;
    ///
    /// let mut transient = TransientHashMap::new();
    /// transient.insert(1, "one");
    /// let frozen = transient.to_persistent();
    ///
    /// transient.insert(2, "two");
    /// assert_eq!(frozen.len(), 1);
    /// assert_eq!(transient.len(), 2);
    /// ```
    #[must_use]
    pub fn to_persistent(&mut self) -> PersistentHashMap<K, V> {
        self.mutator = None;
        PersistentHashMap {
            root: ReferenceCounter::clone(&self.root),
            length: self.length,
        }
    }

    /// Converts this transient into a persistent map.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn persistent(self) -> PersistentHashMap<K, V> {
        PersistentHashMap {
            root: self.root,
            length: self.length,
        }
    }

    /// Splits off a second transient over the same content.
    ///
    /// Both transients lose ownership of every node, so each copies on its
    /// next edit and neither observes the other's changes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::TransientHashMap;
    ///
    /// let mut left: TransientHashMap<i32, i32> = [(1, 1)].into_iter().collect();
    /// let mut right = left.fork();
    /// left.insert(2, 2);
    /// right.remove(&1);
    /// assert_eq!(left.len(), 2);
    /// assert_eq!(right.len(), 0);
    /// ```
    #[must_use]
    pub fn fork(&mut self) -> Self {
        self.mutator = None;
        Self {
            root: ReferenceCounter::clone(&self.root),
            length: self.length,
            mutator: None,
            modification_count: self.modification_count,
            _marker: PhantomData,
        }
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        if self.length > 0 {
            self.root = ReferenceCounter::new(Node::empty());
            self.length = 0;
            self.modification_count += 1;
        }
    }

    fn mutator(&mut self) -> MutatorToken {
        *self.mutator.get_or_insert_with(MutatorToken::new)
    }

    fn record(&mut self, event: &ChangeEvent<V>) {
        match event {
            ChangeEvent::Unchanged => return,
            ChangeEvent::Inserted => self.length += 1,
            ChangeEvent::Removed(_) => self.length -= 1,
            ChangeEvent::Replaced(_) => {}
        }
        self.modification_count += 1;
    }
}

impl<K: Hash + Eq, V> TransientHashMap<K, V> {
    /// Returns a reference to the value corresponding to the key.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, value)| value)
    }

    /// Returns the stored key and value corresponding to the key.
    #[must_use]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.root
            .find(key, compute_hash(key), 0)
            .map(|entry| (&entry.key, &entry.value))
    }

    /// Returns `true` if the map contains the key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).is_some()
    }

    /// Returns `true` if the map maps `key` to a value equal to `value`.
    #[must_use]
    pub fn contains_entry<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        self.get(key) == Some(value)
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> TransientHashMap<K, V> {
    /// Inserts a key-value pair, returning the previously stored value.
    ///
    /// Storing a value equal to the current one modifies nothing but still
    /// reports the key as present.
    ///
    /// # Complexity
    ///
    /// O(log32 N) amortized
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::TransientHashMap;
    ///
    /// let mut transient = TransientHashMap::new();
    /// assert_eq!(transient.insert("a", 1), None);
    /// assert_eq!(transient.insert("a", 2), Some(1));
    /// assert_eq!(transient.insert("a", 2), Some(2));
    /// assert_eq!(transient.modification_count(), 2);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let (event, unchanged) = self.update_hashed(key, value);
        unchanged.or_else(|| event.into_old_value())
    }

    /// Inserts a key-value pair and reports what happened.
    pub fn insert_with_change(&mut self, key: K, value: V) -> ChangeEvent<V> {
        self.update_hashed(key, value).0
    }

    /// Removes a key, returning its value if it was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::TransientHashMap;
    ///
    /// let mut transient = TransientHashMap::new();
    /// transient.insert("a".to_string(), 1);
    /// assert_eq!(transient.remove("a"), Some(1));
    /// assert_eq!(transient.remove("a"), None);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_with_change(key).into_old_value()
    }

    /// Removes a key and reports what happened.
    pub fn remove_with_change<Q>(&mut self, key: &Q) -> ChangeEvent<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_hashed(key, compute_hash(key))
    }

    /// Removes `key` only if it is mapped to a value equal to `value`.
    /// Returns `true` if the entry was removed.
    pub fn remove_entry<Q>(&mut self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.contains_entry(key, value) && self.remove_with_change(key).is_modified()
    }

    /// Retains only the entries for which `predicate` returns `true`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::TransientHashMap;
    ///
    /// let mut transient: TransientHashMap<i32, i32> = (0..10).map(|i| (i, i)).collect();
    /// transient.retain(|_, value| value % 3 == 0);
    /// assert_eq!(transient.len(), 4);
    /// ```
    pub fn retain<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let rejected: Vec<K> = self
            .iter()
            .filter(|(key, value)| !predicate(key, value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &rejected {
            self.remove_with_change(key);
        }
    }

    /// Stores the pair. The second half of the result is `value` handed back
    /// when the key already maps to an equal value.
    fn update_hashed(&mut self, key: K, value: V) -> (ChangeEvent<V>, Option<V>) {
        let hash = compute_hash(&key);
        let mutator = Some(self.mutator());
        let mut event = ChangeEvent::default();
        let unchanged = Node::update(&mut self.root, mutator, key, value, hash, 0, &mut event);
        self.record(&event);
        (event, unchanged)
    }

    fn remove_hashed<Q>(&mut self, key: &Q, hash: u64) -> ChangeEvent<V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mutator = Some(self.mutator());
        let mut event = ChangeEvent::default();
        Node::remove(&mut self.root, mutator, key, hash, 0, &mut event);
        self.record(&event);
        event
    }
}

impl<K, V> Default for TransientHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> Extend<(K, V)> for TransientHashMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert_with_change(key, value);
        }
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> FromIterator<(K, V)> for TransientHashMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut transient = Self::new();
        transient.extend(iter);
        transient
    }
}

impl<'a, K, V> IntoIterator for &'a TransientHashMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentHashMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Hash + Eq, V: PartialEq> PartialEq for TransientHashMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.length != other.length {
            return false;
        }
        if ReferenceCounter::ptr_eq(&self.root, &other.root) {
            return true;
        }
        self.iter()
            .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Hash + Eq, V: Eq> Eq for TransientHashMap<K, V> {}

impl<K: Hash + Eq, V: Hash> Hash for TransientHashMap<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.length);
        state.write_u64(combine_unordered(self.iter()));
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for TransientHashMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// TransientHashMapCursor
// =============================================================================

/// A fail-fast cursor over a [`TransientHashMap`] that can remove entries.
///
/// The cursor holds its own back-link stack into the trie plus the
/// modification count it expects the map to have. Every operation taking
/// the map first compares the two and fails with
/// [`CursorError::ConcurrentModification`] on a mismatch. Removing through
/// the cursor refreshes the expected count and rebuilds the stack by
/// descending afresh to the entry that follows the removed one.
///
/// A cursor must only be used with the map that created it.
pub struct TransientHashMapCursor<K, V> {
    walker: Walker<K, V>,
    /// Node holding the current entry and the entry's index in it.
    current: Option<(ReferenceCounter<Node<K, V>>, usize)>,
    expected_modification_count: u64,
    _marker: PhantomData<Rc<()>>,
}

impl<K, V> TransientHashMapCursor<K, V> {
    const fn check(&self, map: &TransientHashMap<K, V>) -> Result<(), CursorError> {
        if self.expected_modification_count == map.modification_count {
            Ok(())
        } else {
            Err(CursorError::ConcurrentModification {
                expected: self.expected_modification_count,
                actual: map.modification_count,
            })
        }
    }

    /// Returns `true` if another entry follows the current one.
    ///
    /// # Errors
    ///
    /// [`CursorError::ConcurrentModification`] if `map` was modified behind
    /// the cursor's back.
    pub fn has_next(&self, map: &TransientHashMap<K, V>) -> Result<bool, CursorError> {
        self.check(map)?;
        Ok(self.walker.has_next())
    }

    /// Moves to the next entry, making it current.
    ///
    /// # Errors
    ///
    /// [`CursorError::ConcurrentModification`] if `map` was modified behind
    /// the cursor's back, [`CursorError::Exhausted`] if no entry is left.
    pub fn advance(&mut self, map: &TransientHashMap<K, V>) -> Result<(), CursorError> {
        self.check(map)?;
        self.current = self.walker.next_location();
        if self.current.is_some() {
            Ok(())
        } else {
            Err(CursorError::Exhausted)
        }
    }

    fn current_entry(&self) -> Option<(&K, &V)> {
        self.current.as_ref().map(|(node, index)| {
            let entry = &node.entries()[*index];
            (&entry.key, &entry.value)
        })
    }

    /// Returns the entry the cursor was last advanced to.
    ///
    /// # Errors
    ///
    /// [`CursorError::ConcurrentModification`] if `map` was modified behind
    /// the cursor's back, [`CursorError::NoCurrentEntry`] if the cursor was
    /// never advanced, ran past the end, or its current entry was removed.
    pub fn current(&self, map: &TransientHashMap<K, V>) -> Result<(&K, &V), CursorError> {
        self.check(map)?;
        self.current_entry().ok_or(CursorError::NoCurrentEntry)
    }

    /// Advances and returns a copy of the new current entry.
    ///
    /// # Errors
    ///
    /// Same as [`advance`](Self::advance).
    pub fn next_entry(&mut self, map: &TransientHashMap<K, V>) -> Result<(K, V), CursorError>
    where
        K: Clone,
        V: Clone,
    {
        self.advance(map)?;
        self.current_entry()
            .map(|(key, value)| (key.clone(), value.clone()))
            .ok_or(CursorError::Exhausted)
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> TransientHashMapCursor<K, V> {
    /// Removes the current entry from `map` and returns it.
    ///
    /// The cursor stays valid: the next advance yields the entry that would
    /// have followed the removed one, and every other entry is visited
    /// exactly once overall.
    ///
    /// # Errors
    ///
    /// [`CursorError::ConcurrentModification`] if `map` was modified behind
    /// the cursor's back, [`CursorError::NoCurrentEntry`] if the cursor was
    /// never advanced or its current entry was already removed.
    pub fn remove(&mut self, map: &mut TransientHashMap<K, V>) -> Result<(K, V), CursorError> {
        self.check(map)?;
        let (node, index) = self.current.take().ok_or(CursorError::NoCurrentEntry)?;
        let (key, hash) = {
            let entry = &node.entries()[index];
            (entry.key.clone(), entry.hash)
        };
        let next = self.walker.next_location().map(|(node, index)| {
            let entry = &node.entries()[index];
            (entry.key.clone(), entry.hash)
        });

        // Release every node reference so the map can edit in place.
        drop(node);
        self.walker.clear();

        let removed = map.remove_hashed(&key, hash).into_old_value();
        self.expected_modification_count = map.modification_count;
        self.walker = match &next {
            Some((next_key, next_hash)) => Walker::seek(&map.root, next_key, *next_hash),
            None => Walker::empty(),
        };
        removed
            .map(|value| (key, value))
            .ok_or(CursorError::NoCurrentEntry)
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Clone for PersistentHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: ReferenceCounter::clone(&self.root),
            length: self.length,
        }
    }
}

impl<K, V> Default for PersistentHashMap<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> FromIterator<(K, V)> for PersistentHashMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().collect::<TransientHashMap<K, V>>().persistent()
    }
}

impl<K, V, S> From<HashMap<K, V, S>> for PersistentHashMap<K, V>
where
    K: Clone + Hash + Eq,
    V: Clone + PartialEq,
    S: BuildHasher,
{
    fn from(map: HashMap<K, V, S>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq, const N: usize> From<[(K, V); N]>
    for PersistentHashMap<K, V>
{
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<K: Clone, V: Clone> IntoIterator for PersistentHashMap<K, V> {
    type Item = (K, V);
    type IntoIter = PersistentHashMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        PersistentHashMapIntoIterator::new(&self.root, self.length)
    }
}

impl<'a, K, V> IntoIterator for &'a PersistentHashMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentHashMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Hash + Eq, V: PartialEq> PartialEq for PersistentHashMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.length != other.length {
            return false;
        }
        if self.ptr_eq(other) {
            return true;
        }
        self.iter()
            .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Hash + Eq, V: Eq> Eq for PersistentHashMap<K, V> {}

impl<K: Hash + Eq, V: Hash> Hash for PersistentHashMap<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.length);
        state.write_u64(combine_unordered(self.iter()));
    }
}

impl<K, V, Q> Index<&Q> for PersistentHashMap<K, V>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if the key is not present in the map.
    fn index(&self, key: &Q) -> &V {
        self.get(key)
            .unwrap_or_else(|| panic!("key not found"))
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PersistentHashMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<K: serde::Serialize, V: serde::Serialize> serde::Serialize for PersistentHashMap<K, V> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentHashMapVisitor<K, V> {
    marker: PhantomData<(K, V)>,
}

#[cfg(feature = "serde")]
impl<K, V> PersistentHashMapVisitor<K, V> {
    const fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::de::Visitor<'de> for PersistentHashMapVisitor<K, V>
where
    K: serde::Deserialize<'de> + Clone + Hash + Eq,
    V: serde::Deserialize<'de> + Clone + PartialEq,
{
    type Value = PersistentHashMap<K, V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut transient = TransientHashMap::new();
        while let Some((key, value)) = access.next_entry()? {
            transient.insert_with_change(key, value);
        }
        Ok(transient.persistent())
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::Deserialize<'de> for PersistentHashMap<K, V>
where
    K: serde::Deserialize<'de> + Clone + Hash + Eq,
    V: serde::Deserialize<'de> + Clone + PartialEq,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(PersistentHashMapVisitor::new())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // =========================================================================
    // Persistent
    // =========================================================================

    #[rstest]
    fn test_new_creates_empty() {
        let map: PersistentHashMap<i32, i32> = PersistentHashMap::new();
        assert!(map.is_empty());
        assert_eq!(map.iter().count(), 0);
    }

    #[rstest]
    fn test_insert_tracks_length() {
        let map = PersistentHashMap::new().insert(1, "a").insert(2, "b");
        assert_eq!(map.len(), 2);
        let replaced = map.insert(1, "c");
        assert_eq!(replaced.len(), 2);
        assert_eq!(replaced.get(&1), Some(&"c"));
        assert_eq!(map.get(&1), Some(&"a"));
    }

    #[rstest]
    fn test_insert_equal_value_shares_root() {
        let map = PersistentHashMap::singleton(1, "a");
        assert!(map.ptr_eq(&map.insert(1, "a")));
    }

    #[rstest]
    fn test_remove_missing_shares_root() {
        let map = PersistentHashMap::singleton(1, "a");
        let same = map.remove(&2);
        assert!(map.ptr_eq(&same));
        assert_eq!(same.len(), 1);
    }

    #[rstest]
    fn test_persistent_nodes_are_unowned() {
        let map = PersistentHashMap::new().insert(1, 1).insert(33, 33);
        assert_eq!(map.root.owner(), None);
        map.root.check_invariants(0, true);
    }

    #[rstest]
    fn test_clear_returns_empty() {
        let map = PersistentHashMap::singleton(1, 1);
        assert!(map.clear().is_empty());
        assert_eq!(map.len(), 1);
    }

    #[rstest]
    fn test_equality_ignores_insertion_order() {
        let forward: PersistentHashMap<i32, i32> = (0..200).map(|i| (i, i)).collect();
        let backward: PersistentHashMap<i32, i32> = (0..200).rev().map(|i| (i, i)).collect();
        assert_eq!(forward, backward);
        assert_ne!(forward, backward.insert(0, -1));
        assert_ne!(forward, backward.remove(&0));
    }

    #[rstest]
    #[should_panic(expected = "key not found")]
    fn test_index_missing_key_panics() {
        let map = PersistentHashMap::singleton("a", 1);
        let _value = map["b"];
    }

    #[rstest]
    fn test_debug_format() {
        let map = PersistentHashMap::singleton("a", 1);
        assert_eq!(format!("{map:?}"), r#"{"a": 1}"#);
    }

    // =========================================================================
    // Transient
    // =========================================================================

    #[rstest]
    fn test_transient_token_created_lazily() {
        let mut transient: TransientHashMap<i32, i32> = TransientHashMap::new();
        assert_eq!(transient.mutator, None);
        transient.insert(1, 1);
        let token = transient.mutator;
        assert!(token.is_some());
        transient.insert(2, 2);
        assert_eq!(transient.mutator, token);
        assert_eq!(transient.root.owner(), token);
    }

    #[rstest]
    fn test_to_persistent_clears_token() {
        let mut transient: TransientHashMap<i32, i32> = TransientHashMap::new();
        transient.insert(1, 1);
        let first = transient.mutator;
        let frozen = transient.to_persistent();
        assert_eq!(transient.mutator, None);

        transient.insert(2, 2);
        assert_ne!(transient.mutator, first);
        assert!(!frozen.shares_root_with(&transient));
        assert_eq!(frozen.len(), 1);
    }

    #[rstest]
    fn test_owned_root_edited_in_place() {
        let mut transient: TransientHashMap<i32, i32> = TransientHashMap::new();
        transient.insert(1, 1);
        let address = ReferenceCounter::as_ptr(&transient.root);
        for i in 2..100 {
            transient.insert(i, i);
        }
        for i in 2..50 {
            transient.remove(&i);
        }
        assert_eq!(ReferenceCounter::as_ptr(&transient.root), address);
        assert_eq!(transient.len(), 51);
        transient.root.check_invariants(0, true);
    }

    #[rstest]
    fn test_modification_count_ignores_no_ops() {
        let mut transient = TransientHashMap::new();
        transient.insert(1, "a");
        transient.insert(1, "a");
        transient.remove(&2);
        assert_eq!(transient.modification_count(), 1);
        transient.insert(1, "b");
        transient.remove(&1);
        assert_eq!(transient.modification_count(), 3);
    }

    #[rstest]
    fn test_clear_counts_as_modification() {
        let mut transient: TransientHashMap<i32, i32> = (0..5).map(|i| (i, i)).collect();
        let before = transient.modification_count();
        transient.clear();
        assert!(transient.is_empty());
        assert_eq!(transient.modification_count(), before + 1);
        transient.clear();
        assert_eq!(transient.modification_count(), before + 1);
    }

    #[rstest]
    fn test_fork_clears_both_tokens() {
        let mut original: TransientHashMap<i32, i32> = (0..5).map(|i| (i, i)).collect();
        let fork = original.fork();
        assert_eq!(original.mutator, None);
        assert_eq!(fork.mutator, None);
        assert!(ReferenceCounter::ptr_eq(&original.root, &fork.root));
    }

    #[rstest]
    fn test_remove_entry_requires_matching_value() {
        let mut transient = TransientHashMap::new();
        transient.insert("a", 1);
        assert!(!transient.remove_entry("a", &2));
        assert!(transient.remove_entry("a", &1));
        assert!(transient.is_empty());
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    #[rstest]
    fn test_cursor_remove_releases_nodes_for_in_place_edit() {
        let mut map: TransientHashMap<i32, i32> = (0..64).map(|i| (i, i)).collect();
        let address = ReferenceCounter::as_ptr(&map.root);
        let mut cursor = map.cursor();
        while cursor.has_next(&map).unwrap() {
            cursor.advance(&map).unwrap();
            cursor.remove(&mut map).unwrap();
        }
        assert!(map.is_empty());
        assert_eq!(ReferenceCounter::as_ptr(&map.root), address);
    }

    #[rstest]
    fn test_cursor_current_cleared_by_remove() {
        let mut map: TransientHashMap<i32, i32> = [(1, 1), (2, 2)].into_iter().collect();
        let mut cursor = map.cursor();
        assert_eq!(cursor.current(&map), Err(CursorError::NoCurrentEntry));
        cursor.advance(&map).unwrap();
        assert!(cursor.current(&map).is_ok());
        cursor.remove(&mut map).unwrap();
        assert_eq!(cursor.current(&map), Err(CursorError::NoCurrentEntry));
        assert_eq!(cursor.remove(&mut map), Err(CursorError::NoCurrentEntry));
    }

    #[rstest]
    fn test_insert_equal_value_on_shared_root_copies_nothing() {
        let persistent: PersistentHashMap<i32, i32> = (0..100).map(|i| (i, i)).collect();
        let mut transient = persistent.clone().transient();

        assert_eq!(transient.insert(42, 42), Some(42));
        assert!(ReferenceCounter::ptr_eq(&transient.root, &persistent.root));
        assert_eq!(transient.modification_count(), 0);
        assert_eq!(transient.len(), 100);

        assert_eq!(transient.insert(42, 43), Some(42));
        assert!(!ReferenceCounter::ptr_eq(&transient.root, &persistent.root));
        assert_eq!(transient.modification_count(), 1);
        assert_eq!(persistent.get(&42), Some(&42));
    }
}
