//! Persistent (immutable) hash set, with a transient view.
//!
//! This module provides [`PersistentHashSet`] and [`TransientHashSet`],
//! thin wrappers around [`PersistentHashMap<T, ()>`](PersistentHashMap) and
//! [`TransientHashMap<T, ()>`](TransientHashMap). Every trie property of the
//! map carries over: structural sharing, O(1) freeze and thaw, fail-fast
//! cursors.
//!
//! # Examples
//!
//! ```rust
//! use trie_collections::persistent::PersistentHashSet;
//!
//! let set = PersistentHashSet::new()
//!     .insert(1)
//!     .insert(2)
//!     .insert(3);
//!
//! assert!(set.contains(&1));
//! assert!(!set.contains(&4));
//!
//! // Structural sharing: the original set is preserved
//! let updated = set.insert(4);
//! assert_eq!(set.len(), 3);      // Original unchanged
//! assert_eq!(updated.len(), 4);  // New version
//! ```
//!
//! # Set Operations
//!
//! ```rust
//! use trie_collections::persistent::PersistentHashSet;
//!
//! let set_a: PersistentHashSet<i32> = [1, 2, 3].into_iter().collect();
//! let set_b: PersistentHashSet<i32> = [2, 3, 4].into_iter().collect();
//!
//! assert_eq!(set_a.union(&set_b).len(), 4);                // {1, 2, 3, 4}
//! assert_eq!(set_a.intersection(&set_b).len(), 2);         // {2, 3}
//! assert_eq!(set_a.difference(&set_b).len(), 1);           // {1}
//! assert_eq!(set_a.symmetric_difference(&set_b).len(), 2); // {1, 4}
//! ```

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::iter::{FromIterator, FusedIterator};
use std::marker::PhantomData;
use std::rc::Rc;

use super::error::CursorError;
use super::hash::combine_unordered;
use super::{
    PersistentHashMap, PersistentHashMapIntoIterator, PersistentHashMapIterator, TransientHashMap,
    TransientHashMapCursor,
};

// =============================================================================
// PersistentHashSet Definition
// =============================================================================

/// A persistent (immutable) hash set based on [`PersistentHashMap`].
///
/// # Time Complexity
///
/// | Operation              | Complexity                     |
/// |------------------------|--------------------------------|
/// | `contains`             | O(log32 N)                     |
/// | `insert`               | O(log32 N)                     |
/// | `remove`               | O(log32 N)                     |
/// | `len`                  | O(1)                           |
/// | `union`                | O(min(n,m) * log32(max(n,m)))  |
/// | `intersection`         | O(min(n,m) * log32(max(n,m)))  |
/// | `difference`           | O(n * log32 m)                 |
/// | `symmetric_difference` | O(m * log32 n)                 |
///
/// # Examples
///
/// ```rust
/// use trie_collections::persistent::PersistentHashSet;
///
/// let set = PersistentHashSet::singleton(42);
/// assert!(set.contains(&42));
/// assert!(!set.contains(&0));
/// ```
pub struct PersistentHashSet<T> {
    inner: PersistentHashMap<T, ()>,
}

impl<T> PersistentHashSet<T> {
    /// Creates a new empty set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: PersistentHashMap::new(),
        }
    }

    /// Returns the number of elements in the set.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the set contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over the elements, in trie order.
    #[must_use]
    pub fn iter(&self) -> PersistentHashSetIterator<'_, T> {
        PersistentHashSetIterator {
            inner: self.inner.iter(),
        }
    }

    /// Returns `true` if both sets share the same root node.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }

    /// Returns `true` if `transient` still holds this set's root node.
    #[inline]
    #[must_use]
    pub fn shares_root_with(&self, transient: &TransientHashSet<T>) -> bool {
        self.inner.shares_root_with(&transient.inner)
    }

    /// Converts this set into a transient set for batch updates.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashSet;
    ///
    /// let persistent: PersistentHashSet<i32> = [1, 2, 3].into_iter().collect();
    ///
    /// let mut transient = persistent.transient();
    /// transient.insert(4);
    /// transient.insert(5);
    /// transient.remove(&1);
    ///
    /// let new_persistent = transient.persistent();
    /// assert_eq!(new_persistent.len(), 4);
    /// assert!(!new_persistent.contains(&1));
    /// ```
    #[must_use]
    pub fn transient(self) -> TransientHashSet<T> {
        TransientHashSet::wrap(self.inner.transient())
    }

    /// Creates a transient set sharing this set's root.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn to_transient(&self) -> TransientHashSet<T> {
        TransientHashSet::wrap(self.inner.to_transient())
    }
}

impl<T: Hash + Eq> PersistentHashSet<T> {
    /// Returns `true` if the set contains the element.
    ///
    /// The element may be any borrowed form of the set's element type.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashSet;
    ///
    /// let set = PersistentHashSet::singleton("hello".to_string());
    /// assert!(set.contains("hello"));
    /// assert!(!set.contains("world"));
    /// ```
    #[must_use]
    pub fn contains<Q>(&self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains_key(element)
    }

    /// Returns the stored element equal to `element`, if any.
    #[must_use]
    pub fn get<Q>(&self, element: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get_key_value(element).map(|(key, ())| key)
    }

    /// Returns `true` if every element of `self` is in `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::PersistentHashSet;
    ///
    /// let small: PersistentHashSet<i32> = [1, 2].into_iter().collect();
    /// let large: PersistentHashSet<i32> = [1, 2, 3].into_iter().collect();
    /// assert!(small.is_subset(&large));
    /// assert!(!large.is_subset(&small));
    /// ```
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().all(|element| other.contains(element))
    }

    /// Returns `true` if every element of `other` is in `self`.
    #[must_use]
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }

    /// Returns `true` if the sets have no element in common.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        let (smaller, larger) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        smaller.iter().all(|element| !larger.contains(element))
    }
}

impl<T: Clone + Hash + Eq> PersistentHashSet<T> {
    /// Creates a set containing a single element.
    #[inline]
    #[must_use]
    pub fn singleton(element: T) -> Self {
        Self::new().insert(element)
    }

    /// Returns a new set containing `element`.
    ///
    /// If the element is already present, the returned set shares this
    /// set's root.
    #[must_use]
    pub fn insert(&self, element: T) -> Self {
        Self {
            inner: self.inner.insert(element, ()),
        }
    }

    /// Returns a new set without `element`.
    #[must_use]
    pub fn remove<Q>(&self, element: &Q) -> Self
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Self {
            inner: self.inner.remove(element),
        }
    }

    /// Returns an empty set.
    #[must_use]
    pub fn clear(&self) -> Self {
        Self::new()
    }

    /// Returns the union of both sets.
    ///
    /// The larger set is thawed and the smaller one inserted into it, so
    /// the result shares most of its structure with the larger set.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.ptr_eq(other) {
            return self.clone();
        }
        let (smaller, larger) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        let mut transient = larger.to_transient();
        transient.insert_all(smaller.iter().cloned());
        transient.persistent()
    }

    /// Returns the elements present in both sets.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let (smaller, larger) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        smaller
            .iter()
            .filter(|element| larger.contains(*element))
            .cloned()
            .collect()
    }

    /// Returns the elements of `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        if self.len() <= other.len() {
            self.iter()
                .filter(|element| !other.contains(*element))
                .cloned()
                .collect()
        } else {
            let mut transient = self.to_transient();
            transient.remove_all(other.iter());
            transient.persistent()
        }
    }

    /// Returns the elements present in exactly one of the sets.
    #[must_use]
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        let mut transient = self.to_transient();
        for element in other {
            if !transient.remove(element) {
                transient.insert(element.clone());
            }
        }
        transient.persistent()
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// An iterator over the elements of a hash set.
pub struct PersistentHashSetIterator<'a, T> {
    inner: PersistentHashMapIterator<'a, T, ()>,
}

impl<'a, T> Iterator for PersistentHashSetIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(element, ())| element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for PersistentHashSetIterator<'_, T> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T> FusedIterator for PersistentHashSetIterator<'_, T> {}

/// An owning iterator over the elements of a hash set.
pub struct PersistentHashSetIntoIterator<T> {
    inner: PersistentHashMapIntoIterator<T, ()>,
}

impl<T: Clone> Iterator for PersistentHashSetIntoIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(element, ())| element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T: Clone> ExactSizeIterator for PersistentHashSetIntoIterator<T> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T: Clone> FusedIterator for PersistentHashSetIntoIterator<T> {}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<T> Clone for PersistentHashSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for PersistentHashSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Hash + Eq> FromIterator<T> for PersistentHashSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter().collect::<TransientHashSet<T>>().persistent()
    }
}

impl<T: Clone + Hash + Eq, S: BuildHasher> From<HashSet<T, S>> for PersistentHashSet<T> {
    fn from(set: HashSet<T, S>) -> Self {
        set.into_iter().collect()
    }
}

impl<T: Clone + Hash + Eq, const N: usize> From<[T; N]> for PersistentHashSet<T> {
    fn from(elements: [T; N]) -> Self {
        elements.into_iter().collect()
    }
}

impl<T: Clone> IntoIterator for PersistentHashSet<T> {
    type Item = T;
    type IntoIter = PersistentHashSetIntoIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        PersistentHashSetIntoIterator {
            inner: self.inner.into_iter(),
        }
    }
}

impl<'a, T> IntoIterator for &'a PersistentHashSet<T> {
    type Item = &'a T;
    type IntoIter = PersistentHashSetIterator<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Hash + Eq> PartialEq for PersistentHashSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: Hash + Eq> Eq for PersistentHashSet<T> {}

impl<T: Hash + Eq> Hash for PersistentHashSet<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        state.write_u64(combine_unordered(self.iter()));
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentHashSet<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_set().entries(self.iter()).finish()
    }
}

impl<T: fmt::Display> fmt::Display for PersistentHashSet<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        let mut first = true;
        for element in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{element}")?;
        }
        write!(formatter, "}}")
    }
}

// =============================================================================
// TransientHashSet Definition
// =============================================================================

/// A transient (temporarily mutable) hash set for efficient batch updates.
///
/// # Design
///
/// - Internally uses `TransientHashMap<T, ()>` for all operations
/// - `PhantomData<Rc<()>>` ensures `!Send` and `!Sync`
/// - Clone/Copy traits are intentionally not implemented; use
///   [`fork`](Self::fork)
///
/// # Examples
///
/// ```rust
/// use trie_collections::persistent::TransientHashSet;
///
/// let mut transient = TransientHashSet::new();
/// transient.insert(1);
/// transient.insert(2);
/// transient.insert(3);
///
/// let persistent = transient.persistent();
/// assert!(persistent.contains(&1));
/// assert_eq!(persistent.len(), 3);
/// ```
pub struct TransientHashSet<T> {
    inner: TransientHashMap<T, ()>,
    /// Marker to ensure `!Send` and `!Sync`.
    _marker: PhantomData<Rc<()>>,
}

// Static assertions to verify TransientHashSet is not Send/Sync
static_assertions::assert_not_impl_any!(TransientHashSet<i32>: Send, Sync);
static_assertions::assert_not_impl_any!(TransientHashSet<String>: Send, Sync);

// Arc feature verification: even with Arc, TransientHashSet remains !Send/!Sync
#[cfg(feature = "arc")]
mod arc_send_sync_verification_hashset {
    use super::{PersistentHashSet, TransientHashSet, TransientHashSetCursor};
    use std::sync::Arc;

    static_assertions::assert_not_impl_any!(TransientHashSet<Arc<i32>>: Send, Sync);
    static_assertions::assert_not_impl_any!(TransientHashSetCursor<Arc<String>>: Send, Sync);
    static_assertions::assert_impl_all!(PersistentHashSet<String>: Send, Sync);
}

impl<T> TransientHashSet<T> {
    const fn wrap(inner: TransientHashMap<T, ()>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Creates a new empty transient set.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(TransientHashMap::new())
    }

    /// Returns the number of elements in the set.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the set contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of structural modifications made through this transient.
    #[inline]
    #[must_use]
    pub const fn modification_count(&self) -> u64 {
        self.inner.modification_count()
    }

    /// Returns an iterator over the elements.
    #[must_use]
    pub fn iter(&self) -> PersistentHashSetIterator<'_, T> {
        PersistentHashSetIterator {
            inner: self.inner.iter(),
        }
    }

    /// Returns `true` if `persistent` holds this transient's root node.
    #[inline]
    #[must_use]
    pub fn shares_root_with(&self, persistent: &PersistentHashSet<T>) -> bool {
        persistent.shares_root_with(self)
    }

    /// Returns a fail-fast cursor positioned before the first element.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::TransientHashSet;
    ///
    /// let mut set: TransientHashSet<i32> = (0..6).collect();
    /// let mut cursor = set.cursor();
    /// while cursor.has_next(&set)? {
    ///     if cursor.next_element(&set)? > 2 {
    ///         cursor.remove(&mut set)?;
    ///     }
    /// }
    /// assert_eq!(set.len(), 3);
    /// # Ok::<(), trie_collections::persistent::CursorError>(())
    /// ```
    #[must_use]
    pub fn cursor(&self) -> TransientHashSetCursor<T> {
        TransientHashSetCursor {
            inner: self.inner.cursor(),
        }
    }

    /// Creates a persistent set sharing this transient's root and clears
    /// the mutator token.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn to_persistent(&mut self) -> PersistentHashSet<T> {
        PersistentHashSet {
            inner: self.inner.to_persistent(),
        }
    }

    /// Converts this transient set into a persistent set.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn persistent(self) -> PersistentHashSet<T> {
        PersistentHashSet {
            inner: self.inner.persistent(),
        }
    }

    /// Splits off a second transient over the same content; neither side
    /// observes the other's later changes.
    #[must_use]
    pub fn fork(&mut self) -> Self {
        Self::wrap(self.inner.fork())
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl<T: Hash + Eq> TransientHashSet<T> {
    /// Returns `true` if the set contains the element.
    #[must_use]
    pub fn contains<Q>(&self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains_key(element)
    }

    /// Returns `true` if the set contains every given element.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::TransientHashSet;
    ///
    /// let set: TransientHashSet<i32> = (0..5).collect();
    /// assert!(set.contains_all(&[1, 3]));
    /// assert!(!set.contains_all(&[1, 7]));
    /// ```
    #[must_use]
    pub fn contains_all<'a, Q, I>(&self, elements: I) -> bool
    where
        I: IntoIterator<Item = &'a Q>,
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized + 'a,
    {
        elements.into_iter().all(|element| self.contains(element))
    }
}

impl<T: Clone + Hash + Eq> TransientHashSet<T> {
    /// Inserts an element. Returns `true` if it was not present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::TransientHashSet;
    ///
    /// let mut transient: TransientHashSet<i32> = TransientHashSet::new();
    /// assert!(transient.insert(1));   // New element
    /// assert!(!transient.insert(1));  // Already exists
    /// assert_eq!(transient.len(), 1);
    /// ```
    pub fn insert(&mut self, element: T) -> bool {
        self.inner.insert_with_change(element, ()).is_modified()
    }

    /// Removes an element. Returns `true` if it was present.
    pub fn remove<Q>(&mut self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.remove_with_change(element).is_modified()
    }

    /// Inserts every element. Returns `true` if the set changed.
    pub fn insert_all<I: IntoIterator<Item = T>>(&mut self, elements: I) -> bool {
        elements
            .into_iter()
            .fold(false, |changed, element| self.insert(element) || changed)
    }

    /// Removes every given element. Returns `true` if the set changed.
    pub fn remove_all<'a, Q, I>(&mut self, elements: I) -> bool
    where
        I: IntoIterator<Item = &'a Q>,
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized + 'a,
    {
        elements
            .into_iter()
            .fold(false, |changed, element| self.remove(element) || changed)
    }

    /// Retains only the elements for which `predicate` returns `true`.
    /// Returns `true` if the set changed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trie_collections::persistent::TransientHashSet;
    ///
    /// let mut set: TransientHashSet<i32> = (0..10).collect();
    /// assert!(set.retain(|element| element % 2 == 0));
    /// assert!(!set.retain(|element| element % 2 == 0));
    /// assert_eq!(set.len(), 5);
    /// ```
    pub fn retain<F>(&mut self, mut predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.len();
        self.inner.retain(|element, ()| predicate(element));
        self.len() != before
    }
}

impl<T> Default for TransientHashSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Hash + Eq> Extend<T> for TransientHashSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.insert_all(iter);
    }
}

impl<T: Clone + Hash + Eq> FromIterator<T> for TransientHashSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut transient = Self::new();
        transient.extend(iter);
        transient
    }
}

impl<'a, T> IntoIterator for &'a TransientHashSet<T> {
    type Item = &'a T;
    type IntoIter = PersistentHashSetIterator<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Hash + Eq> PartialEq for TransientHashSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: Hash + Eq> Eq for TransientHashSet<T> {}

impl<T: Hash + Eq> Hash for TransientHashSet<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        state.write_u64(combine_unordered(self.iter()));
    }
}

impl<T: fmt::Debug> fmt::Debug for TransientHashSet<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_set().entries(self.iter()).finish()
    }
}

// =============================================================================
// TransientHashSetCursor
// =============================================================================

/// A fail-fast cursor over a [`TransientHashSet`] that can remove elements.
///
/// See [`TransientHashMapCursor`] for the traversal and failure rules.
pub struct TransientHashSetCursor<T> {
    inner: TransientHashMapCursor<T, ()>,
}

impl<T> TransientHashSetCursor<T> {
    /// Returns `true` if another element follows the current one.
    ///
    /// # Errors
    ///
    /// [`CursorError::ConcurrentModification`] if `set` was modified behind
    /// the cursor's back.
    pub fn has_next(&self, set: &TransientHashSet<T>) -> Result<bool, CursorError> {
        self.inner.has_next(&set.inner)
    }

    /// Moves to the next element, making it current.
    ///
    /// # Errors
    ///
    /// [`CursorError::ConcurrentModification`] or [`CursorError::Exhausted`].
    pub fn advance(&mut self, set: &TransientHashSet<T>) -> Result<(), CursorError> {
        self.inner.advance(&set.inner)
    }

    /// Returns the element the cursor was last advanced to.
    ///
    /// # Errors
    ///
    /// [`CursorError::ConcurrentModification`] or
    /// [`CursorError::NoCurrentEntry`].
    pub fn current(&self, set: &TransientHashSet<T>) -> Result<&T, CursorError> {
        self.inner
            .current(&set.inner)
            .map(|(element, ())| element)
    }

    /// Advances and returns a copy of the new current element.
    ///
    /// # Errors
    ///
    /// Same as [`advance`](Self::advance).
    pub fn next_element(&mut self, set: &TransientHashSet<T>) -> Result<T, CursorError>
    where
        T: Clone,
    {
        self.inner
            .next_entry(&set.inner)
            .map(|(element, ())| element)
    }
}

impl<T: Clone + Hash + Eq> TransientHashSetCursor<T> {
    /// Removes the current element from `set` and returns it.
    ///
    /// # Errors
    ///
    /// [`CursorError::ConcurrentModification`] or
    /// [`CursorError::NoCurrentEntry`].
    pub fn remove(&mut self, set: &mut TransientHashSet<T>) -> Result<T, CursorError> {
        self.inner
            .remove(&mut set.inner)
            .map(|(element, ())| element)
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<T: serde::Serialize> serde::Serialize for PersistentHashSet<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for element in self {
            seq.serialize_element(element)?;
        }
        seq.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentHashSetVisitor<T> {
    marker: PhantomData<T>,
}

#[cfg(feature = "serde")]
impl<T> PersistentHashSetVisitor<T> {
    const fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

#[cfg(feature = "serde")]
impl<'de, T> serde::de::Visitor<'de> for PersistentHashSetVisitor<T>
where
    T: serde::Deserialize<'de> + Clone + Hash + Eq,
{
    type Value = PersistentHashSet<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a sequence")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut transient = TransientHashSet::new();
        while let Some(element) = seq.next_element()? {
            transient.insert(element);
        }
        Ok(transient.persistent())
    }
}

#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for PersistentHashSet<T>
where
    T: serde::Deserialize<'de> + Clone + Hash + Eq,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(PersistentHashSetVisitor::new())
    }
}

// =============================================================================
// Tests
// =============================================================================
