//! CHAMP trie nodes with ownership-stamped copy-on-write.
//!
//! A trie is built from two node shapes:
//!
//! - [`BitmapNode`]: 32 slots addressed by 5-bit hash fragments. `data_map`
//!   marks slots holding a direct entry, `node_map` marks slots holding a
//!   sub-node; both are packed in slot order.
//! - [`CollisionNode`]: entries whose 64-bit hashes are identical. Only
//!   created once every hash bit has been consumed.
//!
//! The trie is kept canonical: every sub-node holds at least two entries in
//! its subtree, and a sub-node reduced to a single entry is inlined into its
//! parent on removal. The same content therefore always has the same shape.
//!
//! # Ownership
//!
//! Every node carries an optional [`MutatorToken`]. An edit supplied with a
//! token may modify a node in place only if the node carries that same token
//! and no other root references it; in every other case the node is copied,
//! the copy is stamped with the token (or left unowned when no token was
//! supplied) and the copy is edited. Persistent operations pass no token
//! and therefore always copy the path they touch.

use std::borrow::Borrow;
use std::fmt;
use std::mem;

use super::ReferenceCounter;
use super::change_event::ChangeEvent;
use super::mutator::MutatorToken;

// =============================================================================
// Constants
// =============================================================================

/// Hash bits consumed per trie level (2^5 = 32 slots).
pub(crate) const BITS_PER_LEVEL: u32 = 5;

/// Width of a key hash.
pub(crate) const HASH_BITS: u32 = u64::BITS;

/// Mask extracting one slot fragment from a shifted hash.
const FRAGMENT_MASK: u64 = (1 << BITS_PER_LEVEL) - 1;

/// Deepest possible path: 13 bitmap levels plus one collision level.
pub(crate) const MAX_DEPTH: usize = HASH_BITS.div_ceil(BITS_PER_LEVEL) as usize + 1;

// =============================================================================
// Bit indexing
// =============================================================================

/// Extracts the slot fragment of `hash` at bit offset `shift`.
#[inline]
pub(crate) const fn fragment(hash: u64, shift: u32) -> u32 {
    ((hash >> shift) & FRAGMENT_MASK) as u32
}

/// Single-bit mask for a slot fragment.
#[inline]
pub(crate) const fn bit_position(fragment: u32) -> u32 {
    1 << fragment
}

/// Packed array position of `bit` within `bitmap`: the number of occupied
/// slots below it.
#[inline]
pub(crate) const fn packed_index(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

// =============================================================================
// Node Definition
// =============================================================================

/// A key-value pair stored with its precomputed hash.
#[derive(Clone)]
pub(crate) struct Entry<K, V> {
    pub(crate) hash: u64,
    pub(crate) key: K,
    pub(crate) value: V,
}

/// Bitmap-indexed branch.
///
/// Invariants: `data_map & node_map == 0`,
/// `data_map.count_ones() == entries.len()` and
/// `node_map.count_ones() == children.len()`.
#[derive(Clone)]
pub(crate) struct BitmapNode<K, V> {
    pub(crate) owner: Option<MutatorToken>,
    pub(crate) data_map: u32,
    pub(crate) node_map: u32,
    pub(crate) entries: Vec<Entry<K, V>>,
    pub(crate) children: Vec<ReferenceCounter<Node<K, V>>>,
}

/// Linear bucket for keys sharing one full hash. Holds at least two entries
/// except transiently during a removal.
#[derive(Clone)]
pub(crate) struct CollisionNode<K, V> {
    pub(crate) owner: Option<MutatorToken>,
    pub(crate) hash: u64,
    pub(crate) entries: Vec<Entry<K, V>>,
}

/// Trie node: a closed union of the two shapes.
#[derive(Clone)]
pub(crate) enum Node<K, V> {
    Bitmap(BitmapNode<K, V>),
    Collision(CollisionNode<K, V>),
}

// =============================================================================
// Read operations - no bounds beyond key equality
// =============================================================================

impl<K, V> Node<K, V> {
    /// Creates an unowned, empty branch. Empty collections hold one of these
    /// as their root; having no owner, it is never edited in place.
    ///
    /// Each empty collection allocates its own instance rather than sharing
    /// one process-wide node, since a `static` cannot be generic over
    /// `(K, V)`. Emptiness is read from the entry count, never from pointer
    /// identity, so the instances are interchangeable.
    pub(crate) const fn empty() -> Self {
        Self::Bitmap(BitmapNode {
            owner: None,
            data_map: 0,
            node_map: 0,
            entries: Vec::new(),
            children: Vec::new(),
        })
    }

    /// Returns the token of the transient that exclusively created or last
    /// copied this node.
    #[inline]
    pub(crate) const fn owner(&self) -> Option<MutatorToken> {
        match self {
            Self::Bitmap(bitmap) => bitmap.owner,
            Self::Collision(collision) => collision.owner,
        }
    }

    #[inline]
    const fn set_owner(&mut self, mutator: Option<MutatorToken>) {
        match self {
            Self::Bitmap(bitmap) => bitmap.owner = mutator,
            Self::Collision(collision) => collision.owner = mutator,
        }
    }

    /// Direct entries of this node, in slot order.
    #[inline]
    pub(crate) fn entries(&self) -> &[Entry<K, V>] {
        match self {
            Self::Bitmap(bitmap) => &bitmap.entries,
            Self::Collision(collision) => &collision.entries,
        }
    }

    /// `true` if this node holds one direct entry and nothing else, so it
    /// must be inlined into its parent.
    #[inline]
    fn holds_single_entry(&self) -> bool {
        match self {
            Self::Bitmap(bitmap) => bitmap.node_map == 0 && bitmap.entries.len() == 1,
            Self::Collision(collision) => collision.entries.len() == 1,
        }
    }

    /// Looks up `key` in the subtree rooted here; `shift` is the bit offset
    /// this node consumes.
    pub(crate) fn find<Q>(&self, key: &Q, hash: u64, mut shift: u32) -> Option<&Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut node = self;
        loop {
            match node {
                Self::Bitmap(bitmap) => {
                    let bit = bit_position(fragment(hash, shift));
                    if bitmap.data_map & bit != 0 {
                        let entry = &bitmap.entries[packed_index(bitmap.data_map, bit)];
                        return (entry.hash == hash && entry.key.borrow() == key).then_some(entry);
                    }
                    if bitmap.node_map & bit == 0 {
                        return None;
                    }
                    node = &*bitmap.children[packed_index(bitmap.node_map, bit)];
                    shift += BITS_PER_LEVEL;
                }
                Self::Collision(collision) => {
                    if collision.hash != hash {
                        return None;
                    }
                    return collision
                        .entries
                        .iter()
                        .find(|entry| entry.key.borrow() == key);
                }
            }
        }
    }
}

// =============================================================================
// Write operations - copy-on-write gated by ownership
// =============================================================================

impl<K: Clone, V: Clone> Node<K, V> {
    /// Returns a mutable reference to the node in `slot`, copying it first
    /// unless `mutator` owns it exclusively.
    fn edit(slot: &mut ReferenceCounter<Self>, mutator: Option<MutatorToken>) -> &mut Self {
        let exclusive = mutator.is_some()
            && slot.owner() == mutator
            && ReferenceCounter::get_mut(slot).is_some();
        if !exclusive {
            let mut copy = Self::clone(slot);
            copy.set_owner(mutator);
            *slot = ReferenceCounter::new(copy);
        }
        // The slot is unshared at this point, so this never clones.
        ReferenceCounter::make_mut(slot)
    }

    /// Associates `value` with `key` in the trie held by `slot`.
    ///
    /// Afterwards `slot` holds the updated node: the same node when it was
    /// edited in place, a copy otherwise. `event` reports whether the key
    /// was inserted or its value replaced. Storing a value equal to the
    /// current one leaves `event` untouched, copies nothing and hands
    /// `value` back.
    pub(crate) fn update(
        slot: &mut ReferenceCounter<Self>,
        mutator: Option<MutatorToken>,
        key: K,
        value: V,
        hash: u64,
        shift: u32,
        event: &mut ChangeEvent<V>,
    ) -> Option<V>
    where
        K: Eq,
        V: PartialEq,
    {
        if let Some(existing) = slot.find(&key, hash, shift) {
            if existing.value == value {
                return Some(value);
            }
        }
        Self::insert_entry(slot, mutator, Entry { hash, key, value }, shift, event);
        None
    }

    /// Removes `key` from the trie held by `slot`.
    ///
    /// A missing key leaves `event` untouched and copies nothing.
    pub(crate) fn remove<Q>(
        slot: &mut ReferenceCounter<Self>,
        mutator: Option<MutatorToken>,
        key: &Q,
        hash: u64,
        shift: u32,
        event: &mut ChangeEvent<V>,
    ) where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if slot.find(key, hash, shift).is_none() {
            return;
        }
        Self::remove_present(slot, mutator, key, hash, shift, event);
    }

    /// Stores `entry`, knowing the store modifies the trie.
    fn insert_entry(
        slot: &mut ReferenceCounter<Self>,
        mutator: Option<MutatorToken>,
        entry: Entry<K, V>,
        shift: u32,
        event: &mut ChangeEvent<V>,
    ) where
        K: Eq,
    {
        match Self::edit(slot, mutator) {
            Self::Bitmap(bitmap) => bitmap.insert_entry(mutator, entry, shift, event),
            Self::Collision(collision) => collision.insert_entry(entry, event),
        }
    }

    /// Removes `key`, knowing it is present.
    fn remove_present<Q>(
        slot: &mut ReferenceCounter<Self>,
        mutator: Option<MutatorToken>,
        key: &Q,
        hash: u64,
        shift: u32,
        event: &mut ChangeEvent<V>,
    ) where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match Self::edit(slot, mutator) {
            Self::Bitmap(bitmap) => bitmap.remove_present(mutator, key, hash, shift, event),
            Self::Collision(collision) => collision.remove_present(key, event),
        }
    }

    /// Moves the only entry out of a node that must be inlined, cloning it
    /// when the node is still shared.
    fn take_single_entry(slot: &mut ReferenceCounter<Self>) -> Option<Entry<K, V>> {
        if !slot.holds_single_entry() {
            return None;
        }
        if let Some(node) = ReferenceCounter::get_mut(slot) {
            return match node {
                Self::Bitmap(bitmap) => bitmap.entries.pop(),
                Self::Collision(collision) => collision.entries.pop(),
            };
        }
        slot.entries().first().cloned()
    }
}

impl<K: Clone, V: Clone> BitmapNode<K, V> {
    fn insert_entry(
        &mut self,
        mutator: Option<MutatorToken>,
        entry: Entry<K, V>,
        shift: u32,
        event: &mut ChangeEvent<V>,
    ) where
        K: Eq,
    {
        let bit = bit_position(fragment(entry.hash, shift));

        if self.data_map & bit != 0 {
            let index = packed_index(self.data_map, bit);
            let current = &mut self.entries[index];
            if current.hash == entry.hash && current.key == entry.key {
                let old_value = mem::replace(&mut current.value, entry.value);
                event.replaced(old_value);
            } else {
                // Two keys share this fragment: push both one level down.
                let existing = self.entries.remove(index);
                self.data_map ^= bit;
                let child = merge_entries(mutator, existing, entry, shift + BITS_PER_LEVEL);
                self.children
                    .insert(packed_index(self.node_map, bit), ReferenceCounter::new(child));
                self.node_map |= bit;
                event.inserted();
            }
        } else if self.node_map & bit != 0 {
            let index = packed_index(self.node_map, bit);
            Node::insert_entry(
                &mut self.children[index],
                mutator,
                entry,
                shift + BITS_PER_LEVEL,
                event,
            );
        } else {
            self.entries.insert(packed_index(self.data_map, bit), entry);
            self.data_map |= bit;
            event.inserted();
        }
    }

    fn remove_present<Q>(
        &mut self,
        mutator: Option<MutatorToken>,
        key: &Q,
        hash: u64,
        shift: u32,
        event: &mut ChangeEvent<V>,
    ) where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let bit = bit_position(fragment(hash, shift));

        if self.data_map & bit != 0 {
            let entry = self.entries.remove(packed_index(self.data_map, bit));
            self.data_map ^= bit;
            event.removed(entry.value);
            return;
        }
        if self.node_map & bit == 0 {
            return;
        }

        let index = packed_index(self.node_map, bit);
        Node::remove_present(
            &mut self.children[index],
            mutator,
            key,
            hash,
            shift + BITS_PER_LEVEL,
            event,
        );

        // Canonical form: pull a lone remaining entry up into this slot.
        if let Some(entry) = Node::take_single_entry(&mut self.children[index]) {
            self.children.remove(index);
            self.node_map ^= bit;
            self.entries.insert(packed_index(self.data_map, bit), entry);
            self.data_map |= bit;
        }
    }
}

impl<K, V> CollisionNode<K, V> {
    fn insert_entry(&mut self, entry: Entry<K, V>, event: &mut ChangeEvent<V>)
    where
        K: Eq,
    {
        debug_assert_eq!(entry.hash, self.hash, "collision bucket reached with a foreign hash");
        if let Some(current) = self.entries.iter_mut().find(|current| current.key == entry.key) {
            let old_value = mem::replace(&mut current.value, entry.value);
            event.replaced(old_value);
        } else {
            self.entries.push(entry);
            event.inserted();
        }
    }

    fn remove_present<Q>(&mut self, key: &Q, event: &mut ChangeEvent<V>)
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if let Some(index) = self.entries.iter().position(|entry| entry.key.borrow() == key) {
            let entry = self.entries.remove(index);
            event.removed(entry.value);
        }
    }
}

/// Builds the smallest subtree at `shift` holding two entries with distinct
/// keys. Descends while their fragments agree and falls back to a collision
/// bucket once all hash bits are consumed.
fn merge_entries<K, V>(
    mutator: Option<MutatorToken>,
    first: Entry<K, V>,
    second: Entry<K, V>,
    shift: u32,
) -> Node<K, V> {
    if shift >= HASH_BITS {
        return Node::Collision(CollisionNode {
            owner: mutator,
            hash: first.hash,
            entries: vec![first, second],
        });
    }

    let first_fragment = fragment(first.hash, shift);
    let second_fragment = fragment(second.hash, shift);

    if first_fragment == second_fragment {
        let child = merge_entries(mutator, first, second, shift + BITS_PER_LEVEL);
        Node::Bitmap(BitmapNode {
            owner: mutator,
            data_map: 0,
            node_map: bit_position(first_fragment),
            entries: Vec::new(),
            children: vec![ReferenceCounter::new(child)],
        })
    } else {
        let entries = if first_fragment < second_fragment {
            vec![first, second]
        } else {
            vec![second, first]
        };
        Node::Bitmap(BitmapNode {
            owner: mutator,
            data_map: bit_position(first_fragment) | bit_position(second_fragment),
            node_map: 0,
            entries,
            children: Vec::new(),
        })
    }
}

// =============================================================================
// Debug - avoids K/V bounds
// =============================================================================

impl<K, V> fmt::Debug for Node<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bitmap(bitmap) => formatter
                .debug_struct("Bitmap")
                .field("owner", &bitmap.owner)
                .field("data_map", &format_args!("{:#034b}", bitmap.data_map))
                .field("node_map", &format_args!("{:#034b}", bitmap.node_map))
                .field("children", &bitmap.children)
                .finish_non_exhaustive(),
            Self::Collision(collision) => formatter
                .debug_struct("Collision")
                .field("owner", &collision.owner)
                .field("hash", &format_args!("{:#018x}", collision.hash))
                .field("entries", &collision.entries.len())
                .finish(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
impl<K, V> Node<K, V> {
    /// Checks every structural invariant of the subtree and returns the
    /// number of entries it holds.
    pub(crate) fn check_invariants(&self, shift: u32, is_root: bool) -> usize {
        match self {
            Self::Bitmap(bitmap) => {
                assert_eq!(bitmap.data_map & bitmap.node_map, 0, "slot used twice");
                assert_eq!(bitmap.data_map.count_ones() as usize, bitmap.entries.len());
                assert_eq!(bitmap.node_map.count_ones() as usize, bitmap.children.len());
                let mut data_slots = bitmap.data_map;
                for entry in &bitmap.entries {
                    let slot = data_slots.trailing_zeros();
                    data_slots &= data_slots - 1;
                    assert_eq!(fragment(entry.hash, shift), slot, "entry in wrong slot");
                }
                let below: usize = bitmap
                    .children
                    .iter()
                    .map(|child| child.check_invariants(shift + BITS_PER_LEVEL, false))
                    .sum();
                let total = bitmap.entries.len() + below;
                if !is_root {
                    assert!(total >= 2, "sub-node with fewer than two entries");
                }
                total
            }
            Self::Collision(collision) => {
                assert!(shift >= HASH_BITS, "collision bucket above the last level");
                assert!(collision.entries.len() >= 2, "collision bucket too small");
                assert!(collision.entries.iter().all(|entry| entry.hash == collision.hash));
                collision.entries.len()
            }
        }
    }

    /// Deepest level of the subtree, counting this node as 1.
    pub(crate) fn depth(&self) -> usize {
        match self {
            Self::Bitmap(bitmap) => {
                1 + bitmap
                    .children
                    .iter()
                    .map(|child| child.depth())
                    .max()
                    .unwrap_or(0)
            }
            Self::Collision(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    type TestNode = Node<u32, &'static str>;

    fn new_root() -> ReferenceCounter<TestNode> {
        ReferenceCounter::new(Node::empty())
    }

    fn put(
        root: &mut ReferenceCounter<TestNode>,
        mutator: Option<MutatorToken>,
        key: u32,
        hash: u64,
        value: &'static str,
    ) -> ChangeEvent<&'static str> {
        let mut event = ChangeEvent::default();
        Node::update(root, mutator, key, value, hash, 0, &mut event);
        event
    }

    fn delete(
        root: &mut ReferenceCounter<TestNode>,
        mutator: Option<MutatorToken>,
        key: u32,
        hash: u64,
    ) -> ChangeEvent<&'static str> {
        let mut event = ChangeEvent::default();
        Node::remove(root, mutator, &key, hash, 0, &mut event);
        event
    }

    fn lookup(root: &TestNode, key: u32, hash: u64) -> Option<&'static str> {
        root.find(&key, hash, 0).map(|entry| entry.value)
    }

    // =========================================================================
    // Bit indexing
    // =========================================================================

    #[rstest]
    #[case(0b11111, 0, 31)]
    #[case(0b11111 << 5, 5, 31)]
    #[case(0xF << 60, 60, 15)]
    #[case(0b10101 << 10, 10, 21)]
    fn test_fragment(#[case] hash: u64, #[case] shift: u32, #[case] expected: u32) {
        assert_eq!(fragment(hash, shift), expected);
    }

    #[rstest]
    fn test_packed_index_counts_bits_below() {
        let bitmap = 0b1011_0010;
        assert_eq!(packed_index(bitmap, bit_position(1)), 0);
        assert_eq!(packed_index(bitmap, bit_position(4)), 1);
        assert_eq!(packed_index(bitmap, bit_position(5)), 2);
        assert_eq!(packed_index(bitmap, bit_position(7)), 3);
        assert_eq!(packed_index(bitmap, bit_position(31)), 4);
    }

    #[rstest]
    fn test_max_depth_covers_all_levels() {
        assert_eq!(MAX_DEPTH, 14);
    }

    // =========================================================================
    // Update
    // =========================================================================

    #[rstest]
    fn test_insert_into_empty() {
        let mut root = new_root();
        assert_eq!(put(&mut root, None, 1, 7, "one"), ChangeEvent::Inserted);
        assert_eq!(lookup(&root, 1, 7), Some("one"));
        assert_eq!(root.check_invariants(0, true), 1);
    }

    #[rstest]
    fn test_replace_reports_old_value() {
        let mut root = new_root();
        put(&mut root, None, 1, 7, "one");
        assert_eq!(put(&mut root, None, 1, 7, "uno"), ChangeEvent::Replaced("one"));
        assert_eq!(lookup(&root, 1, 7), Some("uno"));
    }

    #[rstest]
    fn test_equal_value_is_unchanged_and_copies_nothing() {
        let mut root = new_root();
        put(&mut root, None, 1, 7, "one");
        let before = root.clone();
        assert_eq!(put(&mut root, None, 1, 7, "one"), ChangeEvent::Unchanged);
        assert!(ReferenceCounter::ptr_eq(&before, &root));
    }

    #[rstest]
    fn test_update_hands_back_equal_value_only() {
        let mut root = new_root();
        let mut event = ChangeEvent::default();
        assert_eq!(Node::update(&mut root, None, 1, "one", 7, 0, &mut event), None);
        assert_eq!(Node::update(&mut root, None, 1, "one", 7, 0, &mut event), Some("one"));
        let mut replaced = ChangeEvent::default();
        assert_eq!(Node::update(&mut root, None, 1, "uno", 7, 0, &mut replaced), None);
        assert_eq!(replaced, ChangeEvent::Replaced("one"));
    }

    #[rstest]
    fn test_owned_edit_never_touches_an_empty_root() {
        let token = Some(MutatorToken::new());
        let empty = new_root();
        let mut root = empty.clone();
        assert!(empty.owner().is_none());

        put(&mut root, token, 1, 1, "a");

        assert!(!ReferenceCounter::ptr_eq(&empty, &root));
        assert!(empty.entries().is_empty());
        assert!(root.owner() == token);
    }

    #[rstest]
    fn test_lookup_with_matching_fragment_but_other_key() {
        let mut root = new_root();
        put(&mut root, None, 1, 0b00001, "one");
        assert_eq!(lookup(&root, 2, 0b00001), None);
        assert_eq!(lookup(&root, 1, 0b100001), None);
    }

    /// Two hashes sharing the lowest `depth` fragments split exactly at
    /// level `depth`.
    #[rstest]
    fn test_partial_collision_at_every_depth(
        #[values(0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12)] depth: u32,
    ) {
        let shared = 0x0123_4567_89AB_CDEF_u64 & ((1_u64 << (depth * BITS_PER_LEVEL)) - 1);
        let first_hash = shared;
        let second_hash = shared | (1_u64 << (depth * BITS_PER_LEVEL));

        let mut root = new_root();
        assert_eq!(put(&mut root, None, 1, first_hash, "first"), ChangeEvent::Inserted);
        assert_eq!(put(&mut root, None, 2, second_hash, "second"), ChangeEvent::Inserted);

        assert_eq!(lookup(&root, 1, first_hash), Some("first"));
        assert_eq!(lookup(&root, 2, second_hash), Some("second"));
        assert_eq!(root.depth(), depth as usize + 1);
        assert_eq!(root.check_invariants(0, true), 2);

        assert_eq!(delete(&mut root, None, 1, first_hash), ChangeEvent::Removed("first"));
        assert_eq!(lookup(&root, 2, second_hash), Some("second"));
        assert_eq!(root.depth(), 1, "remaining entry is inlined back into the root");
        assert_eq!(root.check_invariants(0, true), 1);
    }

    #[rstest]
    fn test_full_collision_builds_bucket_at_last_level() {
        let hash = 0xDEAD_BEEF_u64;
        let mut root = new_root();
        for key in 1..=3 {
            assert_eq!(put(&mut root, None, key, hash, "v"), ChangeEvent::Inserted);
        }
        assert_eq!(root.depth(), MAX_DEPTH);
        assert_eq!(root.check_invariants(0, true), 3);
        for key in 1..=3 {
            assert_eq!(lookup(&root, key, hash), Some("v"));
        }
        assert_eq!(lookup(&root, 4, hash), None);
        assert_eq!(put(&mut root, None, 2, hash, "w"), ChangeEvent::Replaced("v"));
        assert_eq!(lookup(&root, 2, hash), Some("w"));
    }

    #[rstest]
    fn test_collision_bucket_collapses_to_direct_entry() {
        let hash = 0xCAFE_u64;
        let mut root = new_root();
        put(&mut root, None, 1, hash, "a");
        put(&mut root, None, 2, hash, "b");
        put(&mut root, None, 3, hash, "c");

        assert_eq!(delete(&mut root, None, 2, hash), ChangeEvent::Removed("b"));
        assert_eq!(root.depth(), MAX_DEPTH);
        assert_eq!(delete(&mut root, None, 1, hash), ChangeEvent::Removed("a"));
        assert_eq!(root.depth(), 1);
        assert_eq!(lookup(&root, 3, hash), Some("c"));
        assert_eq!(root.check_invariants(0, true), 1);
    }

    #[rstest]
    fn test_remove_missing_is_unchanged_and_copies_nothing() {
        let mut root = new_root();
        put(&mut root, None, 1, 1, "a");
        put(&mut root, None, 2, 33, "b");
        let before = root.clone();
        assert_eq!(delete(&mut root, None, 3, 65), ChangeEvent::Unchanged);
        assert_eq!(delete(&mut root, None, 3, 1), ChangeEvent::Unchanged);
        assert!(ReferenceCounter::ptr_eq(&before, &root));
    }

    #[rstest]
    fn test_remove_last_entry_leaves_empty_root() {
        let mut root = new_root();
        put(&mut root, None, 1, 1, "a");
        delete(&mut root, None, 1, 1);
        assert_eq!(root.check_invariants(0, true), 0);
        assert_eq!(lookup(&root, 1, 1), None);
    }

    // =========================================================================
    // Ownership
    // =========================================================================

    #[rstest]
    fn test_persistent_edit_copies_and_leaves_unowned() {
        let mut root = new_root();
        put(&mut root, None, 1, 1, "a");
        let snapshot = root.clone();
        put(&mut root, None, 2, 2, "b");

        assert!(!ReferenceCounter::ptr_eq(&snapshot, &root));
        assert_eq!(root.owner(), None);
        assert_eq!(lookup(&snapshot, 2, 2), None);
        assert_eq!(lookup(&root, 2, 2), Some("b"));
    }

    #[rstest]
    fn test_owned_node_is_edited_in_place() {
        let token = Some(MutatorToken::new());
        let mut root = new_root();

        put(&mut root, token, 1, 1, "a");
        assert_eq!(root.owner(), token);
        let address = ReferenceCounter::as_ptr(&root);

        put(&mut root, token, 2, 2, "b");
        put(&mut root, token, 1, 1, "c");
        delete(&mut root, token, 2, 2);
        assert_eq!(ReferenceCounter::as_ptr(&root), address);
        assert_eq!(lookup(&root, 1, 1), Some("c"));
    }

    #[rstest]
    fn test_foreign_token_forces_copy() {
        let first = Some(MutatorToken::new());
        let second = Some(MutatorToken::new());
        let mut root = new_root();
        put(&mut root, first, 1, 1, "a");
        let address = ReferenceCounter::as_ptr(&root);

        put(&mut root, second, 2, 2, "b");
        assert_ne!(ReferenceCounter::as_ptr(&root), address);
        assert_eq!(root.owner(), second);
    }

    #[rstest]
    fn test_shared_owned_node_is_still_copied() {
        let token = Some(MutatorToken::new());
        let mut root = new_root();
        put(&mut root, token, 1, 1, "a");
        let frozen = root.clone();

        put(&mut root, token, 2, 2, "b");
        assert!(!ReferenceCounter::ptr_eq(&frozen, &root));
        assert_eq!(lookup(&frozen, 2, 2), None);
        assert_eq!(lookup(&root, 2, 2), Some("b"));
    }

    #[rstest]
    fn test_copy_shares_untouched_children() {
        let mut root = new_root();
        // Slot 0 and slot 1 each get a sub-node.
        put(&mut root, None, 1, 0, "a");
        put(&mut root, None, 2, 32, "b");
        put(&mut root, None, 3, 1, "c");
        put(&mut root, None, 4, 33, "d");
        let snapshot = root.clone();

        put(&mut root, None, 5, 64, "e");

        let (Node::Bitmap(before), Node::Bitmap(after)) = (&*snapshot, &*root) else {
            panic!("root must be a bitmap node");
        };
        assert!(!ReferenceCounter::ptr_eq(&before.children[0], &after.children[0]));
        assert!(ReferenceCounter::ptr_eq(&before.children[1], &after.children[1]));
    }

    // =========================================================================
    // Model check against HashMap with a narrow hash space
    // =========================================================================

    #[rstest]
    fn test_mixed_operations_match_model() {
        let token = Some(MutatorToken::new());
        let mut root = new_root();
        let mut model: HashMap<u32, &'static str> = HashMap::new();
        let values = ["a", "b", "c"];
        let mut seed = 0x2545_F491_4F6C_DD1D_u64;

        for step in 0..4_000_u32 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let key = (seed % 300) as u32;
            // Spread keys over few distinct hashes to force deep paths and buckets.
            let hash = u64::from(key % 97).wrapping_mul(0x9E37_79B9_7F4A_7C15) & 0xFFFF_0000_0000_03FF;
            let mutator = if step % 3 == 0 { None } else { token };

            if seed % 4 == 0 {
                let expected = model.remove(&key);
                let event = delete(&mut root, mutator, key, hash);
                assert_eq!(event.into_old_value(), expected);
            } else {
                let value = values[(seed % 3) as usize];
                let previous = model.insert(key, value);
                let event = put(&mut root, mutator, key, hash, value);
                match previous {
                    None => assert_eq!(event, ChangeEvent::Inserted),
                    Some(old) if old == value => assert_eq!(event, ChangeEvent::Unchanged),
                    Some(old) => assert_eq!(event, ChangeEvent::Replaced(old)),
                }
            }
            assert_eq!(root.check_invariants(0, true), model.len());
        }

        for (key, value) in &model {
            let hash = u64::from(key % 97).wrapping_mul(0x9E37_79B9_7F4A_7C15) & 0xFFFF_0000_0000_03FF;
            assert_eq!(lookup(&root, *key, hash), Some(*value));
        }
    }
}
