//! Depth-first trie traversal.
//!
//! Both walkers keep a stack of `(node, position)` back-links, one frame per
//! trie level. For a bitmap node the position is the next slot to inspect;
//! for a collision bucket it is the next entry index. Slots are visited in
//! ascending order with direct entries and sub-nodes interleaved, so the
//! relative order of the remaining entries survives removals: inlining a
//! sub-node puts its last entry on the very slot the sub-node occupied.
//!
//! - [`PersistentHashMapIterator`] borrows the nodes and backs `iter()`.
//! - [`Walker`] holds reference-counted nodes, so it can outlive a borrow of
//!   the collection. Cursors and owning iterators are built on it.

use std::borrow::Borrow;
use std::iter::FusedIterator;

use smallvec::SmallVec;

use super::ReferenceCounter;
use super::node::{BITS_PER_LEVEL, BitmapNode, MAX_DEPTH, Node, bit_position, fragment, packed_index};

/// First occupied slot of `bitmap` at or after `from`.
#[inline]
fn next_occupied_slot<K, V>(bitmap: &BitmapNode<K, V>, from: u32) -> Option<u32> {
    let remaining = (bitmap.data_map | bitmap.node_map) & u32::MAX.checked_shl(from).unwrap_or(0);
    (remaining != 0).then(|| remaining.trailing_zeros())
}

/// `true` if a frame positioned at `position` still has something to visit.
#[inline]
fn frame_has_more<K, V>(node: &Node<K, V>, position: u32) -> bool {
    match node {
        Node::Bitmap(bitmap) => next_occupied_slot(bitmap, position).is_some(),
        Node::Collision(collision) => (position as usize) < collision.entries.len(),
    }
}

// =============================================================================
// Borrowing iterator
// =============================================================================

/// An iterator over the key-value pairs of a map, in trie order.
pub struct PersistentHashMapIterator<'a, K, V> {
    stack: SmallVec<[(&'a Node<K, V>, u32); MAX_DEPTH]>,
    remaining: usize,
}

impl<'a, K, V> PersistentHashMapIterator<'a, K, V> {
    pub(crate) fn new(root: &'a Node<K, V>, length: usize) -> Self {
        let mut stack = SmallVec::new();
        if length > 0 {
            stack.push((root, 0));
        }
        Self {
            stack,
            remaining: length,
        }
    }
}

impl<'a, K, V> Iterator for PersistentHashMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let node = frame.0;
            match node {
                Node::Bitmap(bitmap) => {
                    let Some(slot) = next_occupied_slot(bitmap, frame.1) else {
                        self.stack.pop();
                        continue;
                    };
                    frame.1 = slot + 1;
                    let bit = bit_position(slot);
                    if bitmap.data_map & bit != 0 {
                        let entry = &bitmap.entries[packed_index(bitmap.data_map, bit)];
                        self.remaining -= 1;
                        return Some((&entry.key, &entry.value));
                    }
                    let child = &*bitmap.children[packed_index(bitmap.node_map, bit)];
                    self.stack.push((child, 0));
                }
                Node::Collision(collision) => {
                    let Some(entry) = collision.entries.get(frame.1 as usize) else {
                        self.stack.pop();
                        continue;
                    };
                    frame.1 += 1;
                    self.remaining -= 1;
                    return Some((&entry.key, &entry.value));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for PersistentHashMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for PersistentHashMapIterator<'_, K, V> {}

impl<K, V> Clone for PersistentHashMapIterator<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            stack: self.stack.clone(),
            remaining: self.remaining,
        }
    }
}

// =============================================================================
// Detached walker
// =============================================================================

/// Depth-first walker over reference-counted nodes.
///
/// Yields `(node, index)` locations: the entry is `node.entries()[index]`.
/// Holding the nodes keeps them alive but also makes them shared, so a
/// walker must be cleared before its collection edits in place.
pub(crate) struct Walker<K, V> {
    stack: SmallVec<[(ReferenceCounter<Node<K, V>>, u32); MAX_DEPTH]>,
}

enum Step<K, V> {
    Pop,
    Descend(ReferenceCounter<Node<K, V>>),
    Yield(ReferenceCounter<Node<K, V>>, usize),
}

impl<K, V> Walker<K, V> {
    /// A walker with nothing left to visit.
    pub(crate) fn empty() -> Self {
        Self {
            stack: SmallVec::new(),
        }
    }

    /// A walker positioned before the first entry of `root`.
    pub(crate) fn new(root: &ReferenceCounter<Node<K, V>>) -> Self {
        let mut walker = Self::empty();
        walker.stack.push((ReferenceCounter::clone(root), 0));
        walker
    }

    /// A walker whose next entry is `key`, which must be present in `root`.
    ///
    /// Entries before `key` in trie order are skipped; entries after it are
    /// visited exactly as a walker started from the root would visit them.
    pub(crate) fn seek<Q>(root: &ReferenceCounter<Node<K, V>>, key: &Q, hash: u64) -> Self
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut walker = Self::empty();
        let mut node = ReferenceCounter::clone(root);
        let mut shift = 0;
        loop {
            let (position, child) = match &*node {
                Node::Bitmap(bitmap) => {
                    let slot = fragment(hash, shift);
                    let bit = bit_position(slot);
                    if bitmap.node_map & bit == 0 {
                        (slot, None)
                    } else {
                        let child = &bitmap.children[packed_index(bitmap.node_map, bit)];
                        (slot + 1, Some(ReferenceCounter::clone(child)))
                    }
                }
                Node::Collision(collision) => {
                    let index = collision
                        .entries
                        .iter()
                        .position(|entry| entry.key.borrow() == key)
                        .unwrap_or(collision.entries.len());
                    (index as u32, None)
                }
            };
            walker.stack.push((node, position));
            match child {
                Some(child) => {
                    node = child;
                    shift += BITS_PER_LEVEL;
                }
                None => return walker,
            }
        }
    }

    /// `true` if another entry remains.
    pub(crate) fn has_next(&self) -> bool {
        self.stack
            .iter()
            .any(|(node, position)| frame_has_more(node, *position))
    }

    /// Drops every held node.
    pub(crate) fn clear(&mut self) {
        self.stack.clear();
    }

    /// Moves to the next entry and returns its location.
    pub(crate) fn next_location(&mut self) -> Option<(ReferenceCounter<Node<K, V>>, usize)> {
        loop {
            let step = {
                let (node, position) = self.stack.last_mut()?;
                match &**node {
                    Node::Bitmap(bitmap) => match next_occupied_slot(bitmap, *position) {
                        None => Step::Pop,
                        Some(slot) => {
                            *position = slot + 1;
                            let bit = bit_position(slot);
                            if bitmap.data_map & bit != 0 {
                                Step::Yield(
                                    ReferenceCounter::clone(node),
                                    packed_index(bitmap.data_map, bit),
                                )
                            } else {
                                let child = &bitmap.children[packed_index(bitmap.node_map, bit)];
                                Step::Descend(ReferenceCounter::clone(child))
                            }
                        }
                    },
                    Node::Collision(collision) => {
                        let index = *position as usize;
                        if index < collision.entries.len() {
                            *position += 1;
                            Step::Yield(ReferenceCounter::clone(node), index)
                        } else {
                            Step::Pop
                        }
                    }
                }
            };
            match step {
                Step::Pop => {
                    self.stack.pop();
                }
                Step::Descend(child) => self.stack.push((child, 0)),
                Step::Yield(node, index) => return Some((node, index)),
            }
        }
    }
}

impl<K, V> Clone for Walker<K, V> {
    fn clone(&self) -> Self {
        Self {
            stack: self.stack.clone(),
        }
    }
}

impl<K, V> Default for Walker<K, V> {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// Owning iterator
// =============================================================================

/// An owning iterator over the key-value pairs of a map.
///
/// Entries are cloned out of the trie, which may still be shared with
/// other collections.
pub struct PersistentHashMapIntoIterator<K, V> {
    walker: Walker<K, V>,
    remaining: usize,
}

impl<K, V> PersistentHashMapIntoIterator<K, V> {
    pub(crate) fn new(root: &ReferenceCounter<Node<K, V>>, length: usize) -> Self {
        let walker = if length == 0 {
            Walker::empty()
        } else {
            Walker::new(root)
        };
        Self {
            walker,
            remaining: length,
        }
    }
}

impl<K: Clone, V: Clone> Iterator for PersistentHashMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, index) = self.walker.next_location()?;
        self.remaining -= 1;
        let entry = &node.entries()[index];
        Some((entry.key.clone(), entry.value.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: Clone, V: Clone> ExactSizeIterator for PersistentHashMapIntoIterator<K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K: Clone, V: Clone> FusedIterator for PersistentHashMapIntoIterator<K, V> {}
