//! Persistent hash collections with transient views.
//!
//! This module provides immutable collections built on a CHAMP trie, each
//! paired with a transient form for batched in-place edits:
//!
//! - [`PersistentHashMap`] / [`TransientHashMap`]
//! - [`PersistentHashSet`] / [`TransientHashSet`]
//!
//! # Structural Sharing
//!
//! Persistent collections never change after construction. An update copies
//! only the path from the root to the touched entry; every other node is
//! shared with the previous version.
//!
//! # Transients
//!
//! A transient edits in place the nodes it created itself and copies every
//! node it shares. Freezing it back with `to_persistent` is O(1) and hands
//! the current root to the persistent value; the transient forgets which
//! nodes it owned, so later edits never reach the frozen value.
//!
//! ```rust
//! use trie_collections::persistent::PersistentHashMap;
//!
//! let base: PersistentHashMap<i32, &str> = [(1, "one"), (2, "two")].into();
//!
//! let mut transient = base.to_transient();
//! transient.insert(3, "three");
//! transient.remove(&1);
//! let first = transient.to_persistent();
//!
//! transient.insert(4, "four");
//! let second = transient.persistent();
//!
//! assert_eq!(base.len(), 2);
//! assert_eq!(first.len(), 2);
//! assert_eq!(second.len(), 3);
//! assert!(first.contains_key(&3) && !first.contains_key(&4));
//! ```
//!
//! # Fail-fast Cursors
//!
//! ```rust
//! use trie_collections::persistent::{CursorError, TransientHashSet};
//!
//! let mut set: TransientHashSet<i32> = (0..4).collect();
//! let mut cursor = set.cursor();
//! cursor.advance(&set)?;
//!
//! set.insert(10);
//! assert!(matches!(
//!     cursor.advance(&set),
//!     Err(CursorError::ConcurrentModification { .. })
//! ));
//! # Ok::<(), CursorError>(())
//! ```

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled (default), this is `std::sync::Arc`,
/// which makes persistent collections `Send + Sync`.
///
/// When the `arc` feature is disabled, this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod change_event;
mod error;
mod hash;
mod hashmap;
mod hashset;
mod iter;
mod mutator;
mod node;

pub use change_event::ChangeEvent;
pub use error::CursorError;
pub use hashmap::PersistentHashMap;
pub use hashmap::TransientHashMap;
pub use hashmap::TransientHashMapCursor;
pub use hashset::PersistentHashSet;
pub use hashset::PersistentHashSetIntoIterator;
pub use hashset::PersistentHashSetIterator;
pub use hashset::TransientHashSet;
pub use hashset::TransientHashSetCursor;
pub use iter::PersistentHashMapIntoIterator;
pub use iter::PersistentHashMapIterator;
pub use mutator::MutatorToken;

// =============================================================================
// Tests
// =============================================================================
