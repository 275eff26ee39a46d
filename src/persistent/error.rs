//! Error types for cursors over transient collections.

use std::error::Error;
use std::fmt;

/// Errors raised by [`TransientHashMapCursor`](super::TransientHashMapCursor)
/// and [`TransientHashSetCursor`](super::TransientHashSetCursor).
///
/// All variants signal a broken usage contract; none of them is worth
/// retrying.
///
/// # Examples
///
/// ```rust
/// use trie_collections::persistent::{CursorError, TransientHashMap};
///
/// let mut map: TransientHashMap<i32, &str> = [(1, "one")].into_iter().collect();
/// let mut cursor = map.cursor();
///
/// assert_eq!(cursor.remove(&mut map), Err(CursorError::NoCurrentEntry));
///
/// cursor.advance(&map).unwrap();
/// map.insert(2, "two");
/// assert_eq!(
///     cursor.advance(&map),
///     Err(CursorError::ConcurrentModification { expected: 1, actual: 2 })
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    /// The collection was structurally modified through a channel other
    /// than the cursor's own `remove`.
    ConcurrentModification {
        /// Modification count the cursor last observed.
        expected: u64,
        /// Modification count the collection reports now.
        actual: u64,
    },

    /// The cursor was advanced past the last entry.
    Exhausted,

    /// `remove` was called before any successful `advance`, or twice for the
    /// same entry.
    NoCurrentEntry,
}

impl CursorError {
    /// Returns `true` for errors caused by calling an operation in a state
    /// where it is not allowed, as opposed to a concurrent modification.
    #[inline]
    #[must_use]
    pub const fn is_illegal_state(&self) -> bool {
        matches!(self, Self::Exhausted | Self::NoCurrentEntry)
    }
}

impl fmt::Display for CursorError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConcurrentModification { expected, actual } => {
                write!(
                    formatter,
                    "collection modified during iteration: expected modification count {expected}, found {actual}"
                )
            }
            Self::Exhausted => write!(formatter, "cursor has no more entries"),
            Self::NoCurrentEntry => {
                write!(formatter, "cursor has no current entry to remove")
            }
        }
    }
}

impl Error for CursorError {}
