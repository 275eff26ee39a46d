//! Outcome records for trie updates and removals.

/// Describes what a single update or removal did to a trie.
///
/// Node operations take a `&mut ChangeEvent<V>` and fill it in; the
/// collection wrappers read it to maintain their length and modification
/// count. The event is scoped to one call and never stored.
///
/// # Examples
///
/// ```rust
/// use trie_collections::persistent::{ChangeEvent, TransientHashMap};
///
/// let mut transient = TransientHashMap::new();
/// assert_eq!(transient.insert_with_change("a", 1), ChangeEvent::Inserted);
/// assert_eq!(transient.insert_with_change("a", 2), ChangeEvent::Replaced(1));
/// assert_eq!(transient.insert_with_change("a", 2), ChangeEvent::Unchanged);
/// assert_eq!(transient.remove_with_change("a"), ChangeEvent::Removed(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChangeEvent<V> {
    /// Nothing changed: the key was absent on removal, or the same value
    /// was already stored on update.
    #[default]
    Unchanged,
    /// A new key was added.
    Inserted,
    /// An existing key received a different value; holds the old value.
    Replaced(V),
    /// A key was removed; holds its value.
    Removed(V),
}

impl<V> ChangeEvent<V> {
    /// Returns `true` if the trie structure or content changed.
    #[inline]
    #[must_use]
    pub const fn is_modified(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Returns `true` if an existing value was replaced or removed.
    #[inline]
    #[must_use]
    pub const fn has_replaced_value(&self) -> bool {
        matches!(self, Self::Replaced(_) | Self::Removed(_))
    }

    /// Returns the value that was stored before the call, if any.
    #[inline]
    #[must_use]
    pub const fn old_value(&self) -> Option<&V> {
        match self {
            Self::Replaced(value) | Self::Removed(value) => Some(value),
            Self::Unchanged | Self::Inserted => None,
        }
    }

    /// Consumes the event, returning the previous value, if any.
    #[inline]
    #[must_use]
    pub fn into_old_value(self) -> Option<V> {
        match self {
            Self::Replaced(value) | Self::Removed(value) => Some(value),
            Self::Unchanged | Self::Inserted => None,
        }
    }

    pub(crate) fn inserted(&mut self) {
        *self = Self::Inserted;
    }

    pub(crate) fn replaced(&mut self, old_value: V) {
        *self = Self::Replaced(old_value);
    }

    pub(crate) fn removed(&mut self, old_value: V) {
        *self = Self::Removed(old_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_default_is_unchanged() {
        let event: ChangeEvent<i32> = ChangeEvent::default();
        assert_eq!(event, ChangeEvent::Unchanged);
        assert!(!event.is_modified());
    }

    #[rstest]
    #[case(ChangeEvent::Unchanged, false, false, None)]
    #[case(ChangeEvent::Inserted, true, false, None)]
    #[case(ChangeEvent::Replaced(7), true, true, Some(7))]
    #[case(ChangeEvent::Removed(9), true, true, Some(9))]
    fn test_event_queries(
        #[case] event: ChangeEvent<i32>,
        #[case] modified: bool,
        #[case] replaced: bool,
        #[case] old: Option<i32>,
    ) {
        assert_eq!(event.is_modified(), modified);
        assert_eq!(event.has_replaced_value(), replaced);
        assert_eq!(event.old_value().copied(), old);
        assert_eq!(event.into_old_value(), old);
    }

    #[rstest]
    fn test_setters_overwrite_previous_state() {
        let mut event = ChangeEvent::default();
        event.inserted();
        assert_eq!(event, ChangeEvent::Inserted);
        event.replaced("old");
        assert_eq!(event, ChangeEvent::Replaced("old"));
        event.removed("gone");
        assert_eq!(event.old_value(), Some(&"gone"));
    }
}
