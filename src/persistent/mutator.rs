//! Ownership stamps for transient edits.
//!
//! A [`MutatorToken`] identifies one transient editing session. Trie nodes
//! created or copied during that session carry the token, which lets the
//! session edit them in place. Tokens are drawn from a process-wide counter
//! and are never reused, so a token that has been dropped by its transient
//! can never be claimed again by another one.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh token identities. Starts at 1 so tokens fit `NonZeroU64`.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a transient editing session.
///
/// Comparable by identity only: two tokens are equal exactly when they were
/// produced by the same call to [`MutatorToken::new`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutatorToken(NonZeroU64);

impl MutatorToken {
    /// Issues a token that differs from every token issued before.
    #[must_use]
    pub fn new() -> Self {
        let raw = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and would need 2^64 sessions to wrap.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Returns the raw identity, mainly for diagnostics.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0.get()
    }
}

impl Default for MutatorToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MutatorToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "MutatorToken(#{})", self.0)
    }
}
