//! Key hashing for the trie.
//!
//! The hasher is fixed at compile time:
//!
//! - feature `fxhash`: `rustc_hash::FxHasher`
//! - feature `ahash` (without `fxhash`): `ahash::AHasher` with fixed keys
//! - otherwise: `std::collections::hash_map::DefaultHasher`
//!
//! Every hasher is deterministic within a process, so the same key always
//! lands on the same trie path.

use std::hash::{Hash, Hasher};

#[cfg(feature = "fxhash")]
type KeyHasher = rustc_hash::FxHasher;

#[cfg(all(feature = "ahash", not(feature = "fxhash")))]
type KeyHasher = ahash::AHasher;

#[cfg(not(any(feature = "fxhash", feature = "ahash")))]
type KeyHasher = std::collections::hash_map::DefaultHasher;

/// Computes the 64-bit trie hash of a key.
#[inline]
pub(crate) fn compute_hash<Q: Hash + ?Sized>(key: &Q) -> u64 {
    let mut hasher = KeyHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Order-independent digest of a sequence of hashable items.
///
/// Wrapping addition commutes, so two collections holding the same items
/// produce the same digest whatever their iteration order.
pub(crate) fn combine_unordered<T: Hash, I: IntoIterator<Item = T>>(items: I) -> u64 {
    items
        .into_iter()
        .fold(0u64, |accumulator, item| {
            accumulator.wrapping_add(compute_hash(&item))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_hash_is_deterministic() {
        assert_eq!(compute_hash("key"), compute_hash("key"));
        assert_eq!(compute_hash(&42_u64), compute_hash(&42_u64));
    }

    #[rstest]
    fn test_borrowed_form_hashes_like_owned() {
        let owned = String::from("borrowed");
        assert_eq!(compute_hash(&owned), compute_hash("borrowed"));
    }

    #[rstest]
    fn test_combine_unordered_ignores_order() {
        let forward = combine_unordered([(1, 'a'), (2, 'b'), (3, 'c')]);
        let backward = combine_unordered([(3, 'c'), (1, 'a'), (2, 'b')]);
        assert_eq!(forward, backward);
    }

    #[rstest]
    fn test_combine_unordered_of_nothing_is_zero() {
        assert_eq!(combine_unordered(Vec::<i32>::new()), 0);
    }
}
