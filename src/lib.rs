//! # trie-collections
//!
//! Persistent hash collections built on a CHAMP trie, each paired with a
//! transient view for amortized batch updates.
//!
//! ## Overview
//!
//! - **Persistent collections**: [`PersistentHashMap`](persistent::PersistentHashMap)
//!   and [`PersistentHashSet`](persistent::PersistentHashSet). Every update
//!   returns a new value sharing unmodified subtrees with the old one.
//! - **Transient views**: [`TransientHashMap`](persistent::TransientHashMap)
//!   and [`TransientHashSet`](persistent::TransientHashSet). Nodes stamped
//!   with the transient's mutator token are edited in place; conversion in
//!   both directions is O(1).
//! - **Fail-fast cursors**: detached cursors over transients that support
//!   removal and detect modifications made behind their back.
//!
//! ## Feature Flags
//!
//! - `arc` (default): share nodes through `Arc`, making persistent
//!   collections `Send + Sync`; without it `Rc` is used
//! - `serde`: `Serialize`/`Deserialize` for persistent collections
//! - `fxhash`: hash keys with `rustc_hash::FxHasher`
//! - `ahash`: hash keys with `ahash::AHasher`
//!
//! ## Example
//!
//! ```rust
//! use trie_collections::prelude::*;
//!
//! let map: PersistentHashMap<&str, i32> = [("a", 1), ("b", 2)].into();
//! let mut transient = map.to_transient();
//! transient.insert("c", 3);
//! let updated = transient.persistent();
//!
//! assert_eq!(map.len(), 2);
//! assert_eq!(updated.len(), 3);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```rust
/// use trie_collections::prelude::*;
/// ```
pub mod prelude {
    pub use crate::persistent::*;
}

pub mod persistent;
