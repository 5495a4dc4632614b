//! # persimmon
//!
//! Persistent (immutable) ordered containers backed by a copy-on-write
//! B+ tree, with transient companions for efficient batch mutation.
//!
//! ## Overview
//!
//! This library provides two containers sorted by a user-supplied total
//! order:
//!
//! - [`PersistentOrderedMap`]: an immutable ordered map from keys to values
//! - [`PersistentOrderedSet`]: an immutable ordered set of values
//!
//! Every mutating operation returns a new value while sharing structure
//! with the prior value; the prior value remains observable and unchanged.
//! Each container has a transient form ([`TransientOrderedMap`],
//! [`TransientOrderedSet`]) that batches in-place mutation against a
//! private edit token and seals back to an immutable value in O(1).
//!
//! ## Feature Flags
//!
//! - `arc`: use `Arc` instead of `Rc` for structural sharing (thread-safe)
//! - `serde`: serialization support for both containers
//!
//! ## Example
//!
//! ```rust
//! use persimmon::prelude::*;
//!
//! let map = PersistentOrderedMap::new()
//!     .insert(3, "three")
//!     .insert(1, "one")
//!     .insert(2, "two");
//!
//! // Entries are always in sorted key order
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&1, &2, &3]);
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert(2, "TWO");
//! assert_eq!(map.get(&2), Some(&"two"));
//! assert_eq!(updated.get(&2), Some(&"TWO"));
//! ```
//!
//! [`PersistentOrderedMap`]: persistent::PersistentOrderedMap
//! [`PersistentOrderedSet`]: persistent::PersistentOrderedSet
//! [`TransientOrderedMap`]: persistent::TransientOrderedMap
//! [`TransientOrderedSet`]: persistent::TransientOrderedSet

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: Disabling redundant_closure_for_method_calls due to clippy 0.1.92 panic bug
#![allow(clippy::redundant_closure_for_method_calls)]
// Note: proptest generates large arrays in property tests for nested types
#![cfg_attr(test, allow(clippy::large_stack_arrays))]

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types and traits.
///
/// # Usage
///
/// ```rust
/// use persimmon::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::KeyNotFound;
    pub use crate::persistent::*;
}

pub mod error;
pub mod persistent;
