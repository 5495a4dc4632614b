//! Persistent (immutable) ordered containers.
//!
//! This module provides the two containers of the library, both sorted by
//! a user-supplied total order and both using structural sharing:
//!
//! - [`PersistentOrderedMap`]: persistent ordered map (B+ tree)
//! - [`PersistentOrderedSet`]: persistent ordered set (based on the map)
//!
//! and their transient companions for batch mutation:
//!
//! - [`TransientOrderedMap`]
//! - [`TransientOrderedSet`]
//!
//! # Structural Sharing
//!
//! All operations on the persistent containers return new versions without
//! copying the entire structure; only the path from the root to the change
//! is replaced. A transient obtains a private edit token and mutates nodes
//! carrying that token in place, then seals back into a persistent value
//! in O(1) via `persistent()`.
//!
//! # Examples
//!
//! ## `PersistentOrderedMap`
//!
//! ```rust
//! use persimmon::persistent::PersistentOrderedMap;
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
//! let updated = map.insert(1, "ONE");
//! assert_eq!(map.get(&1), Some(&"one"));
//! assert_eq!(updated.get(&1), Some(&"ONE"));
//! ```
//!
//! ## `PersistentOrderedSet`
//!
//! ```rust
//! use persimmon::persistent::PersistentOrderedSet;
//!
//! let set = PersistentOrderedSet::new().insert(2).insert(1).insert(3);
//! assert!(set.contains(&1));
//!
//! let sorted: Vec<&i32> = set.iter().collect();
//! assert_eq!(sorted, vec![&1, &2, &3]);
//! ```
//!
//! ## Transients
//!
//! ```rust
//! use persimmon::persistent::PersistentOrderedMap;
//!
//! let map: PersistentOrderedMap<i32, i32> = (0..100).map(|k| (k, k * 2)).collect();
//!
//! let mut transient = map.transient();
//! for key in 0..50 {
//!     transient.remove(&key);
//! }
//! let trimmed = transient.persistent();
//!
//! assert_eq!(trimmed.len(), 50);
//! assert_eq!(map.len(), 100); // Original unchanged
//! ```

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled, this is `std::sync::Arc`,
/// which is thread-safe but has slightly higher overhead.
///
/// When the `arc` feature is disabled (default), this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod btree;
mod compare;
mod ordered_map;
mod ordered_set;

pub use compare::Comparator;
pub use compare::NaturalOrder;
pub use ordered_map::PersistentOrderedMap;
pub use ordered_map::PersistentOrderedMapIntoIterator;
pub use ordered_map::PersistentOrderedMapIterator;
pub use ordered_map::PersistentOrderedMapRangeIterator;
pub use ordered_map::TransientOrderedMap;
pub use ordered_set::PersistentOrderedSet;
pub use ordered_set::PersistentOrderedSetIntoIterator;
pub use ordered_set::PersistentOrderedSetIterator;
pub use ordered_set::PersistentOrderedSetRangeIterator;
pub use ordered_set::TransientOrderedSet;

// =============================================================================
// Tests
// =============================================================================
