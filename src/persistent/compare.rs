//! Key ordering as a value parameter.
//!
//! Both containers are sorted by a comparator *value* stored inside each
//! tree, not by a type-level bound alone. The default comparator,
//! [`NaturalOrder`], delegates to [`Ord`] and is implemented for every
//! comparable type, so borrowed-form lookups (for example `&str` against
//! `String` keys) work without conversions.
//!
//! # Examples
//!
//! ```rust
//! use std::cmp::Ordering;
//! use persimmon::persistent::{Comparator, PersistentOrderedMap};
//!
//! /// Orders integers descending.
//! #[derive(Clone, Default)]
//! struct Descending;
//!
//! impl Comparator<i32> for Descending {
//!     fn compare(&self, left: &i32, right: &i32) -> Ordering {
//!         right.cmp(left)
//!     }
//! }
//!
//! let map = PersistentOrderedMap::with_comparator(Descending)
//!     .insert(1, "one")
//!     .insert(3, "three")
//!     .insert(2, "two");
//!
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&3, &2, &1]);
//! ```

use std::cmp::Ordering;

/// A strict weak ordering over keys of type `K`.
///
/// Implementations must be consistent: for any `a`, `b`, `c`,
/// `compare(a, b)` must be the inverse of `compare(b, a)`, and
/// `compare(a, b) == Less && compare(b, c) == Less` must imply
/// `compare(a, c) == Less`. Keys for which `compare` returns
/// [`Ordering::Equal`] are treated as the same key: the containers never
/// hold two equivalent keys at once.
///
/// The comparator is stored by value inside each tree, so it may carry
/// state (a collation table, a sort direction flag), but mutating shared
/// state while a tree is alive violates the ordering contract.
pub trait Comparator<K: ?Sized> {
    /// Compares two keys.
    fn compare(&self, left: &K, right: &K) -> Ordering;
}

/// The default comparator: the natural [`Ord`] order of the key type.
///
/// Implemented for every `K: Ord + ?Sized`, which lets lookups accept any
/// borrowed form of the stored key (for example `&str` for `String` keys).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NaturalOrder;

impl<K: Ord + ?Sized> Comparator<K> for NaturalOrder {
    #[inline]
    fn compare(&self, left: &K, right: &K) -> Ordering {
        left.cmp(right)
    }
}
