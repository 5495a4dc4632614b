//! Error types for the persistent ordered containers.
//!
//! The engine raises exactly one error:
//! [`KeyNotFound`], returned by
//! [`PersistentOrderedMap::at`](crate::persistent::PersistentOrderedMap::at)
//! when the requested key is absent. All other lookups signal absence by
//! returning `None` or an exhausted iterator.

use thiserror::Error;

/// The requested key is not present in the map.
///
/// Returned by
/// [`PersistentOrderedMap::at`](crate::persistent::PersistentOrderedMap::at).
///
/// # Examples
///
/// ```rust
/// use persimmon::error::KeyNotFound;
/// use persimmon::persistent::PersistentOrderedMap;
///
/// let map = PersistentOrderedMap::singleton(1, "one");
/// assert_eq!(map.at(&2), Err(KeyNotFound));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("key not found in persistent ordered map")]
pub struct KeyNotFound;
