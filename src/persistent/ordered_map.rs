//! Persistent (immutable) ordered map based on a copy-on-write B+ tree.
//!
//! This module provides [`PersistentOrderedMap`], an immutable map sorted
//! by a user-supplied total order, and [`TransientOrderedMap`], its
//! mutable companion for batched updates.
//!
//! # Overview
//!
//! `PersistentOrderedMap` keeps its entries in a B+ tree of order M
//! (default 32): all elements live in leaves, internal nodes carry
//! separator keys, and every update copies only the path from the root to
//! the change. It provides:
//!
//! - O(log N) get, insert, remove, update
//! - O(log N) lower/upper bound and range queries (plus output size)
//! - O(1) len, `is_empty`, clone
//! - O(N) iteration in key order, forward and backward
//!
//! All operations return new maps without modifying the original, and
//! structural sharing ensures memory efficiency. For a batch of updates,
//! obtain a [`TransientOrderedMap`] with [`transient`], apply the batch
//! in place, and seal it back with `persistent()` in O(1).
//!
//! # Examples
//!
//! ```rust
//! use persimmon::persistent::PersistentOrderedMap;
//!
//! let map = PersistentOrderedMap::new()
//!     .insert(3, "three")
//!     .insert(1, "one")
//!     .insert(2, "two");
//!
//! // Entries are always in sorted order
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&1, &2, &3]);
//!
//! // Range queries
//! let range: Vec<(&i32, &&str)> = map.range(1..3).collect();
//! assert_eq!(range.len(), 2); // 1 and 2
//! ```
//!
//! # Internal Structure
//!
//! The B+ tree maintains the following invariants:
//! 1. Keys across the leaf level are strictly increasing
//! 2. Every leaf sits at the same depth
//! 3. Every non-root node holds between ⌈M/2⌉ and M elements or children
//! 4. Each separator key equals the minimum key of its right subtree
//!
//! These invariants keep the tree height at O(log N).
//!
//! [`transient`]: PersistentOrderedMap::transient

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::RangeBounds;

use crate::error::KeyNotFound;

use super::btree::{EditToken, Tree, TreeIter};
use super::compare::{Comparator, NaturalOrder};

// =============================================================================
// PersistentOrderedMap Definition
// =============================================================================

/// A persistent (immutable) ordered map backed by a copy-on-write B+ tree.
///
/// `PersistentOrderedMap` is an immutable data structure that uses
/// structural sharing to efficiently support functional programming
/// patterns. Entries are kept sorted under the comparator `C`
/// ([`NaturalOrder`] by default, which uses the key type's [`Ord`]), and
/// `M` is the tree's fan-out.
///
/// Equivalent keys never coexist: inserting an existing key replaces its
/// value.
///
/// # Time Complexity
///
/// | Operation       | Complexity        |
/// |-----------------|-------------------|
/// | `new`           | O(1)              |
/// | `get`           | O(log N)          |
/// | `insert`        | O(log N)          |
/// | `remove`        | O(log N)          |
/// | `contains_key`  | O(log N)          |
/// | `min`/`max`     | O(log N)          |
/// | `lower_bound`   | O(log N)          |
/// | `range`         | O(log N + k)      |
/// | `len`           | O(1)              |
/// | `is_empty`      | O(1)              |
///
/// # Examples
///
/// ```rust
/// use persimmon::persistent::PersistentOrderedMap;
///
/// let map: PersistentOrderedMap<i32, &str> = PersistentOrderedMap::singleton(42, "answer");
/// assert_eq!(map.get(&42), Some(&"answer"));
///
/// // Ordered iteration
/// let map = PersistentOrderedMap::new()
///     .insert(3, "three")
///     .insert(1, "one")
///     .insert(2, "two");
///
/// let keys: Vec<&i32> = map.keys().collect();
/// assert_eq!(keys, vec![&1, &2, &3]);
/// ```
#[derive(Clone)]
pub struct PersistentOrderedMap<K, V, C = NaturalOrder, const M: usize = 32> {
    /// The underlying B+ tree
    tree: Tree<K, V, M>,
    /// The total order on keys, stored by value
    comparator: C,
}

impl<K, V, const M: usize> PersistentOrderedMap<K, V, NaturalOrder, M> {
    /// Creates a new empty map ordered by the key type's natural order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map: PersistentOrderedMap<i32, String> = PersistentOrderedMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tree: Tree::new(),
            comparator: NaturalOrder,
        }
    }
}

impl<K: Clone + Ord, V: Clone, const M: usize> PersistentOrderedMap<K, V, NaturalOrder, M> {
    /// Creates a map containing a single key-value pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::singleton(42, "answer");
    /// assert_eq!(map.len(), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::new().insert(key, value)
    }

    /// Builds a map from entries already strictly increasing by key, in
    /// a single O(N) bottom-up pass.
    ///
    /// The ordering precondition is debug-asserted. Unsorted input must
    /// go through [`FromIterator`] or a transient instead.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::from_sorted_iter((0..1000).map(|k| (k, k * 2)));
    /// assert_eq!(map.len(), 1000);
    /// assert_eq!(map.get(&500), Some(&1000));
    /// ```
    #[must_use]
    pub fn from_sorted_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let tree = Tree::from_sorted_entries(
            iter.into_iter().collect(),
            &EditToken::fresh(),
            &NaturalOrder,
        );
        Self {
            tree,
            comparator: NaturalOrder,
        }
    }
}

impl<K, V, C, const M: usize> PersistentOrderedMap<K, V, C, M> {
    /// Creates a new empty map ordered by `comparator`.
    ///
    /// The comparator is stored by value and carried into every derived
    /// map, transient, and iterator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::cmp::Ordering;
    /// use persimmon::persistent::{Comparator, PersistentOrderedMap};
    ///
    /// #[derive(Clone, Default)]
    /// struct Descending;
    ///
    /// impl Comparator<i32> for Descending {
    ///     fn compare(&self, left: &i32, right: &i32) -> Ordering {
    ///         right.cmp(left)
    ///     }
    /// }
    ///
    /// let map = PersistentOrderedMap::with_comparator(Descending)
    ///     .insert(1, "one")
    ///     .insert(2, "two");
    /// assert_eq!(map.keys().collect::<Vec<_>>(), vec![&2, &1]);
    /// ```
    #[inline]
    #[must_use]
    pub const fn with_comparator(comparator: C) -> Self {
        Self {
            tree: Tree::new(),
            comparator,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::new()
    ///     .insert(1, "one")
    ///     .insert(2, "two");
    /// assert_eq!(map.len(), 2);
    /// ```
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the map contains no entries.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let empty: PersistentOrderedMap<i32, String> = PersistentOrderedMap::new();
    /// assert!(empty.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns a reference to the stored comparator.
    #[inline]
    #[must_use]
    pub const fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Returns `true` if both maps share the same root node.
    ///
    /// Shared identity implies equality; the converse does not hold.
    /// Operations that do not change the map, such as removing an
    /// absent key, preserve identity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::singleton(1, "one");
    /// let unchanged = map.remove(&2);
    /// assert!(map.ptr_eq(&unchanged));
    /// assert!(!map.ptr_eq(&map.insert(2, "two")));
    /// ```
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.tree.same_root(&other.tree)
    }
}

// =============================================================================
// Lookup
// =============================================================================

impl<K, V, C, const M: usize> PersistentOrderedMap<K, V, C, M> {
    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, provided
    /// the comparator is implemented for the borrowed form (the default
    /// [`NaturalOrder`] is implemented for every `Ord` type).
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::new()
    ///     .insert("hello".to_string(), 42);
    ///
    /// // Can use &str to look up String keys
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        self.tree
            .get(key, &self.comparator)
            .map(|(_, value)| value)
    }

    /// Returns the stored key-value pair for the given key.
    ///
    /// Useful when the stored key itself matters, for example with
    /// comparators that treat distinct keys as equivalent.
    ///
    /// # Complexity
    ///
    /// O(log N)
    #[must_use]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        self.tree
            .get(key, &self.comparator)
            .map(|(stored, value)| (stored, value))
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::new().insert("key".to_string(), 42);
    ///
    /// assert!(map.contains_key("key"));
    /// assert!(!map.contains_key("other"));
    /// ```
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        self.get(key).is_some()
    }

    /// Returns a reference to the value for the key, or an error when
    /// the key is absent.
    ///
    /// This is the only failing lookup; every other operation signals
    /// absence with `None` or an exhausted iterator.
    ///
    /// # Errors
    ///
    /// Returns [`KeyNotFound`] if the key is not present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::error::KeyNotFound;
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::singleton(1, "one");
    /// assert_eq!(map.at(&1), Ok(&"one"));
    /// assert_eq!(map.at(&2), Err(KeyNotFound));
    /// ```
    pub fn at<Q>(&self, key: &Q) -> Result<&V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        self.get(key).ok_or(KeyNotFound)
    }

    /// Returns the entry with the minimum key.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::new()
    ///     .insert(3, "three")
    ///     .insert(1, "one");
    /// assert_eq!(map.min(), Some((&1, &"one")));
    /// ```
    #[must_use]
    pub fn min(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|(key, value)| (key, value))
    }

    /// Returns the entry with the maximum key.
    ///
    /// # Complexity
    ///
    /// O(log N)
    #[must_use]
    pub fn max(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|(key, value)| (key, value))
    }
}

// =============================================================================
// Iteration
// =============================================================================

impl<K, V, C, const M: usize> PersistentOrderedMap<K, V, C, M> {
    /// Returns a double-ended iterator over entries in sorted key order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::new()
    ///     .insert(3, "three")
    ///     .insert(1, "one")
    ///     .insert(2, "two");
    ///
    /// let forward: Vec<&i32> = map.iter().map(|(key, _)| key).collect();
    /// assert_eq!(forward, vec![&1, &2, &3]);
    ///
    /// let backward: Vec<&i32> = map.iter().rev().map(|(key, _)| key).collect();
    /// assert_eq!(backward, vec![&3, &2, &1]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentOrderedMapIterator<'_, K, V> {
        PersistentOrderedMapIterator {
            inner: self.tree.iter(),
        }
    }

    /// Returns an iterator over keys in sorted order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values in key order.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// Returns an iterator starting at the first entry whose key is
    /// greater than or equal to `key`, running to the end of the map.
    ///
    /// # Complexity
    ///
    /// O(log N) to position
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map: PersistentOrderedMap<i32, i32> = (0..10).map(|k| (k * 2, k)).collect();
    /// let mut bound = map.lower_bound(&7);
    /// assert_eq!(bound.next(), Some((&8, &4)));
    /// ```
    pub fn lower_bound<Q>(&self, key: &Q) -> PersistentOrderedMapRangeIterator<'_, K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        PersistentOrderedMapRangeIterator {
            inner: self.tree.iter_from_bound(key, false, &self.comparator),
        }
    }

    /// Returns an iterator starting at the first entry whose key is
    /// strictly greater than `key`, running to the end of the map.
    ///
    /// # Complexity
    ///
    /// O(log N) to position
    pub fn upper_bound<Q>(&self, key: &Q) -> PersistentOrderedMapRangeIterator<'_, K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        PersistentOrderedMapRangeIterator {
            inner: self.tree.iter_from_bound(key, true, &self.comparator),
        }
    }

    /// Returns an iterator over entries within the specified range.
    ///
    /// The range is specified using Rust's range syntax; an inverted
    /// range yields nothing.
    ///
    /// # Complexity
    ///
    /// O(log N + k) where k is the number of entries in the range
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map: PersistentOrderedMap<i32, i32> = (0..10).map(|k| (k, k * k)).collect();
    ///
    /// let keys: Vec<&i32> = map.range(2..=4).map(|(key, _)| key).collect();
    /// assert_eq!(keys, vec![&2, &3, &4]);
    /// ```
    pub fn range<Q, R>(&self, range: R) -> PersistentOrderedMapRangeIterator<'_, K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
        R: RangeBounds<Q>,
    {
        PersistentOrderedMapRangeIterator {
            inner: self.tree.iter_range(&range, &self.comparator),
        }
    }
}

// =============================================================================
// Modification
// =============================================================================

impl<K: Clone, V: Clone, C: Comparator<K> + Clone, const M: usize>
    PersistentOrderedMap<K, V, C, M>
{
    /// Inserts a key-value pair into the map.
    ///
    /// If the map already contains an equivalent key, the value is
    /// replaced and the size is unchanged; separator keys are untouched
    /// because the key itself does not change.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map1: PersistentOrderedMap<i32, &str> = PersistentOrderedMap::new().insert(1, "one");
    /// let map2 = map1.insert(1, "ONE");
    ///
    /// assert_eq!(map1.get(&1), Some(&"one")); // Original unchanged
    /// assert_eq!(map2.get(&1), Some(&"ONE")); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let mut tree = self.tree.clone();
        tree.insert(&EditToken::fresh(), key, value, &self.comparator);
        Self {
            tree,
            comparator: self.comparator.clone(),
        }
    }

    /// Removes a key from the map.
    ///
    /// Returns a new map without the key. If the key does not exist, the
    /// returned map shares the original root (same identity).
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::new()
    ///     .insert(1, "one")
    ///     .insert(2, "two");
    /// let removed = map.remove(&1);
    ///
    /// assert_eq!(map.len(), 2);     // Original unchanged
    /// assert_eq!(removed.len(), 1);
    /// assert_eq!(removed.get(&1), None);
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        if !self.contains_key(key) {
            return self.clone();
        }

        let mut tree = self.tree.clone();
        tree.remove(&EditToken::fresh(), key, &self.comparator);
        Self {
            tree,
            comparator: self.comparator.clone(),
        }
    }

    /// Applies a function to the value stored for `key`, inserting or
    /// replacing as directed.
    ///
    /// The function receives the current value when the key is present
    /// and `None` otherwise. Returning `Some(value)` inserts or replaces;
    /// returning `None` declines and leaves the map unchanged.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::singleton("hits".to_string(), 1);
    ///
    /// let bumped = map.update("hits".to_string(), |prior| {
    ///     Some(prior.copied().unwrap_or_default() + 1)
    /// });
    /// assert_eq!(bumped.get("hits"), Some(&2));
    ///
    /// let declined = bumped.update("misses".to_string(), |_| None);
    /// assert_eq!(declined.len(), 1);
    /// ```
    #[must_use]
    pub fn update<F>(&self, key: K, function: F) -> Self
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let prior = self.tree.get(&key, &self.comparator).map(|(_, value)| value);
        match function(prior) {
            Some(value) => self.insert(key, value),
            None => self.clone(),
        }
    }

    /// Applies a function to the value stored for `key` when present;
    /// a no-op when absent.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::singleton(1, 10);
    ///
    /// let doubled = map.update_if_exists(1, |value| value * 2);
    /// assert_eq!(doubled.get(&1), Some(&20));
    ///
    /// let untouched = map.update_if_exists(2, |value| value * 2);
    /// assert_eq!(untouched, map);
    /// ```
    #[must_use]
    pub fn update_if_exists<F>(&self, key: K, function: F) -> Self
    where
        F: FnOnce(&V) -> V,
    {
        match self.tree.get(&key, &self.comparator) {
            Some((_, value)) => {
                let replacement = function(value);
                self.insert(key, replacement)
            }
            None => self.clone(),
        }
    }

    /// Produces a mutable builder sharing this map's structure.
    ///
    /// The transient holds a fresh edit token: its first touch of any
    /// shared node copies it, after which the copy is edited in place
    /// for the rest of the batch.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedMap;
    ///
    /// let map = PersistentOrderedMap::new().insert(1, "one").insert(2, "two");
    ///
    /// let mut transient = map.transient();
    /// transient.insert(3, "three");
    /// transient.remove(&1);
    /// let edited = transient.persistent();
    ///
    /// assert_eq!(edited.len(), 2);
    /// assert_eq!(map.len(), 2); // Original unchanged
    /// ```
    #[must_use]
    pub fn transient(&self) -> TransientOrderedMap<K, V, C, M> {
        TransientOrderedMap {
            tree: self.tree.clone(),
            comparator: self.comparator.clone(),
            token: EditToken::fresh(),
        }
    }
}

// =============================================================================
// TransientOrderedMap Definition
// =============================================================================

/// A mutable builder for [`PersistentOrderedMap`].
///
/// A transient owns a private edit token. Nodes it has created are
/// edited in place; nodes still shared with persistent versions are
/// copied on first touch. Batching mutations through a transient
/// turns a sequence of O(log N) path copies into amortized in-place
/// updates, and `persistent()` seals the result in O(1).
///
/// Transients are single-owner: they are not `Clone`, mutation requires
/// `&mut self`, and the borrow checker rules out iterators overlapping a
/// mutation that would invalidate them. Lookups by key remain available
/// throughout.
///
/// # Examples
///
/// ```rust
/// use persimmon::persistent::{PersistentOrderedMap, TransientOrderedMap};
///
/// let mut transient = TransientOrderedMap::new();
/// for key in 0..100 {
///     transient.insert(key, key * 2);
/// }
/// let map: PersistentOrderedMap<i32, i32> = transient.persistent();
/// assert_eq!(map.len(), 100);
/// ```
pub struct TransientOrderedMap<K, V, C = NaturalOrder, const M: usize = 32> {
    tree: Tree<K, V, M>,
    comparator: C,
    token: EditToken,
}

impl<K, V, const M: usize> TransientOrderedMap<K, V, NaturalOrder, M> {
    /// Creates an empty transient ordered by the key type's natural
    /// order.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: Tree::new(),
            comparator: NaturalOrder,
            token: EditToken::fresh(),
        }
    }
}

impl<K, V, const M: usize> Default for TransientOrderedMap<K, V, NaturalOrder, M> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C, const M: usize> TransientOrderedMap<K, V, C, M> {
    /// Creates an empty transient ordered by `comparator`.
    #[inline]
    #[must_use]
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            tree: Tree::new(),
            comparator,
            token: EditToken::fresh(),
        }
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the transient contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns a reference to the value corresponding to the key.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        self.tree
            .get(key, &self.comparator)
            .map(|(_, value)| value)
    }

    /// Returns `true` if the transient contains a value for the key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        self.get(key).is_some()
    }

    /// Iterates the current state in sorted key order.
    ///
    /// The borrow ties the iterator to the transient: no mutation can
    /// happen while it is alive.
    #[must_use]
    pub fn iter(&self) -> PersistentOrderedMapIterator<'_, K, V> {
        PersistentOrderedMapIterator {
            inner: self.tree.iter(),
        }
    }
}

impl<K: Clone, V: Clone, C: Comparator<K>, const M: usize> TransientOrderedMap<K, V, C, M> {
    /// Inserts a key-value pair in place, replacing the value of an
    /// equivalent key.
    ///
    /// Returns `true` if the entry count grew.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.tree.insert(&self.token, key, value, &self.comparator)
    }

    /// Removes a key in place.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        if !self.contains_key(key) {
            return false;
        }
        self.tree.remove(&self.token, key, &self.comparator)
    }

    /// Applies a function to the value stored for `key`, inserting or
    /// replacing in place as directed; returning `None` declines.
    pub fn update<F>(&mut self, key: K, function: F)
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let replacement = {
            let prior = self.tree.get(&key, &self.comparator).map(|(_, value)| value);
            function(prior)
        };
        if let Some(value) = replacement {
            self.tree.insert(&self.token, key, value, &self.comparator);
        }
    }

    /// Seals the transient into an immutable map.
    ///
    /// O(1): the edit token is retired by dropping it, so nodes still
    /// tagged with it are frozen from here on.
    #[must_use]
    pub fn persistent(self) -> PersistentOrderedMap<K, V, C, M> {
        PersistentOrderedMap {
            tree: self.tree,
            comparator: self.comparator,
        }
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// A double-ended iterator over the entries of a
/// [`PersistentOrderedMap`] in sorted key order.
#[derive(Clone)]
pub struct PersistentOrderedMapIterator<'a, K, V> {
    inner: TreeIter<'a, K, V>,
}

impl<'a, K, V> Iterator for PersistentOrderedMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, value)| (key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for PersistentOrderedMapIterator<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(key, value)| (key, value))
    }
}

impl<K, V> ExactSizeIterator for PersistentOrderedMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.inner.exact_len()
    }
}

impl<K, V> std::iter::FusedIterator for PersistentOrderedMapIterator<'_, K, V> {}

/// A double-ended iterator over a key range of a
/// [`PersistentOrderedMap`], produced by [`range`], [`lower_bound`], or
/// [`upper_bound`].
///
/// [`range`]: PersistentOrderedMap::range
/// [`lower_bound`]: PersistentOrderedMap::lower_bound
/// [`upper_bound`]: PersistentOrderedMap::upper_bound
#[derive(Clone)]
pub struct PersistentOrderedMapRangeIterator<'a, K, V> {
    inner: TreeIter<'a, K, V>,
}

impl<'a, K, V> Iterator for PersistentOrderedMapRangeIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, value)| (key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for PersistentOrderedMapRangeIterator<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(key, value)| (key, value))
    }
}

impl<K, V> std::iter::FusedIterator for PersistentOrderedMapRangeIterator<'_, K, V> {}

/// An owning iterator over the entries of a [`PersistentOrderedMap`].
pub struct PersistentOrderedMapIntoIterator<K, V> {
    entries: Vec<(K, V)>,
    current_index: usize,
}

impl<K: Clone, V: Clone> Iterator for PersistentOrderedMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.entries.len() {
            None
        } else {
            let entry = self.entries[self.current_index].clone();
            self.current_index += 1;
            Some(entry)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entries.len().saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}

impl<K: Clone, V: Clone> ExactSizeIterator for PersistentOrderedMapIntoIterator<K, V> {
    fn len(&self) -> usize {
        self.entries.len().saturating_sub(self.current_index)
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V, C: Default, const M: usize> Default for PersistentOrderedMap<K, V, C, M> {
    #[inline]
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<K: Clone, V: Clone, C: Comparator<K> + Clone + Default, const M: usize> FromIterator<(K, V)>
    for PersistentOrderedMap<K, V, C, M>
{
    /// Builds the map by inserting every entry through one transient,
    /// then sealing.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut transient = TransientOrderedMap::with_comparator(C::default());
        for (key, value) in iter {
            transient.insert(key, value);
        }
        transient.persistent()
    }
}

impl<K: Clone, V: Clone, C, const M: usize> IntoIterator for PersistentOrderedMap<K, V, C, M> {
    type Item = (K, V);
    type IntoIter = PersistentOrderedMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        PersistentOrderedMapIntoIterator {
            entries,
            current_index: 0,
        }
    }
}

impl<'a, K, V, C, const M: usize> IntoIterator for &'a PersistentOrderedMap<K, V, C, M> {
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentOrderedMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, C, const M: usize> PartialEq for PersistentOrderedMap<K, V, C, M>
where
    V: PartialEq,
    C: Comparator<K>,
{
    /// Maps are equal when they have the same size and their entries in
    /// order are pairwise equivalent under `self`'s comparator, with
    /// equal values. Comparing maps whose comparators disagree is
    /// elementwise and will generally report unequal.
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        // Shared structure: identical roots hold identical entries.
        if self.tree.same_root(&other.tree) {
            return true;
        }
        self.iter()
            .zip(other.iter())
            .all(|((self_key, self_value), (other_key, other_value))| {
                self.comparator.compare(self_key, other_key) == Ordering::Equal
                    && self_value == other_value
            })
    }
}

impl<K, V, C, const M: usize> Eq for PersistentOrderedMap<K, V, C, M>
where
    V: Eq,
    C: Comparator<K>,
{
}

/// Computes a hash value for this map.
///
/// The hash covers the length and then each entry in key order, so
/// insertion order never affects the hash and equal maps hash equally.
impl<K, V, C, const M: usize> Hash for PersistentOrderedMap<K, V, C, M>
where
    K: Hash,
    V: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for (key, value) in self {
            key.hash(state);
            value.hash(state);
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C, const M: usize> fmt::Debug
    for PersistentOrderedMap<K, V, C, M>
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: fmt::Display, V: fmt::Display, C, const M: usize> fmt::Display
    for PersistentOrderedMap<K, V, C, M>
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        let mut first = true;
        for (key, value) in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{key}: {value}")?;
        }
        write!(formatter, "}}")
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<K, V, C, const M: usize> serde::Serialize for PersistentOrderedMap<K, V, C, M>
where
    K: serde::Serialize,
    V: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentOrderedMapVisitor<K, V, C, const M: usize> {
    marker: std::marker::PhantomData<(K, V, C)>,
}

#[cfg(feature = "serde")]
impl<'de, K, V, C, const M: usize> serde::de::Visitor<'de>
    for PersistentOrderedMapVisitor<K, V, C, M>
where
    K: serde::Deserialize<'de> + Clone,
    V: serde::Deserialize<'de> + Clone,
    C: Comparator<K> + Clone + Default,
{
    type Value = PersistentOrderedMap<K, V, C, M>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        // Note: inserting through a transient keeps memory usage gradual
        // even for large inputs.
        let mut transient = TransientOrderedMap::with_comparator(C::default());
        while let Some((key, value)) = access.next_entry()? {
            transient.insert(key, value);
        }
        Ok(transient.persistent())
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V, C, const M: usize> serde::Deserialize<'de> for PersistentOrderedMap<K, V, C, M>
where
    K: serde::Deserialize<'de> + Clone,
    V: serde::Deserialize<'de> + Clone,
    C: Comparator<K> + Clone + Default,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(PersistentOrderedMapVisitor {
            marker: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
