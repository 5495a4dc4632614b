//! Persistent (immutable) ordered set based on [`PersistentOrderedMap`].
//!
//! This module provides [`PersistentOrderedSet`], an immutable sorted set
//! that uses [`PersistentOrderedMap`] internally, and
//! [`TransientOrderedSet`], its mutable companion for batched updates.
//!
//! # Overview
//!
//! `PersistentOrderedSet` is a wrapper around
//! `PersistentOrderedMap<T, ()>` that stores each element as a key with
//! a unit value, inheriting the map's B+ tree: O(log N) membership,
//! insertion and removal, O(1) clone, and ordered iteration in both
//! directions.
//!
//! # Examples
//!
//! ```rust
//! use persimmon::persistent::PersistentOrderedSet;
//!
//! let set = PersistentOrderedSet::new().insert(3).insert(1).insert(2);
//! assert!(set.contains(&1));
//!
//! // Elements are always in sorted order
//! let sorted: Vec<&i32> = set.iter().collect();
//! assert_eq!(sorted, vec![&1, &2, &3]);
//!
//! // Structural sharing: the original set is preserved
//! let extended = set.insert(4);
//! assert_eq!(set.len(), 3);
//! assert_eq!(extended.len(), 4);
//!
//! // Set operations
//! let other: PersistentOrderedSet<i32> = [2, 3, 4].into_iter().collect();
//! assert_eq!(set.union(&other).len(), 4);        // {1, 2, 3, 4}
//! assert_eq!(set.intersection(&other).len(), 2); // {2, 3}
//! ```

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::RangeBounds;

use super::compare::{Comparator, NaturalOrder};
use super::ordered_map::{
    PersistentOrderedMap, PersistentOrderedMapIterator, PersistentOrderedMapRangeIterator,
    TransientOrderedMap,
};

// =============================================================================
// PersistentOrderedSet Definition
// =============================================================================

/// A persistent (immutable) ordered set based on [`PersistentOrderedMap`].
///
/// Each element serves as its own key under the comparator `C`;
/// equivalent elements never coexist.
///
/// # Time Complexity
///
/// | Operation      | Complexity   |
/// |----------------|--------------|
/// | `new`          | O(1)         |
/// | `contains`     | O(log N)     |
/// | `insert`       | O(log N)     |
/// | `remove`       | O(log N)     |
/// | `min`/`max`    | O(log N)     |
/// | `range`        | O(log N + k) |
/// | `len`          | O(1)         |
///
/// # Examples
///
/// ```rust
/// use persimmon::persistent::PersistentOrderedSet;
///
/// let set = PersistentOrderedSet::singleton(42);
/// assert!(set.contains(&42));
/// assert_eq!(set.len(), 1);
/// ```
#[derive(Clone)]
pub struct PersistentOrderedSet<T, C = NaturalOrder, const M: usize = 32> {
    inner: PersistentOrderedMap<T, (), C, M>,
}

impl<T, const M: usize> PersistentOrderedSet<T, NaturalOrder, M> {
    /// Creates a new empty set ordered by the element type's natural
    /// order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedSet;
    ///
    /// let set: PersistentOrderedSet<i32> = PersistentOrderedSet::new();
    /// assert!(set.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: PersistentOrderedMap::new(),
        }
    }
}

impl<T: Clone + Ord, const M: usize> PersistentOrderedSet<T, NaturalOrder, M> {
    /// Creates a set containing a single element.
    #[inline]
    #[must_use]
    pub fn singleton(element: T) -> Self {
        Self {
            inner: PersistentOrderedMap::singleton(element, ()),
        }
    }

    /// Builds a set from elements already strictly increasing, in a
    /// single O(N) bottom-up pass.
    ///
    /// The ordering precondition is debug-asserted. Unsorted input must
    /// go through [`FromIterator`] or a transient instead.
    #[must_use]
    pub fn from_sorted_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        Self {
            inner: PersistentOrderedMap::from_sorted_iter(
                iter.into_iter().map(|element| (element, ())),
            ),
        }
    }
}

impl<T, C, const M: usize> PersistentOrderedSet<T, C, M> {
    /// Creates a new empty set ordered by `comparator`.
    #[inline]
    #[must_use]
    pub const fn with_comparator(comparator: C) -> Self {
        Self {
            inner: PersistentOrderedMap::with_comparator(comparator),
        }
    }

    /// Returns the number of elements in the set.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the set contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns a reference to the stored comparator.
    #[inline]
    #[must_use]
    pub const fn comparator(&self) -> &C {
        self.inner.comparator()
    }

    /// Returns `true` if both sets share the same root node.
    ///
    /// Shared identity implies equality; the converse does not hold.
    /// Operations that do not change the set, such as inserting a
    /// present element or removing an absent one, preserve identity.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }

    /// Returns `true` if the set contains an element equivalent to
    /// `element`.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedSet;
    ///
    /// let set = PersistentOrderedSet::new().insert("key".to_string());
    ///
    /// // Can use &str to look up String elements
    /// assert!(set.contains("key"));
    /// assert!(!set.contains("other"));
    /// ```
    #[must_use]
    pub fn contains<Q>(&self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        self.inner.contains_key(element)
    }

    /// Returns a reference to the stored element equivalent to
    /// `element`.
    ///
    /// Useful with comparators that treat distinct elements as
    /// equivalent.
    ///
    /// # Complexity
    ///
    /// O(log N)
    #[must_use]
    pub fn get<Q>(&self, element: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        self.inner.get_key_value(element).map(|(stored, ())| stored)
    }

    /// Returns the minimum element.
    ///
    /// # Complexity
    ///
    /// O(log N)
    #[must_use]
    pub fn min(&self) -> Option<&T> {
        self.inner.min().map(|(element, ())| element)
    }

    /// Returns the maximum element.
    ///
    /// # Complexity
    ///
    /// O(log N)
    #[must_use]
    pub fn max(&self) -> Option<&T> {
        self.inner.max().map(|(element, ())| element)
    }

    /// Returns a double-ended iterator over the elements in sorted
    /// order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedSet;
    ///
    /// let set: PersistentOrderedSet<i32> = [3, 1, 2].into_iter().collect();
    /// let forward: Vec<&i32> = set.iter().collect();
    /// assert_eq!(forward, vec![&1, &2, &3]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentOrderedSetIterator<'_, T> {
        PersistentOrderedSetIterator {
            inner: self.inner.iter(),
        }
    }

    /// Returns an iterator starting at the first element greater than
    /// or equal to `element`, running to the end of the set.
    ///
    /// # Complexity
    ///
    /// O(log N) to position
    pub fn lower_bound<Q>(&self, element: &Q) -> PersistentOrderedSetRangeIterator<'_, T>
    where
        T: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        PersistentOrderedSetRangeIterator {
            inner: self.inner.lower_bound(element),
        }
    }

    /// Returns an iterator starting at the first element strictly
    /// greater than `element`, running to the end of the set.
    ///
    /// # Complexity
    ///
    /// O(log N) to position
    pub fn upper_bound<Q>(&self, element: &Q) -> PersistentOrderedSetRangeIterator<'_, T>
    where
        T: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        PersistentOrderedSetRangeIterator {
            inner: self.inner.upper_bound(element),
        }
    }

    /// Returns an iterator over the elements within the specified
    /// range.
    ///
    /// # Complexity
    ///
    /// O(log N + k) where k is the number of elements in the range
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedSet;
    ///
    /// let set: PersistentOrderedSet<i32> = (0..10).collect();
    /// let window: Vec<&i32> = set.range(3..=5).collect();
    /// assert_eq!(window, vec![&3, &4, &5]);
    /// ```
    pub fn range<Q, R>(&self, range: R) -> PersistentOrderedSetRangeIterator<'_, T>
    where
        T: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
        R: RangeBounds<Q>,
    {
        PersistentOrderedSetRangeIterator {
            inner: self.inner.range(range),
        }
    }
}

// =============================================================================
// Modification
// =============================================================================

impl<T: Clone, C: Comparator<T> + Clone, const M: usize> PersistentOrderedSet<T, C, M> {
    /// Inserts an element into the set.
    ///
    /// If an equivalent element is already present the returned set
    /// shares the original root (same identity): the stored element is
    /// kept.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedSet;
    ///
    /// let set = PersistentOrderedSet::new().insert(1);
    /// let same = set.insert(1);
    ///
    /// assert_eq!(set.len(), 1);
    /// assert_eq!(same.len(), 1);
    /// ```
    #[must_use]
    pub fn insert(&self, element: T) -> Self {
        if self.contains(&element) {
            return self.clone();
        }
        Self {
            inner: self.inner.insert(element, ()),
        }
    }

    /// Removes an element from the set.
    ///
    /// If the element is absent the returned set shares the original
    /// root (same identity).
    ///
    /// # Complexity
    ///
    /// O(log N)
    #[must_use]
    pub fn remove<Q>(&self, element: &Q) -> Self
    where
        T: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        Self {
            inner: self.inner.remove(element),
        }
    }

    /// Produces a mutable builder sharing this set's structure.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedSet;
    ///
    /// let set: PersistentOrderedSet<i32> = (0..10).collect();
    /// let mut transient = set.transient();
    /// for element in 0..5 {
    ///     transient.remove(&element);
    /// }
    /// let trimmed = transient.persistent();
    ///
    /// assert_eq!(trimmed.len(), 5);
    /// assert_eq!(set.len(), 10);
    /// ```
    #[must_use]
    pub fn transient(&self) -> TransientOrderedSet<T, C, M> {
        TransientOrderedSet {
            inner: self.inner.transient(),
        }
    }

    /// Returns the union of two sets.
    ///
    /// On equivalent elements the one stored in `self` wins.
    ///
    /// # Complexity
    ///
    /// O(m log(n + m)) where n is the size of `self` and m the size of
    /// `other`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persimmon::persistent::PersistentOrderedSet;
    ///
    /// let left: PersistentOrderedSet<i32> = [1, 2, 3].into_iter().collect();
    /// let right: PersistentOrderedSet<i32> = [3, 4].into_iter().collect();
    /// let union = left.union(&right);
    /// assert_eq!(union.iter().collect::<Vec<_>>(), vec![&1, &2, &3, &4]);
    /// ```
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut transient = self.transient();
        for element in other {
            if !transient.contains(element) {
                transient.insert(element.clone());
            }
        }
        transient.persistent()
    }

    /// Returns the set of elements present in both sets.
    ///
    /// Elements are taken from `self`.
    ///
    /// # Complexity
    ///
    /// O(n log m)
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut transient = TransientOrderedSet::with_comparator(self.comparator().clone());
        for element in self {
            if other.contains(element) {
                transient.insert(element.clone());
            }
        }
        transient.persistent()
    }

    /// Returns the set of elements present in `self` but not in
    /// `other`.
    ///
    /// # Complexity
    ///
    /// O(n log m)
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut transient = TransientOrderedSet::with_comparator(self.comparator().clone());
        for element in self {
            if !other.contains(element) {
                transient.insert(element.clone());
            }
        }
        transient.persistent()
    }
}

// =============================================================================
// TransientOrderedSet Definition
// =============================================================================

/// A mutable builder for [`PersistentOrderedSet`].
///
/// Single-owner like [`TransientOrderedMap`]: mutation requires
/// `&mut self`, and `persistent()` seals the batch in O(1).
///
/// # Examples
///
/// ```rust
/// use persimmon::persistent::{PersistentOrderedSet, TransientOrderedSet};
///
/// let mut transient = TransientOrderedSet::new();
/// for element in [5, 3, 1, 4, 2] {
///     transient.insert(element);
/// }
/// let set: PersistentOrderedSet<i32> = transient.persistent();
/// assert_eq!(set.iter().collect::<Vec<_>>(), vec![&1, &2, &3, &4, &5]);
/// ```
pub struct TransientOrderedSet<T, C = NaturalOrder, const M: usize = 32> {
    inner: TransientOrderedMap<T, (), C, M>,
}

impl<T, const M: usize> TransientOrderedSet<T, NaturalOrder, M> {
    /// Creates an empty transient ordered by the element type's natural
    /// order.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: TransientOrderedMap::new(),
        }
    }
}

impl<T, const M: usize> Default for TransientOrderedSet<T, NaturalOrder, M> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C, const M: usize> TransientOrderedSet<T, C, M> {
    /// Creates an empty transient ordered by `comparator`.
    #[inline]
    #[must_use]
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            inner: TransientOrderedMap::with_comparator(comparator),
        }
    }

    /// Returns the number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the transient contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns `true` if the transient contains an element equivalent
    /// to `element`.
    #[must_use]
    pub fn contains<Q>(&self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        self.inner.contains_key(element)
    }

    /// Iterates the current state in sorted order.
    #[must_use]
    pub fn iter(&self) -> PersistentOrderedSetIterator<'_, T> {
        PersistentOrderedSetIterator {
            inner: self.inner.iter(),
        }
    }
}

impl<T: Clone, C: Comparator<T>, const M: usize> TransientOrderedSet<T, C, M> {
    /// Inserts an element in place.
    ///
    /// Returns `true` if the element count grew.
    pub fn insert(&mut self, element: T) -> bool {
        if self.contains(&element) {
            return false;
        }
        self.inner.insert(element, ())
    }

    /// Removes an element in place.
    ///
    /// Returns `true` if an element was removed.
    pub fn remove<Q>(&mut self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized,
        C: Comparator<Q>,
    {
        self.inner.remove(element)
    }

    /// Seals the transient into an immutable set.
    ///
    /// O(1): the edit token is retired by dropping it.
    #[must_use]
    pub fn persistent(self) -> PersistentOrderedSet<T, C, M> {
        PersistentOrderedSet {
            inner: self.inner.persistent(),
        }
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// A double-ended iterator over the elements of a
/// [`PersistentOrderedSet`] in sorted order.
pub struct PersistentOrderedSetIterator<'a, T> {
    inner: PersistentOrderedMapIterator<'a, T, ()>,
}

impl<'a, T> Iterator for PersistentOrderedSetIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(element, ())| element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for PersistentOrderedSetIterator<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(element, ())| element)
    }
}

impl<T> ExactSizeIterator for PersistentOrderedSetIterator<'_, T> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T> std::iter::FusedIterator for PersistentOrderedSetIterator<'_, T> {}

/// A double-ended iterator over a range of a [`PersistentOrderedSet`],
/// produced by [`range`], [`lower_bound`], or [`upper_bound`].
///
/// [`range`]: PersistentOrderedSet::range
/// [`lower_bound`]: PersistentOrderedSet::lower_bound
/// [`upper_bound`]: PersistentOrderedSet::upper_bound
pub struct PersistentOrderedSetRangeIterator<'a, T> {
    inner: PersistentOrderedMapRangeIterator<'a, T, ()>,
}

impl<'a, T> Iterator for PersistentOrderedSetRangeIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(element, ())| element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for PersistentOrderedSetRangeIterator<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(element, ())| element)
    }
}

impl<T> std::iter::FusedIterator for PersistentOrderedSetRangeIterator<'_, T> {}

/// An owning iterator over the elements of a [`PersistentOrderedSet`].
pub struct PersistentOrderedSetIntoIterator<T> {
    elements: Vec<T>,
    current_index: usize,
}

impl<T: Clone> Iterator for PersistentOrderedSetIntoIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.elements.len() {
            None
        } else {
            let element = self.elements[self.current_index].clone();
            self.current_index += 1;
            Some(element)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.elements.len().saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}

impl<T: Clone> ExactSizeIterator for PersistentOrderedSetIntoIterator<T> {
    fn len(&self) -> usize {
        self.elements.len().saturating_sub(self.current_index)
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<T, C: Default, const M: usize> Default for PersistentOrderedSet<T, C, M> {
    #[inline]
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<T: Clone, C: Comparator<T> + Clone + Default, const M: usize> FromIterator<T>
    for PersistentOrderedSet<T, C, M>
{
    /// Builds the set by inserting every element through one transient,
    /// then sealing.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut transient = TransientOrderedSet::with_comparator(C::default());
        for element in iter {
            transient.insert(element);
        }
        transient.persistent()
    }
}

impl<T: Clone, C, const M: usize> IntoIterator for PersistentOrderedSet<T, C, M> {
    type Item = T;
    type IntoIter = PersistentOrderedSetIntoIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        let elements: Vec<T> = self.iter().cloned().collect();
        PersistentOrderedSetIntoIterator {
            elements,
            current_index: 0,
        }
    }
}

impl<'a, T, C, const M: usize> IntoIterator for &'a PersistentOrderedSet<T, C, M> {
    type Item = &'a T;
    type IntoIter = PersistentOrderedSetIterator<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T, C: Comparator<T>, const M: usize> PartialEq for PersistentOrderedSet<T, C, M> {
    /// Sets are equal when they have the same size and their elements
    /// in order are pairwise equivalent under `self`'s comparator.
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T, C: Comparator<T>, const M: usize> Eq for PersistentOrderedSet<T, C, M> {}

/// Computes a hash value for this set: the length, then each element in
/// sorted order, so insertion order never affects the hash.
impl<T: Hash, C, const M: usize> Hash for PersistentOrderedSet<T, C, M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for element in self {
            element.hash(state);
        }
    }
}

impl<T: fmt::Debug, C, const M: usize> fmt::Debug for PersistentOrderedSet<T, C, M> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_set().entries(self.iter()).finish()
    }
}

impl<T: fmt::Display, C, const M: usize> fmt::Display for PersistentOrderedSet<T, C, M> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        let mut first = true;
        for element in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{element}")?;
        }
        write!(formatter, "}}")
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<T, C, const M: usize> serde::Serialize for PersistentOrderedSet<T, C, M>
where
    T: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut sequence = serializer.serialize_seq(Some(self.len()))?;
        for element in self {
            sequence.serialize_element(element)?;
        }
        sequence.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentOrderedSetVisitor<T, C, const M: usize> {
    marker: std::marker::PhantomData<(T, C)>,
}

#[cfg(feature = "serde")]
impl<'de, T, C, const M: usize> serde::de::Visitor<'de> for PersistentOrderedSetVisitor<T, C, M>
where
    T: serde::Deserialize<'de> + Clone,
    C: Comparator<T> + Clone + Default,
{
    type Value = PersistentOrderedSet<T, C, M>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a sequence")
    }

    fn visit_seq<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut transient = TransientOrderedSet::with_comparator(C::default());
        while let Some(element) = access.next_element()? {
            transient.insert(element);
        }
        Ok(transient.persistent())
    }
}

#[cfg(feature = "serde")]
impl<'de, T, C, const M: usize> serde::Deserialize<'de> for PersistentOrderedSet<T, C, M>
where
    T: serde::Deserialize<'de> + Clone,
    C: Comparator<T> + Clone + Default,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(PersistentOrderedSetVisitor {
            marker: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_new_creates_empty_set() {
        let set: PersistentOrderedSet<i32> = PersistentOrderedSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[rstest]
    fn test_insert_and_contains() {
        let set: PersistentOrderedSet<i32> = PersistentOrderedSet::new().insert(1).insert(2);
        assert!(set.contains(&1));
        assert!(set.contains(&2));
        assert!(!set.contains(&3));
    }

    #[rstest]
    fn test_duplicate_insert_is_idempotent() {
        let set: PersistentOrderedSet<i32> = PersistentOrderedSet::new().insert(1);
        let same = set.insert(1);
        assert_eq!(same.len(), 1);
        assert_eq!(set, same);
    }

    #[rstest]
    fn test_remove_preserves_original() {
        let set: PersistentOrderedSet<i32> = (0..10).collect();
        let removed = set.remove(&5);
        assert_eq!(set.len(), 10);
        assert_eq!(removed.len(), 9);
        assert!(!removed.contains(&5));
    }

    #[rstest]
    fn test_remove_absent_element_is_identity() {
        let set: PersistentOrderedSet<i32> = (0..5).collect();
        assert_eq!(set.remove(&42), set);
    }

    #[rstest]
    fn test_iteration_is_sorted() {
        let set: PersistentOrderedSet<i32> = [5, 3, 1, 4, 2].into_iter().collect();
        let forward: Vec<&i32> = set.iter().collect();
        assert_eq!(forward, vec![&1, &2, &3, &4, &5]);

        let backward: Vec<&i32> = set.iter().rev().collect();
        assert_eq!(backward, vec![&5, &4, &3, &2, &1]);
    }

    #[rstest]
    fn test_min_max() {
        let set: PersistentOrderedSet<i32> = [7, 2, 9].into_iter().collect();
        assert_eq!(set.min(), Some(&2));
        assert_eq!(set.max(), Some(&9));
    }

    #[rstest]
    fn test_bounds_and_range() {
        let set: PersistentOrderedSet<i32> = (0..10).map(|element| element * 2).collect();

        assert_eq!(set.lower_bound(&7).next(), Some(&8));
        assert_eq!(set.upper_bound(&8).next(), Some(&10));

        let window: Vec<&i32> = set.range(4..=10).collect();
        assert_eq!(window, vec![&4, &6, &8, &10]);
    }

    #[rstest]
    fn test_union_intersection_difference() {
        let left: PersistentOrderedSet<i32> = [1, 2, 3].into_iter().collect();
        let right: PersistentOrderedSet<i32> = [2, 3, 4].into_iter().collect();

        let union_set = left.union(&right);
        let union: Vec<&i32> = union_set.iter().collect::<Vec<_>>();
        assert_eq!(union.len(), 4);

        let intersection = left.intersection(&right);
        assert_eq!(intersection.iter().collect::<Vec<_>>(), vec![&2, &3]);

        let difference = left.difference(&right);
        assert_eq!(difference.iter().collect::<Vec<_>>(), vec![&1]);
    }

    #[rstest]
    fn test_transient_batch() {
        let set: PersistentOrderedSet<i32> = (0..100).collect();
        let mut transient = set.transient();
        for element in 0..50 {
            assert!(transient.remove(&element));
        }
        assert!(!transient.insert(99));
        let trimmed = transient.persistent();

        assert_eq!(trimmed.len(), 50);
        assert_eq!(set.len(), 100);
    }

    #[rstest]
    fn test_from_sorted_iter() {
        let set: PersistentOrderedSet<i32> = PersistentOrderedSet::from_sorted_iter(0..1000);
        assert_eq!(set.len(), 1000);
        assert!(set.contains(&999));
    }

    #[rstest]
    fn test_equality_ignores_insertion_order() {
        let left: PersistentOrderedSet<i32> = [1, 2, 3].into_iter().collect();
        let right: PersistentOrderedSet<i32> = [3, 1, 2].into_iter().collect();
        assert_eq!(left, right);
        assert_ne!(left, left.insert(4));
    }

    #[rstest]
    fn test_display_format() {
        let set: PersistentOrderedSet<i32> = [2, 1].into_iter().collect();
        assert_eq!(format!("{set}"), "{1, 2}");
    }

    #[cfg(feature = "serde")]
    #[rstest]
    fn test_serde_roundtrip() {
        let set: PersistentOrderedSet<i32> = (0..10).collect();
        let serialized = serde_json::to_string(&set).expect("serializes");
        let deserialized: PersistentOrderedSet<i32> =
            serde_json::from_str(&serialized).expect("deserializes");
        assert_eq!(set, deserialized);
    }
}
