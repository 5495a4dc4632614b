//! Property-based tests for `PersistentOrderedSet`.

use persimmon::persistent::PersistentOrderedSet;
use proptest::prelude::*;
use std::collections::BTreeSet;

// =============================================================================
// Reference-Model Equivalence
// =============================================================================

proptest! {
    /// Law: after any sequence of inserts and removes, the set agrees
    /// with a `BTreeSet` fed the same sequence.
    #[test]
    fn prop_agrees_with_reference_model(
        operations in prop::collection::vec((any::<bool>(), 0i32..300), 0..200)
    ) {
        let mut set: PersistentOrderedSet<i32> = PersistentOrderedSet::new();
        let mut model: BTreeSet<i32> = BTreeSet::new();

        for (is_insert, element) in operations {
            if is_insert {
                set = set.insert(element);
                model.insert(element);
            } else {
                set = set.remove(&element);
                model.remove(&element);
            }
        }

        prop_assert_eq!(set.len(), model.len());
        let set_elements: Vec<i32> = set.iter().copied().collect();
        let model_elements: Vec<i32> = model.iter().copied().collect();
        prop_assert_eq!(set_elements, model_elements);

        for element in 0..300 {
            prop_assert_eq!(set.contains(&element), model.contains(&element));
        }
    }

    /// Law: insertion is idempotent both by value and by identity.
    #[test]
    fn prop_insert_idempotent(
        elements in prop::collection::vec(0i32..100, 0..50),
        element: i32
    ) {
        let set: PersistentOrderedSet<i32> = elements.into_iter().collect();
        let once = set.insert(element);
        let twice = once.insert(element);
        prop_assert_eq!(&once, &twice);
        prop_assert!(twice.ptr_eq(&once));
    }

    /// Law: mutation never disturbs prior versions.
    #[test]
    fn prop_prior_version_unchanged(
        elements in prop::collection::btree_set(0i32..200, 0..100),
        mutations in prop::collection::vec((any::<bool>(), 0i32..200), 1..100)
    ) {
        let source: PersistentOrderedSet<i32> = elements.iter().copied().collect();
        let snapshot: Vec<i32> = source.iter().copied().collect();

        let mut derived = source.clone();
        for (is_insert, element) in mutations {
            derived = if is_insert {
                derived.insert(element)
            } else {
                derived.remove(&element)
            };
        }

        let after: Vec<i32> = source.iter().copied().collect();
        prop_assert_eq!(snapshot, after);
    }
}

// =============================================================================
// Set Algebra Laws
// =============================================================================

proptest! {
    /// Law: union membership is disjunction, intersection membership is
    /// conjunction, difference membership is conjunction with negation.
    #[test]
    fn prop_algebra_membership(
        left_elements in prop::collection::btree_set(0i32..100, 0..50),
        right_elements in prop::collection::btree_set(0i32..100, 0..50)
    ) {
        let left: PersistentOrderedSet<i32> = left_elements.iter().copied().collect();
        let right: PersistentOrderedSet<i32> = right_elements.iter().copied().collect();

        let union = left.union(&right);
        let intersection = left.intersection(&right);
        let difference = left.difference(&right);

        for element in 0..100 {
            let in_left = left.contains(&element);
            let in_right = right.contains(&element);
            prop_assert_eq!(union.contains(&element), in_left || in_right);
            prop_assert_eq!(intersection.contains(&element), in_left && in_right);
            prop_assert_eq!(difference.contains(&element), in_left && !in_right);
        }
    }

    /// Law: the set algebra results iterate in sorted order.
    #[test]
    fn prop_algebra_results_sorted(
        left_elements in prop::collection::btree_set(0i32..100, 0..50),
        right_elements in prop::collection::btree_set(0i32..100, 0..50)
    ) {
        let left: PersistentOrderedSet<i32> = left_elements.iter().copied().collect();
        let right: PersistentOrderedSet<i32> = right_elements.iter().copied().collect();

        for combined in [left.union(&right), left.intersection(&right), left.difference(&right)] {
            let elements: Vec<i32> = combined.iter().copied().collect();
            for pair in elements.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}

// =============================================================================
// Bulk Construction Laws
// =============================================================================

proptest! {
    /// Law: the sorted bulk builder agrees with incremental insertion.
    #[test]
    fn prop_sorted_build_matches_incremental(
        elements in prop::collection::btree_set(any::<i32>(), 0..300)
    ) {
        let sorted: PersistentOrderedSet<i32> =
            PersistentOrderedSet::from_sorted_iter(elements.iter().copied());
        let incremental: PersistentOrderedSet<i32> = elements.iter().copied().collect();
        prop_assert_eq!(sorted, incremental);
    }

    /// Law: the persistent/transient round-trip is the identity.
    #[test]
    fn prop_transient_roundtrip(
        elements in prop::collection::vec(0i32..100, 0..50)
    ) {
        let set: PersistentOrderedSet<i32> = elements.into_iter().collect();
        let roundtripped = set.transient().persistent();
        prop_assert_eq!(&roundtripped, &set);
        prop_assert!(roundtripped.ptr_eq(&set));
    }
}
