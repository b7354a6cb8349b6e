//! Model-based tests for the B-tree engine.
//!
//! Random operation sequences are replayed against `std::collections::BTreeSet`
//! to cross-check ordering, membership, size accounting, and the structural
//! invariant verifier.

use std::collections::BTreeSet;

use obtree::{BTree, BTreeError};
use proptest::prelude::*;

proptest! {
    #[test]
    fn invariants_hold_after_random_inserts(
        keys in prop::collection::vec(0i64..1000, 0..200),
        order in 3usize..9,
    ) {
        let mut tree = BTree::new(order).unwrap();
        let mut model = BTreeSet::new();

        for key in keys {
            let inserted = tree.insert(key).unwrap();
            prop_assert_eq!(inserted, model.insert(key));
        }

        prop_assert!(tree.check_properties());
        prop_assert_eq!(tree.len(), model.len());

        let expected: Vec<i64> = model.iter().copied().collect();
        let actual: Vec<i64> = tree.iter().copied().collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn invariants_hold_after_mixed_ops(
        ops in prop::collection::vec((any::<bool>(), 0i64..200), 0..300),
        order in 3usize..9,
    ) {
        let mut tree = BTree::new(order).unwrap();
        let mut model = BTreeSet::new();

        for (is_insert, key) in ops {
            if is_insert {
                prop_assert_eq!(tree.insert(key).unwrap(), model.insert(key));
            } else {
                prop_assert_eq!(tree.remove(&key).unwrap(), model.remove(&key));
            }
            prop_assert!(tree.check_properties());
            prop_assert_eq!(tree.len(), model.len());
        }

        for key in 0..200 {
            prop_assert_eq!(tree.contains(&key), model.contains(&key));
        }
    }

    #[test]
    fn range_search_matches_model(
        keys in prop::collection::vec(0i64..500, 0..150),
        bounds in (0i64..500, 0i64..500),
        order in 3usize..7,
    ) {
        let mut tree = BTree::new(order).unwrap();
        let mut model = BTreeSet::new();
        for key in keys {
            tree.insert(key).unwrap();
            model.insert(key);
        }

        let (begin, end) = bounds;
        let expected: Vec<i64> = if begin > end {
            Vec::new()
        } else {
            model.range(begin..=end).copied().collect()
        };
        prop_assert_eq!(tree.range_search(&begin, &end), expected);
    }

    #[test]
    fn bulk_build_matches_incremental(
        raw in prop::collection::btree_set(0i64..10_000, 0..400),
        order in 3usize..9,
    ) {
        let keys: Vec<i64> = raw.iter().copied().collect();

        let bulk = BTree::from_sorted(keys.clone(), order).unwrap();
        prop_assert!(bulk.check_properties());

        let mut incremental = BTree::new(order).unwrap();
        for key in &keys {
            incremental.insert(*key).unwrap();
        }

        prop_assert_eq!(bulk.join(","), incremental.join(","));
        prop_assert_eq!(bulk.len(), keys.len());
    }

    #[test]
    fn successor_matches_model(
        raw in prop::collection::btree_set(0i64..300, 1..100),
        order in 3usize..7,
    ) {
        let keys: Vec<i64> = raw.iter().copied().collect();
        let tree = BTree::from_sorted(keys.clone(), order).unwrap();

        for pair in keys.windows(2) {
            prop_assert_eq!(tree.successor(&pair[0]), Ok(&pair[1]));
        }
        let max = *keys.last().unwrap();
        prop_assert_eq!(tree.successor(&max), Err(BTreeError::SuccessorNotFound));
    }
}
