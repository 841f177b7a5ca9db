#![forbid(unsafe_code)]

//! Property suites for the reshapekit engines.
//!
//! Strategy generators produce arbitrary record collections over a small key
//! space (so grouping and joining actually collide), and the properties pin
//! the behavioral invariants that must hold for all inputs, not just the
//! fixture scenarios.

use proptest::prelude::*;

use rk_dedup::{unique_by, unique_values};
use rk_group::group_by;
use rk_index::{index, key_to_field};
use rk_join::{left_join, multi_join, JoinCondition};
use rk_ops::{average, reorder_values_by_array};
use rk_types::{Extractor, KeyComparison, Record, Value};

// ---------------------------------------------------------------------------
// Strategy generators
// ---------------------------------------------------------------------------

/// A record with a small-domain `id` key, a numeric `score`, and a free tag.
fn arb_record() -> impl Strategy<Value = Record> {
    ((0i64..6), (0i64..1_000), "[a-d]{1,3}").prop_map(|(id, score, tag)| {
        [
            ("id", Value::Int64(id)),
            ("score", Value::Int64(score)),
            ("tag", Value::Utf8(tag)),
        ]
        .into_iter()
        .collect()
    })
}

fn arb_collection(max_len: usize) -> impl Strategy<Value = Vec<Record>> {
    proptest::collection::vec(arb_record(), 0..=max_len)
}

fn arb_values(max_len: usize) -> impl Strategy<Value = Vec<Value>> {
    proptest::collection::vec((0i64..6).prop_map(Value::Int64), 0..=max_len)
}

// ---------------------------------------------------------------------------
// Property: deduplication invariants
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// unique_by output carries no two records with an equal key value.
    #[test]
    fn prop_unique_by_has_no_duplicate_keys(collection in arb_collection(24)) {
        let result = unique_by(&collection, &Extractor::field("id")).expect("id always present");
        for (i, left) in result.iter().enumerate() {
            for right in &result[i + 1..] {
                prop_assert!(!KeyComparison::Loose.values_equal(
                    left.get("id").expect("id"),
                    right.get("id").expect("id"),
                ));
            }
        }
    }

    /// unique_by never grows the collection and keeps first occurrences in
    /// their original relative order.
    #[test]
    fn prop_unique_by_is_an_ordered_subsequence(collection in arb_collection(24)) {
        let result = unique_by(&collection, &Extractor::field("id")).expect("id always present");
        prop_assert!(result.len() <= collection.len());

        let mut cursor = 0usize;
        for kept in &result {
            let found = collection[cursor..].iter().position(|r| r == kept);
            prop_assert!(found.is_some(), "kept record must come from the input, in order");
            cursor += found.expect("checked") + 1;
        }
    }

    /// unique_by is idempotent.
    #[test]
    fn prop_unique_by_idempotent(collection in arb_collection(24)) {
        let once = unique_by(&collection, &Extractor::field("id")).expect("first pass");
        let twice = unique_by(&once, &Extractor::field("id")).expect("second pass");
        prop_assert_eq!(once, twice);
    }

    /// unique_values keeps exactly the first appearance of every value.
    #[test]
    fn prop_unique_values_first_appearance(values in arb_values(24)) {
        let result = unique_values(&values);
        for (i, left) in result.iter().enumerate() {
            for right in &result[i + 1..] {
                prop_assert!(!KeyComparison::Loose.values_equal(left, right));
            }
        }
        for value in &values {
            prop_assert!(result.iter().any(|kept| KeyComparison::Loose.values_equal(kept, value)));
        }
    }
}

// ---------------------------------------------------------------------------
// Property: index/label round trip matches group_by
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Single-level index + key_to_field reconstructs the group_by grouping:
    /// same keys in the same order, same members per key.
    #[test]
    fn prop_index_label_equals_group_by(collection in arb_collection(24)) {
        let tree = index(&collection, None, &[Extractor::field("id")]);
        let labeled = key_to_field(&tree, &["id"]);
        let grouped = group_by(&collection, &Extractor::field("id")).expect("id always present");

        prop_assert_eq!(labeled.len(), grouped.len());
        for (node, group) in labeled.iter().zip(&grouped) {
            prop_assert_eq!(
                node.get("id").map(Value::key_string),
                Some(group.key.key_string())
            );
            let Some(Value::List(members)) = node.get("list") else {
                return Err(TestCaseError::fail("labeled node must carry a list"));
            };
            prop_assert_eq!(members, &group.children);
        }
    }

    /// Indexing with a leaf key never yields more leaf entries than records.
    #[test]
    fn prop_keyed_index_is_bounded(collection in arb_collection(24)) {
        let tree = index(&collection, Some(&Extractor::field("id")), &[]);
        prop_assert!(tree.len() <= collection.len());
    }
}

// ---------------------------------------------------------------------------
// Property: join invariants
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// left_join preserves origin order and length; every output record
    /// still carries its origin's fields.
    #[test]
    fn prop_left_join_preserves_origin(
        origin in arb_collection(16),
        other in arb_collection(16),
    ) {
        let condition = JoinCondition::on("id").expect("condition");
        let result = left_join(&origin, &other, &condition);
        prop_assert_eq!(result.len(), origin.len());
        for (merged, origin_record) in result.iter().zip(&origin) {
            prop_assert_eq!(merged.get("id"), origin_record.get("id"));
        }
    }

    /// multi_join with no correlated collections hands back origin unchanged
    /// when the combiner is the identity on origin.
    #[test]
    fn prop_multi_join_empty_others_is_identity(origin in arb_collection(16)) {
        let result = multi_join(
            &origin,
            &[],
            &Extractor::field("id"),
            |record, matches| {
                assert!(matches.is_empty());
                record.clone()
            },
        )
        .expect("id always present");
        prop_assert_eq!(result, origin);
    }

    /// multi_join output length always equals origin length.
    #[test]
    fn prop_multi_join_length(
        origin in arb_collection(16),
        other in arb_collection(16),
    ) {
        let result = multi_join(
            &origin,
            &[other],
            &Extractor::field("id"),
            |record, _| record.clone(),
        )
        .expect("id always present");
        prop_assert_eq!(result.len(), origin.len());
    }
}

// ---------------------------------------------------------------------------
// Property: ordering/aggregation invariants
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Without include_unmatched, every emitted value appears in the
    /// reference order list.
    #[test]
    fn prop_reorder_emits_only_ordered_values(
        values in arb_values(16),
        order in arb_values(8),
    ) {
        let result = reorder_values_by_array(&values, &order, false);
        if order.is_empty() || values.is_empty() {
            prop_assert_eq!(result, values);
        } else {
            for value in &result {
                prop_assert!(order.iter().any(|o| KeyComparison::Loose.values_equal(o, value)));
            }
        }
    }

    /// With include_unmatched, reordering is a permutation whenever the
    /// reference order has no duplicates.
    #[test]
    fn prop_reorder_with_unmatched_is_permutation(values in arb_values(16)) {
        let order = unique_values(&values);
        let result = reorder_values_by_array(&values, &order, true);
        prop_assert_eq!(result.len(), values.len());
        let mut left = result.clone();
        let mut right = values.clone();
        let key = |v: &Value| v.key_string();
        left.sort_by_key(key);
        right.sort_by_key(key);
        prop_assert_eq!(left, right);
    }

    /// average never panics and an empty collection averages to zero.
    #[test]
    fn prop_average_total_on_any_collection(collection in arb_collection(16)) {
        let avg = average(&collection, &Extractor::field("score"));
        if collection.is_empty() {
            prop_assert_eq!(avg, 0.0);
        } else {
            prop_assert!(avg >= 0.0);
            prop_assert!(avg <= 1_000.0);
        }
    }
}
