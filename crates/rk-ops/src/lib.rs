#![forbid(unsafe_code)]

//! Ordering and aggregation utilities: reference-order reordering, column
//! aggregates, and the documented in-place mutators (`append_order_index`,
//! `take_random`).

use rand::Rng;
use rk_types::{loose_cmp, Extractor, KeyComparison, Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderOptions {
    pub comparison: KeyComparison,
}

/// Emit records in the order dictated by `order`: for each order value, every
/// still-eligible record whose `field` value equals it, in original relative
/// order.
///
/// Without `include_unmatched`, records matched by several order values are
/// emitted once per match (duplication is the documented legacy behavior)
/// and unmatched records are dropped. With `include_unmatched`, each record
/// is consumed by its first match and the leftovers are appended after the
/// ordered section, in original relative order.
#[must_use]
pub fn reorder_by_array(
    collection: &[Record],
    order: &[Value],
    field: &Extractor,
    include_unmatched: bool,
) -> Vec<Record> {
    reorder_by_array_with(
        collection,
        order,
        field,
        include_unmatched,
        OrderOptions::default(),
    )
}

#[must_use]
pub fn reorder_by_array_with(
    collection: &[Record],
    order: &[Value],
    field: &Extractor,
    include_unmatched: bool,
    options: OrderOptions,
) -> Vec<Record> {
    if order.is_empty() || collection.is_empty() {
        return collection.to_vec();
    }

    let extracted: Vec<Option<Value>> = collection
        .iter()
        .map(|record| field.resolve(record))
        .collect();

    let mut consumed = vec![false; collection.len()];
    let mut result = Vec::with_capacity(collection.len());

    for order_value in order {
        for (position, record) in collection.iter().enumerate() {
            if consumed[position] {
                continue;
            }
            let Some(value) = &extracted[position] else {
                continue;
            };
            if options.comparison.values_equal(value, order_value) {
                if include_unmatched {
                    consumed[position] = true;
                }
                result.push(record.clone());
            }
        }
    }

    if include_unmatched {
        for (position, record) in collection.iter().enumerate() {
            if !consumed[position] {
                result.push(record.clone());
            }
        }
    }

    result
}

/// Scalar-sequence variant of [`reorder_by_array`].
#[must_use]
pub fn reorder_values_by_array(
    values: &[Value],
    order: &[Value],
    include_unmatched: bool,
) -> Vec<Value> {
    reorder_values_by_array_with(values, order, include_unmatched, OrderOptions::default())
}

#[must_use]
pub fn reorder_values_by_array_with(
    values: &[Value],
    order: &[Value],
    include_unmatched: bool,
    options: OrderOptions,
) -> Vec<Value> {
    if order.is_empty() || values.is_empty() {
        return values.to_vec();
    }

    let mut consumed = vec![false; values.len()];
    let mut result = Vec::with_capacity(values.len());

    for order_value in order {
        for (position, value) in values.iter().enumerate() {
            if consumed[position] {
                continue;
            }
            if options.comparison.values_equal(value, order_value) {
                if include_unmatched {
                    consumed[position] = true;
                }
                result.push(value.clone());
            }
        }
    }

    if include_unmatched {
        for (position, value) in values.iter().enumerate() {
            if !consumed[position] {
                result.push(value.clone());
            }
        }
    }

    result
}

/// Sum one extracted column. Absent fields and non-numeric values contribute
/// zero, reproducing the legacy `array_sum` coercion.
#[must_use]
pub fn sum(collection: &[Record], extractor: &Extractor) -> f64 {
    collection
        .iter()
        .filter_map(|record| extractor.resolve(record))
        .filter_map(|value| value.to_number())
        .sum()
}

/// Average of one extracted column over the whole collection length,
/// rounded to two decimals; an empty collection averages to zero rather
/// than erroring.
#[must_use]
pub fn average(collection: &[Record], extractor: &Extractor) -> f64 {
    if collection.is_empty() {
        return 0.0;
    }
    let mean = sum(collection, extractor) / collection.len() as f64;
    (mean * 100.0).round() / 100.0
}

/// Largest value of one extracted column; `None` when nothing resolves.
#[must_use]
pub fn max_by(collection: &[Record], extractor: &Extractor) -> Option<Value> {
    collection
        .iter()
        .filter_map(|record| extractor.resolve(record))
        .max_by(loose_cmp)
}

/// Raw-value maximum over a scalar sequence.
#[must_use]
pub fn max_values(values: &[Value]) -> Option<Value> {
    values.iter().cloned().max_by(loose_cmp)
}

/// Write a 1-based `orderIndex` field onto every record, in place.
pub fn append_order_index(collection: &mut [Record]) {
    for (position, record) in collection.iter_mut().enumerate() {
        record.insert("orderIndex", Value::Int64(position as i64 + 1));
    }
}

/// Pure random pick.
#[must_use]
pub fn pick_random(collection: &[Record]) -> Option<&Record> {
    if collection.is_empty() {
        return None;
    }
    let position = rand::thread_rng().gen_range(0..collection.len());
    collection.get(position)
}

/// Remove and return a random record. The remaining collection stays dense
/// and keeps its relative order, so repeated draws stay uniform.
pub fn take_random(collection: &mut Vec<Record>) -> Option<Record> {
    if collection.is_empty() {
        return None;
    }
    let position = rand::thread_rng().gen_range(0..collection.len());
    Some(collection.remove(position))
}
