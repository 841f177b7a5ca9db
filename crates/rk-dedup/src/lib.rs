#![forbid(unsafe_code)]

//! Deduplication engine: removes records with repeated values for one
//! extractor, keeping the first occurrence and re-indexing densely.

use rk_types::{Extractor, KeyComparison, Record, RecordError, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error(transparent)]
    Record(#[from] RecordError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DedupOptions {
    pub comparison: KeyComparison,
}

/// Keep the first record for each distinct value of `extractor`, preserving
/// original relative order. The output is a dense collection.
///
/// A field-name extractor that finds no field on some record surfaces
/// [`RecordError::MissingField`]; computed extractors cannot fail.
pub fn unique_by(collection: &[Record], extractor: &Extractor) -> Result<Vec<Record>, DedupError> {
    unique_by_with(collection, extractor, DedupOptions::default())
}

pub fn unique_by_with(
    collection: &[Record],
    extractor: &Extractor,
    options: DedupOptions,
) -> Result<Vec<Record>, DedupError> {
    let mut seen = Vec::<Value>::new();
    let mut result = Vec::with_capacity(collection.len());

    for record in collection {
        let value = extractor.require(record)?;
        if seen
            .iter()
            .any(|existing| options.comparison.values_equal(existing, &value))
        {
            continue;
        }
        seen.push(value);
        result.push(record.clone());
    }

    Ok(result)
}

/// Set-dedup over raw values, first appearance wins.
#[must_use]
pub fn unique_values(values: &[Value]) -> Vec<Value> {
    unique_values_with(values, DedupOptions::default())
}

#[must_use]
pub fn unique_values_with(values: &[Value], options: DedupOptions) -> Vec<Value> {
    let mut result = Vec::<Value>::with_capacity(values.len());
    for value in values {
        if result
            .iter()
            .any(|existing| options.comparison.values_equal(existing, value))
        {
            continue;
        }
        result.push(value.clone());
    }
    result
}

/// Extract one column and set-dedup it, first appearance wins. Records
/// without the field contribute nothing.
#[must_use]
pub fn unique_column_values(collection: &[Record], extractor: &Extractor) -> Vec<Value> {
    let column: Vec<Value> = collection
        .iter()
        .filter_map(|record| extractor.resolve(record))
        .collect();
    unique_values(&column)
}
