#![forbid(unsafe_code)]

//! Shared fixtures for the cross-engine conformance suites under `tests/`.
//!
//! Fixtures are JSON literals deliberately shaped like the query-result
//! collections the engines were built for, parsed through the public serde
//! surface so every suite also exercises the wire shape.

use rk_types::{Record, Value};

/// Parse a JSON array literal into a record collection.
///
/// # Panics
///
/// Panics when the literal is not an array of objects; fixtures are
/// compile-time constants, so a panic here is a broken test, not a runtime
/// concern.
#[must_use]
pub fn records(json: &str) -> Vec<Record> {
    serde_json::from_str(json).expect("fixture literal must parse as a record collection")
}

/// Parse a JSON object literal into a single record.
///
/// # Panics
///
/// Panics when the literal is not an object.
#[must_use]
pub fn record(json: &str) -> Record {
    serde_json::from_str(json).expect("fixture literal must parse as a record")
}

/// The product catalog used across the engine documentation and suites.
#[must_use]
pub fn catalog() -> Vec<Record> {
    records(
        r#"[
            {"name": "iPhone 6",    "brand": "Apple",   "type": "phone"},
            {"name": "iPhone 5",    "brand": "Apple",   "type": "phone"},
            {"name": "Apple Watch", "brand": "Apple",   "type": "watch"},
            {"name": "Galaxy S6",   "brand": "Samsung", "type": "phone"},
            {"name": "Galaxy Gear", "brand": "Samsung", "type": "watch"}
        ]"#,
    )
}

/// Extract one column as values, skipping absent fields.
#[must_use]
pub fn column(collection: &[Record], field: &str) -> Vec<Value> {
    collection
        .iter()
        .filter_map(|record| record.get(field).cloned())
        .collect()
}
