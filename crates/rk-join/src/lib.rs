#![forbid(unsafe_code)]

//! Join engine: correlates an origin collection against one or more
//! correlated collections by a key-equality condition. All variants preserve
//! origin order and length; equality defaults to the legacy loose comparison
//! (see `rk_types::KeyComparison`).

use rk_types::{Extractor, KeyComparison, OrderedMap, Record, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("join condition requires non-empty key names")]
    InvalidCondition,
    #[error("common key `{field}` is missing from a joined record")]
    MissingKey { field: String },
}

/// An extractor pair tested for equality between the two sides of a join.
#[derive(Debug, Clone)]
pub struct JoinCondition {
    origin: Extractor,
    other: Extractor,
}

impl JoinCondition {
    /// Shorthand: compare the same field name on both sides.
    pub fn on(key: impl Into<String>) -> Result<Self, JoinError> {
        let key = key.into();
        Self::pair(Extractor::Field(key.clone()), Extractor::Field(key))
    }

    /// Compare `origin`'s value against `other`'s value.
    pub fn pair(
        origin: impl Into<Extractor>,
        other: impl Into<Extractor>,
    ) -> Result<Self, JoinError> {
        let origin = origin.into();
        let other = other.into();
        for side in [&origin, &other] {
            if matches!(side.field_name(), Some("")) {
                return Err(JoinError::InvalidCondition);
            }
        }
        Ok(Self { origin, other })
    }

    #[must_use]
    pub fn origin_key(&self) -> &Extractor {
        &self.origin
    }

    #[must_use]
    pub fn other_key(&self) -> &Extractor {
        &self.other
    }

    fn matches(&self, origin: &Record, other: &Record, comparison: KeyComparison) -> bool {
        match (self.origin.resolve(origin), self.other.resolve(other)) {
            (Some(left), Some(right)) => comparison.values_equal(&left, &right),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinOptions {
    pub comparison: KeyComparison,
}

/// SQL-like left join: for each origin record, merge in the first matching
/// record from `other` (matched fields override origin fields) and stop
/// scanning. Unmatched origin records pass through unchanged, so the result
/// always has origin's order and length.
#[must_use]
pub fn left_join(origin: &[Record], other: &[Record], condition: &JoinCondition) -> Vec<Record> {
    left_join_with(origin, other, condition, JoinOptions::default(), |m| m)
}

/// [`left_join`] with an explicit comparison mode and a transform applied to
/// the matched record before it is merged onto the origin record (used for
/// key renaming or derived fields).
pub fn left_join_with<F>(
    origin: &[Record],
    other: &[Record],
    condition: &JoinCondition,
    options: JoinOptions,
    mut transform: F,
) -> Vec<Record>
where
    F: FnMut(Record) -> Record,
{
    let mut result = Vec::with_capacity(origin.len());

    for origin_record in origin {
        let matched = other
            .iter()
            .find(|candidate| condition.matches(origin_record, candidate, options.comparison));

        let mut merged = origin_record.clone();
        if let Some(candidate) = matched {
            merged.merge(&transform(candidate.clone()));
        }
        result.push(merged);
    }

    result
}

/// Left join that delegates the merge entirely to `combiner`, invoked exactly
/// once per origin record; `None` is the explicit no-match marker. Used when
/// the caller needs default filling or field renaming rather than a blind
/// merge.
pub fn custom_join<F>(
    origin: &[Record],
    other: &[Record],
    condition: &JoinCondition,
    combiner: F,
) -> Vec<Record>
where
    F: FnMut(&Record, Option<&Record>) -> Record,
{
    custom_join_with(origin, other, condition, JoinOptions::default(), combiner)
}

pub fn custom_join_with<F>(
    origin: &[Record],
    other: &[Record],
    condition: &JoinCondition,
    options: JoinOptions,
    mut combiner: F,
) -> Vec<Record>
where
    F: FnMut(&Record, Option<&Record>) -> Record,
{
    origin
        .iter()
        .map(|origin_record| {
            let matched = other
                .iter()
                .find(|candidate| condition.matches(origin_record, candidate, options.comparison));
            combiner(origin_record, matched)
        })
        .collect()
}

/// Join the origin collection against several correlated collections sharing
/// one key.
///
/// Every record of `origin` and of each non-empty correlated collection must
/// carry `common_key` ([`JoinError::MissingKey`] otherwise); an empty
/// correlated collection is tolerated and only ever contributes absent
/// matches. Each correlated collection is first re-indexed one-to-one by the
/// string-coerced key (last-write-wins on duplicates), then `combiner` runs
/// once per origin record with the matched-or-absent value per collection,
/// in `others` order.
pub fn multi_join<F>(
    origin: &[Record],
    others: &[Vec<Record>],
    common_key: &Extractor,
    mut combiner: F,
) -> Result<Vec<Record>, JoinError>
where
    F: FnMut(&Record, &[Option<&Record>]) -> Record,
{
    if origin.is_empty() {
        return Ok(Vec::new());
    }

    let require_key = |record: &Record| -> Result<Value, JoinError> {
        common_key.require(record).map_err(|_| JoinError::MissingKey {
            field: common_key.describe().to_owned(),
        })
    };

    for record in origin {
        require_key(record)?;
    }

    let mut indexed: Vec<OrderedMap<Record>> = Vec::with_capacity(others.len());
    for collection in others {
        let mut map = OrderedMap::with_capacity(collection.len());
        for record in collection {
            let key = require_key(record)?;
            map.insert(key.key_string(), record.clone());
        }
        indexed.push(map);
    }

    let mut result = Vec::with_capacity(origin.len());
    let mut matches: Vec<Option<&Record>> = Vec::with_capacity(indexed.len());
    for origin_record in origin {
        let key = require_key(origin_record)?.key_string();
        matches.clear();
        matches.extend(indexed.iter().map(|map| map.get(&key)));
        result.push(combiner(origin_record, &matches));
    }

    Ok(result)
}

/// Single-record variant: merge the first pool record whose `other` key
/// equals the origin's `origin` key. Pool records without the key are
/// skipped (they still contribute field names to default filling). When no
/// match is found and `fill_default` is set, every field name seen across
/// the pool that is absent on origin is added with an empty-string value —
/// empty string, not null, is the legacy contract.
#[must_use]
pub fn join_by_key(
    origin: &Record,
    pool: &[Record],
    condition: &JoinCondition,
    fill_default: bool,
) -> Record {
    join_by_key_with(origin, pool, condition, fill_default, JoinOptions::default())
}

#[must_use]
pub fn join_by_key_with(
    origin: &Record,
    pool: &[Record],
    condition: &JoinCondition,
    fill_default: bool,
    options: JoinOptions,
) -> Record {
    let mut result = origin.clone();

    for candidate in pool {
        if condition.matches(origin, candidate, options.comparison) {
            result.merge(candidate);
            return result;
        }
    }

    if fill_default {
        for candidate in pool {
            for name in candidate.field_names() {
                if !result.contains_field(name) {
                    result.insert(name, Value::Utf8(String::new()));
                }
            }
        }
    }

    result
}
