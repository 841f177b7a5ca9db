#![forbid(unsafe_code)]

//! Grouping engine: partitions a record collection into named buckets keyed
//! by one extractor, with optional per-bucket uniqueness and per-record
//! transformation, plus the simpler one-level map variants and top-N.

use rk_types::{loose_cmp, Extractor, KeyComparison, OrderedMap, Record, RecordError, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    Record(#[from] RecordError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupOptions {
    pub comparison: KeyComparison,
}

/// One grouping bucket: the shared key value and the member records in
/// first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub key: Value,
    pub children: Vec<Record>,
}

/// Group `collection` by `group_key`. Buckets appear in first-seen key
/// order; every record must carry the group key.
pub fn group_by(collection: &[Record], group_key: &Extractor) -> Result<Vec<Group>, GroupError> {
    group_by_filtered(
        collection,
        group_key,
        None,
        GroupOptions::default(),
        |record| Some(record),
    )
}

/// Full grouping variant.
///
/// `transform` runs on each record before insertion; returning `None` drops
/// the record entirely (it joins no bucket, and does not create one beyond
/// the bucket lookup already performed on the untransformed key).
/// `in_group_unique_key` suppresses a record when a member of the target
/// bucket already carries an equal value for that key.
pub fn group_by_filtered(
    collection: &[Record],
    group_key: &Extractor,
    in_group_unique_key: Option<&Extractor>,
    options: GroupOptions,
    mut transform: impl FnMut(Record) -> Option<Record>,
) -> Result<Vec<Group>, GroupError> {
    let mut result: Vec<Group> = Vec::new();

    for record in collection {
        let key = group_key.require(record)?;

        let bucket_position = result
            .iter()
            .position(|group| options.comparison.values_equal(&group.key, &key));

        let Some(transformed) = transform(record.clone()) else {
            continue;
        };

        let Some(position) = bucket_position else {
            result.push(Group {
                key,
                children: vec![transformed],
            });
            continue;
        };

        if let Some(unique_key) = in_group_unique_key {
            let unique_value = unique_key.resolve(&transformed);
            let already_present = result[position].children.iter().any(|member| {
                match (unique_key.resolve(member), &unique_value) {
                    (Some(existing), Some(candidate)) => {
                        options.comparison.values_equal(&existing, candidate)
                    }
                    _ => false,
                }
            });
            if already_present {
                continue;
            }
        }

        result[position].children.push(transformed);
    }

    Ok(result)
}

/// One-to-one map from the extracted key (string-coerced) to the record.
/// A later record with the same key overwrites an earlier one.
#[must_use]
pub fn group_by_value(collection: &[Record], extractor: &Extractor) -> OrderedMap<Record> {
    let mut result = OrderedMap::with_capacity(collection.len());
    for record in collection {
        let key = extractor
            .resolve(record)
            .map(|value| value.key_string())
            .unwrap_or_default();
        result.insert(key, record.clone());
    }
    result
}

/// One-to-many map from the extracted key (string-coerced) to the records
/// carrying it, in original order.
#[must_use]
pub fn group_multiple_by_value(
    collection: &[Record],
    extractor: &Extractor,
) -> OrderedMap<Vec<Record>> {
    let mut result: OrderedMap<Vec<Record>> = OrderedMap::new();
    for record in collection {
        let key = extractor
            .resolve(record)
            .map(|value| value.key_string())
            .unwrap_or_default();
        result
            .get_or_insert_with(&key, Vec::new)
            .push(record.clone());
    }
    result
}

/// Flatten grouped buckets back into one dense collection, bucket by bucket.
#[must_use]
pub fn merge_groups(groups: &OrderedMap<Vec<Record>>) -> Vec<Record> {
    let mut result = Vec::new();
    for bucket in groups.values() {
        result.extend(bucket.iter().cloned());
    }
    result
}

/// A per-group top-N result: `n == 1` collapses the bucket to its single
/// best record instead of a one-element list, matching the legacy shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopGroup {
    Single(Record),
    Ranked(Vec<Record>),
}

/// Group by `group_key`, sort each bucket descending by `sort_key` (stable,
/// so equal sort keys keep their original relative order), and keep the
/// first `n` records per bucket.
#[must_use]
pub fn top_n(
    collection: &[Record],
    group_key: &Extractor,
    sort_key: &Extractor,
    n: usize,
) -> OrderedMap<TopGroup> {
    let grouped = group_multiple_by_value(collection, group_key);
    let mut result = OrderedMap::with_capacity(grouped.len());

    for (key, bucket) in grouped {
        let mut members = bucket;
        members.sort_by(|a, b| {
            let left = sort_key.resolve(a).unwrap_or(Value::Null);
            let right = sort_key.resolve(b).unwrap_or(Value::Null);
            loose_cmp(&right, &left)
        });

        let entry = if n == 1 {
            match members.into_iter().next() {
                Some(top) => TopGroup::Single(top),
                None => TopGroup::Ranked(Vec::new()),
            }
        } else {
            members.truncate(n);
            TopGroup::Ranked(members)
        };
        result.insert(key, entry);
    }

    result
}
