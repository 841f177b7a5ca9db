#![forbid(unsafe_code)]

//! Multi-level indexing engine.
//!
//! [`index`] recursively partitions a record collection into a tree of
//! nested string-keyed mappings using an ordered list of extractors, with an
//! optional keyed leaf. [`key_to_field`] is the inverse labeling pass that
//! turns key-nesting back into explicit `{<field>: key, "list": [...]}`
//! records, and [`append_group_info_recursive`] annotates such a tree at one
//! specific nesting depth.

use rk_types::{Extractor, OrderedMap, Record, Value};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("field-name stack does not match tree nesting at depth {depth}")]
    DepthMismatch { depth: usize },
}

/// One level of an index tree.
///
/// Branches are produced by group extractors, leaves hold the records:
/// a plain list when no leaf key was given, a keyed map otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IndexNode {
    Branch(OrderedMap<IndexNode>),
    Records(Vec<Record>),
    Keyed(OrderedMap<Record>),
}

impl IndexNode {
    /// Number of immediate entries at this level.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Branch(children) => children.len(),
            Self::Records(records) => records.len(),
            Self::Keyed(map) => map.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build a tree of depth `groups.len()` over `collection`.
///
/// Each level's bucket key is the trimmed, string-coerced value of that
/// level's extractor (absent and null values land in the empty-string
/// bucket; float keys render canonically). At the leaf:
///
/// - `key` is `None`, `groups` non-empty: the leaf is a record list,
///   duplicates allowed, order preserved.
/// - `key` is `None`, `groups` empty: every record is discarded.
/// - `key` is given: the leaf maps the `key`-extracted value to the record
///   itself; a later record with the same key overwrites an earlier one
///   (last-write-wins). Records whose `key` value is null or absent are
///   omitted from the leaf.
#[must_use]
pub fn index(collection: &[Record], key: Option<&Extractor>, groups: &[Extractor]) -> IndexNode {
    if groups.is_empty() {
        return match key {
            None => IndexNode::Records(Vec::new()),
            Some(leaf_key) => {
                let mut leaf = OrderedMap::new();
                for record in collection {
                    insert_keyed(&mut leaf, leaf_key, record);
                }
                IndexNode::Keyed(leaf)
            }
        };
    }

    let mut root = IndexNode::Branch(OrderedMap::new());
    for record in collection {
        insert_record(&mut root, key, groups, record);
    }
    root
}

fn insert_record(
    node: &mut IndexNode,
    key: Option<&Extractor>,
    groups: &[Extractor],
    record: &Record,
) {
    match groups.split_first() {
        Some((group, rest)) => {
            let bucket = group
                .resolve(record)
                .map(|value| value.key_string())
                .unwrap_or_default();
            let IndexNode::Branch(children) = node else {
                // Tree shape is fixed by construction; nothing else can
                // appear above the leaf level.
                return;
            };
            let child = children.get_or_insert_with(&bucket, || {
                if rest.is_empty() {
                    match key {
                        None => IndexNode::Records(Vec::new()),
                        Some(_) => IndexNode::Keyed(OrderedMap::new()),
                    }
                } else {
                    IndexNode::Branch(OrderedMap::new())
                }
            });
            insert_record(child, key, rest, record);
        }
        None => match (node, key) {
            (IndexNode::Records(records), None) => records.push(record.clone()),
            (IndexNode::Keyed(map), Some(leaf_key)) => insert_keyed(map, leaf_key, record),
            _ => {}
        },
    }
}

fn insert_keyed(leaf: &mut OrderedMap<Record>, key: &Extractor, record: &Record) {
    match key.resolve(record) {
        None | Some(Value::Null) => {}
        Some(value) => {
            leaf.insert(value.key_string(), record.clone());
        }
    }
}

/// Convert a keyed nesting into labeled nested lists, consuming one field
/// name per level: each branch entry becomes `{<field>: key, "list": [...]}`.
///
/// This is the legacy-faithful lenient form: when the field-name stack and
/// the tree depth disagree, extra fields on a flat leaf are ignored and a
/// branch below an exhausted stack is flattened to its records. Callers who
/// want that surfaced instead use [`key_to_field_strict`].
#[must_use]
pub fn key_to_field(node: &IndexNode, fields: &[&str]) -> Vec<Record> {
    convert_lenient(node, fields)
}

/// Like [`key_to_field`], but a mismatch between the field-name stack and
/// the actual nesting depth is a caller error surfaced as
/// [`IndexError::DepthMismatch`].
pub fn key_to_field_strict(node: &IndexNode, fields: &[&str]) -> Result<Vec<Record>, IndexError> {
    validate_depth(node, fields.len(), 1)?;
    Ok(convert_lenient(node, fields))
}

fn convert_lenient(node: &IndexNode, fields: &[&str]) -> Vec<Record> {
    match node {
        IndexNode::Records(records) => records.clone(),
        IndexNode::Keyed(map) => match fields.split_first() {
            Some((field, _)) => map
                .iter()
                .map(|(key, record)| labeled(field, key, vec![record.clone()]))
                .collect(),
            None => map.values().cloned().collect(),
        },
        IndexNode::Branch(children) => match fields.split_first() {
            Some((field, rest)) => children
                .iter()
                .map(|(key, child)| labeled(field, key, convert_lenient(child, rest)))
                .collect(),
            None => flatten(node),
        },
    }
}

fn labeled(field: &str, key: &str, list: Vec<Record>) -> Record {
    let mut record = Record::new();
    record.insert(field, Value::Utf8(key.to_owned()));
    record.insert("list", Value::List(list));
    record
}

/// Collect every record below `node`, in tree order.
fn flatten(node: &IndexNode) -> Vec<Record> {
    match node {
        IndexNode::Records(records) => records.clone(),
        IndexNode::Keyed(map) => map.values().cloned().collect(),
        IndexNode::Branch(children) => {
            let mut out = Vec::new();
            for child in children.values() {
                out.extend(flatten(child));
            }
            out
        }
    }
}

/// Check that a field-name stack of length `expected` exactly covers the
/// tree's nesting: one name per branch level, one for a keyed leaf, none
/// left over at a record-list leaf.
fn validate_depth(node: &IndexNode, expected: usize, depth: usize) -> Result<(), IndexError> {
    match node {
        IndexNode::Records(_) => {
            if expected == 0 {
                Ok(())
            } else {
                Err(IndexError::DepthMismatch { depth })
            }
        }
        IndexNode::Keyed(_) => {
            if expected == 1 {
                Ok(())
            } else {
                Err(IndexError::DepthMismatch { depth })
            }
        }
        IndexNode::Branch(children) => {
            if expected == 0 {
                return Err(IndexError::DepthMismatch { depth });
            }
            for child in children.values() {
                validate_depth(child, expected - 1, depth + 1)?;
            }
            Ok(())
        }
    }
}

/// Composed convenience: group by `group_keys`, then label the resulting
/// nesting with the same field names.
#[must_use]
pub fn index_and_map_field(collection: &[Record], group_keys: &[&str]) -> Vec<Record> {
    let extractors: Vec<Extractor> = group_keys
        .iter()
        .map(|name| Extractor::field(*name))
        .collect();
    let tree = index(collection, None, &extractors);
    key_to_field(&tree, group_keys)
}

/// Walk a labeled tree (as produced by [`key_to_field`]) down its `"list"`
/// fields and apply `transform` to every sibling record at exactly
/// `wanted_depth` (the top level is depth 1), mutating in place.
///
/// Returns `false` without applying anything when `wanted_depth` overshoots
/// the walk (a guard against runaway recursion, not an error) or when a node
/// that must be descended lacks a list-valued `"list"` field; matching the
/// legacy behavior, this is silent rather than an error.
pub fn append_group_info_recursive<F>(
    items: &mut [Record],
    wanted_depth: usize,
    mut transform: F,
) -> bool
where
    F: FnMut(Record) -> Record,
{
    append_at_depth(items, wanted_depth, 1, &mut transform)
}

fn append_at_depth(
    items: &mut [Record],
    wanted_depth: usize,
    current_depth: usize,
    transform: &mut dyn FnMut(Record) -> Record,
) -> bool {
    if current_depth == wanted_depth {
        for item in items.iter_mut() {
            let owned = std::mem::take(item);
            *item = transform(owned);
        }
        return true;
    }
    if current_depth > wanted_depth {
        return false;
    }

    let mut intact = true;
    for item in items.iter_mut() {
        match item.get_mut("list") {
            Some(Value::List(children)) => {
                if !append_at_depth(children, wanted_depth, current_depth + 1, transform) {
                    intact = false;
                }
            }
            _ => intact = false,
        }
    }
    intact
}

#[cfg(test)]
mod tests {
    use super::{
        append_group_info_recursive, index, index_and_map_field, key_to_field,
        key_to_field_strict, IndexError, IndexNode,
    };
    use rk_types::{Extractor, Record, Value};

    fn devices() -> Vec<Record> {
        [
            [("id", "123"), ("data", "abc"), ("device", "laptop")],
            [("id", "345"), ("data", "def"), ("device", "tablet")],
            [("id", "345"), ("data", "hgi"), ("device", "smartphone")],
        ]
        .into_iter()
        .map(|fields| fields.into_iter().collect())
        .collect()
    }

    #[test]
    fn index_with_key_only_is_last_write_wins() {
        let tree = index(&devices(), Some(&Extractor::field("id")), &[]);
        let IndexNode::Keyed(map) = tree else {
            panic!("expected keyed root");
        };
        assert_eq!(map.len(), 2);
        let overwritten = map.get("345").expect("id 345");
        assert_eq!(overwritten.get("data"), Some(&Value::from("hgi")));
    }

    #[test]
    fn index_with_one_group_keeps_all_members() {
        let tree = index(&devices(), None, &[Extractor::field("id")]);
        let IndexNode::Branch(children) = &tree else {
            panic!("expected branch root");
        };
        let keys: Vec<&str> = children.keys().collect();
        assert_eq!(keys, vec!["123", "345"]);
        let IndexNode::Records(members) = children.get("345").expect("id 345") else {
            panic!("expected record leaf");
        };
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn index_with_groups_and_key_builds_keyed_leaves() {
        let tree = index(
            &devices(),
            Some(&Extractor::field("data")),
            &[Extractor::field("id"), Extractor::field("device")],
        );
        let json = serde_json::to_value(&tree).expect("serialize");
        assert_eq!(json["345"]["tablet"]["def"]["device"], "tablet");
        assert_eq!(json["123"]["laptop"]["abc"]["id"], "123");
    }

    #[test]
    fn index_discards_everything_without_key_and_groups() {
        let tree = index(&devices(), None, &[]);
        assert!(tree.is_empty());
    }

    #[test]
    fn index_skips_null_leaf_keys_but_groups_absent_values() {
        let mut records = devices();
        records[0].insert("data", Value::Null);
        records[1].remove("device");

        // Null leaf key: record omitted from its leaf.
        let keyed = index(&records, Some(&Extractor::field("data")), &[]);
        assert_eq!(keyed.len(), 2);

        // Absent group value: record lands in the empty-string bucket.
        let grouped = index(&records, None, &[Extractor::field("device")]);
        let IndexNode::Branch(children) = &grouped else {
            panic!("expected branch root");
        };
        assert!(children.contains_key(""));
    }

    #[test]
    fn index_trims_and_canonicalizes_group_keys() {
        let records: Vec<Record> = vec![
            [("bucket", Value::from("  a  ")), ("score", Value::Int64(1))].into_iter().collect(),
            [("bucket", Value::Float64(2.0)), ("score", Value::Int64(2))].into_iter().collect(),
        ];
        let tree = index(&records, None, &[Extractor::field("bucket")]);
        let IndexNode::Branch(children) = &tree else {
            panic!("expected branch root");
        };
        let keys: Vec<&str> = children.keys().collect();
        assert_eq!(keys, vec!["a", "2"]);
    }

    #[test]
    fn key_to_field_labels_one_level() {
        let tree = index(&devices(), None, &[Extractor::field("id")]);
        let labeled = key_to_field(&tree, &["deviceId"]);
        assert_eq!(labeled.len(), 2);
        assert_eq!(labeled[0].get("deviceId"), Some(&Value::from("123")));
        let Some(Value::List(members)) = labeled[1].get("list") else {
            panic!("expected list field");
        };
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn index_and_map_field_nests_two_levels() {
        let labeled = index_and_map_field(&devices(), &["id", "device"]);
        let json = serde_json::to_value(&labeled).expect("serialize");
        assert_eq!(json[1]["id"], "345");
        assert_eq!(json[1]["list"][0]["device"], "tablet");
        assert_eq!(json[1]["list"][0]["list"][0]["data"], "def");
    }

    #[test]
    fn key_to_field_strict_rejects_depth_mismatch() {
        let tree = index(&devices(), None, &[Extractor::field("id")]);
        assert!(key_to_field_strict(&tree, &["a"]).is_ok());
        assert_eq!(
            key_to_field_strict(&tree, &["a", "b"]),
            Err(IndexError::DepthMismatch { depth: 2 })
        );
        assert_eq!(
            key_to_field_strict(&tree, &[]),
            Err(IndexError::DepthMismatch { depth: 1 })
        );
    }

    #[test]
    fn key_to_field_lenient_flattens_on_short_stack() {
        let tree = index(
            &devices(),
            None,
            &[Extractor::field("id"), Extractor::field("device")],
        );
        let labeled = key_to_field(&tree, &["id"]);
        // Second level is flattened into the first level's lists.
        let Some(Value::List(members)) = labeled[1].get("list") else {
            panic!("expected list field");
        };
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].get("data"), Some(&Value::from("def")));
    }

    #[test]
    fn append_group_info_at_leaf_depth() {
        let mut labeled = index_and_map_field(&devices(), &["id", "device"]);
        let applied = append_group_info_recursive(&mut labeled, 2, |mut node| {
            let count = match node.get("list") {
                Some(Value::List(members)) => members.len() as i64,
                _ => 0,
            };
            node.insert("total", Value::Int64(count));
            node
        });
        assert!(applied);
        let json = serde_json::to_value(&labeled).expect("serialize");
        assert_eq!(json[0]["list"][0]["total"], 1);
        // Depth 1 nodes untouched.
        assert!(json[0].get("total").is_none());
    }

    #[test]
    fn append_group_info_replaces_top_level_when_depth_is_one() {
        let mut labeled = index_and_map_field(&devices(), &["id"]);
        let applied = append_group_info_recursive(&mut labeled, 1, |mut node| {
            node.insert("seen", true);
            node
        });
        assert!(applied);
        assert_eq!(labeled[0].get("seen"), Some(&Value::Bool(true)));
    }

    #[test]
    fn append_group_info_overshoot_returns_false() {
        let mut labeled = index_and_map_field(&devices(), &["id"]);
        let before = labeled.clone();
        assert!(!append_group_info_recursive(&mut labeled, 0, |node| node));
        assert_eq!(labeled, before);
    }

    #[test]
    fn append_group_info_reports_missing_list_shape() {
        let mut items: Vec<Record> = vec![[("name", "solo")].into_iter().collect()];
        assert!(!append_group_info_recursive(&mut items, 2, |node| node));
    }

    #[test]
    fn grouping_then_labeling_matches_group_by_shape() {
        let labeled = index_and_map_field(&devices(), &["id"]);
        let grouped = group_reference(&devices());
        assert_eq!(labeled.len(), grouped.len());
        for (node, (key, members)) in labeled.iter().zip(grouped) {
            assert_eq!(node.get("id"), Some(&Value::Utf8(key)));
            let Some(Value::List(list)) = node.get("list") else {
                panic!("expected list field");
            };
            assert_eq!(*list, members);
        }
    }

    /// Reference grouping used to pin the index/key_to_field equivalence.
    fn group_reference(records: &[Record]) -> Vec<(String, Vec<Record>)> {
        let mut out: Vec<(String, Vec<Record>)> = Vec::new();
        for record in records {
            let key = record
                .get("id")
                .map(Value::key_string)
                .unwrap_or_default();
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(record.clone()),
                None => out.push((key, vec![record.clone()])),
            }
        }
        out
    }
}
