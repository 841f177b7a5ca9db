#![forbid(unsafe_code)]

//! Shared data model for the reshapekit engines: the [`Value`]/[`Record`]
//! types produced by an external retrieval layer, the [`Extractor`]
//! abstraction used to pull comparison keys out of records, and the single
//! pluggable [`KeyComparison`] strategy every engine routes equality through.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("field `{field}` is missing from a record that requires it")]
    MissingField { field: String },
}

/// A single field value.
///
/// Untagged serde so that transformed trees serialize to the natural JSON a
/// presentation layer expects; `Int64` is tried before `Float64` so whole
/// numbers round-trip as integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Record(Record),
    List(Vec<Record>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Legacy numeric coercion: booleans count as 0/1 and numeric strings
    /// parse, everything else is non-numeric.
    #[must_use]
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            Self::Utf8(v) => v.trim().parse::<f64>().ok(),
            Self::Null | Self::Record(_) | Self::List(_) => None,
        }
    }

    /// Coerce a value into the trimmed string form used as a tree or map key.
    ///
    /// Reproduces the legacy runtime's string casts: `Null` (and absent
    /// fields) become the empty string, `true`/`false` become `"1"`/`""`,
    /// floats render canonically. Nested records and lists are not valid keys
    /// and coerce to the empty string as well.
    #[must_use]
    pub fn key_string(&self) -> String {
        match self {
            Self::Null | Self::Record(_) | Self::List(_) => String::new(),
            Self::Bool(v) => {
                if *v {
                    "1".to_owned()
                } else {
                    String::new()
                }
            }
            Self::Int64(v) => v.to_string(),
            Self::Float64(v) => canonical_float_string(*v),
            Self::Utf8(v) => v.trim().to_owned(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

/// Canonical string form for floating-point keys.
///
/// Uses the shortest round-trip decimal form, with `-0.0` folded into `0` so
/// that two representations of the same key never produce distinct buckets.
#[must_use]
pub fn canonical_float_string(value: f64) -> String {
    if value == 0.0 {
        return "0".to_owned();
    }
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let rendered = value.to_string();
    match rendered.strip_suffix(".0") {
        Some(trimmed) => trimmed.to_owned(),
        None => rendered,
    }
}

/// Equality strategy for key comparisons.
///
/// The legacy system compares keys with loose value equality (numeric string
/// `"1"` equals `1`); engines default to [`KeyComparison::Loose`] to stay
/// bit-for-bit compatible, and expose `Strict` through their options structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyComparison {
    #[default]
    Loose,
    Strict,
}

impl KeyComparison {
    #[must_use]
    pub fn values_equal(self, left: &Value, right: &Value) -> bool {
        match self {
            Self::Strict => left == right,
            Self::Loose => loose_equal(left, right),
        }
    }
}

fn loose_equal(left: &Value, right: &Value) -> bool {
    use Value::{Bool, Float64, Int64, List, Null, Record, Utf8};

    match (left, right) {
        (Null, Null) => true,
        // Legacy loose equality: null == "" == 0 == false.
        (Null, Utf8(s)) | (Utf8(s), Null) => s.is_empty(),
        (Null, Bool(b)) | (Bool(b), Null) => !*b,
        (Null, Int64(v)) | (Int64(v), Null) => *v == 0,
        (Null, Float64(v)) | (Float64(v), Null) => *v == 0.0,
        (Utf8(a), Utf8(b)) => a == b,
        (Record(a), Record(b)) => a == b,
        (List(a), List(b)) => a == b,
        (Record(_) | List(_), _) | (_, Record(_) | List(_)) => false,
        // Remaining pairs are numeric-ish on both sides; a non-numeric
        // string never equals a number.
        _ => match (left.to_number(), right.to_number()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

/// Total ordering over values, used by the sorting utilities (`top_n`,
/// `max_by`). Numeric values (including numeric strings) order numerically,
/// everything else falls back to the key-string form.
#[must_use]
pub fn loose_cmp(left: &Value, right: &Value) -> Ordering {
    match (left.to_number(), right.to_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => left.key_string().cmp(&right.key_string()),
    }
}

/// Insertion-ordered string-keyed map.
///
/// Backing store for [`Record`] fields, index trees, and keyed grouping
/// results. Lookup is a linear scan; collections here are query-result
/// sized, not storage-engine sized.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> OrderedMap<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert a key/value pair. An existing key is overwritten in place and
    /// keeps its original position; a new key appends.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Fetch the value for `key`, inserting `default()` first when absent.
    pub fn get_or_insert_with(&mut self, key: &str, default: impl FnOnce() -> V) -> &mut V {
        if let Some(position) = self.entries.iter().position(|(k, _)| k == key) {
            return &mut self.entries[position].1;
        }
        self.entries.push((key.to_owned(), default()));
        let last = self.entries.len() - 1;
        &mut self.entries[last].1
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut V)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    #[must_use]
    pub fn into_values(self) -> Vec<V> {
        self.entries.into_iter().map(|(_, v)| v).collect()
    }
}

impl<V> IntoIterator for OrderedMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<V, K: Into<String>> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V> {
    marker: std::marker::PhantomData<V>,
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a string-keyed map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor {
            marker: std::marker::PhantomData,
        })
    }
}

/// An ordered field-name → value mapping, the atomic unit every engine
/// consumes and produces. Field order is insertion order and survives a
/// serde round trip.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: OrderedMap<Value>,
}

/// An ordered, dense sequence of records.
pub type RecordCollection = Vec<Record>;

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    #[must_use]
    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field, value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Overlay `other` onto this record: colliding field names take the
    /// incoming value (and keep their original position), new field names
    /// append. This is the merge the join engine uses.
    pub fn merge(&mut self, other: &Record) {
        for (field, value) in other.fields.iter() {
            self.fields.insert(field, value.clone());
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys()
    }
}

impl<K: Into<String>, T: Into<Value>> FromIterator<(K, T)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

/// Resolves a comparison or grouping key from a record: either a field name
/// looked up on the record, or a caller-supplied pure function.
#[derive(Clone)]
pub enum Extractor {
    Field(String),
    Computed(Arc<dyn Fn(&Record) -> Value + Send + Sync>),
}

impl Extractor {
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn computed(f: impl Fn(&Record) -> Value + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    /// Resolve the extractor against a record. `None` means the field is
    /// absent; a computed extractor always resolves.
    #[must_use]
    pub fn resolve(&self, record: &Record) -> Option<Value> {
        match self {
            Self::Field(name) => record.get(name).cloned(),
            Self::Computed(f) => Some(f(record)),
        }
    }

    /// Resolve, surfacing [`RecordError::MissingField`] when a field-name
    /// extractor finds no field. Used by the operations whose contract
    /// demands presence.
    pub fn require(&self, record: &Record) -> Result<Value, RecordError> {
        self.resolve(record).ok_or_else(|| RecordError::MissingField {
            field: self.describe().to_owned(),
        })
    }

    /// Human-readable identity for error messages.
    #[must_use]
    pub fn describe(&self) -> &str {
        match self {
            Self::Field(name) => name,
            Self::Computed(_) => "<computed>",
        }
    }

    /// The field name, when this is a field extractor.
    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            Self::Computed(_) => None,
        }
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for Extractor {
    fn from(name: &str) -> Self {
        Self::Field(name.to_owned())
    }
}

impl From<String> for Extractor {
    fn from(name: String) -> Self {
        Self::Field(name)
    }
}
