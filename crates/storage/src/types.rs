use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::DocumentId;

/// One stored field value. Documents are schema-less, so readers must check types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    // Cross-type order: null, booleans, numbers, timestamps, strings.
    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) | Self::Float(_) => 2,
            Self::Timestamp(_) => 3,
            Self::String(_) => 4,
        }
    }

    /// Total order used by live queries when sorting on this field.
    pub fn query_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(left), Self::Bool(right)) => left.cmp(right),
            (Self::Integer(left), Self::Integer(right)) => left.cmp(right),
            (Self::Integer(left), Self::Float(right)) => (*left as f64).total_cmp(right),
            (Self::Float(left), Self::Integer(right)) => left.total_cmp(&(*right as f64)),
            (Self::Float(left), Self::Float(right)) => left.total_cmp(right),
            (Self::Timestamp(left), Self::Timestamp(right)) => left.cmp(right),
            (Self::String(left), Self::String(right)) => left.cmp(right),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Write-side value: either concrete or resolved by the store at insert time.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    Value(FieldValue),
    ServerTimestamp,
}

pub type DocumentFields = BTreeMap<String, FieldValue>;

/// Document as delivered by a live query.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: DocumentFields,
}

impl Document {
    pub fn new(id: DocumentId, fields: DocumentFields) -> Self {
        Self { id, fields }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(FieldValue::as_bool)
    }

    pub fn get_timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.get(field).and_then(FieldValue::as_timestamp)
    }
}

/// Insert request. Field order is irrelevant; later `with_*` calls overwrite.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewDocument {
    pub fields: BTreeMap<String, WriteValue>,
}

impl NewDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields
            .insert(name.into(), WriteValue::Value(value.into()));
        self
    }

    pub fn with_server_timestamp(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), WriteValue::ServerTimestamp);
        self
    }

    /// Replaces every server timestamp sentinel with `now`.
    pub fn resolve(self, now: DateTime<Utc>) -> DocumentFields {
        self.fields
            .into_iter()
            .map(|(name, value)| {
                let resolved = match value {
                    WriteValue::Value(value) => value,
                    WriteValue::ServerTimestamp => FieldValue::Timestamp(now),
                };
                (name, resolved)
            })
            .collect()
    }
}

/// Live query over one collection, ascending on `order_by`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveQuery {
    pub collection: String,
    pub order_by: String,
}

impl LiveQuery {
    pub fn new(collection: impl Into<String>, order_by: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: order_by.into(),
        }
    }

    /// Sorts documents into snapshot order.
    ///
    /// Stable, so insertion order breaks ties. Documents without the field sort first.
    pub fn order(&self, documents: &mut [Document]) {
        documents.sort_by(|left, right| {
            match (left.get(&self.order_by), right.get(&self.order_by)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(left), Some(right)) => left.query_cmp(right),
            }
        });
    }
}

/// Full result set of a live query at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub collection: String,
    pub documents: Vec<Document>,
}

/// Failure reported on a live query without ending it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub stage: &'static str,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    Snapshot(Snapshot),
    Error(StreamFailure),
}

/// Result of a blob upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocator {
    pub object_path: String,
    pub size_bytes: u64,
}
