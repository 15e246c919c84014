use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A single booking record. Field names map to arbitrary JSON values; the
/// engine never looks inside.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Ordered sequence of records, persisted as a JSON array.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordCollection(Vec<Record>);

/// Immutable view of a collection as observed by a consumer. Replaced
/// wholesale on every change.
pub type Snapshot = Arc<RecordCollection>;

impl RecordCollection {
    pub fn new() -> Self {
        RecordCollection(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.0.iter()
    }

    pub fn push(&mut self, record: Record) {
        self.0.push(record);
    }

    /// Builder-style append, convenient when preparing a write.
    pub fn with_record(mut self, record: Record) -> Self {
        self.0.push(record);
        self
    }

    pub fn into_records(self) -> Vec<Record> {
        self.0
    }
}

impl From<Vec<Record>> for RecordCollection {
    fn from(records: Vec<Record>) -> Self {
        RecordCollection(records)
    }
}

impl FromIterator<Record> for RecordCollection {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        RecordCollection(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RecordCollection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl TryFrom<serde_json::Value> for RecordCollection {
    type Error = serde_json::Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
    }
}
