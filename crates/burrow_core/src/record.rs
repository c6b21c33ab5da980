//! Records and their reserved attributes.
//!
//! A record is a JSON object. Two attributes are reserved for the sync
//! layer: `_status` (the record's sync lifecycle state) and `last_modified`
//! (an integer timestamp assigned by the server, not by this store). The
//! store adds one internal attribute of its own, `_collection`, to
//! partition the shared records store; it is stamped on write and stripped
//! from every record before results leave the store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A record payload: a JSON object.
pub type Record = Map<String, Value>;

/// Reserved attribute: the record id.
pub const FIELD_ID: &str = "id";
/// Reserved attribute: the sync lifecycle state.
pub const FIELD_STATUS: &str = "_status";
/// Reserved attribute: the last-modified server timestamp.
pub const FIELD_LAST_MODIFIED: &str = "last_modified";

/// Internal attribute partitioning the shared records store.
pub(crate) const FIELD_COLLECTION: &str = "_collection";

/// Sync lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The record matches the server's copy.
    Synced,
    /// The record was created locally and not yet pushed.
    Created,
    /// The record was updated locally and not yet pushed.
    Updated,
    /// The record was deleted locally and not yet pushed.
    Deleted,
}

impl Status {
    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Synced => "synced",
            Status::Created => "created",
            Status::Updated => "updated",
            Status::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Status::Synced),
            "created" => Ok(Status::Created),
            "updated" => Ok(Status::Updated),
            "deleted" => Ok(Status::Deleted),
            _ => Err(()),
        }
    }
}

/// Returns the record's id, if it has a string one.
#[must_use]
pub fn record_id(record: &Map<String, Value>) -> Option<&str> {
    record.get(FIELD_ID).and_then(Value::as_str)
}

/// Generates a fresh record id.
pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Stamps the partition attribute onto a record object.
pub(crate) fn stamp_collection(record: &mut Map<String, Value>, collection: &str) {
    record.insert(
        FIELD_COLLECTION.to_string(),
        Value::String(collection.to_string()),
    );
}

/// Removes the partition attribute from a record value.
pub(crate) fn strip_collection(mut value: Value) -> Value {
    if let Value::Object(ref mut map) = value {
        map.remove(FIELD_COLLECTION);
    }
    value
}
