//! Document rows and their on-disk JSON encoding.
//!
//! Every row carries a little metadata for version tracking next to the
//! user columns. The Git backend stores rows as pretty-printed JSON blobs:
//!
//! ```text
//! {
//!   "_pk": "abc123",
//!   "_version": 1,
//!   "_created_at": "2026-01-01T00:00:00+00:00",
//!   "_updated_at": "2026-01-01T00:00:00+00:00",
//!   "name": "abc"
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::RowKey;

/// A document row: primary key, metadata and column values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: RowKey,
    /// Incremented by every update.
    pub version: u64,
    pub created_at: String,
    pub updated_at: String,
    pub data: BTreeMap<String, Value>,
}

impl Row {
    /// Create a version 1 row stamped with the current time.
    pub fn new(key: RowKey, data: BTreeMap<String, Value>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            key,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
            data,
        }
    }

    /// Create a row from a JSON object.
    pub fn from_value(key: RowKey, value: Value) -> StorageResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::new(key, map.into_iter().collect())),
            _ => Err(StorageError::SchemaViolation(
                "row data must be a JSON object".to_string(),
            )),
        }
    }

    /// Build the next version of a stored row, replacing its data.
    pub(crate) fn succeed(previous: &Row, mut next: Row) -> Row {
        next.version = previous.version + 1;
        next.created_at = previous.created_at.clone();
        next.updated_at = chrono::Utc::now().to_rfc3339();
        next
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }
}

#[derive(Serialize, Deserialize)]
struct RowJson {
    #[serde(rename = "_pk")]
    pk: String,
    #[serde(rename = "_version")]
    version: u64,
    #[serde(rename = "_created_at")]
    created_at: String,
    #[serde(rename = "_updated_at")]
    updated_at: String,
    #[serde(flatten)]
    data: BTreeMap<String, Value>,
}

/// Serialize a row to JSON bytes with stable key ordering.
pub(crate) fn serialize_row(row: &Row) -> StorageResult<Vec<u8>> {
    let json = RowJson {
        pk: row.key.as_str().to_string(),
        version: row.version,
        created_at: row.created_at.clone(),
        updated_at: row.updated_at.clone(),
        data: row.data.clone(),
    };
    Ok(serde_json::to_vec_pretty(&json)?)
}

/// Deserialize a row, checking that the embedded key matches the file name.
pub(crate) fn deserialize_row(bytes: &[u8], expected_key: &RowKey) -> StorageResult<Row> {
    let json: RowJson = serde_json::from_slice(bytes)?;

    if json.pk != expected_key.as_str() {
        return Err(StorageError::CorruptedData {
            path: expected_key.file_name().into(),
            reason: format!(
                "primary key mismatch: file name suggests '{}' but content has '{}'",
                expected_key, json.pk
            ),
        });
    }

    Ok(Row {
        key: expected_key.clone(),
        version: json.version,
        created_at: json.created_at,
        updated_at: json.updated_at,
        data: json.data,
    })
}
