//! Records derived from documents, and the structured inserts they produce

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::db::{ColumnValue, InsertSpec};

/// Destination columns, in statement order
pub const COLUMNS: [&str; 6] = ["id", "data", "hash", "load_id", "created_at", "updated_at"];

/// One document prepared for writing
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub data: String,
    pub hash: String,
    pub load_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(id: String, document: &Value, load_id: &str) -> Self {
        let data = document.to_string();
        let hash = content_hash(&data);
        let now = Utc::now();
        Self {
            id,
            data,
            hash,
            load_id: load_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_insert(&self, table: &str) -> InsertSpec {
        InsertSpec {
            table: table.to_string(),
            columns: vec![
                (COLUMNS[0].to_string(), ColumnValue::Text(self.id.clone())),
                (COLUMNS[1].to_string(), ColumnValue::Text(self.data.clone())),
                (COLUMNS[2].to_string(), ColumnValue::Text(self.hash.clone())),
                (COLUMNS[3].to_string(), ColumnValue::Text(self.load_id.clone())),
                (COLUMNS[4].to_string(), ColumnValue::Timestamp(self.created_at)),
                (COLUMNS[5].to_string(), ColumnValue::Timestamp(self.updated_at)),
            ],
        }
    }
}

/// SHA-256 of the serialized document, as lowercase hex
pub fn content_hash(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    format!("{:x}", digest)
}
