//! Sled-based storage for call records.
//!
//! Records live in the `call_records` tree, keyed by the big-endian record id
//! so iteration follows write order. The store is append-only: there is no
//! update or delete path.

use crate::insight::Insight;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

const RECORDS_TREE: &str = "call_records";
const SCHEMA_VERSION_KEY: &[u8] = b"call_records.schema_version";
const SCHEMA_VERSION: &[u8] = b"1";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("schema not initialised: call ensure_schema first")]
    SchemaNotReady,
    #[error("schema version mismatch: found {found}")]
    SchemaMismatch { found: String },
    #[error("record {0} already exists")]
    Conflict(u64),
    #[error("refusing to store a call record with an empty transcript")]
    EmptyTranscript,
}

/// A persisted transcript together with its insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: u64,
    /// The transcript exactly as submitted
    pub transcript: String,
    #[serde(flatten)]
    pub insight: Insight,
    /// When the record was written
    pub created_at: DateTime<Utc>,
}

impl CallRecord {
    fn new(id: u64, transcript: String, insight: Insight) -> Self {
        Self {
            id,
            transcript,
            insight,
            created_at: Utc::now(),
        }
    }
}

/// Append-only store for call records.
///
/// Open it once at startup and hand it to whatever needs it; the underlying
/// `sled::Db` is safe to share between tasks.
pub struct InsightStore {
    db: sled::Db,
    records: OnceLock<sled::Tree>,
}

impl InsightStore {
    /// Open or create storage at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            records: OnceLock::new(),
        })
    }

    /// Create the records tree if it does not exist yet. Safe to call on every start.
    pub fn ensure_schema(&self) -> Result<(), StorageError> {
        match self.db.get(SCHEMA_VERSION_KEY)? {
            Some(found) if &found[..] != SCHEMA_VERSION => {
                return Err(StorageError::SchemaMismatch {
                    found: String::from_utf8_lossy(&found).into_owned(),
                });
            }
            Some(_) => {}
            None => {
                self.db.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION)?;
                info!("created {} schema", RECORDS_TREE);
            }
        }

        let tree = self.db.open_tree(RECORDS_TREE)?;
        // A concurrent caller may have set it first; both handles point at the same tree.
        let _ = self.records.set(tree);
        self.db.flush()?;
        Ok(())
    }

    fn records(&self) -> Result<&sled::Tree, StorageError> {
        self.records.get().ok_or(StorageError::SchemaNotReady)
    }

    /// Persist a validated insight and return the new record id.
    ///
    /// Ids are unique, start at 1 and increase in write order. Each write is a
    /// single atomic insert, flushed before the id is returned. A blank
    /// transcript is never stored.
    pub async fn persist(&self, transcript: &str, insight: &Insight) -> Result<u64, StorageError> {
        if transcript.trim().is_empty() {
            return Err(StorageError::EmptyTranscript);
        }
        let records = self.records()?;

        let id = self.db.generate_id()? + 1;
        let record = CallRecord::new(id, transcript.to_string(), insight.clone());
        let value = serde_json::to_vec(&record)?;

        records
            .compare_and_swap(id.to_be_bytes(), None as Option<&[u8]>, Some(value))?
            .map_err(|_| StorageError::Conflict(id))?;
        records.flush_async().await?;

        debug!(record_id = id, "persisted call record");
        Ok(id)
    }

    /// Retrieve a record by id
    pub fn get(&self, id: u64) -> Result<Option<CallRecord>, StorageError> {
        match self.records()?.get(id.to_be_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// List all stored records, newest first
    pub fn list_all(&self) -> Result<Vec<CallRecord>, StorageError> {
        let mut results = Vec::new();
        for item in self.records()?.iter().rev() {
            let (_key, value) = item?;
            results.push(serde_json::from_slice(&value)?);
        }
        Ok(results)
    }

    /// Get the number of stored records
    pub fn count(&self) -> Result<usize, StorageError> {
        Ok(self.records()?.len())
    }
}
