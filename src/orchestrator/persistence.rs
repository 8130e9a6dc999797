//! Attempt records for every major cycle.

use crate::error::StorageError;
use crate::retry::FailoverMetadata;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const TREE_ATTEMPTS: &str = "attempts";

/// One major-cycle outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub timestamp: DateTime<Utc>,
    pub generator_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub success: bool,
    /// Content came from the FALLBACK tier after the primary failed
    pub used_fallback: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover: Option<FailoverMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Sink for attempt records. Callers treat failures as non-fatal.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record_attempt(&self, record: &AttemptRecord) -> Result<(), StorageError>;
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn record_attempt(&self, _record: &AttemptRecord) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Attempt log in a sled tree, keyed so iteration order is chronological.
pub struct SledAttemptLog {
    attempts: Tree,
    sequence: AtomicU64,
}

impl SledAttemptLog {
    pub fn new(db: &Db) -> Result<Self, StorageError> {
        let attempts = db.open_tree(TREE_ATTEMPTS)?;
        Ok(Self {
            attempts,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn shared(db: &Db) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(db)?))
    }

    fn key_for(&self, record: &AttemptRecord) -> String {
        let millis = record.timestamp.timestamp_millis().max(0);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{:020}-{:06}", millis, seq % 1_000_000)
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AttemptRecord>, StorageError> {
        let mut out = Vec::with_capacity(limit);
        for entry in self.attempts.iter().rev().take(limit) {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

#[async_trait]
impl PersistenceSink for SledAttemptLog {
    async fn record_attempt(&self, record: &AttemptRecord) -> Result<(), StorageError> {
        let key = self.key_for(record);
        let value = serde_json::to_vec(record)?;
        self.attempts.insert(key.as_bytes(), value)?;
        self.attempts.flush()?;
        Ok(())
    }
}
