//! Circuit record storage port with in-memory and sled-backed implementations.

use crate::circuit::CircuitRecord;
use crate::error::StorageError;
use parking_lot::RwLock;
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::sync::Arc;

const TREE_CIRCUITS: &str = "circuits";

/// Storage port for circuit records.
pub trait CircuitStore: Send + Sync {
    fn load(&self, circuit_id: &str) -> Result<Option<CircuitRecord>, StorageError>;
    fn save(&self, record: &CircuitRecord) -> Result<(), StorageError>;
    fn list(&self) -> Result<Vec<CircuitRecord>, StorageError>;
}

/// Process-local store; circuit state is lost on restart.
#[derive(Default)]
pub struct MemoryCircuitStore {
    records: RwLock<BTreeMap<String, CircuitRecord>>,
}

impl MemoryCircuitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl CircuitStore for MemoryCircuitStore {
    fn load(&self, circuit_id: &str) -> Result<Option<CircuitRecord>, StorageError> {
        Ok(self.records.read().get(circuit_id).cloned())
    }

    fn save(&self, record: &CircuitRecord) -> Result<(), StorageError> {
        self.records
            .write()
            .insert(record.circuit_id.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<CircuitRecord>, StorageError> {
        Ok(self.records.read().values().cloned().collect())
    }
}

/// Durable store keeping one JSON record per circuit id in a sled tree.
#[derive(Clone)]
pub struct SledCircuitStore {
    circuits: Tree,
}

impl SledCircuitStore {
    pub fn new(db: &Db) -> Result<Self, StorageError> {
        let circuits = db.open_tree(TREE_CIRCUITS)?;
        Ok(Self { circuits })
    }

    pub fn shared(db: &Db) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(db)?))
    }
}

impl CircuitStore for SledCircuitStore {
    fn load(&self, circuit_id: &str) -> Result<Option<CircuitRecord>, StorageError> {
        let Some(raw) = self.circuits.get(circuit_id.as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    fn save(&self, record: &CircuitRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record)?;
        self.circuits.insert(record.circuit_id.as_bytes(), value)?;
        self.circuits.flush()?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<CircuitRecord>, StorageError> {
        let mut out = Vec::new();
        for entry in self.circuits.iter() {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }
}
