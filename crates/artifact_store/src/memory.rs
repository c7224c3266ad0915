//! In-memory artifact store for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use common::{Error, Result};

use crate::store::{ArtifactStore, WritePrecondition, WriteResult};

/// Thread-safe in-memory store keyed by artifact name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key without counting it as a write.
    pub fn with(self, key: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), bytes.into());
        self
    }

    /// Number of successful writes (including removals) since creation.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored artifact.
    pub fn snapshot(&self) -> HashMap<String, Vec<u8>> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ArtifactStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let removed = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
        if removed.is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn put_if(
        &self,
        key: &str,
        bytes: &[u8],
        precondition: &WritePrecondition,
    ) -> Result<WriteResult> {
        // Hold the write lock across compare and swap.
        let mut data = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = data.get(key);
        if !precondition.holds_for(current.map(Vec::as_slice)) {
            return Ok(WriteResult::PreconditionFailed {
                current: current.cloned(),
            });
        }
        data.insert(key.to_string(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(WriteResult::Written)
    }
}
