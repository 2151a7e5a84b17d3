//! In-memory stores for tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::errors::{CheckpointError, StoreError};
use super::{CheckpointStore, RowStore};
use crate::checkpoint::Checkpoint;
use crate::entity::chain::Chain;
use crate::entity::data_type::DataType;
use crate::source::RowModel;

/// Row store holding one ordered map per data type.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: Mutex<HashMap<DataType, BTreeMap<Vec<u8>, RowModel>>>,
    failures_pending: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` write calls fail with [`StoreError::Unavailable`].
    pub fn fail_next_writes(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Rows of a table in id order.
    pub fn rows(&self, data_type: DataType) -> Vec<RowModel> {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&data_type)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, data_type: DataType) -> usize {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&data_type)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .all(BTreeMap::is_empty)
    }

    pub fn contains(&self, data_type: DataType, id: &[u8]) -> bool {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&data_type)
            .is_some_and(|t| t.contains_key(id))
    }

    /// Number of successful upsert and delete calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn upsert(&self, data_type: DataType, rows: Vec<RowModel>) -> Result<u64, StoreError> {
        self.check_failure()?;
        if let Some(row) = rows.iter().find(|r| r.data_type() != data_type) {
            return Err(StoreError::DataTypeMismatch {
                expected: data_type,
                found: row.data_type(),
            });
        }

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let table = tables.entry(data_type).or_default();
        let count = rows.len() as u64;
        for row in rows {
            table.insert(row.id().to_vec(), row);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(count)
    }

    async fn delete(&self, data_type: DataType, ids: Vec<Vec<u8>>) -> Result<u64, StoreError> {
        self.check_failure()?;
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let table = tables.entry(data_type).or_default();
        let removed = ids.iter().filter(|id| table.remove(*id).is_some()).count();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(removed as u64)
    }
}

/// Checkpoint store keeping the latest checkpoint per feed in memory.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    saved: Mutex<HashMap<(DataType, Chain), Checkpoint>>,
    saves: AtomicUsize,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a checkpoint without counting it as a save.
    pub fn with_checkpoint(self, data_type: DataType, chain: Chain, checkpoint: Checkpoint) -> Self {
        self.saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((data_type, chain), checkpoint);
        self
    }

    /// Latest saved checkpoint for a feed.
    pub fn get(&self, data_type: DataType, chain: Chain) -> Option<Checkpoint> {
        self.saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(data_type, chain))
            .cloned()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(
        &self,
        data_type: DataType,
        chain: Chain,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.get(data_type, chain))
    }

    async fn save(
        &self,
        data_type: DataType,
        chain: Chain,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        checkpoint.validate()?;
        self.saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((data_type, chain), checkpoint.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self, data_type: DataType, chain: Chain) -> Result<bool, CheckpointError> {
        Ok(self
            .saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(data_type, chain))
            .is_some())
    }
}
