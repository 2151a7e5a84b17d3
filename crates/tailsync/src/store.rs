//! Durable storage for canonical rows and checkpoints.
//!
//! Both stores are injected into the orchestrator as trait objects.
//! [`DatabaseStore`] and [`DatabaseCheckpointStore`] persist through sea-orm;
//! the in-memory variants back tests and dry runs.

mod database;
mod errors;
mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::checkpoint::Checkpoint;
use crate::entity::chain::Chain;
use crate::entity::data_type::DataType;
use crate::source::{CanonicalRow, RowModel};

pub use database::{DatabaseCheckpointStore, DatabaseStore, SavedCheckpoint};
pub use errors::{CheckpointError, StoreError};
pub use memory::{MemoryCheckpointStore, MemoryRowStore};

/// Upsert/delete backend for canonical rows.
///
/// Both operations are keyed by the deterministic row id and must be safe to
/// call concurrently and to replay.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert or overwrite rows by id. Returns the number of rows changed.
    async fn upsert(&self, data_type: DataType, rows: Vec<RowModel>) -> Result<u64, StoreError>;

    /// Delete rows by id. Returns the number of rows removed.
    async fn delete(&self, data_type: DataType, ids: Vec<Vec<u8>>) -> Result<u64, StoreError>;
}

/// Persistence for the latest checkpoint of each feed.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(
        &self,
        data_type: DataType,
        chain: Chain,
    ) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Replace the stored checkpoint for a feed.
    async fn save(
        &self,
        data_type: DataType,
        chain: Chain,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError>;

    /// Remove the stored checkpoint. Returns whether one existed.
    async fn clear(&self, data_type: DataType, chain: Chain) -> Result<bool, CheckpointError>;
}

/// Counts from one [`apply`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyResult {
    pub upserted: usize,
    pub deleted: usize,
}

impl ApplyResult {
    pub fn rows_written(&self) -> usize {
        self.upserted + self.deleted
    }
}

/// Write a page of canonical rows.
///
/// Rows are split by their soft-delete flag. Live rows are upserted first
/// (duplicates within the page collapse to the last occurrence), then
/// flagged rows are deleted by id, so a row deleted upstream ends up absent
/// whatever order its records arrive in. Store errors are returned unchanged.
///
/// # Errors
/// Returns [`StoreError::DataTypeMismatch`] if a row does not belong to
/// `data_type`, or the store's own error if a write fails.
pub async fn apply(
    store: &dyn RowStore,
    data_type: DataType,
    rows: Vec<CanonicalRow>,
) -> Result<ApplyResult, StoreError> {
    let mut upserts: Vec<RowModel> = Vec::new();
    let mut positions: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut deletes: Vec<Vec<u8>> = Vec::new();

    for CanonicalRow { row, deleted } in rows {
        if row.data_type() != data_type {
            return Err(StoreError::DataTypeMismatch {
                expected: data_type,
                found: row.data_type(),
            });
        }
        if deleted {
            deletes.push(row.id().to_vec());
        } else if let Some(&at) = positions.get(row.id()) {
            upserts[at] = row;
        } else {
            positions.insert(row.id().to_vec(), upserts.len());
            upserts.push(row);
        }
    }

    deletes.sort();
    deletes.dedup();

    let result = ApplyResult {
        upserted: upserts.len(),
        deleted: deletes.len(),
    };

    if !upserts.is_empty() {
        store.upsert(data_type, upserts).await?;
    }
    if !deletes.is_empty() {
        store.delete(data_type, deletes).await?;
    }

    tracing::debug!(
        data_type = %data_type,
        upserted = result.upserted,
        deleted = result.deleted,
        "Applied page"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::transfer;
    use chrono::{TimeZone, Utc};

    pub(crate) fn transfer_row(id: u8, updated_hour: u32, deleted: bool) -> CanonicalRow {
        let at = Utc
            .with_ymd_and_hms(2023, 1, 15, updated_hour, 0, 0)
            .unwrap()
            .fixed_offset();
        CanonicalRow {
            row: RowModel::Transfer(transfer::Model {
                id: vec![id; 32],
                contract: vec![0x0c; 20],
                token_id: id.to_string(),
                from_address: vec![1; 20],
                to_address: vec![2; 20],
                amount: "1".to_string(),
                block: 1,
                tx_hash: vec![id; 32],
                log_index: 0,
                batch_index: 0,
                transferred_at: at,
                updated_at: at,
            }),
            deleted,
        }
    }

    #[tokio::test]
    async fn apply_upserts_then_deletes() {
        let store = MemoryRowStore::new();
        let result = apply(
            &store,
            DataType::Transfers,
            vec![
                transfer_row(1, 1, false),
                transfer_row(2, 1, false),
                transfer_row(2, 2, true),
            ],
        )
        .await
        .unwrap();

        assert_eq!(result, ApplyResult { upserted: 2, deleted: 1 });
        assert_eq!(result.rows_written(), 3);
        assert!(store.contains(DataType::Transfers, &[1; 32]));
        assert!(!store.contains(DataType::Transfers, &[2; 32]));
    }

    #[tokio::test]
    async fn delete_arriving_before_create_still_ends_absent() {
        let store = MemoryRowStore::new();
        apply(&store, DataType::Transfers, vec![transfer_row(3, 2, true)])
            .await
            .unwrap();
        apply(
            &store,
            DataType::Transfers,
            vec![transfer_row(3, 1, false), transfer_row(3, 2, true)],
        )
        .await
        .unwrap();
        assert_eq!(store.len(DataType::Transfers), 0);
    }

    #[tokio::test]
    async fn replaying_a_page_is_idempotent() {
        let store = MemoryRowStore::new();
        let page = vec![
            transfer_row(1, 1, false),
            transfer_row(4, 1, false),
            transfer_row(5, 1, true),
        ];

        apply(&store, DataType::Transfers, page.clone()).await.unwrap();
        let once = store.rows(DataType::Transfers);
        apply(&store, DataType::Transfers, page).await.unwrap();
        assert_eq!(store.rows(DataType::Transfers), once);
    }

    #[tokio::test]
    async fn duplicate_ids_collapse_to_last_occurrence() {
        let store = MemoryRowStore::new();
        let result = apply(
            &store,
            DataType::Transfers,
            vec![transfer_row(1, 1, false), transfer_row(1, 5, false)],
        )
        .await
        .unwrap();
        assert_eq!(result.upserted, 1);

        let rows = store.rows(DataType::Transfers);
        let RowModel::Transfer(row) = &rows[0] else {
            panic!("expected a transfer");
        };
        assert_eq!(row.updated_at.to_rfc3339(), "2023-01-15T05:00:00+00:00");
    }

    #[tokio::test]
    async fn mismatched_data_type_is_rejected_before_writing() {
        let store = MemoryRowStore::new();
        let err = apply(&store, DataType::Sales, vec![transfer_row(1, 1, false)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DataTypeMismatch { .. }));
        assert_eq!(store.len(DataType::Transfers), 0);
    }

    #[tokio::test]
    async fn write_failures_surface_unchanged() {
        let store = MemoryRowStore::new();
        store.fail_next_writes(1);
        let err = apply(&store, DataType::Transfers, vec![transfer_row(1, 1, false)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.len(DataType::Transfers), 0);
    }

    #[tokio::test]
    async fn empty_page_writes_nothing() {
        let store = MemoryRowStore::new();
        store.fail_next_writes(1);
        let result = apply(&store, DataType::Transfers, Vec::new()).await.unwrap();
        assert_eq!(result.rows_written(), 0);
    }
}
