//! sea-orm backed stores.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::{Alias, Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, Iterable, QueryFilter, QueryOrder,
};

use super::errors::{CheckpointError, StoreError};
use super::{CheckpointStore, RowStore};
use crate::checkpoint::Checkpoint;
use crate::entity::chain::Chain;
use crate::entity::data_type::DataType;
use crate::entity::{sale, sync_checkpoint, transfer};
use crate::retry::{WritePolicy, retry_write};
use crate::source::RowModel;

/// Rows per sales upsert statement (36 bound columns per row).
const SALES_CHUNK_SIZE: usize = 500;

/// Rows per transfers upsert statement (12 bound columns per row).
const TRANSFERS_CHUNK_SIZE: usize = 1000;

/// Ids per delete statement.
const DELETE_CHUNK_SIZE: usize = 500;

// ─── Row Store ───────────────────────────────────────────────────────────────

/// Row store writing to the `sales` and `transfers` tables.
///
/// Upserts are `INSERT ... ON CONFLICT (id) DO UPDATE` that only touch a row
/// when its `updated_at` differs, so replayed pages are no-ops. Transient
/// errors (locked database, dropped connection) are retried with
/// exponential backoff before being returned.
#[derive(Debug, Clone)]
pub struct DatabaseStore {
    db: DatabaseConnection,
    retry: WritePolicy,
}

impl DatabaseStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            retry: WritePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: WritePolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn upsert_sales(&self, rows: Vec<sale::ActiveModel>) -> Result<u64, StoreError> {
        let db = &self.db;
        let mut written = 0;
        for chunk in rows.chunks(SALES_CHUNK_SIZE) {
            written += retry_write("sales upsert", self.retry, || {
                sale::Entity::insert_many(chunk.to_vec())
                    .on_conflict(sales_on_conflict())
                    .exec_without_returning(db)
            })
            .await?;
        }
        Ok(written)
    }

    async fn upsert_transfers(&self, rows: Vec<transfer::ActiveModel>) -> Result<u64, StoreError> {
        let db = &self.db;
        let mut written = 0;
        for chunk in rows.chunks(TRANSFERS_CHUNK_SIZE) {
            written += retry_write("transfers upsert", self.retry, || {
                transfer::Entity::insert_many(chunk.to_vec())
                    .on_conflict(transfers_on_conflict())
                    .exec_without_returning(db)
            })
            .await?;
        }
        Ok(written)
    }
}

#[async_trait]
impl RowStore for DatabaseStore {
    async fn upsert(&self, data_type: DataType, rows: Vec<RowModel>) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mismatch = |found: DataType| StoreError::DataTypeMismatch {
            expected: data_type,
            found,
        };

        match data_type {
            DataType::Sales => {
                let models = rows
                    .into_iter()
                    .map(|row| match row {
                        RowModel::Sale(m) => Ok(m.into_active_model().reset_all()),
                        other => Err(mismatch(other.data_type())),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.upsert_sales(models).await
            }
            DataType::Transfers => {
                let models = rows
                    .into_iter()
                    .map(|row| match row {
                        RowModel::Transfer(m) => Ok(m.into_active_model().reset_all()),
                        other => Err(mismatch(other.data_type())),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.upsert_transfers(models).await
            }
        }
    }

    async fn delete(&self, data_type: DataType, ids: Vec<Vec<u8>>) -> Result<u64, StoreError> {
        let db = &self.db;
        let mut deleted = 0;
        for chunk in ids.chunks(DELETE_CHUNK_SIZE) {
            deleted += retry_write("row delete", self.retry, move || async move {
                let result = match data_type {
                    DataType::Sales => {
                        sale::Entity::delete_many()
                            .filter(sale::Column::Id.is_in(chunk.to_vec()))
                            .exec(db)
                            .await?
                    }
                    DataType::Transfers => {
                        transfer::Entity::delete_many()
                            .filter(transfer::Column::Id.is_in(chunk.to_vec()))
                            .exec(db)
                            .await?
                    }
                };
                Ok::<_, DbErr>(result.rows_affected)
            })
            .await?;
        }
        Ok(deleted)
    }
}

/// ON CONFLICT clause for `sales`: overwrite every column except the id,
/// only when `updated_at` changed.
pub(crate) fn sales_on_conflict() -> OnConflict {
    OnConflict::column(sale::Column::Id)
        .update_columns(sale::Column::iter().filter(|c| !matches!(c, sale::Column::Id)))
        .action_and_where(
            Expr::col((sale::Entity, sale::Column::UpdatedAt))
                .ne(Expr::col((Alias::new("excluded"), sale::Column::UpdatedAt))),
        )
        .to_owned()
}

/// ON CONFLICT clause for `transfers`, same rule as [`sales_on_conflict`].
pub(crate) fn transfers_on_conflict() -> OnConflict {
    OnConflict::column(transfer::Column::Id)
        .update_columns(transfer::Column::iter().filter(|c| !matches!(c, transfer::Column::Id)))
        .action_and_where(
            Expr::col((transfer::Entity, transfer::Column::UpdatedAt))
                .ne(Expr::col((Alias::new("excluded"), transfer::Column::UpdatedAt))),
        )
        .to_owned()
}


// ─── Checkpoint Store ────────────────────────────────────────────────────────

/// A stored checkpoint with its feed and save time.
#[derive(Debug, Clone)]
pub struct SavedCheckpoint {
    pub data_type: DataType,
    pub chain: Chain,
    pub saved_at: DateTime<FixedOffset>,
    pub checkpoint: Checkpoint,
}

/// Checkpoint store keeping one `sync_checkpoints` row per feed.
#[derive(Debug, Clone)]
pub struct DatabaseCheckpointStore {
    db: DatabaseConnection,
}

impl DatabaseCheckpointStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Every stored checkpoint, ordered by feed key.
    ///
    /// # Errors
    /// Fails on the first row whose state is not a valid checkpoint.
    pub async fn list(&self) -> Result<Vec<SavedCheckpoint>, CheckpointError> {
        let rows = sync_checkpoint::Entity::find()
            .order_by_asc(sync_checkpoint::Column::Id)
            .all(&self.db)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SavedCheckpoint {
                    data_type: row.data_type,
                    chain: row.chain,
                    saved_at: row.saved_at,
                    checkpoint: Checkpoint::from_json(row.state)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CheckpointStore for DatabaseCheckpointStore {
    async fn load(
        &self,
        data_type: DataType,
        chain: Chain,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let key = sync_checkpoint::Model::feed_key(data_type, chain);
        let Some(row) = sync_checkpoint::Entity::find_by_id(key).one(&self.db).await? else {
            return Ok(None);
        };
        Checkpoint::from_json(row.state).map(Some)
    }

    async fn save(
        &self,
        data_type: DataType,
        chain: Chain,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        let model = sync_checkpoint::ActiveModel {
            id: Set(sync_checkpoint::Model::feed_key(data_type, chain)),
            data_type: Set(data_type),
            chain: Set(chain),
            state: Set(checkpoint.to_json()?),
            saved_at: Set(Utc::now().fixed_offset()),
        };

        sync_checkpoint::Entity::insert(model)
            .on_conflict(
                OnConflict::column(sync_checkpoint::Column::Id)
                    .update_columns([
                        sync_checkpoint::Column::State,
                        sync_checkpoint::Column::SavedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    async fn clear(&self, data_type: DataType, chain: Chain) -> Result<bool, CheckpointError> {
        let key = sync_checkpoint::Model::feed_key(data_type, chain);
        let result = sync_checkpoint::Entity::delete_by_id(key)
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
