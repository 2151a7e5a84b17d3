//! Tailsync - checkpointed backfill and live tailing of paginated event feeds.
//!
//! A sync run walks a feed month by month from a start date, splitting each
//! month across concurrent workers, and once the current month is caught up
//! keeps following it. Rows are written idempotently and the whole
//! orchestration state is checkpointed so an interrupted run resumes where it
//! stopped.
//!
//! # Features
//!
//! - `migrate` - Enables database migration support. When enabled, you can use
//!   [`connect_and_migrate`] to automatically run migrations on connection.
//! - `sqlite` / `postgres` - Database backends.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tailsync::{ApiClient, Chain, DataType, DatabaseCheckpointStore, DatabaseStore};
//! use tailsync::sync::{Orchestrator, SyncConfig, SyncDeps};
//!
//! let db = tailsync::connect_and_migrate("sqlite://tailsync.db?mode=rwc").await?;
//! let client = ApiClient::new(Chain::Ethereum, Some(api_key), None)?;
//! let deps = SyncDeps::new(
//!     Arc::new(client),
//!     Arc::new(DatabaseStore::new(db.clone())),
//!     Arc::new(DatabaseCheckpointStore::new(db)),
//! );
//! let config = SyncConfig::new(DataType::Sales, Chain::Ethereum, start_date);
//! let summary = Orchestrator::new(config, deps, None)?.run(cancel).await?;
//! ```

pub mod checkpoint;
pub mod db;
pub mod entity;
pub mod http;
pub mod retry;
pub mod source;
pub mod store;
pub mod sync;

#[cfg(feature = "migrate")]
pub mod migration;

pub use checkpoint::{Checkpoint, ManagerCheckpoint, WorkerCheckpoint};
pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use source::{
    ApiClient, ApiError, ApiRateLimiter, CanonicalRow, ContractAllowList, PageRequest, PageSource,
    RowModel,
};
pub use store::{
    CheckpointError, CheckpointStore, DatabaseCheckpointStore, DatabaseStore,
    MemoryCheckpointStore, MemoryRowStore, RowStore, StoreError,
};
pub use sync::{Orchestrator, SyncConfig, SyncDeps, SyncError, SyncProgress, SyncSummary};
