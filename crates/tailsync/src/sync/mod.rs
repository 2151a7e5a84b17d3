//! Checkpointed backfill and live tailing.
//!
//! # Module Structure
//!
//! - [`orchestrator`] - `Orchestrator`: the live unit set, month cursor and checkpoints
//! - [`manager`] - `UnitManager`: one month split across workers
//! - [`worker`] - `UnitWorker`: one sub-window drained page by page
//! - [`window`] - Month arithmetic, partitioning and page queries
//! - [`types`] - Configuration, collaborators, outcomes and constants
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//!
//! # Example
//!
//! ```ignore
//! use tailsync::sync::{Orchestrator, SyncConfig, SyncDeps};
//!
//! let config = SyncConfig::new(DataType::Sales, Chain::Ethereum, start_date);
//! let deps = SyncDeps::new(Arc::new(client), Arc::new(rows), Arc::new(checkpoints));
//! let mut orchestrator = Orchestrator::new(config, deps, None)?;
//! let summary = orchestrator.run(cancel_token).await?;
//! ```

pub mod arena;
mod clock;
mod error;
pub mod manager;
pub mod orchestrator;
mod progress;
mod types;
pub mod window;
pub mod worker;

#[cfg(test)]
pub(crate) mod fixtures;

pub use arena::ArenaKey;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SyncError;
pub use manager::UnitManager;
pub use orchestrator::Orchestrator;
pub use progress::{ProgressCallback, SyncProgress, emit};
pub use types::{
    DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_RETRY_BACKOFF, DEFAULT_TAIL_INTERVAL, DEFAULT_UNITS,
    DEFAULT_WORKERS_PER_UNIT, ManagerOutcome, PollOutcome, SyncConfig, SyncDeps, SyncSummary,
};
pub use window::{Month, SubWindow};
pub use worker::UnitWorker;
