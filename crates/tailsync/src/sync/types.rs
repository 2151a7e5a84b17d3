//! Sync configuration, collaborators and outcomes.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use super::clock::{Clock, SystemClock};
use super::error::SyncError;
use super::progress::ProgressCallback;
use crate::checkpoint::Checkpoint;
use crate::entity::chain::Chain;
use crate::entity::data_type::DataType;
use crate::source::{ContractAllowList, PageSource};
use crate::store::{CheckpointStore, RowStore};

/// Default number of concurrently backfilled months.
pub const DEFAULT_UNITS: usize = 4;

/// Default number of sub-windows per month.
pub const DEFAULT_WORKERS_PER_UNIT: usize = 4;

/// Delay between polls once an open-ended window has caught up.
pub const DEFAULT_TAIL_INTERVAL: Duration = Duration::from_secs(15);

/// Delay before retrying a failed page.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Interval between progress checkpoints while workers make progress.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

/// What to sync and how to pace it.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub data_type: DataType,
    pub chain: Chain,
    /// Only rows for these contracts are written (empty = all).
    pub contracts: ContractAllowList,
    /// Number of unit managers (months backfilled in parallel).
    pub units: usize,
    /// Sub-windows per month.
    pub workers_per_unit: usize,
    /// Backfill starts at the month containing this date.
    pub start_date: NaiveDate,
    /// Resume from the stored checkpoint when one exists.
    pub resume: bool,
    /// Explicit checkpoint to restore; takes precedence over the store.
    pub checkpoint: Option<Checkpoint>,
    pub tail_interval: Duration,
    pub retry_backoff: Duration,
    pub checkpoint_interval: Duration,
}

impl SyncConfig {
    pub fn new(data_type: DataType, chain: Chain, start_date: NaiveDate) -> Self {
        Self {
            data_type,
            chain,
            contracts: ContractAllowList::default(),
            units: DEFAULT_UNITS,
            workers_per_unit: DEFAULT_WORKERS_PER_UNIT,
            start_date,
            resume: true,
            checkpoint: None,
            tail_interval: DEFAULT_TAIL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_contracts(mut self, contracts: ContractAllowList) -> Self {
        self.contracts = contracts;
        self
    }

    #[must_use]
    pub fn with_units(mut self, units: usize, workers_per_unit: usize) -> Self {
        self.units = units;
        self.workers_per_unit = workers_per_unit;
        self
    }

    #[must_use]
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    #[must_use]
    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    #[must_use]
    pub fn with_intervals(
        mut self,
        tail_interval: Duration,
        retry_backoff: Duration,
        checkpoint_interval: Duration,
    ) -> Self {
        self.tail_interval = tail_interval;
        self.retry_backoff = retry_backoff;
        self.checkpoint_interval = checkpoint_interval;
        self
    }

    /// # Errors
    /// Returns [`SyncError::Validation`] for zero counts or any zero interval.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.units == 0 {
            return Err(SyncError::Validation("units must be at least 1".into()));
        }
        if self.workers_per_unit == 0 {
            return Err(SyncError::Validation(
                "workers per unit must be at least 1".into(),
            ));
        }
        for (name, interval) in [
            ("tail interval", self.tail_interval),
            ("retry backoff", self.retry_backoff),
            ("checkpoint interval", self.checkpoint_interval),
        ] {
            if interval.is_zero() {
                return Err(SyncError::Validation(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// Collaborators injected into the orchestrator.
#[derive(Clone)]
pub struct SyncDeps {
    pub source: Arc<dyn PageSource>,
    pub rows: Arc<dyn RowStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub clock: Arc<dyn Clock>,
}

impl SyncDeps {
    /// Collaborators using the system clock.
    pub fn new(
        source: Arc<dyn PageSource>,
        rows: Arc<dyn RowStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            source,
            rows,
            checkpoints,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Shared, read-only state handed to every manager and worker task.
pub(crate) struct SyncContext {
    pub config: SyncConfig,
    pub deps: SyncDeps,
    pub on_progress: Option<ProgressCallback>,
}

/// Result of one successful worker poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Items in the page before filtering.
    pub received: usize,
    /// Rows upserted plus rows deleted.
    pub rows_written: usize,
    /// The continuation came back empty.
    pub exhausted: bool,
}

/// How a unit manager's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerOutcome {
    /// All workers drained and the month is the current one.
    Backfilled,
    /// All workers drained a past month.
    Exhausted,
    /// A task panicked or the unit was in an invalid state.
    Failed(String),
    /// Shutdown was requested.
    Cancelled,
}

/// Totals reported when [`Orchestrator::run`](super::Orchestrator::run) returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub pages_fetched: u64,
    pub page_failures: u64,
    pub rows_written: u64,
    pub units_retired: usize,
    pub checkpoints_saved: u64,
    pub backfilled: bool,
}
