//! Progress reporting for sync operations.
//!
//! The orchestrator and its tasks emit [`SyncProgress`] events through an
//! optional callback so front ends can render or log orchestration without
//! the library knowing how.

use crate::entity::chain::Chain;
use crate::entity::data_type::DataType;

use super::window::Month;

/// Progress events emitted while syncing a feed.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// The orchestrator built its units.
    Launched {
        data_type: DataType,
        chain: Chain,
        /// Number of units created or restored.
        units: usize,
        /// Whether the units came from a checkpoint.
        restored: bool,
    },

    /// A unit was given a month (at launch or on reassignment).
    UnitAssigned {
        month: Month,
        /// Number of sub-windows the month was split into.
        workers: usize,
    },

    /// A worker wrote one page.
    PageFetched {
        month: Month,
        /// Worker position within its unit.
        worker: usize,
        /// Items in the page before filtering.
        received: usize,
        /// Rows upserted plus rows deleted.
        rows_written: usize,
        /// Whether the page ended the worker's cursor chain.
        exhausted: bool,
    },

    /// A page request or write failed; the worker retries after a backoff.
    PageFailed {
        month: Month,
        worker: usize,
        error: String,
        /// True for HTTP 429.
        rate_limited: bool,
        /// False when the failure will repeat until the upstream changes.
        retryable: bool,
        retry_in_ms: u64,
    },

    /// A worker drained its closed window.
    WorkerExhausted { month: Month, worker: usize },

    /// A unit caught up with the current month and now tails live data.
    UnitPromoted { month: Month },

    /// A unit was removed from the live set.
    UnitRetired { month: Month, reason: String },

    /// A checkpoint was written.
    CheckpointSaved {
        units: usize,
        /// Workers with a window still to drain (or tailing).
        pending_workers: usize,
    },

    /// Writing a checkpoint failed (non-fatal).
    CheckpointFailed { error: String },

    /// Shutdown requested; waiting for in-flight pages.
    ShuttingDown,
}

/// Callback for progress updates during sync operations.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
