//! Serialized orchestration state.
//!
//! A checkpoint is the whole manager/worker tree at one instant:
//!
//! ```json
//! {
//!   "date": "2023-03",
//!   "backfilled": false,
//!   "managers": [
//!     {
//!       "date": "2023-01",
//!       "timestamp": "2023-01-09T12:00:00Z",
//!       "backfilled": false,
//!       "workers": [
//!         { "date": "2023-01-01T00:00:00Z", "end": "2023-01-16T12:00:00Z",
//!           "timestamp": "2023-01-09T12:00:00Z", "continuation": "MTY3...", "exhausted": false }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Array order is significant: restore rebuilds managers and workers in the
//! same order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::CheckpointError;
use crate::sync::window::Month;

/// Root of the checkpoint tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last month handed out by the orchestrator.
    pub date: Month,
    /// Whether some manager has reached live tailing.
    #[serde(default)]
    pub backfilled: bool,
    pub managers: Vec<ManagerCheckpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerCheckpoint {
    /// Assigned month.
    pub date: Month,
    /// Latest `updated_at` seen by any of the manager's workers.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub backfilled: bool,
    pub workers: Vec<WorkerCheckpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCheckpoint {
    /// Sub-window start.
    pub date: DateTime<Utc>,
    /// Sub-window end; absent for an open-ended window.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Latest `updated_at` this worker has written.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Cursor for the next page.
    #[serde(default)]
    pub continuation: Option<String>,
    #[serde(default)]
    pub exhausted: bool,
}

impl Checkpoint {
    /// Check structural invariants that deserialization cannot express.
    ///
    /// # Errors
    /// Returns [`CheckpointError::Invalid`] if a manager has no workers or a
    /// worker window does not end after it starts.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        for (m, manager) in self.managers.iter().enumerate() {
            if manager.workers.is_empty() {
                return Err(CheckpointError::Invalid(format!(
                    "manager {m} ({}) has no workers",
                    manager.date
                )));
            }
            for (w, worker) in manager.workers.iter().enumerate() {
                if let Some(end) = worker.end
                    && end <= worker.date
                {
                    return Err(CheckpointError::Invalid(format!(
                        "manager {m} worker {w}: window ends at {end} before it starts"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serialize to a JSON value.
    pub fn to_json(&self) -> Result<serde_json::Value, CheckpointError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserialize and validate.
    pub fn from_json(value: serde_json::Value) -> Result<Self, CheckpointError> {
        let checkpoint: Checkpoint = serde_json::from_value(value)?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    /// Number of workers with a window still to drain.
    pub fn pending_workers(&self) -> usize {
        self.managers
            .iter()
            .flat_map(|m| &m.workers)
            .filter(|w| !w.exhausted || w.end.is_none())
            .count()
    }
}
