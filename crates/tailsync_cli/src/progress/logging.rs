use tailsync::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::Launched {
                data_type,
                chain,
                units,
                restored,
            } => {
                tracing::info!(data_type = %data_type, chain = %chain, units, restored, "Sync launched");
            }

            SyncProgress::UnitAssigned { month, workers } => {
                tracing::info!(month = %month, workers, "Unit assigned");
            }

            SyncProgress::PageFetched {
                month,
                worker,
                received,
                rows_written,
                exhausted,
            } => {
                tracing::debug!(month = %month, worker, received, rows_written, exhausted, "Page fetched");
            }

            SyncProgress::PageFailed {
                month,
                worker,
                error,
                rate_limited,
                retryable,
                retry_in_ms,
            } => {
                if rate_limited {
                    tracing::warn!(month = %month, worker, retry_in_ms, "Rate limited, backing off");
                } else if !retryable {
                    tracing::error!(month = %month, worker, error = %error, retry_in_ms, "Page rejected");
                } else {
                    tracing::warn!(month = %month, worker, error = %error, retry_in_ms, "Page failed");
                }
            }

            SyncProgress::WorkerExhausted { month, worker } => {
                tracing::debug!(month = %month, worker, "Worker exhausted");
            }

            SyncProgress::UnitPromoted { month } => {
                tracing::info!(month = %month, "Tailing live data");
            }

            SyncProgress::UnitRetired { month, reason } => {
                tracing::info!(month = %month, reason = %reason, "Unit retired");
            }

            SyncProgress::CheckpointSaved {
                units,
                pending_workers,
            } => {
                tracing::debug!(units, pending_workers, "Checkpoint saved");
            }

            SyncProgress::CheckpointFailed { error } => {
                tracing::error!(error = %error, "Failed to save checkpoint");
            }

            SyncProgress::ShuttingDown => {
                tracing::info!("Shutting down");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
