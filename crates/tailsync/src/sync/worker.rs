//! Unit workers: one sub-window plus a continuation cursor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::arena::ArenaKey;
use super::error::SyncError;
use super::progress::{SyncProgress, emit};
use super::types::{PollOutcome, SyncContext};
use super::window::{Month, SubWindow};
use crate::checkpoint::WorkerCheckpoint;
use crate::entity::data_type::DataType;
use crate::source::{ContractAllowList, PageRequest, short_error_message};
use crate::store;

/// Drains one sub-window page by page.
///
/// The cursor (`continuation`, `timestamp`) only moves after a page has been
/// written, so a failed fetch or write is retried from the same position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitWorker {
    window: SubWindow,
    timestamp: Option<DateTime<Utc>>,
    continuation: Option<String>,
    exhausted: bool,
}

impl UnitWorker {
    pub fn new(window: SubWindow) -> Self {
        Self {
            window,
            timestamp: None,
            continuation: None,
            exhausted: false,
        }
    }

    pub fn from_checkpoint(checkpoint: &WorkerCheckpoint) -> Self {
        Self {
            window: SubWindow {
                start: checkpoint.date,
                end: checkpoint.end,
            },
            timestamp: checkpoint.timestamp,
            continuation: checkpoint.continuation.clone(),
            exhausted: checkpoint.exhausted,
        }
    }

    pub fn snapshot(&self) -> WorkerCheckpoint {
        WorkerCheckpoint {
            date: self.window.start,
            end: self.window.end,
            timestamp: self.timestamp,
            continuation: self.continuation.clone(),
            exhausted: self.exhausted,
        }
    }

    pub fn window(&self) -> SubWindow {
        self.window
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_open_ended(&self) -> bool {
        self.window.is_open_ended()
    }

    /// A drained closed window; it is never polled again.
    pub fn is_finished(&self) -> bool {
        self.exhausted && !self.window.is_open_ended()
    }

    /// Turn the window into the open-ended tail of its month.
    pub(crate) fn reopen(&mut self) {
        self.window.end = None;
    }

    /// The request for this worker's next page.
    ///
    /// Closed windows are always queried from their start. An open-ended
    /// window starts each new pass from the latest `updated_at` it has
    /// written, so tailing never rescans what it already has. Pages that
    /// follow a continuation repeat the query that issued it.
    pub fn next_request(&self, data_type: DataType, contracts: &ContractAllowList) -> PageRequest {
        let start = match (self.window.end, &self.continuation, self.timestamp) {
            (None, None, Some(seen)) => seen.max(self.window.start),
            _ => self.window.start,
        };
        PageRequest {
            data_type,
            start,
            end: self.window.end,
            continuation: self.continuation.clone(),
            contracts: contracts.to_vec(),
        }
    }

    /// Fetch, transform and write one page, then advance the cursor.
    ///
    /// # Errors
    /// Returns a page-level [`SyncError`] when the fetch, decode or write
    /// fails. The worker's state is unchanged in that case.
    pub async fn poll_once(&mut self, ctx: &SyncContext) -> Result<PollOutcome, SyncError> {
        if self.is_finished() {
            return Ok(PollOutcome {
                exhausted: true,
                ..Default::default()
            });
        }

        let data_type = ctx.config.data_type;
        let request = self.next_request(data_type, &ctx.config.contracts);
        let body = ctx.deps.source.fetch_page(&request).await?;
        let page = data_type.transform(&body, &ctx.config.contracts)?;

        let applied = store::apply(ctx.deps.rows.as_ref(), data_type, page.rows).await?;

        if let Some(last) = page.last_updated_at {
            self.timestamp = Some(self.timestamp.map_or(last, |seen| seen.max(last)));
        }
        if self.is_open_ended() {
            // Pin the pass start so the continuation keeps its query.
            self.window.start = request.start;
        }
        self.continuation = page.continuation;
        self.exhausted = self.continuation.is_none();

        Ok(PollOutcome {
            received: page.received,
            rows_written: applied.rows_written(),
            exhausted: self.exhausted,
        })
    }

    /// Poll until the window is drained, or forever when `tailing` an
    /// open-ended window. Failed pages are retried after the configured
    /// backoff. Returns the worker's final state once stopped.
    pub(crate) async fn run(
        mut self,
        ctx: Arc<SyncContext>,
        link: WorkerLink,
        cancel: CancellationToken,
        tailing: bool,
    ) -> Self {
        let on_progress = ctx.on_progress.as_ref();

        while !cancel.is_cancelled() {
            let pause = match self.poll_once(&ctx).await {
                Ok(outcome) => {
                    debug!(
                        month = %link.month,
                        worker = link.index,
                        received = outcome.received,
                        written = outcome.rows_written,
                        exhausted = outcome.exhausted,
                        "Page written"
                    );
                    emit(
                        on_progress,
                        SyncProgress::PageFetched {
                            month: link.month,
                            worker: link.index,
                            received: outcome.received,
                            rows_written: outcome.rows_written,
                            exhausted: outcome.exhausted,
                        },
                    );
                    link.report(&self, Some(outcome));

                    if !outcome.exhausted {
                        continue;
                    }
                    if tailing && self.is_open_ended() {
                        ctx.config.tail_interval
                    } else {
                        emit(
                            on_progress,
                            SyncProgress::WorkerExhausted {
                                month: link.month,
                                worker: link.index,
                            },
                        );
                        break;
                    }
                }
                Err(err) => {
                    let retry_in = ctx.config.retry_backoff;
                    let retry_in_ms = retry_in.as_millis() as u64;
                    let message = short_error_message(&err);
                    let retryable = err.is_retryable();
                    if retryable {
                        warn!(
                            month = %link.month,
                            worker = link.index,
                            error = %message,
                            retry_in_ms,
                            "Page failed, retrying"
                        );
                    } else {
                        // Skipping the page would leave a gap, so keep retrying.
                        error!(
                            month = %link.month,
                            worker = link.index,
                            error = %message,
                            retry_in_ms,
                            "Page rejected by upstream, retrying"
                        );
                    }
                    emit(
                        on_progress,
                        SyncProgress::PageFailed {
                            month: link.month,
                            worker: link.index,
                            error: message,
                            rate_limited: err.is_rate_limited(),
                            retryable,
                            retry_in_ms,
                        },
                    );
                    link.report(&self, None);
                    retry_in
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self
    }
}

/// A worker state update sent to the orchestrator.
#[derive(Debug, Clone)]
pub(crate) struct WorkerReport {
    pub unit: ArenaKey,
    /// Run generation of the unit; reports from an earlier run are stale.
    pub epoch: u64,
    pub index: usize,
    pub state: WorkerCheckpoint,
    /// `None` for a failed page.
    pub outcome: Option<PollOutcome>,
}

/// Addressing for a running worker's reports.
#[derive(Debug, Clone)]
pub(crate) struct WorkerLink {
    pub unit: ArenaKey,
    pub epoch: u64,
    pub month: Month,
    pub index: usize,
    pub reports: mpsc::UnboundedSender<WorkerReport>,
}

impl WorkerLink {
    fn report(&self, worker: &UnitWorker, outcome: Option<PollOutcome>) {
        // The receiver is gone only once the orchestrator has stopped.
        let _ = self.reports.send(WorkerReport {
            unit: self.unit,
            epoch: self.epoch,
            index: self.index,
            state: worker.snapshot(),
            outcome,
        });
    }
}
