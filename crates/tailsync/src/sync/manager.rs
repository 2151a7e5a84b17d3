//! Unit managers: one calendar month split across workers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::arena::ArenaKey;
use super::error::SyncError;
use super::types::{ManagerOutcome, SyncContext};
use super::window::{self, Month};
use super::worker::{UnitWorker, WorkerLink, WorkerReport};
use crate::checkpoint::ManagerCheckpoint;

/// Owns one month and the workers draining its sub-windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitManager {
    month: Month,
    timestamp: Option<DateTime<Utc>>,
    backfilled: bool,
    workers: Vec<UnitWorker>,
}

/// Addressing for a running manager's worker reports.
#[derive(Debug, Clone)]
pub(crate) struct UnitLink {
    pub unit: ArenaKey,
    pub epoch: u64,
    pub reports: mpsc::UnboundedSender<WorkerReport>,
}

impl UnitManager {
    /// A manager for `month` with fresh workers over its sub-windows.
    ///
    /// # Errors
    /// Returns [`SyncError::Validation`] if `month` is later than `now`.
    pub fn assign(month: Month, workers: usize, now: DateTime<Utc>) -> Result<Self, SyncError> {
        let workers = window::partition(month, workers, now)?
            .into_iter()
            .map(UnitWorker::new)
            .collect();
        Ok(Self {
            month,
            timestamp: None,
            backfilled: false,
            workers,
        })
    }

    /// Drop the current workers and take over `month`.
    ///
    /// # Errors
    /// Returns [`SyncError::Validation`] if `month` is later than `now`; the
    /// manager is unchanged in that case.
    pub fn reassign(
        &mut self,
        month: Month,
        workers: usize,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        *self = Self::assign(month, workers, now)?;
        Ok(())
    }

    pub fn from_checkpoint(checkpoint: &ManagerCheckpoint) -> Self {
        let mut manager = Self {
            month: checkpoint.date,
            timestamp: checkpoint.timestamp,
            backfilled: false,
            workers: checkpoint
                .workers
                .iter()
                .map(UnitWorker::from_checkpoint)
                .collect(),
        };
        if checkpoint.backfilled {
            manager.promote();
        }
        manager
    }

    pub fn snapshot(&self) -> ManagerCheckpoint {
        ManagerCheckpoint {
            date: self.month,
            timestamp: self.timestamp,
            backfilled: self.backfilled,
            workers: self.workers.iter().map(UnitWorker::snapshot).collect(),
        }
    }

    pub fn month(&self) -> Month {
        self.month
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn is_backfilled(&self) -> bool {
        self.backfilled
    }

    pub fn workers(&self) -> &[UnitWorker] {
        &self.workers
    }

    /// Every worker has reached the end of its cursor chain.
    pub fn is_drained(&self) -> bool {
        self.workers.iter().all(UnitWorker::is_exhausted)
    }

    /// Mark the month as caught up. The last window is reopened if needed so
    /// there is always a worker following live data.
    pub(crate) fn promote(&mut self) {
        self.backfilled = true;
        if !self.workers.iter().any(UnitWorker::is_open_ended)
            && let Some(last) = self.workers.last_mut()
        {
            last.reopen();
        }
    }

    fn refresh_timestamp(&mut self) {
        self.timestamp = self
            .workers
            .iter()
            .filter_map(UnitWorker::timestamp)
            .chain(self.timestamp)
            .max();
    }

    /// Run the workers until the month is drained (backfill) or until
    /// cancellation (tailing).
    ///
    /// Returns the manager's final state with the outcome so the caller can
    /// decide what it does next.
    pub(crate) async fn run(
        mut self,
        ctx: Arc<SyncContext>,
        link: UnitLink,
        cancel: CancellationToken,
    ) -> (Self, ManagerOutcome) {
        if self.workers.is_empty() {
            let reason = format!("unit {} has no workers", self.month);
            return (self, ManagerOutcome::Failed(reason));
        }

        let tailing = self.backfilled;
        if tailing {
            self.promote();
        }
        info!(
            month = %self.month,
            unit = %link.unit,
            workers = self.workers.len(),
            tailing,
            "Unit started"
        );

        let stop = cancel.child_token();
        let mut slots: Vec<Option<UnitWorker>> = Vec::with_capacity(self.workers.len());
        let mut tasks = JoinSet::new();

        for (index, worker) in std::mem::take(&mut self.workers).into_iter().enumerate() {
            let runnable = if tailing {
                worker.is_open_ended()
            } else {
                !worker.is_finished()
            };
            if !runnable {
                slots.push(Some(worker));
                continue;
            }
            slots.push(None);

            let worker_link = WorkerLink {
                unit: link.unit,
                epoch: link.epoch,
                month: self.month,
                index,
                reports: link.reports.clone(),
            };
            let ctx = Arc::clone(&ctx);
            let stop = stop.clone();
            tasks.spawn(async move {
                let before = worker.clone();
                let joined = tokio::spawn(worker.run(ctx, worker_link, stop, tailing)).await;
                (index, joined.map_err(|err| (before, err.to_string())))
            });
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(worker))) => slots[index] = Some(worker),
                Ok((index, Err((before, reason)))) => {
                    slots[index] = Some(before);
                    failure = Some(format!("worker {index} failed: {reason}"));
                    stop.cancel();
                }
                Err(err) => {
                    failure = Some(format!("worker task failed: {err}"));
                    stop.cancel();
                }
            }
        }

        self.workers = slots.into_iter().flatten().collect();
        self.refresh_timestamp();

        if let Some(reason) = failure {
            return (self, ManagerOutcome::Failed(reason));
        }
        if cancel.is_cancelled() {
            debug!(month = %self.month, "Unit cancelled");
            return (self, ManagerOutcome::Cancelled);
        }
        if !self.is_drained() {
            let reason = format!("unit {} stopped before draining", self.month);
            return (self, ManagerOutcome::Failed(reason));
        }

        let now = ctx.deps.clock.now();
        if self.backfilled || window::is_current(self.month, now) {
            self.promote();
            info!(month = %self.month, "Unit caught up with live data");
            (self, ManagerOutcome::Backfilled)
        } else {
            info!(month = %self.month, "Unit drained");
            (self, ManagerOutcome::Exhausted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::WorkerCheckpoint;
    use crate::entity::chain::Chain;
    use crate::entity::data_type::DataType;
    use crate::sync::arena::Arena;
    use crate::sync::clock::Clock;
    use crate::sync::fixtures::Harness;
    use crate::sync::types::SyncConfig;
    use chrono::TimeZone;
    use std::time::Duration;

    fn utc(m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, m, d, h, 0, 0).unwrap()
    }

    fn month(m: u32) -> Month {
        Month::new(2023, m).unwrap()
    }

    fn config() -> SyncConfig {
        SyncConfig::new(DataType::Transfers, Chain::Ethereum, month(1).start().date_naive())
            .with_intervals(
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(30),
            )
    }

    fn link() -> (UnitLink, mpsc::UnboundedReceiver<WorkerReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut arena = Arena::new();
        let link = UnitLink {
            unit: arena.insert(()),
            epoch: 1,
            reports: tx,
        };
        (link, rx)
    }

    #[test]
    fn assign_partitions_the_month() {
        let now = utc(3, 15, 0);

        let past = UnitManager::assign(month(1), 4, now).unwrap();
        assert_eq!(past.workers().len(), 4);
        assert!(past.workers().iter().all(|w| !w.is_open_ended()));
        assert!(!past.is_backfilled());

        let current = UnitManager::assign(month(3), 4, now).unwrap();
        assert!(current.workers().last().unwrap().is_open_ended());

        let err = UnitManager::assign(month(4), 4, now).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn failed_reassign_leaves_manager_unchanged() {
        let now = utc(3, 15, 0);
        let mut manager = UnitManager::assign(month(1), 2, now).unwrap();
        let before = manager.clone();
        assert!(manager.reassign(month(5), 2, now).is_err());
        assert_eq!(manager, before);

        manager.reassign(month(2), 3, now).unwrap();
        assert_eq!(manager.month(), month(2));
        assert_eq!(manager.workers().len(), 3);
    }

    #[test]
    fn checkpoint_restores_worker_order_and_tail_window() {
        let workers = vec![
            WorkerCheckpoint {
                date: utc(3, 1, 0),
                end: Some(utc(3, 8, 0)),
                timestamp: Some(utc(3, 7, 0)),
                continuation: None,
                exhausted: true,
            },
            WorkerCheckpoint {
                date: utc(3, 8, 0),
                end: Some(utc(3, 15, 0)),
                timestamp: Some(utc(3, 14, 0)),
                continuation: None,
                exhausted: true,
            },
        ];
        let checkpoint = ManagerCheckpoint {
            date: month(3),
            timestamp: Some(utc(3, 14, 0)),
            backfilled: true,
            workers,
        };

        let manager = UnitManager::from_checkpoint(&checkpoint);
        assert!(manager.is_backfilled());
        assert_eq!(manager.workers()[0].window().start, utc(3, 1, 0));
        assert!(!manager.workers()[0].is_open_ended());
        assert!(manager.workers()[1].is_open_ended());

        let snapshot = manager.snapshot();
        assert!(snapshot.backfilled);
        assert_eq!(snapshot.workers[1].end, None);
    }

    #[tokio::test]
    async fn past_month_drains_to_exhausted() {
        let harness = Harness::new(utc(3, 15, 0), 2);
        for n in 0..10 {
            harness.feed.push(n, utc(1, 1 + n * 3, 0), false);
        }
        harness.feed.push(99, utc(2, 1, 0), false);
        let manager = UnitManager::assign(month(1), 3, harness.clock.now()).unwrap();
        let (link, mut rx) = link();

        let (manager, outcome) = manager
            .run(harness.context(config()), link, CancellationToken::new())
            .await;

        assert_eq!(outcome, ManagerOutcome::Exhausted);
        assert!(manager.is_drained());
        assert_eq!(harness.stored(), 10);
        assert_eq!(manager.timestamp(), Some(utc(1, 28, 0)));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn current_month_catches_up_to_backfilled() {
        let harness = Harness::new(utc(3, 15, 0), 10);
        harness.feed.push(1, utc(3, 2, 0), false);
        harness.feed.push(2, utc(3, 14, 0), false);
        let manager = UnitManager::assign(month(3), 2, harness.clock.now()).unwrap();
        let (link, _rx) = link();

        let (manager, outcome) = manager
            .run(harness.context(config()), link, CancellationToken::new())
            .await;

        assert_eq!(outcome, ManagerOutcome::Backfilled);
        assert!(manager.is_backfilled());
        assert!(manager.workers().last().unwrap().is_open_ended());
        assert_eq!(harness.stored(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tailing_runs_until_cancelled() {
        let harness = Harness::new(utc(3, 15, 0), 10);
        let mut manager = UnitManager::assign(month(3), 2, harness.clock.now()).unwrap();
        manager.promote();
        let (link, _rx) = link();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(manager.run(harness.context(config()), link, cancel.clone()));
        tokio::time::sleep(Duration::from_secs(3)).await;
        harness.feed.push(7, utc(3, 15, 1), false);
        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();

        let (manager, outcome) = handle.await.unwrap();
        assert_eq!(outcome, ManagerOutcome::Cancelled);
        assert_eq!(harness.stored(), 1);
        assert_eq!(manager.timestamp(), Some(utc(3, 15, 1)));

        // Only the open-ended window is polled while tailing.
        assert!(harness.feed.requests().iter().all(|r| r.end.is_none()));
    }
}
