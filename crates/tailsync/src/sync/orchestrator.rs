//! The sync orchestrator.
//!
//! Owns the live set of unit managers, hands out months from a global
//! cursor, reviews each manager when its run ends and keeps the checkpoint
//! store current. Managers and workers run as tokio tasks; all state
//! transitions happen here, on the orchestrator's own task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::arena::{Arena, ArenaKey};
use super::error::SyncError;
use super::manager::{UnitLink, UnitManager};
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{ManagerOutcome, SyncConfig, SyncContext, SyncDeps, SyncSummary};
use super::window::{self, Month};
use super::worker::WorkerReport;
use crate::checkpoint::{Checkpoint, ManagerCheckpoint};

type UnitRun = (ArenaKey, Option<UnitManager>, ManagerOutcome);

struct UnitEntry {
    /// `None` while the manager runs in its own task.
    manager: Option<UnitManager>,
    /// Latest known state, updated from worker reports.
    snapshot: ManagerCheckpoint,
    /// Bumped on every spawn and return; reports carrying another epoch are stale.
    epoch: u64,
}

pub struct Orchestrator {
    ctx: Arc<SyncContext>,
    units: Arena<UnitEntry>,
    /// Last month handed out.
    cursor: Option<Month>,
    backfilled: bool,
    tailing: Option<ArenaKey>,
    launched: bool,
    summary: SyncSummary,
}

impl Orchestrator {
    /// # Errors
    /// Returns [`SyncError::Validation`] if the configuration is unusable.
    pub fn new(
        config: SyncConfig,
        deps: SyncDeps,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            ctx: Arc::new(SyncContext {
                config,
                deps,
                on_progress,
            }),
            units: Arena::new(),
            cursor: None,
            backfilled: false,
            tailing: None,
            launched: false,
            summary: SyncSummary::default(),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.ctx.config
    }

    pub fn cursor(&self) -> Option<Month> {
        self.cursor
    }

    pub fn is_backfilled(&self) -> bool {
        self.backfilled
    }

    /// The unit currently tailing live data.
    pub fn tailing(&self) -> Option<ArenaKey> {
        self.tailing
    }

    /// Keys of the live units, in checkpoint order.
    pub fn unit_keys(&self) -> Vec<ArenaKey> {
        self.units.keys()
    }

    /// Latest known state of a unit.
    pub fn unit_state(&self, key: ArenaKey) -> Option<&ManagerCheckpoint> {
        self.units.get(key).map(|entry| &entry.snapshot)
    }

    pub fn summary(&self) -> &SyncSummary {
        &self.summary
    }

    /// The current checkpoint tree; `None` before launch.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        let date = self.cursor?;
        Some(Checkpoint {
            date,
            backfilled: self.backfilled,
            managers: self
                .units
                .iter()
                .map(|(_, entry)| entry.snapshot.clone())
                .collect(),
        })
    }

    /// Build the initial unit set, from a checkpoint when one is available.
    ///
    /// Calling this again after a successful launch does nothing.
    ///
    /// # Errors
    /// Returns [`SyncError::Validation`] when the start month lies in the
    /// future, or [`SyncError::Checkpoint`] when loading the stored checkpoint
    /// fails.
    pub async fn launch(&mut self) -> Result<(), SyncError> {
        if self.launched {
            return Ok(());
        }

        let ctx = Arc::clone(&self.ctx);
        let config = &ctx.config;
        let restored = match config.checkpoint.clone() {
            Some(checkpoint) => Some(checkpoint),
            None if config.resume => {
                ctx.deps
                    .checkpoints
                    .load(config.data_type, config.chain)
                    .await?
            }
            None => None,
        };
        let restored = restored.filter(|checkpoint| {
            if checkpoint.managers.is_empty() {
                warn!("Stored checkpoint has no units, starting over");
            }
            !checkpoint.managers.is_empty()
        });

        let from_checkpoint = restored.is_some();
        match restored {
            Some(checkpoint) => self.restore(checkpoint)?,
            None => self.assign_initial()?,
        }
        self.launched = true;

        info!(
            data_type = %config.data_type,
            chain = %config.chain,
            units = self.units.len(),
            restored = from_checkpoint,
            cursor = ?self.cursor.map(|m| m.to_string()),
            "Sync launched"
        );
        emit(
            ctx.on_progress.as_ref(),
            SyncProgress::Launched {
                data_type: config.data_type,
                chain: config.chain,
                units: self.units.len(),
                restored: from_checkpoint,
            },
        );

        self.save_checkpoint().await;
        Ok(())
    }

    /// Replace the unit set with the one described by `checkpoint`.
    ///
    /// Managers and workers keep their array order. If more than one manager
    /// claims to be tailing, only the first keeps the role; the others go
    /// back to backfilling their month.
    ///
    /// # Errors
    /// Returns [`SyncError::Checkpoint`] if the checkpoint is structurally invalid.
    pub fn restore(&mut self, checkpoint: Checkpoint) -> Result<(), SyncError> {
        checkpoint.validate()?;

        self.units.clear();
        self.tailing = None;
        self.cursor = Some(checkpoint.date);
        self.backfilled = checkpoint.backfilled;

        for snapshot in checkpoint.managers {
            let snapshot = if snapshot.backfilled && self.tailing.is_some() {
                warn!(month = %snapshot.date, "Second tailing unit in checkpoint, demoting");
                ManagerCheckpoint {
                    backfilled: false,
                    ..snapshot
                }
            } else {
                snapshot
            };
            let manager = UnitManager::from_checkpoint(&snapshot);
            let tailing = manager.is_backfilled();
            let key = self.insert(manager);
            if tailing {
                self.tailing = Some(key);
            }
        }
        Ok(())
    }

    fn assign_initial(&mut self) -> Result<(), SyncError> {
        let ctx = Arc::clone(&self.ctx);
        let now = ctx.deps.clock.now();
        let first = Month::from_date(ctx.config.start_date);
        if !window::is_assignable(first, now) {
            return Err(SyncError::Validation(format!(
                "start month {first} is later than the current month {}",
                Month::containing(now)
            )));
        }

        self.units.clear();
        self.tailing = None;
        self.backfilled = false;

        let mut month = first;
        for _ in 0..ctx.config.units {
            let manager = UnitManager::assign(month, ctx.config.workers_per_unit, now)?;
            emit(
                ctx.on_progress.as_ref(),
                SyncProgress::UnitAssigned {
                    month,
                    workers: manager.workers().len(),
                },
            );
            self.insert(manager);
            self.cursor = Some(month);

            match window::next_assignable(month, now) {
                Ok(next) => month = next,
                Err(_) => break,
            }
        }
        Ok(())
    }

    fn insert(&mut self, manager: UnitManager) -> ArenaKey {
        self.units.insert(UnitEntry {
            snapshot: manager.snapshot(),
            manager: Some(manager),
            epoch: 0,
        })
    }

    /// Decide what a manager does after its run ended. Returns whether it
    /// stays in the live set.
    ///
    /// - `Backfilled`: the first such manager becomes the tailing unit; any
    ///   later one is retired.
    /// - `Exhausted`: the manager takes the month after the cursor, or is
    ///   retired when that month lies in the future.
    /// - `Failed`: retired, except the tailing unit, which restarts from its
    ///   last known state.
    /// - `Cancelled`: kept as is.
    ///
    /// A checkpoint is written after every review except `Cancelled`.
    pub async fn review(&mut self, key: ArenaKey, outcome: ManagerOutcome) -> bool {
        let ctx = Arc::clone(&self.ctx);
        let on_progress = ctx.on_progress.as_ref();
        let now = ctx.deps.clock.now();

        let Some(entry) = self.units.get_mut(key) else {
            return false;
        };
        let month = entry.snapshot.date;

        let verdict: Result<(), String> = match &outcome {
            ManagerOutcome::Cancelled => Ok(()),
            ManagerOutcome::Backfilled => match self.tailing {
                Some(holder) if holder != key => Err("another unit is already tailing".into()),
                _ => {
                    self.tailing = Some(key);
                    self.backfilled = true;
                    if let Some(manager) = entry.manager.as_mut() {
                        manager.promote();
                    }
                    info!(month = %month, "Unit promoted to tailing");
                    emit(on_progress, SyncProgress::UnitPromoted { month });
                    Ok(())
                }
            },
            ManagerOutcome::Exhausted => {
                let next = self
                    .cursor
                    .ok_or_else(|| SyncError::Validation("no month assigned yet".into()))
                    .and_then(|cursor| window::next_assignable(cursor, now));
                match (next, entry.manager.as_mut()) {
                    (Ok(next), Some(manager)) => {
                        match manager.reassign(next, ctx.config.workers_per_unit, now) {
                            Ok(()) => {
                                self.cursor = Some(next);
                                info!(from = %month, to = %next, "Unit reassigned");
                                emit(
                                    on_progress,
                                    SyncProgress::UnitAssigned {
                                        month: next,
                                        workers: manager.workers().len(),
                                    },
                                );
                                Ok(())
                            }
                            Err(err) => Err(err.to_string()),
                        }
                    }
                    (Ok(_), None) => Err("unit state missing".into()),
                    (Err(err), _) => {
                        debug!(error = %err, "No further month to assign");
                        Err("no further month to assign".into())
                    }
                }
            }
            ManagerOutcome::Failed(reason) => {
                if self.tailing == Some(key) {
                    warn!(month = %month, reason = %reason, "Tailing unit failed, restarting");
                    if entry.manager.is_none() {
                        entry.manager = Some(UnitManager::from_checkpoint(&entry.snapshot));
                    }
                    Ok(())
                } else {
                    warn!(month = %month, reason = %reason, "Unit failed");
                    Err(reason.clone())
                }
            }
        };

        let keep = match verdict {
            Ok(()) => {
                if let Some(manager) = &entry.manager {
                    entry.snapshot = manager.snapshot();
                }
                true
            }
            Err(reason) => {
                self.units.remove(key);
                if self.tailing == Some(key) {
                    self.tailing = None;
                }
                self.summary.units_retired += 1;
                info!(month = %month, reason = %reason, "Unit retired");
                emit(on_progress, SyncProgress::UnitRetired { month, reason });
                false
            }
        };

        if outcome != ManagerOutcome::Cancelled {
            self.save_checkpoint().await;
        }
        keep
    }

    /// Write the current checkpoint. Failures are logged and reported, never
    /// returned: a missed checkpoint only widens the replay window.
    pub async fn save_checkpoint(&mut self) -> bool {
        let Some(checkpoint) = self.checkpoint() else {
            return false;
        };
        let ctx = Arc::clone(&self.ctx);
        let config = &ctx.config;

        match ctx
            .deps
            .checkpoints
            .save(config.data_type, config.chain, &checkpoint)
            .await
        {
            Ok(()) => {
                self.summary.checkpoints_saved += 1;
                debug!(
                    units = checkpoint.managers.len(),
                    cursor = %checkpoint.date,
                    "Checkpoint saved"
                );
                emit(
                    ctx.on_progress.as_ref(),
                    SyncProgress::CheckpointSaved {
                        units: checkpoint.managers.len(),
                        pending_workers: checkpoint.pending_workers(),
                    },
                );
                true
            }
            Err(err) => {
                warn!(error = %err, "Failed to save checkpoint");
                emit(
                    ctx.on_progress.as_ref(),
                    SyncProgress::CheckpointFailed {
                        error: err.to_string(),
                    },
                );
                false
            }
        }
    }

    /// Launch if needed, then drive every unit until the live set is empty
    /// or `cancel` fires. On cancellation in-flight pages finish, the final
    /// state is checkpointed and the summary returned.
    ///
    /// # Errors
    /// Only launch errors are returned; page and checkpoint failures are
    /// retried or logged.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<SyncSummary, SyncError> {
        self.launch().await?;
        let ctx = Arc::clone(&self.ctx);

        let (reports_tx, mut reports) = mpsc::unbounded_channel();
        let mut running: JoinSet<UnitRun> = JoinSet::new();
        for key in self.units.keys() {
            self.spawn_unit(key, &mut running, &reports_tx, &cancel);
        }

        let mut ticker = tokio::time::interval(ctx.config.checkpoint_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut dirty = false;
        let mut shutting_down = false;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !shutting_down => {
                    shutting_down = true;
                    info!("Shutdown requested, waiting for in-flight pages");
                    emit(ctx.on_progress.as_ref(), SyncProgress::ShuttingDown);
                }

                Some(report) = reports.recv() => {
                    dirty |= self.record(report);
                }

                joined = running.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    let (key, manager, outcome) = match joined {
                        Ok(run) => run,
                        Err(err) => {
                            warn!(error = %err, "Unit supervisor task failed");
                            continue;
                        }
                    };
                    if let Some(manager) = manager {
                        self.return_unit(key, manager);
                    }
                    let keep = self.review(key, outcome).await;
                    dirty = false;
                    if keep && !cancel.is_cancelled() {
                        self.spawn_unit(key, &mut running, &reports_tx, &cancel);
                    }
                }

                _ = ticker.tick() => {
                    if dirty {
                        self.save_checkpoint().await;
                        dirty = false;
                    }
                }
            }
        }

        while let Ok(report) = reports.try_recv() {
            self.record(report);
        }
        self.save_checkpoint().await;
        self.summary.backfilled = self.backfilled;

        info!(
            pages = self.summary.pages_fetched,
            failures = self.summary.page_failures,
            rows = self.summary.rows_written,
            retired = self.summary.units_retired,
            backfilled = self.backfilled,
            "Sync stopped"
        );
        Ok(self.summary.clone())
    }

    fn spawn_unit(
        &mut self,
        key: ArenaKey,
        running: &mut JoinSet<UnitRun>,
        reports: &mpsc::UnboundedSender<WorkerReport>,
        cancel: &CancellationToken,
    ) {
        let Some(entry) = self.units.get_mut(key) else {
            return;
        };
        let Some(manager) = entry.manager.take() else {
            return;
        };
        entry.epoch += 1;
        entry.snapshot = manager.snapshot();

        let link = UnitLink {
            unit: key,
            epoch: entry.epoch,
            reports: reports.clone(),
        };
        let ctx = Arc::clone(&self.ctx);
        let cancel = cancel.clone();
        running.spawn(async move {
            match tokio::spawn(manager.run(ctx, link, cancel)).await {
                Ok((manager, outcome)) => (key, Some(manager), outcome),
                Err(err) => (
                    key,
                    None,
                    ManagerOutcome::Failed(format!("unit task failed: {err}")),
                ),
            }
        });
    }

    fn return_unit(&mut self, key: ArenaKey, manager: UnitManager) {
        if let Some(entry) = self.units.get_mut(key) {
            entry.epoch += 1;
            entry.snapshot = manager.snapshot();
            entry.manager = Some(manager);
        }
    }

    /// Fold a worker report into the unit's snapshot. Returns whether the
    /// checkpoint changed.
    fn record(&mut self, report: WorkerReport) -> bool {
        match report.outcome {
            Some(outcome) => {
                self.summary.pages_fetched += 1;
                self.summary.rows_written += outcome.rows_written as u64;
            }
            None => self.summary.page_failures += 1,
        }
        if report.outcome.is_none() {
            return false;
        }

        let Some(entry) = self.units.get_mut(report.unit) else {
            return false;
        };
        if entry.epoch != report.epoch || report.index >= entry.snapshot.workers.len() {
            return false;
        }
        if let Some(seen) = report.state.timestamp {
            entry.snapshot.timestamp = Some(entry.snapshot.timestamp.map_or(seen, |t| t.max(seen)));
        }
        entry.snapshot.workers[report.index] = report.state;
        true
    }
}
