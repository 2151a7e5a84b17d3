use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tailsync::sync::{Month, SyncProgress};

/// Per-unit counters shown next to its spinner.
struct UnitState {
    bar: ProgressBar,
    pages: u64,
    rows: u64,
    tailing: bool,
}

#[derive(Default)]
struct ProgressState {
    /// One spinner per assigned month.
    units: HashMap<Month, UnitState>,
    /// Checkpoint status line, kept below the unit spinners.
    status: Option<ProgressBar>,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn unit_bar(&self, state: &ProgressState, month: Month) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        let bar = match state.status {
            Some(ref status) => self.multi.insert_before(status, bar),
            None => self.multi.add(bar),
        };
        bar.set_style(Self::spinner_style());
        bar.set_prefix(format!("{:8}", month.to_string()));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    fn status_bar(&self, state: &mut ProgressState) -> ProgressBar {
        state
            .status
            .get_or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(Self::status_style());
                bar.set_prefix(format!("{:8}", "state"));
                bar
            })
            .clone()
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::Launched {
                data_type,
                chain,
                units,
                restored,
            } => {
                let origin = if restored { "restored" } else { "started" };
                let _ = self.multi.println(format!(
                    "{} {}/{}: {} units {}",
                    style("▶").green().bold(),
                    data_type,
                    chain,
                    units,
                    origin
                ));
                let status = self.status_bar(&mut state);
                status.set_message("no checkpoint written yet");
            }

            SyncProgress::UnitAssigned { month, workers } => {
                let bar = self.unit_bar(&state, month);
                bar.set_message(format!("backfilling with {} workers", workers));
                state.units.insert(
                    month,
                    UnitState {
                        bar,
                        pages: 0,
                        rows: 0,
                        tailing: false,
                    },
                );
            }

            SyncProgress::PageFetched {
                month,
                rows_written,
                ..
            } => {
                if !state.units.contains_key(&month) {
                    // Units restored from a checkpoint are first seen here.
                    let bar = self.unit_bar(&state, month);
                    state.units.insert(
                        month,
                        UnitState {
                            bar,
                            pages: 0,
                            rows: 0,
                            tailing: false,
                        },
                    );
                }
                if let Some(unit) = state.units.get_mut(&month) {
                    unit.pages += 1;
                    unit.rows += rows_written as u64;
                    let phase = if unit.tailing { "tailing" } else { "backfilling" };
                    unit.bar.set_message(format!(
                        "{}: {} pages, {} rows",
                        phase, unit.pages, unit.rows
                    ));
                }
            }

            SyncProgress::PageFailed {
                month,
                worker,
                error,
                rate_limited,
                retryable,
                retry_in_ms,
            } => {
                let label = if rate_limited {
                    style("rate limited").yellow()
                } else if !retryable {
                    style("page rejected").red().bold()
                } else {
                    style("page failed").red()
                };
                let _ = self.multi.println(format!(
                    "  {} {} worker {}: {} (retry in {}s)",
                    label,
                    month,
                    worker,
                    error,
                    retry_in_ms / 1000
                ));
            }

            SyncProgress::WorkerExhausted { .. } => {}

            SyncProgress::UnitPromoted { month } => {
                if let Some(unit) = state.units.get_mut(&month) {
                    unit.tailing = true;
                    unit.bar.set_style(Self::tail_style());
                    unit.bar.set_message(format!(
                        "tailing live data: {} pages, {} rows",
                        unit.pages, unit.rows
                    ));
                }
            }

            SyncProgress::UnitRetired { month, reason } => {
                if let Some(unit) = state.units.remove(&month) {
                    unit.bar.finish_with_message(format!(
                        "{} {} pages, {} rows ({})",
                        style("✓").green(),
                        unit.pages,
                        unit.rows,
                        reason
                    ));
                }
            }

            SyncProgress::CheckpointSaved {
                units,
                pending_workers,
            } => {
                let status = self.status_bar(&mut state);
                status.set_message(format!(
                    "checkpoint saved at {}: {} units, {} workers pending",
                    chrono::Local::now().format("%H:%M:%S"),
                    units,
                    pending_workers
                ));
            }

            SyncProgress::CheckpointFailed { error } => {
                let _ = self.multi.println(format!(
                    "  {} {}",
                    style("checkpoint failed").red(),
                    error
                ));
            }

            SyncProgress::ShuttingDown => {
                let status = self.status_bar(&mut state);
                status.set_message("shutting down, finishing in-flight pages...");
            }

            _ => {}
        }
    }

    /// Finish all progress bars.
    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for unit in state.units.values() {
            unit.bar.finish();
        }
        if let Some(ref status) = state.status {
            status.finish();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .expect("Invalid template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn tail_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.magenta} {msg}")
            .expect("Invalid template")
            .tick_chars("◐◓◑◒")
    }

    fn status_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.dim} {msg:.dim}")
            .expect("Invalid template")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
