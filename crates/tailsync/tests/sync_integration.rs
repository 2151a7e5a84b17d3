//! Integration tests for sync runs.
//!
//! These drive a full [`Orchestrator`] against an in-memory keyset-paginated
//! feed and in-memory stores, with tokio time paused so tail and retry sleeps
//! complete instantly.
//!
//! Key scenarios tested:
//! - A run backfills every month, then a restarted run resumes straight into tailing
//! - A checkpoint from an interrupted run resumes at its stored cursors
//! - Rate-limited pages are retried without losing rows
//! - Deletions observed while tailing remove stored rows

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use tailsync::sync::{ManualClock, Month, Orchestrator, ProgressCallback, SyncProgress};
use tailsync::{
    ApiError, Chain, Checkpoint, CheckpointStore, DataType, ManagerCheckpoint,
    MemoryCheckpointStore, MemoryRowStore, PageRequest, PageSource, SyncConfig, SyncDeps,
    SyncSummary, WorkerCheckpoint,
};

/// Maximum (virtual) time any run may take before the test gives up.
const RUN_TIMEOUT: Duration = Duration::from_secs(3600);

const CONTRACT: &str = "0x0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c";

fn utc(m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, m, d, h, 0, 0).unwrap()
}

fn month(m: u32) -> Month {
    Month::new(2023, m).unwrap()
}

/// Transfer feed served from memory with `(updated_at, n)` keyset pagination.
struct Feed {
    items: Mutex<Vec<(DateTime<Utc>, u32, bool)>>,
    page_size: usize,
    failures: Mutex<VecDeque<u16>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl Feed {
    fn new(page_size: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            page_size,
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, n: u32, updated_at: DateTime<Utc>, deleted: bool) {
        let mut items = self.items.lock().unwrap();
        items.push((updated_at, n, deleted));
        items.sort();
    }

    fn fail_next(&self, status: u16) {
        self.failures.lock().unwrap().push_back(status);
    }

    fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn item(n: u32, updated_at: DateTime<Utc>, deleted: bool) -> serde_json::Value {
        json!({
            "token": { "contract": CONTRACT, "tokenId": n.to_string() },
            "from": format!("0x{}", "01".repeat(20)),
            "to": format!("0x{}", "02".repeat(20)),
            "amount": "1",
            "block": 100 + n,
            "txHash": format!("0x{:064x}", n),
            "logIndex": 0,
            "batchIndex": 0,
            "timestamp": updated_at.timestamp(),
            "isDeleted": deleted,
            "updatedAt": updated_at.to_rfc3339(),
        })
    }
}

#[async_trait]
impl PageSource for Feed {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<u8>, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(status) = self.failures.lock().unwrap().pop_front() {
            return Err(ApiError::upstream(status, b"scripted failure"));
        }

        let after = request.continuation.as_deref().and_then(|c| {
            let (secs, n) = c.split_once(':')?;
            Some((secs.parse::<i64>().ok()?, n.parse::<u32>().ok()?))
        });
        let start = request.start.timestamp();
        let end = request.end.map(|e| e.timestamp());

        let matching: Vec<_> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .copied()
            .filter(|(at, _, _)| at.timestamp() >= start && end.is_none_or(|e| at.timestamp() < e))
            .filter(|(at, n, _)| after.is_none_or(|key| (at.timestamp(), *n) > key))
            .collect();

        let page: Vec<_> = matching.iter().take(self.page_size).copied().collect();
        let continuation = (matching.len() > page.len())
            .then(|| page.last().map(|(at, n, _)| format!("{}:{}", at.timestamp(), n)))
            .flatten();

        let items: Vec<_> = page
            .into_iter()
            .map(|(at, n, deleted)| Self::item(n, at, deleted))
            .collect();
        let body = json!({ "transfers": items, "continuation": continuation });
        Ok(serde_json::to_vec(&body).unwrap())
    }
}

struct Harness {
    feed: Arc<Feed>,
    rows: Arc<MemoryRowStore>,
    checkpoints: Arc<MemoryCheckpointStore>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new(page_size: usize) -> Self {
        Self {
            feed: Arc::new(Feed::new(page_size)),
            rows: Arc::new(MemoryRowStore::new()),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            clock: Arc::new(ManualClock::new(utc(3, 15, 0))),
        }
    }

    fn deps(&self) -> SyncDeps {
        SyncDeps::new(self.feed.clone(), self.rows.clone(), self.checkpoints.clone())
            .with_clock(self.clock.clone())
    }

    fn stored(&self) -> usize {
        self.rows.len(DataType::Transfers)
    }

    fn saved(&self) -> Option<Checkpoint> {
        self.checkpoints.get(DataType::Transfers, Chain::Ethereum)
    }

    /// Items in each of January, February and March, none deleted.
    fn seed_quarter(&self) -> usize {
        for n in 0..12 {
            self.feed.push(n, utc(1 + n % 3, 2 + n, 0), false);
        }
        12
    }
}

fn config(start: Month, units: usize) -> SyncConfig {
    SyncConfig::new(DataType::Transfers, Chain::Ethereum, start.start().date_naive())
        .with_units(units, 2)
        .with_intervals(
            Duration::from_secs(5),
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
}

fn collector() -> (Arc<Mutex<Vec<SyncProgress>>>, ProgressCallback) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: ProgressCallback = Box::new(move |event| sink.lock().unwrap().push(event));
    (events, callback)
}

/// Cancel `cancel` once `done` holds, polling once per virtual second.
fn cancel_when<F>(cancel: &CancellationToken, done: F) -> tokio::task::JoinHandle<()>
where
    F: Fn() -> bool + Send + 'static,
{
    let stop = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if done() {
                stop.cancel();
                break;
            }
        }
    })
}

/// Backfilled, with every unit but the tailing one retired.
fn is_settled(checkpoint: Checkpoint) -> bool {
    checkpoint.backfilled && checkpoint.managers.len() == 1
}

async fn run_until_backfilled(harness: &Harness, orch: &mut Orchestrator) -> SyncSummary {
    let cancel = CancellationToken::new();
    let checkpoints = harness.checkpoints.clone();
    let watcher = cancel_when(&cancel, move || {
        checkpoints
            .get(DataType::Transfers, Chain::Ethereum)
            .is_some_and(is_settled)
    });

    let summary = tokio::time::timeout(RUN_TIMEOUT, orch.run(cancel))
        .await
        .expect("run should stop once backfilled")
        .unwrap();
    watcher.await.unwrap();
    summary
}

#[tokio::test(start_paused = true)]
async fn restarted_run_resumes_into_tailing() {
    let harness = Harness::new(2);
    let total = harness.seed_quarter();

    let mut first = Orchestrator::new(config(month(1), 2), harness.deps(), None).unwrap();
    let summary = run_until_backfilled(&harness, &mut first).await;

    assert!(summary.backfilled);
    assert_eq!(harness.stored(), total);
    assert!(summary.checkpoints_saved >= 2);

    let saved = harness.saved().unwrap();
    assert_eq!(saved.date, month(3));
    assert_eq!(saved.managers.len(), 1);
    assert!(saved.managers[0].backfilled);

    // A second run restores the tailing unit and never revisits old months.
    let (events, callback) = collector();
    let requests_before = harness.feed.requests().len();
    let mut second =
        Orchestrator::new(config(month(1), 2), harness.deps(), Some(callback)).unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        stop.cancel();
    });
    tokio::time::timeout(RUN_TIMEOUT, second.run(cancel))
        .await
        .unwrap()
        .unwrap();

    assert!(second.is_backfilled());
    assert_eq!(harness.stored(), total);

    let new_requests = &harness.feed.requests()[requests_before..];
    assert!(!new_requests.is_empty(), "tailing should keep polling");
    assert!(
        new_requests
            .iter()
            .all(|r| r.end.is_none() && r.start >= month(3).start()),
        "only the open-ended March window is polled"
    );

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        SyncProgress::Launched { restored: true, units: 1, .. }
    )));
    assert!(events.iter().any(|e| matches!(e, SyncProgress::ShuttingDown)));
}

#[tokio::test(start_paused = true)]
async fn interrupted_checkpoint_resumes_at_stored_cursors() {
    let harness = Harness::new(2);
    // February items at days 2, 5, 9, 12 and 20; March items at days 3 and 10.
    let feb = [(0, 2), (1, 5), (2, 9), (3, 12), (4, 20)];
    for (n, day) in feb {
        harness.feed.push(n, utc(2, day, 0), false);
    }
    harness.feed.push(5, utc(3, 3, 0), false);
    harness.feed.push(6, utc(3, 10, 0), false);

    // The interrupted run had written items 0 and 1 of the first half of
    // February and fully drained the second half.
    let cursor = format!("{}:{}", utc(2, 5, 0).timestamp(), 1);
    let checkpoint = Checkpoint {
        date: month(2),
        backfilled: false,
        managers: vec![ManagerCheckpoint {
            date: month(2),
            timestamp: Some(utc(2, 20, 0)),
            backfilled: false,
            workers: vec![
                WorkerCheckpoint {
                    date: month(2).start(),
                    end: Some(utc(2, 15, 0)),
                    timestamp: Some(utc(2, 5, 0)),
                    continuation: Some(cursor.clone()),
                    exhausted: false,
                },
                WorkerCheckpoint {
                    date: utc(2, 15, 0),
                    end: Some(month(3).start()),
                    timestamp: Some(utc(2, 20, 0)),
                    continuation: None,
                    exhausted: true,
                },
            ],
        }],
    };
    harness
        .checkpoints
        .save(DataType::Transfers, Chain::Ethereum, &checkpoint)
        .await
        .unwrap();

    let mut orch = Orchestrator::new(config(month(1), 1), harness.deps(), None).unwrap();
    let summary = run_until_backfilled(&harness, &mut orch).await;
    assert!(summary.backfilled);

    let requests = harness.feed.requests();
    assert_eq!(requests[0].continuation.as_deref(), Some(cursor.as_str()));
    assert_eq!(requests[0].start, month(2).start());
    assert_eq!(requests[0].end, Some(utc(2, 15, 0)));
    assert!(
        requests.iter().all(|r| r.start >= month(2).start()),
        "January is before the stored cursor and is never requested"
    );
    assert!(
        !requests.iter().any(|r| r.start == utc(2, 15, 0)),
        "the drained second half of February is not requested again"
    );

    // Items 2 and 3 from February, 5 and 6 from March.
    assert_eq!(harness.stored(), 4);
    let saved = harness.saved().unwrap();
    assert_eq!(saved.date, month(3));
}

#[tokio::test(start_paused = true)]
async fn rate_limited_pages_are_retried() {
    let harness = Harness::new(2);
    let total = harness.seed_quarter();
    harness.feed.fail_next(429);
    harness.feed.fail_next(429);

    let (events, callback) = collector();
    let mut orch = Orchestrator::new(config(month(1), 3), harness.deps(), Some(callback)).unwrap();
    let summary = run_until_backfilled(&harness, &mut orch).await;

    assert_eq!(harness.stored(), total);
    assert_eq!(summary.page_failures, 2);
    assert_eq!(summary.units_retired, 2);

    let events = events.lock().unwrap();
    let rate_limited = events
        .iter()
        .filter(|e| matches!(e, SyncProgress::PageFailed { rate_limited: true, .. }))
        .count();
    assert_eq!(rate_limited, 2);
}

#[tokio::test(start_paused = true)]
async fn tailing_applies_deletes() {
    let harness = Harness::new(3);
    let total = harness.seed_quarter();
    // Deleted before it was ever seen: never stored.
    harness.feed.push(40, utc(2, 25, 0), true);

    let mut orch = Orchestrator::new(config(month(2), 2), harness.deps(), None).unwrap();
    let cancel = CancellationToken::new();

    // Once tailing, delete the latest March item upstream and wait for the
    // tail loop to apply it.
    let feed = harness.feed.clone();
    let rows = harness.rows.clone();
    let checkpoints = harness.checkpoints.clone();
    let stop = cancel.clone();
    let watcher = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let settled = checkpoints
                .get(DataType::Transfers, Chain::Ethereum)
                .is_some_and(is_settled);
            if settled {
                break;
            }
        }
        let before = rows.len(DataType::Transfers);
        feed.push(11, utc(3, 14, 0), true);
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if rows.len(DataType::Transfers) < before {
                break;
            }
        }
        stop.cancel();
    });

    let summary = tokio::time::timeout(RUN_TIMEOUT, orch.run(cancel))
        .await
        .unwrap()
        .unwrap();
    watcher.await.unwrap();

    // January is never assigned; one March item was deleted while tailing.
    let january = 4;
    assert_eq!(harness.stored(), total - january - 1);
    assert!(summary.backfilled);
}
