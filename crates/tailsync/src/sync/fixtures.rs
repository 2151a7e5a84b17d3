//! Test doubles shared by the sync unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::clock::ManualClock;
use super::types::{SyncConfig, SyncContext, SyncDeps};
use crate::entity::data_type::DataType;
use crate::source::{ApiError, PageRequest, PageSource};
use crate::store::{MemoryCheckpointStore, MemoryRowStore};

pub(crate) const CONTRACT: &str = "0x0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c";

/// A transfer feed item whose tx hash is derived from `n`.
pub(crate) fn transfer_item(n: u32, updated_at: DateTime<Utc>, deleted: bool) -> Value {
    json!({
        "token": { "contract": CONTRACT, "tokenId": n.to_string() },
        "from": format!("0x{}", "01".repeat(20)),
        "to": format!("0x{}", "02".repeat(20)),
        "amount": "1",
        "block": 1,
        "txHash": format!("0x{:064x}", n),
        "logIndex": 0,
        "batchIndex": 0,
        "timestamp": updated_at.timestamp(),
        "isDeleted": deleted,
        "updatedAt": updated_at.to_rfc3339(),
    })
}

pub(crate) fn transfer_page(items: Vec<Value>, continuation: Option<&str>) -> Vec<u8> {
    serde_json::to_vec(&json!({ "transfers": items, "continuation": continuation }))
        .unwrap_or_default()
}

/// An in-memory transfer feed served with keyset pagination.
///
/// Items are ordered by `(updated_at, n)`; a request returns items inside
/// `[start, end)` strictly after the continuation key.
pub(crate) struct FakeFeed {
    items: Mutex<Vec<(DateTime<Utc>, u32, bool)>>,
    page_size: usize,
    failures: Mutex<VecDeque<u16>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl FakeFeed {
    pub fn new(page_size: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            page_size,
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, n: u32, updated_at: DateTime<Utc>, deleted: bool) {
        let mut items = self.items.lock().unwrap();
        items.push((updated_at, n, deleted));
        items.sort();
    }

    /// Fail the next request with the given HTTP status.
    pub fn fail_next(&self, status: u16) {
        self.failures.lock().unwrap().push_back(status);
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn serve(&self, request: &PageRequest) -> Vec<u8> {
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

        transfer_page(
            page.into_iter()
                .map(|(at, n, deleted)| transfer_item(n, at, deleted))
                .collect(),
            continuation.as_deref(),
        )
    }
}

#[async_trait]
impl PageSource for FakeFeed {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<u8>, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(status) = self.failures.lock().unwrap().pop_front() {
            return Err(ApiError::upstream(status, b"scripted failure"));
        }
        Ok(self.serve(request))
    }
}

/// Wired-up collaborators for one test.
pub(crate) struct Harness {
    pub feed: Arc<FakeFeed>,
    pub rows: Arc<MemoryRowStore>,
    pub checkpoints: Arc<MemoryCheckpointStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(now: DateTime<Utc>, page_size: usize) -> Self {
        Self {
            feed: Arc::new(FakeFeed::new(page_size)),
            rows: Arc::new(MemoryRowStore::new()),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            clock: Arc::new(ManualClock::new(now)),
        }
    }

    pub fn deps(&self) -> SyncDeps {
        SyncDeps::new(self.feed.clone(), self.rows.clone(), self.checkpoints.clone())
            .with_clock(self.clock.clone())
    }

    pub fn context(&self, config: SyncConfig) -> Arc<SyncContext> {
        Arc::new(SyncContext {
            config,
            deps: self.deps(),
            on_progress: None,
        })
    }

    pub fn stored(&self) -> usize {
        self.rows.len(DataType::Transfers)
    }
}
