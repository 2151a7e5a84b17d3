//! Upstream feed access.
//!
//! A [`PageSource`] returns raw page bodies; [`DataType::transform`] turns a
//! body into canonical rows. The split keeps the HTTP side swappable in tests
//! while every test still exercises the real parsers.
//!
//! [`DataType::transform`]: crate::entity::data_type::DataType::transform

mod allow_list;
mod client;
mod error;
mod rate_limit;
mod record;
mod sales;
mod transfers;
mod transform;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entity::data_type::DataType;

pub use allow_list::ContractAllowList;
pub use client::ApiClient;
pub use error::{ApiError, is_rate_limited, short_error_message};
pub use rate_limit::{ApiRateLimiter, DEFAULT_REQUESTS_PER_SECOND};
pub use record::{CanonicalRow, RowModel, row_id};
pub use transform::TransformedPage;

/// Maximum items requested per page.
pub const PAGE_SIZE: u32 = 1000;

/// One page request against an upstream feed.
///
/// Window bounds are sent on every page, continuation or not, so a cursor
/// restored from a checkpoint is always interpreted against the same window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub data_type: DataType,
    /// Inclusive lower bound on `updated_at`.
    pub start: DateTime<Utc>,
    /// Upper bound on `updated_at`; `None` for open-ended (tailing) windows.
    pub end: Option<DateTime<Utc>>,
    /// Cursor returned by the previous page, if any.
    pub continuation: Option<String>,
    /// Contract filter forwarded to the upstream (lowercase `0x` hex).
    pub contracts: Vec<String>,
}

/// Source of raw upstream pages.
///
/// Implementations perform exactly one request per call and never retry;
/// retry policy belongs to the sync loop.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<u8>, ApiError>;
}
