//! Per-data-type dispatch from raw page bodies to canonical rows.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::allow_list::ContractAllowList;
use super::error::ApiError;
use super::record::{CanonicalRow, RowModel};
use super::sales::RawSale;
use super::transfers::RawTransfer;
use crate::entity::data_type::DataType;

/// One item of an upstream feed.
pub(crate) trait FeedRecord: DeserializeOwned {
    /// Lowercase-insensitive contract address the item belongs to.
    fn contract(&self) -> &str;
    fn updated_at(&self) -> DateTime<Utc>;
    fn is_deleted(&self) -> bool;
    fn into_row(self) -> Result<RowModel, ApiError>;
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(alias = "sales", alias = "transfers")]
    items: Vec<serde_json::Value>,
    #[serde(default)]
    continuation: Option<String>,
}

/// A decoded and filtered page.
#[derive(Debug, Clone, Default)]
pub struct TransformedPage {
    /// Rows that passed the allow-list, in feed order.
    pub rows: Vec<CanonicalRow>,
    /// Items in the page before filtering.
    pub received: usize,
    /// Items dropped because they could not be decoded or formatted.
    pub skipped: usize,
    /// Last `updated_at` in the page, from items that carry a valid one.
    pub last_updated_at: Option<DateTime<Utc>>,
    /// Next cursor; `None` once the window is drained.
    pub continuation: Option<String>,
}

impl TransformedPage {
    pub fn is_exhausted(&self) -> bool {
        self.continuation.is_none()
    }
}

impl DataType {
    /// Request path of this feed, relative to the chain's base URL.
    pub fn path(self) -> &'static str {
        match self {
            DataType::Sales => "/sales/v6",
            DataType::Transfers => "/transfers/bulk/v2",
        }
    }

    /// Decode a page body, drop items outside the allow-list and format the
    /// rest as canonical rows.
    ///
    /// # Errors
    /// Returns [`ApiError::Decode`] if the body is not a page of this feed.
    /// Individual items that fail to decode or format are skipped and counted.
    pub fn transform(
        self,
        body: &[u8],
        allow_list: &ContractAllowList,
    ) -> Result<TransformedPage, ApiError> {
        match self {
            DataType::Sales => transform_page::<RawSale>(body, allow_list),
            DataType::Transfers => transform_page::<RawTransfer>(body, allow_list),
        }
    }
}

fn transform_page<R: FeedRecord>(
    body: &[u8],
    allow_list: &ContractAllowList,
) -> Result<TransformedPage, ApiError> {
    let envelope: Envelope = serde_json::from_slice(body)?;

    let mut page = TransformedPage {
        received: envelope.items.len(),
        continuation: envelope.continuation.filter(|c| !c.is_empty()),
        ..Default::default()
    };

    for value in envelope.items {
        let item = match R::deserialize(&value) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable feed item");
                if let Some(at) = updated_at_of(&value) {
                    page.last_updated_at = Some(at);
                }
                page.skipped += 1;
                continue;
            }
        };

        page.last_updated_at = Some(item.updated_at());
        if !allow_list.allows(item.contract()) {
            continue;
        }
        let deleted = item.is_deleted();
        match item.into_row() {
            Ok(row) => page.rows.push(CanonicalRow { row, deleted }),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed feed item");
                page.skipped += 1;
            }
        }
    }

    Ok(page)
}

/// `updatedAt` of an item that failed to decode, if it is itself valid.
fn updated_at_of(item: &serde_json::Value) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::deserialize(item.get("updatedAt")?).ok()
}
