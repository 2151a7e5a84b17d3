//! Transfer feed items.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::error::ApiError;
use super::record::{ADDRESS_LEN, HASH_LEN, RowModel, decode_fixed, row_id};
use super::transform::FeedRecord;
use crate::entity::transfer;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawToken {
    pub contract: String,
    #[serde(rename = "tokenId")]
    pub token_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawTransfer {
    pub token: RawToken,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub block: i64,
    pub tx_hash: String,
    pub log_index: i32,
    pub batch_index: i32,
    /// Block time, unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub is_deleted: bool,
    pub updated_at: DateTime<Utc>,
}

impl FeedRecord for RawTransfer {
    fn contract(&self) -> &str {
        &self.token.contract
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn into_row(self) -> Result<RowModel, ApiError> {
        let tx_hash = decode_fixed(&self.tx_hash, HASH_LEN, "txHash")?;
        let transferred_at = DateTime::from_timestamp(self.timestamp, 0)
            .ok_or_else(|| ApiError::Decode(format!("timestamp out of range: {}", self.timestamp)))?;

        Ok(RowModel::Transfer(transfer::Model {
            id: row_id(&tx_hash, self.log_index, self.batch_index),
            contract: decode_fixed(&self.token.contract, ADDRESS_LEN, "token.contract")?,
            token_id: self.token.token_id,
            from_address: decode_fixed(&self.from, ADDRESS_LEN, "from")?,
            to_address: decode_fixed(&self.to, ADDRESS_LEN, "to")?,
            amount: self.amount,
            block: self.block,
            tx_hash,
            log_index: self.log_index,
            batch_index: self.batch_index,
            transferred_at: transferred_at.fixed_offset(),
            updated_at: self.updated_at.fixed_offset(),
        }))
    }
}
