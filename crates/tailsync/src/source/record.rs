//! Canonical rows and the helpers shared by the per-feed formatters.

use sha2::{Digest, Sha256};

use super::error::ApiError;
use crate::entity::data_type::DataType;
use crate::entity::{sale, transfer};

/// Byte width of an EVM address.
pub(crate) const ADDRESS_LEN: usize = 20;

/// Byte width of a transaction hash or sale id.
pub(crate) const HASH_LEN: usize = 32;

/// A row ready to be written to its data type's table.
#[derive(Debug, Clone, PartialEq)]
pub enum RowModel {
    Sale(sale::Model),
    Transfer(transfer::Model),
}

impl RowModel {
    /// Deterministic row identifier.
    pub fn id(&self) -> &[u8] {
        match self {
            RowModel::Sale(m) => &m.id,
            RowModel::Transfer(m) => &m.id,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            RowModel::Sale(_) => DataType::Sales,
            RowModel::Transfer(_) => DataType::Transfers,
        }
    }
}

/// A canonical row plus the soft-delete flag carried by the feed.
///
/// The flag routes the row to a delete and is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    pub row: RowModel,
    pub deleted: bool,
}

impl CanonicalRow {
    pub fn id(&self) -> &[u8] {
        self.row.id()
    }
}

/// Derive the 32-byte row id for an on-chain event.
///
/// Hashes the transaction hash with the log and batch indexes, which together
/// identify one fill or one transfer and never change once mined.
pub fn row_id(tx_hash: &[u8], log_index: i32, batch_index: i32) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(tx_hash);
    hasher.update(log_index.to_be_bytes());
    hasher.update(batch_index.to_be_bytes());
    hasher.finalize().to_vec()
}

/// Decode a `0x`-prefixed hex value of exactly `width` bytes.
pub(crate) fn decode_fixed(value: &str, width: usize, field: &str) -> Result<Vec<u8>, ApiError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(digits)
        .map_err(|e| ApiError::Decode(format!("{field}: invalid hex {value:?}: {e}")))?;
    if bytes.len() != width {
        return Err(ApiError::Decode(format!(
            "{field}: expected {width} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Decode an optional hex value, discarding values that are not hex.
///
/// Order ids from some marketplaces are opaque strings rather than hashes.
pub(crate) fn decode_optional_hex(value: Option<&str>) -> Option<Vec<u8>> {
    let value = value?;
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).ok().filter(|b| !b.is_empty())
}
