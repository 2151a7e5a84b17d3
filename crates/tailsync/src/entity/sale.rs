//! Sale entity - canonical row for one marketplace fill.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sale model.
///
/// Addresses and hashes are stored as raw bytes. Prices keep the raw on-chain
/// integer (as a decimal string, it can exceed 64 bits) next to the decimal,
/// USD and native-currency renderings reported upstream.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales")]
pub struct Model {
    /// SHA-256 over (tx_hash, log_index, batch_index).
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Vec<u8>,
    /// Upstream sale identifier.
    pub sale_id: Vec<u8>,

    // ─── Token ───────────────────────────────────────────────────────────────
    pub contract: Vec<u8>,
    /// Token id as a decimal string (uint256).
    pub token_id: String,

    // ─── Order ───────────────────────────────────────────────────────────────
    pub order_id: Option<Vec<u8>>,
    /// "ask" or "bid".
    pub order_side: String,
    pub order_kind: Option<String>,
    pub order_source: Option<String>,
    pub fill_source: Option<String>,

    // ─── Participants ────────────────────────────────────────────────────────
    pub from_address: Vec<u8>,
    pub to_address: Vec<u8>,
    /// Quantity filled (ERC-1155 amounts may exceed 64 bits).
    pub amount: String,

    // ─── Chain position ──────────────────────────────────────────────────────
    pub block: i64,
    pub tx_hash: Vec<u8>,
    pub log_index: i32,
    pub batch_index: i32,
    pub sold_at: DateTimeWithTimeZone,

    // ─── Price ───────────────────────────────────────────────────────────────
    pub currency_contract: Vec<u8>,
    pub currency_name: Option<String>,
    pub currency_symbol: Option<String>,
    pub currency_decimals: Option<i32>,
    pub price_raw: String,
    pub price_decimal: f64,
    pub price_usd: Option<f64>,
    pub price_native: Option<f64>,
    pub net_amount_raw: Option<String>,
    pub net_amount_decimal: Option<f64>,
    pub net_amount_usd: Option<f64>,
    pub net_amount_native: Option<f64>,

    // ─── Fees ────────────────────────────────────────────────────────────────
    pub wash_trading_score: Option<f64>,
    pub royalty_fee_bps: Option<i32>,
    pub marketplace_fee_bps: Option<i32>,
    pub paid_full_royalty: Option<bool>,

    // ─── Tracking ────────────────────────────────────────────────────────────
    pub created_at: Option<DateTimeWithTimeZone>,
    /// Upstream last-update time; the feed is ordered by this column.
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
