//! Sale feed items.
//!
//! Prices arrive as nested `{currency, amount, netAmount}` objects; they are
//! flattened into the `sales` row with the raw integer kept as a string.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::error::ApiError;
use super::record::{ADDRESS_LEN, HASH_LEN, RowModel, decode_fixed, decode_optional_hex, row_id};
use super::transfers::RawToken;
use super::transform::FeedRecord;
use crate::entity::sale;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawCurrency {
    pub contract: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAmount {
    pub raw: String,
    pub decimal: f64,
    pub usd: Option<f64>,
    pub native: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawPrice {
    pub currency: RawCurrency,
    pub amount: RawAmount,
    pub net_amount: Option<RawAmount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSale {
    pub sale_id: String,
    pub token: RawToken,
    pub order_id: Option<String>,
    pub order_side: String,
    pub order_kind: Option<String>,
    pub order_source: Option<String>,
    pub fill_source: Option<String>,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub block: i64,
    pub tx_hash: String,
    pub log_index: i32,
    pub batch_index: i32,
    pub timestamp: i64,
    pub price: RawPrice,
    pub wash_trading_score: Option<f64>,
    pub royalty_fee_bps: Option<i32>,
    pub marketplace_fee_bps: Option<i32>,
    pub paid_full_royalty: Option<bool>,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl FeedRecord for RawSale {
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
        let sold_at = DateTime::from_timestamp(self.timestamp, 0)
            .ok_or_else(|| ApiError::Decode(format!("timestamp out of range: {}", self.timestamp)))?;
        let price = self.price;
        let net = price.net_amount;

        Ok(RowModel::Sale(sale::Model {
            id: row_id(&tx_hash, self.log_index, self.batch_index),
            sale_id: decode_fixed(&self.sale_id, HASH_LEN, "saleId")?,
            contract: decode_fixed(&self.token.contract, ADDRESS_LEN, "token.contract")?,
            token_id: self.token.token_id,
            order_id: decode_optional_hex(self.order_id.as_deref()),
            order_side: self.order_side,
            order_kind: self.order_kind,
            order_source: self.order_source,
            fill_source: self.fill_source,
            from_address: decode_fixed(&self.from, ADDRESS_LEN, "from")?,
            to_address: decode_fixed(&self.to, ADDRESS_LEN, "to")?,
            amount: self.amount,
            block: self.block,
            tx_hash,
            log_index: self.log_index,
            batch_index: self.batch_index,
            sold_at: sold_at.fixed_offset(),
            currency_contract: decode_fixed(
                &price.currency.contract,
                ADDRESS_LEN,
                "price.currency.contract",
            )?,
            currency_name: price.currency.name,
            currency_symbol: price.currency.symbol,
            currency_decimals: price.currency.decimals,
            price_raw: price.amount.raw,
            price_decimal: price.amount.decimal,
            price_usd: price.amount.usd,
            price_native: price.amount.native,
            net_amount_raw: net.as_ref().map(|n| n.raw.clone()),
            net_amount_decimal: net.as_ref().map(|n| n.decimal),
            net_amount_usd: net.as_ref().and_then(|n| n.usd),
            net_amount_native: net.as_ref().and_then(|n| n.native),
            wash_trading_score: self.wash_trading_score,
            royalty_fee_bps: self.royalty_fee_bps,
            marketplace_fee_bps: self.marketplace_fee_bps,
            paid_full_royalty: self.paid_full_royalty,
            created_at: self.created_at.map(|t| t.fixed_offset()),
            updated_at: self.updated_at.fixed_offset(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A sale item as the upstream serializes it.
    fn sale_json(log_index: i32, updated_at: &str, deleted: bool) -> serde_json::Value {
        json!({
            "id": "ignored",
            "saleId": format!("0x{}", "5a".repeat(32)),
            "token": {
                "contract": format!("0x{}", "0c".repeat(20)),
                "tokenId": "42",
                "name": "Token #42",
            },
            "orderSource": "opensea.io",
            "orderSide": "ask",
            "orderKind": "seaport-v1.5",
            "orderId": format!("0x{}", "0e".repeat(32)),
            "from": format!("0x{}", "01".repeat(20)),
            "to": format!("0x{}", "02".repeat(20)),
            "amount": "1",
            "fillSource": "opensea.io",
            "block": 16_400_000,
            "txHash": format!("0x{}", "cc".repeat(32)),
            "logIndex": log_index,
            "batchIndex": 1,
            "timestamp": 1_673_776_800,
            "price": {
                "currency": {
                    "contract": format!("0x{}", "00".repeat(20)),
                    "name": "Ether",
                    "symbol": "ETH",
                    "decimals": 18,
                },
                "amount": { "raw": "1500000000000000000", "decimal": 1.5, "usd": 2400.5, "native": 1.5 },
                "netAmount": { "raw": "1462500000000000000", "decimal": 1.4625, "usd": 2340.49, "native": 1.4625 },
            },
            "washTradingScore": 0,
            "royaltyFeeBps": 0,
            "marketplaceFeeBps": 250,
            "paidFullRoyalty": true,
            "feeBreakdown": [],
            "isDeleted": deleted,
            "createdAt": "2023-01-15T10:00:05.000Z",
            "updatedAt": updated_at,
        })
    }

    #[test]
    fn formats_sale_row() {
        let raw: RawSale =
            serde_json::from_value(sale_json(7, "2023-01-15T10:00:05.000Z", false)).unwrap();
        let RowModel::Sale(row) = raw.into_row().unwrap() else {
            panic!("expected a sale row");
        };

        assert_eq!(row.id, row_id(&[0xcc; 32], 7, 1));
        assert_eq!(row.sale_id, vec![0x5a; 32]);
        assert_eq!(row.order_id, Some(vec![0x0e; 32]));
        assert_eq!(row.order_side, "ask");
        assert_eq!(row.price_raw, "1500000000000000000");
        assert_eq!(row.price_usd, Some(2400.5));
        assert_eq!(row.net_amount_raw.as_deref(), Some("1462500000000000000"));
        assert_eq!(row.marketplace_fee_bps, Some(250));
        assert_eq!(row.currency_symbol.as_deref(), Some("ETH"));
        assert_eq!(row.sold_at.to_rfc3339(), "2023-01-15T10:00:00+00:00");
    }

    #[test]
    fn missing_net_amount_leaves_columns_empty() {
        let mut value = sale_json(1, "2023-01-15T10:00:05Z", false);
        value["price"]
            .as_object_mut()
            .unwrap()
            .remove("netAmount");
        value["orderId"] = json!("blur-123");

        let raw: RawSale = serde_json::from_value(value).unwrap();
        let RowModel::Sale(row) = raw.into_row().unwrap() else {
            panic!("expected a sale row");
        };
        assert!(row.net_amount_raw.is_none());
        assert!(row.net_amount_usd.is_none());
        assert!(row.order_id.is_none());
    }

    #[test]
    fn soft_delete_flag_is_read_from_feed() {
        let raw: RawSale =
            serde_json::from_value(sale_json(1, "2023-01-15T10:00:05Z", true)).unwrap();
        assert!(raw.is_deleted());
    }
}
