//! Transfer entity - canonical row for one token movement.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transfers")]
pub struct Model {
    /// SHA-256 over (tx_hash, log_index, batch_index).
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Vec<u8>,
    pub contract: Vec<u8>,
    /// Token id as a decimal string (uint256).
    pub token_id: String,
    pub from_address: Vec<u8>,
    pub to_address: Vec<u8>,
    pub amount: String,
    pub block: i64,
    pub tx_hash: Vec<u8>,
    pub log_index: i32,
    pub batch_index: i32,
    pub transferred_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
