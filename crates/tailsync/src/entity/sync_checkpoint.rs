//! SyncCheckpoint entity - the latest serialized orchestration state per feed.
//!
//! One row exists per (data type, chain) pair, keyed by `"<data_type>/<chain>"`.
//! The `state` column holds the whole checkpoint tree as JSON and is replaced
//! wholesale on every save.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::chain::Chain;
use crate::entity::data_type::DataType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_checkpoints")]
pub struct Model {
    /// Feed key, see [`Model::feed_key`].
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub data_type: DataType,

    pub chain: Chain,

    /// Serialized checkpoint tree.
    #[sea_orm(column_type = "Json")]
    pub state: serde_json::Value,

    /// When this checkpoint was written.
    pub saved_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Build the primary key for a feed.
    pub fn feed_key(data_type: DataType, chain: Chain) -> String {
        format!("{}/{}", data_type, chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_key() {
        assert_eq!(
            Model::feed_key(DataType::Sales, Chain::Ethereum),
            "sales/ethereum"
        );
        assert_eq!(
            Model::feed_key(DataType::Transfers, Chain::Base),
            "transfers/base"
        );
    }
}
