//! Common re-exports for convenient entity usage.

pub use super::chain::Chain;
pub use super::data_type::DataType;
pub use super::sale::{
    ActiveModel as SaleActiveModel, Column as SaleColumn, Entity as Sale, Model as SaleModel,
};
pub use super::sync_checkpoint::{
    ActiveModel as SyncCheckpointActiveModel, Column as SyncCheckpointColumn,
    Entity as SyncCheckpoint, Model as SyncCheckpointModel,
};
pub use super::transfer::{
    ActiveModel as TransferActiveModel, Column as TransferColumn, Entity as Transfer,
    Model as TransferModel,
};
