use sea_orm::DbErr;
use thiserror::Error;

use crate::entity::data_type::DataType;

/// Errors from the row store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// A row was routed to the wrong table.
    #[error("Row for {found} written to {expected}")]
    DataTypeMismatch { expected: DataType, found: DataType },

    /// The backend refused the write (in-memory store failure injection).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// The stored state is not valid checkpoint JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The checkpoint parsed but violates a structural invariant.
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),
}
