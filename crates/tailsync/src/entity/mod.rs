//! SeaORM entity definitions for the tailsync database schema.

pub mod chain;
pub mod data_type;
pub mod prelude;
pub mod sale;
pub mod sync_checkpoint;
pub mod transfer;
