//! Data type enum for the event feeds tailsync can ingest.
//!
//! Each variant names one upstream feed and, by the same string, the table its
//! canonical rows are written to.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Supported upstream event feeds.
///
/// The string value doubles as the destination table name, so a `sales`
/// checkpoint always pairs with the `sales` table.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Marketplace sale (fill) events.
    #[sea_orm(string_value = "sales")]
    Sales,
    /// Token transfer events.
    #[sea_orm(string_value = "transfers")]
    Transfers,
}

impl DataType {
    /// Destination table for this feed's canonical rows.
    pub fn table_name(self) -> &'static str {
        match self {
            DataType::Sales => "sales",
            DataType::Transfers => "transfers",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sales" | "sale" => Ok(DataType::Sales),
            "transfers" | "transfer" => Ok(DataType::Transfers),
            _ => Err(format!("Unknown data type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_table_name() {
        assert_eq!(DataType::Sales.to_string(), "sales");
        assert_eq!(DataType::Transfers.to_string(), "transfers");
        assert_eq!(DataType::Sales.table_name(), "sales");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("sales".parse::<DataType>().unwrap(), DataType::Sales);
        assert_eq!("Sale".parse::<DataType>().unwrap(), DataType::Sales);
        assert_eq!(
            "TRANSFERS".parse::<DataType>().unwrap(),
            DataType::Transfers
        );
    }

    #[test]
    fn test_from_str_invalid() {
        let err = "asks".parse::<DataType>().unwrap_err();
        assert!(err.contains("Unknown data type"));
    }
}
