//! Chain enum identifying which upstream deployment a feed is read from.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Chains with a hosted upstream API deployment.
///
/// Every chain has its own base URL; the request path is chosen by the data type.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    #[sea_orm(string_value = "ethereum")]
    #[default]
    Ethereum,
    #[sea_orm(string_value = "sepolia")]
    Sepolia,
    #[sea_orm(string_value = "polygon")]
    Polygon,
    #[sea_orm(string_value = "arbitrum")]
    Arbitrum,
    #[sea_orm(string_value = "optimism")]
    Optimism,
    #[sea_orm(string_value = "base")]
    Base,
    #[sea_orm(string_value = "zora")]
    Zora,
}

impl Chain {
    /// Every supported chain, in display order.
    pub const ALL: [Chain; 7] = [
        Chain::Ethereum,
        Chain::Sepolia,
        Chain::Polygon,
        Chain::Arbitrum,
        Chain::Optimism,
        Chain::Base,
        Chain::Zora,
    ];

    /// Base URL of the hosted API for this chain (no trailing slash).
    pub fn base_url(self) -> &'static str {
        match self {
            Chain::Ethereum => "https://api.reservoir.tools",
            Chain::Sepolia => "https://api-sepolia.reservoir.tools",
            Chain::Polygon => "https://api-polygon.reservoir.tools",
            Chain::Arbitrum => "https://api-arbitrum.reservoir.tools",
            Chain::Optimism => "https://api-optimism.reservoir.tools",
            Chain::Base => "https://api-base.reservoir.tools",
            Chain::Zora => "https://api-zora.reservoir.tools",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Sepolia => "sepolia",
            Chain::Polygon => "polygon",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
            Chain::Zora => "zora",
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ethereum" | "mainnet" | "eth" => Ok(Chain::Ethereum),
            "sepolia" => Ok(Chain::Sepolia),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "arbitrum" => Ok(Chain::Arbitrum),
            "optimism" => Ok(Chain::Optimism),
            "base" => Ok(Chain::Base),
            "zora" => Ok(Chain::Zora),
            _ => Err(format!("Unknown chain: {}", s)),
        }
    }
}
