//! Initial migration: canonical row tables and the checkpoint table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_sales(manager).await?;
        self.create_transfers(manager).await?;
        self.create_sync_checkpoints(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncCheckpoints::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transfers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sales::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_sales(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sales::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sales::Id).binary().not_null().primary_key())
                    .col(ColumnDef::new(Sales::SaleId).binary().not_null())
                    // Token
                    .col(ColumnDef::new(Sales::Contract).binary().not_null())
                    .col(ColumnDef::new(Sales::TokenId).text().not_null())
                    // Order
                    .col(ColumnDef::new(Sales::OrderId).binary().null())
                    .col(ColumnDef::new(Sales::OrderSide).string().not_null())
                    .col(ColumnDef::new(Sales::OrderKind).string().null())
                    .col(ColumnDef::new(Sales::OrderSource).string().null())
                    .col(ColumnDef::new(Sales::FillSource).string().null())
                    // Participants
                    .col(ColumnDef::new(Sales::FromAddress).binary().not_null())
                    .col(ColumnDef::new(Sales::ToAddress).binary().not_null())
                    .col(ColumnDef::new(Sales::Amount).text().not_null())
                    // Chain position
                    .col(ColumnDef::new(Sales::Block).big_integer().not_null())
                    .col(ColumnDef::new(Sales::TxHash).binary().not_null())
                    .col(ColumnDef::new(Sales::LogIndex).integer().not_null())
                    .col(ColumnDef::new(Sales::BatchIndex).integer().not_null())
                    .col(
                        ColumnDef::new(Sales::SoldAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    // Price
                    .col(ColumnDef::new(Sales::CurrencyContract).binary().not_null())
                    .col(ColumnDef::new(Sales::CurrencyName).string().null())
                    .col(ColumnDef::new(Sales::CurrencySymbol).string().null())
                    .col(ColumnDef::new(Sales::CurrencyDecimals).integer().null())
                    .col(ColumnDef::new(Sales::PriceRaw).text().not_null())
                    .col(ColumnDef::new(Sales::PriceDecimal).double().not_null())
                    .col(ColumnDef::new(Sales::PriceUsd).double().null())
                    .col(ColumnDef::new(Sales::PriceNative).double().null())
                    .col(ColumnDef::new(Sales::NetAmountRaw).text().null())
                    .col(ColumnDef::new(Sales::NetAmountDecimal).double().null())
                    .col(ColumnDef::new(Sales::NetAmountUsd).double().null())
                    .col(ColumnDef::new(Sales::NetAmountNative).double().null())
                    // Fees
                    .col(ColumnDef::new(Sales::WashTradingScore).double().null())
                    .col(ColumnDef::new(Sales::RoyaltyFeeBps).integer().null())
                    .col(ColumnDef::new(Sales::MarketplaceFeeBps).integer().null())
                    .col(ColumnDef::new(Sales::PaidFullRoyalty).boolean().null())
                    // Tracking
                    .col(
                        ColumnDef::new(Sales::CreatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Sales::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sales_contract_token")
                    .table(Sales::Table)
                    .col(Sales::Contract)
                    .col(Sales::TokenId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sales_updated_at")
                    .table(Sales::Table)
                    .col(Sales::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_transfers(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transfers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transfers::Id)
                            .binary()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transfers::Contract).binary().not_null())
                    .col(ColumnDef::new(Transfers::TokenId).text().not_null())
                    .col(ColumnDef::new(Transfers::FromAddress).binary().not_null())
                    .col(ColumnDef::new(Transfers::ToAddress).binary().not_null())
                    .col(ColumnDef::new(Transfers::Amount).text().not_null())
                    .col(ColumnDef::new(Transfers::Block).big_integer().not_null())
                    .col(ColumnDef::new(Transfers::TxHash).binary().not_null())
                    .col(ColumnDef::new(Transfers::LogIndex).integer().not_null())
                    .col(ColumnDef::new(Transfers::BatchIndex).integer().not_null())
                    .col(
                        ColumnDef::new(Transfers::TransferredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transfers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transfers_contract_token")
                    .table(Transfers::Table)
                    .col(Transfers::Contract)
                    .col(Transfers::TokenId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_checkpoints(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncCheckpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncCheckpoints::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncCheckpoints::DataType).string().not_null())
                    .col(ColumnDef::new(SyncCheckpoints::Chain).string().not_null())
                    .col(ColumnDef::new(SyncCheckpoints::State).json().not_null())
                    .col(
                        ColumnDef::new(SyncCheckpoints::SavedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Sales {
    Table,
    Id,
    SaleId,
    Contract,
    TokenId,
    OrderId,
    OrderSide,
    OrderKind,
    OrderSource,
    FillSource,
    FromAddress,
    ToAddress,
    Amount,
    Block,
    TxHash,
    LogIndex,
    BatchIndex,
    SoldAt,
    CurrencyContract,
    CurrencyName,
    CurrencySymbol,
    CurrencyDecimals,
    PriceRaw,
    PriceDecimal,
    PriceUsd,
    PriceNative,
    NetAmountRaw,
    NetAmountDecimal,
    NetAmountUsd,
    NetAmountNative,
    WashTradingScore,
    RoyaltyFeeBps,
    MarketplaceFeeBps,
    PaidFullRoyalty,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Transfers {
    Table,
    Id,
    Contract,
    TokenId,
    FromAddress,
    ToAddress,
    Amount,
    Block,
    TxHash,
    LogIndex,
    BatchIndex,
    TransferredAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_checkpoints")]
enum SyncCheckpoints {
    Table,
    Id,
    DataType,
    Chain,
    State,
    SavedAt,
}
