//! Integration tests for the SQL stores against an in-memory SQLite database.
//!
//! Rows are produced by the real transform from feed-shaped JSON so these
//! also cover the migration schema matching the entities.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use serde_json::{Value, json};

use tailsync::entity::{sale, transfer};
use tailsync::store::apply;
use tailsync::sync::Month;
use tailsync::{
    Chain, Checkpoint, CheckpointStore, ContractAllowList, DataType, DatabaseCheckpointStore,
    DatabaseStore, ManagerCheckpoint, WorkerCheckpoint, connect_and_migrate,
};

const CONTRACT: &str = "0x0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c";

async fn setup_test_db() -> DatabaseConnection {
    connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to create test database")
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, day, hour, 0, 0).unwrap()
}

fn transfer_json(n: u32, updated_at: DateTime<Utc>, deleted: bool) -> Value {
    json!({
        "token": { "contract": CONTRACT, "tokenId": n.to_string() },
        "from": format!("0x{}", "01".repeat(20)),
        "to": format!("0x{}", "02".repeat(20)),
        "amount": "1",
        "block": 16_400_000 + n,
        "txHash": format!("0x{:064x}", n),
        "logIndex": 0,
        "batchIndex": 0,
        "timestamp": at(1, 0).timestamp(),
        "isDeleted": deleted,
        "updatedAt": updated_at.to_rfc3339(),
    })
}

fn sale_json(updated_at: DateTime<Utc>) -> Value {
    json!({
        "saleId": format!("0x{}", "5a".repeat(32)),
        "token": { "contract": CONTRACT, "tokenId": "42" },
        "orderSide": "ask",
        "orderKind": "seaport-v1.5",
        "orderSource": "opensea.io",
        "orderId": format!("0x{}", "0e".repeat(32)),
        "from": format!("0x{}", "01".repeat(20)),
        "to": format!("0x{}", "02".repeat(20)),
        "amount": "1",
        "fillSource": "opensea.io",
        "block": 16_400_000,
        "txHash": format!("0x{}", "cc".repeat(32)),
        "logIndex": 3,
        "batchIndex": 1,
        "timestamp": at(15, 10).timestamp(),
        "price": {
            "currency": {
                "contract": format!("0x{}", "00".repeat(20)),
                "name": "Ether",
                "symbol": "ETH",
                "decimals": 18,
            },
            "amount": { "raw": "1500000000000000000", "decimal": 1.5, "usd": 2400.5, "native": 1.5 },
        },
        "marketplaceFeeBps": 250,
        "isDeleted": false,
        "updatedAt": updated_at.to_rfc3339(),
    })
}

/// Transform a transfer page and apply it to `store`.
async fn apply_transfers(store: &DatabaseStore, items: Vec<Value>) -> usize {
    let body = serde_json::to_vec(&json!({ "transfers": items, "continuation": null })).unwrap();
    let page = DataType::Transfers
        .transform(&body, &ContractAllowList::default())
        .unwrap();
    apply(store, DataType::Transfers, page.rows)
        .await
        .unwrap()
        .rows_written()
}

#[tokio::test]
async fn transfers_upsert_idempotently() {
    let db = setup_test_db().await;
    let store = DatabaseStore::new(db.clone());

    let items: Vec<_> = (0..5).map(|n| transfer_json(n, at(2, n), false)).collect();
    assert_eq!(apply_transfers(&store, items.clone()).await, 5);
    assert_eq!(apply_transfers(&store, items).await, 5);

    let count = transfer::Entity::find().count(&db).await.unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn newer_updated_at_overwrites_row() {
    let db = setup_test_db().await;
    let store = DatabaseStore::new(db.clone());

    apply_transfers(&store, vec![transfer_json(1, at(2, 0), false)]).await;

    let mut updated = transfer_json(1, at(3, 0), false);
    updated["to"] = json!(format!("0x{}", "03".repeat(20)));
    apply_transfers(&store, vec![updated]).await;

    let rows = transfer::Entity::find().all(&db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].to_address, vec![0x03; 20]);
    assert_eq!(rows[0].updated_at, at(3, 0).fixed_offset());
}

#[tokio::test]
async fn deleted_items_remove_rows() {
    let db = setup_test_db().await;
    let store = DatabaseStore::new(db.clone());

    let items: Vec<_> = (0..3).map(|n| transfer_json(n, at(2, 0), false)).collect();
    apply_transfers(&store, items).await;

    // One deletion for a stored row, one for a row never seen.
    apply_transfers(
        &store,
        vec![
            transfer_json(1, at(4, 0), true),
            transfer_json(9, at(4, 0), true),
        ],
    )
    .await;

    let rows = transfer::Entity::find().all(&db).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.token_id != "1"));
}

#[tokio::test]
async fn sales_round_trip_through_schema() {
    let db = setup_test_db().await;
    let store = DatabaseStore::new(db.clone());

    let body = serde_json::to_vec(&json!({ "sales": [sale_json(at(15, 10))] })).unwrap();
    let page = DataType::Sales
        .transform(&body, &ContractAllowList::new([CONTRACT]))
        .unwrap();
    apply(&store, DataType::Sales, page.rows.clone()).await.unwrap();
    apply(&store, DataType::Sales, page.rows).await.unwrap();

    let rows = sale::Entity::find().all(&db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].token_id, "42");
    assert_eq!(rows[0].price_raw, "1500000000000000000");
    assert_eq!(rows[0].marketplace_fee_bps, Some(250));
    assert!(rows[0].net_amount_raw.is_none());
}

#[tokio::test]
async fn checkpoint_store_saves_lists_and_clears() {
    let db = setup_test_db().await;
    let store = DatabaseCheckpointStore::new(db);

    assert!(
        store
            .load(DataType::Sales, Chain::Ethereum)
            .await
            .unwrap()
            .is_none()
    );

    let january = Month::new(2023, 1).unwrap();
    let checkpoint = Checkpoint {
        date: january,
        backfilled: false,
        managers: vec![ManagerCheckpoint {
            date: january,
            timestamp: Some(at(9, 0)),
            backfilled: false,
            workers: vec![WorkerCheckpoint {
                date: january.start(),
                end: Some(january.end().unwrap()),
                timestamp: Some(at(9, 0)),
                continuation: Some("opaque".into()),
                exhausted: false,
            }],
        }],
    };

    store
        .save(DataType::Sales, Chain::Ethereum, &checkpoint)
        .await
        .unwrap();

    // Saving again replaces the single row for the feed.
    let mut later = checkpoint.clone();
    later.managers[0].workers[0].continuation = Some("next".into());
    store
        .save(DataType::Sales, Chain::Ethereum, &later)
        .await
        .unwrap();
    store
        .save(DataType::Transfers, Chain::Base, &checkpoint)
        .await
        .unwrap();

    let loaded = store
        .load(DataType::Sales, Chain::Ethereum)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, later);

    let listed = store.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].data_type, DataType::Sales);
    assert_eq!(listed[1].chain, Chain::Base);

    assert!(store.clear(DataType::Sales, Chain::Ethereum).await.unwrap());
    assert!(!store.clear(DataType::Sales, Chain::Ethereum).await.unwrap());
    assert!(
        store
            .load(DataType::Sales, Chain::Ethereum)
            .await
            .unwrap()
            .is_none()
    );
}
