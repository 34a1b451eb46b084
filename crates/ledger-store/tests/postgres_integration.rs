//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p ledger-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use futures_util::StreamExt;
use ledger_store::{
    Catalog, InventoryStore, Money, MovementQuery, MovementType, NewBatch, NewMovement,
    PostgresCatalog, PostgresInventoryStore, Product, StoreError, StoreTx,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // raw_sql executes every statement in the file
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Fresh store and catalog over cleared tables, with one seeded product.
async fn setup() -> (PostgresInventoryStore, PostgresCatalog, Product) {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE movements, inventories, stock_batches, products RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    let catalog = PostgresCatalog::new(pool.clone());
    let product = catalog
        .insert_product(
            "PARA500",
            "Paracetamol 500mg Tab",
            10,
            Money::from_cents(500),
            Money::from_cents(300),
        )
        .await
        .unwrap();

    let store = PostgresInventoryStore::with_lock_timeout(pool, Duration::from_millis(200));
    (store, catalog, product)
}

fn receipt(product: &Product, batch_id: ledger_store::BatchId, quantity: i64) -> NewMovement {
    NewMovement {
        product_id: product.id,
        batch_id: Some(batch_id),
        movement_type: MovementType::In,
        quantity,
        unit_price: Some(product.cost_price),
        reference: "GRN-001".to_string(),
        notes: String::new(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[serial]
async fn catalog_reads_seeded_product() {
    let (_store, catalog, product) = setup().await;

    let fetched = catalog.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(fetched.sku, "PARA500");
    assert_eq!(fetched.unit_price, Money::from_cents(500));
    assert_eq!(catalog.list_products().await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn committed_receipt_is_visible() {
    let (store, _catalog, product) = setup().await;
    let now = Utc::now();

    let mut tx = store.begin().await.unwrap();
    tx.lock_inventory(product.id, now).await.unwrap();
    let mut new_batch = NewBatch::shell(product.id, now);
    new_batch.expiry_date = NaiveDate::from_ymd_opt(2030, 1, 1);
    new_batch.unit_cost = Some(Money::from_cents(300));
    let batch = tx.insert_batch(new_batch).await.unwrap();
    tx.set_batch_quantity(batch.id, 40).await.unwrap();
    tx.increment_inventory(product.id, 40, now).await.unwrap();
    let movement = tx.insert_movement(receipt(&product, batch.id, 40)).await.unwrap();
    tx.commit().await.unwrap();

    let stored = store.get_batch(batch.id).await.unwrap().unwrap();
    assert_eq!(stored.quantity, 40);
    assert_eq!(stored.unit_cost, Some(Money::from_cents(300)));

    let inventory = store.get_inventory(product.id).await.unwrap().unwrap();
    assert_eq!(inventory.quantity, 40);

    let movements = store
        .query_movements(MovementQuery::for_product(product.id))
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].id, movement.id);
    assert_eq!(movements[0].movement_type, MovementType::In);
}

#[tokio::test]
#[serial]
async fn rollback_discards_writes() {
    let (store, _catalog, product) = setup().await;
    let now = Utc::now();

    let mut tx = store.begin().await.unwrap();
    tx.lock_inventory(product.id, now).await.unwrap();
    let batch = tx.insert_batch(NewBatch::shell(product.id, now)).await.unwrap();
    tx.set_batch_quantity(batch.id, 5).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(store.get_batch(batch.id).await.unwrap().is_none());
    assert!(store.get_inventory(product.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn check_constraints_map_to_constraint_violation() {
    let (store, _catalog, product) = setup().await;
    let now = Utc::now();

    let mut tx = store.begin().await.unwrap();
    tx.lock_inventory(product.id, now).await.unwrap();
    let result = tx.increment_inventory(product.id, -1, now).await;
    assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));
}

#[tokio::test]
#[serial]
async fn movement_sign_rule_enforced_by_schema() {
    let (store, _catalog, product) = setup().await;
    let now = Utc::now();

    let mut tx = store.begin().await.unwrap();
    tx.lock_inventory(product.id, now).await.unwrap();
    let batch = tx.insert_batch(NewBatch::shell(product.id, now)).await.unwrap();

    let mut movement = receipt(&product, batch.id, 5);
    movement.quantity = -5;
    let result = tx.insert_movement(movement).await;
    assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));
}

#[tokio::test]
#[serial]
async fn second_locker_times_out() {
    let (store, _catalog, product) = setup().await;
    let now = Utc::now();

    // Make sure the row exists so both transactions contend on FOR UPDATE
    let mut tx = store.begin().await.unwrap();
    tx.lock_inventory(product.id, now).await.unwrap();
    tx.commit().await.unwrap();

    let mut holder = store.begin().await.unwrap();
    holder.lock_inventory(product.id, now).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let result = waiter.lock_inventory(product.id, now).await;
    assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
    assert!(result.unwrap_err().is_retryable());

    holder.rollback().await.unwrap();
}

#[tokio::test]
#[serial]
async fn batches_listed_in_fefo_order() {
    let (store, _catalog, product) = setup().await;
    let now = Utc::now();

    let mut tx = store.begin().await.unwrap();
    tx.lock_inventory(product.id, now).await.unwrap();
    let undated = tx.insert_batch(NewBatch::shell(product.id, now)).await.unwrap();
    let mut late = NewBatch::shell(product.id, now);
    late.expiry_date = NaiveDate::from_ymd_opt(2031, 6, 1);
    let late = tx.insert_batch(late).await.unwrap();
    let mut early = NewBatch::shell(product.id, now);
    early.expiry_date = NaiveDate::from_ymd_opt(2030, 1, 1);
    let early = tx.insert_batch(early).await.unwrap();
    tx.commit().await.unwrap();

    let ids: Vec<_> = store
        .list_batches(product.id)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(ids, vec![early.id, late.id, undated.id]);
}

#[tokio::test]
#[serial]
async fn movements_are_append_only() {
    let (store, _catalog, product) = setup().await;
    let now = Utc::now();

    let mut tx = store.begin().await.unwrap();
    tx.lock_inventory(product.id, now).await.unwrap();
    let batch = tx.insert_batch(NewBatch::shell(product.id, now)).await.unwrap();
    tx.insert_movement(receipt(&product, batch.id, 5)).await.unwrap();
    tx.commit().await.unwrap();

    let result = sqlx::query("UPDATE movements SET quantity = 50")
        .execute(store.pool())
        .await;
    assert!(result.is_err());

    let result = sqlx::query("DELETE FROM movements").execute(store.pool()).await;
    assert!(result.is_err());
}

#[tokio::test]
#[serial]
async fn stream_movements_in_range() {
    let (store, _catalog, product) = setup().await;
    let base = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.lock_inventory(product.id, base).await.unwrap();
    let batch = tx.insert_batch(NewBatch::shell(product.id, base)).await.unwrap();
    for day in 0..5 {
        let mut movement = receipt(&product, batch.id, 1);
        movement.created_at = base + chrono::Duration::days(day);
        tx.insert_movement(movement).await.unwrap();
    }
    tx.commit().await.unwrap();

    let stream = store
        .stream_movements(base, base + chrono::Duration::days(2))
        .await
        .unwrap();
    let movements: Vec<_> = stream.collect().await;
    assert_eq!(movements.len(), 3);
    assert!(movements.iter().all(|m| m.is_ok()));
}
