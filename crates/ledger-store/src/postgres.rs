use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    AggregateInventory, Batch, BatchId, Catalog, DEFAULT_LOCK_TIMEOUT, Money, Movement,
    MovementId, MovementQuery, MovementType, NewBatch, NewMovement, Product, ProductId, Result,
    StoreError,
    store::{InventoryStore, MovementStream, StoreTx},
};

const BATCH_COLUMNS: &str = "id, product_id, lot_number, expiry_date, quantity, unit_cost_cents, \
                             supplier_id, received_at, created_at";
const INVENTORY_COLUMNS: &str = "product_id, quantity, last_updated";
const MOVEMENT_COLUMNS: &str = "id, product_id, batch_id, movement_type, quantity, \
                                unit_price_cents, reference, notes, created_at";
const PRODUCT_COLUMNS: &str =
    "id, sku, name, reorder_level, unit_price_cents, cost_price_cents, is_active";

/// Rows fetched per round trip by [`InventoryStore::stream_movements`].
const STREAM_PAGE_SIZE: i64 = 500;

/// PostgreSQL-backed ledger store.
///
/// Row locks are real `SELECT ... FOR UPDATE` locks; the lock wait is bounded
/// per transaction with `lock_timeout`.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL ledger store with the default lock timeout.
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_timeout(pool, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn row_to_batch(row: PgRow) -> Result<Batch> {
    Ok(Batch {
        id: BatchId::new(row.try_get("id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        lot_number: row.try_get("lot_number")?,
        expiry_date: row.try_get("expiry_date")?,
        quantity: row.try_get("quantity")?,
        unit_cost: row
            .try_get::<Option<i64>, _>("unit_cost_cents")?
            .map(Money::from_cents),
        supplier_id: row.try_get("supplier_id")?,
        received_at: row.try_get("received_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_inventory(row: PgRow) -> Result<AggregateInventory> {
    Ok(AggregateInventory {
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: row.try_get("quantity")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn row_to_movement(row: PgRow) -> Result<Movement> {
    let movement_type: String = row.try_get("movement_type")?;
    Ok(Movement {
        id: MovementId::new(row.try_get("id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        batch_id: row.try_get::<Option<i64>, _>("batch_id")?.map(BatchId::new),
        movement_type: movement_type
            .parse::<MovementType>()
            .map_err(StoreError::InvalidData)?,
        quantity: row.try_get("quantity")?,
        unit_price: row
            .try_get::<Option<i64>, _>("unit_price_cents")?
            .map(Money::from_cents),
        reference: row.try_get("reference")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        reorder_level: row.try_get("reorder_level")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        cost_price: Money::from_cents(row.try_get("cost_price_cents")?),
        is_active: row.try_get("is_active")?,
    })
}

async fn fetch_movement_page(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    after: (DateTime<Utc>, i64),
) -> Result<Vec<Movement>> {
    let rows = sqlx::query(&format!(
        "SELECT {MOVEMENT_COLUMNS} FROM movements \
         WHERE created_at >= $1 AND created_at <= $2 AND (created_at, id) > ($3, $4) \
         ORDER BY created_at ASC, id ASC \
         LIMIT $5"
    ))
    .bind(from)
    .bind(to)
    .bind(after.0)
    .bind(after.1)
    .bind(STREAM_PAGE_SIZE)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_movement).collect()
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        let mut tx = self.pool.begin().await?;

        // SET LOCAL does not take bind parameters; set_config(.., true) is the
        // transaction-scoped equivalent.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(PostgresTx {
            tx,
            locked_products: HashSet::new(),
        })
    }

    async fn get_inventory(&self, product_id: ProductId) -> Result<Option<AggregateInventory>> {
        let row = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventories WHERE product_id = $1"
        ))
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_inventory).transpose()
    }

    async fn list_inventories(&self) -> Result<Vec<AggregateInventory>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventories ORDER BY product_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_inventory).collect()
    }

    async fn get_batch(&self, batch_id: BatchId) -> Result<Option<Batch>> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE id = $1"
        ))
        .bind(batch_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_batch).transpose()
    }

    async fn list_batches(&self, product_id: ProductId) -> Result<Vec<Batch>> {
        let rows = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE product_id = $1 \
             ORDER BY expiry_date ASC NULLS LAST, created_at ASC, id ASC"
        ))
        .bind(product_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_batch).collect()
    }

    async fn list_all_batches(&self) -> Result<Vec<Batch>> {
        let rows = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches \
             ORDER BY expiry_date ASC NULLS LAST, created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_batch).collect()
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<Movement>> {
        let mut sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.product_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND product_id = ${param_count}"));
        }
        if query.batch_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND batch_id = ${param_count}"));
        }
        if query.movement_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND movement_type = ANY(${param_count})"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(id) = query.product_id {
            sqlx_query = sqlx_query.bind(id.as_i64());
        }
        if let Some(id) = query.batch_id {
            sqlx_query = sqlx_query.bind(id.as_i64());
        }
        if let Some(types) = query.movement_types {
            let types: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(types);
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_movement).collect()
    }

    async fn stream_movements(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<MovementStream> {
        use futures_util::{TryStreamExt, stream};

        // Keyset pagination over (created_at, id); ids start at 1.
        let pool = self.pool.clone();
        let pages = stream::try_unfold(Some((from, 0_i64)), move |cursor| {
            let pool = pool.clone();
            async move {
                let Some(after) = cursor else {
                    return Ok::<_, StoreError>(None);
                };
                let page = fetch_movement_page(&pool, from, to, after).await?;
                if page.is_empty() {
                    return Ok(None);
                }
                let next = if (page.len() as i64) < STREAM_PAGE_SIZE {
                    None
                } else {
                    page.last().map(|m| (m.created_at, m.id.as_i64()))
                };
                Ok(Some((page, next)))
            }
        });

        let movements = pages
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, StoreError>)))
            .try_flatten();

        Ok(Box::pin(movements))
    }
}

/// Transaction over a [`PostgresInventoryStore`].
///
/// Dropping it without committing rolls back on the server.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
    locked_products: HashSet<ProductId>,
}

impl PostgresTx {
    fn ensure_locked(&self, product_id: ProductId) -> Result<()> {
        if self.locked_products.contains(&product_id) {
            Ok(())
        } else {
            Err(StoreError::LockNotHeld {
                resource: format!("inventory:{product_id}"),
            })
        }
    }

    async fn batch_product(&mut self, batch_id: BatchId) -> Result<ProductId> {
        let product_id: Option<i64> =
            sqlx::query_scalar("SELECT product_id FROM stock_batches WHERE id = $1")
                .bind(batch_id.as_i64())
                .fetch_optional(&mut *self.tx)
                .await?;

        product_id
            .map(ProductId::new)
            .ok_or(StoreError::RowNotFound {
                table: "stock_batches",
                id: batch_id.as_i64(),
            })
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn lock_inventory(
        &mut self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<AggregateInventory> {
        sqlx::query(
            r#"
            INSERT INTO inventories (product_id, quantity, last_updated)
            VALUES ($1, 0, $2)
            ON CONFLICT (product_id) DO NOTHING
            "#,
        )
        .bind(product_id.as_i64())
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventories WHERE product_id = $1 FOR UPDATE"
        ))
        .bind(product_id.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        self.locked_products.insert(product_id);
        row_to_inventory(row)
    }

    async fn lock_batch(&mut self, batch_id: BatchId) -> Result<Option<Batch>> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE id = $1 FOR UPDATE"
        ))
        .bind(batch_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_batch).transpose()
    }

    async fn lock_batches(&mut self, product_id: ProductId) -> Result<Vec<Batch>> {
        let rows = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE product_id = $1 \
             ORDER BY id ASC FOR UPDATE"
        ))
        .bind(product_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_batch).collect()
    }

    async fn insert_batch(&mut self, batch: NewBatch) -> Result<Batch> {
        self.ensure_locked(batch.product_id)?;

        let row = sqlx::query(&format!(
            "INSERT INTO stock_batches \
             (product_id, lot_number, expiry_date, quantity, unit_cost_cents, supplier_id, received_at, created_at) \
             VALUES ($1, $2, $3, 0, $4, $5, $6, $7) \
             RETURNING {BATCH_COLUMNS}"
        ))
        .bind(batch.product_id.as_i64())
        .bind(&batch.lot_number)
        .bind(batch.expiry_date)
        .bind(batch.unit_cost.map(|c| c.cents()))
        .bind(batch.supplier_id)
        .bind(batch.received_at)
        .bind(batch.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_batch(row)
    }

    async fn set_batch_quantity(&mut self, batch_id: BatchId, quantity: i64) -> Result<Batch> {
        if quantity < 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "batch {batch_id} quantity cannot be negative ({quantity})"
            )));
        }
        let product_id = self.batch_product(batch_id).await?;
        self.ensure_locked(product_id)?;

        let row = sqlx::query(&format!(
            "UPDATE stock_batches SET quantity = $2 WHERE id = $1 RETURNING {BATCH_COLUMNS}"
        ))
        .bind(batch_id.as_i64())
        .bind(quantity)
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_batch(row)
    }

    async fn set_inventory_quantity(
        &mut self,
        product_id: ProductId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<AggregateInventory> {
        self.ensure_locked(product_id)?;
        if quantity < 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "inventory quantity for product {product_id} cannot be negative ({quantity})"
            )));
        }

        let row = sqlx::query(&format!(
            "UPDATE inventories SET quantity = $2, last_updated = $3 \
             WHERE product_id = $1 RETURNING {INVENTORY_COLUMNS}"
        ))
        .bind(product_id.as_i64())
        .bind(quantity)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_inventory)
            .transpose()?
            .ok_or(StoreError::RowNotFound {
                table: "inventories",
                id: product_id.as_i64(),
            })
    }

    async fn increment_inventory(
        &mut self,
        product_id: ProductId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<AggregateInventory> {
        self.ensure_locked(product_id)?;

        let row = sqlx::query(&format!(
            "UPDATE inventories SET quantity = quantity + $2, last_updated = $3 \
             WHERE product_id = $1 RETURNING {INVENTORY_COLUMNS}"
        ))
        .bind(product_id.as_i64())
        .bind(delta)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_inventory)
            .transpose()?
            .ok_or(StoreError::RowNotFound {
                table: "inventories",
                id: product_id.as_i64(),
            })
    }

    async fn insert_movement(&mut self, movement: NewMovement) -> Result<Movement> {
        let row = sqlx::query(&format!(
            "INSERT INTO movements \
             (product_id, batch_id, movement_type, quantity, unit_price_cents, reference, notes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {MOVEMENT_COLUMNS}"
        ))
        .bind(movement.product_id.as_i64())
        .bind(movement.batch_id.map(|b| b.as_i64()))
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(movement.unit_price.map(|p| p.cents()))
        .bind(&movement.reference)
        .bind(&movement.notes)
        .bind(movement.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_movement(row)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Catalog backed by the `products` table.
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a product row. Catalog management normally owns this table;
    /// this exists for seeding and tests.
    pub async fn insert_product(
        &self,
        sku: &str,
        name: &str,
        reorder_level: i64,
        unit_price: Money,
        cost_price: Money,
    ) -> Result<Product> {
        let row = sqlx::query(&format!(
            "INSERT INTO products (sku, name, reorder_level, unit_price_cents, cost_price_cents) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(sku)
        .bind(name)
        .bind(reorder_level)
        .bind(unit_price.cents())
        .bind(cost_price.cents())
        .fetch_one(&self.pool)
        .await?;

        row_to_product(row)
    }
}

#[async_trait]
impl Catalog for PostgresCatalog {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_product).collect()
    }
}
