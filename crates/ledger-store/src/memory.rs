use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    AggregateInventory, Batch, BatchId, DEFAULT_LOCK_TIMEOUT, Movement, MovementId, MovementQuery,
    NewBatch, NewMovement, ProductId, Result, StoreError,
    store::{InventoryStore, MovementStream, StoreTx},
};

#[derive(Debug, Default)]
struct Tables {
    batches: BTreeMap<BatchId, Batch>,
    inventories: BTreeMap<ProductId, AggregateInventory>,
    movements: Vec<Movement>,
}

struct Shared {
    tables: RwLock<Tables>,
    /// One row lock per product, covering its inventory row and all its batches.
    ///
    /// Entries nobody holds or waits on are pruned on the next acquire, so the
    /// map tracks contended products rather than every product ever touched.
    row_locks: Mutex<HashMap<ProductId, Arc<Mutex<()>>>>,
    next_batch_id: AtomicI64,
    next_movement_id: AtomicI64,
    lock_timeout: Duration,
}

/// In-memory ledger store.
///
/// Provides the same transactional contract as the PostgreSQL implementation:
/// a per-product async mutex stands in for row locks, and transaction writes
/// are staged privately until commit.
#[derive(Clone)]
pub struct InMemoryInventoryStore {
    shared: Arc<Shared>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty store with the default lock timeout.
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a new empty store whose lock waits give up after `lock_timeout`.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                next_batch_id: AtomicI64::new(1),
                next_movement_id: AtomicI64::new(1),
                lock_timeout,
            }),
        }
    }

    /// Returns the total number of committed movements.
    pub async fn movement_count(&self) -> usize {
        self.shared.tables.read().await.movements.len()
    }

    /// Returns the total number of committed batches.
    pub async fn batch_count(&self) -> usize {
        self.shared.tables.read().await.batches.len()
    }

    /// Clears all committed rows.
    pub async fn clear(&self) {
        let mut tables = self.shared.tables.write().await;
        *tables = Tables::default();
    }
}

impl Default for InMemoryInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        Ok(InMemoryTx {
            shared: self.shared.clone(),
            guards: HashMap::new(),
            batches: BTreeMap::new(),
            inventories: BTreeMap::new(),
            movements: Vec::new(),
        })
    }

    async fn get_inventory(&self, product_id: ProductId) -> Result<Option<AggregateInventory>> {
        let tables = self.shared.tables.read().await;
        Ok(tables.inventories.get(&product_id).cloned())
    }

    async fn list_inventories(&self) -> Result<Vec<AggregateInventory>> {
        let tables = self.shared.tables.read().await;
        Ok(tables.inventories.values().cloned().collect())
    }

    async fn get_batch(&self, batch_id: BatchId) -> Result<Option<Batch>> {
        let tables = self.shared.tables.read().await;
        Ok(tables.batches.get(&batch_id).cloned())
    }

    async fn list_batches(&self, product_id: ProductId) -> Result<Vec<Batch>> {
        let tables = self.shared.tables.read().await;
        let mut batches: Vec<_> = tables
            .batches
            .values()
            .filter(|b| b.product_id == product_id)
            .cloned()
            .collect();
        batches.sort_by(Batch::fefo_cmp);
        Ok(batches)
    }

    async fn list_all_batches(&self) -> Result<Vec<Batch>> {
        let tables = self.shared.tables.read().await;
        let mut batches: Vec<_> = tables.batches.values().cloned().collect();
        batches.sort_by(Batch::fefo_cmp);
        Ok(batches)
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<Movement>> {
        let tables = self.shared.tables.read().await;
        let mut movements: Vec<_> = tables
            .movements
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();

        // Newest first
        movements.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = query.offset.unwrap_or(0);
        let movements = movements.into_iter().skip(offset);
        let movements = match query.limit {
            Some(limit) => movements.take(limit).collect(),
            None => movements.collect(),
        };

        Ok(movements)
    }

    async fn stream_movements(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<MovementStream> {
        use futures_util::stream;

        let tables = self.shared.tables.read().await;
        let mut movements: Vec<_> = tables
            .movements
            .iter()
            .filter(|m| m.created_at >= from && m.created_at <= to)
            .cloned()
            .collect();
        movements.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(Box::pin(stream::iter(movements.into_iter().map(Ok))))
    }
}

/// Transaction over an [`InMemoryInventoryStore`].
///
/// Holds the row locks it has acquired and its staged writes. Nothing is
/// visible to other readers until [`StoreTx::commit`].
pub struct InMemoryTx {
    shared: Arc<Shared>,
    guards: HashMap<ProductId, OwnedMutexGuard<()>>,
    batches: BTreeMap<BatchId, Batch>,
    inventories: BTreeMap<ProductId, AggregateInventory>,
    movements: Vec<Movement>,
}

impl InMemoryTx {
    /// Acquires the product's row lock unless this transaction already holds it.
    async fn acquire(&mut self, product_id: ProductId) -> Result<()> {
        if self.guards.contains_key(&product_id) {
            return Ok(());
        }

        let row_lock = {
            let mut locks = self.shared.row_locks.lock().await;
            locks.retain(|id, lock| *id == product_id || Arc::strong_count(lock) > 1);
            locks.entry(product_id).or_default().clone()
        };

        let guard = tokio::time::timeout(self.shared.lock_timeout, row_lock.lock_owned())
            .await
            .map_err(|_| {
                metrics::counter!("ledger_store_lock_timeouts_total").increment(1);
                tracing::warn!(%product_id, "row lock wait timed out");
                StoreError::LockTimeout {
                    resource: format!("inventory:{product_id}"),
                }
            })?;

        self.guards.insert(product_id, guard);
        Ok(())
    }

    fn ensure_locked(&self, product_id: ProductId) -> Result<()> {
        if self.guards.contains_key(&product_id) {
            Ok(())
        } else {
            Err(StoreError::LockNotHeld {
                resource: format!("inventory:{product_id}"),
            })
        }
    }

    /// Reads a batch as this transaction sees it.
    async fn visible_batch(&self, batch_id: BatchId) -> Option<Batch> {
        if let Some(batch) = self.batches.get(&batch_id) {
            return Some(batch.clone());
        }
        self.shared.tables.read().await.batches.get(&batch_id).cloned()
    }

    async fn visible_inventory(&self, product_id: ProductId) -> Option<AggregateInventory> {
        if let Some(inventory) = self.inventories.get(&product_id) {
            return Some(inventory.clone());
        }
        self.shared
            .tables
            .read()
            .await
            .inventories
            .get(&product_id)
            .cloned()
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn lock_inventory(
        &mut self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<AggregateInventory> {
        self.acquire(product_id).await?;

        let inventory = match self.visible_inventory(product_id).await {
            Some(inventory) => inventory,
            None => {
                let created = AggregateInventory::empty(product_id, now);
                self.inventories.insert(product_id, created.clone());
                created
            }
        };
        Ok(inventory)
    }

    async fn lock_batch(&mut self, batch_id: BatchId) -> Result<Option<Batch>> {
        let Some(batch) = self.visible_batch(batch_id).await else {
            return Ok(None);
        };
        self.acquire(batch.product_id).await?;

        // Re-read: the row may have changed while we waited for the lock.
        Ok(self.visible_batch(batch_id).await)
    }

    async fn lock_batches(&mut self, product_id: ProductId) -> Result<Vec<Batch>> {
        self.acquire(product_id).await?;

        let mut batches: BTreeMap<BatchId, Batch> = self
            .shared
            .tables
            .read()
            .await
            .batches
            .values()
            .filter(|b| b.product_id == product_id)
            .map(|b| (b.id, b.clone()))
            .collect();
        for (id, batch) in &self.batches {
            if batch.product_id == product_id {
                batches.insert(*id, batch.clone());
            }
        }

        Ok(batches.into_values().collect())
    }

    async fn insert_batch(&mut self, new: NewBatch) -> Result<Batch> {
        self.ensure_locked(new.product_id)?;

        let id = BatchId::new(self.shared.next_batch_id.fetch_add(1, Ordering::SeqCst));
        let batch = Batch {
            id,
            product_id: new.product_id,
            lot_number: new.lot_number,
            expiry_date: new.expiry_date,
            quantity: 0,
            unit_cost: new.unit_cost,
            supplier_id: new.supplier_id,
            received_at: new.received_at,
            created_at: new.created_at,
        };
        self.batches.insert(id, batch.clone());
        Ok(batch)
    }

    async fn set_batch_quantity(&mut self, batch_id: BatchId, quantity: i64) -> Result<Batch> {
        if quantity < 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "batch {batch_id} quantity cannot be negative ({quantity})"
            )));
        }

        let mut batch = self
            .visible_batch(batch_id)
            .await
            .ok_or(StoreError::RowNotFound {
                table: "stock_batches",
                id: batch_id.as_i64(),
            })?;
        self.ensure_locked(batch.product_id)?;

        batch.quantity = quantity;
        self.batches.insert(batch_id, batch.clone());
        Ok(batch)
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

        let mut inventory =
            self.visible_inventory(product_id)
                .await
                .ok_or(StoreError::RowNotFound {
                    table: "inventories",
                    id: product_id.as_i64(),
                })?;
        inventory.quantity = quantity;
        inventory.last_updated = now;
        self.inventories.insert(product_id, inventory.clone());
        Ok(inventory)
    }

    async fn increment_inventory(
        &mut self,
        product_id: ProductId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<AggregateInventory> {
        self.ensure_locked(product_id)?;

        let current = self
            .visible_inventory(product_id)
            .await
            .ok_or(StoreError::RowNotFound {
                table: "inventories",
                id: product_id.as_i64(),
            })?;
        let quantity = current.quantity.checked_add(delta).ok_or_else(|| {
            StoreError::ConstraintViolation(format!(
                "inventory quantity for product {product_id} overflows ({} + {delta})",
                current.quantity
            ))
        })?;
        self.set_inventory_quantity(product_id, quantity, now).await
    }

    async fn insert_movement(&mut self, new: NewMovement) -> Result<Movement> {
        if !new.movement_type.accepts_quantity(new.quantity) {
            return Err(StoreError::ConstraintViolation(format!(
                "{} movement cannot carry quantity {}",
                new.movement_type, new.quantity
            )));
        }
        if let Some(batch_id) = new.batch_id {
            let batch = self
                .visible_batch(batch_id)
                .await
                .ok_or(StoreError::RowNotFound {
                    table: "stock_batches",
                    id: batch_id.as_i64(),
                })?;
            if batch.product_id != new.product_id {
                return Err(StoreError::ConstraintViolation(format!(
                    "batch {batch_id} does not belong to product {}",
                    new.product_id
                )));
            }
        }

        let id = MovementId::new(self.shared.next_movement_id.fetch_add(1, Ordering::SeqCst));
        let movement = new.into_movement(id);
        self.movements.push(movement.clone());
        Ok(movement)
    }

    async fn commit(mut self) -> Result<()> {
        let mut tables = self.shared.tables.write().await;
        tables.batches.append(&mut self.batches);
        tables.inventories.append(&mut self.inventories);
        tables.movements.append(&mut self.movements);
        drop(tables);

        // Row locks are released when `self.guards` drops here, after the writes
        // became visible.
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        tracing::debug!(
            staged_movements = self.movements.len(),
            "discarding in-memory transaction"
        );
        Ok(())
    }
}
