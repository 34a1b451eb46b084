use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;

use crate::{
    AggregateInventory, Batch, BatchId, Movement, MovementQuery, NewBatch, NewMovement, ProductId,
    Result,
};

/// A stream of movements.
pub type MovementStream = Pin<Box<dyn Stream<Item = Result<Movement>> + Send>>;

/// Core trait for ledger store implementations.
///
/// Reads on the store itself take no locks and see committed state only.
/// Every mutation must go through a transaction from [`InventoryStore::begin`].
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// The transactional scope handed out by this store.
    type Tx: StoreTx;

    /// Opens a transactional scope.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Gets the aggregate inventory row for a product, if one exists yet.
    async fn get_inventory(&self, product_id: ProductId) -> Result<Option<AggregateInventory>>;

    /// Lists every aggregate inventory row, ordered by product id.
    async fn list_inventories(&self) -> Result<Vec<AggregateInventory>>;

    async fn get_batch(&self, batch_id: BatchId) -> Result<Option<Batch>>;

    /// Lists a product's batches in FEFO order (see [`Batch::fefo_cmp`]),
    /// including empty ones.
    async fn list_batches(&self, product_id: ProductId) -> Result<Vec<Batch>>;

    /// Lists every batch of every product in FEFO order.
    async fn list_all_batches(&self) -> Result<Vec<Batch>>;

    /// Retrieves movements matching a query, newest first.
    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<Movement>>;

    /// Streams movements created within `[from, to]`, oldest first.
    async fn stream_movements(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<MovementStream>;
}

/// One transactional scope over the ledger.
///
/// Locks taken inside the scope are held until [`StoreTx::commit`] or
/// [`StoreTx::rollback`]. Dropping the scope without committing discards
/// every write.
///
/// Lock order: a product's inventory row is locked before any of its
/// batches, and batches are locked in ascending id.
#[async_trait]
pub trait StoreTx: Send {
    /// Locks the product's aggregate inventory row, creating it with quantity
    /// zero if it does not exist yet.
    async fn lock_inventory(
        &mut self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<AggregateInventory>;

    /// Locks a single batch row. Returns `None` if the batch does not exist.
    async fn lock_batch(&mut self, batch_id: BatchId) -> Result<Option<Batch>>;

    /// Locks every batch of a product, returned in ascending id.
    async fn lock_batches(&mut self, product_id: ProductId) -> Result<Vec<Batch>>;

    /// Creates an empty batch. The product's inventory row must be locked.
    async fn insert_batch(&mut self, batch: NewBatch) -> Result<Batch>;

    /// Overwrites a locked batch's quantity.
    async fn set_batch_quantity(&mut self, batch_id: BatchId, quantity: i64) -> Result<Batch>;

    /// Overwrites a locked inventory row's quantity.
    async fn set_inventory_quantity(
        &mut self,
        product_id: ProductId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<AggregateInventory>;

    /// Adds `delta` to a locked inventory row in place (`quantity = quantity + delta`).
    async fn increment_inventory(
        &mut self,
        product_id: ProductId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<AggregateInventory>;

    /// Appends a ledger entry.
    async fn insert_movement(&mut self, movement: NewMovement) -> Result<Movement>;

    /// Makes every write of this scope visible and releases its locks.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this scope and releases its locks.
    async fn rollback(self) -> Result<()>;
}
