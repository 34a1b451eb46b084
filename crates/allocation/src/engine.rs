//! The allocation engine: the single writer of batch and aggregate quantities.

use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{BatchId, Clock, ProductId};
use ledger_store::{
    Batch, Catalog, InventoryStore, Movement, MovementType, NewBatch, NewMovement, Product,
    StoreTx,
};

use crate::error::{AllocationError, Result};
use crate::fefo;
use crate::requests::{Adjustment, StockIn, StockOut};

/// Records IN, OUT and ADJUST movements against the ledger.
///
/// Each public `record_*` call runs in its own transaction: it locks the
/// product's inventory row, then the batch rows it needs, mutates them, appends
/// the movement and commits. Any rejection drops the transaction, so nothing
/// is written.
pub struct AllocationEngine<S, C, K> {
    store: S,
    catalog: C,
    clock: K,
}

impl<S, C, K> AllocationEngine<S, C, K>
where
    S: InventoryStore,
    C: Catalog,
    K: Clock,
{
    pub fn new(store: S, catalog: C, clock: K) -> Self {
        Self {
            store,
            catalog,
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Receives stock into the named batch, or into a new batch when none is named.
    #[tracing::instrument(skip(self), fields(product_id = %request.product_id))]
    pub async fn record_stock_in(&self, request: StockIn) -> Result<Movement> {
        let start = Instant::now();
        let result: Result<Movement> = async {
            let product = self.validate_stock_in(&request).await?;
            let now = self.clock.now();
            let mut tx = self.store.begin().await?;
            let movement = self.apply_stock_in(&mut tx, &product, &request, now).await?;
            tx.commit().await?;
            Ok(movement)
        }
        .await;

        observe("stock_in", start, &result);
        result
    }

    /// Dispenses stock from the named batch, or from the FEFO choice when none is named.
    #[tracing::instrument(skip(self), fields(product_id = %request.product_id))]
    pub async fn record_stock_out(&self, request: StockOut) -> Result<Movement> {
        let start = Instant::now();
        let result: Result<Movement> = async {
            let product = self.validate_stock_out(&request).await?;
            let now = self.clock.now();
            let mut tx = self.store.begin().await?;
            let movement = self.apply_stock_out(&mut tx, &product, &request, now).await?;
            tx.commit().await?;
            Ok(movement)
        }
        .await;

        observe("stock_out", start, &result);
        result
    }

    /// Corrects the aggregate quantity by a signed delta. Batches are not touched.
    #[tracing::instrument(skip(self), fields(product_id = %request.product_id))]
    pub async fn record_adjustment(&self, request: Adjustment) -> Result<Movement> {
        let start = Instant::now();
        let result: Result<Movement> = async {
            if request.delta == 0 {
                return Err(AllocationError::invalid_input(
                    "quantity",
                    "adjustment must be non-zero",
                ));
            }
            let product = self.product(request.product_id).await?;
            let now = self.clock.now();
            let mut tx = self.store.begin().await?;
            let movement = self
                .apply_adjustment(&mut tx, &product, &request, now)
                .await?;
            tx.commit().await?;
            Ok(movement)
        }
        .await;

        observe("adjust", start, &result);
        result
    }

    /// Looks up a product in the catalog.
    pub async fn product(&self, product_id: ProductId) -> Result<Product> {
        self.catalog
            .get_product(product_id)
            .await?
            .ok_or(AllocationError::ProductNotFound(product_id))
    }

    pub(crate) async fn validate_stock_in(&self, request: &StockIn) -> Result<Product> {
        if request.quantity <= 0 {
            return Err(AllocationError::invalid_input(
                "quantity",
                format!("stock-in quantity must be positive, got {}", request.quantity),
            ));
        }
        let product = self.product(request.product_id).await?;
        if let Some(batch_id) = request.batch_id {
            self.check_batch_owner(batch_id, product.id).await?;
        }
        Ok(product)
    }

    pub(crate) async fn validate_stock_out(&self, request: &StockOut) -> Result<Product> {
        if request.quantity <= 0 {
            return Err(AllocationError::invalid_input(
                "quantity",
                format!("stock-out quantity must be positive, got {}", request.quantity),
            ));
        }
        let product = self.product(request.product_id).await?;
        if let Some(batch_id) = request.batch_id {
            self.check_batch_owner(batch_id, product.id).await?;
        }
        Ok(product)
    }

    /// Fails unless the batch exists and belongs to the product.
    ///
    /// Runs during validation, before a transaction is opened, so it never
    /// holds a second pooled connection next to an open one. A batch never
    /// changes owner, so the unlocked read is enough and a foreign batch is
    /// never locked.
    async fn check_batch_owner(&self, batch_id: BatchId, product_id: ProductId) -> Result<()> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(AllocationError::BatchNotFound(batch_id))?;

        if batch.product_id != product_id {
            return Err(AllocationError::BatchProductMismatch {
                batch_id,
                batch_product: batch.product_id,
                requested_product: product_id,
            });
        }
        Ok(())
    }

    pub(crate) async fn apply_stock_in(
        &self,
        tx: &mut S::Tx,
        product: &Product,
        request: &StockIn,
        now: DateTime<Utc>,
    ) -> Result<Movement> {
        let unit_cost = request.unit_cost.unwrap_or(product.cost_price);

        let inventory = tx.lock_inventory(product.id, now).await?;

        let batch = match request.batch_id {
            Some(batch_id) => locked_batch(tx, batch_id, product).await?,
            None => {
                tx.insert_batch(NewBatch {
                    product_id: product.id,
                    lot_number: request.lot_number.clone(),
                    expiry_date: request.expiry_date,
                    unit_cost: Some(unit_cost),
                    supplier_id: request.supplier_id,
                    received_at: now,
                    created_at: now,
                })
                .await?
            }
        };

        let batch_total = batch
            .quantity
            .checked_add(request.quantity)
            .ok_or_else(|| overflow(request.quantity, batch.quantity))?;
        if inventory.quantity.checked_add(request.quantity).is_none() {
            return Err(overflow(request.quantity, inventory.quantity));
        }

        tx.set_batch_quantity(batch.id, batch_total).await?;
        tx.increment_inventory(product.id, request.quantity, now)
            .await?;

        let movement = tx
            .insert_movement(NewMovement {
                product_id: product.id,
                batch_id: Some(batch.id),
                movement_type: MovementType::In,
                quantity: request.quantity,
                unit_price: Some(unit_cost),
                reference: request.reference.clone(),
                notes: request.notes.clone(),
                created_at: now,
            })
            .await?;

        Ok(movement)
    }

    pub(crate) async fn apply_stock_out(
        &self,
        tx: &mut S::Tx,
        product: &Product,
        request: &StockOut,
        now: DateTime<Utc>,
    ) -> Result<Movement> {
        let inventory = tx.lock_inventory(product.id, now).await?;

        let batch = match request.batch_id {
            Some(batch_id) => {
                let batch = locked_batch(tx, batch_id, product).await?;
                if batch.quantity < request.quantity {
                    return Err(AllocationError::InsufficientBatchStock {
                        batch_id,
                        available: batch.quantity,
                        requested: request.quantity,
                    });
                }
                batch
            }
            None => {
                let batches = tx.lock_batches(product.id).await?;
                fefo::select_batch(&batches, request.quantity)
                    .cloned()
                    .ok_or(AllocationError::NoSuitableBatch {
                        product_id: product.id,
                        requested: request.quantity,
                    })?
            }
        };

        tx.set_batch_quantity(batch.id, batch.quantity - request.quantity)
            .await?;

        if inventory.quantity < request.quantity {
            tracing::error!(
                product_id = %product.id,
                aggregate = inventory.quantity,
                requested = request.quantity,
                "aggregate inventory below batch stock, clamping at zero"
            );
        }
        let remaining = (inventory.quantity - request.quantity).max(0);
        tx.set_inventory_quantity(product.id, remaining, now)
            .await?;

        let movement = tx
            .insert_movement(NewMovement {
                product_id: product.id,
                batch_id: Some(batch.id),
                movement_type: MovementType::Out,
                quantity: -request.quantity,
                unit_price: Some(product.unit_price),
                reference: request.reference.clone(),
                notes: request.notes.clone(),
                created_at: now,
            })
            .await?;

        Ok(movement)
    }

    pub(crate) async fn apply_adjustment(
        &self,
        tx: &mut S::Tx,
        product: &Product,
        request: &Adjustment,
        now: DateTime<Utc>,
    ) -> Result<Movement> {
        let inventory = tx.lock_inventory(product.id, now).await?;

        let resulting = inventory
            .quantity
            .checked_add(request.delta)
            .ok_or_else(|| overflow(request.delta, inventory.quantity))?;
        if resulting < 0 {
            return Err(AllocationError::invalid_input(
                "quantity",
                format!(
                    "adjustment of {} would leave {} units on hand",
                    request.delta, resulting
                ),
            ));
        }

        tx.increment_inventory(product.id, request.delta, now)
            .await?;

        let movement = tx
            .insert_movement(NewMovement {
                product_id: product.id,
                batch_id: None,
                movement_type: MovementType::Adjust,
                quantity: request.delta,
                unit_price: Some(request.unit_price.unwrap_or(product.unit_price)),
                reference: String::new(),
                notes: request.notes.clone(),
                created_at: now,
            })
            .await?;

        Ok(movement)
    }
}

/// Locks a named batch and re-checks its owner on the locked row.
async fn locked_batch<T: StoreTx>(
    tx: &mut T,
    batch_id: BatchId,
    product: &Product,
) -> Result<Batch> {
    let batch = tx
        .lock_batch(batch_id)
        .await?
        .ok_or(AllocationError::BatchNotFound(batch_id))?;
    if batch.product_id != product.id {
        return Err(AllocationError::BatchProductMismatch {
            batch_id,
            batch_product: batch.product_id,
            requested_product: product.id,
        });
    }
    Ok(batch)
}

fn overflow(quantity: i64, current: i64) -> AllocationError {
    AllocationError::invalid_input(
        "quantity",
        format!("{quantity} units on top of {current} would overflow the stock counter"),
    )
}

/// Records metrics and logs for a finished single-movement call.
fn observe(op: &'static str, start: Instant, result: &Result<Movement>) {
    metrics::histogram!("ledger_operation_duration_seconds", "op" => op)
        .record(start.elapsed().as_secs_f64());

    match result {
        Ok(movement) => record_committed(movement),
        Err(error) => record_rejected(op, error),
    }
}

pub(crate) fn record_committed(movement: &Movement) {
    metrics::counter!("ledger_movements_total", "type" => movement.movement_type.as_str())
        .increment(1);
    tracing::info!(
        movement_id = %movement.id,
        product_id = %movement.product_id,
        batch_id = ?movement.batch_id,
        movement_type = %movement.movement_type,
        quantity = movement.quantity,
        "movement recorded"
    );
}

pub(crate) fn record_rejected(op: &'static str, error: &AllocationError) {
    metrics::counter!("ledger_movements_rejected_total", "reason" => error.code()).increment(1);
    tracing::warn!(op, code = error.code(), error = %error, "movement rejected");
}
