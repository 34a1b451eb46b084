//! Multi-line receipts and dispenses committed as one unit.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{Clock, ProductId};
use ledger_store::{Catalog, InventoryStore, Movement, StoreTx};

use crate::engine::{AllocationEngine, record_committed, record_rejected};
use crate::error::{AllocationError, Result};
use crate::requests::{Adjustment, StockIn, StockOut};

/// What a bulk call does with a line that fails validation.
///
/// Only lines rejected as [`AllocationError::InvalidInput`] or
/// [`AllocationError::ProductNotFound`] are subject to the policy; such lines
/// are detected before anything is locked or written. Stock shortfalls and
/// integrity failures always abort the whole call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinePolicy {
    /// Drop the line, report it in [`BulkOutcome::skipped`], carry on.
    #[default]
    Skip,
    /// Reject the whole call.
    Abort,
}

impl LinePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinePolicy::Skip => "skip",
            LinePolicy::Abort => "abort",
        }
    }
}

impl std::fmt::Display for LinePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(LinePolicy::Skip),
            "abort" => Ok(LinePolicy::Abort),
            other => Err(format!("unknown line policy '{other}', expected skip or abort")),
        }
    }
}

/// Invalid-line handling per bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkConfig {
    pub stock_in_invalid_lines: LinePolicy,
    pub stock_out_invalid_lines: LinePolicy,
}

/// Lines of one bulk call with the document reference and notes they share.
#[derive(Debug, Clone)]
pub struct BulkRequest<T> {
    pub items: Vec<T>,
    /// Applied to every line that carries no reference of its own.
    pub reference: String,
    /// Applied to every line that carries no notes of its own.
    pub notes: String,
}

impl<T> BulkRequest<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            reference: String::new(),
            notes: String::new(),
        }
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// A line dropped under [`LinePolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// Zero-based position in the request.
    pub line: usize,
    pub product_id: ProductId,
    pub code: &'static str,
    pub reason: String,
}

/// Result of a committed bulk call.
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    /// One movement per accepted line, in request order.
    pub movements: Vec<Movement>,
    pub skipped: Vec<SkippedLine>,
}

/// Wraps lists of movements in one all-or-nothing transaction.
///
/// Every line is validated first; then the inventory rows of all distinct
/// products are locked in ascending product id, and the lines are applied in
/// caller order. The transaction commits only after the last line succeeds.
pub struct BulkCoordinator<S, C, K> {
    engine: AllocationEngine<S, C, K>,
    config: BulkConfig,
}

impl<S, C, K> BulkCoordinator<S, C, K>
where
    S: InventoryStore,
    C: Catalog,
    K: Clock,
{
    pub fn new(engine: AllocationEngine<S, C, K>, config: BulkConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &AllocationEngine<S, C, K> {
        &self.engine
    }

    pub fn config(&self) -> BulkConfig {
        self.config
    }

    /// Receives every line of a multi-line delivery.
    #[tracing::instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn bulk_stock_in(&self, request: BulkRequest<StockIn>) -> Result<BulkOutcome> {
        let start = Instant::now();
        let result = self.bulk_stock_in_inner(request).await;
        observe_bulk("stock_in", start, &result);
        result
    }

    async fn bulk_stock_in_inner(&self, request: BulkRequest<StockIn>) -> Result<BulkOutcome> {
        if request.items.is_empty() {
            return Err(AllocationError::invalid_input(
                "items",
                "items list is required",
            ));
        }

        let policy = self.config.stock_in_invalid_lines;
        let mut outcome = BulkOutcome::default();
        let mut accepted = Vec::with_capacity(request.items.len());

        for (line, mut item) in request.items.into_iter().enumerate() {
            inherit(&mut item.reference, &request.reference);
            inherit(&mut item.notes, &request.notes);

            match self.engine.validate_stock_in(&item).await {
                Ok(product) => accepted.push((line, product, item)),
                Err(error) => apply_policy(policy, line, item.product_id, error, &mut outcome)?,
            }
        }

        let now = self.engine.clock().now();
        let mut tx = self.engine.store().begin().await?;
        lock_inventories(&mut tx, accepted.iter().map(|(_, p, _)| p.id), now).await?;

        for (line, product, item) in &accepted {
            let movement = self
                .engine
                .apply_stock_in(&mut tx, product, item, now)
                .await
                .map_err(|e| line_rejected(*line, e))?;
            outcome.movements.push(movement);
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Dispenses every line of a multi-line order, or none of them.
    #[tracing::instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn bulk_stock_out(&self, request: BulkRequest<StockOut>) -> Result<BulkOutcome> {
        let start = Instant::now();
        let result = self.bulk_stock_out_inner(request).await;
        observe_bulk("stock_out", start, &result);
        result
    }

    async fn bulk_stock_out_inner(&self, request: BulkRequest<StockOut>) -> Result<BulkOutcome> {
        if request.items.is_empty() {
            return Err(AllocationError::invalid_input(
                "items",
                "items list is required",
            ));
        }

        let policy = self.config.stock_out_invalid_lines;
        let mut outcome = BulkOutcome::default();
        let mut accepted = Vec::with_capacity(request.items.len());

        for (line, mut item) in request.items.into_iter().enumerate() {
            inherit(&mut item.reference, &request.reference);
            inherit(&mut item.notes, &request.notes);

            match self.engine.validate_stock_out(&item).await {
                Ok(product) => accepted.push((line, product, item)),
                Err(error) => apply_policy(policy, line, item.product_id, error, &mut outcome)?,
            }
        }

        let now = self.engine.clock().now();
        let mut tx = self.engine.store().begin().await?;
        lock_inventories(&mut tx, accepted.iter().map(|(_, p, _)| p.id), now).await?;

        for (line, product, item) in &accepted {
            let movement = self
                .engine
                .apply_stock_out(&mut tx, product, item, now)
                .await
                .map_err(|e| line_rejected(*line, e))?;
            outcome.movements.push(movement);
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Manual stock-count correction for one product.
    pub async fn adjust_stock(
        &self,
        product_id: ProductId,
        delta: i64,
        notes: impl Into<String>,
    ) -> Result<Movement> {
        self.engine
            .record_adjustment(Adjustment::new(product_id, delta).notes(notes))
            .await
    }
}

fn inherit(field: &mut String, shared: &str) {
    if field.is_empty() {
        *field = shared.to_string();
    }
}

fn line_rejected(line: usize, error: AllocationError) -> AllocationError {
    AllocationError::LineRejected {
        line,
        source: Box::new(error),
    }
}

fn apply_policy(
    policy: LinePolicy,
    line: usize,
    product_id: ProductId,
    error: AllocationError,
    outcome: &mut BulkOutcome,
) -> Result<()> {
    if !error.is_line_invalid() || policy == LinePolicy::Abort {
        return Err(line_rejected(line, error));
    }

    tracing::warn!(line, %product_id, code = error.code(), error = %error, "skipping invalid bulk line");
    outcome.skipped.push(SkippedLine {
        line,
        product_id,
        code: error.code(),
        reason: error.to_string(),
    });
    Ok(())
}

/// Locks each product's inventory row once, in ascending product id.
async fn lock_inventories<T: StoreTx>(
    tx: &mut T,
    products: impl Iterator<Item = ProductId>,
    now: DateTime<Utc>,
) -> Result<()> {
    let ordered: BTreeSet<ProductId> = products.collect();
    for product_id in ordered {
        tx.lock_inventory(product_id, now).await?;
    }
    Ok(())
}

fn observe_bulk(kind: &'static str, start: Instant, result: &Result<BulkOutcome>) {
    metrics::histogram!("ledger_operation_duration_seconds", "op" => format!("bulk_{kind}"))
        .record(start.elapsed().as_secs_f64());

    match result {
        Ok(outcome) => {
            metrics::counter!("ledger_bulk_operations_total", "kind" => kind, "outcome" => "committed")
                .increment(1);
            for movement in &outcome.movements {
                record_committed(movement);
            }
            tracing::info!(
                kind,
                committed = outcome.movements.len(),
                skipped = outcome.skipped.len(),
                "bulk operation committed"
            );
        }
        Err(error) => {
            metrics::counter!("ledger_bulk_operations_total", "kind" => kind, "outcome" => "rejected")
                .increment(1);
            record_rejected(kind, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_policy_parses_case_insensitively() {
        assert_eq!("skip".parse::<LinePolicy>(), Ok(LinePolicy::Skip));
        assert_eq!(" ABORT ".parse::<LinePolicy>(), Ok(LinePolicy::Abort));
        assert!("ignore".parse::<LinePolicy>().is_err());
    }

    #[test]
    fn defaults_skip_invalid_lines() {
        let config = BulkConfig::default();
        assert_eq!(config.stock_in_invalid_lines, LinePolicy::Skip);
        assert_eq!(config.stock_out_invalid_lines, LinePolicy::Skip);
    }

    #[test]
    fn shared_reference_fills_blank_lines_only() {
        let mut blank = String::new();
        inherit(&mut blank, "INV-9");
        assert_eq!(blank, "INV-9");

        let mut own = "INV-1".to_string();
        inherit(&mut own, "INV-9");
        assert_eq!(own, "INV-1");
    }
}
