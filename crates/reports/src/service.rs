//! Report entry points over a ledger store and catalog.

use std::collections::HashMap;

use chrono::{Duration, NaiveTime};
use common::{Clock, ProductId};
use futures_util::StreamExt;
use ledger_store::{
    AggregateInventory, Catalog, InventoryStore, Movement, MovementQuery, Product,
};

use crate::error::{ReportError, Result};
use crate::expiry::{self, ExpiryReport};
use crate::inventory::{self, InventoryLine, InventorySummary};
use crate::movements::{MovementSummary, PeriodTotals};

/// Days covered by the "recent" and "last 30 days" views.
pub const RECENT_DAYS: i64 = 30;

/// Builds read-only reports. Never opens a write transaction.
pub struct ReportService<S, C, K> {
    store: S,
    catalog: C,
    clock: K,
    expiry_warning_days: i64,
}

impl<S, C, K> ReportService<S, C, K>
where
    S: InventoryStore,
    C: Catalog,
    K: Clock,
{
    pub fn new(store: S, catalog: C, clock: K, expiry_warning_days: i64) -> Self {
        Self {
            store,
            catalog,
            clock,
            expiry_warning_days,
        }
    }

    pub fn expiry_warning_days(&self) -> i64 {
        self.expiry_warning_days
    }

    async fn products(&self) -> Result<HashMap<ProductId, Product>> {
        Ok(self
            .catalog
            .list_products()
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }

    async fn inventory_lines(&self) -> Result<Vec<InventoryLine>> {
        let products = self.products().await?;
        let inventories = self.store.list_inventories().await?;
        Ok(inventory::lines(&inventories, &products))
    }

    /// Stock position of one product, zero if it has never moved. `None`
    /// when the product is not in the catalog.
    pub async fn product_inventory(&self, product_id: ProductId) -> Result<Option<InventoryLine>> {
        let Some(product) = self.catalog.get_product(product_id).await? else {
            return Ok(None);
        };
        let inventory = self
            .store
            .get_inventory(product_id)
            .await?
            .unwrap_or_else(|| AggregateInventory::empty(product_id, self.clock.now()));
        Ok(Some(InventoryLine::new(&inventory, &product)))
    }

    #[tracing::instrument(skip(self))]
    pub async fn inventory_summary(&self) -> Result<InventorySummary> {
        metrics::counter!("reports_generated_total", "report" => "inventory_summary").increment(1);
        Ok(inventory::summarize(&self.inventory_lines().await?))
    }

    #[tracing::instrument(skip(self))]
    pub async fn low_stock(&self) -> Result<Vec<InventoryLine>> {
        metrics::counter!("reports_generated_total", "report" => "low_stock").increment(1);
        Ok(inventory::low_stock(self.inventory_lines().await?))
    }

    #[tracing::instrument(skip(self))]
    pub async fn out_of_stock(&self) -> Result<Vec<InventoryLine>> {
        metrics::counter!("reports_generated_total", "report" => "out_of_stock").increment(1);
        Ok(inventory::out_of_stock(self.inventory_lines().await?))
    }

    /// Expired stock and stock expiring within `within_days`
    /// (defaults to the configured warning window).
    #[tracing::instrument(skip(self))]
    pub async fn expiry_report(&self, within_days: Option<i64>) -> Result<ExpiryReport> {
        let within_days = within_days.unwrap_or(self.expiry_warning_days);
        if within_days < 0 {
            return Err(ReportError::InvalidParameter(format!(
                "within_days must not be negative, got {within_days}"
            )));
        }

        metrics::counter!("reports_generated_total", "report" => "expiry").increment(1);
        let products = self.products().await?;
        let batches = self.store.list_all_batches().await?;
        let report = expiry::build(&batches, &products, self.clock.today(), within_days);

        tracing::debug!(
            expired = report.expired.len(),
            expiring = report.expiring_soon.len(),
            "expiry report built"
        );
        Ok(report)
    }

    /// IN/OUT totals for today (UTC) and the last 30 days.
    #[tracing::instrument(skip(self))]
    pub async fn movement_summary(&self) -> Result<MovementSummary> {
        metrics::counter!("reports_generated_total", "report" => "movement_summary").increment(1);

        let now = self.clock.now();
        let start_of_today = self.clock.today().and_time(NaiveTime::MIN).and_utc();
        let window_start = now - Duration::days(RECENT_DAYS);

        let mut summary = MovementSummary::default();
        let mut stream = self.store.stream_movements(window_start, now).await?;

        while let Some(result) = stream.next().await {
            let movement = result?;
            if movement.created_at >= window_start {
                summary.last_30_days.add(&movement);
            }
            if movement.created_at >= start_of_today {
                summary.today.add(&movement);
            }
        }

        Ok(summary)
    }

    /// Totals over an arbitrary closed time range.
    pub async fn period_totals(
        &self,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
    ) -> Result<PeriodTotals> {
        if from > to {
            return Err(ReportError::InvalidParameter(
                "range start is after its end".to_string(),
            ));
        }

        let mut totals = PeriodTotals::default();
        let mut stream = self.store.stream_movements(from, to).await?;
        while let Some(result) = stream.next().await {
            totals.add(&result?);
        }
        Ok(totals)
    }

    /// Movements of the last 30 days, newest first.
    pub async fn recent_movements(&self, limit: Option<usize>) -> Result<Vec<Movement>> {
        let since = self.clock.now() - Duration::days(RECENT_DAYS);
        let mut query = MovementQuery::new().from_timestamp(since);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(self.store.query_movements(query).await?)
    }
}
