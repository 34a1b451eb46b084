//! Read-only report endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, NaiveDate, Utc};
use ledger_store::{Catalog, InventoryStore};
use reports::{ExpiryLine, ExpiryReport, InventorySummary, PeriodTotals};
use serde::{Deserialize, Serialize};

use super::inventory::InventoryResponse;
use super::stock::MovementResponse;
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ExpiryParams {
    pub within_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct InventorySummaryResponse {
    pub total_items: usize,
    pub low_stock_items: usize,
    pub out_of_stock_items: usize,
    pub total_value_cents: i64,
}

impl From<InventorySummary> for InventorySummaryResponse {
    fn from(summary: InventorySummary) -> Self {
        Self {
            total_items: summary.total_items,
            low_stock_items: summary.low_stock_items,
            out_of_stock_items: summary.out_of_stock_items,
            total_value_cents: summary.total_value.cents(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExpiryLineResponse {
    pub batch_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub lot_number: Option<String>,
    pub expiry_date: NaiveDate,
    pub days_to_expiry: i64,
    pub quantity: i64,
    pub value_cents: i64,
}

impl From<ExpiryLine> for ExpiryLineResponse {
    fn from(line: ExpiryLine) -> Self {
        Self {
            batch_id: line.batch_id.as_i64(),
            product_id: line.product_id.as_i64(),
            product_name: line.product_name,
            lot_number: line.lot_number,
            expiry_date: line.expiry_date,
            days_to_expiry: line.days_to_expiry,
            quantity: line.quantity,
            value_cents: line.value.cents(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExpiryReportResponse {
    pub as_of: Option<NaiveDate>,
    pub within_days: i64,
    pub expired: Vec<ExpiryLineResponse>,
    pub expiring_soon: Vec<ExpiryLineResponse>,
    pub urgent: Vec<ExpiryLineResponse>,
    pub expired_value_cents: i64,
    pub expiring_value_cents: i64,
}

impl From<ExpiryReport> for ExpiryReportResponse {
    fn from(report: ExpiryReport) -> Self {
        let lines = |lines: Vec<ExpiryLine>| lines.into_iter().map(Into::into).collect();
        Self {
            as_of: report.as_of,
            within_days: report.within_days,
            expired_value_cents: report.expired_value.cents(),
            expiring_value_cents: report.expiring_value.cents(),
            expired: lines(report.expired),
            expiring_soon: lines(report.expiring_soon),
            urgent: lines(report.urgent),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PeriodTotalsResponse {
    pub stock_in: i64,
    pub stock_out: i64,
    pub adjustments: i64,
    pub movement_count: usize,
}

impl From<PeriodTotals> for PeriodTotalsResponse {
    fn from(totals: PeriodTotals) -> Self {
        Self {
            stock_in: totals.stock_in,
            stock_out: totals.stock_out,
            adjustments: totals.adjustments,
            movement_count: totals.movement_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MovementSummaryResponse {
    pub today: PeriodTotalsResponse,
    pub last_30_days: PeriodTotalsResponse,
}

// -- Handlers --

/// GET /reports/inventory-summary
#[tracing::instrument(skip(state))]
pub async fn inventory_summary<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
) -> Result<Json<InventorySummaryResponse>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    Ok(Json(state.reports.inventory_summary().await?.into()))
}

/// GET /reports/low-stock: products at or below their reorder level.
#[tracing::instrument(skip(state))]
pub async fn low_stock<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let lines = state.reports.low_stock().await?;
    Ok(Json(lines.into_iter().map(Into::into).collect()))
}

/// GET /reports/out-of-stock
#[tracing::instrument(skip(state))]
pub async fn out_of_stock<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let lines = state.reports.out_of_stock().await?;
    Ok(Json(lines.into_iter().map(Into::into).collect()))
}

/// GET /reports/expiry?within_days=N
#[tracing::instrument(skip(state))]
pub async fn expiry<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Query(params): Query<ExpiryParams>,
) -> Result<Json<ExpiryReportResponse>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let report = state.reports.expiry_report(params.within_days).await?;
    Ok(Json(report.into()))
}

/// GET /reports/movement-summary: totals for today and the last 30 days.
#[tracing::instrument(skip(state))]
pub async fn movement_summary<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
) -> Result<Json<MovementSummaryResponse>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let summary = state.reports.movement_summary().await?;
    Ok(Json(MovementSummaryResponse {
        today: summary.today.into(),
        last_30_days: summary.last_30_days.into(),
    }))
}

/// GET /reports/movement-totals?from=..&to=..
#[tracing::instrument(skip(state))]
pub async fn movement_totals<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Query(params): Query<RangeParams>,
) -> Result<Json<PeriodTotalsResponse>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let totals = state
        .reports
        .period_totals(params.from, params.to)
        .await?;
    Ok(Json(totals.into()))
}

/// GET /reports/recent-movements?limit=N: the last 30 days, newest first.
#[tracing::instrument(skip(state))]
pub async fn recent_movements<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<MovementResponse>>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let movements = state.reports.recent_movements(params.limit).await?;
    Ok(Json(movements.into_iter().map(Into::into).collect()))
}
