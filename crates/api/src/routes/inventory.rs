//! Per-product stock position, lots and movement history.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, NaiveDate, Utc};
use common::{BatchId, Clock, ProductId};
use ledger_store::{Batch, Catalog, InventoryStore, MovementQuery, MovementType};
use reports::InventoryLine;
use serde::{Deserialize, Serialize};

use super::stock::MovementResponse;
use crate::AppState;
use crate::error::ApiError;

/// Page size of `GET /movements` when the caller sets no limit.
pub const DEFAULT_MOVEMENT_LIMIT: usize = 100;
pub const MAX_MOVEMENT_LIMIT: usize = 1000;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct MovementQueryParams {
    pub product_id: Option<i64>,
    pub batch_id: Option<i64>,
    /// `IN`, `OUT` or `ADJUST`.
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl MovementQueryParams {
    fn into_query(self) -> Result<MovementQuery, ApiError> {
        let mut query = MovementQuery::new()
            .limit(
                self.limit
                    .unwrap_or(DEFAULT_MOVEMENT_LIMIT)
                    .min(MAX_MOVEMENT_LIMIT),
            )
            .offset(self.offset.unwrap_or(0));

        if let Some(id) = self.product_id {
            query = query.product_id(ProductId::new(id));
        }
        if let Some(id) = self.batch_id {
            query = query.batch_id(BatchId::new(id));
        }
        if let Some(raw) = self.movement_type {
            let movement_type: MovementType = raw
                .to_ascii_uppercase()
                .parse()
                .map_err(ApiError::BadRequest)?;
            query = query.movement_type(movement_type);
        }
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from > to
        {
            return Err(ApiError::BadRequest(
                "from must not be after to".to_string(),
            ));
        }
        if let Some(from) = self.from {
            query = query.from_timestamp(from);
        }
        if let Some(to) = self.to {
            query = query.to_timestamp(to);
        }
        Ok(query)
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub product_id: i64,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub reorder_level: i64,
    pub unit_price_cents: i64,
    pub total_value_cents: i64,
    pub is_low_stock: bool,
    pub last_updated: DateTime<Utc>,
}

impl From<InventoryLine> for InventoryResponse {
    fn from(line: InventoryLine) -> Self {
        Self {
            product_id: line.product_id.as_i64(),
            sku: line.sku,
            name: line.name,
            quantity: line.quantity,
            reorder_level: line.reorder_level,
            unit_price_cents: line.unit_price.cents(),
            total_value_cents: line.total_value.cents(),
            is_low_stock: line.is_low_stock,
            last_updated: line.last_updated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub id: i64,
    pub product_id: i64,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i64,
    pub unit_cost_cents: Option<i64>,
    pub supplier_id: Option<i64>,
    pub received_at: DateTime<Utc>,
    pub is_expired: bool,
    pub days_to_expiry: Option<i64>,
    pub value_cents: i64,
}

impl BatchResponse {
    fn new(batch: Batch, today: NaiveDate) -> Self {
        Self {
            id: batch.id.as_i64(),
            product_id: batch.product_id.as_i64(),
            is_expired: batch.is_expired(today),
            days_to_expiry: batch.days_to_expiry(today),
            value_cents: batch.value().cents(),
            lot_number: batch.lot_number,
            expiry_date: batch.expiry_date,
            quantity: batch.quantity,
            unit_cost_cents: batch.unit_cost.map(|c| c.cents()),
            supplier_id: batch.supplier_id,
            received_at: batch.received_at,
        }
    }
}

// -- Handlers --

/// GET /products/{id}/inventory: on-hand total with low-stock flag and value.
#[tracing::instrument(skip(state))]
pub async fn product_inventory<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(product_id): Path<i64>,
) -> Result<Json<InventoryResponse>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let line = state
        .reports
        .product_inventory(ProductId::new(product_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {product_id}")))?;
    Ok(Json(line.into()))
}

/// GET /products/{id}/batches: lots of a product in FEFO order.
#[tracing::instrument(skip(state))]
pub async fn product_batches<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(product_id): Path<i64>,
) -> Result<Json<Vec<BatchResponse>>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let engine = state.engine();
    let product_id = ProductId::new(product_id);
    engine.product(product_id).await?;

    let today = engine.clock().today();
    let batches = engine.store().list_batches(product_id).await?;
    Ok(Json(
        batches
            .into_iter()
            .map(|b| BatchResponse::new(b, today))
            .collect(),
    ))
}

/// GET /movements: movement history, newest first.
#[tracing::instrument(skip(state, params))]
pub async fn movements<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Query(params): Query<MovementQueryParams>,
) -> Result<Json<Vec<MovementResponse>>, ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let query = params.into_query()?;
    let movements = state.engine().store().query_movements(query).await?;
    Ok(Json(movements.into_iter().map(Into::into).collect()))
}
