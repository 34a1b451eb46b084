//! Movement endpoints: receipts, dispenses, bulk calls and adjustments.

use std::sync::Arc;

use allocation::{
    Adjustment, AllocationError, BulkOutcome, BulkRequest, LinePolicy, SkippedLine, StockIn,
    StockOut,
};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use common::{BatchId, Money, ProductId};
use ledger_store::{Catalog, InventoryStore, Movement};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct StockInRequest {
    pub product_id: i64,
    pub quantity: i64,
    /// Defaults to the product's cost price.
    pub unit_cost_cents: Option<i64>,
    /// Tops up an existing lot instead of creating one.
    pub batch_id: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
    pub lot_number: Option<String>,
    pub supplier_id: Option<i64>,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub notes: String,
}

impl StockInRequest {
    fn into_stock_in(self) -> StockIn {
        let mut request = StockIn::new(ProductId::new(self.product_id), self.quantity)
            .reference(self.reference)
            .notes(self.notes);
        request.unit_cost = self.unit_cost_cents.map(Money::from_cents);
        request.batch_id = self.batch_id.map(BatchId::new);
        request.expiry_date = self.expiry_date;
        request.lot_number = self.lot_number;
        request.supplier_id = self.supplier_id;
        request
    }
}

#[derive(Debug, Deserialize)]
pub struct StockOutRequest {
    pub product_id: i64,
    pub quantity: i64,
    /// Draw from this lot instead of the FEFO choice.
    pub batch_id: Option<i64>,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub notes: String,
}

impl StockOutRequest {
    fn into_stock_out(self) -> StockOut {
        let mut request = StockOut::new(ProductId::new(self.product_id), self.quantity)
            .reference(self.reference)
            .notes(self.notes);
        request.batch_id = self.batch_id.map(BatchId::new);
        request
    }
}

/// Bulk body. Items are decoded one by one so a malformed line is handled
/// by the configured line policy instead of failing the whole body.
#[derive(Debug, Deserialize)]
pub struct BulkMovementRequest {
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// Signed correction; must not be zero.
    pub quantity: i64,
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub notes: String,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct MovementResponse {
    pub id: i64,
    pub product_id: i64,
    pub batch_id: Option<i64>,
    pub movement_type: String,
    pub quantity: i64,
    pub unit_price_cents: Option<i64>,
    pub reference: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl From<Movement> for MovementResponse {
    fn from(movement: Movement) -> Self {
        Self {
            id: movement.id.as_i64(),
            product_id: movement.product_id.as_i64(),
            batch_id: movement.batch_id.map(|b| b.as_i64()),
            movement_type: movement.movement_type.to_string(),
            quantity: movement.quantity,
            unit_price_cents: movement.unit_price.map(|p| p.cents()),
            reference: movement.reference,
            notes: movement.notes,
            created_at: movement.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SkippedLineResponse {
    pub line: usize,
    pub product_id: Option<i64>,
    pub code: &'static str,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct BulkMovementResponse {
    pub movements: Vec<MovementResponse>,
    pub skipped: Vec<SkippedLineResponse>,
}

// -- Handlers --

/// POST /stock-in: receive stock into a new or existing lot.
#[tracing::instrument(skip(state, req), fields(product_id = req.product_id))]
pub async fn stock_in<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<StockInRequest>,
) -> Result<(StatusCode, Json<MovementResponse>), ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let movement = state.engine().record_stock_in(req.into_stock_in()).await?;
    Ok((StatusCode::CREATED, Json(movement.into())))
}

/// POST /stock-out: dispense from one lot, FEFO unless a lot is named.
#[tracing::instrument(skip(state, req), fields(product_id = req.product_id))]
pub async fn stock_out<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<StockOutRequest>,
) -> Result<(StatusCode, Json<MovementResponse>), ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let movement = state
        .engine()
        .record_stock_out(req.into_stock_out())
        .await?;
    Ok((StatusCode::CREATED, Json(movement.into())))
}

/// POST /stock-in/bulk: receive a multi-line delivery in one transaction.
#[tracing::instrument(skip(state, req), fields(lines = req.items.len()))]
pub async fn bulk_stock_in<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<BulkMovementRequest>,
) -> Result<(StatusCode, Json<BulkMovementResponse>), ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let policy = state.coordinator.config().stock_in_invalid_lines;
    let mut decoded = decode_lines::<StockInRequest>(req.items, policy)?;
    if decoded.is_all_skipped() {
        return Ok(decoded.into_response(BulkOutcome::default()));
    }

    let items = std::mem::take(&mut decoded.items)
        .into_iter()
        .map(StockInRequest::into_stock_in)
        .collect();
    let request = BulkRequest::new(items)
        .reference(req.reference)
        .notes(req.notes);

    let outcome = state
        .coordinator
        .bulk_stock_in(request)
        .await
        .map_err(|e| decoded.remap_error(e))?;
    Ok(decoded.into_response(outcome))
}

/// POST /stock-out/bulk: dispense a multi-line order, all lines or none.
#[tracing::instrument(skip(state, req), fields(lines = req.items.len()))]
pub async fn bulk_stock_out<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<BulkMovementRequest>,
) -> Result<(StatusCode, Json<BulkMovementResponse>), ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let policy = state.coordinator.config().stock_out_invalid_lines;
    let mut decoded = decode_lines::<StockOutRequest>(req.items, policy)?;
    if decoded.is_all_skipped() {
        return Ok(decoded.into_response(BulkOutcome::default()));
    }

    let items = std::mem::take(&mut decoded.items)
        .into_iter()
        .map(StockOutRequest::into_stock_out)
        .collect();
    let request = BulkRequest::new(items)
        .reference(req.reference)
        .notes(req.notes);

    let outcome = state
        .coordinator
        .bulk_stock_out(request)
        .await
        .map_err(|e| decoded.remap_error(e))?;
    Ok(decoded.into_response(outcome))
}

/// POST /products/{id}/adjust: correct the on-hand total after a stock count.
#[tracing::instrument(skip(state, req))]
pub async fn adjust<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(product_id): Path<i64>,
    Json(req): Json<AdjustRequest>,
) -> Result<(StatusCode, Json<MovementResponse>), ApiError>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let mut adjustment =
        Adjustment::new(ProductId::new(product_id), req.quantity).notes(req.notes);
    adjustment.unit_price = req.unit_price_cents.map(Money::from_cents);

    let movement = state.engine().record_adjustment(adjustment).await?;
    Ok((StatusCode::CREATED, Json(movement.into())))
}

// -- Bulk line decoding --

/// Bulk lines after JSON decoding, with the position of each decoded line
/// in the original body.
struct DecodedLines<T> {
    items: Vec<T>,
    positions: Vec<usize>,
    skipped: Vec<SkippedLineResponse>,
}

fn decode_lines<T: DeserializeOwned>(
    raw: Vec<serde_json::Value>,
    policy: LinePolicy,
) -> Result<DecodedLines<T>, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::Allocation(AllocationError::invalid_input(
            "items",
            "items list is required",
        )));
    }

    let mut decoded = DecodedLines {
        items: Vec::with_capacity(raw.len()),
        positions: Vec::with_capacity(raw.len()),
        skipped: Vec::new(),
    };

    for (line, value) in raw.into_iter().enumerate() {
        let product_id = value.get("product_id").and_then(|v| v.as_i64());
        match serde_json::from_value::<T>(value) {
            Ok(item) => {
                decoded.items.push(item);
                decoded.positions.push(line);
            }
            Err(e) => match policy {
                LinePolicy::Skip => {
                    tracing::warn!(line, error = %e, "skipping undecodable bulk line");
                    decoded.skipped.push(SkippedLineResponse {
                        line,
                        product_id,
                        code: "INVALID_INPUT",
                        reason: e.to_string(),
                    });
                }
                LinePolicy::Abort => {
                    return Err(ApiError::Allocation(AllocationError::LineRejected {
                        line,
                        source: Box::new(AllocationError::invalid_input(
                            "items",
                            e.to_string(),
                        )),
                    }));
                }
            },
        }
    }

    Ok(decoded)
}

impl<T> DecodedLines<T> {
    fn is_all_skipped(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, line: usize) -> usize {
        self.positions.get(line).copied().unwrap_or(line)
    }

    /// Rewrites a line rejection to point at the line's position in the body.
    fn remap_error(&self, error: AllocationError) -> ApiError {
        match error {
            AllocationError::LineRejected { line, source } => {
                ApiError::Allocation(AllocationError::LineRejected {
                    line: self.position(line),
                    source,
                })
            }
            other => ApiError::Allocation(other),
        }
    }

    fn into_response(self, outcome: BulkOutcome) -> (StatusCode, Json<BulkMovementResponse>) {
        let mut skipped: Vec<SkippedLineResponse> = outcome
            .skipped
            .into_iter()
            .map(|s: SkippedLine| SkippedLineResponse {
                line: self.position(s.line),
                product_id: Some(s.product_id.as_i64()),
                code: s.code,
                reason: s.reason,
            })
            .collect();
        skipped.extend(self.skipped);
        skipped.sort_by_key(|s| s.line);

        let body = BulkMovementResponse {
            movements: outcome.movements.into_iter().map(Into::into).collect(),
            skipped,
        };
        (StatusCode::CREATED, Json(body))
    }
}
