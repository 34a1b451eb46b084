//! HTTP API for the pharmacy stock ledger.
//!
//! Exposes stock-in, stock-out, bulk and adjustment endpoints over the
//! allocation engine, per-product inventory queries and read-only reports,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use allocation::{AllocationEngine, BulkCoordinator};
use axum::Router;
use axum::routing::{get, post};
use common::{Clock, SystemClock};
use ledger_store::{Catalog, InventoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use reports::ReportService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Clock shared by the engine and the report service.
pub type SharedClock = Arc<dyn Clock>;

/// Shared application state accessible from all handlers.
pub struct AppState<S, C> {
    pub coordinator: BulkCoordinator<S, C, SharedClock>,
    pub reports: ReportService<S, C, SharedClock>,
}

impl<S, C> AppState<S, C>
where
    S: InventoryStore,
    C: Catalog,
{
    pub fn engine(&self) -> &AllocationEngine<S, C, SharedClock> {
        self.coordinator.engine()
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, C>(state: Arc<AppState<S, C>>, metrics_handle: PrometheusHandle) -> Router
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    use routes::{inventory, reports, stock, system};

    let metrics_router = Router::new()
        .route("/metrics", get(system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(system::health))
        .route("/stock-in", post(stock::stock_in::<S, C>))
        .route("/stock-out", post(stock::stock_out::<S, C>))
        .route("/stock-in/bulk", post(stock::bulk_stock_in::<S, C>))
        .route("/stock-out/bulk", post(stock::bulk_stock_out::<S, C>))
        .route("/products/{id}/adjust", post(stock::adjust::<S, C>))
        .route(
            "/products/{id}/inventory",
            get(inventory::product_inventory::<S, C>),
        )
        .route(
            "/products/{id}/batches",
            get(inventory::product_batches::<S, C>),
        )
        .route("/movements", get(inventory::movements::<S, C>))
        .route(
            "/reports/inventory-summary",
            get(reports::inventory_summary::<S, C>),
        )
        .route("/reports/low-stock", get(reports::low_stock::<S, C>))
        .route("/reports/out-of-stock", get(reports::out_of_stock::<S, C>))
        .route("/reports/expiry", get(reports::expiry::<S, C>))
        .route(
            "/reports/movement-summary",
            get(reports::movement_summary::<S, C>),
        )
        .route(
            "/reports/movement-totals",
            get(reports::movement_totals::<S, C>),
        )
        .route(
            "/reports/recent-movements",
            get(reports::recent_movements::<S, C>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state on the wall clock.
pub fn create_state<S, C>(store: S, catalog: C, config: &Config) -> Arc<AppState<S, C>>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    create_state_with_clock(store, catalog, Arc::new(SystemClock), config)
}

/// Creates application state with an explicit clock.
pub fn create_state_with_clock<S, C>(
    store: S,
    catalog: C,
    clock: SharedClock,
    config: &Config,
) -> Arc<AppState<S, C>>
where
    S: InventoryStore + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let engine = AllocationEngine::new(store.clone(), catalog.clone(), clock.clone());
    let coordinator = BulkCoordinator::new(engine, config.bulk);
    let reports = ReportService::new(store, catalog, clock, config.expiry_warning_days);

    Arc::new(AppState {
        coordinator,
        reports,
    })
}
