//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use allocation::{BulkConfig, LinePolicy};
use api::config::Config;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use common::{FixedClock, Money, ProductId};
use ledger_store::{InMemoryCatalog, InMemoryInventoryStore, Product};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn seeded_catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    catalog
        .insert(Product::new(
            ProductId::new(1),
            "AMX500",
            "Amoxicillin 500mg",
            20,
            Money::from_cents(250),
            Money::from_cents(120),
        ))
        .await;
    catalog
        .insert(Product::new(
            ProductId::new(2),
            "IBU200",
            "Ibuprofen 200mg",
            10,
            Money::from_cents(90),
            Money::from_cents(40),
        ))
        .await;
    catalog
}

async fn setup_with(config: Config) -> Router {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
    let state = api::create_state_with_clock(
        InMemoryInventoryStore::new(),
        seeded_catalog().await,
        Arc::new(clock),
        &config,
    );
    api::create_app(state, get_metrics_handle())
}

async fn setup() -> Router {
    setup_with(Config::default()).await
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, None).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(body)).await
}

/// Receives two Amoxicillin lots and returns their batch ids (early, late).
async fn receive_two_lots(app: &Router) -> (i64, i64) {
    let (status, late) = post(
        app,
        "/stock-in",
        json!({
            "product_id": 1,
            "quantity": 100,
            "expiry_date": "2025-09-01",
            "lot_number": "LATE"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, early) = post(
        app,
        "/stock-in",
        json!({
            "product_id": 1,
            "quantity": 50,
            "expiry_date": "2025-07-01",
            "lot_number": "EARLY",
            "unit_cost_cents": 110
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    (
        early["batch_id"].as_i64().unwrap(),
        late["batch_id"].as_i64().unwrap(),
    )
}

async fn on_hand(app: &Router, product_id: i64) -> i64 {
    let (status, body) = get(app, &format!("/products/{product_id}/inventory")).await;
    assert_eq!(status, StatusCode::OK);
    body["quantity"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;

    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

mod movements {
    use super::*;

    #[tokio::test]
    async fn stock_in_records_movement_at_cost_price() {
        let app = setup().await;

        let (status, body) = post(
            &app,
            "/stock-in",
            json!({ "product_id": 1, "quantity": 40, "reference": "GRN-7" }),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["movement_type"], "IN");
        assert_eq!(body["quantity"], 40);
        assert_eq!(body["unit_price_cents"], 120);
        assert_eq!(body["reference"], "GRN-7");
        assert!(body["batch_id"].is_i64());
        assert_eq!(on_hand(&app, 1).await, 40);
    }

    #[tokio::test]
    async fn stock_out_takes_earliest_expiry() {
        let app = setup().await;
        let (early, _) = receive_two_lots(&app).await;

        let (status, body) = post(
            &app,
            "/stock-out",
            json!({ "product_id": 1, "quantity": 30, "reference": "RX-1" }),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["movement_type"], "OUT");
        assert_eq!(body["quantity"], -30);
        assert_eq!(body["batch_id"], early);
        assert_eq!(body["unit_price_cents"], 250);
        assert_eq!(on_hand(&app, 1).await, 120);
    }

    #[tokio::test]
    async fn oversized_stock_out_is_conflict() {
        let app = setup().await;
        receive_two_lots(&app).await;

        let (status, body) = post(
            &app,
            "/stock-out",
            json!({ "product_id": 1, "quantity": 120 }),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "NO_SUITABLE_BATCH");
        assert_eq!(on_hand(&app, 1).await, 150);
    }

    #[tokio::test]
    async fn named_batch_shortfall_is_conflict() {
        let app = setup().await;
        let (early, _) = receive_two_lots(&app).await;

        let (status, body) = post(
            &app,
            "/stock-out",
            json!({ "product_id": 1, "quantity": 51, "batch_id": early }),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "INSUFFICIENT_BATCH_STOCK");
    }

    #[tokio::test]
    async fn foreign_batch_is_unprocessable() {
        let app = setup().await;
        let (early, _) = receive_two_lots(&app).await;

        let (status, body) = post(
            &app,
            "/stock-out",
            json!({ "product_id": 2, "quantity": 1, "batch_id": early }),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "BATCH_PRODUCT_MISMATCH");
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let app = setup().await;

        let (status, body) = post(&app, "/stock-in", json!({ "product_id": 1, "quantity": 0 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");

        let (status, body) = post(&app, "/stock-in", json!({ "product_id": 99, "quantity": 5 })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "PRODUCT_NOT_FOUND");

        let (status, body) = post(
            &app,
            "/stock-out",
            json!({ "product_id": 1, "quantity": 1, "batch_id": 404 }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "BATCH_NOT_FOUND");
    }

    #[tokio::test]
    async fn adjust_changes_aggregate_only() {
        let app = setup().await;
        post(&app, "/stock-in", json!({ "product_id": 2, "quantity": 10 })).await;

        let (status, body) = post(
            &app,
            "/products/2/adjust",
            json!({ "quantity": -3, "notes": "cycle count" }),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["movement_type"], "ADJUST");
        assert_eq!(body["quantity"], -3);
        assert!(body["batch_id"].is_null());
        assert_eq!(body["unit_price_cents"], 90);
        assert_eq!(on_hand(&app, 2).await, 7);

        let (_, batches) = get(&app, "/products/2/batches").await;
        assert_eq!(batches[0]["quantity"], 10);
    }

    #[tokio::test]
    async fn adjust_rejects_zero_and_negative_result() {
        let app = setup().await;

        let (status, _) = post(&app, "/products/1/adjust", json!({ "quantity": 0 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(&app, "/products/1/adjust", json!({ "quantity": -1 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(on_hand(&app, 1).await, 0);
    }
}

mod bulk {
    use super::*;

    #[tokio::test]
    async fn bulk_stock_in_skips_invalid_lines_by_default() {
        let app = setup().await;

        let (status, body) = post(
            &app,
            "/stock-in/bulk",
            json!({
                "reference": "INV-2025-118",
                "items": [
                    { "product_id": 1, "quantity": 24, "expiry_date": "2026-01-31" },
                    { "product_id": 2, "quantity": "twelve" },
                    { "product_id": 77, "quantity": 5 },
                    { "product_id": 2, "quantity": 12 }
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let movements = body["movements"].as_array().unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m["reference"] == "INV-2025-118"));

        let skipped = body["skipped"].as_array().unwrap();
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0]["line"], 1);
        assert_eq!(skipped[0]["code"], "INVALID_INPUT");
        assert_eq!(skipped[1]["line"], 2);
        assert_eq!(skipped[1]["code"], "PRODUCT_NOT_FOUND");

        assert_eq!(on_hand(&app, 1).await, 24);
        assert_eq!(on_hand(&app, 2).await, 12);
    }

    #[tokio::test]
    async fn bulk_stock_out_failure_rolls_back_every_line() {
        let app = setup().await;
        receive_two_lots(&app).await;
        post(&app, "/stock-in", json!({ "product_id": 2, "quantity": 5 })).await;

        let (status, body) = post(
            &app,
            "/stock-out/bulk",
            json!({
                "reference": "RX-900",
                "items": [
                    { "product_id": 1, "quantity": 10 },
                    { "product_id": 2, "quantity": 6 }
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "NO_SUITABLE_BATCH");
        assert_eq!(body["line"], 1);
        assert_eq!(on_hand(&app, 1).await, 150);
        assert_eq!(on_hand(&app, 2).await, 5);

        let (_, history) = get(&app, "/movements?type=OUT").await;
        assert!(history.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn abort_policy_rejects_undecodable_line() {
        let app = setup_with(Config {
            bulk: BulkConfig {
                stock_in_invalid_lines: LinePolicy::Abort,
                stock_out_invalid_lines: LinePolicy::Abort,
            },
            ..Config::default()
        })
        .await;

        let (status, body) = post(
            &app,
            "/stock-in/bulk",
            json!({
                "items": [
                    { "product_id": 1, "quantity": 5 },
                    { "product_id": 1 }
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["line"], 1);
        assert_eq!(on_hand(&app, 1).await, 0);
    }

    #[tokio::test]
    async fn empty_items_is_bad_request() {
        let app = setup().await;

        let (status, body) = post(&app, "/stock-out/bulk", json!({ "items": [] })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }
}

mod queries {
    use super::*;

    #[tokio::test]
    async fn product_inventory_and_batches() {
        let app = setup().await;
        let (early, late) = receive_two_lots(&app).await;

        let (status, inventory) = get(&app, "/products/1/inventory").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(inventory["sku"], "AMX500");
        assert_eq!(inventory["quantity"], 150);
        assert_eq!(inventory["is_low_stock"], false);
        assert_eq!(inventory["total_value_cents"], 150 * 250);

        let (status, batches) = get(&app, "/products/1/batches").await;
        assert_eq!(status, StatusCode::OK);
        let batches = batches.as_array().unwrap();
        assert_eq!(batches[0]["id"], early);
        assert_eq!(batches[0]["days_to_expiry"], 30);
        assert_eq!(batches[0]["value_cents"], 50 * 110);
        assert_eq!(batches[1]["id"], late);
        assert_eq!(batches[1]["is_expired"], false);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let app = setup().await;

        let (status, _) = get(&app, "/products/42/inventory").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = get(&app, "/products/42/batches").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "PRODUCT_NOT_FOUND");
    }

    #[tokio::test]
    async fn movement_history_filters() {
        let app = setup().await;
        receive_two_lots(&app).await;
        post(&app, "/stock-out", json!({ "product_id": 1, "quantity": 5 })).await;
        post(&app, "/stock-in", json!({ "product_id": 2, "quantity": 8 })).await;

        let (status, all) = get(&app, "/movements").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 4);

        let (_, amoxicillin_in) = get(&app, "/movements?product_id=1&type=in").await;
        assert_eq!(amoxicillin_in.as_array().unwrap().len(), 2);

        let (_, paged) = get(&app, "/movements?limit=1&offset=1").await;
        assert_eq!(paged.as_array().unwrap().len(), 1);

        let (status, body) = get(&app, "/movements?type=TRANSFER").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }
}

mod reports {
    use super::*;

    #[tokio::test]
    async fn inventory_reports() {
        let app = setup().await;
        receive_two_lots(&app).await;
        post(&app, "/stock-in", json!({ "product_id": 2, "quantity": 4 })).await;
        post(&app, "/stock-out", json!({ "product_id": 2, "quantity": 4 })).await;

        let (status, summary) = get(&app, "/reports/inventory-summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["total_items"], 2);
        assert_eq!(summary["low_stock_items"], 1);
        assert_eq!(summary["out_of_stock_items"], 1);
        assert_eq!(summary["total_value_cents"], 150 * 250);

        let (_, low) = get(&app, "/reports/low-stock").await;
        assert_eq!(low[0]["sku"], "IBU200");

        let (_, out) = get(&app, "/reports/out-of-stock").await;
        assert_eq!(out.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expiry_report_window() {
        let app = setup().await;
        receive_two_lots(&app).await;

        let (status, report) = get(&app, "/reports/expiry?within_days=45").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["as_of"], "2025-06-01");
        assert_eq!(report["expiring_soon"].as_array().unwrap().len(), 1);
        assert_eq!(report["expiring_soon"][0]["lot_number"], "EARLY");
        assert!(report["urgent"].as_array().unwrap().is_empty());

        let (status, body) = get(&app, "/reports/expiry?within_days=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn movement_summary_and_totals() {
        let app = setup().await;
        receive_two_lots(&app).await;
        post(&app, "/stock-out", json!({ "product_id": 1, "quantity": 20 })).await;

        let (status, summary) = get(&app, "/reports/movement-summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["today"]["stock_in"], 150);
        assert_eq!(summary["today"]["stock_out"], 20);
        assert_eq!(summary["last_30_days"]["movement_count"], 3);

        let (status, totals) = get(
            &app,
            "/reports/movement-totals?from=2025-06-01T00:00:00Z&to=2025-06-02T00:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(totals["stock_in"], 150);

        let (_, recent) = get(&app, "/reports/recent-movements?limit=2").await;
        assert_eq!(recent.as_array().unwrap().len(), 2);
    }
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_ledger_counters() {
    let app = setup().await;
    post(&app, "/stock-in", json!({ "product_id": 1, "quantity": 3 })).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("ledger_movements_total"));
}
