//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::config::Config;
use api::routes::inventory::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use ledger_store::{InMemoryStockStore, LedgerWriter, QuantityStore, StockKey, WarehouseId};
use metrics_exporter_prometheus::PrometheusHandle;
use queries::{InMemoryItemCatalog, ItemInfo};
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

type State = Arc<AppState<InMemoryStockStore, InMemoryItemCatalog>>;

async fn setup_with_state() -> (axum::Router, State) {
    let catalog = InMemoryItemCatalog::new();
    catalog.insert(ItemInfo::new(7, "Widget", 1_999)).await;

    let state = api::create_default_state(InMemoryStockStore::new(), catalog, Config::default());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

const WAREHOUSE: (&str, &str) = ("1", "warehouse");
const OWNER: (&str, &str) = ("2", "owner");
const SALESMAN: (&str, &str) = ("3", "salesman");

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    actor: Option<(&str, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = actor {
        builder = builder.header("X-Actor-Id", id).header("X-Actor-Role", role);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
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

async fn seed(app: &axum::Router, warehouse: i64, item: i64, quantity: i64) {
    let (status, _) = send(
        app,
        "POST",
        &format!("/inventory/{warehouse}/item/{item}"),
        Some(WAREHOUSE),
        Some(json!({ "quantity": quantity })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup_with_state().await;

    let (status, json) = send(&app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_seed_and_list_with_catalog() {
    let (app, _) = setup_with_state().await;

    let (status, json) = send(
        &app,
        "POST",
        "/inventory/1/item/7",
        Some(WAREHOUSE),
        Some(json!({ "quantity": 25 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["quantity"], 25);
    assert_eq!(json["data"]["quantityChange"], 25);

    let (status, json) = send(&app, "GET", "/inventory", Some(OWNER), None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = json["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["warehouseId"], 1);
    assert_eq!(rows[0]["itemId"], 7);
    assert_eq!(rows[0]["name"], "Widget");
    assert_eq!(rows[0]["priceCents"], 1_999);
}

#[tokio::test]
async fn test_adjustments() {
    let (app, _) = setup_with_state().await;
    seed(&app, 1, 7, 5).await;

    let (status, json) = send(
        &app,
        "PUT",
        "/inventory/1/item/7",
        Some(WAREHOUSE),
        Some(json!({ "quantity": 3, "type": "add" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["quantity"], 8);

    let (status, json) = send(
        &app,
        "PUT",
        "/inventory/1/item/7",
        Some(WAREHOUSE),
        Some(json!({ "quantity": 0, "type": "set", "reason": "damaged" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["quantity"], 0);
    assert_eq!(json["data"]["quantityChange"], -8);
}

#[tokio::test]
async fn test_adjustment_validation_errors() {
    let (app, _) = setup_with_state().await;
    seed(&app, 1, 7, 5).await;

    // Subtract needs a reason.
    let (status, json) = send(
        &app,
        "PUT",
        "/inventory/1/item/7",
        Some(WAREHOUSE),
        Some(json!({ "quantity": 1, "type": "subtract" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("reason"));

    // Would go negative.
    let (status, _) = send(
        &app,
        "PUT",
        "/inventory/1/item/7",
        Some(WAREHOUSE),
        Some(json!({ "quantity": 6, "type": "subtract", "reason": "sold" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown mode.
    let (status, json) = send(
        &app,
        "PUT",
        "/inventory/1/item/7",
        Some(WAREHOUSE),
        Some(json!({ "quantity": 2, "type": "multiply" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    // Non-numeric path.
    let (status, _) = send(
        &app,
        "PUT",
        "/inventory/abc/item/7",
        Some(WAREHOUSE),
        Some(json!({ "quantity": 2, "type": "add" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transfer() {
    let (app, _) = setup_with_state().await;
    seed(&app, 1, 7, 10).await;
    seed(&app, 2, 7, 2).await;

    let (status, json) = send(
        &app,
        "POST",
        "/inventory/transfer",
        Some(OWNER),
        Some(json!({ "fromWarehouseId": 1, "toWarehouseId": 2, "itemId": 7, "quantity": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["source"]["quantity"], 6);
    assert_eq!(json["data"]["destination"]["quantity"], 6);
    let correlation_id = json["data"]["correlationId"].as_str().unwrap().to_string();

    let (_, history) = send(&app, "GET", "/inventory/7/history?limit=2", Some(OWNER), None).await;
    let entries = history["data"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e["correlationId"] == correlation_id));
}

#[tokio::test]
async fn test_transfer_errors() {
    let (app, _) = setup_with_state().await;
    seed(&app, 1, 7, 3).await;

    let (status, json) = send(
        &app,
        "POST",
        "/inventory/transfer",
        Some(WAREHOUSE),
        Some(json!({ "fromWarehouseId": 1, "toWarehouseId": 2, "itemId": 7, "quantity": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["success"], false);

    let (status, _) = send(
        &app,
        "POST",
        "/inventory/transfer",
        Some(WAREHOUSE),
        Some(json!({ "fromWarehouseId": 1, "toWarehouseId": 1, "itemId": 7, "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_transfer_restores_source() {
    let (app, state) = setup_with_state().await;
    seed(&app, 1, 7, 10).await;
    state
        .coordinator
        .store()
        .fail_writes_for(WarehouseId::new(2))
        .await;

    let (status, json) = send(
        &app,
        "POST",
        "/inventory/transfer",
        Some(WAREHOUSE),
        Some(json!({ "fromWarehouseId": 1, "toWarehouseId": 2, "itemId": 7, "quantity": 4 })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
    assert_eq!(
        state.coordinator.store().get(StockKey::new(1, 7)).await.unwrap(),
        10
    );
}

#[tokio::test]
async fn test_low_stock() {
    let (app, _) = setup_with_state().await;
    seed(&app, 1, 1, 11).await;
    seed(&app, 1, 2, 10).await;
    seed(&app, 2, 3, 4).await;

    let (status, json) = send(&app, "GET", "/inventory?lowStock=true", Some(OWNER), None).await;
    assert_eq!(status, StatusCode::OK);
    let quantities: Vec<_> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["quantity"].as_i64().unwrap())
        .collect();
    assert_eq!(quantities, vec![4, 10]);

    let (_, json) = send(
        &app,
        "GET",
        "/inventory?lowStock=5&warehouseId=1",
        Some(OWNER),
        None,
    )
    .await;
    assert!(json["data"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, "GET", "/inventory?lowStock=lots", Some(OWNER), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_paging() {
    let (app, _) = setup_with_state().await;
    seed(&app, 1, 7, 1).await;
    for _ in 0..4 {
        send(
            &app,
            "PUT",
            "/inventory/1/item/7",
            Some(WAREHOUSE),
            Some(json!({ "quantity": 1, "type": "add" })),
        )
        .await;
    }
    seed(&app, 2, 8, 9).await;

    let (status, json) = send(
        &app,
        "GET",
        "/inventory/7/history?limit=2&offset=1",
        Some(WAREHOUSE),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results: Vec<_> = json["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["resultingQuantity"].as_i64().unwrap())
        .collect();
    assert_eq!(results, vec![4, 3]);
    assert_eq!(json["data"]["limit"], 2);
    assert_eq!(json["data"]["offset"], 1);

    let (_, json) = send(&app, "GET", "/inventory/history", Some(OWNER), None).await;
    let entries = json["data"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 6);
    assert_eq!(entries[0]["itemId"], 8);

    let (status, _) = send(&app, "GET", "/inventory/history?limit=0", Some(OWNER), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_authorization() {
    let (app, _) = setup_with_state().await;
    seed(&app, 1, 7, 5).await;

    let (status, json) = send(&app, "GET", "/inventory", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);

    let (status, _) = send(&app, "GET", "/inventory", Some(("9", "janitor")), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/inventory", Some(SALESMAN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "PUT",
        "/inventory/1/item/7",
        Some(OWNER),
        Some(json!({ "quantity": 1, "type": "add" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "POST",
        "/inventory/1/item/7/reconcile",
        Some(WAREHOUSE),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_partial_mutation_then_reconcile() {
    let (app, state) = setup_with_state().await;
    seed(&app, 1, 7, 10).await;
    let store = state.coordinator.store();

    store.set_fail_on_append(true);
    let (status, json) = send(
        &app,
        "PUT",
        "/inventory/1/item/7",
        Some(WAREHOUSE),
        Some(json!({ "quantity": 5, "type": "add" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("Partial mutation"));
    store.clear_faults().await;

    let (status, json) = send(
        &app,
        "POST",
        "/inventory/1/item/7/reconcile",
        Some(OWNER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["drift"], 5);
    assert_eq!(json["data"]["stored"], 15);

    let key = StockKey::new(1, 7);
    assert_eq!(
        store.replay_sum(key).await.unwrap(),
        store.get(key).await.unwrap()
    );
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup_with_state().await;
    seed(&app, 1, 7, 5).await;

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
    assert!(text.contains("inventory_mutations_total"));
}
