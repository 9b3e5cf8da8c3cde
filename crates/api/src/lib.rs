//! HTTP API for the inventory ledger service.
//!
//! Exposes stock seeding, adjustments, transfers, reconciliation and reads,
//! with structured logging (tracing) and Prometheus metrics.

pub mod actor;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use inventory::MutationCoordinator;
use ledger_store::StockStore;
use metrics_exporter_prometheus::PrometheusHandle;
use queries::{ItemCatalog, QueryFacade};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::inventory::AppState;

/// Creates the Axum application router with all routes and shared state.
///
/// The first segment after `/inventory/` is a warehouse id under `/item/`
/// and an item id under `/history`; the router needs one name for both.
pub fn create_app<S, C>(state: Arc<AppState<S, C>>, metrics_handle: PrometheusHandle) -> Router
where
    S: StockStore + 'static,
    C: ItemCatalog + 'static,
{
    use routes::inventory;

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/inventory", get(inventory::list::<S, C>))
        .route("/inventory/transfer", post(inventory::transfer::<S, C>))
        .route("/inventory/history", get(inventory::history::<S, C>))
        .route("/inventory/{id}/history", get(inventory::item_history::<S, C>))
        .route(
            "/inventory/{id}/item/{item_id}",
            post(inventory::seed::<S, C>).put(inventory::adjust::<S, C>),
        )
        .route(
            "/inventory/{id}/item/{item_id}/reconcile",
            post(inventory::reconcile::<S, C>),
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

/// Wires the coordinator and the query facade over one store.
pub fn create_default_state<S, C>(store: S, catalog: C, config: Config) -> Arc<AppState<S, C>>
where
    S: StockStore + Clone,
    C: ItemCatalog,
{
    let coordinator =
        MutationCoordinator::new(store.clone()).with_max_attempts(config.max_cas_attempts);
    let queries = QueryFacade::new(store, catalog);

    Arc::new(AppState {
        coordinator,
        queries,
        config,
    })
}
