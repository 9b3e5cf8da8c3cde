//! Stock adjustment, transfer, listing and history endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{ActorId, CorrelationId, ItemId, StockKey, WarehouseId};
use inventory::{
    MutationCoordinator, MutationMode, MutationOutcome, MutationRequest, ReconcileOutcome,
    TransferRequest,
};
use ledger_store::{LedgerEntry, StockRecord, StockStore};
use queries::{HistoryRequest, ItemCatalog, QueryFacade, StockView};
use serde::{Deserialize, Serialize};

use crate::actor::{Actor, Permission};
use crate::config::Config;
use crate::error::ApiError;

/// Largest history page a client may ask for.
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Shared application state accessible from all handlers.
pub struct AppState<S: StockStore, C: ItemCatalog> {
    pub coordinator: MutationCoordinator<S>,
    pub queries: QueryFacade<S, C>,
    pub config: Config,
}

// -- Request types --

#[derive(Deserialize)]
pub struct SeedBody {
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct AdjustBody {
    pub quantity: i64,
    #[serde(rename = "type")]
    pub mode: MutationMode,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    pub from_warehouse_id: i64,
    pub to_warehouse_id: i64,
    pub item_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub warehouse_id: Option<String>,
    pub low_stock: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub warehouse_id: Option<String>,
}

// -- Response types --

/// Envelope around every successful inventory response.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevelResponse {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<StockRecord> for StockLevelResponse {
    fn from(record: StockRecord) -> Self {
        Self {
            warehouse_id: record.warehouse_id,
            item_id: record.item_id,
            quantity: record.quantity,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    #[serde(flatten)]
    pub stock: StockLevelResponse,
    pub quantity_change: i64,
    pub entry_id: Option<i64>,
}

impl From<MutationOutcome> for MutationResponse {
    fn from(outcome: MutationOutcome) -> Self {
        Self {
            stock: outcome.record.into(),
            quantity_change: outcome.quantity_change,
            entry_id: outcome.entry_id.map(|id| id.as_i64()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub correlation_id: CorrelationId,
    pub source: StockLevelResponse,
    pub destination: StockLevelResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockViewResponse {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
    pub name: Option<String>,
    pub price_cents: Option<i64>,
}

impl From<StockView> for StockViewResponse {
    fn from(view: StockView) -> Self {
        Self {
            warehouse_id: view.warehouse_id,
            item_id: view.item_id,
            quantity: view.quantity,
            updated_at: view.updated_at,
            name: view.name,
            price_cents: view.price_cents,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryResponse {
    pub id: i64,
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub quantity_change: i64,
    pub resulting_quantity: i64,
    pub reason: String,
    pub actor_id: ActorId,
    pub correlation_id: Option<CorrelationId>,
    pub timestamp: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id.as_i64(),
            warehouse_id: entry.warehouse_id,
            item_id: entry.item_id,
            quantity_change: entry.quantity_change,
            resulting_quantity: entry.resulting_quantity,
            reason: entry.reason,
            actor_id: entry.actor_id,
            correlation_id: entry.correlation_id,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<LedgerEntryResponse>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub stored: i64,
    pub replayed: i64,
    pub drift: i64,
    pub entry_id: Option<i64>,
}

impl From<ReconcileOutcome> for ReconcileResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            warehouse_id: outcome.key.warehouse_id,
            item_id: outcome.key.item_id,
            stored: outcome.stored,
            replayed: outcome.replayed,
            drift: outcome.drift,
            entry_id: outcome.entry_id.map(|id| id.as_i64()),
        }
    }
}

// -- Handlers --

/// POST /inventory/{warehouse_id}/item/{item_id}: create or overwrite a
/// record with an initial quantity.
#[tracing::instrument(skip(state, body))]
pub async fn seed<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path((warehouse_id, item_id)): Path<(String, String)>,
    actor: Actor,
    body: Result<Json<SeedBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<MutationResponse>>), ApiError>
where
    S: StockStore + 'static,
    C: ItemCatalog + 'static,
{
    actor.require(Permission::Seed)?;
    let key = parse_key(&warehouse_id, &item_id)?;
    let Json(body) = body?;

    let outcome = state.coordinator.seed(key, body.quantity, actor.id).await?;

    Ok((StatusCode::CREATED, ok(outcome.into())))
}

/// PUT /inventory/{warehouse_id}/item/{item_id}: set, add or subtract.
#[tracing::instrument(skip(state, body))]
pub async fn adjust<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path((warehouse_id, item_id)): Path<(String, String)>,
    actor: Actor,
    body: Result<Json<AdjustBody>, JsonRejection>,
) -> Result<Json<ApiResponse<MutationResponse>>, ApiError>
where
    S: StockStore + 'static,
    C: ItemCatalog + 'static,
{
    actor.require(Permission::Mutate)?;
    let key = parse_key(&warehouse_id, &item_id)?;
    let Json(body) = body?;

    let mut request = MutationRequest::new(key, body.mode, body.quantity, actor.id);
    if let Some(reason) = body.reason {
        request = request.with_reason(reason);
    }
    let outcome = state.coordinator.apply_mutation(request).await?;

    Ok(ok(outcome.into()))
}

/// POST /inventory/transfer: move stock between warehouses.
#[tracing::instrument(skip(state, body))]
pub async fn transfer<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    actor: Actor,
    body: Result<Json<TransferBody>, JsonRejection>,
) -> Result<Json<ApiResponse<TransferResponse>>, ApiError>
where
    S: StockStore + 'static,
    C: ItemCatalog + 'static,
{
    actor.require(Permission::Transfer)?;
    let Json(body) = body?;

    let outcome = state
        .coordinator
        .transfer(TransferRequest {
            from: WarehouseId::new(body.from_warehouse_id),
            to: WarehouseId::new(body.to_warehouse_id),
            item_id: ItemId::new(body.item_id),
            amount: body.quantity,
            actor_id: actor.id,
        })
        .await?;

    Ok(ok(TransferResponse {
        correlation_id: outcome.correlation_id,
        source: outcome.source.into(),
        destination: outcome.destination.into(),
    }))
}

/// GET /inventory?warehouseId&lowStock: current stock, or the low stock
/// report when `lowStock` is given.
#[tracing::instrument(skip(state))]
pub async fn list<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    actor: Actor,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<StockViewResponse>>>, ApiError>
where
    S: StockStore + 'static,
    C: ItemCatalog + 'static,
{
    actor.require(Permission::Read)?;
    let warehouse_id = parse_param::<i64>("warehouseId", params.warehouse_id.as_deref())?
        .map(WarehouseId::new);
    let threshold = low_stock_threshold(params.low_stock.as_deref(), &state.config)?;

    let views = match threshold {
        Some(threshold) => state.queries.list_low_stock(threshold, warehouse_id).await?,
        None => state.queries.list_current_stock(warehouse_id).await?,
    };

    Ok(ok(views.into_iter().map(Into::into).collect()))
}

/// GET /inventory/{item_id}/history: ledger history of one item.
#[tracing::instrument(skip(state))]
pub async fn item_history<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(item_id): Path<String>,
    actor: Actor,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ApiResponse<HistoryResponse>>, ApiError>
where
    S: StockStore + 'static,
    C: ItemCatalog + 'static,
{
    actor.require(Permission::Read)?;
    let item_id = ItemId::new(parse_id("item_id", &item_id)?);
    let request = history_request(&params, &state.config)?.item_id(item_id);

    history_page(&state, request).await
}

/// GET /inventory/history: global ledger history.
#[tracing::instrument(skip(state))]
pub async fn history<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    actor: Actor,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ApiResponse<HistoryResponse>>, ApiError>
where
    S: StockStore + 'static,
    C: ItemCatalog + 'static,
{
    actor.require(Permission::Read)?;
    let request = history_request(&params, &state.config)?;

    history_page(&state, request).await
}

/// POST /inventory/{warehouse_id}/item/{item_id}/reconcile: repair ledger
/// drift for one record.
#[tracing::instrument(skip(state))]
pub async fn reconcile<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path((warehouse_id, item_id)): Path<(String, String)>,
    actor: Actor,
) -> Result<Json<ApiResponse<ReconcileResponse>>, ApiError>
where
    S: StockStore + 'static,
    C: ItemCatalog + 'static,
{
    actor.require(Permission::Reconcile)?;
    let key = parse_key(&warehouse_id, &item_id)?;

    let outcome = state.coordinator.reconcile(key, actor.id).await?;

    Ok(ok(outcome.into()))
}

// -- Helpers --

async fn history_page<S, C>(
    state: &AppState<S, C>,
    request: HistoryRequest,
) -> Result<Json<ApiResponse<HistoryResponse>>, ApiError>
where
    S: StockStore,
    C: ItemCatalog,
{
    let page = state.queries.get_history(request).await?;

    Ok(ok(HistoryResponse {
        entries: page.entries.into_iter().map(Into::into).collect(),
        limit: page.limit,
        offset: page.offset,
    }))
}

fn history_request(params: &HistoryParams, config: &Config) -> Result<HistoryRequest, ApiError> {
    let limit = parse_param::<usize>("limit", params.limit.as_deref())?
        .unwrap_or(config.default_history_limit);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }
    let offset = parse_param::<usize>("offset", params.offset.as_deref())?.unwrap_or(0);

    let mut request = HistoryRequest::new(limit).offset(offset);
    if let Some(warehouse_id) = parse_param::<i64>("warehouseId", params.warehouse_id.as_deref())?
    {
        request = request.warehouse_id(WarehouseId::new(warehouse_id));
    }
    Ok(request)
}

/// `true` uses the configured threshold, a number is the threshold itself,
/// `false` or absent means no filter.
fn low_stock_threshold(value: Option<&str>, config: &Config) -> Result<Option<i64>, ApiError> {
    match value.map(str::trim) {
        None | Some("") | Some("false") => Ok(None),
        Some("true") => Ok(Some(config.low_stock_threshold)),
        Some(other) => other
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid lowStock: {other}"))),
    }
}

fn parse_key(warehouse_id: &str, item_id: &str) -> Result<StockKey, ApiError> {
    Ok(StockKey::new(
        parse_id("warehouse_id", warehouse_id)?,
        parse_id("item_id", item_id)?,
    ))
}

fn parse_id(name: &str, value: &str) -> Result<i64, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {name}: {value}")))
}

fn parse_param<T: FromStr>(name: &str, value: Option<&str>) -> Result<Option<T>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid {name}: {raw}"))),
    }
}
