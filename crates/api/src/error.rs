//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::InventoryError;
use queries::QueryError;

/// API-level error type that maps to HTTP responses.
///
/// Every error renders as `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path, query or body.
    BadRequest(String),
    /// No usable actor on the request.
    Unauthorized(String),
    /// The actor's role does not allow the operation.
    Forbidden(String),
    /// Mutation coordinator error.
    Inventory(InventoryError),
    /// Read side error.
    Query(QueryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Inventory(err) => inventory_error_to_response(err),
            ApiError::Query(err) => {
                tracing::error!(error = %err, "query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        let body = serde_json::json!({ "success": false, "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, String) {
    let status = match &err {
        InventoryError::InvalidQuantity { .. }
        | InventoryError::InvalidAmount { .. }
        | InventoryError::ReasonRequired { .. }
        | InventoryError::SameWarehouse(_) => StatusCode::BAD_REQUEST,
        InventoryError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        InventoryError::ConcurrentModification { .. } => StatusCode::CONFLICT,
        InventoryError::PartialMutation { .. }
        | InventoryError::TransferFailed { .. }
        | InventoryError::Storage(_) => {
            tracing::error!(error = %err, "inventory operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::Query(err)
    }
}
