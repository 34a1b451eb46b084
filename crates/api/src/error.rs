//! API error types with HTTP response mapping.

use allocation::AllocationError;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use ledger_store::StoreError;
use reports::ReportError;

/// API-level error type that maps to HTTP responses.
///
/// Every response body has the shape `{"error": <message>, "code": <CODE>}`;
/// bulk line failures add `"line"`.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Movement rejected by the allocation engine.
    Allocation(AllocationError),
    /// Report could not be built.
    Report(ReportError),
    /// Store failure outside a movement.
    Store(StoreError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, line) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg, None),
            ApiError::Allocation(err) => {
                let line = match &err {
                    AllocationError::LineRejected { line, .. } => Some(*line),
                    _ => None,
                };
                (
                    allocation_status(&err),
                    err.code(),
                    err.to_string(),
                    line,
                )
            }
            ApiError::Report(ReportError::InvalidParameter(msg)) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg, None)
            }
            ApiError::Report(ReportError::Store(err)) | ApiError::Store(err) => {
                (store_status(&err), store_code(&err), err.to_string(), None)
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg, None)
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %message, code, "request failed");
        } else {
            tracing::debug!(error = %message, code, "request rejected");
        }

        let mut body = serde_json::json!({ "error": message, "code": code });
        if let Some(line) = line {
            body["line"] = line.into();
        }

        if status == StatusCode::SERVICE_UNAVAILABLE {
            (status, [(header::RETRY_AFTER, "1")], axum::Json(body)).into_response()
        } else {
            (status, axum::Json(body)).into_response()
        }
    }
}

fn allocation_status(err: &AllocationError) -> StatusCode {
    match err.root() {
        AllocationError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        AllocationError::ProductNotFound(_) | AllocationError::BatchNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        AllocationError::InsufficientBatchStock { .. } | AllocationError::NoSuitableBatch { .. } => {
            StatusCode::CONFLICT
        }
        AllocationError::BatchProductMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AllocationError::Store(store_err) => store_status(store_err),
        AllocationError::LineRejected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    if err.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn store_code(err: &StoreError) -> &'static str {
    match err {
        StoreError::LockTimeout { .. } => "LOCK_TIMEOUT",
        StoreError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
        _ => "STORE_ERROR",
    }
}

impl From<AllocationError> for ApiError {
    fn from(err: AllocationError) -> Self {
        ApiError::Allocation(err)
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Report(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
