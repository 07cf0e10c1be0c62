//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use engine::EngineError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Reconciliation engine error.
    Engine(EngineError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Engine(err) => engine_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::ServiceNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::InvalidQuantity { .. }
        | DomainError::InvalidAmount { .. }
        | DomainError::NoContentItems { .. }
        | DomainError::EmptyDistribution { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        DomainError::Store(StoreError::TransactionNotFound(_)) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn engine_error_to_response(err: EngineError) -> (StatusCode, String) {
    match &err {
        EngineError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        EngineError::PaymentNotFound(_)
        | EngineError::TransactionNotFound(_)
        | EngineError::NoTransactionForPayment(_) => (StatusCode::NOT_FOUND, err.to_string()),
        EngineError::LockContention { .. } => (StatusCode::CONFLICT, err.to_string()),
        EngineError::Provider(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
        EngineError::Domain(domain_err) => match domain_err {
            DomainError::ServiceNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
            DomainError::InvalidQuantity { .. }
            | DomainError::InvalidAmount { .. }
            | DomainError::NoContentItems { .. }
            | DomainError::EmptyDistribution { .. } => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        },
        EngineError::Store(StoreError::TransactionNotFound(_)) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TransactionNotFound(id) => {
                ApiError::NotFound(format!("Transaction not found: {id}"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}
