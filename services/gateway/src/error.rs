use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use dispatch_engine::store::StoreError;
use types::errors::DispatchError;

/// Central error type for the gateway application
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Dispatch(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Dispatch(err) => {
                let (status, code) = match &err {
                    DispatchError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
                    DispatchError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    DispatchError::IneligibleAssignment { .. } => {
                        (StatusCode::CONFLICT, "INELIGIBLE_ASSIGNMENT")
                    }
                    DispatchError::NoEligibleTechnician { .. } => {
                        (StatusCode::CONFLICT, "NO_ELIGIBLE_TECHNICIAN")
                    }
                    DispatchError::InvalidTransition { .. } => {
                        (StatusCode::CONFLICT, "INVALID_TRANSITION")
                    }
                    DispatchError::ConcurrentModification { .. } => {
                        (StatusCode::CONFLICT, "CONCURRENT_MODIFICATION")
                    }
                    DispatchError::Store(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
                    }
                };
                (status, code, err.to_string())
            }
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": code,
            "message": message
        }));

        (status, body).into_response()
    }
}
