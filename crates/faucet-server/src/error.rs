//! Error handling for the faucet server.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Faucet server error types
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Invalid address")]
    InvalidAddress(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("This address already received funds less than {window_hours}h ago")]
    CooldownActive { window_hours: u64 },

    #[error("Origin not allowed")]
    OriginNotAllowed(String),

    /// Error reported by the signing or RPC layer while submitting a transfer
    #[error("{0}")]
    DispatchFailure(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl FaucetError {
    /// HTTP status the error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            FaucetError::InvalidAddress(_) | FaucetError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            FaucetError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
            FaucetError::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            FaucetError::DispatchFailure(_) | FaucetError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));

        (status, body).into_response()
    }
}

/// Result type alias for faucet operations
pub type FaucetResult<T> = Result<T, FaucetError>;
