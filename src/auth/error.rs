// Authentication error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidToken,
    ExpiredToken,
    MissingToken,
    TokenGenerationError(String),
    ConfigError(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::ExpiredToken => write!(f, "Token has expired"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::TokenGenerationError(msg) => write!(f, "Token generation error: {}", msg),
            AuthError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::InvalidToken => {
                warn!("Invalid token attempt");
                StatusCode::UNAUTHORIZED
            }
            AuthError::ExpiredToken => {
                warn!("Expired token attempt");
                StatusCode::UNAUTHORIZED
            }
            AuthError::MissingToken => StatusCode::UNAUTHORIZED,
            AuthError::TokenGenerationError(msg) | AuthError::ConfigError(msg) => {
                error!("Auth failure: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let (error_code, message) = match status {
            StatusCode::INTERNAL_SERVER_ERROR => (
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
            ),
            _ => ("UNAUTHORIZED", self.to_string()),
        };

        let body = Json(json!({
            "status": "error",
            "error_code": error_code,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}
