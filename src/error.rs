// Error handling module for the Booking API
// Provides centralized error types and HTTP response conversion

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use crate::pricing::PricingError;
use crate::store::StoreError;

/// Main error type for the API
/// All services and handlers return Result<T, ApiError>
///
/// Each variant maps to one HTTP status code. Infrastructure failures are
/// flagged transient so the background queue can retry them.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Field-level request validation errors
    /// Maps to HTTP 422 Unprocessable Entity
    #[error("Request validation failed")]
    ValidationError(#[from] validator::ValidationErrors),

    /// Malformed or out-of-range input outside of derive-based validation
    /// Maps to HTTP 422 Unprocessable Entity
    #[error("{0}")]
    InvalidInput(String),

    /// Resource absent or not owned by the caller
    /// Maps to HTTP 404 Not Found
    #[error("{resource} with id {id} not found")]
    NotFound { resource: String, id: String },

    /// Business-rule conflict: capacity or dates unavailable
    /// Maps to HTTP 409 Conflict
    #[error("{0}")]
    RoomUnavailable(String),

    /// Availability query spans more days than allowed
    /// Maps to HTTP 422 Unprocessable Entity
    #[error("Date range cannot exceed {max_days} days")]
    RangeTooLarge { max_days: i64 },

    /// Ingestion payload does not have the expected shape
    /// Maps to HTTP 400 Bad Request
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Operation not allowed in the resource's current state
    /// Maps to HTTP 409 Conflict
    #[error("{0}")]
    InvalidState(String),

    /// Rate rows and nights disagree; never expected for well-formed input
    /// Maps to HTTP 500 Internal Server Error
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// Database operation errors
    /// Maps to HTTP 500 Internal Server Error
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    /// Internal server errors
    /// Maps to HTTP 500 Internal Server Error
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Authentication failures
    /// Maps to HTTP 401 Unauthorized
    #[error("{0}")]
    Unauthorized(String),

    /// Plan request limit reached
    /// Maps to HTTP 429 Too Many Requests
    #[error("Too many requests. Please try again later.")]
    TooManyRequests { retry_after_secs: u64 },
}

/// Consistent error response structure
///
/// `status` is always "error" so clients can branch on the same field the
/// availability endpoint uses for successful responses.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(value_type = String, example = "error")]
    pub status: &'static str,

    /// Machine-readable error code (e.g., "VALIDATION_ERROR", "NOT_FOUND")
    pub error_code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (e.g., field-level validation errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,

    /// ISO 8601 timestamp of when the error occurred
    pub timestamp: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = self.to_error_response();
        let mut response = (status, Json(error_response)).into_response();

        if let ApiError::TooManyRequests { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl ApiError {
    /// Convert ApiError to HTTP status code and ErrorResponse
    ///
    /// Logs at a level matching severity:
    /// - error!: database, pricing and internal errors (500-level)
    /// - warn!: conflicts and throttling
    /// - debug!: expected client errors (validation, not found)
    ///
    /// 500-level details stay in the logs, never in the response body.
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        let status = self.status_code();
        let (error_code, message, details) = match self {
            ApiError::ValidationError(errors) => {
                debug!("Validation error: {:?}", errors);
                (
                    "VALIDATION_ERROR",
                    "Request validation failed".to_string(),
                    Some(serde_json::to_value(errors).unwrap_or(serde_json::json!({}))),
                )
            }
            ApiError::InvalidInput(message) => {
                debug!("Invalid input: {}", message);
                ("VALIDATION_ERROR", message.clone(), None)
            }
            ApiError::NotFound { resource, id } => {
                debug!("Resource not found: {} with id {}", resource, id);
                ("NOT_FOUND", self.to_string(), None)
            }
            ApiError::RoomUnavailable(message) => {
                warn!("Room unavailable: {}", message);
                ("ROOM_UNAVAILABLE", message.clone(), None)
            }
            ApiError::RangeTooLarge { .. } => {
                debug!("{}", self);
                ("RANGE_TOO_LARGE", self.to_string(), None)
            }
            ApiError::InvalidFormat(_) => {
                debug!("{}", self);
                ("INVALID_FORMAT", self.to_string(), None)
            }
            ApiError::InvalidState(message) => {
                warn!("Invalid state: {}", message);
                ("INVALID_STATE", message.clone(), None)
            }
            ApiError::Pricing(pricing_error) => {
                error!("Pricing invariant violated: {}", pricing_error);
                (
                    "PRICING_ERROR",
                    "Unable to price the requested stay".to_string(),
                    None,
                )
            }
            ApiError::DatabaseError(db_error) => {
                error!("Database error: {:?}", db_error);
                ("DATABASE_ERROR", "A database error occurred".to_string(), None)
            }
            ApiError::InternalError(internal_msg) => {
                error!("Internal error: {}", internal_msg);
                (
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
            ApiError::Unauthorized(message) => {
                warn!("Unauthorized access attempt: {}", message);
                ("UNAUTHORIZED", message.clone(), None)
            }
            ApiError::TooManyRequests { retry_after_secs } => {
                warn!("Rate limit hit, retry after {}s", retry_after_secs);
                (
                    "TOO_MANY_REQUESTS",
                    self.to_string(),
                    Some(serde_json::json!({ "retry_after": retry_after_secs })),
                )
            }
        };

        (
            status,
            ErrorResponse {
                status: "error",
                error_code: error_code.to_string(),
                message,
                details,
                timestamp: Utc::now().to_rfc3339(),
            },
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::RoomUnavailable(_) => StatusCode::CONFLICT,
            ApiError::RangeTooLarge { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidState(_) => StatusCode::CONFLICT,
            ApiError::Pricing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Whether a background job failing with this error should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::DatabaseError(_) | ApiError::InternalError(_))
    }

    pub fn not_found(resource: &str, id: impl ToString) -> Self {
        ApiError::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

/// Convert sqlx errors to ApiError
impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        ApiError::DatabaseError(error)
    }
}

/// Convert storage errors to ApiError
impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { resource, id } => ApiError::NotFound {
                resource: resource.to_string(),
                id,
            },
            StoreError::Unavailable { .. } | StoreError::Overlap { .. } => {
                ApiError::RoomUnavailable(error.to_string())
            }
            StoreError::Cancelled { .. } => ApiError::InvalidState(error.to_string()),
            StoreError::Database(db_error) => ApiError::DatabaseError(db_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::not_found("Booking", 7).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::RangeTooLarge { max_days: 30 }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::InvalidFormat("rooms missing or empty".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::RoomUnavailable("taken".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Pricing(PricingError::InvalidNights(0)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ApiError::RangeTooLarge { max_days: 30 }.to_string(),
            "Date range cannot exceed 30 days"
        );
        assert_eq!(
            ApiError::InvalidFormat("property_id missing".to_string()).to_string(),
            "Invalid data format: property_id missing"
        );
        assert_eq!(
            ApiError::not_found("Booking", 3).to_string(),
            "Booking with id 3 not found"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::DatabaseError(sqlx::Error::PoolTimedOut).is_transient());
        assert!(ApiError::InternalError("queue closed".to_string()).is_transient());
        assert!(!ApiError::RoomUnavailable("taken".to_string()).is_transient());
        assert!(!ApiError::not_found("Booking", 1).is_transient());
    }

    #[test]
    fn test_store_error_conversion() {
        let err: ApiError = StoreError::Unavailable { room_id: 4 }.into();
        assert!(matches!(err, ApiError::RoomUnavailable(_)));

        let err: ApiError = StoreError::not_found("Booking", 9).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = StoreError::Cancelled { booking_id: 2 }.into();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[test]
    fn test_error_response_shape() {
        let (status, body) = ApiError::RangeTooLarge { max_days: 30 }.to_error_response();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.status, "error");
        assert_eq!(body.error_code, "RANGE_TOO_LARGE");
        assert!(body.details.is_none());
    }
}
