// HTTP handlers for availability endpoints

use axum::{
    extract::{Query, State},
    Json,
};

use crate::auth::AuthenticatedUser;
use crate::availability::models::{AvailabilityQuery, AvailabilityResult};
use crate::error::{ApiError, ErrorResponse};

/// Handler for GET /api/availability
/// Lists the rooms of a property open for the requested dates and guests
#[utoipa::path(
    get,
    path = "/api/availability",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Rooms matching the query", body = AvailabilityResult),
        (status = 400, description = "Invalid dates or range too large", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Unknown property", body = ErrorResponse),
        (status = 429, description = "Plan limit reached", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "availability"
)]
pub async fn check_availability_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResult>, ApiError> {
    tracing::debug!(
        "User {} checking availability for property {}",
        user.user_id,
        query.property_id
    );

    let result = state.availability.check_availability(&query).await?;
    Ok(Json(result))
}
