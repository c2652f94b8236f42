// HTTP handlers for booking endpoints
//
// Mutations are validated and ownership-checked here, then queued; the
// response carries the job id to poll.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::bookings::models::{
    Booking, BookingAccepted, CreateBookingRequest, PricingPreview, PricingPreviewQuery,
    UpdateBookingRequest,
};
use crate::error::{ApiError, ErrorResponse};
use crate::jobs::Job;

fn accepted(message: &str, job_id: Uuid) -> (StatusCode, Json<BookingAccepted>) {
    (
        StatusCode::ACCEPTED,
        Json(BookingAccepted {
            message: message.to_string(),
            job_id,
            status_url: format!("/api/jobs/{}", job_id),
        }),
    )
}

/// Handler for POST /api/bookings
/// Queues a booking for the authenticated user
#[utoipa::path(
    post,
    path = "/api/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 202, description = "Booking queued", body = BookingAccepted),
        (status = 400, description = "Invalid booking request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
pub async fn create_booking_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingAccepted>), ApiError> {
    request.validate()?;

    let job_id = state
        .jobs
        .enqueue(Job::CreateBooking { user, request })
        .await?;

    Ok(accepted(
        "Booking is being processed. You will receive a confirmation email shortly.",
        job_id,
    ))
}

/// Handler for GET /api/bookings
/// Lists the caller's bookings, newest first
#[utoipa::path(
    get,
    path = "/api/bookings",
    responses(
        (status = 200, description = "The caller's bookings", body = Vec<Booking>),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
pub async fn list_bookings_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let bookings = state.bookings.list(&user).await?;
    Ok(Json(bookings))
}

/// Handler for GET /api/bookings/{booking_id}
#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    params(("id" = i64, Path, description = "Booking id")),
    responses(
        (status = 200, description = "The booking", body = Booking),
        (status = 404, description = "No such booking for the caller", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
pub async fn get_booking_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<i64>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state.bookings.get(booking_id, &user).await?;
    Ok(Json(booking))
}

/// Handler for PUT /api/bookings/{booking_id}
#[utoipa::path(
    put,
    path = "/api/bookings/{id}",
    params(("id" = i64, Path, description = "Booking id")),
    request_body = UpdateBookingRequest,
    responses(
        (status = 202, description = "Update queued", body = BookingAccepted),
        (status = 400, description = "Invalid update", body = ErrorResponse),
        (status = 404, description = "No such booking for the caller", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
pub async fn update_booking_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<i64>,
    Json(request): Json<UpdateBookingRequest>,
) -> Result<(StatusCode, Json<BookingAccepted>), ApiError> {
    request.validate()?;
    // 404 now rather than a failed job later
    state.bookings.get(booking_id, &user).await?;

    let job_id = state
        .jobs
        .enqueue(Job::UpdateBooking {
            user,
            booking_id,
            request,
        })
        .await?;

    Ok(accepted(
        "Booking update is being processed. You will receive an email shortly.",
        job_id,
    ))
}

/// Handler for DELETE /api/bookings/{booking_id}
#[utoipa::path(
    delete,
    path = "/api/bookings/{id}",
    params(("id" = i64, Path, description = "Booking id")),
    responses(
        (status = 202, description = "Cancellation queued", body = BookingAccepted),
        (status = 404, description = "No such booking for the caller", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
pub async fn cancel_booking_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<i64>,
) -> Result<(StatusCode, Json<BookingAccepted>), ApiError> {
    state.bookings.get(booking_id, &user).await?;

    let job_id = state
        .jobs
        .enqueue(Job::CancelBooking { user, booking_id })
        .await?;

    Ok(accepted(
        "Booking cancellation is being processed. You will receive an email shortly.",
        job_id,
    ))
}

/// Handler for GET /api/bookings/pricing-preview
/// Prices a stay without booking it; 400 with `available: false` when the
/// room cannot take it
#[utoipa::path(
    get,
    path = "/api/bookings/pricing-preview",
    params(PricingPreviewQuery),
    responses(
        (status = 200, description = "Price breakdown of the stay", body = PricingPreview),
        (status = 400, description = "Room cannot take the stay", body = PricingPreview),
        (status = 404, description = "Unknown room", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bookings"
)]
pub async fn pricing_preview_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<PricingPreviewQuery>,
) -> Result<(StatusCode, Json<PricingPreview>), ApiError> {
    let preview = state.bookings.pricing_preview(query).await?;
    let status = if preview.available {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(preview)))
}
