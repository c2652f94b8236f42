use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::availability::models::StayRange;
use crate::pricing::PriceBreakdown;
use crate::validation::{validate_initial_status, validate_stay_dates};

/// Booking status representing the lifecycle of a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the booking still holds its nights
    pub fn is_live(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl Default for BookingStatus {
    fn default() -> Self {
        BookingStatus::Confirmed
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Booking row, including the price snapshot taken when it was placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Booking {
    pub id: i64,
    pub user_id: i32,
    pub room_id: i64,
    pub property_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
    pub status: BookingStatus,
    pub price_per_night: Decimal,
    pub total_price: Decimal,
    pub tax_amount: Decimal,
    pub final_total: Decimal,
    pub currency: String,
    pub nights: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn stay(&self) -> Option<StayRange> {
        StayRange::new(self.check_in, self.check_out).ok()
    }
}

/// Request payload for creating a booking (also used for pricing previews)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_create_dates", skip_on_field_errors = false))]
pub struct CreateBookingRequest {
    pub room_id: i64,
    pub property_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[validate(range(min = 1, message = "Guests must be at least 1"))]
    pub guests: i32,
    #[validate(custom = "validate_initial_status")]
    pub status: Option<BookingStatus>,
}

fn validate_create_dates(request: &CreateBookingRequest) -> Result<(), validator::ValidationError> {
    validate_stay_dates(request.check_in, request.check_out)
}

/// Request payload for updating a booking; omitted fields keep their value
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateBookingRequest {
    pub room_id: Option<i64>,
    pub property_id: Option<i64>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    #[validate(range(min = 1, message = "Guests must be at least 1"))]
    pub guests: Option<i32>,
}

/// Query parameters for GET /api/bookings/pricing-preview
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[validate(schema(function = "validate_preview_dates", skip_on_field_errors = false))]
#[into_params(parameter_in = Query)]
pub struct PricingPreviewQuery {
    pub room_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[validate(range(min = 1, message = "Guests must be at least 1"))]
    pub guests: i32,
}

fn validate_preview_dates(query: &PricingPreviewQuery) -> Result<(), validator::ValidationError> {
    validate_stay_dates(query.check_in, query.check_out)
}

/// Pricing preview; `pricing` is set only when the stay can be booked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PricingPreview {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PriceBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response for accepted booking mutations
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookingAccepted {
    pub message: String,
    pub job_id: uuid::Uuid,
    pub status_url: String,
}
