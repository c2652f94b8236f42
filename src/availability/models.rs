use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::pricing::round_money;

/// Property as stored; `property_id` is the external identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Property {
    pub id: i64,
    pub property_id: String,
    pub name: String,
}

/// Room as stored; `room_id` is unique within its property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Room {
    pub id: i64,
    pub property_id: i64,
    pub room_id: String,
    pub name: String,
    pub max_guests: i32,
}

/// One room's state and price for one calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AvailabilityDay {
    pub room_id: i64,
    pub date: NaiveDate,
    pub is_available: bool,
    pub price: Decimal,
    pub max_guests: i32,
}

/// Input row for upserting availability days
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub price: Decimal,
    pub max_guests: i32,
    pub is_available: bool,
}

/// A room together with the day rows matched by a query
#[derive(Debug, Clone)]
pub struct RoomAvailability {
    pub room: Room,
    pub days: Vec<AvailabilityDay>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateRangeError {
    #[error("Check-out date must be after check-in date")]
    CheckOutNotAfterCheckIn,

    #[error("Check-out date cannot be before check-in date")]
    CheckOutBeforeCheckIn,
}

/// Half-open stay `[check_in, check_out)`: the nights a booking occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, DateRangeError> {
        if check_out <= check_in {
            return Err(DateRangeError::CheckOutNotAfterCheckIn);
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    /// Number of nights, always at least one
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Every night of the stay, check-out day excluded
    pub fn night_dates(&self) -> impl Iterator<Item = NaiveDate> {
        let check_in = self.check_in;
        (0..self.nights() as u64).map(move |offset| check_in + Days::new(offset))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.check_in && date < self.check_out
    }

    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

/// Inclusive calendar window `[start, end]` used by availability queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if end < start {
            return Err(DateRangeError::CheckOutBeforeCheckIn);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whole days between start and end, the value range limits apply to
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Calendar days covered, both ends included
    pub fn days(&self) -> i64 {
        self.span_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Query input as received from HTTP or chat; dates are raw strings
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    pub property_id: String,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub guests: Option<i32>,
    #[serde(default)]
    pub full_availability: bool,
}

/// Day entry of a full-detail listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DayDetail {
    pub date: NaiveDate,
    pub price: Decimal,
    pub is_available: bool,
    pub max_guests: i32,
}

impl From<&AvailabilityDay> for DayDetail {
    fn from(day: &AvailabilityDay) -> Self {
        Self {
            date: day.date,
            price: day.price,
            is_available: day.is_available,
            max_guests: day.max_guests,
        }
    }
}

/// One room in an availability result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum RoomListing {
    Detail {
        room_id: String,
        name: String,
        max_guests: i32,
        availabilities: Vec<DayDetail>,
    },
    Summary {
        room_id: String,
        max_guests: i32,
        total_price: Decimal,
    },
}

impl RoomListing {
    pub fn room_id(&self) -> &str {
        match self {
            RoomListing::Detail { room_id, .. } | RoomListing::Summary { room_id, .. } => room_id,
        }
    }

    pub fn max_guests(&self) -> i32 {
        match self {
            RoomListing::Detail { max_guests, .. } | RoomListing::Summary { max_guests, .. } => {
                *max_guests
            }
        }
    }

    /// Summary total, or the sum of the listed days for detail entries
    pub fn total_price(&self) -> Decimal {
        match self {
            RoomListing::Summary { total_price, .. } => *total_price,
            RoomListing::Detail { availabilities, .. } => {
                round_money(availabilities.iter().map(|day| day.price).sum())
            }
        }
    }
}

/// Outcome of an availability check, serialized with a `status` tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AvailabilityResult {
    Success {
        property_id: String,
        rooms: Vec<RoomListing>,
    },
    Error {
        message: String,
    },
}
