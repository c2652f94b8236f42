//! Storage traits for availability, bookings and subscriptions.
//!
//! Every mutation that touches availability days runs as one atomic unit
//! inside the implementation. Services only see these traits, so the same
//! code runs against Postgres in production and the in-memory store in
//! tests.
//!
//! # Implementations
//!
//! - `PgStore`: PostgreSQL via sqlx transactions
//! - `MemoryStore`: mutex-guarded in-process tables

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::availability::models::{
    AvailabilityDay, DateWindow, DayRecord, Property, Room, RoomAvailability, StayRange,
};
use crate::bookings::models::{Booking, BookingStatus};
use crate::pricing::{DailyRate, PriceBreakdown};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{resource} with id {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("Room {room_id} is not available for the selected dates")]
    Unavailable { room_id: i64 },

    #[error("Room {room_id} already has an overlapping booking")]
    Overlap { room_id: i64 },

    #[error("Booking {booking_id} is cancelled")]
    Cancelled { booking_id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Validated room entry of an ingestion feed
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RoomFeed {
    pub room_id: String,
    pub name: String,
    pub max_guests: i32,
    pub availabilities: Vec<DayFeed>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DayFeed {
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Validated ingestion feed for one property
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PropertyFeed {
    pub property_id: String,
    pub name: String,
    pub rooms: Vec<RoomFeed>,
}

impl RoomFeed {
    /// Day rows for the upsert; feeds always open the dates they carry
    pub fn day_records(&self) -> Vec<DayRecord> {
        self.availabilities
            .iter()
            .map(|day| DayRecord {
                date: day.date,
                price: day.price,
                max_guests: self.max_guests,
                is_available: true,
            })
            .collect()
    }
}

/// What one property ingestion wrote
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IngestSummary {
    pub property: Property,
    pub rooms: usize,
    pub days: usize,
}

/// Booking row to insert, already priced
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: i32,
    pub room: Room,
    pub stay: StayRange,
    pub guests: i32,
    pub status: BookingStatus,
    pub pricing: PriceBreakdown,
}

/// New placement for an existing booking, already priced
#[derive(Debug, Clone)]
pub struct Reschedule {
    pub room: Room,
    pub stay: StayRange,
    pub guests: i32,
    pub pricing: PriceBreakdown,
}

/// Authoritative per-room, per-date availability and price
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Property by external identifier
    async fn find_property(&self, external_id: &str) -> StoreResult<Property>;

    /// Property by internal id
    async fn find_property_by_id(&self, id: i64) -> StoreResult<Property>;

    async fn find_room(&self, room_id: i64) -> StoreResult<Room>;

    /// Rooms of a property with `max_guests >= min_guests`, each paired with
    /// its available day rows inside the window, ordered by date
    async fn list_rooms_with_availability(
        &self,
        property: &Property,
        window: DateWindow,
        min_guests: i32,
    ) -> StoreResult<Vec<RoomAvailability>>;

    /// True iff guests fit and every night of the stay has an available row
    async fn is_fully_available(
        &self,
        room: &Room,
        stay: StayRange,
        guests: i32,
    ) -> StoreResult<bool>;

    /// Stored price of each night of the stay, in date order
    async fn daily_rates(&self, room: &Room, stay: StayRange) -> StoreResult<Vec<DailyRate>>;

    /// Every stored day row of a room inside the window, available or not
    async fn list_days(&self, room: &Room, window: DateWindow) -> StoreResult<Vec<AvailabilityDay>>;

    /// Mark every night of the stay unavailable; fails without writing when
    /// any night is missing or already taken
    async fn reserve_range(&self, room: &Room, stay: StayRange) -> StoreResult<()>;

    /// Mark every night of the stay available again
    async fn release_range(&self, room: &Room, stay: StayRange) -> StoreResult<()>;

    /// Insert or update day rows keyed by (room, date). Nights held by a live
    /// booking stay unavailable whatever the record says.
    async fn upsert_days(&self, room: &Room, records: &[DayRecord]) -> StoreResult<usize>;

    /// Write a whole property feed as one atomic unit
    async fn ingest_property(&self, feed: &PropertyFeed) -> StoreResult<IngestSummary>;
}

/// Booking persistence; each call is atomic with the availability writes it
/// implies
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Re-check and reserve the nights, then insert the booking
    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking>;

    /// Release the old nights, reserve the new ones and rewrite the row.
    /// On conflict nothing changes and the old nights stay reserved.
    async fn reschedule_booking(
        &self,
        booking_id: i64,
        user_id: i32,
        change: Reschedule,
    ) -> StoreResult<Booking>;

    /// Release the nights and mark the booking cancelled
    async fn cancel_booking(&self, booking_id: i64, user_id: i32) -> StoreResult<Booking>;

    /// Booking owned by `user_id`; anything else is `NotFound`
    async fn find_booking_for_user(&self, booking_id: i64, user_id: i32) -> StoreResult<Booking>;

    async fn list_bookings_for_user(&self, user_id: i32) -> StoreResult<Vec<Booking>>;
}

/// Current subscription plan name of a user
#[async_trait]
pub trait PlanLookup: Send + Sync {
    async fn current_plan(&self, user_id: i32) -> StoreResult<Option<String>>;
}

/// Everything the services need from storage
pub trait Store: AvailabilityStore + BookingStore + PlanLookup {}

impl<T> Store for T where T: AvailabilityStore + BookingStore + PlanLookup {}
