//! In-memory store.
//!
//! One mutex guards every table, so each trait call is atomic the same way
//! a Postgres transaction is. Used by tests and by `STORE_BACKEND=memory`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    AvailabilityStore, BookingStore, IngestSummary, NewBooking, PlanLookup, PropertyFeed,
    Reschedule, StoreError, StoreResult,
};
use crate::availability::models::{
    AvailabilityDay, DateWindow, DayRecord, Property, Room, RoomAvailability, StayRange,
};
use crate::bookings::models::{Booking, BookingStatus};
use crate::pricing::DailyRate;

#[derive(Default)]
struct Tables {
    properties: BTreeMap<i64, Property>,
    rooms: BTreeMap<i64, Room>,
    days: BTreeMap<(i64, NaiveDate), AvailabilityDay>,
    bookings: BTreeMap<i64, Booking>,
    plans: HashMap<i32, String>,
    next_property_id: i64,
    next_room_id: i64,
    next_booking_id: i64,
}

impl Tables {
    fn room(&self, room_id: i64) -> StoreResult<Room> {
        self.rooms
            .get(&room_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Room", room_id))
    }

    fn held_by_live_booking(&self, room_id: i64, date: NaiveDate, except: Option<i64>) -> bool {
        self.bookings.values().any(|booking| {
            Some(booking.id) != except
                && booking.room_id == room_id
                && booking.status.is_live()
                && booking.stay().map_or(false, |stay| stay.contains(date))
        })
    }

    fn overlaps_live_booking(&self, room_id: i64, stay: &StayRange, except: Option<i64>) -> bool {
        self.bookings.values().any(|booking| {
            Some(booking.id) != except
                && booking.room_id == room_id
                && booking.status.is_live()
                && booking.stay().map_or(false, |other| other.overlaps(stay))
        })
    }

    /// Every night has a row that is open, or is held by `releasing`
    fn nights_open(&self, room_id: i64, stay: &StayRange, releasing: Option<&Booking>) -> bool {
        stay.night_dates().all(|night| match self.days.get(&(room_id, night)) {
            Some(day) if day.is_available => true,
            Some(_) => releasing.map_or(false, |booking| {
                booking.room_id == room_id
                    && booking.stay().map_or(false, |held| held.contains(night))
            }),
            None => false,
        })
    }

    fn set_nights(&mut self, room_id: i64, stay: &StayRange, available: bool) {
        for night in stay.night_dates() {
            if let Some(day) = self.days.get_mut(&(room_id, night)) {
                day.is_available = available;
            }
        }
    }

    fn upsert_days(&mut self, room: &Room, records: &[DayRecord]) -> usize {
        let mut latest: BTreeMap<NaiveDate, &DayRecord> = BTreeMap::new();
        for record in records {
            latest.insert(record.date, record);
        }

        for (date, record) in &latest {
            let held = self.held_by_live_booking(room.id, *date, None);
            self.days.insert(
                (room.id, *date),
                AvailabilityDay {
                    room_id: room.id,
                    date: *date,
                    is_available: record.is_available && !held,
                    price: record.price,
                    max_guests: record.max_guests,
                },
            );
        }

        latest.len()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail as if the database were unreachable
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Assign a subscription plan to a user
    pub async fn set_plan(&self, user_id: i32, plan: &str) {
        self.tables
            .lock()
            .await
            .plans
            .insert(user_id, plan.to_string());
    }

    fn check_writable(&self) -> StoreResult<()> {
        let failing = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match failing {
            Ok(_) => {
                debug!("Simulated store outage");
                Err(StoreError::Database(sqlx::Error::PoolTimedOut))
            }
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl AvailabilityStore for MemoryStore {
    async fn find_property(&self, external_id: &str) -> StoreResult<Property> {
        let tables = self.tables.lock().await;
        tables
            .properties
            .values()
            .find(|property| property.property_id == external_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Property", external_id))
    }

    async fn find_property_by_id(&self, id: i64) -> StoreResult<Property> {
        let tables = self.tables.lock().await;
        tables
            .properties
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Property", id))
    }

    async fn find_room(&self, room_id: i64) -> StoreResult<Room> {
        self.tables.lock().await.room(room_id)
    }

    async fn list_rooms_with_availability(
        &self,
        property: &Property,
        window: DateWindow,
        min_guests: i32,
    ) -> StoreResult<Vec<RoomAvailability>> {
        let tables = self.tables.lock().await;
        let rooms = tables
            .rooms
            .values()
            .filter(|room| room.property_id == property.id && room.max_guests >= min_guests)
            .map(|room| RoomAvailability {
                room: room.clone(),
                days: tables
                    .days
                    .range((room.id, window.start())..=(room.id, window.end()))
                    .map(|(_, day)| day)
                    .filter(|day| day.is_available)
                    .cloned()
                    .collect(),
            })
            .collect();
        Ok(rooms)
    }

    async fn is_fully_available(
        &self,
        room: &Room,
        stay: StayRange,
        guests: i32,
    ) -> StoreResult<bool> {
        let tables = self.tables.lock().await;
        let room = tables.room(room.id)?;
        Ok(guests <= room.max_guests && tables.nights_open(room.id, &stay, None))
    }

    async fn daily_rates(&self, room: &Room, stay: StayRange) -> StoreResult<Vec<DailyRate>> {
        let tables = self.tables.lock().await;
        Ok(stay
            .night_dates()
            .filter_map(|night| tables.days.get(&(room.id, night)))
            .map(|day| DailyRate {
                date: day.date,
                price: day.price,
            })
            .collect())
    }

    async fn list_days(&self, room: &Room, window: DateWindow) -> StoreResult<Vec<AvailabilityDay>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .days
            .range((room.id, window.start())..=(room.id, window.end()))
            .map(|(_, day)| day.clone())
            .collect())
    }

    async fn reserve_range(&self, room: &Room, stay: StayRange) -> StoreResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        tables.room(room.id)?;
        if !tables.nights_open(room.id, &stay, None) {
            return Err(StoreError::Unavailable { room_id: room.id });
        }
        tables.set_nights(room.id, &stay, false);
        Ok(())
    }

    async fn release_range(&self, room: &Room, stay: StayRange) -> StoreResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        tables.room(room.id)?;
        tables.set_nights(room.id, &stay, true);
        Ok(())
    }

    async fn upsert_days(&self, room: &Room, records: &[DayRecord]) -> StoreResult<usize> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let room = tables.room(room.id)?;
        Ok(tables.upsert_days(&room, records))
    }

    async fn ingest_property(&self, feed: &PropertyFeed) -> StoreResult<IngestSummary> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;

        let existing = tables
            .properties
            .values()
            .find(|property| property.property_id == feed.property_id)
            .cloned();
        let property = match existing {
            Some(property) => property,
            None => {
                tables.next_property_id += 1;
                let property = Property {
                    id: tables.next_property_id,
                    property_id: feed.property_id.clone(),
                    name: feed.name.clone(),
                };
                tables.properties.insert(property.id, property.clone());
                property
            }
        };

        let mut days = 0;
        for room_feed in &feed.rooms {
            let existing_id = tables
                .rooms
                .values()
                .find(|room| room.property_id == property.id && room.room_id == room_feed.room_id)
                .map(|room| room.id);
            let id = match existing_id {
                Some(id) => id,
                None => {
                    tables.next_room_id += 1;
                    tables.next_room_id
                }
            };
            let room = Room {
                id,
                property_id: property.id,
                room_id: room_feed.room_id.clone(),
                name: room_feed.name.clone(),
                max_guests: room_feed.max_guests,
            };
            tables.rooms.insert(id, room.clone());
            days += tables.upsert_days(&room, &room_feed.day_records());
        }

        Ok(IngestSummary {
            property,
            rooms: feed.rooms.len(),
            days,
        })
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let room = tables.room(booking.room.id)?;

        if booking.guests > room.max_guests || !tables.nights_open(room.id, &booking.stay, None) {
            return Err(StoreError::Unavailable { room_id: room.id });
        }
        if tables.overlaps_live_booking(room.id, &booking.stay, None) {
            return Err(StoreError::Overlap { room_id: room.id });
        }

        tables.set_nights(room.id, &booking.stay, false);
        tables.next_booking_id += 1;
        let now = Utc::now();
        let row = Booking {
            id: tables.next_booking_id,
            user_id: booking.user_id,
            room_id: room.id,
            property_id: room.property_id,
            check_in: booking.stay.check_in(),
            check_out: booking.stay.check_out(),
            guests: booking.guests,
            status: booking.status,
            price_per_night: booking.pricing.price_per_night,
            total_price: booking.pricing.total_price,
            tax_amount: booking.pricing.tax_amount,
            final_total: booking.pricing.final_total,
            currency: booking.pricing.currency.clone(),
            nights: booking.pricing.nights as i32,
            created_at: now,
            updated_at: now,
        };
        tables.bookings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn reschedule_booking(
        &self,
        booking_id: i64,
        user_id: i32,
        change: Reschedule,
    ) -> StoreResult<Booking> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;

        let existing = tables
            .bookings
            .get(&booking_id)
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Booking", booking_id))?;
        if !existing.status.is_live() {
            return Err(StoreError::Cancelled { booking_id });
        }

        let room = tables.room(change.room.id)?;
        if change.guests > room.max_guests
            || !tables.nights_open(room.id, &change.stay, Some(&existing))
        {
            return Err(StoreError::Unavailable { room_id: room.id });
        }
        if tables.overlaps_live_booking(room.id, &change.stay, Some(booking_id)) {
            return Err(StoreError::Overlap { room_id: room.id });
        }

        if let Some(old_stay) = existing.stay() {
            tables.set_nights(existing.room_id, &old_stay, true);
        }
        tables.set_nights(room.id, &change.stay, false);

        let updated = Booking {
            room_id: room.id,
            property_id: room.property_id,
            check_in: change.stay.check_in(),
            check_out: change.stay.check_out(),
            guests: change.guests,
            price_per_night: change.pricing.price_per_night,
            total_price: change.pricing.total_price,
            tax_amount: change.pricing.tax_amount,
            final_total: change.pricing.final_total,
            currency: change.pricing.currency.clone(),
            nights: change.pricing.nights as i32,
            updated_at: Utc::now(),
            ..existing
        };
        tables.bookings.insert(booking_id, updated.clone());
        Ok(updated)
    }

    async fn cancel_booking(&self, booking_id: i64, user_id: i32) -> StoreResult<Booking> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;

        let existing = tables
            .bookings
            .get(&booking_id)
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Booking", booking_id))?;
        if !existing.status.is_live() {
            return Err(StoreError::Cancelled { booking_id });
        }

        if let Some(stay) = existing.stay() {
            tables.set_nights(existing.room_id, &stay, true);
        }
        let cancelled = Booking {
            status: BookingStatus::Cancelled,
            updated_at: Utc::now(),
            ..existing
        };
        tables.bookings.insert(booking_id, cancelled.clone());
        Ok(cancelled)
    }

    async fn find_booking_for_user(&self, booking_id: i64, user_id: i32) -> StoreResult<Booking> {
        let tables = self.tables.lock().await;
        tables
            .bookings
            .get(&booking_id)
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Booking", booking_id))
    }

    async fn list_bookings_for_user(&self, user_id: i32) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .rev()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PlanLookup for MemoryStore {
    async fn current_plan(&self, user_id: i32) -> StoreResult<Option<String>> {
        Ok(self.tables.lock().await.plans.get(&user_id).cloned())
    }
}
