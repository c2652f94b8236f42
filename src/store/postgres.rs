//! PostgreSQL store.
//!
//! Every transaction that writes a room's nights first locks the room row,
//! so bookings and re-ingestion of the same room run one after the other.
//! Booking mutations then lock the affected availability rows with
//! `SELECT ... FOR UPDATE`. The `bookings_no_overlap` exclusion constraint
//! backs this up; its violation surfaces as `StoreError::Overlap`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use super::{
    AvailabilityStore, BookingStore, IngestSummary, NewBooking, PlanLookup, PropertyFeed,
    Reschedule, StoreError, StoreResult,
};
use crate::availability::models::{
    AvailabilityDay, DateWindow, DayRecord, Property, Room, RoomAvailability, StayRange,
};
use crate::bookings::models::{Booking, BookingStatus};
use crate::db::is_constraint_violation;
use crate::pricing::DailyRate;

const BOOKING_COLUMNS: &str = "id, user_id, room_id, property_id, check_in, check_out, guests, \
     status, price_per_night, total_price, tax_amount, final_total, currency, nights, \
     created_at, updated_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a write error on the bookings table, turning overlap and uniqueness
/// violations into a conflict
fn booking_write_error(error: sqlx::Error, room_id: i64) -> StoreError {
    if is_constraint_violation(&error) {
        StoreError::Overlap { room_id }
    } else {
        StoreError::Database(error)
    }
}

async fn fetch_room(conn: &mut PgConnection, room_id: i64) -> StoreResult<Room> {
    sqlx::query_as::<_, Room>(
        "SELECT id, property_id, room_id, name, max_guests FROM rooms WHERE id = $1",
    )
    .bind(room_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::not_found("Room", room_id))
}

/// Fetch a room and hold its row lock until the transaction ends
async fn lock_room(conn: &mut PgConnection, room_id: i64) -> StoreResult<Room> {
    sqlx::query_as::<_, Room>(
        "SELECT id, property_id, room_id, name, max_guests FROM rooms WHERE id = $1 FOR UPDATE",
    )
    .bind(room_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::not_found("Room", room_id))
}

/// Lock the open rows for every night of the stay; true iff all are present
async fn lock_open_nights(
    conn: &mut PgConnection,
    room_id: i64,
    stay: &StayRange,
) -> StoreResult<bool> {
    let locked: Vec<NaiveDate> = sqlx::query_scalar(
        r#"
        SELECT date
        FROM availabilities
        WHERE room_id = $1
          AND date >= $2 AND date < $3
          AND is_available = TRUE
        ORDER BY date
        FOR UPDATE
        "#,
    )
    .bind(room_id)
    .bind(stay.check_in())
    .bind(stay.check_out())
    .fetch_all(&mut *conn)
    .await?;

    Ok(locked.len() as i64 == stay.nights())
}

async fn set_nights(
    conn: &mut PgConnection,
    room_id: i64,
    stay: &StayRange,
    available: bool,
) -> StoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE availabilities
        SET is_available = $4, updated_at = NOW()
        WHERE room_id = $1 AND date >= $2 AND date < $3
        "#,
    )
    .bind(room_id)
    .bind(stay.check_in())
    .bind(stay.check_out())
    .bind(available)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn upsert_day_rows(
    conn: &mut PgConnection,
    room: &Room,
    records: &[DayRecord],
) -> StoreResult<usize> {
    // A batch may list a date twice; the last entry wins
    let latest: BTreeMap<NaiveDate, &DayRecord> =
        records.iter().map(|record| (record.date, record)).collect();
    if latest.is_empty() {
        return Ok(0);
    }

    let dates: Vec<NaiveDate> = latest.keys().copied().collect();
    let open: Vec<bool> = latest.values().map(|record| record.is_available).collect();
    let prices: Vec<Decimal> = latest.values().map(|record| record.price).collect();
    let guests: Vec<i32> = latest.values().map(|record| record.max_guests).collect();

    sqlx::query(
        r#"
        INSERT INTO availabilities (room_id, date, is_available, price, max_guests)
        SELECT $1, day.date,
               day.is_available AND NOT EXISTS (
                   SELECT 1 FROM bookings b
                   WHERE b.room_id = $1
                     AND b.status <> 'cancelled'
                     AND day.date >= b.check_in AND day.date < b.check_out
               ),
               day.price, day.max_guests
        FROM UNNEST($2::date[], $3::bool[], $4::numeric[], $5::int[])
             AS day(date, is_available, price, max_guests)
        ON CONFLICT (room_id, date) DO UPDATE
        SET is_available = EXCLUDED.is_available,
            price = EXCLUDED.price,
            max_guests = EXCLUDED.max_guests,
            updated_at = NOW()
        "#,
    )
    .bind(room.id)
    .bind(&dates)
    .bind(&open)
    .bind(&prices)
    .bind(&guests)
    .execute(&mut *conn)
    .await?;

    Ok(latest.len())
}

async fn lock_booking_for_user(
    conn: &mut PgConnection,
    booking_id: i64,
    user_id: i32,
) -> StoreResult<Booking> {
    let sql = format!(
        "SELECT {} FROM bookings WHERE id = $1 AND user_id = $2 FOR UPDATE",
        BOOKING_COLUMNS
    );
    sqlx::query_as::<_, Booking>(&sql)
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found("Booking", booking_id))
}

#[async_trait]
impl AvailabilityStore for PgStore {
    async fn find_property(&self, external_id: &str) -> StoreResult<Property> {
        sqlx::query_as::<_, Property>(
            "SELECT id, property_id, name FROM properties WHERE property_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("Property", external_id))
    }

    async fn find_property_by_id(&self, id: i64) -> StoreResult<Property> {
        sqlx::query_as::<_, Property>("SELECT id, property_id, name FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("Property", id))
    }

    async fn find_room(&self, room_id: i64) -> StoreResult<Room> {
        let mut conn = self.pool.acquire().await?;
        fetch_room(&mut conn, room_id).await
    }

    async fn list_rooms_with_availability(
        &self,
        property: &Property,
        window: DateWindow,
        min_guests: i32,
    ) -> StoreResult<Vec<RoomAvailability>> {
        let rooms = sqlx::query_as::<_, Room>(
            r#"
            SELECT id, property_id, room_id, name, max_guests
            FROM rooms
            WHERE property_id = $1 AND max_guests >= $2
            ORDER BY id
            "#,
        )
        .bind(property.id)
        .bind(min_guests)
        .fetch_all(&self.pool)
        .await?;

        let room_ids: Vec<i64> = rooms.iter().map(|room| room.id).collect();
        let days = sqlx::query_as::<_, AvailabilityDay>(
            r#"
            SELECT room_id, date, is_available, price, max_guests
            FROM availabilities
            WHERE room_id = ANY($1)
              AND date >= $2 AND date <= $3
              AND is_available = TRUE
            ORDER BY room_id, date
            "#,
        )
        .bind(&room_ids)
        .bind(window.start())
        .bind(window.end())
        .fetch_all(&self.pool)
        .await?;

        let mut by_room: BTreeMap<i64, Vec<AvailabilityDay>> = BTreeMap::new();
        for day in days {
            by_room.entry(day.room_id).or_default().push(day);
        }

        Ok(rooms
            .into_iter()
            .map(|room| RoomAvailability {
                days: by_room.remove(&room.id).unwrap_or_default(),
                room,
            })
            .collect())
    }

    async fn is_fully_available(
        &self,
        room: &Room,
        stay: StayRange,
        guests: i32,
    ) -> StoreResult<bool> {
        let room = self.find_room(room.id).await?;
        if guests > room.max_guests {
            return Ok(false);
        }

        let open: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM availabilities
            WHERE room_id = $1
              AND date >= $2 AND date < $3
              AND is_available = TRUE
            "#,
        )
        .bind(room.id)
        .bind(stay.check_in())
        .bind(stay.check_out())
        .fetch_one(&self.pool)
        .await?;

        Ok(open == stay.nights())
    }

    async fn daily_rates(&self, room: &Room, stay: StayRange) -> StoreResult<Vec<DailyRate>> {
        let rows: Vec<(NaiveDate, Decimal)> = sqlx::query_as(
            r#"
            SELECT date, price
            FROM availabilities
            WHERE room_id = $1 AND date >= $2 AND date < $3
            ORDER BY date
            "#,
        )
        .bind(room.id)
        .bind(stay.check_in())
        .bind(stay.check_out())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(date, price)| DailyRate { date, price })
            .collect())
    }

    async fn list_days(&self, room: &Room, window: DateWindow) -> StoreResult<Vec<AvailabilityDay>> {
        let days = sqlx::query_as::<_, AvailabilityDay>(
            r#"
            SELECT room_id, date, is_available, price, max_guests
            FROM availabilities
            WHERE room_id = $1 AND date >= $2 AND date <= $3
            ORDER BY date
            "#,
        )
        .bind(room.id)
        .bind(window.start())
        .bind(window.end())
        .fetch_all(&self.pool)
        .await?;
        Ok(days)
    }

    async fn reserve_range(&self, room: &Room, stay: StayRange) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_room(&mut tx, room.id).await?;
        if !lock_open_nights(&mut tx, room.id, &stay).await? {
            return Err(StoreError::Unavailable { room_id: room.id });
        }
        set_nights(&mut tx, room.id, &stay, false).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn release_range(&self, room: &Room, stay: StayRange) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_room(&mut tx, room.id).await?;
        set_nights(&mut tx, room.id, &stay, true).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_days(&self, room: &Room, records: &[DayRecord]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        let room = lock_room(&mut tx, room.id).await?;
        let written = upsert_day_rows(&mut tx, &room, records).await?;
        tx.commit().await?;
        Ok(written)
    }

    async fn ingest_property(&self, feed: &PropertyFeed) -> StoreResult<IngestSummary> {
        let mut tx = self.pool.begin().await?;

        // First-or-create; an existing property keeps its name
        let property = sqlx::query_as::<_, Property>(
            r#"
            INSERT INTO properties (property_id, name)
            VALUES ($1, $2)
            ON CONFLICT (property_id) DO UPDATE SET updated_at = properties.updated_at
            RETURNING id, property_id, name
            "#,
        )
        .bind(&feed.property_id)
        .bind(&feed.name)
        .fetch_one(&mut *tx)
        .await?;

        let mut days = 0;
        for room_feed in &feed.rooms {
            let room = sqlx::query_as::<_, Room>(
                r#"
                INSERT INTO rooms (property_id, room_id, name, max_guests)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (property_id, room_id) DO UPDATE
                SET name = EXCLUDED.name,
                    max_guests = EXCLUDED.max_guests,
                    updated_at = NOW()
                RETURNING id, property_id, room_id, name, max_guests
                "#,
            )
            .bind(property.id)
            .bind(&room_feed.room_id)
            .bind(&room_feed.name)
            .bind(room_feed.max_guests)
            .fetch_one(&mut *tx)
            .await?;

            // The upsert above only locks a room that already existed
            let room = lock_room(&mut tx, room.id).await?;
            days += upsert_day_rows(&mut tx, &room, &room_feed.day_records()).await?;
        }

        tx.commit().await?;
        info!(
            "Ingested property {} ({} rooms, {} days)",
            property.property_id,
            feed.rooms.len(),
            days
        );

        Ok(IngestSummary {
            property,
            rooms: feed.rooms.len(),
            days,
        })
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let room = lock_room(&mut tx, booking.room.id).await?;

        if booking.guests > room.max_guests || !lock_open_nights(&mut tx, room.id, &booking.stay).await? {
            debug!("Room {} unavailable for {:?}", room.id, booking.stay);
            return Err(StoreError::Unavailable { room_id: room.id });
        }
        set_nights(&mut tx, room.id, &booking.stay, false).await?;

        let sql = format!(
            r#"
            INSERT INTO bookings (
                user_id, room_id, property_id, check_in, check_out, guests, status,
                price_per_night, total_price, tax_amount, final_total, currency, nights
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, Booking>(&sql)
            .bind(booking.user_id)
            .bind(room.id)
            .bind(room.property_id)
            .bind(booking.stay.check_in())
            .bind(booking.stay.check_out())
            .bind(booking.guests)
            .bind(booking.status)
            .bind(booking.pricing.price_per_night)
            .bind(booking.pricing.total_price)
            .bind(booking.pricing.tax_amount)
            .bind(booking.pricing.final_total)
            .bind(&booking.pricing.currency)
            .bind(booking.pricing.nights as i32)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| booking_write_error(e, room.id))?;

        tx.commit()
            .await
            .map_err(|e| booking_write_error(e, room.id))?;
        Ok(row)
    }

    async fn reschedule_booking(
        &self,
        booking_id: i64,
        user_id: i32,
        change: Reschedule,
    ) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let existing = lock_booking_for_user(&mut tx, booking_id, user_id).await?;
        if !existing.status.is_live() {
            return Err(StoreError::Cancelled { booking_id });
        }

        // Lower id first, so two reschedules between the same rooms cannot deadlock
        let first = existing.room_id.min(change.room.id);
        let second = existing.room_id.max(change.room.id);
        lock_room(&mut tx, first).await?;
        if second != first {
            lock_room(&mut tx, second).await?;
        }
        let room = fetch_room(&mut tx, change.room.id).await?;

        if let Some(old_stay) = existing.stay() {
            set_nights(&mut tx, existing.room_id, &old_stay, true).await?;
        }

        // Dropping the transaction on any early return rolls the release back
        if change.guests > room.max_guests || !lock_open_nights(&mut tx, room.id, &change.stay).await? {
            return Err(StoreError::Unavailable { room_id: room.id });
        }
        set_nights(&mut tx, room.id, &change.stay, false).await?;

        let sql = format!(
            r#"
            UPDATE bookings
            SET room_id = $2, property_id = $3, check_in = $4, check_out = $5, guests = $6,
                price_per_night = $7, total_price = $8, tax_amount = $9, final_total = $10,
                currency = $11, nights = $12, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, Booking>(&sql)
            .bind(booking_id)
            .bind(room.id)
            .bind(room.property_id)
            .bind(change.stay.check_in())
            .bind(change.stay.check_out())
            .bind(change.guests)
            .bind(change.pricing.price_per_night)
            .bind(change.pricing.total_price)
            .bind(change.pricing.tax_amount)
            .bind(change.pricing.final_total)
            .bind(&change.pricing.currency)
            .bind(change.pricing.nights as i32)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| booking_write_error(e, room.id))?;

        tx.commit()
            .await
            .map_err(|e| booking_write_error(e, room.id))?;
        Ok(row)
    }

    async fn cancel_booking(&self, booking_id: i64, user_id: i32) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let existing = lock_booking_for_user(&mut tx, booking_id, user_id).await?;
        if !existing.status.is_live() {
            return Err(StoreError::Cancelled { booking_id });
        }

        lock_room(&mut tx, existing.room_id).await?;
        if let Some(stay) = existing.stay() {
            set_nights(&mut tx, existing.room_id, &stay, true).await?;
        }

        let sql = format!(
            "UPDATE bookings SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, Booking>(&sql)
            .bind(booking_id)
            .bind(BookingStatus::Cancelled)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn find_booking_for_user(&self, booking_id: i64, user_id: i32) -> StoreResult<Booking> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE id = $1 AND user_id = $2",
            BOOKING_COLUMNS
        );
        sqlx::query_as::<_, Booking>(&sql)
            .bind(booking_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("Booking", booking_id))
    }

    async fn list_bookings_for_user(&self, user_id: i32) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, Booking>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl PlanLookup for PgStore {
    async fn current_plan(&self, user_id: i32) -> StoreResult<Option<String>> {
        let plan = sqlx::query_scalar::<_, String>(
            r#"
            SELECT plan_name
            FROM subscriptions
            WHERE user_id = $1
              AND status = 'active'
              AND (ends_at IS NULL OR ends_at > NOW())
            ORDER BY starts_at DESC NULLS LAST, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(plan)
    }
}
