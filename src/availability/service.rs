use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Utc};
use tracing::{debug, info, warn};

use crate::availability::models::{
    AvailabilityQuery, AvailabilityResult, DateWindow, DayDetail, RoomAvailability, RoomListing,
};
use crate::cache::QueryCache;
use crate::error::ApiError;
use crate::pricing::round_money;
use crate::store::Store;
use crate::validation::parse_calendar_date;

/// Cache tag shared by every cached query of one property
pub fn property_tag(external_id: &str) -> String {
    format!("availability_property:{}", external_id)
}

/// Answers availability queries, caching successful results per property
pub struct AvailabilityQueryService {
    store: Arc<dyn Store>,
    cache: Arc<dyn QueryCache>,
    cache_ttl: Duration,
    max_range_days: i64,
}

impl AvailabilityQueryService {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn QueryCache>,
        cache_ttl: Duration,
        max_range_days: i64,
    ) -> Self {
        Self {
            store,
            cache,
            cache_ttl,
            max_range_days,
        }
    }

    /// Turn the raw query dates into the inclusive query window
    ///
    /// Missing dates default to today and tomorrow. Timestamps are cut to
    /// their calendar day.
    fn query_window(&self, query: &AvailabilityQuery) -> Result<DateWindow, ApiError> {
        let today = Utc::now().date_naive();
        let check_in = match query.check_in.as_deref() {
            Some(raw) => parse_calendar_date(raw)
                .ok_or_else(|| ApiError::InvalidInput(format!("Invalid check-in date: {}", raw)))?,
            None => today,
        };
        let check_out = match query.check_out.as_deref() {
            Some(raw) => parse_calendar_date(raw)
                .ok_or_else(|| ApiError::InvalidInput(format!("Invalid check-out date: {}", raw)))?,
            None => today + Days::new(1),
        };

        let window = DateWindow::new(check_in, check_out)
            .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        if window.span_days() > self.max_range_days {
            return Err(ApiError::RangeTooLarge {
                max_days: self.max_range_days,
            });
        }
        Ok(window)
    }

    /// Check which rooms of a property can host `guests` over the window
    ///
    /// # Returns
    /// `AvailabilityResult::Success` listing the matching rooms. Summary mode
    /// only lists rooms with an open row for every day of the window, with
    /// the summed price; full-detail mode lists every room with the open
    /// rows it has.
    ///
    /// # Errors
    /// - `InvalidInput` for unparseable dates or check-out before check-in
    /// - `RangeTooLarge` when the window spans more than the configured days
    /// - `NotFound` for an unknown property
    pub async fn check_availability(
        &self,
        query: &AvailabilityQuery,
    ) -> Result<AvailabilityResult, ApiError> {
        if query.property_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("property_id is required".to_string()));
        }
        let guests = query.guests.unwrap_or(1);
        if guests < 1 {
            return Err(ApiError::InvalidInput("Guests must be at least 1".to_string()));
        }
        let window = self.query_window(query)?;

        let key = format!(
            "availability:{}:{}:{}:{}:{}",
            query.property_id,
            window.start(),
            window.end(),
            guests,
            if query.full_availability { "full" } else { "summary" }
        );

        if let Some(cached) = self.cache.get(&key).await {
            match serde_json::from_str::<AvailabilityResult>(&cached) {
                Ok(result) => {
                    debug!("Availability cache hit for {}", key);
                    return Ok(result);
                }
                Err(e) => warn!("Discarding unreadable cache entry {}: {}", key, e),
            }
        }

        // Taken before reading, so an invalidation that lands mid-query
        // keeps this result out of the cache
        let guard = self.cache.guard(&property_tag(&query.property_id)).await;
        let property = self.store.find_property(&query.property_id).await?;
        let rooms = self
            .store
            .list_rooms_with_availability(&property, window, guests)
            .await?;

        let listings = if query.full_availability {
            rooms.iter().map(detail_listing).collect()
        } else {
            rooms
                .iter()
                .filter_map(|room| summary_listing(room, window))
                .collect()
        };

        let result = AvailabilityResult::Success {
            property_id: property.property_id.clone(),
            rooms: listings,
        };

        match serde_json::to_string(&result) {
            Ok(value) => {
                if !self.cache.set(&key, &[guard], value, self.cache_ttl).await {
                    debug!("Availability result {} was not cached", key);
                }
            }
            Err(e) => warn!("Could not cache availability result {}: {}", key, e),
        }

        Ok(result)
    }

    /// Drop every cached query for a property
    pub async fn invalidate_property(&self, external_id: &str) {
        info!("Invalidating cached availability for property {}", external_id);
        self.cache.invalidate_by_tag(&property_tag(external_id)).await;
    }

    /// Run a query on behalf of the chat integration and word the answer
    ///
    /// Errors are answered with their message.
    pub async fn reply_for_chat_params(&self, query: &AvailabilityQuery) -> String {
        let result = match self.check_availability(query).await {
            Ok(result) => result,
            Err(e) => return e.to_string(),
        };

        match (&result, self.query_window(query)) {
            (AvailabilityResult::Success { rooms, .. }, Ok(window)) if !rooms.is_empty() => {
                format!(
                    "Yes! We have {} room(s) available from {} to {}, starting at €{:.2}. Want to reserve now?",
                    rooms.len(),
                    window.start(),
                    window.end(),
                    rooms[0].total_price()
                )
            }
            (AvailabilityResult::Error { message }, _) => message.clone(),
            _ => "Sorry, no availability found for those dates and guest count.".to_string(),
        }
    }
}

fn detail_listing(room: &RoomAvailability) -> RoomListing {
    RoomListing::Detail {
        room_id: room.room.room_id.clone(),
        name: room.room.name.clone(),
        max_guests: room.room.max_guests,
        availabilities: room.days.iter().map(DayDetail::from).collect(),
    }
}

fn summary_listing(room: &RoomAvailability, window: DateWindow) -> Option<RoomListing> {
    if room.days.len() as i64 != window.days() {
        return None;
    }
    Some(RoomListing::Summary {
        room_id: room.room.room_id.clone(),
        max_guests: room.room.max_guests,
        total_price: round_money(room.days.iter().map(|day| day.price).sum()),
    })
}

/// Render an availability result as a sentence for conversational clients
pub fn format_natural_language_reply(result: &AvailabilityResult) -> String {
    match result {
        AvailabilityResult::Error { message } => {
            format!("There was an error checking availability: {}", message)
        }
        AvailabilityResult::Success { rooms, .. } if rooms.is_empty() => {
            "No rooms are available for the selected criteria.".to_string()
        }
        AvailabilityResult::Success { property_id, rooms } => {
            let details: Vec<String> = rooms
                .iter()
                .map(|room| {
                    format!(
                        "Room {} (max guests: {}) at a total price of ${:.2}.",
                        room.room_id(),
                        room.max_guests(),
                        room.total_price()
                    )
                })
                .collect();
            format!(
                "Found {} room(s) available for property {}. {}",
                rooms.len(),
                property_id,
                details.join(" ")
            )
        }
    }
}
