use std::sync::Arc;

use tracing::{info, warn};

use crate::availability::AvailabilityQueryService;
use crate::error::ApiError;
use crate::ingestion::models::{PropertyInput, RoomInput};
use crate::store::{DayFeed, IngestSummary, PropertyFeed, RoomFeed, Store};

/// Capacity given to rooms whose feed omits `max_guests`
pub const DEFAULT_MAX_GUESTS: i32 = 2;

/// Loads external availability feeds into the store, one property at a time
pub struct IngestionPipeline {
    store: Arc<dyn Store>,
    availability: Arc<AvailabilityQueryService>,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn Store>, availability: Arc<AvailabilityQueryService>) -> Self {
        Self {
            store,
            availability,
        }
    }

    /// Check a whole payload before anything is queued
    ///
    /// # Returns
    /// One feed per property, with defaults filled in and repeated room
    /// entries merged. Any malformed entry rejects the whole batch with
    /// `ApiError::InvalidFormat`.
    pub fn validate(batch: Vec<PropertyInput>) -> Result<Vec<PropertyFeed>, ApiError> {
        if batch.is_empty() {
            return Err(ApiError::InvalidFormat(
                "No data provided for ingestion".to_string(),
            ));
        }
        batch.into_iter().map(validate_property).collect()
    }

    /// Write one property feed and clear its cached queries
    pub async fn ingest_property(&self, feed: &PropertyFeed) -> Result<IngestSummary, ApiError> {
        let summary = self.store.ingest_property(feed).await?;
        info!(
            "Ingested property {}: {} rooms, {} days",
            summary.property.property_id, summary.rooms, summary.days
        );
        self.availability
            .invalidate_property(&summary.property.property_id)
            .await;
        Ok(summary)
    }

    /// Validate and write a batch in place
    ///
    /// Properties are independent: one failing leaves the others written.
    pub async fn ingest(
        &self,
        batch: Vec<PropertyInput>,
    ) -> Result<Vec<Result<IngestSummary, ApiError>>, ApiError> {
        let feeds = Self::validate(batch)?;
        let mut results = Vec::with_capacity(feeds.len());
        for feed in &feeds {
            let result = self.ingest_property(feed).await;
            if let Err(e) = &result {
                warn!("Ingestion of property {} failed: {}", feed.property_id, e);
            }
            results.push(result);
        }
        Ok(results)
    }
}

fn validate_property(input: PropertyInput) -> Result<PropertyFeed, ApiError> {
    let property_id = input
        .property_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidFormat("property_id missing".to_string()))?;

    let rooms_input = input
        .rooms
        .filter(|rooms| !rooms.is_empty())
        .ok_or_else(|| ApiError::InvalidFormat("rooms missing or empty".to_string()))?;

    let mut rooms: Vec<RoomFeed> = Vec::new();
    for room_input in rooms_input {
        let room = validate_room(&property_id, room_input)?;
        // Repeated entries for a room extend the first one
        match rooms.iter_mut().find(|existing| existing.room_id == room.room_id) {
            Some(existing) => existing.availabilities.extend(room.availabilities),
            None => rooms.push(room),
        }
    }

    Ok(PropertyFeed {
        name: input
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Property {}", property_id)),
        property_id,
        rooms,
    })
}

fn validate_room(property_id: &str, input: RoomInput) -> Result<RoomFeed, ApiError> {
    let room_id = input
        .room_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            ApiError::InvalidFormat(format!("room_id missing in property {}", property_id))
        })?;

    let max_guests = input.max_guests.unwrap_or(DEFAULT_MAX_GUESTS);
    if max_guests < 1 {
        return Err(ApiError::InvalidFormat(format!(
            "max_guests must be at least 1 for room {}",
            room_id
        )));
    }

    let mut availabilities = Vec::with_capacity(input.availabilities.len());
    for day in input.availabilities {
        if day.price.is_sign_negative() {
            return Err(ApiError::InvalidFormat(format!(
                "negative price for room {} on {}",
                room_id, day.date
            )));
        }
        if day.allotment.map_or(false, |allotment| allotment < 0) {
            return Err(ApiError::InvalidFormat(format!(
                "negative allotment for room {} on {}",
                room_id, day.date
            )));
        }
        availabilities.push(DayFeed {
            date: day.date,
            price: day.price,
        });
    }

    Ok(RoomFeed {
        name: input
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Room {}", room_id)),
        room_id,
        max_guests,
        availabilities,
    })
}
