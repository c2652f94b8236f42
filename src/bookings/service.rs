use std::sync::Arc;

use tracing::{info, warn};
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::availability::models::{Room, StayRange};
use crate::availability::AvailabilityQueryService;
use crate::bookings::models::{
    Booking, BookingStatus, CreateBookingRequest, PricingPreview, PricingPreviewQuery,
    UpdateBookingRequest,
};
use crate::bookings::status_machine::StatusMachine;
use crate::error::ApiError;
use crate::notifications::{BookingEvent, BookingEventKind, NotificationHub};
use crate::pricing::{PriceBreakdown, PricingEngine};
use crate::store::{NewBooking, Reschedule, Store};

const UNAVAILABLE_MESSAGE: &str = "Room is not available for the selected dates";

/// Orchestrates booking create, update and cancel
///
/// Each mutation is a single store call, so the availability flip and the
/// booking row commit or roll back together. The cached availability of the
/// property is cleared right after the commit and an event is published.
pub struct BookingLifecycleManager {
    store: Arc<dyn Store>,
    availability: Arc<AvailabilityQueryService>,
    pricing: PricingEngine,
    notifications: Arc<NotificationHub>,
}

impl BookingLifecycleManager {
    pub fn new(
        store: Arc<dyn Store>,
        availability: Arc<AvailabilityQueryService>,
        pricing: PricingEngine,
        notifications: Arc<NotificationHub>,
    ) -> Self {
        Self {
            store,
            availability,
            pricing,
            notifications,
        }
    }

    /// Create a booking for `user`
    ///
    /// # Validation
    /// - Request fields pass `CreateBookingRequest` validation
    /// - The room exists and belongs to `property_id`
    /// - Guests fit the room and every night has an open availability row
    ///
    /// # Returns
    /// The stored booking with its price snapshot, or
    /// `ApiError::RoomUnavailable` when the stay cannot be booked. Nothing
    /// is written in that case.
    pub async fn create(
        &self,
        request: CreateBookingRequest,
        user: &AuthenticatedUser,
    ) -> Result<Booking, ApiError> {
        request.validate()?;
        let stay = stay_range(request.check_in, request.check_out)?;

        let room = self.store.find_room(request.room_id).await?;
        if room.property_id != request.property_id {
            return Err(ApiError::not_found("Room", request.room_id));
        }

        let pricing = self.quote(&room, stay, request.guests).await?.ok_or_else(|| {
            ApiError::RoomUnavailable(UNAVAILABLE_MESSAGE.to_string())
        })?;

        let booking = self
            .store
            .insert_booking(NewBooking {
                user_id: user.user_id,
                room: room.clone(),
                stay,
                guests: request.guests,
                status: request.status.unwrap_or_default(),
                pricing,
            })
            .await?;

        info!(
            "Booking {} created for room {} ({} to {})",
            booking.id, room.id, booking.check_in, booking.check_out
        );
        self.after_commit(BookingEventKind::Created, &booking, user).await;
        Ok(booking)
    }

    /// Move a booking to new dates, guests or room
    ///
    /// Omitted fields keep their current value. The new nights are checked
    /// with the booking's own nights treated as free; if they cannot be
    /// booked the booking keeps its old nights.
    pub async fn update(
        &self,
        booking_id: i64,
        request: UpdateBookingRequest,
        user: &AuthenticatedUser,
    ) -> Result<Booking, ApiError> {
        request.validate()?;
        let current = self
            .store
            .find_booking_for_user(booking_id, user.user_id)
            .await?;

        if !StatusMachine::can_modify(current.status) {
            return Err(ApiError::InvalidState(
                "Cannot update a cancelled booking".to_string(),
            ));
        }

        if request
            .property_id
            .map_or(false, |property_id| property_id != current.property_id)
        {
            return Err(ApiError::InvalidInput(
                "A booking cannot move to another property".to_string(),
            ));
        }

        let room_id = request.room_id.unwrap_or(current.room_id);
        let room = self.store.find_room(room_id).await?;
        if room.property_id != current.property_id {
            return Err(ApiError::not_found("Room", room_id));
        }

        let stay = stay_range(
            request.check_in.unwrap_or(current.check_in),
            request.check_out.unwrap_or(current.check_out),
        )?;
        let guests = request.guests.unwrap_or(current.guests);
        if guests > room.max_guests {
            return Err(ApiError::RoomUnavailable(UNAVAILABLE_MESSAGE.to_string()));
        }

        let rates = self.store.daily_rates(&room, stay).await?;
        if rates.len() as i64 != stay.nights() {
            return Err(ApiError::RoomUnavailable(UNAVAILABLE_MESSAGE.to_string()));
        }
        let pricing = self.pricing.price_stay(&rates, stay.nights())?;

        let booking = self
            .store
            .reschedule_booking(
                booking_id,
                user.user_id,
                Reschedule {
                    room,
                    stay,
                    guests,
                    pricing,
                },
            )
            .await?;

        info!(
            "Booking {} moved to room {} ({} to {})",
            booking.id, booking.room_id, booking.check_in, booking.check_out
        );
        self.after_commit(BookingEventKind::Updated, &booking, user)
            .await;
        Ok(booking)
    }

    /// Cancel a booking and release its nights
    pub async fn cancel(&self, booking_id: i64, user: &AuthenticatedUser) -> Result<Booking, ApiError> {
        let current = self
            .store
            .find_booking_for_user(booking_id, user.user_id)
            .await?;

        if current.status == BookingStatus::Cancelled {
            return Err(ApiError::InvalidState(
                "Booking is already cancelled".to_string(),
            ));
        }
        StatusMachine::transition(current.status, BookingStatus::Cancelled)
            .map_err(ApiError::InvalidState)?;

        let booking = self
            .store
            .cancel_booking(booking_id, user.user_id)
            .await?;

        info!("Booking {} cancelled", booking.id);
        self.after_commit(BookingEventKind::Cancelled, &booking, user)
            .await;
        Ok(booking)
    }

    /// Booking by id, only if owned by `user`
    pub async fn get(&self, booking_id: i64, user: &AuthenticatedUser) -> Result<Booking, ApiError> {
        Ok(self
            .store
            .find_booking_for_user(booking_id, user.user_id)
            .await?)
    }

    /// All bookings of `user`, newest first
    pub async fn list(&self, user: &AuthenticatedUser) -> Result<Vec<Booking>, ApiError> {
        Ok(self.store.list_bookings_for_user(user.user_id).await?)
    }

    /// Price a stay without booking it
    pub async fn pricing_preview(&self, query: PricingPreviewQuery) -> Result<PricingPreview, ApiError> {
        query.validate()?;
        let stay = stay_range(query.check_in, query.check_out)?;
        let room = self.store.find_room(query.room_id).await?;

        Ok(match self.quote(&room, stay, query.guests).await? {
            Some(pricing) => PricingPreview {
                available: true,
                pricing: Some(pricing),
                message: None,
            },
            None => PricingPreview {
                available: false,
                pricing: None,
                message: Some(UNAVAILABLE_MESSAGE.to_string()),
            },
        })
    }

    /// Price the stay if the room can take it, `None` otherwise
    async fn quote(
        &self,
        room: &Room,
        stay: StayRange,
        guests: i32,
    ) -> Result<Option<PriceBreakdown>, ApiError> {
        if !self.store.is_fully_available(room, stay, guests).await? {
            return Ok(None);
        }
        let rates = self.store.daily_rates(room, stay).await?;
        Ok(Some(self.pricing.price_stay(&rates, stay.nights())?))
    }

    async fn after_commit(&self, kind: BookingEventKind, booking: &Booking, user: &AuthenticatedUser) {
        match self.store.find_property_by_id(booking.property_id).await {
            Ok(property) => {
                self.availability
                    .invalidate_property(&property.property_id)
                    .await
            }
            Err(e) => warn!(
                "Could not resolve property {} for cache invalidation: {}",
                booking.property_id, e
            ),
        }

        self.notifications.publish(BookingEvent {
            kind,
            booking: booking.clone(),
            recipient: user.email.clone(),
        });
    }
}

fn stay_range(check_in: chrono::NaiveDate, check_out: chrono::NaiveDate) -> Result<StayRange, ApiError> {
    StayRange::new(check_in, check_out).map_err(|e| ApiError::InvalidInput(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::models::{AvailabilityQuery, AvailabilityResult};
    use crate::cache::MemoryCache;
    use crate::store::{AvailabilityStore, DayFeed, MemoryStore, PropertyFeed, RoomFeed};
    use chrono::{Days, NaiveDate};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn user(id: i32) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: id,
            email: format!("user{}@example.com", id),
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        availability: Arc<AvailabilityQueryService>,
        hub: Arc<NotificationHub>,
        manager: BookingLifecycleManager,
    }

    /// P1 with R1 (capacity 2, 100/night) and R2 (capacity 4, 120/night)
    /// open from 2024-07-01 through 2024-07-10
    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let days = |price| {
            (0..10)
                .map(|offset| DayFeed {
                    date: date("2024-07-01") + Days::new(offset),
                    price,
                })
                .collect::<Vec<_>>()
        };
        store
            .ingest_property(&PropertyFeed {
                property_id: "P1".to_string(),
                name: "Seaside".to_string(),
                rooms: vec![
                    RoomFeed {
                        room_id: "R1".to_string(),
                        name: "Double".to_string(),
                        max_guests: 2,
                        availabilities: days(dec!(100)),
                    },
                    RoomFeed {
                        room_id: "R2".to_string(),
                        name: "Family".to_string(),
                        max_guests: 4,
                        availabilities: days(dec!(120)),
                    },
                ],
            })
            .await
            .unwrap();

        let availability = Arc::new(AvailabilityQueryService::new(
            store.clone(),
            Arc::new(MemoryCache::new()),
            Duration::from_secs(300),
            30,
        ));
        let hub = Arc::new(NotificationHub::new());
        let manager = BookingLifecycleManager::new(
            store.clone(),
            availability.clone(),
            PricingEngine::new(),
            hub.clone(),
        );
        Fixture {
            store,
            availability,
            hub,
            manager,
        }
    }

    fn create_request(room_id: i64, check_in: &str, check_out: &str, guests: i32) -> CreateBookingRequest {
        CreateBookingRequest {
            room_id,
            property_id: 1,
            check_in: date(check_in),
            check_out: date(check_out),
            guests,
            status: None,
        }
    }

    async fn open_nights(store: &MemoryStore, room_id: i64, from: &str, to: &str) -> Vec<bool> {
        let room = store.find_room(room_id).await.unwrap();
        let window =
            crate::availability::models::DateWindow::new(date(from), date(to)).unwrap();
        store
            .list_days(&room, window)
            .await
            .unwrap()
            .iter()
            .map(|day| day.is_available)
            .collect()
    }

    #[tokio::test]
    async fn test_create_reserves_nights_and_prices_stay() {
        let f = fixture().await;
        let mut events = f.hub.subscribe();

        let booking = f
            .manager
            .create(create_request(1, "2024-07-01", "2024-07-03", 2), &user(1))
            .await
            .unwrap();

        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.nights, 2);
        assert_eq!(booking.price_per_night, dec!(100.00));
        assert_eq!(booking.total_price, dec!(200.00));
        assert_eq!(booking.tax_amount, dec!(20.00));
        assert_eq!(booking.final_total, dec!(220.00));

        // Check-out night stays open
        assert_eq!(
            open_nights(&f.store, 1, "2024-07-01", "2024-07-03").await,
            vec![false, false, true]
        );

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, BookingEventKind::Created);
        assert_eq!(event.recipient, "user1@example.com");
    }

    #[tokio::test]
    async fn test_over_capacity_is_rejected_without_mutation() {
        let f = fixture().await;

        let err = f
            .manager
            .create(create_request(1, "2024-07-01", "2024-07-03", 3), &user(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::RoomUnavailable(_)));
        assert!(open_nights(&f.store, 1, "2024-07-01", "2024-07-03")
            .await
            .iter()
            .all(|open| *open));
    }

    #[tokio::test]
    async fn test_overlapping_create_is_rejected() {
        let f = fixture().await;
        f.manager
            .create(create_request(1, "2024-07-01", "2024-07-04", 2), &user(1))
            .await
            .unwrap();

        let err = f
            .manager
            .create(create_request(1, "2024-07-03", "2024-07-05", 1), &user(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RoomUnavailable(_)));

        // Back-to-back stays share no night
        assert!(f
            .manager
            .create(create_request(1, "2024-07-04", "2024-07-06", 1), &user(2))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_room_must_belong_to_property() {
        let f = fixture().await;
        let mut request = create_request(1, "2024-07-01", "2024-07-03", 1);
        request.property_id = 99;

        let err = f.manager.create(request, &user(1)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_clears_cached_availability() {
        let f = fixture().await;
        let query = AvailabilityQuery {
            property_id: "P1".to_string(),
            check_in: Some("2024-07-01".to_string()),
            check_out: Some("2024-07-02".to_string()),
            guests: Some(1),
            full_availability: false,
        };

        let rooms_before = match f.availability.check_availability(&query).await.unwrap() {
            AvailabilityResult::Success { rooms, .. } => rooms.len(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(rooms_before, 2);

        f.manager
            .create(create_request(1, "2024-07-01", "2024-07-03", 1), &user(1))
            .await
            .unwrap();

        let rooms_after = match f.availability.check_availability(&query).await.unwrap() {
            AvailabilityResult::Success { rooms, .. } => rooms.len(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(rooms_after, 1);
    }

    #[tokio::test]
    async fn test_update_swaps_nights() {
        let f = fixture().await;
        let booking = f
            .manager
            .create(create_request(1, "2024-07-01", "2024-07-03", 2), &user(1))
            .await
            .unwrap();

        let updated = f
            .manager
            .update(
                booking.id,
                UpdateBookingRequest {
                    check_in: Some(date("2024-07-02")),
                    check_out: Some(date("2024-07-05")),
                    ..Default::default()
                },
                &user(1),
            )
            .await
            .unwrap();

        assert_eq!(updated.nights, 3);
        assert_eq!(updated.total_price, dec!(300.00));
        assert_eq!(
            open_nights(&f.store, 1, "2024-07-01", "2024-07-05").await,
            vec![true, false, false, false, true]
        );
    }

    #[tokio::test]
    async fn test_failed_update_keeps_old_nights() {
        let f = fixture().await;
        let mine = f
            .manager
            .create(create_request(1, "2024-07-01", "2024-07-03", 1), &user(1))
            .await
            .unwrap();
        f.manager
            .create(create_request(1, "2024-07-05", "2024-07-07", 1), &user(2))
            .await
            .unwrap();

        let err = f
            .manager
            .update(
                mine.id,
                UpdateBookingRequest {
                    check_out: Some(date("2024-07-06")),
                    ..Default::default()
                },
                &user(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RoomUnavailable(_)));

        let unchanged = f.manager.get(mine.id, &user(1)).await.unwrap();
        assert_eq!(unchanged.check_out, date("2024-07-03"));
        assert_eq!(
            open_nights(&f.store, 1, "2024-07-01", "2024-07-03").await,
            vec![false, false, true]
        );
    }

    #[tokio::test]
    async fn test_update_can_change_room_within_property() {
        let f = fixture().await;
        let booking = f
            .manager
            .create(create_request(1, "2024-07-01", "2024-07-03", 2), &user(1))
            .await
            .unwrap();

        let moved = f
            .manager
            .update(
                booking.id,
                UpdateBookingRequest {
                    room_id: Some(2),
                    guests: Some(4),
                    ..Default::default()
                },
                &user(1),
            )
            .await
            .unwrap();

        assert_eq!(moved.room_id, 2);
        assert_eq!(moved.total_price, dec!(240.00));
        assert!(open_nights(&f.store, 1, "2024-07-01", "2024-07-02")
            .await
            .iter()
            .all(|open| *open));
    }

    #[tokio::test]
    async fn test_cancel_releases_nights_and_is_terminal() {
        let f = fixture().await;
        let booking = f
            .manager
            .create(create_request(1, "2024-07-01", "2024-07-03", 2), &user(1))
            .await
            .unwrap();

        let cancelled = f.manager.cancel(booking.id, &user(1)).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(open_nights(&f.store, 1, "2024-07-01", "2024-07-02")
            .await
            .iter()
            .all(|open| *open));

        let again = f.manager.cancel(booking.id, &user(1)).await.unwrap_err();
        assert!(matches!(again, ApiError::InvalidState(_)));

        let update = f
            .manager
            .update(booking.id, UpdateBookingRequest::default(), &user(1))
            .await
            .unwrap_err();
        assert!(matches!(update, ApiError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_other_users_bookings_are_not_found() {
        let f = fixture().await;
        let booking = f
            .manager
            .create(create_request(1, "2024-07-01", "2024-07-03", 2), &user(1))
            .await
            .unwrap();

        assert!(matches!(
            f.manager.get(booking.id, &user(2)).await,
            Err(ApiError::NotFound { .. })
        ));
        assert!(matches!(
            f.manager.cancel(booking.id, &user(2)).await,
            Err(ApiError::NotFound { .. })
        ));
        assert!(f.manager.list(&user(2)).await.unwrap().is_empty());
        assert_eq!(f.manager.list(&user(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pricing_preview_does_not_persist() {
        let f = fixture().await;
        let preview = f
            .manager
            .pricing_preview(PricingPreviewQuery {
                room_id: 2,
                check_in: date("2024-07-01"),
                check_out: date("2024-07-04"),
                guests: 3,
            })
            .await
            .unwrap();

        assert!(preview.available);
        let pricing = preview.pricing.unwrap();
        assert_eq!(pricing.nights, 3);
        assert_eq!(pricing.final_total, dec!(396.00));
        assert!(open_nights(&f.store, 2, "2024-07-01", "2024-07-04")
            .await
            .iter()
            .all(|open| *open));

        let unavailable = f
            .manager
            .pricing_preview(PricingPreviewQuery {
                room_id: 1,
                check_in: date("2024-07-09"),
                check_out: date("2024-07-12"),
                guests: 1,
            })
            .await
            .unwrap();
        assert!(!unavailable.available);
        assert_eq!(unavailable.message.as_deref(), Some(UNAVAILABLE_MESSAGE));
    }

    #[tokio::test]
    async fn test_concurrent_creates_only_one_wins() {
        let f = fixture().await;
        let manager = Arc::new(f.manager);

        let handles: Vec<_> = (1..=8)
            .map(|id| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .create(create_request(1, "2024-07-02", "2024-07-05", 1), &user(id))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, ApiError::RoomUnavailable(_))),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(
            open_nights(&f.store, 1, "2024-07-01", "2024-07-05").await,
            vec![true, false, false, false, true]
        );
    }
}
