use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::bookings::models::Booking;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingEventKind {
    Created,
    Updated,
    Cancelled,
}

impl BookingEventKind {
    /// Subject line the mailer uses for this event
    pub fn subject(&self) -> &'static str {
        match self {
            BookingEventKind::Created => "Booking Confirmation",
            BookingEventKind::Updated => "Booking Updated",
            BookingEventKind::Cancelled => "Booking Cancelled",
        }
    }
}

/// A committed booking change, addressed to the booking owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub booking: Booking,
    pub recipient: String,
}

/// Broadcast hub for booking events. Mail delivery subscribes here.
pub struct NotificationHub {
    sender: broadcast::Sender<BookingEvent>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. No-op if nobody is listening.
    pub fn publish(&self, event: BookingEvent) {
        info!(
            "{} for booking {} sent to {}",
            event.kind.subject(),
            event.booking.id,
            event.recipient
        );
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookings::models::BookingStatus;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn booking() -> Booking {
        Booking {
            id: 7,
            user_id: 1,
            room_id: 1,
            property_id: 1,
            check_in: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2024, 7, 3).unwrap(),
            guests: 2,
            status: BookingStatus::Confirmed,
            price_per_night: dec!(100.00),
            total_price: dec!(200.00),
            tax_amount: dec!(20.00),
            final_total: dec!(220.00),
            currency: "USD".to_string(),
            nights: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe();

        let event = BookingEvent {
            kind: BookingEventKind::Created,
            booking: booking(),
            recipient: "guest@example.com".to_string(),
        };
        hub.publish(event.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
        assert_eq!(received.kind.subject(), "Booking Confirmation");
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let hub = NotificationHub::new();
        hub.publish(BookingEvent {
            kind: BookingEventKind::Cancelled,
            booking: booking(),
            recipient: "guest@example.com".to_string(),
        });
    }
}
