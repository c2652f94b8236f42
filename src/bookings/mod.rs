// Bookings Module
//
// Booking lifecycle: create, reschedule and cancel with the availability
// flips done in the same store transaction.

pub mod handlers;
pub mod models;
pub mod service;
pub mod status_machine;

pub use models::{
    Booking, BookingStatus, CreateBookingRequest, PricingPreview, PricingPreviewQuery,
    UpdateBookingRequest,
};
pub use service::BookingLifecycleManager;
pub use status_machine::StatusMachine;
