// Availability Module
//
// Calendar types shared by the store and the services, and the cached
// availability query service.

pub mod handlers;
pub mod models;
pub mod service;

pub use models::{
    AvailabilityDay, AvailabilityQuery, AvailabilityResult, DateWindow, Property, Room,
    RoomListing, StayRange,
};
pub use service::{format_natural_language_reply, property_tag, AvailabilityQueryService};
