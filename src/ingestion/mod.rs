// Ingestion Module
//
// Bulk availability feeds: payload validation and the per-property upsert.

pub mod handlers;
pub mod models;
pub mod service;

pub use models::{DayInput, IngestionAccepted, PropertyInput, RoomInput};
pub use service::IngestionPipeline;
