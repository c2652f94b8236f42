// Background Jobs Module
//
// Booking mutations and ingestion batches run here, off the request path.
// Every job gets an id whose status can be polled.

pub mod handlers;
pub mod models;
pub mod queue;
pub mod registry;

pub use models::{Job, JobAccepted, JobOutcome, JobRecord, JobStatus};
pub use queue::{JobExecutor, JobHandler, JobQueue};
pub use registry::JobRegistry;
