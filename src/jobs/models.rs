use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::bookings::models::{Booking, CreateBookingRequest, UpdateBookingRequest};
use crate::store::{IngestSummary, PropertyFeed};

/// Unit of background work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    CreateBooking {
        user: AuthenticatedUser,
        request: CreateBookingRequest,
    },
    UpdateBooking {
        user: AuthenticatedUser,
        booking_id: i64,
        request: UpdateBookingRequest,
    },
    CancelBooking {
        user: AuthenticatedUser,
        booking_id: i64,
    },
    IngestProperty {
        owner: i32,
        feed: PropertyFeed,
    },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::CreateBooking { .. } => "create_booking",
            Job::UpdateBooking { .. } => "update_booking",
            Job::CancelBooking { .. } => "cancel_booking",
            Job::IngestProperty { .. } => "ingest_property",
        }
    }

    /// User allowed to see this job's status
    pub fn owner(&self) -> i32 {
        match self {
            Job::CreateBooking { user, .. }
            | Job::UpdateBooking { user, .. }
            | Job::CancelBooking { user, .. } => user.user_id,
            Job::IngestProperty { owner, .. } => *owner,
        }
    }
}

/// What a finished job produced
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Booking(Booking),
    Ingested(IngestSummary),
}

impl JobOutcome {
    pub fn booking_id(&self) -> Option<i64> {
        match self {
            JobOutcome::Booking(booking) => Some(booking.id),
            JobOutcome::Ingested(_) => None,
        }
    }
}

/// Processing state of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded {
        #[serde(skip_serializing_if = "Option::is_none")]
        booking_id: Option<i64>,
    },
    /// Rejected by a business rule; retrying would not help
    Failed { error: String },
    /// Retries exhausted; the payload is kept for replay
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Processing)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobRecord {
    pub id: Uuid,
    #[schema(value_type = String, example = "create_booking")]
    pub kind: &'static str,
    #[serde(skip)]
    pub owner: i32,
    pub status: JobStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub job: Job,
}

/// Response to a replayed job
#[derive(Debug, Serialize, ToSchema)]
pub struct JobAccepted {
    pub message: String,
    pub job_id: Uuid,
    pub status_url: String,
}
