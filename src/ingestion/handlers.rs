// HTTP handler for availability ingestion

use axum::{body::Bytes, extract::State, http::StatusCode, Json};

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ErrorResponse};
use crate::ingestion::models::{IngestionAccepted, PropertyInput};
use crate::ingestion::IngestionPipeline;
use crate::jobs::Job;

/// Handler for POST /api/availability/ingest
/// Validates the whole payload, then queues one job per property
#[utoipa::path(
    post,
    path = "/api/availability/ingest",
    request_body = Vec<PropertyInput>,
    responses(
        (status = 202, description = "One job queued per property", body = IngestionAccepted),
        (status = 400, description = "Malformed or invalid payload", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "availability"
)]
pub async fn ingest_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestionAccepted>), ApiError> {
    // Parsed by hand so that malformed JSON is reported like any other
    // format error
    let batch: Vec<PropertyInput> =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidFormat(e.to_string()))?;
    let feeds = IngestionPipeline::validate(batch)?;

    let mut job_ids = Vec::with_capacity(feeds.len());
    for feed in feeds {
        let job_id = state
            .jobs
            .enqueue(Job::IngestProperty {
                owner: user.user_id,
                feed,
            })
            .await?;
        job_ids.push(job_id);
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestionAccepted {
            message: "Availability ingestion initiated successfully.".to_string(),
            job_ids,
        }),
    ))
}
