// HTTP handlers for job status endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ErrorResponse};
use crate::jobs::models::{JobAccepted, JobRecord};

/// Handler for GET /api/jobs/{job_id}
/// Reports the processing state of a queued mutation; other users' jobs are 404
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job status", body = JobRecord),
        (status = 404, description = "No such job for the caller", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "jobs"
)]
pub async fn get_job_status_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobRecord>, ApiError> {
    state
        .jobs
        .registry()
        .get_for_owner(job_id, user.user_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job", job_id))
}

/// Handler for GET /api/jobs/dead-letters
/// Lists the caller's jobs that ran out of retries
#[utoipa::path(
    get,
    path = "/api/jobs/dead-letters",
    responses(
        (status = 200, description = "Dead-lettered jobs of the caller", body = Vec<JobRecord>)
    ),
    security(("bearer_auth" = [])),
    tag = "jobs"
)]
pub async fn list_dead_letters_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
) -> Json<Vec<JobRecord>> {
    Json(
        state
            .jobs
            .registry()
            .dead_letters_for_owner(user.user_id)
            .await,
    )
}

/// Handler for POST /api/jobs/{job_id}/replay
/// Queues one of the caller's dead letters again
#[utoipa::path(
    post,
    path = "/api/jobs/{id}/replay",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 202, description = "Job queued again", body = JobAccepted),
        (status = 404, description = "No such job for the caller", body = ErrorResponse),
        (status = 409, description = "Job is not dead-lettered", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "jobs"
)]
pub async fn replay_job_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(job_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    if state
        .jobs
        .registry()
        .get_for_owner(job_id, user.user_id)
        .await
        .is_none()
    {
        return Err(ApiError::not_found("Job", job_id));
    }

    state.jobs.replay(job_id).await?;
    info!("User {} replayed job {}", user.user_id, job_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            message: "Job has been queued again.".to_string(),
            job_id,
            status_url: format!("/api/jobs/{}", job_id),
        }),
    ))
}
