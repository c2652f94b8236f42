//! Background job queue.
//!
//! Jobs are recorded in the registry and their ids sent over a bounded
//! channel to a fixed pool of workers. Transient failures are retried with
//! exponential backoff; a job that still fails afterwards is dead-lettered
//! with its payload kept for `replay`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bookings::BookingLifecycleManager;
use crate::config::JobSettings;
use crate::error::ApiError;
use crate::ingestion::IngestionPipeline;
use crate::jobs::models::{Job, JobOutcome, JobStatus};
use crate::jobs::registry::JobRegistry;

/// Executes one job attempt
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<JobOutcome, ApiError>;
}

/// Dispatches jobs to the booking manager and the ingestion pipeline
pub struct JobExecutor {
    bookings: Arc<BookingLifecycleManager>,
    ingestion: Arc<IngestionPipeline>,
}

impl JobExecutor {
    pub fn new(bookings: Arc<BookingLifecycleManager>, ingestion: Arc<IngestionPipeline>) -> Self {
        Self {
            bookings,
            ingestion,
        }
    }
}

#[async_trait]
impl JobHandler for JobExecutor {
    async fn handle(&self, job: &Job) -> Result<JobOutcome, ApiError> {
        match job {
            Job::CreateBooking { user, request } => self
                .bookings
                .create(request.clone(), user)
                .await
                .map(JobOutcome::Booking),
            Job::UpdateBooking {
                user,
                booking_id,
                request,
            } => self
                .bookings
                .update(*booking_id, request.clone(), user)
                .await
                .map(JobOutcome::Booking),
            Job::CancelBooking { user, booking_id } => self
                .bookings
                .cancel(*booking_id, user)
                .await
                .map(JobOutcome::Booking),
            Job::IngestProperty { feed, .. } => self
                .ingestion
                .ingest_property(feed)
                .await
                .map(JobOutcome::Ingested),
        }
    }
}

/// Backoff between attempts: `base * 2^(attempt-1)`
fn backoff(settings: &JobSettings) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(settings.retry_base)
        .with_max_delay(settings.retry_base * 32)
        .with_factor(2.0)
        .with_max_times(settings.max_attempts.saturating_sub(1) as usize)
}

#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Uuid>,
    registry: Arc<JobRegistry>,
}

impl JobQueue {
    /// Spawn the worker pool and return a handle for enqueueing
    pub fn start(
        handler: Arc<dyn JobHandler>,
        registry: Arc<JobRegistry>,
        settings: JobSettings,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        for worker in 0..settings.workers {
            let receiver = receiver.clone();
            let handler = handler.clone();
            let registry = registry.clone();
            let settings = settings.clone();
            tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(id) = next else {
                        debug!("Job worker {} stopping", worker);
                        break;
                    };
                    process(id, handler.as_ref(), &registry, &settings).await;
                }
            });
        }

        info!("Started {} job workers", settings.workers);
        Self { sender, registry }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Record a job and hand it to the workers
    pub async fn enqueue(&self, job: Job) -> Result<Uuid, ApiError> {
        let kind = job.kind();
        let id = self.registry.register(job).await;
        self.dispatch(id).await?;
        debug!("Queued {} job {}", kind, id);
        Ok(id)
    }

    /// Run a dead-lettered job again with a fresh retry budget
    pub async fn replay(&self, id: Uuid) -> Result<(), ApiError> {
        if !self.registry.requeue(id).await {
            return Err(ApiError::InvalidState(format!(
                "Job {} is not dead-lettered",
                id
            )));
        }
        info!("Replaying job {}", id);
        self.dispatch(id).await
    }

    async fn dispatch(&self, id: Uuid) -> Result<(), ApiError> {
        self.sender
            .send(id)
            .await
            .map_err(|_| ApiError::InternalError("Job queue is closed".to_string()))
    }
}

async fn process(id: Uuid, handler: &dyn JobHandler, registry: &JobRegistry, settings: &JobSettings) {
    let Some(record) = registry.get(id).await else {
        warn!("Job {} vanished before processing", id);
        return;
    };
    registry.update(id, JobStatus::Processing, 0).await;

    let attempts = AtomicU32::new(0);
    let job = &record.job;
    let counter = &attempts;

    let result = (|| async move {
        counter.fetch_add(1, Ordering::SeqCst);
        handler.handle(job).await
    })
    .retry(backoff(settings))
    .when(ApiError::is_transient)
    .notify(|err: &ApiError, delay: Duration| {
        warn!(job = %id, error = %err, delay = ?delay, "Job attempt failed, retrying");
    })
    .await;

    let attempts = attempts.load(Ordering::SeqCst);
    let status = match result {
        Ok(outcome) => {
            info!("Job {} ({}) succeeded after {} attempt(s)", id, record.kind, attempts);
            JobStatus::Succeeded {
                booking_id: outcome.booking_id(),
            }
        }
        Err(e) if e.is_transient() => {
            let payload = serde_json::to_string(&record.job).unwrap_or_default();
            error!(
                "Job {} ({}) dead-lettered after {} attempts: {}; payload {}",
                id, record.kind, attempts, e, payload
            );
            JobStatus::DeadLettered {
                error: e.to_string(),
                attempts,
            }
        }
        Err(e) => {
            warn!("Job {} ({}) failed: {}", id, record.kind, e);
            JobStatus::Failed {
                error: e.to_string(),
            }
        }
    };
    registry.update(id, status, attempts).await;
}

/// Poll until a job finishes, for tests
#[cfg(test)]
pub async fn wait_for(registry: &JobRegistry, id: Uuid) -> JobStatus {
    for _ in 0..200 {
        if let Some(record) = registry.get(id).await {
            if record.status.is_finished() {
                return record.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", id);
}
