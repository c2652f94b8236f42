use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::jobs::models::{Job, JobRecord, JobStatus};

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Status records of accepted jobs
///
/// Succeeded and failed records are dropped once they have been finished
/// for longer than the retention. Queued, processing and dead-lettered
/// records are kept.
pub struct JobRegistry {
    records: RwLock<HashMap<Uuid, JobRecord>>,
    retention: Duration,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

fn expired(record: &JobRecord, now: DateTime<Utc>, retention: Duration) -> bool {
    let settled = matches!(
        record.status,
        JobStatus::Succeeded { .. } | JobStatus::Failed { .. }
    );
    settled
        && (now - record.updated_at)
            .to_std()
            .map_or(false, |age| age >= retention)
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Record a new job as queued, dropping expired records first
    pub async fn register(&self, job: Job) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let record = JobRecord {
            id,
            kind: job.kind(),
            owner: job.owner(),
            status: JobStatus::Queued,
            attempts: 0,
            created_at: now,
            updated_at: now,
            job,
        };
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, existing| !expired(existing, now, self.retention));
        if records.len() < before {
            debug!("Dropped {} expired job records", before - records.len());
        }
        records.insert(id, record);
        id
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn update(&self, id: Uuid, status: JobStatus, attempts: u32) {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            record.status = status;
            record.attempts = attempts;
            record.updated_at = Utc::now();
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.records.read().await.get(&id).cloned()
    }

    /// Record for `id`, only if `owner` submitted it
    pub async fn get_for_owner(&self, id: Uuid, owner: i32) -> Option<JobRecord> {
        self.get(id).await.filter(|record| record.owner == owner)
    }

    pub async fn dead_letters(&self) -> Vec<JobRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|record| matches!(record.status, JobStatus::DeadLettered { .. }))
            .cloned()
            .collect()
    }

    /// Dead letters submitted by `owner`, oldest first
    pub async fn dead_letters_for_owner(&self, owner: i32) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .dead_letters()
            .await
            .into_iter()
            .filter(|record| record.owner == owner)
            .collect();
        records.sort_by_key(|record| record.created_at);
        records
    }

    /// Move a dead-lettered job back to queued
    ///
    /// Returns false if the job is unknown or not dead-lettered.
    pub async fn requeue(&self, id: Uuid) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if matches!(record.status, JobStatus::DeadLettered { .. }) => {
                record.status = JobStatus::Queued;
                record.attempts = 0;
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}
