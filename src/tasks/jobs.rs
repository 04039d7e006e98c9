use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::redis::RedisHandle;
use crate::errors::{GradingError, GradingResult};

/// Work deferred to the background worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GradingJob {
    BulkReleaseGrades {
        submission_ids: Vec<String>,
        performer_id: String,
    },
    BulkApplyFeedback {
        submission_ids: Vec<String>,
        feedback: String,
        performer_id: String,
    },
}

impl GradingJob {
    pub fn name(&self) -> &'static str {
        match self {
            GradingJob::BulkReleaseGrades { .. } => "bulk_release_grades",
            GradingJob::BulkApplyFeedback { .. } => "bulk_apply_feedback",
        }
    }

    pub fn submission_count(&self) -> usize {
        match self {
            GradingJob::BulkReleaseGrades { submission_ids, .. }
            | GradingJob::BulkApplyFeedback { submission_ids, .. } => submission_ids.len(),
        }
    }
}

/// Enqueues jobs without waiting for them to run.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn dispatch(&self, job: GradingJob) -> GradingResult<()>;
}

/// Jobs as JSON on a Redis list, consumed oldest first.
#[derive(Clone)]
pub struct RedisJobQueue {
    redis: RedisHandle,
    key: String,
}

impl RedisJobQueue {
    pub fn new(redis: RedisHandle, key: impl Into<String>) -> Self {
        Self { redis, key: key.into() }
    }

    /// Takes the next job, if any. Payloads that fail to decode are dropped.
    pub async fn next(&self) -> anyhow::Result<Option<GradingJob>> {
        let Some(payload) = self.redis.pop(&self.key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(job) => Ok(Some(job)),
            Err(err) => {
                tracing::error!(queue = %self.key, error = %err, "Dropping undecodable grading job");
                metrics::counter!("grading_jobs_total", "status" => "undecodable").increment(1);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn dispatch(&self, job: GradingJob) -> GradingResult<()> {
        let payload = serde_json::to_string(&job)
            .map_err(|e| GradingError::internal(e, "Failed to encode grading job"))?;
        self.redis
            .push(&self.key, &payload)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to enqueue grading job"))?;

        tracing::info!(job = job.name(), submissions = job.submission_count(), "Grading job queued");
        metrics::counter!("grading_jobs_total", "status" => "queued").increment(1);
        Ok(())
    }
}

/// Keeps dispatched jobs in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingJobQueue {
    jobs: Arc<Mutex<Vec<GradingJob>>>,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<GradingJob> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for RecordingJobQueue {
    async fn dispatch(&self, job: GradingJob) -> GradingResult<()> {
        self.jobs
            .lock()
            .map_err(|e| GradingError::internal(e, "Job recorder lock poisoned"))?
            .push(job);
        Ok(())
    }
}
