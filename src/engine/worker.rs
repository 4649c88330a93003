//! Background model training
//!
//! Jobs run on spawned tasks, at most `max_concurrent` at a time. Each job
//! can be awaited through its oneshot receiver or polled by id. Finished
//! jobs are evicted once they outlive the retention window or the table
//! is full.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::IrrigationEngine;
use crate::error::{IrrigationError, IrrigationResult};
use crate::ml::ModelMetadata;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded { metadata: ModelMetadata },
    Failed { kind: String, error: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingJob {
    pub id: Uuid,
    pub device_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub status: JobStatus,
}

pub struct JobHandle {
    pub job_id: Uuid,
    pub completion: oneshot::Receiver<IrrigationResult<ModelMetadata>>,
}

/// How long finished jobs stay pollable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRetention {
    pub ttl: Duration,
    /// Table size at which the oldest finished jobs are dropped early
    pub max_jobs: usize,
}

impl Default for JobRetention {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_jobs: 1000,
        }
    }
}

type JobTable = Arc<RwLock<HashMap<Uuid, TrainingJob>>>;

#[derive(Clone)]
pub struct TrainingWorker {
    engine: Arc<IrrigationEngine>,
    permits: Arc<Semaphore>,
    jobs: JobTable,
    retention: JobRetention,
}

impl TrainingWorker {
    pub fn new(engine: Arc<IrrigationEngine>, max_concurrent: usize, retention: JobRetention) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// Queues a training run for the device. Must be called within a tokio
    /// runtime.
    pub fn submit(&self, device_id: Uuid) -> JobHandle {
        let job_id = Uuid::new_v4();
        let now = Utc::now();
        {
            let mut jobs = self.jobs.write();
            evict_finished(&mut jobs, &self.retention, now);
            jobs.insert(
                job_id,
                TrainingJob {
                    id: job_id,
                    device_id,
                    submitted_at: now,
                    updated_at: now,
                    status: JobStatus::Queued,
                },
            );
        }

        let (tx, rx) = oneshot::channel();
        let engine = Arc::clone(&self.engine);
        let permits = Arc::clone(&self.permits);
        let jobs = Arc::clone(&self.jobs);

        tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => {
                    set_status(&jobs, job_id, JobStatus::Running);
                    engine.train_model(device_id).await
                }
                Err(_) => Err(IrrigationError::Model("training worker is shut down".into())),
            };

            let status = match &result {
                Ok(metadata) => {
                    info!(%job_id, %device_id, model_id = %metadata.model_id, "training job succeeded");
                    JobStatus::Succeeded {
                        metadata: metadata.clone(),
                    }
                }
                Err(e) => {
                    warn!(%job_id, %device_id, kind = e.kind(), error = %e, "training job failed");
                    JobStatus::Failed {
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                    }
                }
            };
            set_status(&jobs, job_id, status);

            // the submitter may have dropped the receiver
            let _ = tx.send(result);
        });

        JobHandle {
            job_id,
            completion: rx,
        }
    }

    pub fn status(&self, job_id: Uuid) -> Option<TrainingJob> {
        self.jobs.read().get(&job_id).cloned()
    }

    pub fn tracked_jobs(&self) -> usize {
        self.jobs.read().len()
    }
}

/// Drops finished jobs past the ttl, then the oldest finished ones until a
/// new job fits under `max_jobs`. Queued and running jobs are never dropped.
fn evict_finished(jobs: &mut HashMap<Uuid, TrainingJob>, retention: &JobRetention, now: DateTime<Utc>) {
    let before = jobs.len();
    jobs.retain(|_, job| {
        let expired = (now - job.updated_at)
            .to_std()
            .map_or(false, |age| age > retention.ttl);
        !(job.status.is_finished() && expired)
    });

    if jobs.len() >= retention.max_jobs {
        let mut finished: Vec<(DateTime<Utc>, Uuid)> = jobs
            .values()
            .filter(|job| job.status.is_finished())
            .map(|job| (job.updated_at, job.id))
            .collect();
        finished.sort_unstable();
        let excess = jobs.len() + 1 - retention.max_jobs.max(1);
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }

    let evicted = before - jobs.len();
    if evicted > 0 {
        debug!(evicted, remaining = jobs.len(), "finished training jobs evicted");
    }
}

fn set_status(jobs: &JobTable, job_id: Uuid, status: JobStatus) {
    if let Some(job) = jobs.write().get_mut(&job_id) {
        job.status = status;
        job.updated_at = Utc::now();
    }
}
