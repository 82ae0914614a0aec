// crates/jobs/src/registry.rs
//! In-memory store of flash jobs, the single serialization point for
//! all job-state mutation.
//!
//! Every write goes through `update_job`, which publishes the new
//! state through the coalescing publisher. Jobs live for the process
//! lifetime; there is no eviction.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use ulid::Ulid;

use txflash_types::{FlashJob, JobId, StageUpdate};

use crate::publisher::CoalescingPublisher;

/// Owns all job state and the notification channel.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, FlashJob>>,
    publisher: CoalescingPublisher,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_publisher(CoalescingPublisher::new())
    }

    pub fn with_publisher(publisher: CoalescingPublisher) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            publisher,
        }
    }

    /// Allocate a fresh job with every named stage in its default
    /// state, store it, and return it.
    pub fn create_job(&self, stage_names: &[&str]) -> FlashJob {
        let id = Ulid::new().to_string();
        let job = FlashJob::new(id.clone(), stage_names);
        self.write_jobs().insert(id, job.clone());
        tracing::debug!(job_id = %job.id, stages = stage_names.len(), "flash job created");
        job
    }

    /// Snapshot of one job, if it exists.
    pub fn get_job(&self, job_id: &JobId) -> Option<FlashJob> {
        self.read_jobs().get(job_id).cloned()
    }

    /// Replace the stored job wholesale and publish the new state.
    ///
    /// Updates for unknown job ids are rejected: the registry never
    /// resurrects a job it did not create.
    pub fn update_job(&self, job_id: &JobId, updated: FlashJob) {
        {
            let mut jobs = self.write_jobs();
            match jobs.get_mut(job_id) {
                Some(slot) => *slot = updated.clone(),
                None => {
                    tracing::warn!(job_id = %job_id, "update for unknown job id rejected");
                    return;
                }
            }
        }
        self.publisher.publish(job_id, updated);
    }

    /// Merge a partial update into one stage and publish.
    ///
    /// Silent no-op when the job does not exist. The stage-key set is
    /// fixed at creation, so an unknown stage name is also a no-op.
    /// The merge happens under the write lock so concurrent stage
    /// updates cannot lose each other's writes.
    pub fn update_stage(&self, job_id: &JobId, stage_name: &str, update: StageUpdate) {
        let published = {
            let mut jobs = self.write_jobs();
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            let Some(stage) = job.stages.get_mut(stage_name) else {
                tracing::warn!(job_id = %job_id, stage = stage_name, "unknown stage name ignored");
                return;
            };
            stage.apply(update);
            job.clone()
        };
        self.publisher.publish(job_id, published);
    }

    /// Mark the job cancelled and publish. Idempotent; `cancelled`
    /// never resets.
    pub fn cancel_job(&self, job_id: &JobId) {
        let published = {
            let mut jobs = self.write_jobs();
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            job.cancelled = true;
            job.clone()
        };
        tracing::debug!(job_id = %job_id, "flash job cancelled");
        self.publisher.publish(job_id, published);
    }

    /// Record a failure that cannot be attributed to any stage.
    pub fn record_internal_error(&self, job_id: &JobId, message: impl Into<String>) {
        let published = {
            let mut jobs = self.write_jobs();
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            job.error = Some(message.into());
            job.clone()
        };
        self.publisher.publish(job_id, published);
    }

    /// Subscribe to debounced state updates for one job id.
    pub fn subscribe(&self, job_id: &JobId) -> broadcast::Receiver<FlashJob> {
        self.publisher.subscribe(job_id)
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<JobId, FlashJob>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("jobs map lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<JobId, FlashJob>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("jobs map lock poisoned");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
