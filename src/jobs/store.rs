//! The single synchronization point for job state.
//!
//! Workers and pollers only ever touch jobs through [`JobStore`]; each
//! operation takes the lock once, so no reader observes a half-applied
//! transition.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::job::{Job, JobId, JobOutcome, JobRequest, JobSnapshot, JobState};
use crate::error::{Result, VoxError};

/// A forward move in a job's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// A worker picked the job up.
    Processing,
    /// The adapter finished, successfully or not.
    Finished(JobOutcome),
}

impl JobUpdate {
    fn target(&self) -> JobState {
        match self {
            JobUpdate::Processing => JobState::Processing,
            JobUpdate::Finished(outcome) => outcome.state(),
        }
    }
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new Pending job and return its id.
    pub fn create(&self, payload: JobRequest) -> JobId {
        self.insert(Job::new(payload))
    }

    /// Register a Pending job under an id reserved with [`JobId::new`].
    pub fn create_with_id(&self, id: JobId, payload: JobRequest) -> JobId {
        self.insert(Job::with_id(id, payload))
    }

    fn insert(&self, job: Job) -> JobId {
        let id = job.id.clone();
        debug!(job_id = %id, kind = %job.kind, "job created");
        self.jobs.lock().insert(id.clone(), job);
        id
    }

    /// Apply `update`, rejecting anything that would not move the job forward.
    pub fn transition(&self, id: &JobId, update: JobUpdate) -> Result<JobState> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| VoxError::JobNotFound(id.to_string()))?;

        let to = update.target();
        if to.rank() <= job.state.rank() {
            return Err(VoxError::InvalidTransition {
                id: id.to_string(),
                from: job.state,
                to,
            });
        }

        debug!(job_id = %id, from = %job.state, %to, "job transition");
        job.state = to;
        job.updated_at = Utc::now();
        if let JobUpdate::Finished(outcome) = update {
            job.outcome = Some(outcome);
        }
        Ok(to)
    }

    pub fn mark_processing(&self, id: &JobId) -> Result<JobState> {
        self.transition(id, JobUpdate::Processing)
    }

    pub fn finish(&self, id: &JobId, outcome: JobOutcome) -> Result<JobState> {
        self.transition(id, JobUpdate::Finished(outcome))
    }

    /// Return the job's current view. A terminal job is removed in the same
    /// critical section, so it is delivered at most once; later calls, like
    /// calls for ids that never existed, get `JobNotFound`.
    pub fn read_and_consume(&self, id: &JobId) -> Result<JobSnapshot> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get(id)
            .ok_or_else(|| VoxError::JobNotFound(id.to_string()))?;

        if !job.state.is_terminal() {
            return Ok(JobSnapshot::from(job));
        }

        let snapshot = JobSnapshot::from(job);
        jobs.remove(id);
        debug!(job_id = %id, status = %snapshot.status, "job consumed");
        Ok(snapshot)
    }

    /// Forget a job whatever its state. Used when a job could not be queued
    /// and its id never reached a caller.
    pub fn remove(&self, id: &JobId) -> bool {
        let removed = self.jobs.lock().remove(id).is_some();
        if removed {
            debug!(job_id = %id, "job removed");
        }
        removed
    }

    /// Drop terminal jobs nobody polled within `ttl`. Returns how many went.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| !(job.state.is_terminal() && job.updated_at <= cutoff));
        let removed = before - jobs.len();
        if removed > 0 {
            info!(removed, "swept expired jobs");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}
