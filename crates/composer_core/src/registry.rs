use std::collections::VecDeque;

use engine_logging::{engine_debug, engine_info, engine_warn};
use thiserror::Error;
use url::Url;

use crate::config::AttemptCeilings;
use crate::job::{
    FailureReason, Job, JobId, JobOutcome, JobSpec, JobStatus, PollTarget,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("invalid job spec: {0}")]
    InvalidJobSpec(String),
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("job {0} already resolved with a different outcome")]
    JobAlreadyResolved(JobId),
}

/// Result of a `mark_resolved` call that did not conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    /// Same outcome was already recorded; nothing changed.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    WithinBudget,
    CeilingExceeded,
}

/// Canonical list of in-flight jobs, kept in insertion order.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    jobs: Vec<Job>,
    history: VecDeque<Job>,
    history_capacity: usize,
    ceilings: AttemptCeilings,
}

impl JobRegistry {
    pub fn new(ceilings: AttemptCeilings, history_capacity: usize) -> Self {
        Self {
            jobs: Vec::new(),
            history: VecDeque::new(),
            history_capacity,
            ceilings,
        }
    }

    /// Registers a job. A job with the same dedup key still in the registry
    /// is returned instead of creating a second one.
    pub fn enqueue(&mut self, spec: JobSpec, now_ms: u64) -> Result<JobId, JobError> {
        validate(&spec)?;
        if let Some(existing) = self.jobs.iter().find(|job| job.dedup_key == spec.dedup_key) {
            engine_debug!(
                "enqueue collapsed onto existing job {} key={}",
                existing.id,
                spec.dedup_key
            );
            return Ok(existing.id.clone());
        }

        let mut id = JobId::generate(now_ms);
        while self.contains(&id) {
            id = JobId::generate(now_ms);
        }
        engine_info!(
            "enqueue job={} provider={} kind={} task={:?}",
            id,
            spec.provider,
            spec.kind,
            spec.remote_task_id
        );
        self.jobs.push(Job {
            id: id.clone(),
            provider: spec.provider,
            kind: spec.kind,
            remote_task_id: spec.remote_task_id,
            result_url: spec.result_url,
            status: JobStatus::Queued,
            attempts: 0,
            insertion_intent: spec.insertion_intent,
            dedup_key: spec.dedup_key,
            created_at_ms: now_ms,
            last_polled_at_ms: None,
            failure: None,
            applied: false,
        });
        Ok(id)
    }

    pub fn list_pending(&self) -> Vec<&Job> {
        self.jobs.iter().filter(|job| !job.is_resolved()).collect()
    }

    pub fn poll_targets(&self) -> Vec<PollTarget> {
        self.list_pending()
            .into_iter()
            .map(|job| PollTarget {
                job_id: job.id.clone(),
                provider: job.provider,
                remote_task_id: job.remote_task_id.clone(),
                result_url: job.result_url.clone(),
                last_polled_at_ms: job.last_polled_at_ms,
            })
            .collect()
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.id == id)
    }

    /// Looks a job up in the live list first, then in the resolved history.
    pub fn find(&self, id: &JobId) -> Option<&Job> {
        self.get(id)
            .or_else(|| self.history.iter().find(|job| &job.id == id))
    }

    pub fn position(&self, id: &JobId) -> Option<usize> {
        self.jobs.iter().position(|job| &job.id == id)
    }

    fn contains(&self, id: &JobId) -> bool {
        self.find(id).is_some()
    }

    /// Counts one poll of a pending job and reports whether it ran past its ceiling.
    pub fn record_attempt(&mut self, id: &JobId, now_ms: u64) -> Result<AttemptVerdict, JobError> {
        let ceilings = self.ceilings;
        let job = self
            .jobs
            .iter_mut()
            .find(|job| &job.id == id)
            .ok_or_else(|| JobError::UnknownJob(id.clone()))?;
        if job.is_resolved() {
            return Err(JobError::JobAlreadyResolved(id.clone()));
        }
        advance(job, JobStatus::Polling);
        job.attempts = job.attempts.saturating_add(1);
        job.last_polled_at_ms = Some(now_ms);
        if job.attempts > ceilings.for_kind(job.kind) {
            Ok(AttemptVerdict::CeilingExceeded)
        } else {
            Ok(AttemptVerdict::WithinBudget)
        }
    }

    /// Single entry point for resolving a job; idempotent for a repeated outcome.
    pub fn mark_resolved(&mut self, id: &JobId, outcome: JobOutcome) -> Result<Resolution, JobError> {
        if let Some(job) = self.jobs.iter_mut().find(|job| &job.id == id) {
            if job.is_resolved() {
                return same_or_conflict(job, &outcome);
            }
            match outcome {
                JobOutcome::Succeeded { url } => {
                    job.result_url = Some(url);
                    advance(job, JobStatus::Completed);
                }
                JobOutcome::Failed { reason } => {
                    job.failure = Some(reason);
                    advance(job, JobStatus::Failed);
                }
            }
            engine_info!(
                "job {} resolved status={:?} attempts={}",
                job.id,
                job.status,
                job.attempts
            );
            return Ok(Resolution::Resolved);
        }

        match self.history.iter().find(|job| &job.id == id) {
            Some(job) => same_or_conflict(job, &outcome),
            None => Err(JobError::UnknownJob(id.clone())),
        }
    }

    pub fn mark_applied(&mut self, id: &JobId) {
        if let Some(job) = self.jobs.iter_mut().find(|job| &job.id == id) {
            job.applied = true;
        }
    }

    /// Moves resolved and applied jobs into the bounded history.
    pub fn sweep_resolved(&mut self) -> Vec<JobId> {
        let (done, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.jobs)
            .into_iter()
            .partition(|job| job.is_resolved() && job.applied);
        self.jobs = live;
        let swept = done.iter().map(|job| job.id.clone()).collect::<Vec<_>>();
        for job in done {
            self.history.push_back(job);
        }
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
        swept
    }

    pub fn history(&self) -> impl Iterator<Item = &Job> {
        self.history.iter()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drops every job; used when the orchestrator is disposed.
    pub fn clear(&mut self) {
        self.jobs.clear();
        self.history.clear();
    }
}

fn validate(spec: &JobSpec) -> Result<(), JobError> {
    if spec.provider.kind() != spec.kind {
        return Err(JobError::InvalidJobSpec(format!(
            "{} does not produce {} assets",
            spec.provider, spec.kind
        )));
    }
    let has_task = spec
        .remote_task_id
        .as_deref()
        .is_some_and(|task| !task.trim().is_empty());
    let url = spec.result_url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    if let Some(url) = url {
        Url::parse(url)
            .map_err(|err| JobError::InvalidJobSpec(format!("bad result url {url:?}: {err}")))?;
    }
    if !has_task && url.is_none() {
        return Err(JobError::InvalidJobSpec(
            "either a remote task id or a result url is required".to_string(),
        ));
    }
    Ok(())
}

fn advance(job: &mut Job, next: JobStatus) {
    if next.rank() > job.status.rank() {
        job.status = next;
    }
}

fn same_or_conflict(job: &Job, outcome: &JobOutcome) -> Result<Resolution, JobError> {
    if job.outcome().as_ref() == Some(outcome) {
        Ok(Resolution::Unchanged)
    } else {
        engine_warn!("job {} already resolved; conflicting outcome ignored", job.id);
        Err(JobError::JobAlreadyResolved(job.id.clone()))
    }
}

/// Outcome forced on jobs that ran out of attempts.
pub fn timeout_outcome() -> JobOutcome {
    JobOutcome::Failed {
        reason: FailureReason::Timeout,
    }
}
