//! Remote job status and the fixed-interval poll loop.
//!
//! A submitted job moves `Submitted -> InProgress -> {Completed | Failed | Stopped}`.
//! `InProgress` is the only non-terminal status the service reports. The poll
//! loop checks status, sleeps one interval, and repeats until the status is
//! terminal. The attempt ceiling, the wall-clock wait budget and the
//! cancellation token are optional.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PollConfig;
use crate::errors::PipelineError;
use crate::transport::ObjectUri;
use crate::types::JobName;

/// Status reported by the remote service for a training or transform job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Still running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped before completion.
    Stopped,
}

impl JobStatus {
    /// True for every status except `InProgress`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::InProgress => "InProgress",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Stopped => "Stopped",
        };
        f.write_str(label)
    }
}

/// Snapshot returned by a status query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    /// Job identity.
    pub job_name: JobName,
    /// Current status.
    pub status: JobStatus,
    /// Service-provided reason for `Failed`/`Stopped`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Where the job writes its result (model artifacts or predictions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ObjectUri>,
    /// Submission time, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Completion time, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobDescription {
    /// Minimal description with only a name and status.
    pub fn new(job_name: impl Into<JobName>, status: JobStatus) -> Self {
        Self {
            job_name: job_name.into(),
            status,
            failure_reason: None,
            output: None,
            created_at: None,
            ended_at: None,
        }
    }

    /// Return `self` if the job completed; otherwise a `RemoteJob` error with the status detail.
    pub fn into_completed(self) -> Result<JobDescription, PipelineError> {
        match self.status {
            JobStatus::Completed => Ok(self),
            status => Err(PipelineError::RemoteJob {
                job_name: self.job_name,
                status,
                detail: self
                    .failure_reason
                    .unwrap_or_else(|| "no failure reason reported".to_string()),
            }),
        }
    }
}

/// Longest job name the remote service accepts.
pub const MAX_JOB_NAME_LEN: usize = 63;

/// Build `<prefix>-<kind>-<UTC timestamp>`, keeping only characters the service accepts.
pub fn job_name(prefix: &str, kind: &str, at: DateTime<Utc>) -> JobName {
    let stamp = at.format("%Y%m%dT%H%M%SZ").to_string();
    let head: String = format!("{prefix}-{kind}")
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect();
    let head = head.trim_matches('-');
    let room = MAX_JOB_NAME_LEN - stamp.len() - 1;
    let head = &head[..head.len().min(room)];
    format!("{}-{stamp}", head.trim_end_matches('-'))
}

/// Blocking delay between status checks, plus the clock the wait budget is measured on.
pub trait Sleeper {
    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Current instant.
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// `Sleeper` backed by `std::thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Cooperative cancellation flag checked before every status query.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; observed at the next check.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once `cancel` has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Fixed-interval poll loop.
#[derive(Clone, Debug)]
pub struct Poller<S = ThreadSleeper> {
    config: PollConfig,
    sleeper: S,
    cancel: Option<CancelToken>,
}

impl Poller<ThreadSleeper> {
    /// Poller that really sleeps between checks.
    pub fn new(config: PollConfig) -> Self {
        Self::with_sleeper(config, ThreadSleeper)
    }
}

impl<S: Sleeper> Poller<S> {
    /// Poller with a custom sleeper.
    pub fn with_sleeper(config: PollConfig, sleeper: S) -> Self {
        Self {
            config,
            sleeper,
            cancel: None,
        }
    }

    /// Attach a cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Poll policy.
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Query `describe` until the job leaves `InProgress`, sleeping one interval between checks.
    ///
    /// Returns the first terminal description whatever its status; callers
    /// decide whether `Failed`/`Stopped` is fatal. Errors from `describe`
    /// abort the loop immediately. The wait budget counts time spent inside
    /// `describe` as well as time asleep.
    pub fn wait_for<F>(&self, job_name: &str, mut describe: F) -> Result<JobDescription, PipelineError>
    where
        F: FnMut(&str) -> Result<JobDescription, PipelineError>,
    {
        let interval = self.config.interval();
        let budget = self.config.timeout();
        let started = self.sleeper.now();
        let mut attempts = 0usize;
        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                warn!("[ltv:poll] job '{}' cancelled after {} checks", job_name, attempts);
                return Err(PipelineError::Cancelled {
                    job_name: job_name.to_string(),
                });
            }
            attempts += 1;
            let description = describe(job_name)?;
            info!(
                "[ltv:poll] job '{}' check {} status={}",
                job_name, attempts, description.status
            );
            if description.status.is_terminal() {
                return Ok(description);
            }
            if self
                .config
                .max_attempts
                .is_some_and(|max_attempts| attempts >= max_attempts)
            {
                warn!(
                    "[ltv:poll] job '{}' still InProgress after {} checks; giving up",
                    job_name, attempts
                );
                return Err(PipelineError::PollTimeout {
                    job_name: job_name.to_string(),
                    attempts,
                });
            }
            let elapsed = self.sleeper.now().saturating_duration_since(started);
            if budget.is_some_and(|budget| elapsed + interval > budget) {
                warn!(
                    "[ltv:poll] job '{}' exceeded its {:?} wait budget after {:?}",
                    job_name, budget, elapsed
                );
                return Err(PipelineError::PollTimeout {
                    job_name: job_name.to_string(),
                    attempts,
                });
            }
            self.sleeper.sleep(interval);
        }
    }
}
