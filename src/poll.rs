//! Waiting on server-side jobs.
//!
//! App installation and content import start a job on the remote side and
//! hand back its id. [`poll_job`] checks the job status at a fixed interval
//! until it leaves `InProgress`, bounded by [`PollOptions::max_attempts`].
//!
//! Time is injected through [`Sleeper`] and [`Clock`] so tests run without
//! real delays.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::config::PollOptions;
use crate::error::ResourceError;

/// Status of a server-side job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    InProgress,
    Success,
    Failed,
}

impl JobStatus {
    /// Whether the job has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// A job status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl JobStatusReport {
    pub fn in_progress() -> Self {
        Self {
            status: JobStatus::InProgress,
            status_message: None,
            error: None,
        }
    }

    pub fn success(status_message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Success,
            status_message: Some(status_message.into()),
            error: None,
        }
    }

    pub fn failed(status_message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            status_message: Some(status_message.into()),
            error: None,
        }
    }

    fn failure_message(&self) -> String {
        if let Some(message) = &self.status_message {
            return message.clone();
        }
        match &self.error {
            Some(error) => error.to_string(),
            None => "no status message".to_string(),
        }
    }
}

/// Blocks the current task for a while.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Poll `check` until the job reaches a terminal status.
///
/// Sleeps `options.interval` between checks, never after the last one.
/// Returns the `Success` report, fails with [`ResourceError::JobFailed`] on
/// `Failed`, with [`ResourceError::PollTimeout`] once `options.max_attempts`
/// checks have all come back `InProgress`, and propagates any transport error
/// from `check` unchanged.
pub async fn poll_job<F, Fut>(
    job_id: &str,
    options: &PollOptions,
    sleeper: &dyn Sleeper,
    mut check: F,
) -> Result<JobStatusReport, ResourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<JobStatusReport, ApiError>>,
{
    let max_attempts = options.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let report = check().await?;
        debug!(job_id, attempt, status = ?report.status, "Polled job status");

        match report.status {
            JobStatus::InProgress => {
                if attempt < max_attempts {
                    sleeper.sleep(options.interval).await;
                }
            },
            JobStatus::Success => {
                info!(job_id, attempts = attempt, "Job completed");
                return Ok(report);
            },
            JobStatus::Failed => {
                let status_message = report.failure_message();
                warn!(job_id, %status_message, "Job failed");
                return Err(ResourceError::JobFailed {
                    job_id: job_id.to_string(),
                    status_message,
                });
            },
        }
    }

    Err(ResourceError::PollTimeout {
        job_id: job_id.to_string(),
        attempts: max_attempts,
    })
}

/// Extract the created folder id from a successful install's status message.
///
/// The message has the form `"<text>:<folder id>"`; the id is the second
/// `:`-separated segment, trimmed.
pub fn decode_folder_id(report: &JobStatusReport) -> Result<String, ResourceError> {
    let message = report.status_message.as_deref().ok_or_else(|| {
        ResourceError::Decode("install status has no status message".to_string())
    })?;

    match message.split(':').nth(1).map(str::trim) {
        Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) => {
            Ok(id.to_string())
        },
        _ => Err(ResourceError::Decode(format!(
            "cannot find folder id in status message '{}'",
            message
        ))),
    }
}
