use std::io;

use thiserror::Error;

use crate::poll::JobStatus;
use crate::types::JobName;

/// Error type for configuration, data, storage, and remote-job failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("schema mismatch: {0}")]
    Schema(String),
    #[error("data error: {0}")]
    Data(String),
    #[error("object not found: {uri}")]
    NotFound { uri: String },
    #[error("object storage failure at '{uri}': {reason}")]
    Storage { uri: String, reason: String },
    #[error("prediction endpoint failure: {0}")]
    Endpoint(String),
    #[error("job service failure: {0}")]
    JobService(String),
    #[error("remote job '{job_name}' ended with status {status}: {detail}")]
    RemoteJob {
        job_name: JobName,
        status: JobStatus,
        detail: String,
    },
    #[error("gave up polling job '{job_name}' after {attempts} status checks")]
    PollTimeout { job_name: JobName, attempts: usize },
    #[error("polling job '{job_name}' was cancelled")]
    Cancelled { job_name: JobName },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(String),
    #[error("json error: {0}")]
    Json(String),
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Json(err.to_string())
    }
}
