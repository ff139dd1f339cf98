//! Training job client.
//!
//! Thin request/response wrapper over a managed training service. The client
//! validates configuration, submits one job, polls it to a terminal status,
//! and hands back a `ModelHandle` that later steps consume directly.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ResourceConfig, TrainingConfig};
use crate::constants::inference::CSV_CONTENT_TYPE;
use crate::errors::PipelineError;
use crate::poll::{JobDescription, Poller, Sleeper, ThreadSleeper};
use crate::splits::SplitLabel;
use crate::transport::ObjectUri;
use crate::types::{HyperparameterMap, JobName};

/// One named input channel of a training job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChannel {
    /// Channel name, `train` or `validation`.
    pub name: String,
    /// Location of the headerless, target-first CSV.
    pub source: ObjectUri,
    /// Payload content type.
    pub content_type: String,
}

impl DataChannel {
    /// CSV channel for `label`.
    pub fn csv(label: SplitLabel, source: ObjectUri) -> Self {
        Self {
            name: label.as_str().to_string(),
            source,
            content_type: CSV_CONTENT_TYPE.to_string(),
        }
    }
}

/// Wire request for a training job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobRequest {
    /// Unique job name.
    pub job_name: JobName,
    /// Algorithm container image.
    pub image: String,
    /// Access role.
    pub role: String,
    /// Compute resources.
    pub resources: ResourceConfig,
    /// Model artifact destination.
    pub output_path: ObjectUri,
    /// Hyperparameters rendered as strings.
    pub hyperparameters: HyperparameterMap,
    /// Train and validation channels.
    pub channels: Vec<DataChannel>,
}

/// Opaque reference to a trained model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHandle {
    /// Name under which the model is registered; used by hosting and batch transform.
    pub model_name: String,
    /// Training job that produced the model.
    pub training_job: JobName,
    /// Model artifacts location.
    pub artifacts: ObjectUri,
    /// Container image used to serve the model.
    pub image: String,
}

/// Managed training service.
pub trait TrainingService: Send + Sync {
    /// Submit a training job and return its name without waiting.
    fn create_training_job(&self, request: &TrainingJobRequest) -> Result<JobName, PipelineError>;
    /// Current status of a training job.
    fn describe_training_job(&self, job_name: &str) -> Result<JobDescription, PipelineError>;
}

/// Build the wire request; fails fast on invalid configuration.
pub fn build_training_request(
    config: &TrainingConfig,
    job_name: JobName,
    train: ObjectUri,
    validation: ObjectUri,
    output_path: ObjectUri,
) -> Result<TrainingJobRequest, PipelineError> {
    config.validate()?;
    Ok(TrainingJobRequest {
        job_name,
        image: config.image.clone(),
        role: config.role.clone(),
        resources: config.resources.clone(),
        output_path,
        hyperparameters: config.hyperparameters.to_wire_map(),
        channels: vec![
            DataChannel::csv(SplitLabel::Train, train),
            DataChannel::csv(SplitLabel::Validation, validation),
        ],
    })
}

/// Submits training jobs and waits for them to finish.
pub struct TrainingJobClient<'a, S = ThreadSleeper> {
    service: &'a dyn TrainingService,
    poller: Poller<S>,
}

impl<'a, S: Sleeper> TrainingJobClient<'a, S> {
    /// Create a client that polls with `poller`.
    pub fn new(service: &'a dyn TrainingService, poller: Poller<S>) -> Self {
        Self { service, poller }
    }

    /// Submit `request`, wait for a terminal status, and return the model handle.
    ///
    /// `Failed` and `Stopped` surface as `PipelineError::RemoteJob` carrying the
    /// service's failure reason. There is no automatic retry.
    pub fn train(&self, request: &TrainingJobRequest) -> Result<ModelHandle, PipelineError> {
        let job_name = self.service.create_training_job(request)?;
        info!(
            "[ltv:train] submitted training job '{}' (image={}, rounds={})",
            job_name,
            request.image,
            request
                .hyperparameters
                .get("num_round")
                .map(String::as_str)
                .unwrap_or("?")
        );
        let description = self
            .poller
            .wait_for(&job_name, |name| self.service.describe_training_job(name))?
            .into_completed()?;
        let artifacts = description
            .output
            .unwrap_or_else(|| request.output_path.join(&job_name).join("output/model.tar.gz"));
        info!(
            "[ltv:train] training job '{}' completed; artifacts at {}",
            job_name, artifacts
        );
        Ok(ModelHandle {
            model_name: job_name.clone(),
            training_job: job_name,
            artifacts,
            image: request.image.clone(),
        })
    }
}
