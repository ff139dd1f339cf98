use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::inference::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT_TRANSFORMS, DEFAULT_MAX_PAYLOAD_MB,
    DEFAULT_POLL_INTERVAL,
};
use crate::constants::splits::DEFAULT_SPLIT_SEED;
use crate::constants::training::{
    DEFAULT_ETA, DEFAULT_GAMMA, DEFAULT_INSTANCE_TYPE, DEFAULT_MAX_DEPTH,
    DEFAULT_MIN_CHILD_WEIGHT, DEFAULT_NUM_ROUND, DEFAULT_OBJECTIVE, DEFAULT_SUBSAMPLE,
};
use crate::errors::PipelineError;
use crate::schema::{ColumnKind, Schema};
use crate::splits::SplitRatios;
use crate::transport::ObjectUri;
use crate::types::{BucketName, ColumnName, HyperparameterMap};

/// Gradient-boosted tree hyperparameters forwarded to the training service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Maximum tree depth.
    pub max_depth: u32,
    /// Learning rate.
    pub eta: f64,
    /// Minimum loss reduction required to split a leaf.
    pub gamma: f64,
    /// Minimum sum of instance weight in a child.
    pub min_child_weight: f64,
    /// Fraction of rows sampled per tree.
    pub subsample: f64,
    /// Learning objective, e.g. `reg:squarederror`.
    pub objective: String,
    /// Number of boosting rounds.
    pub num_round: u32,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            eta: DEFAULT_ETA,
            gamma: DEFAULT_GAMMA,
            min_child_weight: DEFAULT_MIN_CHILD_WEIGHT,
            subsample: DEFAULT_SUBSAMPLE,
            objective: DEFAULT_OBJECTIVE.to_string(),
            num_round: DEFAULT_NUM_ROUND,
        }
    }
}

impl Hyperparameters {
    /// Reject values the training container would refuse.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_depth == 0 {
            return Err(config_err("hyperparameter max_depth must be >= 1"));
        }
        if !(self.eta > 0.0 && self.eta <= 1.0) {
            return Err(config_err("hyperparameter eta must be in (0, 1]"));
        }
        if !self.gamma.is_finite() || self.gamma < 0.0 {
            return Err(config_err("hyperparameter gamma must be a finite value >= 0"));
        }
        if !self.min_child_weight.is_finite() || self.min_child_weight < 0.0 {
            return Err(config_err(
                "hyperparameter min_child_weight must be a finite value >= 0",
            ));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(config_err("hyperparameter subsample must be in (0, 1]"));
        }
        if self.num_round == 0 {
            return Err(config_err("hyperparameter num_round must be >= 1"));
        }
        if self.objective.trim().is_empty() {
            return Err(config_err("hyperparameter objective must be set"));
        }
        Ok(())
    }

    /// Wire form: every value rendered as a string.
    pub fn to_wire_map(&self) -> HyperparameterMap {
        let mut map = HyperparameterMap::new();
        map.insert("max_depth".into(), self.max_depth.to_string());
        map.insert("eta".into(), self.eta.to_string());
        map.insert("gamma".into(), self.gamma.to_string());
        map.insert("min_child_weight".into(), self.min_child_weight.to_string());
        map.insert("subsample".into(), self.subsample.to_string());
        map.insert("objective".into(), self.objective.clone());
        map.insert("num_round".into(), self.num_round.to_string());
        map
    }
}

/// Compute instances requested for a remote job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Instance type, e.g. `ml.m5.xlarge`.
    pub instance_type: String,
    /// Number of instances.
    pub instance_count: u32,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            instance_count: 1,
        }
    }
}

impl ResourceConfig {
    fn validate(&self, scope: &str) -> Result<(), PipelineError> {
        if self.instance_type.trim().is_empty() {
            return Err(config_err(&format!("{scope}.instance_type must be set")));
        }
        if self.instance_count == 0 {
            return Err(config_err(&format!("{scope}.instance_count must be >= 1")));
        }
        Ok(())
    }
}

/// Options for the remote training job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Algorithm container image reference.
    pub image: String,
    /// Access role the service assumes for the job.
    pub role: String,
    /// Compute resources.
    pub resources: ResourceConfig,
    /// Model artifact destination; defaults to `<data root>/output`.
    pub output_path: Option<ObjectUri>,
    /// Algorithm hyperparameters.
    pub hyperparameters: Hyperparameters,
}

impl TrainingConfig {
    /// Validate before any remote call is made.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.image.trim().is_empty() {
            return Err(config_err("training.image must be set"));
        }
        if self.role.trim().is_empty() {
            return Err(config_err("training.role must be set"));
        }
        self.resources.validate("training.resources")?;
        self.hyperparameters.validate()
    }
}

/// How the transform service groups records into requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStrategy {
    /// Many records per request.
    #[default]
    MultiRecord,
    /// One record per request.
    SingleRecord,
}

/// Options for a batch transform job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformJobConfig {
    /// Compute resources.
    pub resources: ResourceConfig,
    /// Cap on concurrent transforms inside the job; enforced remotely.
    pub max_concurrent_transforms: u32,
    /// Maximum request payload in megabytes.
    pub max_payload_mb: u32,
    /// Record batching strategy.
    pub batch_strategy: BatchStrategy,
}

impl Default for TransformJobConfig {
    fn default() -> Self {
        Self {
            resources: ResourceConfig::default(),
            max_concurrent_transforms: DEFAULT_MAX_CONCURRENT_TRANSFORMS,
            max_payload_mb: DEFAULT_MAX_PAYLOAD_MB,
            batch_strategy: BatchStrategy::MultiRecord,
        }
    }
}

impl TransformJobConfig {
    /// Validate before submission.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.resources.validate("transform.resources")?;
        if self.max_concurrent_transforms == 0 {
            return Err(config_err("transform.max_concurrent_transforms must be >= 1"));
        }
        if self.max_payload_mb == 0 {
            return Err(config_err("transform.max_payload_mb must be >= 1"));
        }
        Ok(())
    }
}

/// Status polling policy.
///
/// The defaults poll every 30 seconds with no attempt ceiling and no timeout,
/// so a job that never leaves `InProgress` blocks forever unless a limit is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between status checks, in milliseconds.
    pub interval_ms: u64,
    /// Maximum number of status checks before giving up.
    pub max_attempts: Option<usize>,
    /// Wall-clock budget for the whole wait, in milliseconds, counted from the first check.
    pub timeout_ms: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_attempts: None,
            timeout_ms: None,
        }
    }
}

impl PollConfig {
    /// Poll every `interval` with no limits.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Delay between checks.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Wall-clock budget, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Validate limits.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_attempts == Some(0) {
            return Err(config_err("poll.max_attempts must be >= 1 when set"));
        }
        if self.timeout_ms.is_some() && self.interval_ms == 0 {
            return Err(config_err("poll.interval_ms must be > 0 when poll.timeout_ms is set"));
        }
        Ok(())
    }
}

/// Top-level pipeline configuration.
///
/// Every location the pipeline touches is derived from `bucket` and `prefix`;
/// nothing is read from process-wide state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bucket holding source data and all pipeline artifacts.
    pub bucket: BucketName,
    /// Key prefix for artifacts; also used to name remote jobs.
    pub prefix: String,
    /// Location of the headed source CSV.
    pub source: ObjectUri,
    /// Expected source columns, checked at load time.
    pub schema: Schema,
    /// Categorical columns to one-hot encode.
    pub categorical_columns: Vec<ColumnName>,
    /// Shuffle seed for the splitter.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Split fractions.
    #[serde(default)]
    pub split: SplitRatios,
    /// Rows per synchronous endpoint request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Status polling policy.
    #[serde(default)]
    pub poll: PollConfig,
    /// Training job options.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Batch transform options.
    #[serde(default)]
    pub transform: TransformJobConfig,
}

fn default_seed() -> u64 {
    DEFAULT_SPLIT_SEED
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl PipelineConfig {
    /// Config with default seed, split, chunking, polling, and job options.
    pub fn new(
        bucket: impl Into<BucketName>,
        prefix: impl Into<String>,
        source: ObjectUri,
        schema: Schema,
        categorical_columns: Vec<ColumnName>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            source,
            schema,
            categorical_columns,
            seed: DEFAULT_SPLIT_SEED,
            split: SplitRatios::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll: PollConfig::default(),
            training: TrainingConfig::default(),
            transform: TransformJobConfig::default(),
        }
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            PipelineError::Configuration(format!(
                "failed reading config {}: {err}",
                path.display()
            ))
        })?;
        let config: PipelineConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Root for all artifacts: `s3://<bucket>/<prefix>`.
    pub fn data_root(&self) -> ObjectUri {
        ObjectUri::new(self.bucket.clone(), &self.prefix)
    }

    /// Model artifact destination.
    pub fn model_output(&self) -> ObjectUri {
        self.training
            .output_path
            .clone()
            .unwrap_or_else(|| self.data_root().join("output"))
    }

    /// Validate everything that does not need the remote service.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.bucket.trim().is_empty() {
            return Err(config_err("bucket must be set"));
        }
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            return Err(config_err("prefix must be set"));
        }
        if !prefix
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '/' | '.'))
        {
            return Err(config_err(
                "prefix may only contain ASCII letters, digits, '-', '_', '.', and '/'",
            ));
        }
        if prefix.split('/').any(|segment| matches!(segment, "" | "." | "..")) {
            return Err(config_err(
                "prefix segments must be non-empty and may not be '.' or '..'",
            ));
        }
        if self.chunk_size == 0 {
            return Err(config_err("chunk_size must be > 0"));
        }
        self.split.normalized()?;
        self.schema.require_target().map_err(|_| {
            PipelineError::Configuration("schema must declare a target column".into())
        })?;
        for name in &self.categorical_columns {
            if self.schema.kind_of(name)? != ColumnKind::Categorical {
                return Err(PipelineError::Configuration(format!(
                    "column '{name}' is listed for encoding but is not categorical"
                )));
            }
        }
        self.poll.validate()?;
        self.training.validate()?;
        self.transform.validate()
    }
}

fn config_err(msg: &str) -> PipelineError {
    PipelineError::Configuration(msg.to_string())
}
