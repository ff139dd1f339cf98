#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Pipeline, training, transform, and polling configuration.
pub mod config;
/// Centralized constants used across the pipeline stages.
pub mod constants;
/// In-memory table and cell values.
pub mod data;
/// One-hot encoding of categorical columns.
pub mod encoding;
/// Reusable demo runners shared by `demos/`.
pub mod example_apps;
/// HTTP adapters for the hosted endpoint and job gateway.
pub mod http;
/// Synchronous chunked prediction and batch transform jobs.
pub mod inference;
/// Schema-checked CSV loading from object storage.
pub mod loader;
/// RMSE and residual diagnostics.
pub mod metrics;
/// End-to-end orchestration.
pub mod pipeline;
/// Remote job status and polling.
pub mod poll;
/// Explicit typed table schema.
pub mod schema;
/// Seeded train/validation/test splitting.
pub mod splits;
/// Training job client.
pub mod training;
/// Object storage backends (filesystem and in-memory today).
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Split CSV and predictions export writers.
pub mod writer;

mod errors;

pub use config::{
    BatchStrategy, Hyperparameters, PipelineConfig, PollConfig, ResourceConfig, TrainingConfig,
    TransformJobConfig,
};
pub use data::{Row, Table, Value};
pub use encoding::{EncodedTable, IndicatorGroup, one_hot_encode};
pub use errors::PipelineError;
pub use inference::{
    BatchPredictor, BatchTransformClient, PredictionEndpoint, TransformJobRequest,
    TransformService,
};
pub use metrics::{ResidualDiagnostics, rmse};
pub use pipeline::{Pipeline, PipelineReport, PipelineServices, PreparedData};
pub use poll::{CancelToken, JobDescription, JobStatus, Poller, Sleeper, ThreadSleeper};
pub use schema::{ColumnKind, ColumnSpec, Schema};
pub use splits::{DatasetSplit, SplitLabel, SplitRatios, split_indices, split_table};
pub use training::{ModelHandle, TrainingJobClient, TrainingJobRequest, TrainingService};
pub use transport::{FsObjectStore, InMemoryObjectStore, ObjectStore, ObjectUri};
pub use types::{CategoryValue, ColumnName, CsvPayload, HyperparameterMap, JobName};
