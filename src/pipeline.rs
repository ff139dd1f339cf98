//! End-to-end orchestration.
//!
//! Steps run strictly in order: load, encode, split, upload, train, batch
//! transform, evaluate, export. The first error aborts the run, so a failed
//! upload never reaches training and a failed training job never reaches
//! inference. All naming comes from `PipelineConfig`; nothing is global.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::Table;
use crate::encoding::{EncodedTable, one_hot_encode};
use crate::errors::PipelineError;
use crate::inference::{
    BatchPredictor, BatchTransformClient, PredictionEndpoint, TransformService,
    build_transform_request,
};
use crate::loader::load_table;
use crate::metrics::ResidualDiagnostics;
use crate::poll::{Poller, Sleeper, ThreadSleeper, job_name};
use crate::splits::{SplitTables, split_table};
use crate::training::{ModelHandle, TrainingJobClient, TrainingService, build_training_request};
use crate::transport::{ObjectStore, ObjectUri};
use crate::types::{ColumnName, JobName};
use crate::writer::{SplitLocations, predictions_uri, write_predictions, write_splits};

/// Object-key segment under the data root where batch transform writes results.
pub const BATCH_OUTPUT_DIR: &str = "batch-output";
/// Prediction export stem for batch transform results.
pub const BATCH_PREDICTIONS_STEM: &str = "test";
/// Prediction export stem for endpoint results.
pub const ENDPOINT_PREDICTIONS_STEM: &str = "test_endpoint";

/// External collaborators the pipeline talks to.
#[derive(Clone, Copy)]
pub struct PipelineServices<'a> {
    /// Object storage for source data, splits, and exports.
    pub store: &'a dyn ObjectStore,
    /// Managed training.
    pub training: &'a dyn TrainingService,
    /// Managed batch transform.
    pub transform: &'a dyn TransformService,
}

/// Encoded, split, and uploaded data.
#[derive(Clone, Debug)]
pub struct PreparedData {
    /// Generated indicator column names, grouped by source column.
    pub indicator_columns: Vec<ColumnName>,
    /// Split tables, target still present.
    pub tables: SplitTables,
    /// Uploaded split CSVs.
    pub locations: SplitLocations,
}

/// Predictions for the test split, scored against its targets.
#[derive(Clone, Debug, Serialize)]
pub struct Evaluation {
    /// Test-row predictions in row order.
    pub predictions: Vec<f64>,
    /// Error summary and plot data.
    pub diagnostics: ResidualDiagnostics,
    /// Exported predictions CSV.
    pub export: ObjectUri,
}

/// Outcome of a full run.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineReport {
    /// Rows in (train, validation, test).
    pub split_sizes: (usize, usize, usize),
    /// Uploaded train CSV.
    pub train_uri: ObjectUri,
    /// Uploaded validation CSV.
    pub validation_uri: ObjectUri,
    /// Uploaded test CSV.
    pub test_uri: ObjectUri,
    /// Trained model.
    pub model: ModelHandle,
    /// Batch transform job that scored the test split.
    pub transform_job: JobName,
    /// Batch transform evaluation.
    pub batch: Evaluation,
}

/// Drives one configured run against the given services.
pub struct Pipeline<'a, S = ThreadSleeper> {
    config: &'a PipelineConfig,
    services: PipelineServices<'a>,
    sleeper: S,
}

impl<'a> Pipeline<'a, ThreadSleeper> {
    /// Validate `config` and build a pipeline that really sleeps while polling.
    pub fn new(
        config: &'a PipelineConfig,
        services: PipelineServices<'a>,
    ) -> Result<Self, PipelineError> {
        Self::with_sleeper(config, services, ThreadSleeper)
    }
}

impl<'a, S: Sleeper + Clone> Pipeline<'a, S> {
    /// Validate `config` and build a pipeline polling with `sleeper`.
    pub fn with_sleeper(
        config: &'a PipelineConfig,
        services: PipelineServices<'a>,
        sleeper: S,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            services,
            sleeper,
        })
    }

    fn poller(&self) -> Poller<S> {
        Poller::with_sleeper(self.config.poll.clone(), self.sleeper.clone())
    }

    /// Load, encode, split, and upload the source dataset.
    pub fn prepare(&self) -> Result<PreparedData, PipelineError> {
        let config = self.config;
        let table = load_table(self.services.store, &config.source, &config.schema)?;
        let columns: Vec<&str> = config.categorical_columns.iter().map(String::as_str).collect();
        let EncodedTable { table, groups } = one_hot_encode(&table, &columns)?;
        let tables = split_table(&table, config.seed, config.split)?;
        let locations = write_splits(self.services.store, &config.data_root(), &tables)?;
        Ok(PreparedData {
            indicator_columns: groups
                .iter()
                .flat_map(|group| group.indicator_names())
                .collect(),
            tables,
            locations,
        })
    }

    /// Submit a training job over the uploaded splits and wait for the model.
    pub fn train(&self, prepared: &PreparedData) -> Result<ModelHandle, PipelineError> {
        let request = build_training_request(
            &self.config.training,
            job_name(&self.config.prefix, "training", Utc::now()),
            prepared.locations.train.clone(),
            prepared.locations.validation.clone(),
            self.config.model_output(),
        )?;
        TrainingJobClient::new(self.services.training, self.poller()).train(&request)
    }

    /// Score the uploaded test split with a batch transform job and export the results.
    pub fn batch_evaluate(
        &self,
        prepared: &PreparedData,
        model: &ModelHandle,
    ) -> Result<(JobName, Evaluation), PipelineError> {
        let request = build_transform_request(
            &self.config.transform,
            job_name(&self.config.prefix, "transform", Utc::now()),
            model,
            prepared.locations.test.clone(),
            self.config.data_root().join(BATCH_OUTPUT_DIR),
        )?;
        let client = BatchTransformClient::new(
            self.services.transform,
            self.services.store,
            self.poller(),
        );
        let predictions = client.run(&request)?;
        let evaluation = self.evaluate(prepared, predictions, BATCH_PREDICTIONS_STEM)?;
        Ok((request.job_name, evaluation))
    }

    /// Score the test split through a hosted endpoint in chunks of `chunk_size` rows.
    pub fn endpoint_evaluate(
        &self,
        prepared: &PreparedData,
        endpoint: &dyn PredictionEndpoint,
    ) -> Result<Evaluation, PipelineError> {
        let features = prepared.tables.test.without_target()?;
        let predictions =
            BatchPredictor::new(endpoint, self.config.chunk_size)?.predict_table(&features)?;
        self.evaluate(prepared, predictions, ENDPOINT_PREDICTIONS_STEM)
    }

    fn evaluate(
        &self,
        prepared: &PreparedData,
        predictions: Vec<f64>,
        stem: &str,
    ) -> Result<Evaluation, PipelineError> {
        let test: &Table = &prepared.tables.test;
        let actuals = test.target_values()?;
        let diagnostics = ResidualDiagnostics::compute(&predictions, &actuals)?;
        let export = predictions_uri(&prepared.locations.test, stem);
        write_predictions(self.services.store, &export, test, &predictions)?;
        Ok(Evaluation {
            predictions,
            diagnostics,
            export,
        })
    }

    /// Run every step in order and stop at the first failure.
    pub fn run(&self) -> Result<PipelineReport, PipelineError> {
        let prepared = self.prepare()?;
        let model = self.train(&prepared)?;
        let (transform_job, batch) = self.batch_evaluate(&prepared, &model)?;
        info!(
            "[ltv:pipeline] run complete: model={} transform_job={} rmse={:.4}",
            model.model_name, transform_job, batch.diagnostics.rmse
        );
        Ok(PipelineReport {
            split_sizes: (
                prepared.tables.train.height(),
                prepared.tables.validation.height(),
                prepared.tables.test.height(),
            ),
            train_uri: prepared.locations.train,
            validation_uri: prepared.locations.validation,
            test_uri: prepared.locations.test,
            model,
            transform_job,
            batch,
        })
    }
}
