use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{BatchStrategy, ResourceConfig, TransformJobConfig};
use crate::constants::inference::{
    ASSEMBLE_WITH_LINE, COMPRESSION_NONE, CSV_CONTENT_TYPE, SPLIT_TYPE_LINE,
    TRANSFORM_OUTPUT_SUFFIX,
};
use crate::errors::PipelineError;
use crate::poll::{JobDescription, Poller, Sleeper, ThreadSleeper};
use crate::training::ModelHandle;
use crate::transport::{ObjectStore, ObjectUri};
use crate::types::JobName;

/// Batch transform input channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformInput {
    /// Headerless CSV without the target column.
    pub source: ObjectUri,
    /// Payload content type.
    pub content_type: String,
    /// How the service splits the input into records.
    pub split_type: String,
    /// Input compression.
    pub compression: String,
}

/// Batch transform output channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOutput {
    /// Output prefix; each input object yields `<name>.out` under it.
    pub destination: ObjectUri,
    /// How the service assembles per-record outputs.
    pub assemble_with: String,
}

/// Wire request for a batch transform job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformJobRequest {
    /// Unique job name.
    pub job_name: JobName,
    /// Model registered by training.
    pub model_name: String,
    /// Cap on concurrent transforms inside the job.
    pub max_concurrent_transforms: u32,
    /// Maximum request payload in megabytes.
    pub max_payload_mb: u32,
    /// Record batching strategy.
    pub batch_strategy: BatchStrategy,
    /// Input channel.
    pub input: TransformInput,
    /// Output channel.
    pub output: TransformOutput,
    /// Compute resources.
    pub resources: ResourceConfig,
}

impl TransformJobRequest {
    /// Where the service writes predictions for the input object.
    pub fn result_uri(&self) -> Result<ObjectUri, PipelineError> {
        self.result_uri_in(&self.output.destination)
    }

    /// `<input file>.out` under `destination`.
    pub fn result_uri_in(&self, destination: &ObjectUri) -> Result<ObjectUri, PipelineError> {
        let file_name = self.input.source.file_name().ok_or_else(|| {
            PipelineError::Configuration(format!(
                "transform input '{}' does not name an object",
                self.input.source
            ))
        })?;
        Ok(destination.join(&format!("{file_name}{TRANSFORM_OUTPUT_SUFFIX}")))
    }
}

/// Managed batch transform service.
pub trait TransformService: Send + Sync {
    /// Submit a transform job and return its name without waiting.
    fn create_transform_job(&self, request: &TransformJobRequest) -> Result<JobName, PipelineError>;
    /// Current status of a transform job.
    fn describe_transform_job(&self, job_name: &str) -> Result<JobDescription, PipelineError>;
}

/// Build the wire request for running `model` over `input`; CSV in, line-assembled CSV out.
pub fn build_transform_request(
    config: &TransformJobConfig,
    job_name: JobName,
    model: &ModelHandle,
    input: ObjectUri,
    destination: ObjectUri,
) -> Result<TransformJobRequest, PipelineError> {
    config.validate()?;
    Ok(TransformJobRequest {
        job_name,
        model_name: model.model_name.clone(),
        max_concurrent_transforms: config.max_concurrent_transforms,
        max_payload_mb: config.max_payload_mb,
        batch_strategy: config.batch_strategy,
        input: TransformInput {
            source: input,
            content_type: CSV_CONTENT_TYPE.to_string(),
            split_type: SPLIT_TYPE_LINE.to_string(),
            compression: COMPRESSION_NONE.to_string(),
        },
        output: TransformOutput {
            destination,
            assemble_with: ASSEMBLE_WITH_LINE.to_string(),
        },
        resources: config.resources.clone(),
    })
}

/// Parse a transform result: one numeric prediction per line.
pub fn parse_transform_output(text: &str) -> Result<Vec<f64>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let mut values = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != 1 {
            return Err(PipelineError::Data(format!(
                "transform output line {} has {} columns, expected 1",
                line + 1,
                record.len()
            )));
        }
        let cell = &record[0];
        let value = cell.parse::<f64>().map_err(|_| {
            PipelineError::Data(format!(
                "transform output line {} is not a number: '{cell}'",
                line + 1
            ))
        })?;
        values.push(value);
    }
    Ok(values)
}

/// Submits batch transform jobs, waits for them, and reads their output.
pub struct BatchTransformClient<'a, S = ThreadSleeper> {
    service: &'a dyn TransformService,
    store: &'a dyn ObjectStore,
    poller: Poller<S>,
}

impl<'a, S: Sleeper> BatchTransformClient<'a, S> {
    /// Create a client reading results from `store`.
    pub fn new(
        service: &'a dyn TransformService,
        store: &'a dyn ObjectStore,
        poller: Poller<S>,
    ) -> Self {
        Self {
            service,
            store,
            poller,
        }
    }

    /// Submit `request` and return immediately with the job name.
    pub fn submit(&self, request: &TransformJobRequest) -> Result<JobName, PipelineError> {
        let job_name = self.service.create_transform_job(request)?;
        info!(
            "[ltv:transform] submitted transform job '{}' (model={}, input={})",
            job_name, request.model_name, request.input.source
        );
        Ok(job_name)
    }

    /// Poll `job_name` until it completes; `Failed`/`Stopped` are fatal.
    pub fn wait(&self, job_name: &str) -> Result<JobDescription, PipelineError> {
        self.poller
            .wait_for(job_name, |name| self.service.describe_transform_job(name))?
            .into_completed()
    }

    /// Find the object a completed job wrote for its input.
    ///
    /// The output location the service reports takes precedence over the
    /// requested destination. `<input>.out` is used when present; otherwise the
    /// destination must hold exactly one `.out` object.
    pub fn locate_result(
        &self,
        request: &TransformJobRequest,
        description: &JobDescription,
    ) -> Result<ObjectUri, PipelineError> {
        let destination = description
            .output
            .as_ref()
            .unwrap_or(&request.output.destination);
        let expected = request.result_uri_in(destination)?;
        let outputs: Vec<ObjectUri> = self
            .store
            .list(destination)?
            .into_iter()
            .filter(|uri| is_output_under(destination, uri))
            .collect();
        if outputs.contains(&expected) {
            return Ok(expected);
        }
        match outputs.as_slice() {
            [] => Err(PipelineError::NotFound {
                uri: expected.to_string(),
            }),
            [only] => {
                info!(
                    "[ltv:transform] using {} in place of {}",
                    only, expected
                );
                Ok(only.clone())
            }
            many => Err(PipelineError::Data(format!(
                "transform output {destination} holds {} result objects and none is {expected}",
                many.len()
            ))),
        }
    }

    /// Read the predictions a completed job wrote for its input.
    pub fn fetch_predictions(
        &self,
        request: &TransformJobRequest,
        description: &JobDescription,
    ) -> Result<Vec<f64>, PipelineError> {
        let uri = self.locate_result(request, description)?;
        let values = parse_transform_output(&self.store.get_string(&uri)?)?;
        info!(
            "[ltv:transform] read {} predictions from {}",
            values.len(),
            uri
        );
        Ok(values)
    }

    /// Submit, wait, and fetch in one call.
    pub fn run(&self, request: &TransformJobRequest) -> Result<Vec<f64>, PipelineError> {
        let job_name = self.submit(request)?;
        let description = self.wait(&job_name)?;
        self.fetch_predictions(request, &description)
    }
}

fn is_output_under(destination: &ObjectUri, uri: &ObjectUri) -> bool {
    let parent = uri.key.rsplit_once('/').map_or("", |(parent, _)| parent);
    uri.bucket == destination.bucket
        && parent == destination.key
        && uri.key.ends_with(TRANSFORM_OUTPUT_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollConfig;
    use crate::poll::JobStatus;
    use crate::transport::InMemoryObjectStore;
    use std::sync::Mutex;
    use std::time::Duration;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) {}
    }

    /// Completes on the second check and writes one prediction per input line.
    struct FakeTransform<'a> {
        store: &'a InMemoryObjectStore,
        requests: Mutex<Vec<TransformJobRequest>>,
        checks: Mutex<usize>,
        final_status: JobStatus,
    }

    impl TransformService for FakeTransform<'_> {
        fn create_transform_job(
            &self,
            request: &TransformJobRequest,
        ) -> Result<JobName, PipelineError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(request.job_name.clone())
        }

        fn describe_transform_job(&self, job_name: &str) -> Result<JobDescription, PipelineError> {
            let mut checks = self.checks.lock().unwrap();
            *checks += 1;
            if *checks < 2 {
                return Ok(JobDescription::new(job_name, JobStatus::InProgress));
            }
            if self.final_status == JobStatus::Completed {
                let request = self.requests.lock().unwrap()[0].clone();
                let input = self.store.get_string(&request.input.source)?;
                let out: String = input.lines().map(|_| "42.5\n").collect();
                self.store.put(&request.result_uri()?, out.as_bytes())?;
            }
            Ok(JobDescription::new(job_name, self.final_status))
        }
    }

    fn model() -> ModelHandle {
        ModelHandle {
            model_name: "ltv-training-1".into(),
            training_job: "ltv-training-1".into(),
            artifacts: "s3://bucket/ltv/output/model.tar.gz".parse().unwrap(),
            image: "registry.example/xgboost:1".into(),
        }
    }

    fn fake(store: &InMemoryObjectStore, final_status: JobStatus) -> FakeTransform<'_> {
        FakeTransform {
            store,
            requests: Mutex::new(Vec::new()),
            checks: Mutex::new(0),
            final_status,
        }
    }

    fn request() -> TransformJobRequest {
        build_transform_request(
            &TransformJobConfig::default(),
            "ltv-transform-1".into(),
            &model(),
            "s3://bucket/ltv/test/test.csv".parse().unwrap(),
            "s3://bucket/ltv/batch-output".parse().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn request_uses_line_split_csv() {
        let request = request();
        assert_eq!(request.input.content_type, "text/csv");
        assert_eq!(request.input.split_type, "Line");
        assert_eq!(request.input.compression, "None");
        assert_eq!(request.output.assemble_with, "Line");
        assert_eq!(request.max_concurrent_transforms, 64);
        assert_eq!(request.max_payload_mb, 6);
        assert_eq!(request.batch_strategy, BatchStrategy::MultiRecord);
        assert_eq!(
            request.result_uri().unwrap().to_string(),
            "s3://bucket/ltv/batch-output/test.csv.out"
        );
    }

    #[test]
    fn submit_does_not_poll() {
        let store = InMemoryObjectStore::new();
        let service = FakeTransform {
            store: &store,
            requests: Mutex::new(Vec::new()),
            checks: Mutex::new(0),
            final_status: JobStatus::Completed,
        };
        let client = BatchTransformClient::new(
            &service,
            &store,
            Poller::with_sleeper(PollConfig::default(), NoSleep),
        );
        assert_eq!(client.submit(&request()).unwrap(), "ltv-transform-1");
        assert_eq!(*service.checks.lock().unwrap(), 0);
    }

    #[test]
    fn run_reads_one_prediction_per_input_line() {
        let store = InMemoryObjectStore::new();
        let input: ObjectUri = "s3://bucket/ltv/test/test.csv".parse().unwrap();
        store.put(&input, b"1,0,4.5\n0,1,9\n0,1,3\n").unwrap();
        let service = FakeTransform {
            store: &store,
            requests: Mutex::new(Vec::new()),
            checks: Mutex::new(0),
            final_status: JobStatus::Completed,
        };
        let client = BatchTransformClient::new(
            &service,
            &store,
            Poller::with_sleeper(PollConfig::default(), NoSleep),
        );
        assert_eq!(client.run(&request()).unwrap(), vec![42.5, 42.5, 42.5]);
    }

    #[test]
    fn failed_job_skips_the_fetch() {
        let store = InMemoryObjectStore::new();
        let service = FakeTransform {
            store: &store,
            requests: Mutex::new(Vec::new()),
            checks: Mutex::new(0),
            final_status: JobStatus::Failed,
        };
        let client = BatchTransformClient::new(
            &service,
            &store,
            Poller::with_sleeper(PollConfig::default(), NoSleep),
        );
        let err = client.run(&request()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RemoteJob {
                status: JobStatus::Failed,
                ..
            }
        ));
    }

    #[test]
    fn reported_output_location_wins_over_the_requested_one() {
        let store = InMemoryObjectStore::new();
        let service = fake(&store, JobStatus::Completed);
        let client = BatchTransformClient::new(
            &service,
            &store,
            Poller::with_sleeper(PollConfig::default(), NoSleep),
        );
        let request = request();
        store
            .put(&request.result_uri().unwrap(), b"1\n")
            .unwrap();
        let moved: ObjectUri = "s3://bucket/ltv/relocated".parse().unwrap();
        store.put(&moved.join("test.csv.out"), b"7\n8\n").unwrap();
        let mut description = JobDescription::new("ltv-transform-1", JobStatus::Completed);
        description.output = Some(moved);
        assert_eq!(
            client.fetch_predictions(&request, &description).unwrap(),
            vec![7.0, 8.0]
        );
    }

    #[test]
    fn a_single_differently_named_result_is_found_by_listing() {
        let store = InMemoryObjectStore::new();
        let service = fake(&store, JobStatus::Completed);
        let client = BatchTransformClient::new(
            &service,
            &store,
            Poller::with_sleeper(PollConfig::default(), NoSleep),
        );
        let request = request();
        let destination = request.output.destination.clone();
        store.put(&destination.join("part-0000.out"), b"3\n").unwrap();
        store.put(&destination.join("manifest.json"), b"{}").unwrap();
        store
            .put(&destination.join("nested/other.out"), b"9\n")
            .unwrap();
        let description = JobDescription::new("ltv-transform-1", JobStatus::Completed);
        assert_eq!(
            client.locate_result(&request, &description).unwrap(),
            destination.join("part-0000.out")
        );

        store.put(&destination.join("part-0001.out"), b"4\n").unwrap();
        assert!(matches!(
            client.locate_result(&request, &description),
            Err(PipelineError::Data(_))
        ));
    }

    #[test]
    fn missing_result_reports_the_expected_object() {
        let store = InMemoryObjectStore::new();
        let service = fake(&store, JobStatus::Completed);
        let client = BatchTransformClient::new(
            &service,
            &store,
            Poller::with_sleeper(PollConfig::default(), NoSleep),
        );
        let description = JobDescription::new("ltv-transform-1", JobStatus::Completed);
        assert!(matches!(
            client.fetch_predictions(&request(), &description),
            Err(PipelineError::NotFound { ref uri }) if uri == "s3://bucket/ltv/batch-output/test.csv.out"
        ));
    }

    #[test]
    fn output_must_be_a_single_numeric_column() {
        assert_eq!(parse_transform_output("1.5\n2\n").unwrap(), vec![1.5, 2.0]);
        assert!(matches!(
            parse_transform_output("1.5,2\n"),
            Err(PipelineError::Data(_))
        ));
        assert!(matches!(
            parse_transform_output("abc\n"),
            Err(PipelineError::Data(_))
        ));
    }
}
