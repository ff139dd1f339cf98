#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ltv_pipeline::inference::{PredictionEndpoint, TransformJobRequest, TransformService};
use ltv_pipeline::poll::{JobDescription, JobStatus, Sleeper};
use ltv_pipeline::training::{TrainingJobRequest, TrainingService};
use ltv_pipeline::types::{CsvPayload, JobName};
use ltv_pipeline::{
    ColumnSpec, InMemoryObjectStore, ObjectStore, ObjectUri, PipelineConfig, PipelineError,
    PollConfig, Schema,
};

pub const TIERS: [&str; 3] = ["silver", "gold", "bronze"];

pub fn customer_schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::categorical("tier"),
        ColumnSpec::continuous("visits"),
        ColumnSpec::target("revenue"),
    ])
    .unwrap()
}

/// Headed CSV with `rows` customers; revenue is `10 * visits`.
pub fn customers_csv(rows: usize) -> String {
    let mut out = String::from("tier,visits,revenue\n");
    for idx in 0..rows {
        out.push_str(&format!(
            "{},{},{}\n",
            TIERS[idx % TIERS.len()],
            idx,
            idx * 10
        ));
    }
    out
}

pub fn source_uri() -> ObjectUri {
    "s3://bucket/raw/customers.csv".parse().unwrap()
}

pub fn pipeline_config() -> PipelineConfig {
    let mut config = PipelineConfig::new(
        "bucket",
        "ltv",
        source_uri(),
        customer_schema(),
        vec!["tier".into()],
    );
    config.training.image = "registry.example/xgboost:1".into();
    config.training.role = "arn:role/ml".into();
    config.poll = PollConfig::every(Duration::from_millis(1));
    config
}

/// Counts sleeps without blocking.
#[derive(Clone, Debug, Default)]
pub struct CountingSleeper {
    sleeps: Arc<AtomicUsize>,
}

impl CountingSleeper {
    pub fn count(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Sleeper for CountingSleeper {
    fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted training and transform service.
///
/// Each job walks its status script; a completed transform job writes
/// `prediction` once per input line.
pub struct FakeMlService<'a> {
    store: &'a InMemoryObjectStore,
    pub prediction: f64,
    training_script: Mutex<VecDeque<JobStatus>>,
    transform_script: Mutex<VecDeque<JobStatus>>,
    pub training_requests: Mutex<Vec<TrainingJobRequest>>,
    pub transform_requests: Mutex<Vec<TransformJobRequest>>,
    pub endpoint_calls: AtomicUsize,
}

impl<'a> FakeMlService<'a> {
    pub fn new(store: &'a InMemoryObjectStore, prediction: f64) -> Self {
        Self {
            store,
            prediction,
            training_script: Mutex::new(VecDeque::from([
                JobStatus::InProgress,
                JobStatus::Completed,
            ])),
            transform_script: Mutex::new(VecDeque::from([
                JobStatus::InProgress,
                JobStatus::InProgress,
                JobStatus::Completed,
            ])),
            training_requests: Mutex::new(Vec::new()),
            transform_requests: Mutex::new(Vec::new()),
            endpoint_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_training_script(self, script: Vec<JobStatus>) -> Self {
        *self.training_script.lock().unwrap() = script.into();
        self
    }

    pub fn with_transform_script(self, script: Vec<JobStatus>) -> Self {
        *self.transform_script.lock().unwrap() = script.into();
        self
    }

    fn next(script: &Mutex<VecDeque<JobStatus>>) -> JobStatus {
        script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JobStatus::InProgress)
    }
}

impl TrainingService for FakeMlService<'_> {
    fn create_training_job(&self, request: &TrainingJobRequest) -> Result<JobName, PipelineError> {
        self.training_requests.lock().unwrap().push(request.clone());
        Ok(request.job_name.clone())
    }

    fn describe_training_job(&self, job_name: &str) -> Result<JobDescription, PipelineError> {
        let mut description = JobDescription::new(job_name, Self::next(&self.training_script));
        if description.status == JobStatus::Failed {
            description.failure_reason = Some("AlgorithmError: bad input".into());
        }
        Ok(description)
    }
}

impl TransformService for FakeMlService<'_> {
    fn create_transform_job(
        &self,
        request: &TransformJobRequest,
    ) -> Result<JobName, PipelineError> {
        self.transform_requests.lock().unwrap().push(request.clone());
        Ok(request.job_name.clone())
    }

    fn describe_transform_job(&self, job_name: &str) -> Result<JobDescription, PipelineError> {
        let status = Self::next(&self.transform_script);
        if status == JobStatus::Completed {
            let request = self.transform_requests.lock().unwrap()[0].clone();
            let input = self.store.get_string(&request.input.source)?;
            let output: String = input
                .lines()
                .map(|_| format!("{}\n", self.prediction))
                .collect();
            self.store.put(&request.result_uri()?, output.as_bytes())?;
        }
        Ok(JobDescription::new(job_name, status))
    }
}

impl PredictionEndpoint for FakeMlService<'_> {
    fn name(&self) -> &str {
        "fake"
    }

    /// Predicts `prediction` plus the row's last feature, so results follow row order.
    fn invoke(&self, payload: &str) -> Result<CsvPayload, PipelineError> {
        self.endpoint_calls.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::new();
        for line in payload.lines() {
            let last = line.rsplit(',').next().unwrap_or_default();
            let feature: f64 = last
                .parse()
                .map_err(|_| PipelineError::Endpoint(format!("bad feature '{last}'")))?;
            out.push((self.prediction + feature).to_string());
        }
        Ok(out.join("\n"))
    }
}

/// Object store whose writes fail for keys containing `poisoned`.
pub struct FailingWrites<'a> {
    pub inner: &'a InMemoryObjectStore,
    pub poisoned: &'static str,
}

impl ObjectStore for FailingWrites<'_> {
    fn get(&self, uri: &ObjectUri) -> Result<Vec<u8>, PipelineError> {
        self.inner.get(uri)
    }

    fn put(&self, uri: &ObjectUri, bytes: &[u8]) -> Result<(), PipelineError> {
        if uri.key.contains(self.poisoned) {
            return Err(PipelineError::Storage {
                uri: uri.to_string(),
                reason: "simulated outage".into(),
            });
        }
        self.inner.put(uri, bytes)
    }

    fn list(&self, prefix: &ObjectUri) -> Result<Vec<ObjectUri>, PipelineError> {
        self.inner.list(prefix)
    }
}
