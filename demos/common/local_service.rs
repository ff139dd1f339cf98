#![allow(dead_code)]

use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use ltv_pipeline::config::PollConfig;
use ltv_pipeline::inference::{PredictionEndpoint, TransformJobRequest, TransformService};
use ltv_pipeline::poll::{JobDescription, JobStatus};
use ltv_pipeline::splits::DeterministicRng;
use ltv_pipeline::training::{TrainingJobRequest, TrainingService};
use ltv_pipeline::types::{CsvPayload, JobName};
use ltv_pipeline::{
    ColumnSpec, FsObjectStore, ObjectStore, ObjectUri, PipelineConfig, PipelineError, Schema,
};
use rand::Rng;

const SIZE_CLASSES: [&str; 3] = ["small", "medium", "large"];
const GENDERS: [&str; 2] = ["female", "male"];
const EXPERIENCE: [&str; 3] = ["new", "regular", "veteran"];
const DEMO_ROWS: usize = 1000;

/// Status checks a simulated job spends `InProgress` before finishing.
const CHECKS_BEFORE_COMPLETION: usize = 2;

enum LocalJob {
    Training {
        request: TrainingJobRequest,
        checks: usize,
    },
    Transform {
        request: TransformJobRequest,
        checks: usize,
    },
}

/// Local stand-in for the managed service.
///
/// Training "fits" the mean of the target column; transform jobs and the
/// endpoint predict that mean for every row.
pub struct LocalService {
    store: Arc<FsObjectStore>,
    jobs: Mutex<HashMap<JobName, LocalJob>>,
    models: Mutex<HashMap<String, f64>>,
    latest: Mutex<Option<f64>>,
}

impl LocalService {
    pub fn new(store: Arc<FsObjectStore>) -> Self {
        Self {
            store,
            jobs: Mutex::new(HashMap::new()),
            models: Mutex::new(HashMap::new()),
            latest: Mutex::new(None),
        }
    }

    fn fit(&self, request: &TrainingJobRequest) -> Result<(f64, ObjectUri), PipelineError> {
        let train = request
            .channels
            .iter()
            .find(|channel| channel.name == "train")
            .ok_or_else(|| PipelineError::Configuration("missing train channel".into()))?;
        let text = self.store.get_string(&train.source)?;
        let mut sum = 0.0;
        let mut rows = 0usize;
        for line in text.lines().filter(|line| !line.is_empty()) {
            let target = line.split(',').next().unwrap_or_default();
            sum += target
                .parse::<f64>()
                .map_err(|_| PipelineError::Data(format!("bad target '{target}'")))?;
            rows += 1;
        }
        let mean = if rows == 0 { 0.0 } else { sum / rows as f64 };
        let artifacts = request
            .output_path
            .join(&request.job_name)
            .join("output/model.json");
        let model = serde_json::json!({ "mean": mean, "rows": rows });
        self.store.put(&artifacts, model.to_string().as_bytes())?;
        Ok((mean, artifacts))
    }

    fn model_mean(&self, model_name: &str) -> Result<f64, PipelineError> {
        self.models
            .lock()
            .map_err(|_| PipelineError::Endpoint("model registry poisoned".into()))?
            .get(model_name)
            .copied()
            .ok_or_else(|| PipelineError::NotFound {
                uri: format!("model/{model_name}"),
            })
    }

    fn latest_mean(&self) -> Result<f64, PipelineError> {
        self.latest
            .lock()
            .map_err(|_| PipelineError::Endpoint("model registry poisoned".into()))?
            .ok_or_else(|| PipelineError::Endpoint("no model has been trained".into()))
    }

    fn describe(&self, job_name: &str) -> Result<JobDescription, PipelineError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| PipelineError::JobService("job table poisoned".into()))?;
        let job = jobs.get_mut(job_name).ok_or_else(|| PipelineError::NotFound {
            uri: format!("job/{job_name}"),
        })?;
        let checks = match job {
            LocalJob::Training { checks, .. } | LocalJob::Transform { checks, .. } => {
                *checks += 1;
                *checks
            }
        };
        let mut description = JobDescription::new(job_name, JobStatus::InProgress);
        description.created_at = Some(Utc::now());
        if checks <= CHECKS_BEFORE_COMPLETION {
            return Ok(description);
        }
        let outcome = match job {
            LocalJob::Training { request, .. } => self.fit(request).map(|(mean, artifacts)| {
                if let Ok(mut models) = self.models.lock() {
                    models.insert(request.job_name.clone(), mean);
                }
                if let Ok(mut latest) = self.latest.lock() {
                    *latest = Some(mean);
                }
                artifacts
            }),
            LocalJob::Transform { request, .. } => self.transform(request),
        };
        match outcome {
            Ok(output) => {
                description.status = JobStatus::Completed;
                description.output = Some(output);
            }
            Err(err) => {
                description.status = JobStatus::Failed;
                description.failure_reason = Some(err.to_string());
            }
        }
        description.ended_at = Some(Utc::now());
        Ok(description)
    }

    fn transform(&self, request: &TransformJobRequest) -> Result<ObjectUri, PipelineError> {
        let mean = self.model_mean(&request.model_name)?;
        let input = self.store.get_string(&request.input.source)?;
        let output: String = input
            .lines()
            .filter(|line| !line.is_empty())
            .map(|_| format!("{mean}\n"))
            .collect();
        let result = request.result_uri()?;
        self.store.put(&result, output.as_bytes())?;
        Ok(request.output.destination.clone())
    }

    fn register(&self, job_name: &JobName, job: LocalJob) -> Result<(), PipelineError> {
        self.jobs
            .lock()
            .map_err(|_| PipelineError::JobService("job table poisoned".into()))?
            .insert(job_name.clone(), job);
        Ok(())
    }
}

impl TrainingService for LocalService {
    fn create_training_job(&self, request: &TrainingJobRequest) -> Result<JobName, PipelineError> {
        self.register(
            &request.job_name,
            LocalJob::Training {
                request: request.clone(),
                checks: 0,
            },
        )?;
        Ok(request.job_name.clone())
    }

    fn describe_training_job(&self, job_name: &str) -> Result<JobDescription, PipelineError> {
        self.describe(job_name)
    }
}

impl TransformService for LocalService {
    fn create_transform_job(
        &self,
        request: &TransformJobRequest,
    ) -> Result<JobName, PipelineError> {
        self.model_mean(&request.model_name)?;
        self.register(
            &request.job_name,
            LocalJob::Transform {
                request: request.clone(),
                checks: 0,
            },
        )?;
        Ok(request.job_name.clone())
    }

    fn describe_transform_job(&self, job_name: &str) -> Result<JobDescription, PipelineError> {
        self.describe(job_name)
    }
}

impl PredictionEndpoint for LocalService {
    fn name(&self) -> &str {
        "local-mean"
    }

    fn invoke(&self, payload: &str) -> Result<CsvPayload, PipelineError> {
        let mean = self.latest_mean()?;
        let values: Vec<String> = payload
            .lines()
            .filter(|line| !line.is_empty())
            .map(|_| mean.to_string())
            .collect();
        Ok(values.join(","))
    }
}

/// Default demo configuration over a synthetic customer table.
pub fn demo_config() -> Result<PipelineConfig, PipelineError> {
    let schema = Schema::new(vec![
        ColumnSpec::categorical("size_class"),
        ColumnSpec::categorical("gender"),
        ColumnSpec::categorical("experience"),
        ColumnSpec::continuous("visits"),
        ColumnSpec::continuous("avg_fee"),
        ColumnSpec::continuous("evening_share"),
        ColumnSpec::target("revenue"),
    ])?;
    let mut config = PipelineConfig::new(
        "demo",
        "ltv-demo",
        "s3://demo/raw/customers.csv".parse()?,
        schema,
        vec!["size_class".into(), "gender".into(), "experience".into()],
    );
    config.training.image = "local/mean-regressor:1".into();
    config.training.role = "local".into();
    config.poll = PollConfig::every(Duration::from_millis(50));
    Ok(config)
}

/// Headed CSV of `rows` synthetic customers.
pub fn synthetic_customers(rows: usize, seed: u64) -> Result<String, PipelineError> {
    let mut rng = DeterministicRng::new(seed);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "size_class",
        "gender",
        "experience",
        "visits",
        "avg_fee",
        "evening_share",
        "revenue",
    ])?;
    for _ in 0..rows {
        let size = rng.random_range(0..SIZE_CLASSES.len());
        let gender = GENDERS[rng.random_range(0..GENDERS.len())];
        let experience = rng.random_range(0..EXPERIENCE.len());
        let visits = rng.random_range(1..60u32);
        let avg_fee = (rng.random_range(5.0..80.0f64) * 100.0).round() / 100.0;
        let evening_share = (rng.random_range(0.0..1.0f64) * 1000.0).round() / 1000.0;
        let noise = rng.random_range(-25.0..25.0f64);
        let revenue = (visits as f64 * avg_fee * (1.0 + 0.15 * size as f64)
            + 40.0 * experience as f64
            + noise)
            .max(0.0);
        writer.write_record([
            SIZE_CLASSES[size].to_string(),
            gender.to_string(),
            EXPERIENCE[experience].to_string(),
            visits.to_string(),
            avg_fee.to_string(),
            evening_share.to_string(),
            format!("{revenue:.2}"),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| PipelineError::Csv(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| PipelineError::Csv(err.to_string()))
}

/// Use `loaded` or the demo config, writing synthetic data if the source is missing.
pub fn seed_demo_store(
    store: &FsObjectStore,
    loaded: Option<PipelineConfig>,
) -> Result<PipelineConfig, Box<dyn Error>> {
    let config = match loaded {
        Some(config) => config,
        None => demo_config()?,
    };
    match store.get(&config.source) {
        Ok(_) => {}
        Err(PipelineError::NotFound { .. }) => {
            let csv = synthetic_customers(DEMO_ROWS, config.seed)?;
            store.put(&config.source, csv.as_bytes())?;
            println!(
                "Wrote {} synthetic customers to {}",
                DEMO_ROWS, config.source
            );
        }
        Err(err) => return Err(err.into()),
    }
    Ok(config)
}
