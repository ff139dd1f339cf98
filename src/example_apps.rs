use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, error::ErrorKind};

use crate::config::PipelineConfig;
use crate::encoding::one_hot_encode;
use crate::http::{HttpEndpoint, HttpJobGateway};
use crate::inference::{PredictionEndpoint, TransformService};
use crate::loader::load_table;
use crate::metrics::ResidualDiagnostics;
use crate::pipeline::{Evaluation, Pipeline, PipelineServices};
use crate::splits::{SplitRatios, split_table};
use crate::training::TrainingService;
use crate::transport::FsObjectStore;
use crate::writer::split_csv;

/// Seeds the object store with demo data and returns the config to run.
///
/// Receives the config loaded from `--config`, if one was given.
pub type SeedStore<'a> = dyn FnOnce(&FsObjectStore, Option<PipelineConfig>) -> Result<PipelineConfig, Box<dyn Error>>
    + 'a;

#[derive(Debug, Parser)]
#[command(
    name = "ltv_demo",
    disable_help_subcommand = true,
    about = "Run the lifetime-revenue pipeline end to end",
    long_about = "Load, encode, split, and upload the customer table, train a model, score the test split with a batch transform job and a hosted endpoint, then export predictions and residual diagnostics.",
    after_help = "Without --gateway-url/--endpoint-url the demo uses a local simulated service backed by the same object store."
)]
struct LtvDemoCli {
    #[arg(
        long = "store-root",
        value_name = "DIR",
        default_value = ".ltv_store",
        help = "Directory backing the filesystem object store"
    )]
    store_root: PathBuf,
    #[arg(long, value_name = "PATH", help = "Optional pipeline config JSON")]
    config: Option<PathBuf>,
    #[arg(long, help = "Optional shuffle seed override")]
    seed: Option<u64>,
    #[arg(
        long = "split-ratios",
        value_name = "TRAIN,VALIDATION,TEST",
        value_parser = parse_split_ratios_arg,
        help = "Comma-separated split ratios that must sum to 1.0"
    )]
    split: Option<SplitRatios>,
    #[arg(
        long = "chunk-size",
        value_parser = parse_positive_usize,
        help = "Rows per synchronous endpoint request"
    )]
    chunk_size: Option<usize>,
    #[arg(
        long = "poll-interval-ms",
        help = "Delay between job status checks, in milliseconds"
    )]
    poll_interval_ms: Option<u64>,
    #[arg(
        long = "max-attempts",
        value_parser = parse_positive_usize,
        help = "Give up after this many status checks"
    )]
    max_attempts: Option<usize>,
    #[arg(
        long = "gateway-url",
        value_name = "URL",
        help = "Job gateway base URL for training and batch transform"
    )]
    gateway_url: Option<String>,
    #[arg(
        long = "endpoint-url",
        value_name = "URL",
        help = "Hosted model invocation URL"
    )]
    endpoint_url: Option<String>,
    #[arg(
        long = "skip-endpoint",
        help = "Skip synchronous endpoint scoring"
    )]
    skip_endpoint: bool,
    #[arg(
        long = "diagnostics-out",
        value_name = "PATH",
        help = "Write batch residual diagnostics JSON to this file"
    )]
    diagnostics_out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(
    name = "split_preview",
    disable_help_subcommand = true,
    about = "Preview encoding and splitting without uploading",
    long_about = "Load and one-hot encode the customer table, split it with the configured seed, and print split sizes plus the first CSV lines each split file would contain."
)]
struct SplitPreviewCli {
    #[arg(
        long = "store-root",
        value_name = "DIR",
        default_value = ".ltv_store",
        help = "Directory backing the filesystem object store"
    )]
    store_root: PathBuf,
    #[arg(long, value_name = "PATH", help = "Optional pipeline config JSON")]
    config: Option<PathBuf>,
    #[arg(long, help = "Optional shuffle seed override")]
    seed: Option<u64>,
    #[arg(
        long = "split-ratios",
        value_name = "TRAIN,VALIDATION,TEST",
        value_parser = parse_split_ratios_arg,
        help = "Comma-separated split ratios that must sum to 1.0"
    )]
    split: Option<SplitRatios>,
    #[arg(
        long,
        default_value_t = 3,
        help = "CSV lines to print per split"
    )]
    lines: usize,
}

/// Run the full pipeline.
///
/// `seed_store` prepares the store and config; `build_backend` supplies the
/// services used when no gateway or endpoint URL is given.
pub fn run_ltv_demo<I, Build, B>(
    args_iter: I,
    seed_store: Box<SeedStore<'_>>,
    build_backend: Build,
) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
    Build: FnOnce(Arc<FsObjectStore>) -> B,
    B: TrainingService + TransformService + PredictionEndpoint,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) =
        parse_cli::<LtvDemoCli, _>(std::iter::once("ltv_demo".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let store = Arc::new(FsObjectStore::new(&cli.store_root));
    let loaded = cli
        .config
        .as_ref()
        .map(PipelineConfig::from_json_file)
        .transpose()?;
    let mut config = seed_store(store.as_ref(), loaded)?;
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(split) = cli.split {
        config.split = split;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(interval_ms) = cli.poll_interval_ms {
        config.poll.interval_ms = interval_ms;
    }
    if cli.max_attempts.is_some() {
        config.poll.max_attempts = cli.max_attempts;
    }

    let backend = build_backend(store.clone());
    let gateway = cli.gateway_url.as_deref().map(HttpJobGateway::new);
    let (training, transform): (&dyn TrainingService, &dyn TransformService) = match &gateway {
        Some(gateway) => (
            gateway as &dyn TrainingService,
            gateway as &dyn TransformService,
        ),
        None => (
            &backend as &dyn TrainingService,
            &backend as &dyn TransformService,
        ),
    };
    let services = PipelineServices {
        store: store.as_ref(),
        training,
        transform,
    };

    println!("Object store root: {}", cli.store_root.display());
    println!("Data root        : {}", config.data_root());
    let pipeline = Pipeline::new(&config, services)?;

    let prepared = pipeline.prepare()?;
    println!(
        "Indicator columns: {}",
        prepared.indicator_columns.join(", ")
    );
    println!(
        "Split rows       : train={} validation={} test={}",
        prepared.tables.train.height(),
        prepared.tables.validation.height(),
        prepared.tables.test.height()
    );
    println!("Train CSV        : {}", prepared.locations.train);
    println!("Validation CSV   : {}", prepared.locations.validation);
    println!("Test CSV         : {}", prepared.locations.test);

    let model = pipeline.train(&prepared)?;
    println!("Model            : {} ({})", model.model_name, model.artifacts);

    let (transform_job, batch) = pipeline.batch_evaluate(&prepared, &model)?;
    println!("Transform job    : {transform_job}");
    print_evaluation("batch transform", &batch);

    if !cli.skip_endpoint {
        let remote = cli
            .endpoint_url
            .as_deref()
            .map(|url| HttpEndpoint::new(model.model_name.clone(), url));
        let endpoint: &dyn PredictionEndpoint = match &remote {
            Some(remote) => remote as &dyn PredictionEndpoint,
            None => &backend as &dyn PredictionEndpoint,
        };
        let online = pipeline.endpoint_evaluate(&prepared, endpoint)?;
        print_evaluation("endpoint", &online);
    }

    if let Some(path) = cli.diagnostics_out {
        fs::write(&path, batch.diagnostics.to_json()?)?;
        println!("Diagnostics      : {}", path.display());
    }
    Ok(())
}

/// Preview encoding and splitting for the configured dataset.
pub fn run_split_preview<I>(
    args_iter: I,
    seed_store: Box<SeedStore<'_>>,
) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<SplitPreviewCli, _>(
        std::iter::once("split_preview".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let store = FsObjectStore::new(&cli.store_root);
    let loaded = cli
        .config
        .as_ref()
        .map(PipelineConfig::from_json_file)
        .transpose()?;
    let mut config = seed_store(&store, loaded)?;
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(split) = cli.split {
        config.split = split;
    }
    config.validate()?;

    let table = load_table(&store, &config.source, &config.schema)?;
    let columns: Vec<&str> = config
        .categorical_columns
        .iter()
        .map(String::as_str)
        .collect();
    let encoded = one_hot_encode(&table, &columns)?;
    for group in &encoded.groups {
        println!(
            "{} -> {}",
            group.column,
            group.indicator_names().join(", ")
        );
    }
    let tables = split_table(&encoded.table, config.seed, config.split)?;
    println!(
        "seed={} rows={} split={:.2}/{:.2}/{:.2}",
        config.seed,
        encoded.table.height(),
        config.split.train,
        config.split.validation,
        config.split.test
    );
    for (label, split) in tables.iter() {
        println!("--- {label} ({} rows) ---", split.height());
        let csv = split_csv(split, label)?;
        for line in csv.lines().take(cli.lines) {
            println!("{line}");
        }
    }
    Ok(())
}

fn print_evaluation(label: &str, evaluation: &Evaluation) {
    let ResidualDiagnostics {
        rmse,
        mae,
        mean_residual,
        ..
    } = &evaluation.diagnostics;
    println!("--- {label} ---");
    println!("rows          : {}", evaluation.predictions.len());
    println!("rmse          : {rmse:.4}");
    println!("mae           : {mae:.4}");
    println!("mean residual : {mean_residual:.4}");
    println!("export        : {}", evaluation.export);
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{raw}' as a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

fn parse_split_ratios_arg(raw: &str) -> Result<SplitRatios, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [train, validation, test] = parts.as_slice() else {
        return Err("--split-ratios expects exactly 3 comma-separated values".to_string());
    };
    let parse = |name: &str, value: &str| {
        value
            .parse::<f64>()
            .map_err(|_| format!("invalid {name} ratio '{value}': must be a float"))
    };
    SplitRatios {
        train: parse("train", *train)?,
        validation: parse("validation", *validation)?,
        test: parse("test", *test)?,
    }
    .normalized()
    .map_err(|err| err.to_string())
}
