use crate::splits::SplitLabel;

/// Constants used by the splitter.
pub mod splits {
    use super::SplitLabel;

    /// Default shuffle seed used when the caller does not supply one.
    pub const DEFAULT_SPLIT_SEED: u64 = 1729;
    /// Default fraction of rows assigned to train.
    pub const DEFAULT_TRAIN_FRACTION: f64 = 0.7;
    /// Default fraction of rows assigned to validation.
    pub const DEFAULT_VALIDATION_FRACTION: f64 = 0.2;
    /// Default fraction of rows assigned to test.
    pub const DEFAULT_TEST_FRACTION: f64 = 0.1;
    /// Tolerance used when validating that ratios sum to one.
    pub const RATIO_SUM_TOLERANCE: f64 = 1e-6;
    /// Slack added before flooring cut points so `0.9 * 90` lands on 81, not 80.
    pub const CUT_EPSILON: f64 = 1e-6;
    /// Canonical split order; also the slicing order of the permutation.
    pub const ALL_SPLITS: [SplitLabel; 3] =
        [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test];
}

/// Constants used by the encoder.
pub mod encoding {
    /// Separator between the source column and the category value in indicator names.
    pub const INDICATOR_SEPARATOR: &str = "_";
}

/// Constants used for dataset artifacts in object storage.
pub mod artifacts {
    /// File name of the training split.
    pub const TRAIN_FILE: &str = "train.csv";
    /// File name of the validation split.
    pub const VALIDATION_FILE: &str = "validation.csv";
    /// File name of the test split (target column dropped).
    pub const TEST_FILE: &str = "test.csv";
    /// Suffix appended to a split stem for exported predictions.
    pub const PREDICTIONS_SUFFIX: &str = "_predictions.csv";
    /// Header of the inserted predictions column.
    pub const PREDICTIONS_COLUMN: &str = "predictions";
    /// Object-store URI scheme.
    pub const URI_SCHEME: &str = "s3://";
}

/// Constants used by synchronous and batch inference.
pub mod inference {
    use std::time::Duration;

    /// Default number of rows sent per synchronous endpoint request.
    pub const DEFAULT_CHUNK_SIZE: usize = 500;
    /// Content type for CSV payloads.
    pub const CSV_CONTENT_TYPE: &str = "text/csv";
    /// Record splitting mode for batch transform input.
    pub const SPLIT_TYPE_LINE: &str = "Line";
    /// Output assembly mode for batch transform output.
    pub const ASSEMBLE_WITH_LINE: &str = "Line";
    /// Compression mode for batch transform input.
    pub const COMPRESSION_NONE: &str = "None";
    /// Suffix the transform service appends to each output object.
    pub const TRANSFORM_OUTPUT_SUFFIX: &str = ".out";
    /// Default cap on concurrent transforms inside one batch job.
    pub const DEFAULT_MAX_CONCURRENT_TRANSFORMS: u32 = 64;
    /// Default maximum request payload for batch transform, in megabytes.
    pub const DEFAULT_MAX_PAYLOAD_MB: u32 = 6;
    /// Default status poll interval.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
}

/// Constants used by the training job client.
pub mod training {
    /// Default compute instance type for training and transform jobs.
    pub const DEFAULT_INSTANCE_TYPE: &str = "ml.m5.xlarge";
    /// Default objective for squared-error regression.
    pub const DEFAULT_OBJECTIVE: &str = "reg:squarederror";
    /// Default maximum tree depth.
    pub const DEFAULT_MAX_DEPTH: u32 = 5;
    /// Default learning rate.
    pub const DEFAULT_ETA: f64 = 0.2;
    /// Default minimum loss reduction for a split.
    pub const DEFAULT_GAMMA: f64 = 4.0;
    /// Default minimum child weight.
    pub const DEFAULT_MIN_CHILD_WEIGHT: f64 = 6.0;
    /// Default row subsample fraction.
    pub const DEFAULT_SUBSAMPLE: f64 = 0.8;
    /// Default number of boosting rounds.
    pub const DEFAULT_NUM_ROUND: u32 = 100;
}

/// Constants used by the evaluator.
pub mod metrics {
    /// Default number of residual histogram bins.
    pub const DEFAULT_HISTOGRAM_BINS: usize = 20;
}

/// Constants used by the HTTP adapters.
pub mod http {
    use std::time::Duration;

    /// Connect timeout for the shared agent.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Read timeout for the shared agent.
    pub const READ_TIMEOUT: Duration = Duration::from_secs(60);
    /// Write timeout for the shared agent.
    pub const WRITE_TIMEOUT: Duration = Duration::from_secs(60);
    /// Upper bound on response bodies read into memory.
    pub const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;
    /// Route for training job submission and description.
    pub const TRAINING_JOBS_ROUTE: &str = "training-jobs";
    /// Route for transform job submission and description.
    pub const TRANSFORM_JOBS_ROUTE: &str = "transform-jobs";
}
