/// Column name as it appears in the source CSV header.
/// Examples: `customer_size`, `monthly_fee`, `lifetime_revenue`
pub type ColumnName = String;
/// Raw categorical value observed in a column.
/// Examples: `small`, `F`, `tier_2`
pub type CategoryValue = String;
/// Name of a remote training or batch-transform job.
/// Example: `ltv-demo-transform-20261017T120000Z`
pub type JobName = String;
/// Object storage bucket name.
/// Example: `analytics-ml`
pub type BucketName = String;
/// Object storage key inside a bucket.
/// Example: `ltv-demo/train/train.csv`
pub type ObjectKey = String;
/// CSV text exchanged with storage or endpoints.
/// Example: `12.5,1,0,0,3.2\n`
pub type CsvPayload = String;
/// Hyperparameter name/value pairs in the wire form the remote service expects.
/// Example: `("max_depth", "5")`
pub type HyperparameterMap = std::collections::BTreeMap<String, String>;
