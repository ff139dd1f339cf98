//! Object storage access.
//!
//! `ObjectStore` is the only seam the pipeline uses for reading source data,
//! uploading split CSVs, and fetching batch-transform output. Writes replace
//! any existing object; reads of a missing object fail with `NotFound`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::artifacts::URI_SCHEME;
use crate::errors::PipelineError;
use crate::types::{BucketName, ObjectKey};

/// Filesystem-backed object store.
pub mod fs;
/// In-memory object store.
pub mod memory;

pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;

/// Bucket plus key, written as `s3://bucket/key`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectUri {
    /// Bucket name.
    pub bucket: BucketName,
    /// Key inside the bucket; may be empty for a bucket-level prefix.
    pub key: ObjectKey,
}

impl ObjectUri {
    /// Build a URI from parts, trimming redundant slashes from the key.
    pub fn new(bucket: impl Into<BucketName>, key: impl AsRef<str>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.as_ref().trim_matches('/').to_string(),
        }
    }

    /// Child URI with `segment` appended to the key.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_matches('/');
        let key = if self.key.is_empty() {
            segment.to_string()
        } else if segment.is_empty() {
            self.key.clone()
        } else {
            format!("{}/{}", self.key, segment)
        };
        Self {
            bucket: self.bucket.clone(),
            key,
        }
    }

    /// Last key segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.key.rsplit('/').next().filter(|name| !name.is_empty())
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{URI_SCHEME}{}", self.bucket)
        } else {
            write!(f, "{URI_SCHEME}{}/{}", self.bucket, self.key)
        }
    }
}

impl FromStr for ObjectUri {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let rest = raw.trim().strip_prefix(URI_SCHEME).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "object URI '{raw}' must start with '{URI_SCHEME}'"
            ))
        })?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "object URI '{raw}' is missing a bucket"
            )));
        }
        Ok(ObjectUri::new(bucket, key))
    }
}

impl TryFrom<String> for ObjectUri {
    type Error = PipelineError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ObjectUri> for String {
    fn from(uri: ObjectUri) -> Self {
        uri.to_string()
    }
}

/// Object storage backend.
pub trait ObjectStore: Send + Sync {
    /// Read the full object at `uri`; `NotFound` when it does not exist.
    fn get(&self, uri: &ObjectUri) -> Result<Vec<u8>, PipelineError>;
    /// Write `bytes` at `uri`, replacing any existing object.
    fn put(&self, uri: &ObjectUri, bytes: &[u8]) -> Result<(), PipelineError>;
    /// List object URIs whose key starts with `prefix.key`, sorted.
    fn list(&self, prefix: &ObjectUri) -> Result<Vec<ObjectUri>, PipelineError>;

    /// Read the object at `uri` as UTF-8 text.
    fn get_string(&self, uri: &ObjectUri) -> Result<String, PipelineError> {
        let bytes = self.get(uri)?;
        String::from_utf8(bytes).map_err(|err| PipelineError::Storage {
            uri: uri.to_string(),
            reason: format!("object is not valid UTF-8: {err}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_key() {
        let uri: ObjectUri = "s3://analytics/ltv/train/train.csv".parse().unwrap();
        assert_eq!(uri.bucket, "analytics");
        assert_eq!(uri.key, "ltv/train/train.csv");
        assert_eq!(uri.file_name(), Some("train.csv"));
        assert_eq!(uri.to_string(), "s3://analytics/ltv/train/train.csv");
    }

    #[test]
    fn rejects_foreign_schemes_and_missing_bucket() {
        assert!(matches!(
            "https://example.com/x".parse::<ObjectUri>(),
            Err(PipelineError::Configuration(_))
        ));
        assert!("s3:///key".parse::<ObjectUri>().is_err());
    }

    #[test]
    fn join_normalizes_slashes() {
        let root: ObjectUri = "s3://bucket".parse().unwrap();
        assert_eq!(root.join("/prefix/").join("a.csv").key, "prefix/a.csv");
        assert_eq!(root.file_name(), None);
    }
}
