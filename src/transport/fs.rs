use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::errors::PipelineError;
use crate::transport::{ObjectStore, ObjectUri};

/// Object store that maps `s3://bucket/key` onto `<root>/bucket/key`.
///
/// Buckets and key segments must be plain names; `.` and `..` are rejected so
/// every object stays under `root`.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path backing `uri`.
    pub fn path_for(&self, uri: &ObjectUri) -> Result<PathBuf, PipelineError> {
        let mut path = self.bucket_dir(uri)?;
        for segment in uri.key.split('/').filter(|segment| !segment.is_empty()) {
            path.push(plain_segment(uri, segment)?);
        }
        Ok(path)
    }

    fn bucket_dir(&self, uri: &ObjectUri) -> Result<PathBuf, PipelineError> {
        Ok(self.root.join(plain_segment(uri, &uri.bucket)?))
    }
}

fn plain_segment<'s>(uri: &ObjectUri, segment: &'s str) -> Result<&'s str, PipelineError> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(segment),
        _ => Err(PipelineError::Storage {
            uri: uri.to_string(),
            reason: format!("'{segment}' is not a plain path segment"),
        }),
    }
}

impl ObjectStore for FsObjectStore {
    fn get(&self, uri: &ObjectUri) -> Result<Vec<u8>, PipelineError> {
        let path = self.path_for(uri)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(PipelineError::NotFound {
                uri: uri.to_string(),
            }),
            Err(err) => Err(storage_err(uri, err)),
        }
    }

    fn put(&self, uri: &ObjectUri, bytes: &[u8]) -> Result<(), PipelineError> {
        if uri.key.is_empty() {
            return Err(PipelineError::Storage {
                uri: uri.to_string(),
                reason: "cannot write an object without a key".into(),
            });
        }
        let path = self.path_for(uri)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| storage_err(uri, err))?;
        }
        fs::write(&path, bytes).map_err(|err| storage_err(uri, err))?;
        debug!(
            "[ltv:store] wrote {} bytes to {}",
            bytes.len(),
            path.display()
        );
        Ok(())
    }

    fn list(&self, prefix: &ObjectUri) -> Result<Vec<ObjectUri>, PipelineError> {
        let bucket_root = self.bucket_dir(prefix)?;
        if !bucket_root.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in WalkDir::new(&bucket_root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
        {
            let Ok(relative) = entry.path().strip_prefix(&bucket_root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(&prefix.key) {
                found.push(ObjectUri::new(prefix.bucket.clone(), key));
            }
        }
        found.sort();
        Ok(found)
    }
}

fn storage_err(uri: &ObjectUri, err: io::Error) -> PipelineError {
    PipelineError::Storage {
        uri: uri.to_string(),
        reason: err.to_string(),
    }
}
