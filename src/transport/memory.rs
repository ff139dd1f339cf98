use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::errors::PipelineError;
use crate::transport::{ObjectStore, ObjectUri};

/// Process-local object store, mainly for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<ObjectUri, Vec<u8>>>,
}

impl InMemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|guard| guard.len()).unwrap_or(0)
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get(&self, uri: &ObjectUri) -> Result<Vec<u8>, PipelineError> {
        self.objects
            .read()
            .map_err(|_| poisoned(uri))?
            .get(uri)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound {
                uri: uri.to_string(),
            })
    }

    fn put(&self, uri: &ObjectUri, bytes: &[u8]) -> Result<(), PipelineError> {
        self.objects
            .write()
            .map_err(|_| poisoned(uri))?
            .insert(uri.clone(), bytes.to_vec());
        Ok(())
    }

    fn list(&self, prefix: &ObjectUri) -> Result<Vec<ObjectUri>, PipelineError> {
        Ok(self
            .objects
            .read()
            .map_err(|_| poisoned(prefix))?
            .keys()
            .filter(|uri| uri.bucket == prefix.bucket && uri.key.starts_with(&prefix.key))
            .cloned()
            .collect())
    }
}

fn poisoned(uri: &ObjectUri) -> PipelineError {
    PipelineError::Storage {
        uri: uri.to_string(),
        reason: "object map lock poisoned".into(),
    }
}
