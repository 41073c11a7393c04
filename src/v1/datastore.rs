use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;

use super::plan::ResourceItem;
use super::registry::{RegistryError, ResourceType, SharedRegistry};
use super::storage::file::FileStorage;

/// Last applied config and state of every managed resource, keyed by
/// resource id.
#[derive(Clone)]
pub struct Datastore {
    inner: HashMap<String, Vec<u8>>,
    storage: Arc<dyn Storage + Send + Sync>,
}

impl Default for Datastore {
    fn default() -> Self {
        Datastore::new(FileStorage::default())
    }
}

pub trait Storage {
    fn load(&self) -> Result<HashMap<String, Vec<u8>>, DatastoreError>;
    fn save(&self, data: &HashMap<String, Vec<u8>>) -> Result<(), DatastoreError>;
}

#[derive(Serialize, Deserialize)]
struct ResourceItemWrapper {
    resource_type: ResourceType,
    resource: Value,
}

impl Datastore {
    pub fn new(storage: impl Storage + 'static + Send + Sync) -> Self {
        Self {
            inner: Default::default(),
            storage: Arc::new(storage),
        }
    }
    pub fn reload(&mut self) -> Result<HashMap<String, Vec<u8>>, DatastoreError> {
        let data = self
            .storage
            .load()
            .map_err(|e| DatastoreError::LoadError(e.to_string()))?;
        for k in data.keys() {
            tracing::debug!("Resource[{}] loaded from datastore", k);
        }
        Ok(std::mem::replace(&mut self.inner, data))
    }
    pub fn save(&self) -> Result<(), DatastoreError> {
        tracing::debug!("Saving {} resources to storage", self.inner.len());
        self.storage.save(&self.inner)
    }
    pub fn insert_resource(
        &mut self,
        registry: &SharedRegistry,
        resource: &dyn ResourceItem,
    ) -> Result<Option<Vec<u8>>, DatastoreError> {
        let id = resource.id();
        let resource_type = resource.resource_type();
        let wrapper = ResourceItemWrapper {
            resource: registry.serialize_resource(resource, &resource_type)?,
            resource_type,
        };
        let bytes = serde_json::to_vec(&wrapper)?;
        tracing::debug!("Insert Resource[{}] to datastore", id);
        Ok(self.inner.insert(id, bytes))
    }

    pub fn get(
        &self,
        registry: &SharedRegistry,
        id: &str,
    ) -> Result<Option<Arc<dyn ResourceItem>>, DatastoreError> {
        let Some(data) = self.inner.get(id) else {
            return Ok(None);
        };
        let wrapper = serde_json::from_slice::<ResourceItemWrapper>(data)?;
        Ok(Some(registry.deserialize_resource(
            &wrapper.resource,
            &wrapper.resource_type,
        )?))
    }
    pub fn remove(&mut self, id: &str) -> Option<Vec<u8>> {
        tracing::debug!("Remove Resource[{}] from datastore", id);
        self.inner.remove(id)
    }
    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }
    pub fn keys(&self) -> Vec<String> {
        self.inner.keys().cloned().collect()
    }
}

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("Load error: {0}")]
    LoadError(String),
    #[error("IO error: {0}")]
    IOError(#[from] io::Error),
    #[error("Storage encoding error: {0}")]
    BincodeError(#[from] bincode::Error),
    #[error("Resource encoding error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Registry error: {0}")]
    RegistryError(#[from] RegistryError),
}
