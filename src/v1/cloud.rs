use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::runtime::Handle;

use super::{
    datastore::{Datastore, DatastoreError},
    manifest::{Manifest, ManifestError},
    plan::{PlanError, SharedPlan},
    registry::{RegistryError, ResourceSerdeProvider, SharedRegistry},
    tir::{client::TirClient, TirProvider, PROVIDER_NAME},
};

#[derive(Default)]
pub struct TirCloud {
    plan: SharedPlan,
    datastore: Datastore,
    registry: Option<SharedRegistry>,
}

impl TirCloud {
    pub fn new(datastore: Datastore) -> Self {
        Self {
            plan: SharedPlan::default(),
            datastore,
            registry: None,
        }
    }

    pub fn init_registry(&mut self, handle: Handle, client: TirClient) {
        let plan = self.plan.clone();
        self.registry = Some(SharedRegistry::new(Box::new(
            move |r| -> Result<Arc<Mutex<dyn ResourceSerdeProvider>>, RegistryError> {
                if r.name == PROVIDER_NAME {
                    Ok(
                        Arc::new(Mutex::new(TirProvider::new(&handle, plan.clone(), client.clone())))
                            as Arc<Mutex<dyn ResourceSerdeProvider>>,
                    )
                } else {
                    Err(RegistryError::ProviderNotFound(r.name.to_string()))
                }
            },
        )));
    }

    /// Provider that declares resources into this cloud's plan.
    pub fn tir_provider(&self, handle: &Handle, client: TirClient) -> TirProvider {
        TirProvider::new(handle, self.plan.clone(), client)
    }

    /// Declares every resource of `manifest`; returns their ids.
    pub fn declare(&self, tir: &TirProvider, manifest: &Manifest) -> Result<Vec<String>, CloudError> {
        Ok(manifest.declare(tir)?)
    }

    pub fn datastore(&self) -> &Datastore {
        &self.datastore
    }

    pub fn apply(&mut self) -> Result<(), CloudError> {
        self.datastore.reload()?;
        let result = match self.registry.as_ref() {
            Some(registry) => self
                .plan
                .apply(&mut self.datastore, registry)
                .map_err(CloudError::PlanError),
            None => Err(CloudError::RegistryNotInitialized),
        };
        // Whatever was applied before a failure is kept
        self.datastore.save()?;
        result
    }

    pub fn destroy(&mut self) -> Result<(), CloudError> {
        self.datastore.reload()?;
        let result = match self.registry.as_ref() {
            Some(registry) => self
                .plan
                .destroy(&mut self.datastore, registry)
                .map_err(CloudError::PlanError),
            None => Err(CloudError::RegistryNotInitialized),
        };
        self.datastore.save()?;
        result
    }
}

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("DatastoreError: {0}")]
    DatastoreError(#[from] DatastoreError),
    #[error("PlanError: {0}")]
    PlanError(PlanError),
    #[error("ManifestError: {0}")]
    ManifestError(#[from] ManifestError),
    #[error("Registry not initialized")]
    RegistryNotInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::{config::ProviderConfig, storage::memory::MemoryStorage};

    fn client() -> TirClient {
        TirClient::new(&ProviderConfig::new("key", "token").with_endpoint("http://127.0.0.1:9"))
            .unwrap()
    }

    #[test]
    fn apply_requires_registry() {
        let mut cloud = TirCloud::new(Datastore::new(MemoryStorage::default()));
        assert!(matches!(
            cloud.apply(),
            Err(CloudError::RegistryNotInitialized)
        ));
    }

    #[test]
    fn empty_plan_applies_without_calls() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let storage = MemoryStorage::default();
        let mut cloud = TirCloud::new(Datastore::new(storage.clone()));
        cloud.init_registry(rt.handle().clone(), client());
        cloud.apply().unwrap();
        cloud.destroy().unwrap();
        assert!(storage.snapshot().is_empty());
    }
}
