//! Model repositories hold model weights served by endpoints.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::{
    client::{Scope, TirClient},
    dataset::{AccessKey, BucketDetails},
    de::{id_string, nullable},
    deleted, found,
    transport::ApiError,
    TirManager, TirResource, TirResourceCreator, TirType,
};
use crate::v1::manager::{ManagerError, ResourceManager};

const MODELS: &str = "serving/model";

pub type ModelRepoManager = TirManager<ModelRepoConfig, ModelRepoState>;
pub type ModelRepo<'a> = TirResource<'a, ModelRepoConfig, ModelRepoState>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStorage {
    #[default]
    New,
    Existing,
    External,
}

impl RepoStorage {
    pub fn wire_name(self) -> &'static str {
        match self {
            RepoStorage::New => "managed",
            RepoStorage::Existing => "e2e_s3",
            RepoStorage::External => "external",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRepoConfig {
    pub name: String,
    pub model_type: String,
    pub storage_type: RepoStorage,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(flatten)]
    pub scope: Scope,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRepoState {
    pub id: String,
    pub name: String,
    pub model_type: String,
    pub status: String,
    pub created_at: String,
    pub bucket_name: String,
    pub bucket_url: String,
    pub bucket_endpoint: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRepoPayload<'a> {
    pub model_type: &'a str,
    pub name: &'a str,
    pub bucket_name: &'a str,
    pub secret_key: &'a str,
    pub access_key: &'a str,
    pub storage_type: &'static str,
}

impl<'a> From<&'a ModelRepoConfig> for ModelRepoPayload<'a> {
    fn from(config: &'a ModelRepoConfig) -> Self {
        Self {
            model_type: &config.model_type,
            name: &config.name,
            bucket_name: &config.bucket_name,
            secret_key: &config.secret_key,
            access_key: &config.access_key,
            storage_type: config.storage_type.wire_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelRepoDetails {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub model_type: String,
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    #[serde(default)]
    pub bucket: Option<BucketDetails>,
    #[serde(default)]
    pub access_key: Option<AccessKey>,
}

impl From<ModelRepoDetails> for ModelRepoState {
    fn from(details: ModelRepoDetails) -> Self {
        let bucket = details.bucket.unwrap_or_default();
        let access_key = details.access_key.unwrap_or_default();
        Self {
            id: details.id,
            name: details.name,
            model_type: details.model_type,
            status: details.status,
            created_at: details.created_at,
            bucket_name: bucket.bucket_name,
            bucket_url: bucket.bucket_url,
            bucket_endpoint: bucket.endpoint,
            access_key: access_key.access_key,
            secret_key: access_key.secret_key,
        }
    }
}

impl TirClient {
    pub async fn new_repo(
        &self,
        scope: &Scope,
        payload: &ModelRepoPayload<'_>,
    ) -> Result<ModelRepoDetails, ApiError> {
        self.transport().send(scope.post(MODELS).json(payload)?).await
    }
    pub async fn get_repo(&self, scope: &Scope, id: &str) -> Result<ModelRepoDetails, ApiError> {
        self.transport().send(scope.get(MODELS, id)).await
    }
    pub async fn delete_repo(&self, scope: &Scope, id: &str) -> Result<(), ApiError> {
        self.transport()
            .request(scope.delete(MODELS, id))
            .await
            .map(|_| ())
    }
}

impl TirResourceCreator for ModelRepo<'_> {
    type Config = ModelRepoConfig;
    type State = ModelRepoState;
    fn r#type() -> TirType {
        TirType::ModelRepo
    }
    fn manager(
        handle: &Handle,
        client: &TirClient,
    ) -> Arc<dyn ResourceManager<Self::Config, Self::State>> {
        ModelRepoManager::new(handle, client).arc()
    }
}

impl ResourceManager<ModelRepoConfig, ModelRepoState> for ModelRepoManager {
    fn create(&self, config: &ModelRepoConfig) -> Result<ModelRepoState, ManagerError> {
        let details = self
            .block_on(
                self.client
                    .new_repo(&config.scope, &ModelRepoPayload::from(config)),
            )
            .map_err(ManagerError::CreateFail)?;
        tracing::info!("Model repository {} created with id {}", config.name, details.id);
        let mut state = ModelRepoState::from(details);
        if state.name.is_empty() {
            state.name = config.name.clone();
        }
        if state.model_type.is_empty() {
            state.model_type = config.model_type.clone();
        }
        if state.bucket_name.is_empty() {
            state.bucket_name = config.bucket_name.clone();
        }
        Ok(state)
    }

    fn read(
        &self,
        config: &ModelRepoConfig,
        latest: &ModelRepoState,
    ) -> Result<Option<ModelRepoState>, ManagerError> {
        found(self.block_on(self.client.get_repo(&config.scope, &latest.id)))
            .map(|details| details.map(ModelRepoState::from))
    }

    fn update(
        &self,
        _previous: &ModelRepoConfig,
        _config: &ModelRepoConfig,
        latest: &ModelRepoState,
    ) -> Result<ModelRepoState, ManagerError> {
        tracing::warn!(
            "Model repository {} cannot be modified, keeping it as is",
            latest.id
        );
        Ok(latest.clone())
    }

    fn delete(
        &self,
        config: &ModelRepoConfig,
        latest: &ModelRepoState,
    ) -> Result<bool, ManagerError> {
        deleted(self.block_on(self.client.delete_repo(&config.scope, &latest.id)))
    }
}
