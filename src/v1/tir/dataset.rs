//! EOS datasets: object storage buckets or persistent disks mounted into nodes
//! and endpoints. Datasets cannot be changed once created.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::{
    client::{Scope, TirClient},
    de::{id_string, nullable},
    deleted, found,
    transport::ApiError,
    TirManager, TirResource, TirResourceCreator, TirType,
};
use crate::v1::manager::{ManagerError, ResourceManager};

const DATASETS: &str = "datasets";

pub type DatasetManager = TirManager<DatasetConfig, DatasetState>;
pub type Dataset<'a> = TirResource<'a, DatasetConfig, DatasetState>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStorage {
    #[default]
    NewBucket,
    ExistingBucket,
    Disk,
}

impl DatasetStorage {
    pub fn wire_name(self) -> &'static str {
        match self {
            DatasetStorage::NewBucket => "managed",
            DatasetStorage::ExistingBucket => "e2e_s3",
            DatasetStorage::Disk => "pvc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionType {
    #[serde(rename = "user_managed")]
    UserManaged,
    #[serde(rename = "e2e_managed")]
    ProviderManaged,
}

impl EncryptionType {
    pub fn wire_name(self) -> &'static str {
        match self {
            EncryptionType::UserManaged => "sse-c",
            EncryptionType::ProviderManaged => "sse-kms",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub storage_type: DatasetStorage,
    #[serde(default)]
    pub encryption_enable: bool,
    #[serde(default)]
    pub encryption_type: Option<EncryptionType>,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default = "default_disk_size")]
    pub disk_size: u32,
    #[serde(default)]
    pub pvc_type: String,
    #[serde(flatten)]
    pub scope: Scope,
}

fn default_disk_size() -> u32 {
    10
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: Default::default(),
            storage_type: Default::default(),
            encryption_enable: false,
            encryption_type: None,
            bucket_name: Default::default(),
            disk_size: default_disk_size(),
            pvc_type: Default::default(),
            scope: Default::default(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetState {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created_at: String,
    pub storage_type: String,
    pub encryption_enable: bool,
    pub encryption_type: Option<String>,
    pub bucket_name: String,
    pub bucket_url: String,
    pub bucket_endpoint: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PvcDetails<'a> {
    pub disk_size: u32,
    pub pvc_type: &'a str,
}

/// Body of `POST .../datasets/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetPayload<'a> {
    pub name: &'a str,
    pub encryption_enable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_type: Option<&'static str>,
    pub storage_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvc: Option<PvcDetails<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<&'a str>,
}

impl<'a> TryFrom<&'a DatasetConfig> for DatasetPayload<'a> {
    type Error = ManagerError;

    fn try_from(config: &'a DatasetConfig) -> Result<Self, Self::Error> {
        let encryption_type = match (config.encryption_enable, config.encryption_type) {
            (true, Some(encryption)) => Some(encryption.wire_name()),
            (true, None) => {
                return Err(ManagerError::InvalidConfig(
                    "encryption_type is required when encryption_enable is set".to_string(),
                ))
            }
            (false, _) => None,
        };
        let mut payload = Self {
            name: &config.name,
            encryption_enable: config.encryption_enable,
            encryption_type,
            storage_type: config.storage_type.wire_name(),
            pvc: None,
            bucket_name: None,
        };
        match config.storage_type {
            DatasetStorage::ExistingBucket if config.bucket_name.trim().is_empty() => {
                return Err(ManagerError::InvalidConfig(
                    "bucket_name is required for an existing bucket".to_string(),
                ))
            }
            DatasetStorage::ExistingBucket => payload.bucket_name = Some(&config.bucket_name),
            DatasetStorage::Disk => {
                payload.pvc = Some(PvcDetails {
                    disk_size: config.disk_size,
                    pvc_type: &config.pvc_type,
                })
            }
            DatasetStorage::NewBucket => {}
        }
        Ok(payload)
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BucketDetails {
    #[serde(default, deserialize_with = "nullable")]
    pub bucket_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub bucket_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub endpoint: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AccessKey {
    #[serde(default, deserialize_with = "nullable")]
    pub access_key: String,
    #[serde(default, deserialize_with = "nullable")]
    pub secret_key: String,
}

/// `data` of the dataset endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDetails {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub storage_type: String,
    #[serde(default, deserialize_with = "nullable")]
    pub encryption_enable: bool,
    #[serde(default)]
    pub encryption_type: Option<String>,
    #[serde(default)]
    pub bucket: Option<BucketDetails>,
    #[serde(default)]
    pub access_key: Option<AccessKey>,
}

impl From<DatasetDetails> for DatasetState {
    fn from(details: DatasetDetails) -> Self {
        let bucket = details.bucket.unwrap_or_default();
        let access_key = details.access_key.unwrap_or_default();
        Self {
            id: details.id,
            name: details.name,
            status: details.status,
            created_at: details.created_at,
            storage_type: details.storage_type,
            encryption_enable: details.encryption_enable,
            encryption_type: details.encryption_type,
            bucket_name: bucket.bucket_name,
            bucket_url: bucket.bucket_url,
            bucket_endpoint: bucket.endpoint,
            access_key: access_key.access_key,
            secret_key: access_key.secret_key,
        }
    }
}

impl TirClient {
    pub async fn new_dataset(
        &self,
        scope: &Scope,
        payload: &DatasetPayload<'_>,
    ) -> Result<DatasetDetails, ApiError> {
        self.transport().send(scope.post(DATASETS).json(payload)?).await
    }
    pub async fn get_dataset(&self, scope: &Scope, id: &str) -> Result<DatasetDetails, ApiError> {
        self.transport().send(scope.get(DATASETS, id)).await
    }
    pub async fn delete_dataset(&self, scope: &Scope, id: &str) -> Result<(), ApiError> {
        self.transport()
            .request(scope.delete(DATASETS, id))
            .await
            .map(|_| ())
    }
}

impl TirResourceCreator for Dataset<'_> {
    type Config = DatasetConfig;
    type State = DatasetState;
    fn r#type() -> TirType {
        TirType::Dataset
    }
    fn manager(
        handle: &Handle,
        client: &TirClient,
    ) -> Arc<dyn ResourceManager<Self::Config, Self::State>> {
        DatasetManager::new(handle, client).arc()
    }
}

impl ResourceManager<DatasetConfig, DatasetState> for DatasetManager {
    fn create(&self, config: &DatasetConfig) -> Result<DatasetState, ManagerError> {
        let payload = DatasetPayload::try_from(config)?;
        let details = self
            .block_on(self.client.new_dataset(&config.scope, &payload))
            .map_err(ManagerError::CreateFail)?;
        tracing::info!("Dataset {} created with id {}", config.name, details.id);
        let mut state = DatasetState::from(details);
        if state.name.is_empty() {
            state.name = config.name.clone();
        }
        if state.storage_type.is_empty() {
            state.storage_type = payload.storage_type.to_string();
        }
        Ok(state)
    }

    fn read(
        &self,
        config: &DatasetConfig,
        latest: &DatasetState,
    ) -> Result<Option<DatasetState>, ManagerError> {
        found(self.block_on(self.client.get_dataset(&config.scope, &latest.id)))
            .map(|details| details.map(DatasetState::from))
    }

    fn update(
        &self,
        _previous: &DatasetConfig,
        _config: &DatasetConfig,
        latest: &DatasetState,
    ) -> Result<DatasetState, ManagerError> {
        tracing::warn!("Dataset {} cannot be modified, keeping it as is", latest.id);
        Ok(latest.clone())
    }

    fn delete(&self, config: &DatasetConfig, latest: &DatasetState) -> Result<bool, ManagerError> {
        deleted(self.block_on(self.client.delete_dataset(&config.scope, &latest.id)))
    }
}
