//! Private clusters: dedicated nodes that endpoints can be scheduled on.
//! A cluster cannot be changed once created.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::{
    client::{Scope, TirClient},
    de::{id_string, int_or_string, nullable},
    deleted, found,
    sku::{Currency, SkuDetails, SkuType},
    transport::ApiError,
    TirManager, TirResource, TirResourceCreator, TirType,
};
use crate::v1::manager::{ManagerError, ResourceManager};

const PRIVATE_CLUSTERS: &str = "private-cluster";
const CATEGORY: &str = "private_cloud";

pub type PrivateClusterManager = TirManager<PrivateClusterConfig, PrivateClusterState>;
pub type PrivateCluster<'a> = TirResource<'a, PrivateClusterConfig, PrivateClusterState>;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateClusterConfig {
    pub name: String,
    pub nodes_count: u32,
    pub sku_name: String,
    pub sku_type: SkuType,
    #[serde(default)]
    pub committed_days: u32,
    #[serde(default)]
    pub committed_instance_policy: String,
    pub location: String,
    pub currency: Currency,
    #[serde(flatten)]
    pub scope: Scope,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateClusterState {
    pub id: String,
    pub name: String,
    pub nodes_count: i64,
    pub sku_name: String,
    pub sku_type: Option<SkuType>,
    pub committed_days: i64,
    pub currency: Option<Currency>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivateClusterPayload<'a> {
    pub name: &'a str,
    pub nodes_count: u32,
    pub sku_name: &'a str,
    pub sku_type: SkuType,
    pub committed_days: u32,
    pub committed_instance_policy: &'a str,
    pub location: &'a str,
    pub currency: Currency,
    pub category: &'static str,
}

impl<'a> From<&'a PrivateClusterConfig> for PrivateClusterPayload<'a> {
    fn from(config: &'a PrivateClusterConfig) -> Self {
        Self {
            name: &config.name,
            nodes_count: config.nodes_count,
            sku_name: &config.sku_name,
            sku_type: config.sku_type,
            committed_days: config.committed_days,
            committed_instance_policy: &config.committed_instance_policy,
            location: &config.location,
            currency: config.currency,
            category: CATEGORY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrivateClusterDetails {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "int_or_string")]
    pub nodes_count: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub sku_details: SkuDetails,
}

impl From<PrivateClusterDetails> for PrivateClusterState {
    fn from(details: PrivateClusterDetails) -> Self {
        Self {
            id: details.id,
            name: details.name,
            nodes_count: details.nodes_count,
            sku_name: details.sku_details.specs.name,
            sku_type: details.sku_details.plan.sku_type,
            committed_days: details.sku_details.plan.committed_days,
            currency: details.sku_details.plan.currency,
            created_at: details.created_at,
        }
    }
}

impl TirClient {
    /// Unlike the other collections, cluster creation answers 200.
    pub async fn new_private_cluster(
        &self,
        scope: &Scope,
        payload: &PrivateClusterPayload<'_>,
    ) -> Result<PrivateClusterDetails, ApiError> {
        let call = scope
            .post(PRIVATE_CLUSTERS)
            .expect(StatusCode::OK)
            .json(payload)?;
        self.transport().send(call).await
    }
    pub async fn get_private_cluster(
        &self,
        scope: &Scope,
        id: &str,
    ) -> Result<PrivateClusterDetails, ApiError> {
        self.transport().send(scope.get(PRIVATE_CLUSTERS, id)).await
    }
    pub async fn delete_private_cluster(&self, scope: &Scope, id: &str) -> Result<(), ApiError> {
        self.transport()
            .request(scope.delete(PRIVATE_CLUSTERS, id))
            .await
            .map(|_| ())
    }
}

impl TirResourceCreator for PrivateCluster<'_> {
    type Config = PrivateClusterConfig;
    type State = PrivateClusterState;
    fn r#type() -> TirType {
        TirType::PrivateCluster
    }
    fn manager(
        handle: &Handle,
        client: &TirClient,
    ) -> Arc<dyn ResourceManager<Self::Config, Self::State>> {
        PrivateClusterManager::new(handle, client).arc()
    }
}

impl ResourceManager<PrivateClusterConfig, PrivateClusterState> for PrivateClusterManager {
    fn create(&self, config: &PrivateClusterConfig) -> Result<PrivateClusterState, ManagerError> {
        let details = self
            .block_on(
                self.client
                    .new_private_cluster(&config.scope, &PrivateClusterPayload::from(config)),
            )
            .map_err(ManagerError::CreateFail)?;
        tracing::info!("Private cluster {} created with id {}", config.name, details.id);
        let mut state = PrivateClusterState::from(details);
        if state.name.is_empty() {
            state.name = config.name.clone();
        }
        if state.nodes_count == 0 {
            state.nodes_count = config.nodes_count.into();
        }
        if state.sku_name.is_empty() {
            state.sku_name = config.sku_name.clone();
        }
        state.sku_type = state.sku_type.or(Some(config.sku_type));
        state.currency = state.currency.or(Some(config.currency));
        if state.committed_days == 0 {
            state.committed_days = config.committed_days.into();
        }
        Ok(state)
    }

    fn read(
        &self,
        config: &PrivateClusterConfig,
        latest: &PrivateClusterState,
    ) -> Result<Option<PrivateClusterState>, ManagerError> {
        found(self.block_on(self.client.get_private_cluster(&config.scope, &latest.id)))
            .map(|details| details.map(PrivateClusterState::from))
    }

    fn update(
        &self,
        _previous: &PrivateClusterConfig,
        _config: &PrivateClusterConfig,
        latest: &PrivateClusterState,
    ) -> Result<PrivateClusterState, ManagerError> {
        Err(ManagerError::CannotSyncWithoutRecreate(format!(
            "private cluster {} cannot be modified, destroy and apply it again",
            latest.id
        )))
    }

    fn delete(
        &self,
        config: &PrivateClusterConfig,
        latest: &PrivateClusterState,
    ) -> Result<bool, ManagerError> {
        deleted(self.block_on(self.client.delete_private_cluster(&config.scope, &latest.id)))
    }
}
