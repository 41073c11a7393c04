//! Notebook nodes.
//!
//! A node is created running; it can then be stopped and started, moved to
//! another plan, switched to another image or renamed. Only one kind of change
//! is applied per update.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tokio::runtime::Handle;

use super::{
    client::{Scope, TirClient},
    dataset::Dataset,
    de::{id_string, nullable},
    deleted, found,
    sku::{Currency, SkuDetails, SkuType},
    transport::ApiError,
    TirManager, TirResource, TirResourceCreator, TirType,
};
use crate::v1::{
    manager::{ManagerError, ResourceManager},
    resource::ResourceError,
};

const NOTEBOOKS: &str = "notebooks";
const STATUS_STOPPED: &str = "stopped";

pub type NodeManager = TirManager<NodeConfig, NodeState>;
pub type Node<'a> = TirResource<'a, NodeConfig, NodeState>;

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InstanceType {
    FreeUsage,
    #[default]
    PaidUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub image_name: String,
    pub image_version: String,
    pub sku_name: String,
    pub sku_type: SkuType,
    #[serde(default)]
    pub committed_days: u32,
    #[serde(default)]
    pub committed_instance_policy: String,
    pub currency: Currency,
    #[serde(default = "default_location")]
    pub location: String,
    pub instance_type: InstanceType,
    #[serde(default = "default_cluster_type")]
    pub cluster_type: String,
    #[serde(default = "default_disk_size")]
    pub disk_size: u32,
    #[serde(default)]
    pub enable_ssh: bool,
    #[serde(default = "default_image_type")]
    pub image_type: String,
    #[serde(default = "default_true")]
    pub is_jupyterlab_enabled: bool,
    #[serde(default = "default_notebook_type")]
    pub notebook_type: String,
    #[serde(default)]
    pub notebook_url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_sfs_path")]
    pub sfs_path: String,
    #[serde(default)]
    pub add_ons: Vec<String>,
    #[serde(default)]
    pub dataset_id_list: Vec<String>,
    #[serde(default)]
    pub public_keys: Vec<String>,
    #[serde(default)]
    pub stop_node: bool,
    #[serde(flatten)]
    pub scope: Scope,
}

fn default_location() -> String {
    "Delhi".to_string()
}
fn default_cluster_type() -> String {
    "tir-cluster".to_string()
}
fn default_disk_size() -> u32 {
    30
}
fn default_image_type() -> String {
    "pre-built".to_string()
}
fn default_true() -> bool {
    true
}
fn default_notebook_type() -> String {
    "new".to_string()
}
fn default_category() -> String {
    "notebook".to_string()
}
fn default_sfs_path() -> String {
    "/mnt/sfs".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: Default::default(),
            image_name: Default::default(),
            image_version: Default::default(),
            sku_name: Default::default(),
            sku_type: Default::default(),
            committed_days: 0,
            committed_instance_policy: Default::default(),
            currency: Default::default(),
            location: default_location(),
            instance_type: Default::default(),
            cluster_type: default_cluster_type(),
            disk_size: default_disk_size(),
            enable_ssh: false,
            image_type: default_image_type(),
            is_jupyterlab_enabled: true,
            notebook_type: default_notebook_type(),
            notebook_url: Default::default(),
            category: default_category(),
            sfs_path: default_sfs_path(),
            add_ons: vec![],
            dataset_id_list: vec![],
            public_keys: vec![],
            stop_node: false,
            scope: Default::default(),
        }
    }
}

impl NodeConfig {
    fn plan_differs(&self, other: &NodeConfig) -> bool {
        self.sku_type != other.sku_type
            || self.sku_name != other.sku_name
            || self.committed_days != other.committed_days
            || self.committed_instance_policy != other.committed_instance_policy
    }
    fn image_differs(&self, other: &NodeConfig) -> bool {
        self.image_name != other.image_name || self.image_version != other.image_version
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created_at: String,
    pub image_name: String,
    pub image_version: String,
    pub sku_name: String,
    pub sku_type: Option<SkuType>,
    pub committed_days: i64,
    pub currency: Option<Currency>,
    pub notebook_url_at_tir: Option<String>,
    pub stop_node: bool,
}

/// Body of `POST .../notebooks/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodePayload<'a> {
    pub name: &'a str,
    pub cluster_type: &'a str,
    pub disk_size_in_gb: u32,
    pub enable_ssh: bool,
    pub image_type: &'a str,
    pub image_name: &'a str,
    pub image_version: &'a str,
    pub instance_type: InstanceType,
    pub is_jupyterlab_enabled: bool,
    pub notebook_type: &'a str,
    pub notebook_url: &'a str,
    pub sfs_path: &'a str,
    pub sku_name: &'a str,
    pub location: &'a str,
    pub sku_type: SkuType,
    pub add_ons: &'a [String],
    pub dataset_id_list: &'a [String],
    pub committed_days: u32,
    pub currency: Currency,
    pub category: &'a str,
    pub committed_instance_policy: &'a str,
    pub public_key: &'a [String],
}

impl<'a> From<&'a NodeConfig> for NodePayload<'a> {
    fn from(config: &'a NodeConfig) -> Self {
        Self {
            name: &config.name,
            cluster_type: &config.cluster_type,
            disk_size_in_gb: config.disk_size,
            enable_ssh: config.enable_ssh,
            image_type: &config.image_type,
            image_name: &config.image_name,
            image_version: &config.image_version,
            instance_type: config.instance_type,
            is_jupyterlab_enabled: config.is_jupyterlab_enabled,
            notebook_type: &config.notebook_type,
            notebook_url: &config.notebook_url,
            sfs_path: &config.sfs_path,
            sku_name: &config.sku_name,
            location: &config.location,
            sku_type: config.sku_type,
            add_ons: &config.add_ons,
            dataset_id_list: &config.dataset_id_list,
            committed_days: config.committed_days,
            currency: config.currency,
            category: &config.category,
            committed_instance_policy: &config.committed_instance_policy,
            public_key: &config.public_keys,
        }
    }
}

/// Body of `PUT .../notebooks/{id}/` when switching plans.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodePlanChange {
    pub committed_instance_policy: String,
    pub sku_type: SkuType,
    pub committed_days: u32,
    pub category: String,
    pub currency: Currency,
    pub location: String,
    pub sku_name: String,
}

/// Body of `PUT .../notebooks/{id}/image_update/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeImageChange {
    pub image_name: String,
    pub image_version: String,
    pub is_jupyterlab_enabled: bool,
    pub image_type: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ImageDetails {
    #[serde(default, deserialize_with = "nullable")]
    pub image_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub image_version: String,
}

/// `data` of the notebook endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeDetails {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub image_details: ImageDetails,
    #[serde(default, deserialize_with = "nullable")]
    pub sku_details: SkuDetails,
    #[serde(default)]
    pub lab_url: Option<String>,
}

impl From<NodeDetails> for NodeState {
    fn from(details: NodeDetails) -> Self {
        Self {
            stop_node: details.status == STATUS_STOPPED,
            id: details.id,
            name: details.name,
            status: details.status,
            created_at: details.created_at,
            image_name: details.image_details.image_name,
            image_version: details.image_details.image_version,
            sku_name: details.sku_details.specs.name,
            sku_type: details.sku_details.plan.sku_type,
            committed_days: details.sku_details.plan.committed_days,
            currency: details.sku_details.plan.currency,
            notebook_url_at_tir: details.lab_url,
        }
    }
}

impl NodeState {
    /// State right after creation. The create response only guarantees id,
    /// status and timestamp, so the rest comes from the config.
    fn created(config: &NodeConfig, details: NodeDetails) -> Self {
        let mut state = NodeState::from(details);
        if state.name.is_empty() {
            state.name = config.name.clone();
        }
        if state.image_name.is_empty() {
            state.image_name = config.image_name.clone();
            state.image_version = config.image_version.clone();
        }
        if state.sku_name.is_empty() {
            state.sku_name = config.sku_name.clone();
        }
        state.sku_type = state.sku_type.or(Some(config.sku_type));
        state.currency = state.currency.or(Some(config.currency));
        if state.committed_days == 0 {
            state.committed_days = config.committed_days.into();
        }
        state
    }
}

/// The single change an update applies, chosen in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    StartStop { stop: bool },
    Plan(NodePlanChange),
    Image(NodeImageChange),
    Rename(String),
    Unsupported,
}

impl NodeChange {
    pub fn between(
        previous: &NodeConfig,
        config: &NodeConfig,
        latest: &NodeState,
    ) -> Result<Self, ManagerError> {
        let stopped = latest.status == STATUS_STOPPED;
        if previous.stop_node != config.stop_node {
            if config.sku_type == SkuType::Committed {
                return Err(ManagerError::InvalidConfig(
                    "a node on a committed plan cannot be stopped or started".to_string(),
                ));
            }
            Ok(NodeChange::StartStop {
                stop: config.stop_node,
            })
        } else if previous.plan_differs(config) {
            if previous.sku_type == SkuType::Committed {
                return Err(ManagerError::InvalidConfig(
                    "the plan of a committed node cannot be changed".to_string(),
                ));
            }
            if previous.sku_type == config.sku_type && !stopped {
                return Err(ManagerError::InvalidConfig(
                    "stop the node before changing its plan".to_string(),
                ));
            }
            Ok(NodeChange::Plan(NodePlanChange {
                committed_instance_policy: config.committed_instance_policy.clone(),
                sku_type: config.sku_type,
                committed_days: config.committed_days,
                category: config.category.clone(),
                currency: config.currency,
                location: config.location.clone(),
                sku_name: config.sku_name.clone(),
            }))
        } else if previous.image_differs(config) {
            if !stopped {
                return Err(ManagerError::InvalidConfig(
                    "stop the node before changing its image".to_string(),
                ));
            }
            Ok(NodeChange::Image(NodeImageChange {
                image_name: config.image_name.clone(),
                image_version: config.image_version.clone(),
                is_jupyterlab_enabled: config.is_jupyterlab_enabled,
                image_type: config.image_type.clone(),
            }))
        } else if previous.name != config.name {
            Ok(NodeChange::Rename(config.name.clone()))
        } else {
            Ok(NodeChange::Unsupported)
        }
    }
}

impl TirClient {
    pub async fn new_node(
        &self,
        scope: &Scope,
        payload: &NodePayload<'_>,
    ) -> Result<NodeDetails, ApiError> {
        self.transport().send(scope.post(NOTEBOOKS).json(payload)?).await
    }
    pub async fn get_node(&self, scope: &Scope, id: &str) -> Result<NodeDetails, ApiError> {
        self.transport().send(scope.get(NOTEBOOKS, id)).await
    }
    pub async fn delete_node(&self, scope: &Scope, id: &str) -> Result<(), ApiError> {
        self.transport()
            .request(scope.delete(NOTEBOOKS, id))
            .await
            .map(|_| ())
    }
    pub async fn start_stop_node(
        &self,
        scope: &Scope,
        id: &str,
        stop: bool,
    ) -> Result<(), ApiError> {
        let action = if stop { "stop" } else { "start" };
        let call = scope
            .put(format!("{}actions/", scope.item(NOTEBOOKS, id)))
            .query("action", action);
        self.transport().request(call).await.map(|_| ())
    }
    pub async fn rename_node(&self, scope: &Scope, id: &str, name: &str) -> Result<(), ApiError> {
        let call = scope
            .put(format!("{}actions/", scope.item(NOTEBOOKS, id)))
            .query("action", "rename")
            .json(&serde_json::json!({ "name": name }))?;
        self.transport().request(call).await.map(|_| ())
    }
    pub async fn update_node_plan(
        &self,
        scope: &Scope,
        id: &str,
        change: &NodePlanChange,
    ) -> Result<(), ApiError> {
        let call = scope.put(scope.item(NOTEBOOKS, id)).json(change)?;
        self.transport().request(call).await.map(|_| ())
    }
    pub async fn update_node_image(
        &self,
        scope: &Scope,
        id: &str,
        change: &NodeImageChange,
    ) -> Result<(), ApiError> {
        let call = scope
            .put(format!("{}image_update/", scope.item(NOTEBOOKS, id)))
            .json(change)?;
        self.transport().request(call).await.map(|_| ())
    }
}

impl TirResourceCreator for Node<'_> {
    type Config = NodeConfig;
    type State = NodeState;
    fn r#type() -> TirType {
        TirType::Node
    }
    fn manager(
        handle: &Handle,
        client: &TirClient,
    ) -> Arc<dyn ResourceManager<Self::Config, Self::State>> {
        NodeManager::new(handle, client).arc()
    }
}

impl Node<'_> {
    /// Attaches the dataset to this node once the dataset exists.
    pub fn bind_dataset(&self, dataset: &Dataset) -> Result<&Self, ResourceError> {
        self.bind(dataset, |config, state| {
            if !config.dataset_id_list.contains(&state.id) {
                config.dataset_id_list.push(state.id.clone());
            }
        })
    }
}

impl ResourceManager<NodeConfig, NodeState> for NodeManager {
    fn create(&self, config: &NodeConfig) -> Result<NodeState, ManagerError> {
        if config.stop_node {
            return Err(ManagerError::InvalidConfig(
                "a node cannot be created stopped, set stop_node to false".to_string(),
            ));
        }
        let details = self
            .block_on(self.client.new_node(&config.scope, &NodePayload::from(config)))
            .map_err(ManagerError::CreateFail)?;
        tracing::info!("Node {} created with id {}", config.name, details.id);
        Ok(NodeState::created(config, details))
    }

    fn read(
        &self,
        config: &NodeConfig,
        latest: &NodeState,
    ) -> Result<Option<NodeState>, ManagerError> {
        found(self.block_on(self.client.get_node(&config.scope, &latest.id)))
            .map(|details| details.map(NodeState::from))
    }

    fn update(
        &self,
        previous: &NodeConfig,
        config: &NodeConfig,
        latest: &NodeState,
    ) -> Result<NodeState, ManagerError> {
        let scope = &config.scope;
        let id = latest.id.as_str();
        let change = NodeChange::between(previous, config, latest)?;
        let result = match &change {
            NodeChange::StartStop { stop } => {
                self.block_on(self.client.start_stop_node(scope, id, *stop))
            }
            NodeChange::Plan(plan) => self.block_on(self.client.update_node_plan(scope, id, plan)),
            NodeChange::Image(image) => {
                self.block_on(self.client.update_node_image(scope, id, image))
            }
            NodeChange::Rename(name) => self.block_on(self.client.rename_node(scope, id, name)),
            NodeChange::Unsupported => {
                tracing::warn!(
                    "Node {} changed fields that cannot be updated in place, keeping it as is",
                    id
                );
                return Ok(latest.clone());
            }
        };
        result.map_err(ManagerError::UpdateFail)?;
        tracing::info!("Node {} updated: {:?}", id, change);
        self.block_on(self.client.get_node(scope, id))
            .map(NodeState::from)
            .map_err(ManagerError::LookupFail)
    }

    fn delete(&self, config: &NodeConfig, latest: &NodeState) -> Result<bool, ManagerError> {
        deleted(self.block_on(self.client.delete_node(&config.scope, &latest.id)))
    }
}
