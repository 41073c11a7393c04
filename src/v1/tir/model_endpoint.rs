//! Model endpoints (inference services).
//!
//! The container image is derived from the framework on every create and
//! update. The framework itself cannot change once the endpoint exists.
//! Start and stop are driven by `stop_inference`.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use strum_macros::{Display, EnumString};
use tokio::runtime::Handle;

use super::{
    client::{Scope, TirClient},
    dataset::Dataset,
    de::{id_string, int_or_string, nullable, string_map},
    deleted, found,
    frameworks::{container_name, default_hugging_face_id, framework_name, uses_user_model},
    integration::Integration,
    model_repo::ModelRepo,
    parse_id,
    private_cluster::PrivateCluster,
    sku::{Currency, SkuDetails, SkuType},
    transport::ApiError,
    TirManager, TirResource, TirResourceCreator, TirType,
};
use crate::v1::{
    manager::{ManagerError, ResourceManager},
    resource::ResourceError,
};

const INFERENCE: &str = "serving/inference";
const CATEGORY: &str = "inference_service";
const STATUS_STOPPED: &str = "stopped";

pub type EndpointManager = TirManager<EndpointConfig, EndpointState>;
pub type ModelEndpoint<'a> = TirResource<'a, EndpointConfig, EndpointState>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ImagePullPolicy {
    #[default]
    Always,
    IfNotPresent,
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InferenceAction {
    #[default]
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleRule {
    #[serde(default)]
    pub metric: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_metric_name: String,
    #[serde(default = "default_condition_type")]
    pub condition_type: String,
    #[serde(default = "default_rule_value")]
    pub value: i64,
    #[serde(default = "default_watch_period")]
    pub watch_period: i64,
    #[serde(default = "default_one")]
    pub granularity: i64,
    #[serde(default = "default_one")]
    pub window: i64,
}

fn default_condition_type() -> String {
    "limit".to_string()
}
fn default_rule_value() -> i64 {
    10
}
fn default_watch_period() -> i64 {
    60
}
fn default_one() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoScalePolicy {
    #[serde(default = "default_one", alias = "min_replica")]
    pub min_replicas: i64,
    #[serde(default = "default_one", alias = "max_replica")]
    pub max_replicas: i64,
    #[serde(default = "default_stability_period", deserialize_with = "int_or_string")]
    pub stability_period: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub rules: Vec<ScaleRule>,
}

fn default_stability_period() -> i64 {
    300
}

impl Default for AutoScalePolicy {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 1,
            stability_period: default_stability_period(),
            rules: vec![],
        }
    }
}

/// Serving parameters. `commands` and `args` are plaintext here and
/// base64 encoded on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedInfo {
    #[serde(default, deserialize_with = "nullable")]
    pub commands: String,
    #[serde(default, deserialize_with = "nullable")]
    pub args: String,
    #[serde(default, deserialize_with = "nullable")]
    pub hugging_face_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tokenizer: String,
    #[serde(default, deserialize_with = "nullable")]
    pub server_version: String,
    #[serde(default = "default_one", deserialize_with = "int_or_string")]
    pub world_size: i64,
    #[serde(default = "default_true")]
    pub error_log: bool,
    #[serde(default = "default_true")]
    pub info_log: bool,
    #[serde(default = "default_true")]
    pub warning_log: bool,
    #[serde(default = "default_one", deserialize_with = "int_or_string")]
    pub log_verbose_level: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub model_serve_type: String,
    #[serde(default, deserialize_with = "string_map")]
    pub engine_args: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for DetailedInfo {
    fn default() -> Self {
        Self {
            commands: Default::default(),
            args: Default::default(),
            hugging_face_id: Default::default(),
            tokenizer: Default::default(),
            server_version: Default::default(),
            world_size: 1,
            error_log: true,
            info_log: true,
            warning_log: true,
            log_verbose_level: 1,
            model_serve_type: Default::default(),
            engine_args: Default::default(),
        }
    }
}

impl DetailedInfo {
    /// Reverses the wire encoding of `commands` and `args`. Values that are
    /// not valid base64 are kept as sent.
    fn decoded(mut self) -> Self {
        self.commands = decode_base64(&self.commands);
        self.args = decode_base64(&self.args);
        self
    }
}

fn decode_base64(value: &str) -> String {
    STANDARD
        .decode(value)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| value.to_string())
}

/// Engine args are declared as strings and sent with their natural JSON type:
/// integer, then float, then boolean, else string.
pub fn convert_engine_arg(value: &str) -> Value {
    if let Ok(int) = value.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(float) = value.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(float);
    }
    match value {
        "t" | "T" | "true" | "TRUE" | "True" => Value::Bool(true),
        "f" | "F" | "false" | "FALSE" | "False" => Value::Bool(false),
        _ => Value::String(value.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    #[serde(default = "default_protocol", deserialize_with = "nullable")]
    pub protocol: String,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_seconds: i64,
    #[serde(default = "default_one")]
    pub success_threshold: i64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: i64,
    #[serde(default = "default_port", deserialize_with = "int_or_string")]
    pub port: i64,
    #[serde(default = "default_ten")]
    pub period_seconds: i64,
    #[serde(default = "default_ten")]
    pub timeout_seconds: i64,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub grpc_service: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub commands: String,
}

fn default_protocol() -> String {
    "http".to_string()
}
fn default_initial_delay() -> i64 {
    10
}
fn default_failure_threshold() -> i64 {
    3
}
fn default_port() -> i64 {
    8080
}
fn default_ten() -> i64 {
    10
}

impl Probe {
    fn with_path(path: &str) -> Self {
        Self {
            protocol: default_protocol(),
            initial_delay_seconds: default_initial_delay(),
            success_threshold: 1,
            failure_threshold: default_failure_threshold(),
            port: default_port(),
            period_seconds: default_ten(),
            timeout_seconds: default_ten(),
            path: path.to_string(),
            grpc_service: Default::default(),
            commands: Default::default(),
        }
    }
    pub fn readiness() -> Self {
        Self::with_path("/health")
    }
    pub fn liveness() -> Self {
        Self::with_path("/metrics")
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVariable {
    #[serde(default, deserialize_with = "nullable")]
    pub key: String,
    #[serde(default, deserialize_with = "nullable")]
    pub value: String,
    #[serde(default)]
    pub disabled: Option<Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDetails {
    #[serde(default = "default_resource_disk", deserialize_with = "int_or_string")]
    pub disk_size: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub mount_path: String,
    #[serde(default, deserialize_with = "nullable")]
    pub env_variables: Vec<EnvVariable>,
}

fn default_resource_disk() -> i64 {
    100
}

impl Default for ResourceDetails {
    fn default() -> Self {
        Self {
            disk_size: default_resource_disk(),
            mount_path: Default::default(),
            env_variables: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    #[serde(default)]
    pub sku_name: String,
    #[serde(default)]
    pub sku_type: SkuType,
    #[serde(default)]
    pub committed_instance_policy: String,
    #[serde(default)]
    pub committed_days: u32,
    #[serde(default)]
    pub model_path: String,
    /// Framework key, e.g. `VLLM`.
    pub framework: String,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub model_load_integration_id: String,
    pub cluster_type: String,
    pub storage_type: String,
    #[serde(default = "default_disk_path")]
    pub disk_path: String,
    #[serde(default = "default_sfs_path")]
    pub sfs_path: String,
    #[serde(default)]
    pub sfs_id: String,
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    #[serde(default)]
    pub is_auto_scale_enabled: bool,
    #[serde(default)]
    pub auto_scale_policy: AutoScalePolicy,
    #[serde(default = "default_one_u32")]
    pub replica: u32,
    #[serde(default)]
    pub committed_replicas: u32,
    #[serde(default)]
    pub detailed_info: DetailedInfo,
    #[serde(default)]
    pub is_readiness_probe_enabled: bool,
    #[serde(default)]
    pub is_liveness_probe_enabled: bool,
    #[serde(default = "Probe::readiness")]
    pub readiness_probe: Probe,
    #[serde(default = "Probe::liveness")]
    pub liveness_probe: Probe,
    #[serde(default)]
    pub resource_details: ResourceDetails,
    #[serde(default = "default_public_ip")]
    pub public_ip: String,
    pub container_type: String,
    #[serde(default)]
    pub private_cloud_id: String,
    #[serde(default)]
    pub custom_sku: Option<BTreeMap<String, i64>>,
    #[serde(default)]
    pub service_port: bool,
    #[serde(default)]
    pub metric_port: bool,
    #[serde(default)]
    pub dataset_id: String,
    #[serde(default)]
    pub dataset_path: String,
    pub location: String,
    pub currency: Currency,
    #[serde(default)]
    pub stop_inference: InferenceAction,
    #[serde(flatten)]
    pub scope: Scope,
}

fn default_disk_path() -> String {
    "/mnt/models".to_string()
}
fn default_sfs_path() -> String {
    "/shared/.cache".to_string()
}
fn default_one_u32() -> u32 {
    1
}
fn default_public_ip() -> String {
    "no".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: Default::default(),
            sku_name: Default::default(),
            sku_type: Default::default(),
            committed_instance_policy: Default::default(),
            committed_days: 0,
            model_path: Default::default(),
            framework: Default::default(),
            model_id: Default::default(),
            model_load_integration_id: Default::default(),
            cluster_type: Default::default(),
            storage_type: Default::default(),
            disk_path: default_disk_path(),
            sfs_path: default_sfs_path(),
            sfs_id: Default::default(),
            image_pull_policy: Default::default(),
            is_auto_scale_enabled: false,
            auto_scale_policy: Default::default(),
            replica: 1,
            committed_replicas: 0,
            detailed_info: Default::default(),
            is_readiness_probe_enabled: false,
            is_liveness_probe_enabled: false,
            readiness_probe: Probe::readiness(),
            liveness_probe: Probe::liveness(),
            resource_details: Default::default(),
            public_ip: default_public_ip(),
            container_type: Default::default(),
            private_cloud_id: Default::default(),
            custom_sku: None,
            service_port: false,
            metric_port: false,
            dataset_id: Default::default(),
            dataset_path: Default::default(),
            location: Default::default(),
            currency: Default::default(),
            stop_inference: Default::default(),
            scope: Default::default(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointState {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created_at: String,
    pub container_name: String,
    pub sku_name: String,
    pub sku_type: Option<SkuType>,
    pub committed_days: i64,
    pub currency: Option<Currency>,
    pub storage_type: String,
    pub disk_path: String,
    pub sfs_path: String,
    pub replica: i64,
    pub committed_replicas: i64,
    pub auto_scale_policy: Option<AutoScalePolicy>,
    pub detailed_info: Option<DetailedInfo>,
    pub is_readiness_probe_enabled: bool,
    pub is_liveness_probe_enabled: bool,
    pub readiness_probe: Option<Probe>,
    pub liveness_probe: Option<Probe>,
    pub resource_details: Option<ResourceDetails>,
    pub public_ip: String,
    pub stop_inference: InferenceAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvanceConfigPayload<'a> {
    pub image_pull_policy: ImagePullPolicy,
    pub is_readiness_probe_enabled: bool,
    pub is_liveness_probe_enabled: bool,
    pub readiness_probe: &'a Probe,
    pub liveness_probe: &'a Probe,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerPayload<'a> {
    pub container_name: &'static str,
    pub container_type: &'a str,
    pub private_image_details: BTreeMap<String, i64>,
    pub advance_config: AdvanceConfigPayload<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomEndpointPayload<'a> {
    pub service_port: bool,
    pub metric_port: bool,
    pub container: ContainerPayload<'a>,
    pub resource_details: &'a ResourceDetails,
    pub public_ip: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoScalePayload<'a> {
    pub min_replica: i64,
    pub max_replica: i64,
    pub stability_period: i64,
    pub rules: &'a [ScaleRule],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedInfoPayload<'a> {
    pub commands: String,
    pub args: String,
    pub hugging_face_id: &'a str,
    pub tokenizer: &'a str,
    pub server_version: &'a str,
    pub world_size: i64,
    pub error_log: bool,
    pub info_log: bool,
    pub warning_log: bool,
    pub log_verbose_level: i64,
    pub model_serve_type: &'a str,
    pub engine_args: BTreeMap<&'a str, Value>,
}

impl<'a> DetailedInfoPayload<'a> {
    fn new(info: &'a DetailedInfo, framework: &str) -> Self {
        let default_id = default_hugging_face_id(framework);
        let hugging_face_id = if !uses_user_model(framework) && !default_id.is_empty() {
            default_id
        } else {
            info.hugging_face_id.as_str()
        };
        Self {
            commands: STANDARD.encode(&info.commands),
            args: STANDARD.encode(&info.args),
            hugging_face_id,
            tokenizer: &info.tokenizer,
            server_version: &info.server_version,
            world_size: info.world_size,
            error_log: info.error_log,
            info_log: info.info_log,
            warning_log: info.warning_log,
            log_verbose_level: info.log_verbose_level,
            model_serve_type: &info.model_serve_type,
            engine_args: info
                .engine_args
                .iter()
                .map(|(key, value)| (key.as_str(), convert_engine_arg(value)))
                .collect(),
        }
    }
}

/// Body of `POST .../serving/inference/` and of full updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
    pub name: &'a str,
    pub path: &'a str,
    pub custom_endpoint_details: CustomEndpointPayload<'a>,
    pub model_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku_type: Option<SkuType>,
    pub committed_days: u32,
    pub committed_instance_policy: &'a str,
    pub replica: u32,
    pub committed_replicas: u32,
    pub framework: &'static str,
    pub is_auto_scale_enabled: bool,
    pub auto_scale_policy: AutoScalePayload<'a>,
    pub detailed_info: DetailedInfoPayload<'a>,
    pub model_load_integration_id: Option<i64>,
    pub dataset_id: Option<i64>,
    pub dataset_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_cloud_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_sku: Option<&'a BTreeMap<String, i64>>,
    pub cluster_type: &'a str,
    pub storage_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sfs_id: Option<i64>,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub sfs_path: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub disk_path: &'a str,
    pub category: &'static str,
    pub location: &'a str,
    pub currency: Currency,
}

impl<'a> TryFrom<&'a EndpointConfig> for EndpointPayload<'a> {
    type Error = ManagerError;

    fn try_from(config: &'a EndpointConfig) -> Result<Self, Self::Error> {
        let invalid = |err: super::frameworks::FrameworkError| {
            ManagerError::InvalidConfig(err.to_string())
        };
        let container_name = container_name(
            &config.detailed_info.server_version,
            &config.model_id,
            &config.framework,
        )
        .map_err(invalid)?;
        let framework = framework_name(&config.framework).map_err(invalid)?;

        let mut payload = Self {
            action: None,
            name: &config.name,
            path: &config.model_path,
            custom_endpoint_details: CustomEndpointPayload {
                service_port: config.service_port,
                metric_port: config.metric_port,
                container: ContainerPayload {
                    container_name,
                    container_type: &config.container_type,
                    private_image_details: BTreeMap::new(),
                    advance_config: AdvanceConfigPayload {
                        image_pull_policy: config.image_pull_policy,
                        is_readiness_probe_enabled: config.is_readiness_probe_enabled,
                        is_liveness_probe_enabled: config.is_liveness_probe_enabled,
                        readiness_probe: &config.readiness_probe,
                        liveness_probe: &config.liveness_probe,
                    },
                },
                resource_details: &config.resource_details,
                public_ip: &config.public_ip,
            },
            model_id: None,
            sku_name: None,
            sku_type: None,
            committed_days: 0,
            committed_instance_policy: "",
            replica: config.replica,
            committed_replicas: config.committed_replicas,
            framework,
            is_auto_scale_enabled: config.is_auto_scale_enabled,
            auto_scale_policy: AutoScalePayload {
                min_replica: config.auto_scale_policy.min_replicas,
                max_replica: config.auto_scale_policy.max_replicas,
                stability_period: config.auto_scale_policy.stability_period,
                rules: &config.auto_scale_policy.rules,
            },
            detailed_info: DetailedInfoPayload::new(&config.detailed_info, &config.framework),
            model_load_integration_id: None,
            dataset_id: None,
            dataset_path: &config.dataset_path,
            private_cloud_id: None,
            custom_sku: None,
            cluster_type: &config.cluster_type,
            storage_type: &config.storage_type,
            sfs_id: None,
            sfs_path: &config.sfs_path,
            disk_path: &config.disk_path,
            category: CATEGORY,
            location: &config.location,
            currency: config.currency,
        };

        if !config.model_id.is_empty() {
            payload.model_id = Some(parse_id("model_id", &config.model_id)?);
        } else if !config.model_load_integration_id.is_empty() {
            payload.model_load_integration_id = Some(parse_id(
                "model_load_integration_id",
                &config.model_load_integration_id,
            )?);
        }

        if !config.private_cloud_id.is_empty() {
            payload.private_cloud_id = Some(parse_id("private_cloud_id", &config.private_cloud_id)?);
            match &config.custom_sku {
                Some(custom_sku) if !custom_sku.is_empty() => payload.custom_sku = Some(custom_sku),
                _ => {
                    return Err(ManagerError::InvalidConfig(
                        "custom_sku is required when private_cloud_id is set".to_string(),
                    ))
                }
            }
        } else {
            if config.sku_name.trim().is_empty() {
                return Err(ManagerError::InvalidConfig(
                    "sku_name is required unless the endpoint runs on a private cluster"
                        .to_string(),
                ));
            }
            payload.sku_name = Some(&config.sku_name);
            payload.sku_type = Some(config.sku_type);
            payload.committed_days = config.committed_days;
            payload.committed_instance_policy = &config.committed_instance_policy;
        }

        if !config.sfs_id.is_empty() {
            payload.sfs_id = Some(parse_id("sfs_id", &config.sfs_id)?);
        }
        if !config.dataset_id.is_empty() {
            payload.dataset_id = Some(parse_id("dataset_id", &config.dataset_id)?);
        }
        Ok(payload)
    }
}

impl EndpointPayload<'_> {
    pub fn container_name(&self) -> &'static str {
        self.custom_endpoint_details.container.container_name
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AdvanceConfigDetails {
    #[serde(default, deserialize_with = "nullable")]
    pub is_readiness_probe_enabled: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub is_liveness_probe_enabled: bool,
    #[serde(default)]
    pub readiness_probe: Option<Probe>,
    #[serde(default)]
    pub liveness_probe: Option<Probe>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ContainerDetails {
    #[serde(default, deserialize_with = "nullable")]
    pub container_name: String,
    #[serde(default)]
    pub advance_config: Option<AdvanceConfigDetails>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CustomEndpointDetails {
    #[serde(default)]
    pub container: Option<ContainerDetails>,
    #[serde(default)]
    pub resource_details: Option<ResourceDetails>,
    #[serde(default, deserialize_with = "nullable")]
    pub public_ip: String,
}

/// `data` of the inference endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointDetails {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub sku_details: SkuDetails,
    #[serde(default, deserialize_with = "nullable")]
    pub storage_type: String,
    #[serde(default, deserialize_with = "nullable")]
    pub disk_path: String,
    #[serde(default, deserialize_with = "nullable")]
    pub sfs_path: String,
    #[serde(default, deserialize_with = "int_or_string")]
    pub replica: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub committed_replicas: i64,
    #[serde(default)]
    pub auto_scale_policy: Option<AutoScalePolicy>,
    #[serde(default)]
    pub detailed_info: Option<DetailedInfo>,
    #[serde(default)]
    pub custom_endpoint_details: Option<CustomEndpointDetails>,
}

impl From<EndpointDetails> for EndpointState {
    fn from(details: EndpointDetails) -> Self {
        let custom = details.custom_endpoint_details.unwrap_or_default();
        let container = custom.container.unwrap_or_default();
        let advance = container.advance_config.unwrap_or_default();
        Self {
            stop_inference: if details.status == STATUS_STOPPED {
                InferenceAction::Stop
            } else {
                InferenceAction::Start
            },
            id: details.id,
            name: details.name,
            status: details.status,
            created_at: details.created_at,
            container_name: container.container_name,
            sku_name: details.sku_details.specs.name,
            sku_type: details.sku_details.plan.sku_type,
            committed_days: details.sku_details.plan.committed_days,
            currency: details.sku_details.plan.currency,
            storage_type: details.storage_type,
            disk_path: details.disk_path,
            sfs_path: details.sfs_path,
            replica: details.replica,
            committed_replicas: details.committed_replicas,
            auto_scale_policy: details.auto_scale_policy,
            detailed_info: details.detailed_info.map(DetailedInfo::decoded),
            is_readiness_probe_enabled: advance.is_readiness_probe_enabled,
            is_liveness_probe_enabled: advance.is_liveness_probe_enabled,
            readiness_probe: advance.readiness_probe,
            liveness_probe: advance.liveness_probe,
            resource_details: custom.resource_details,
            public_ip: custom.public_ip,
        }
    }
}

impl EndpointState {
    /// State right after creation, from the declared config and the few
    /// fields the create response carries.
    fn created(config: &EndpointConfig, container_name: &str, details: EndpointDetails) -> Self {
        let on_sku = config.private_cloud_id.is_empty();
        Self {
            id: details.id,
            name: config.name.clone(),
            status: details.status,
            created_at: details.created_at,
            container_name: container_name.to_string(),
            sku_name: if on_sku { config.sku_name.clone() } else { String::new() },
            sku_type: on_sku.then_some(config.sku_type),
            committed_days: config.committed_days.into(),
            currency: Some(config.currency),
            storage_type: config.storage_type.clone(),
            disk_path: config.disk_path.clone(),
            sfs_path: config.sfs_path.clone(),
            replica: config.replica.into(),
            committed_replicas: config.committed_replicas.into(),
            auto_scale_policy: Some(config.auto_scale_policy.clone()),
            detailed_info: Some(config.detailed_info.clone()),
            is_readiness_probe_enabled: config.is_readiness_probe_enabled,
            is_liveness_probe_enabled: config.is_liveness_probe_enabled,
            readiness_probe: Some(config.readiness_probe.clone()),
            liveness_probe: Some(config.liveness_probe.clone()),
            resource_details: Some(config.resource_details.clone()),
            public_ip: config.public_ip.clone(),
            stop_inference: InferenceAction::Start,
        }
    }
}

/// The single change an update applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointChange {
    StartStop(InferenceAction),
    /// Full body update; `update` on a stopped endpoint, `patch` otherwise.
    Replace { action: &'static str },
}

impl EndpointChange {
    pub fn between(
        previous: &EndpointConfig,
        config: &EndpointConfig,
        latest: &EndpointState,
    ) -> Result<Self, ManagerError> {
        if previous.framework != config.framework {
            return Err(ManagerError::CannotSyncWithoutRecreate(format!(
                "framework of endpoint {} cannot change from {} to {}",
                latest.id, previous.framework, config.framework
            )));
        }
        if previous.stop_inference != config.stop_inference {
            return Ok(EndpointChange::StartStop(config.stop_inference));
        }
        let action = if latest.status == STATUS_STOPPED {
            "update"
        } else {
            "patch"
        };
        Ok(EndpointChange::Replace { action })
    }
}

impl TirClient {
    pub async fn new_endpoint(
        &self,
        scope: &Scope,
        payload: &EndpointPayload<'_>,
    ) -> Result<EndpointDetails, ApiError> {
        let call = scope
            .post(INFERENCE)
            .query("prefix", "models/")
            .json(payload)?;
        self.transport().send(call).await
    }
    pub async fn get_endpoint(&self, scope: &Scope, id: &str) -> Result<EndpointDetails, ApiError> {
        self.transport().send(scope.get(INFERENCE, id)).await
    }
    pub async fn delete_endpoint(&self, scope: &Scope, id: &str) -> Result<(), ApiError> {
        self.transport()
            .request(scope.delete(INFERENCE, id))
            .await
            .map(|_| ())
    }
    pub async fn update_endpoint(
        &self,
        scope: &Scope,
        id: &str,
        payload: &EndpointPayload<'_>,
    ) -> Result<(), ApiError> {
        let call = scope.put(scope.item(INFERENCE, id)).json(payload)?;
        self.transport().request(call).await.map(|_| ())
    }
    pub async fn start_stop_endpoint(
        &self,
        scope: &Scope,
        id: &str,
        action: InferenceAction,
    ) -> Result<(), ApiError> {
        let call = scope
            .put(scope.item(INFERENCE, id))
            .json(&serde_json::json!({ "action": action }))?;
        self.transport().request(call).await.map(|_| ())
    }
}

impl TirResourceCreator for ModelEndpoint<'_> {
    type Config = EndpointConfig;
    type State = EndpointState;
    fn r#type() -> TirType {
        TirType::ModelEndpoint
    }
    fn manager(
        handle: &Handle,
        client: &TirClient,
    ) -> Arc<dyn ResourceManager<Self::Config, Self::State>> {
        EndpointManager::new(handle, client).arc()
    }
}

impl ModelEndpoint<'_> {
    /// Serves the weights of `repo`.
    pub fn bind_model_repo(&self, repo: &ModelRepo) -> Result<&Self, ResourceError> {
        self.bind(repo, |config, state| config.model_id = state.id.clone())
    }
    pub fn bind_dataset(&self, dataset: &Dataset) -> Result<&Self, ResourceError> {
        self.bind(dataset, |config, state| config.dataset_id = state.id.clone())
    }
    /// Loads the model through the integration's Hugging Face token.
    pub fn bind_integration(&self, integration: &Integration) -> Result<&Self, ResourceError> {
        self.bind(integration, |config, state| {
            config.model_load_integration_id = state.id.clone()
        })
    }
    pub fn bind_private_cluster(&self, cluster: &PrivateCluster) -> Result<&Self, ResourceError> {
        self.bind(cluster, |config, state| {
            config.private_cloud_id = state.id.clone()
        })
    }
}

impl ResourceManager<EndpointConfig, EndpointState> for EndpointManager {
    fn create(&self, config: &EndpointConfig) -> Result<EndpointState, ManagerError> {
        if config.stop_inference != InferenceAction::Start {
            return Err(ManagerError::InvalidConfig(
                "stop_inference must be start when creating an endpoint".to_string(),
            ));
        }
        let payload = EndpointPayload::try_from(config)?;
        let details = self
            .block_on(self.client.new_endpoint(&config.scope, &payload))
            .map_err(ManagerError::CreateFail)?;
        tracing::info!(
            "Endpoint {} created with id {} serving {}",
            config.name,
            details.id,
            payload.container_name()
        );
        Ok(EndpointState::created(
            config,
            payload.container_name(),
            details,
        ))
    }

    fn read(
        &self,
        config: &EndpointConfig,
        latest: &EndpointState,
    ) -> Result<Option<EndpointState>, ManagerError> {
        let current = found(self.block_on(self.client.get_endpoint(&config.scope, &latest.id)))?;
        Ok(current.map(|details| {
            let mut state = EndpointState::from(details);
            if state.container_name.is_empty() {
                state.container_name = latest.container_name.clone();
            }
            state
        }))
    }

    fn update(
        &self,
        previous: &EndpointConfig,
        config: &EndpointConfig,
        latest: &EndpointState,
    ) -> Result<EndpointState, ManagerError> {
        let scope = &config.scope;
        let id = latest.id.as_str();
        let change = EndpointChange::between(previous, config, latest)?;
        let mut container_name = latest.container_name.clone();
        let result = match change {
            EndpointChange::StartStop(action) => {
                self.block_on(self.client.start_stop_endpoint(scope, id, action))
            }
            EndpointChange::Replace { action } => {
                let mut payload = EndpointPayload::try_from(config)?;
                payload.action = Some(action);
                container_name = payload.container_name().to_string();
                self.block_on(self.client.update_endpoint(scope, id, &payload))
            }
        };
        result.map_err(ManagerError::UpdateFail)?;
        tracing::info!("Endpoint {} updated: {:?}", id, change);
        let mut state = self
            .block_on(self.client.get_endpoint(scope, id))
            .map(EndpointState::from)
            .map_err(ManagerError::LookupFail)?;
        if state.container_name.is_empty() {
            state.container_name = container_name;
        }
        Ok(state)
    }

    fn delete(
        &self,
        config: &EndpointConfig,
        latest: &EndpointState,
    ) -> Result<bool, ManagerError> {
        deleted(self.block_on(self.client.delete_endpoint(&config.scope, &latest.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> EndpointConfig {
        EndpointConfig {
            name: "llm".into(),
            sku_name: "GPU-A100".into(),
            framework: "VLLM".into(),
            cluster_type: "tir-cluster".into(),
            storage_type: "disk".into(),
            container_type: "public".into(),
            location: "Delhi".into(),
            scope: Scope::new("1", "2", "3"),
            ..Default::default()
        }
    }

    fn payload(config: &EndpointConfig) -> Result<Value, ManagerError> {
        EndpointPayload::try_from(config).map(|p| serde_json::to_value(p).unwrap())
    }

    #[test]
    fn manifest_defaults() {
        let config: EndpointConfig = serde_json::from_value(json!({
            "name": "llm",
            "sku_name": "GPU-A100",
            "framework": "VLLM",
            "cluster_type": "tir-cluster",
            "storage_type": "disk",
            "container_type": "public",
            "location": "Delhi",
            "currency": "INR",
            "team_id": "1",
            "project_id": "2",
            "active_iam": "3"
        }))
        .unwrap();
        assert_eq!(config, self::config());
        assert_eq!(config.readiness_probe.path, "/health");
        assert_eq!(config.liveness_probe.path, "/metrics");
        assert_eq!(config.auto_scale_policy.stability_period, 300);
    }

    #[test]
    fn engine_arg_conversion_order() {
        assert_eq!(convert_engine_arg("4096"), json!(4096));
        assert_eq!(convert_engine_arg("0.9"), json!(0.9));
        assert_eq!(convert_engine_arg("true"), json!(true));
        assert_eq!(convert_engine_arg("F"), json!(false));
        assert_eq!(convert_engine_arg("1"), json!(1));
        assert_eq!(convert_engine_arg("auto"), json!("auto"));
    }

    #[test]
    fn payload_encodes_detailed_info_without_touching_config() {
        let mut config = config();
        config.detailed_info.commands = "python serve.py".into();
        config.detailed_info.args = "--port 8080".into();
        config.detailed_info.hugging_face_id = "meta-llama/Llama-3.1-8B".into();
        config.detailed_info.engine_args =
            BTreeMap::from([("max_model_len".into(), "4096".into())]);
        let before = config.clone();
        let value = payload(&config).unwrap();
        let info = &value["detailed_info"];
        assert_eq!(info["commands"], STANDARD.encode("python serve.py"));
        assert_eq!(info["args"], STANDARD.encode("--port 8080"));
        assert_eq!(info["engine_args"]["max_model_len"], 4096);
        assert_eq!(info["hugging_face_id"], "meta-llama/Llama-3.1-8B");
        assert_eq!(config, before);
        assert_eq!(value["framework"], "vllm");
        assert_eq!(value["category"], "inference_service");
        assert_eq!(value["sku_name"], "GPU-A100");
        assert_eq!(value["sku_type"], "hourly");
        assert_eq!(value["model_id"], Value::Null);
        assert!(value.get("action").is_none());
        assert!(value.get("private_cloud_id").is_none());
        assert_eq!(
            value["custom_endpoint_details"]["container"]["container_name"],
            "vllm/vllm-openai:latest"
        );
        assert_eq!(
            value["auto_scale_policy"],
            json!({"min_replica": 1, "max_replica": 1, "stability_period": 300, "rules": []})
        );
    }

    #[test]
    fn default_hugging_face_id_replaces_user_value() {
        let mut config = config();
        config.framework = "NV_EMBED".into();
        config.detailed_info.hugging_face_id = "someone/else".into();
        let value = payload(&config).unwrap();
        assert_eq!(value["detailed_info"]["hugging_face_id"], "nvidia/NV-Embed-v1");
        assert_eq!(config.detailed_info.hugging_face_id, "someone/else");
    }

    #[test]
    fn user_hugging_face_id_kept_without_a_default() {
        let mut config = config();
        config.framework = "TRITON".into();
        config.detailed_info.server_version = "v24.01".into();
        config.detailed_info.hugging_face_id = "someone/triton-model".into();
        assert_eq!(default_hugging_face_id("TRITON"), "");
        let value = payload(&config).unwrap();
        assert_eq!(value["detailed_info"]["hugging_face_id"], "someone/triton-model");
        assert_eq!(
            value["custom_endpoint_details"]["container"]["container_name"],
            "aimle2e/tritonserver:24.01-py3-01"
        );
    }

    #[test]
    fn unknown_framework_is_rejected() {
        let config = EndpointConfig {
            framework: "NOPE".into(),
            ..config()
        };
        assert!(matches!(payload(&config), Err(ManagerError::InvalidConfig(_))));
    }

    #[test]
    fn model_id_takes_precedence_over_integration() {
        let config = EndpointConfig {
            model_id: "12".into(),
            model_load_integration_id: "34".into(),
            ..config()
        };
        let value = payload(&config).unwrap();
        assert_eq!(value["model_id"], 12);
        assert_eq!(value["model_load_integration_id"], Value::Null);

        let config = EndpointConfig {
            model_id: String::new(),
            ..config
        };
        let value = payload(&config).unwrap();
        assert_eq!(value["model_load_integration_id"], 34);

        let config = EndpointConfig {
            model_id: "my-model".into(),
            ..config
        };
        assert!(payload(&config).is_err());
    }

    #[test]
    fn private_cluster_needs_custom_sku() {
        let config = EndpointConfig {
            private_cloud_id: "9".into(),
            ..config()
        };
        assert!(matches!(payload(&config), Err(ManagerError::InvalidConfig(_))));
        let config = EndpointConfig {
            custom_sku: Some(BTreeMap::from([("gpu".into(), 1), ("cpu".into(), 8)])),
            ..config
        };
        let value = payload(&config).unwrap();
        assert_eq!(value["private_cloud_id"], 9);
        assert_eq!(value["custom_sku"], json!({"cpu": 8, "gpu": 1}));
        assert!(value.get("sku_name").is_none());
    }

    #[test]
    fn ids_are_sent_as_integers() {
        let config = EndpointConfig {
            sfs_id: "5".into(),
            dataset_id: "6".into(),
            ..config()
        };
        let value = payload(&config).unwrap();
        assert_eq!(value["sfs_id"], 5);
        assert_eq!(value["dataset_id"], 6);
    }

    #[test]
    fn state_flattens_details() {
        let details: EndpointDetails = serde_json::from_value(json!({
            "id": 301,
            "name": "llm",
            "status": "stopped",
            "created_at": "2024-05-01",
            "sku_details": {"specs": {"name": "GPU-A100"}, "plan": {"sku_type": "hourly", "committed_days": "0", "currency": "INR"}},
            "storage_type": "disk",
            "replica": 1,
            "auto_scale_policy": {"min_replica": 1, "max_replica": 3, "stability_period": "120", "rules": []},
            "detailed_info": {
                "commands": STANDARD.encode("python serve.py"),
                "args": "",
                "engine_args": {"max_model_len": 4096, "enforce_eager": true, "dtype": "auto"}
            },
            "custom_endpoint_details": {
                "container": {
                    "container_name": "vllm/vllm-openai:latest",
                    "advance_config": {
                        "is_readiness_probe_enabled": true,
                        "readiness_probe": {"protocol": "http", "port": "8080", "path": "/health"}
                    }
                },
                "resource_details": {"disk_size": 50, "mount_path": "/mnt", "env_variables": null},
                "public_ip": "no"
            }
        }))
        .unwrap();
        let state = EndpointState::from(details);
        assert_eq!(state.id, "301");
        assert_eq!(state.stop_inference, InferenceAction::Stop);
        assert_eq!(state.sku_type, Some(SkuType::Hourly));
        let policy = state.auto_scale_policy.unwrap();
        assert_eq!((policy.max_replicas, policy.stability_period), (3, 120));
        let info = state.detailed_info.unwrap();
        assert_eq!(info.commands, "python serve.py");
        assert_eq!(info.engine_args["max_model_len"], "4096");
        assert_eq!(info.engine_args["enforce_eager"], "true");
        assert_eq!(info.engine_args["dtype"], "auto");
        assert!(state.is_readiness_probe_enabled);
        assert_eq!(state.readiness_probe.unwrap().port, 8080);
        assert_eq!(state.resource_details.unwrap().disk_size, 50);
        assert_eq!(state.container_name, "vllm/vllm-openai:latest");
    }

    #[test]
    fn framework_change_is_rejected() {
        let latest = EndpointState {
            id: "301".into(),
            status: "running".into(),
            ..Default::default()
        };
        let new = EndpointConfig {
            framework: "TRITON".into(),
            stop_inference: InferenceAction::Stop,
            ..config()
        };
        assert!(matches!(
            EndpointChange::between(&config(), &new, &latest),
            Err(ManagerError::CannotSyncWithoutRecreate(_))
        ));
    }

    #[test]
    fn update_kind_depends_on_status() {
        let running = EndpointState {
            status: "running".into(),
            ..Default::default()
        };
        let stopped = EndpointState {
            status: STATUS_STOPPED.into(),
            ..Default::default()
        };
        let stop = EndpointConfig {
            stop_inference: InferenceAction::Stop,
            ..config()
        };
        assert_eq!(
            EndpointChange::between(&config(), &stop, &running).unwrap(),
            EndpointChange::StartStop(InferenceAction::Stop)
        );
        let more = EndpointConfig {
            replica: 2,
            ..config()
        };
        assert_eq!(
            EndpointChange::between(&config(), &more, &running).unwrap(),
            EndpointChange::Replace { action: "patch" }
        );
        assert_eq!(
            EndpointChange::between(&config(), &more, &stopped).unwrap(),
            EndpointChange::Replace { action: "update" }
        );
    }
}
