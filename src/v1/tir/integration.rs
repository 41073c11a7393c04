//! Third party integrations. Only Hugging Face tokens are supported, used by
//! endpoints to pull gated models.

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

const INTEGRATIONS: &str = "integrations";

pub type IntegrationManager = TirManager<IntegrationConfig, IntegrationState>;
pub type Integration<'a> = TirResource<'a, IntegrationConfig, IntegrationState>;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub name: String,
    #[serde(default = "default_integration_type")]
    pub integration_type: String,
    pub hugging_face_token: String,
    #[serde(flatten)]
    pub scope: Scope,
}

fn default_integration_type() -> String {
    "hugging_face".to_string()
}

impl std::fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("name", &self.name)
            .field("integration_type", &self.integration_type)
            .field("hugging_face_token", &"***")
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationState {
    pub id: String,
    pub name: String,
    pub integration_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HuggingFaceDetails<'a> {
    pub hugging_face_token: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationPayload<'a> {
    pub integration_details: HuggingFaceDetails<'a>,
    pub integration_type: &'a str,
    pub name: &'a str,
}

impl<'a> From<&'a IntegrationConfig> for IntegrationPayload<'a> {
    fn from(config: &'a IntegrationConfig) -> Self {
        Self {
            integration_details: HuggingFaceDetails {
                hugging_face_token: &config.hugging_face_token,
            },
            integration_type: &config.integration_type,
            name: &config.name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationDetails {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub integration_type: String,
}

impl IntegrationState {
    fn new(config: &IntegrationConfig, details: IntegrationDetails) -> Self {
        Self {
            id: details.id,
            name: if details.name.is_empty() {
                config.name.clone()
            } else {
                details.name
            },
            integration_type: if details.integration_type.is_empty() {
                config.integration_type.clone()
            } else {
                details.integration_type
            },
        }
    }
}

impl TirClient {
    pub async fn new_integration(
        &self,
        scope: &Scope,
        payload: &IntegrationPayload<'_>,
    ) -> Result<IntegrationDetails, ApiError> {
        self.transport()
            .send(scope.post(INTEGRATIONS).json(payload)?)
            .await
    }
    pub async fn get_integration(
        &self,
        scope: &Scope,
        id: &str,
    ) -> Result<IntegrationDetails, ApiError> {
        self.transport().send(scope.get(INTEGRATIONS, id)).await
    }
    pub async fn delete_integration(&self, scope: &Scope, id: &str) -> Result<(), ApiError> {
        self.transport()
            .request(scope.delete(INTEGRATIONS, id))
            .await
            .map(|_| ())
    }
}

impl TirResourceCreator for Integration<'_> {
    type Config = IntegrationConfig;
    type State = IntegrationState;
    fn r#type() -> TirType {
        TirType::Integration
    }
    fn manager(
        handle: &Handle,
        client: &TirClient,
    ) -> Arc<dyn ResourceManager<Self::Config, Self::State>> {
        IntegrationManager::new(handle, client).arc()
    }
}

impl ResourceManager<IntegrationConfig, IntegrationState> for IntegrationManager {
    fn create(&self, config: &IntegrationConfig) -> Result<IntegrationState, ManagerError> {
        let details = self
            .block_on(
                self.client
                    .new_integration(&config.scope, &IntegrationPayload::from(config)),
            )
            .map_err(ManagerError::CreateFail)?;
        tracing::info!("Integration {} created with id {}", config.name, details.id);
        Ok(IntegrationState::new(config, details))
    }

    fn read(
        &self,
        config: &IntegrationConfig,
        latest: &IntegrationState,
    ) -> Result<Option<IntegrationState>, ManagerError> {
        found(self.block_on(self.client.get_integration(&config.scope, &latest.id)))
            .map(|details| details.map(|details| IntegrationState::new(config, details)))
    }

    fn update(
        &self,
        _previous: &IntegrationConfig,
        _config: &IntegrationConfig,
        latest: &IntegrationState,
    ) -> Result<IntegrationState, ManagerError> {
        tracing::warn!("Integration {} cannot be modified, keeping it as is", latest.id);
        Ok(latest.clone())
    }

    fn delete(
        &self,
        config: &IntegrationConfig,
        latest: &IntegrationState,
    ) -> Result<bool, ManagerError> {
        deleted(self.block_on(self.client.delete_integration(&config.scope, &latest.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_nests_token() {
        let config: IntegrationConfig = serde_json::from_value(json!({
            "name": "hf", "hugging_face_token": "hf_abc",
            "team_id": "1", "project_id": "2", "active_iam": "3"
        }))
        .unwrap();
        assert_eq!(
            serde_json::to_value(IntegrationPayload::from(&config)).unwrap(),
            json!({
                "integration_details": {"hugging_face_token": "hf_abc"},
                "integration_type": "hugging_face",
                "name": "hf"
            })
        );
        assert!(!format!("{:?}", config).contains("hf_abc"));
    }
}
