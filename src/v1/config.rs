//! Provider configuration
//!
//! Credentials and the API endpoint come from the environment (optionally a
//! `.env` file) and can be overridden from the command line.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_ENDPOINT: &str = "https://api.e2enetworks.com/myaccount/api/v1/gpu";

pub const API_KEY_VAR: &str = "TIR_API_KEY";
pub const AUTH_TOKEN_VAR: &str = "TIR_AUTH_TOKEN";
pub const API_ENDPOINT_VAR: &str = "TIR_API_ENDPOINT";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub auth_token: String,
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"***")
            .field("auth_token", &"***")
            .field("api_endpoint", &self.api_endpoint)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            auth_token: auth_token.into(),
            api_endpoint: default_api_endpoint(),
        }
    }

    pub fn with_endpoint(mut self, api_endpoint: impl Into<String>) -> Self {
        self.api_endpoint = api_endpoint.into();
        self
    }

    /// Load configuration from `TIR_*` variables, reading `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::resolve(
            env::var(API_KEY_VAR).ok(),
            env::var(AUTH_TOKEN_VAR).ok(),
            env::var(API_ENDPOINT_VAR).ok(),
        )
    }

    /// Build a configuration from optional parts, rejecting blank credentials.
    pub fn resolve(
        api_key: Option<String>,
        auth_token: Option<String>,
        api_endpoint: Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(API_KEY_VAR))?;
        let auth_token = auth_token
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(AUTH_TOKEN_VAR))?;
        let config = Self::new(api_key, auth_token);
        Ok(match api_endpoint.filter(|v| !v.trim().is_empty()) {
            Some(endpoint) => config.with_endpoint(endpoint),
            None => config,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing credential, set {0}")]
    Missing(&'static str),
}
