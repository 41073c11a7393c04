//! TIR API client
//!
//! Thin wrapper over [`Transport`] with the URL layout shared by every
//! project-scoped resource. Resource specific calls live next to their
//! managers as additional `impl TirClient` blocks.

use serde::{Deserialize, Serialize};

use super::transport::{ApiError, Call, Transport};
use crate::v1::config::ProviderConfig;

/// Team, project and IAM a resource lives in. Sent on every call.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub team_id: String,
    pub project_id: String,
    pub active_iam: String,
}

impl Scope {
    pub fn new(
        team_id: impl Into<String>,
        project_id: impl Into<String>,
        active_iam: impl Into<String>,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            project_id: project_id.into(),
            active_iam: active_iam.into(),
        }
    }

    /// `/teams/{team}/projects/{project}/{collection}/`
    pub fn collection(&self, collection: &str) -> String {
        format!(
            "/teams/{}/projects/{}/{}/",
            self.team_id, self.project_id, collection
        )
    }

    /// `/teams/{team}/projects/{project}/{collection}/{id}/`
    pub fn item(&self, collection: &str, id: &str) -> String {
        format!("{}{}/", self.collection(collection), id)
    }

    pub fn get(&self, collection: &str, id: &str) -> Call {
        Call::get(self.item(collection, id), &self.active_iam)
    }
    pub fn post(&self, collection: &str) -> Call {
        Call::post(self.collection(collection), &self.active_iam)
    }
    pub fn put(&self, path: String) -> Call {
        Call::put(path, &self.active_iam)
    }
    pub fn delete(&self, collection: &str, id: &str) -> Call {
        Call::delete(self.item(collection, id), &self.active_iam)
    }
}

#[derive(Clone, Debug)]
pub struct TirClient {
    transport: Transport,
}

impl TirClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ApiError> {
        Transport::new(config)
            .map(|transport| Self { transport })
            .map_err(|source| ApiError::Transport {
                method: reqwest::Method::GET,
                path: config.api_endpoint.clone(),
                source,
            })
    }
    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_paths() {
        let scope = Scope::new("11", "22", "33");
        assert_eq!(scope.collection("datasets"), "/teams/11/projects/22/datasets/");
        assert_eq!(
            scope.item("serving/inference", "7"),
            "/teams/11/projects/22/serving/inference/7/"
        );
        let call = scope.delete("notebooks", "9");
        assert_eq!(call.path, "/teams/11/projects/22/notebooks/9/");
        assert_eq!(call.active_iam, "33");
    }
}
