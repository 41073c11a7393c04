//! Declarative manifest
//!
//! A YAML (or JSON) document listing the resources `tircloud apply` converges
//! to. A top level `scope` is copied into every config that does not set its
//! own, and `name` defaults to the declaration name.
//!
//! ```yaml
//! scope: {team_id: "11", project_id: "22", active_iam: "33"}
//! resources:
//!   - type: dataset
//!     name: weights
//!     config: {storage_type: new_bucket, encryption_enable: false}
//!   - type: model_endpoint
//!     name: llm
//!     bind:
//!       - {type: dataset, name: weights}
//!     config:
//!       framework: VLLM
//!       sku_name: GDC.A100-16.115GB
//!       sku_type: hourly
//!       cluster_type: tir-cluster
//!       storage_type: disk
//!       container_type: public
//!       location: Delhi
//!       currency: INR
//! ```

use std::{collections::HashMap, fmt, fs, path::Path};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{
    plan::PlanError,
    resource::{Presence, ResourceError},
    tir::{
        client::Scope, dataset::Dataset, integration::Integration, model_endpoint::ModelEndpoint,
        model_repo::ModelRepo, node::Node, private_cluster::PrivateCluster, TirProvider, TirType,
    },
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub resources: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(rename = "type")]
    pub rtype: TirType,
    pub name: String,
    #[serde(default)]
    pub presence: Presence,
    #[serde(default)]
    pub bind: Vec<Reference>,
    #[serde(default)]
    pub config: Value,
}

/// Another declaration of the same manifest, by type and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub rtype: TirType,
    pub name: String,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rtype, self.name)
    }
}

impl Declaration {
    pub fn reference(&self) -> Reference {
        Reference {
            rtype: self.rtype,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Cannot read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{0}: config must be a mapping")]
    NotAMapping(Reference),
    #[error("{reference}: invalid config: {source}")]
    InvalidConfig {
        reference: Reference,
        #[source]
        source: serde_json::Error,
    },
    #[error("{resource} binds to {dependency}, which is not declared")]
    UnknownReference {
        resource: Reference,
        dependency: Reference,
    },
    #[error("{resource} cannot be bound to {dependency}")]
    UnsupportedBind {
        resource: Reference,
        dependency: Reference,
    },
    #[error(transparent)]
    PlanError(#[from] PlanError),
    #[error(transparent)]
    ResourceError(#[from] ResourceError),
}

/// Resource handles created from a manifest, kept around to wire bindings.
enum Declared<'a> {
    Node(Node<'a>),
    Dataset(Dataset<'a>),
    ModelRepo(ModelRepo<'a>),
    ModelEndpoint(ModelEndpoint<'a>),
    Integration(Integration<'a>),
    PrivateCluster(PrivateCluster<'a>),
}

impl<'a> Declared<'a> {
    /// Returns false when this pair of types has no binding.
    fn bind(&self, dependency: &Declared<'a>) -> Result<bool, ResourceError> {
        match (self, dependency) {
            (Declared::Node(node), Declared::Dataset(dataset)) => {
                node.bind_dataset(dataset)?;
            }
            (Declared::ModelEndpoint(endpoint), Declared::ModelRepo(repo)) => {
                endpoint.bind_model_repo(repo)?;
            }
            (Declared::ModelEndpoint(endpoint), Declared::Dataset(dataset)) => {
                endpoint.bind_dataset(dataset)?;
            }
            (Declared::ModelEndpoint(endpoint), Declared::Integration(integration)) => {
                endpoint.bind_integration(integration)?;
            }
            (Declared::ModelEndpoint(endpoint), Declared::PrivateCluster(cluster)) => {
                endpoint.bind_private_cluster(cluster)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Typed config of one declaration, with the manifest scope and name filled in.
    pub fn config<T: DeserializeOwned>(&self, declaration: &Declaration) -> Result<T, ManifestError> {
        let mut config = match &declaration.config {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => return Err(ManifestError::NotAMapping(declaration.reference())),
        };
        if let Some(scope) = &self.scope {
            for (key, value) in [
                ("team_id", &scope.team_id),
                ("project_id", &scope.project_id),
                ("active_iam", &scope.active_iam),
            ] {
                config
                    .entry(key)
                    .or_insert_with(|| Value::String(value.clone()));
            }
        }
        config
            .entry("name")
            .or_insert_with(|| Value::String(declaration.name.clone()));
        serde_json::from_value(Value::Object(config)).map_err(|source| {
            ManifestError::InvalidConfig {
                reference: declaration.reference(),
                source,
            }
        })
    }

    /// Adds every declared resource to the provider's plan and wires the
    /// bindings. Returns the declared resource ids.
    pub fn declare(&self, tir: &TirProvider) -> Result<Vec<String>, ManifestError> {
        let mut declared = HashMap::new();
        let mut ids = vec![];
        for declaration in &self.resources {
            let name = declaration.name.as_str();
            let presence = declaration.presence;
            let resource = match declaration.rtype {
                TirType::Node => {
                    let node = tir.resource::<Node>(name, presence, self.config(declaration)?)?;
                    ids.push(node.inner.id()?);
                    Declared::Node(node)
                }
                TirType::Dataset => {
                    let dataset =
                        tir.resource::<Dataset>(name, presence, self.config(declaration)?)?;
                    ids.push(dataset.inner.id()?);
                    Declared::Dataset(dataset)
                }
                TirType::ModelRepo => {
                    let repo =
                        tir.resource::<ModelRepo>(name, presence, self.config(declaration)?)?;
                    ids.push(repo.inner.id()?);
                    Declared::ModelRepo(repo)
                }
                TirType::ModelEndpoint => {
                    let endpoint =
                        tir.resource::<ModelEndpoint>(name, presence, self.config(declaration)?)?;
                    ids.push(endpoint.inner.id()?);
                    Declared::ModelEndpoint(endpoint)
                }
                TirType::Integration => {
                    let integration =
                        tir.resource::<Integration>(name, presence, self.config(declaration)?)?;
                    ids.push(integration.inner.id()?);
                    Declared::Integration(integration)
                }
                TirType::PrivateCluster => {
                    let cluster =
                        tir.resource::<PrivateCluster>(name, presence, self.config(declaration)?)?;
                    ids.push(cluster.inner.id()?);
                    Declared::PrivateCluster(cluster)
                }
            };
            declared.insert(declaration.reference(), resource);
        }

        for declaration in &self.resources {
            let resource = declaration.reference();
            for dependency in &declaration.bind {
                let (Some(target), Some(source)) =
                    (declared.get(&resource), declared.get(dependency))
                else {
                    return Err(ManifestError::UnknownReference {
                        resource,
                        dependency: dependency.clone(),
                    });
                };
                if !target.bind(source)? {
                    return Err(ManifestError::UnsupportedBind {
                        resource,
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(ids)
    }
}
