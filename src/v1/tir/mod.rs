pub mod client;
pub mod dataset;
pub mod de;
pub mod frameworks;
pub mod integration;
pub mod lookup;
pub mod model_endpoint;
pub mod model_repo;
pub mod node;
pub mod private_cluster;
pub mod sku;
pub mod transport;

use std::{fmt, future::Future, marker::PhantomData, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use strum_macros::EnumString;
use tokio::runtime::Handle;

use self::{
    client::TirClient, dataset::Dataset, integration::Integration,
    model_endpoint::ModelEndpoint, model_repo::ModelRepo, node::Node,
    private_cluster::PrivateCluster,
};
use self::transport::ApiError;
use super::{
    manager::{ManagerError, ResourceManager},
    plan::{PlanError, SharedPlan},
    registry::{
        RProvider, RType, Registry, RegistryError, ResourceSerde, ResourceSerdeProvider,
        ResourceType,
    },
    resource::{Presence, ResourceError, SharedResource},
};

pub const PROVIDER_NAME: &str = "tir";

#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TirType {
    Node,
    Dataset,
    ModelRepo,
    ModelEndpoint,
    Integration,
    PrivateCluster,
}

pub struct TirProvider {
    plan: SharedPlan,
    handle: Handle,
    client: TirClient,
    rprovider: RProvider,
}

/// Manager shared by every TIR resource type. Calls are async underneath and
/// block on the runtime handle.
pub struct TirManager<Config, State> {
    client: TirClient,
    handle: Handle,
    _phantom: PhantomData<fn() -> (Config, State)>,
}

#[derive(Clone)]
pub struct TirResource<'a, Config: Clone, State: Clone> {
    pub tir: &'a TirProvider,
    pub inner: SharedResource<Config, State>,
}

impl<'a, Config, State> TirResource<'a, Config, State>
where
    Config: Clone + PartialEq + 'static,
    State: Clone + 'static,
{
    pub fn bind<C2: 'static + Clone + PartialEq, S2: 'static + Clone>(
        &self,
        dep: &TirResource<'_, C2, S2>,
        bind_fn: impl Fn(&mut Config, &S2) + 'static,
    ) -> Result<&Self, ResourceError> {
        self.inner.bind(&dep.inner, bind_fn)?;
        Ok(self)
    }
    pub fn config(&self) -> Result<Config, ResourceError> {
        self.inner.config()
    }
    pub fn state(&self) -> Result<Option<State>, ResourceError> {
        self.inner.state()
    }
}

pub trait TirResourceCreator {
    type Config: Clone + PartialEq + fmt::Debug + 'static;
    type State: Clone + fmt::Debug + 'static;
    fn r#type() -> TirType;
    fn manager(
        handle: &Handle,
        client: &TirClient,
    ) -> Arc<dyn ResourceManager<Self::Config, Self::State>>;
    fn create(
        plan: &SharedPlan,
        handle: &Handle,
        client: &TirClient,
        rprovider: RProvider,
        name: &str,
        presence: Presence,
        config: Self::Config,
    ) -> Result<SharedResource<Self::Config, Self::State>, PlanError> {
        plan.resource(
            ResourceType {
                rprovider,
                rtype: RType {
                    name: Self::r#type().to_string(),
                },
            },
            Self::manager(handle, client),
            name,
            presence,
            config,
        )
    }
}

impl ResourceSerdeProvider for TirProvider {
    fn get_resource_serde(
        &self,
        r: &Registry,
        t: &ResourceType,
    ) -> Result<ResourceSerde, RegistryError> {
        let handle = &self.handle;
        let client = &self.client;
        match TirType::from_str(t.rtype.name.as_str())
            .map_err(|_| RegistryError::ResourceTypeNotSupported(t.rtype.name.clone()))?
        {
            TirType::Node => r.serde(Node::manager(handle, client)),
            TirType::Dataset => r.serde(Dataset::manager(handle, client)),
            TirType::ModelRepo => r.serde(ModelRepo::manager(handle, client)),
            TirType::ModelEndpoint => r.serde(ModelEndpoint::manager(handle, client)),
            TirType::Integration => r.serde(Integration::manager(handle, client)),
            TirType::PrivateCluster => r.serde(PrivateCluster::manager(handle, client)),
        }
    }
}

impl<Config, State> TirManager<Config, State> {
    pub fn new(handle: &Handle, client: &TirClient) -> Self {
        Self {
            client: client.clone(),
            handle: handle.clone(),
            _phantom: PhantomData,
        }
    }
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
    fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// A 404 on read means the resource is gone.
fn found<T>(result: Result<T, ApiError>) -> Result<Option<T>, ManagerError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(ManagerError::LookupFail(err)),
    }
}

/// A 404 on delete counts as success; returns whether anything was deleted.
fn deleted(result: Result<(), ApiError>) -> Result<bool, ManagerError> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) => Err(ManagerError::DeleteFail(err)),
    }
}

/// Parses an id reference from config into the integer the API expects.
fn parse_id(field: &str, value: &str) -> Result<i64, ManagerError> {
    value.trim().parse().map_err(|_| {
        ManagerError::InvalidConfig(format!("{} must be a numeric id, got {:?}", field, value))
    })
}

impl TirProvider {
    pub fn new(handle: &Handle, plan: SharedPlan, client: TirClient) -> Self {
        Self {
            plan,
            handle: handle.clone(),
            client,
            rprovider: RProvider {
                name: PROVIDER_NAME.to_string(),
            },
        }
    }
    pub fn client(&self) -> &TirClient {
        &self.client
    }
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
    pub fn resource<Tir: TirResourceCreator>(
        &self,
        name: &str,
        presence: Presence,
        config: Tir::Config,
    ) -> Result<TirResource<'_, Tir::Config, Tir::State>, PlanError> {
        Ok(TirResource {
            tir: self,
            inner: Tir::create(
                &self.plan,
                &self.handle,
                &self.client,
                self.rprovider.clone(),
                name,
                presence,
                config,
            )?,
        })
    }
}
