use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    manager::{ManagerError, ResourceManager},
    plan::{item_as_resource, ResourceItem},
    registry::ResourceType,
};

#[derive(Debug, Clone)]
pub struct SharedResource<Config: Clone, State: Clone> {
    pub resource: Arc<Mutex<Resource<Config, State>>>,
}

impl<Config, State> SharedResource<Config, State>
where
    Config: Clone,
    State: Clone,
{
    fn guard(&self) -> MutexGuard<'_, Resource<Config, State>> {
        self.resource.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<Config, State> ResourceItem for SharedResource<Config, State>
where
    Config: Clone + PartialEq + fmt::Debug + 'static,
    State: Clone + fmt::Debug + 'static,
{
    fn id(&self) -> String {
        self.guard().id.clone()
    }
    fn name(&self) -> String {
        self.guard().name.clone()
    }
    fn resource_type(&self) -> ResourceType {
        self.guard().resource_type.clone()
    }
    fn presence(&self) -> Presence {
        self.guard().presence
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn set_presence(&self, presence: Presence) {
        self.guard().presence = presence;
    }
    fn dependencies(&self) -> HashSet<String> {
        self.guard().dependencies.clone()
    }
    fn ensure_present(&self, latest: Option<Arc<dyn ResourceItem>>) -> Result<(), ResourceError> {
        self.guard().ensure_present(latest)
    }
    fn ensure_absent(&self) -> Result<bool, ResourceError> {
        self.guard().ensure_absent()
    }
    fn apply_bindings(&self) -> Result<(), ResourceError> {
        self.guard().apply_bindings()
    }
}

impl<Config: Clone + PartialEq + 'static, State: Clone + 'static> SharedResource<Config, State> {
    pub fn new_resource(
        resource_type: ResourceType,
        manager: Arc<dyn ResourceManager<Config, State>>,
        name: impl ToString,
        config: Config,
        presence: Presence,
    ) -> Self {
        Self::new(Resource::new(
            resource_type,
            manager,
            name,
            config,
            presence,
        ))
    }
    pub fn new(resource: Resource<Config, State>) -> Self {
        Self {
            resource: Arc::new(Mutex::new(resource)),
        }
    }

    /// Declares a dependency on `dependency` and copies part of its state into
    /// this resource's config right before this resource is applied.
    pub fn bind<C2: 'static + Clone + PartialEq, S2: 'static + Clone>(
        &self,
        dependency: &SharedResource<C2, S2>,
        bind_fn: impl Fn(&mut Config, &S2) + 'static,
    ) -> Result<(), ResourceError> {
        let dep = dependency.clone();
        let other_id = dep.id()?;
        let other_presence = dep.presence()?;
        let mut inner = self.lock()?;
        tracing::debug!("Binding State[{}] to Config[{}]", other_id, inner.id);
        inner.dependencies.insert(other_id.clone());
        if let Presence::Absent = other_presence {
            inner.presence = Presence::Absent;
            tracing::info!(
                "Resource[{}] marked absent because Resource[{}] is absent",
                inner.id,
                other_id
            );
        }
        inner.bindings.push(Bind {
            dep_id: other_id,
            dep_fn: Arc::new(move |config: &mut Config| {
                dep.with_state(|state| bind_fn(config, state))
            }),
        });
        Ok(())
    }
    fn lock(&self) -> Result<MutexGuard<'_, Resource<Config, State>>, ResourceError> {
        self.resource
            .lock()
            .map_err(|err| ResourceError::LockFail(err.to_string()))
    }
    pub fn id(&self) -> Result<String, ResourceError> {
        self.lock().map(|inner| inner.id.clone())
    }
    pub fn presence(&self) -> Result<Presence, ResourceError> {
        self.lock().map(|inner| inner.presence)
    }
    pub fn config(&self) -> Result<Config, ResourceError> {
        self.lock().map(|inner| inner.config.clone())
    }
    pub fn state(&self) -> Result<Option<State>, ResourceError> {
        Ok(self.lock()?.state.clone())
    }

    pub fn with_state(&self, apply: impl FnOnce(&State)) -> Result<(), ResourceError> {
        let inner = self.lock()?;
        match &inner.state {
            Some(state) => {
                apply(state);
                Ok(())
            }
            None => Err(ResourceError::DependencyStateIsMissing(inner.id.clone())),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Resource<Config, State> {
    pub resource_type: ResourceType,
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub config: Config,
    pub state: Option<State>,
    pub presence: Presence,
    pub dependencies: HashSet<String>,
    #[serde(skip, default = "default_bindings")]
    pub bindings: Vec<Bind<Config>>,
    #[serde(skip, default = "default_manager")]
    pub manager: Option<Arc<dyn ResourceManager<Config, State>>>,
}

impl<Config: fmt::Debug, State: fmt::Debug> fmt::Debug for Resource<Config, State> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("resource_type", &self.resource_type)
            .field("id", &self.id)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("presence", &self.presence)
            .field("dependencies", &self.dependencies)
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl<Config: Clone + PartialEq + 'static, State: Clone + 'static> Resource<Config, State> {
    pub fn new(
        resource_type: ResourceType,
        manager: Arc<dyn ResourceManager<Config, State>>,
        name: impl ToString,
        config: Config,
        presence: Presence,
    ) -> Self {
        let name = name.to_string();
        let id = resource_type.resource_id(&name);
        tracing::debug!("New Resource[{}]", id);
        Self {
            id,
            name,
            resource_type,
            config,
            state: None,
            presence,
            dependencies: Default::default(),
            bindings: Default::default(),
            manager: Some(manager),
        }
    }

    fn manager(&self) -> Result<&Arc<dyn ResourceManager<Config, State>>, ResourceError> {
        self.manager.as_ref().ok_or(ResourceError::ManagerNotSet)
    }

    fn ensure_present(
        &mut self,
        latest: Option<Arc<dyn ResourceItem>>,
    ) -> Result<(), ResourceError> {
        let latest = latest
            .map(|item| item_as_resource::<Config, State>(item.as_ref()))
            .transpose()?;
        let previous = latest
            .as_ref()
            .and_then(|r| r.state.as_ref().map(|state| (&r.config, state)));
        tracing::info!("Ensuring Resource[{}] is present", self.id);
        let state = self
            .manager()?
            .ensure_present(previous, &self.config)
            .map_err(|source| ResourceError::ManagerError {
                id: self.id.clone(),
                source,
            })?;
        tracing::info!("Resource[{}] is present", self.id);
        self.state = Some(state);
        Ok(())
    }

    fn ensure_absent(&mut self) -> Result<bool, ResourceError> {
        let Some(state) = self.state.as_ref() else {
            return Ok(false);
        };
        tracing::info!("Ensuring Resource[{}] is absent", self.id);
        let deleted = self
            .manager()?
            .ensure_absent(&self.config, state)
            .map_err(|source| ResourceError::ManagerError {
                id: self.id.clone(),
                source,
            })?;
        if !deleted {
            tracing::warn!("Resource[{}] was already gone", self.id);
        }
        self.state = None;
        Ok(deleted)
    }

    fn apply_bindings(&mut self) -> Result<(), ResourceError> {
        let mut config = self.config.clone();
        for b in self.bindings.iter() {
            (b.dep_fn)(&mut config)?;
            tracing::debug!("Resource[{}].state bound to Resource[{}].config", b.dep_id, self.id);
        }
        self.config = config;
        Ok(())
    }
}

pub fn default_manager<Config, State>() -> Option<Arc<dyn ResourceManager<Config, State>>> {
    None
}
pub fn default_bindings<Config>() -> Vec<Bind<Config>> {
    vec![]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Absent,
    #[default]
    Present,
}

#[derive(Clone)]
#[allow(clippy::type_complexity)]
pub struct Bind<Config> {
    dep_id: String,
    dep_fn: Arc<dyn Fn(&mut Config) -> Result<(), ResourceError>>,
}
impl<T> fmt::Debug for Bind<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bind")
            .field("dep_id", &self.dep_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("LockFail: {0}")]
    LockFail(String),
    #[error("DependencyStateIsMissing: Resource[{0}] has not been applied")]
    DependencyStateIsMissing(String),
    #[error("DowncastFail: Resource[{0}] has an unexpected type")]
    DowncastFail(String),
    #[error("ManagerNotSet")]
    ManagerNotSet,
    #[error("Resource[{id}]: {source}")]
    ManagerError {
        id: String,
        #[source]
        source: ManagerError,
    },
}
