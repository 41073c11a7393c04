use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use daggy::{stable_dag::StableDag, NodeIndex};
use daggy::petgraph::algo::toposort;
use thiserror::Error;

use super::{
    datastore::{Datastore, DatastoreError},
    manager::ResourceManager,
    registry::{ResourceType, SharedRegistry},
    resource::{Presence, Resource, ResourceError, SharedResource},
};

#[derive(Clone, Default)]
pub struct SharedPlan {
    inner: Arc<Mutex<Plan>>,
}

impl SharedPlan {
    fn lock(&self) -> Result<MutexGuard<'_, Plan>, PlanError> {
        self.inner
            .lock()
            .map_err(|err| PlanError::LockFail(err.to_string()))
    }
    pub fn resource<Config, State>(
        &self,
        rtype: ResourceType,
        mngr: Arc<dyn ResourceManager<Config, State>>,
        name: &str,
        presence: Presence,
        config: Config,
    ) -> Result<SharedResource<Config, State>, PlanError>
    where
        Config: Clone + PartialEq + fmt::Debug + 'static,
        State: Clone + fmt::Debug + 'static,
    {
        self.lock()?
            .add_resource(rtype, mngr, name, presence, config)
    }
    pub fn apply(
        &self,
        datastore: &mut Datastore,
        registry: &SharedRegistry,
    ) -> Result<(), PlanError> {
        self.lock()?.apply(datastore, registry)
    }
    pub fn destroy(
        &self,
        datastore: &mut Datastore,
        registry: &SharedRegistry,
    ) -> Result<(), PlanError> {
        self.lock()?.destroy(datastore, registry)
    }
    pub fn len(&self) -> usize {
        self.lock().map(|plan| plan.resources.len()).unwrap_or(0)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct Plan {
    resources: HashMap<String, Arc<dyn ResourceItem>>,
}

impl Plan {
    pub fn add_resource<Config, State>(
        &mut self,
        resource_type: ResourceType,
        manager: Arc<dyn ResourceManager<Config, State>>,
        name: &str,
        presence: Presence,
        config: Config,
    ) -> Result<SharedResource<Config, State>, PlanError>
    where
        Config: Clone + PartialEq + fmt::Debug + 'static,
        State: Clone + fmt::Debug + 'static,
    {
        let id = resource_type.resource_id(name);
        if self.resources.contains_key(&id) {
            return Err(PlanError::ResourceAlreadyExists(id));
        }
        let resource = SharedResource::new_resource(resource_type, manager, name, config, presence);
        self.resources
            .insert(id, Arc::new(resource.clone()) as Arc<dyn ResourceItem>);
        Ok(resource)
    }

    pub fn apply(
        &self,
        datastore: &mut Datastore,
        registry: &SharedRegistry,
    ) -> Result<(), PlanError> {
        tracing::info!("Applying plan with {} resources", self.resources.len());
        let sorted = self.toposort()?;
        self.apply_absent(datastore, registry, &sorted)?;
        self.apply_present(datastore, registry, &sorted)
    }

    fn apply_present(
        &self,
        datastore: &mut Datastore,
        registry: &SharedRegistry,
        sorted: &[Arc<dyn ResourceItem>],
    ) -> Result<(), PlanError> {
        for resource in sorted.iter() {
            if resource.presence() != Presence::Present {
                continue;
            }
            let id = resource.id();
            // Latest applied version, if any
            let latest = if datastore.contains(&id) {
                datastore.get(registry, &id)?
            } else {
                None
            };
            resource.apply_bindings()?;
            resource.ensure_present(latest)?;
            datastore.insert_resource(registry, resource.as_ref())?;
        }
        Ok(())
    }

    fn apply_absent(
        &self,
        datastore: &mut Datastore,
        registry: &SharedRegistry,
        sorted: &[Arc<dyn ResourceItem>],
    ) -> Result<(), PlanError> {
        // Children go before parents
        let mut to_keep = vec![];
        for resource in sorted.iter().rev() {
            let id = resource.id();
            match resource.presence() {
                Presence::Present => to_keep.push(id),
                Presence::Absent => {
                    if let Some(latest) = datastore.get(registry, &id)? {
                        latest.ensure_absent()?;
                    }
                    datastore.remove(&id);
                }
            }
        }
        let orphans: Vec<String> = datastore
            .keys()
            .into_iter()
            .filter(|key| !to_keep.contains(key))
            .collect();
        if !orphans.is_empty() {
            tracing::info!("Removing {} resources no longer declared", orphans.len());
        }
        self.delete_ids(orphans, datastore, registry)
    }

    fn delete_ids(
        &self,
        ids: Vec<String>,
        datastore: &mut Datastore,
        registry: &SharedRegistry,
    ) -> Result<(), PlanError> {
        let mut to_delete = vec![];
        for key in ids {
            if let Some(resource) = datastore.get(registry, &key)? {
                to_delete.push(resource)
            }
        }
        // Dependencies that are no longer stored were deleted already
        let sorted = sort_resources(&to_delete, true)?;
        for item in sorted.into_iter().rev() {
            item.ensure_absent()?;
            datastore.remove(&item.id());
        }
        Ok(())
    }

    pub fn destroy(
        &self,
        datastore: &mut Datastore,
        registry: &SharedRegistry,
    ) -> Result<(), PlanError> {
        tracing::info!("Destroying {} stored resources", datastore.keys().len());
        self.delete_ids(datastore.keys(), datastore, registry)
    }

    fn toposort(&self) -> Result<Vec<Arc<dyn ResourceItem>>, PlanError> {
        sort_resources(
            self.resources
                .values()
                .map(Arc::clone)
                .collect::<Vec<_>>()
                .as_slice(),
            false,
        )
    }
}

/// Orders resources so that every dependency comes before its dependents.
fn sort_resources(
    items: &[Arc<dyn ResourceItem>],
    skip_missing: bool,
) -> Result<Vec<Arc<dyn ResourceItem>>, PlanError> {
    let mut idx_id_map = HashMap::<String, NodeIndex>::new();
    let mut dag = StableDag::<Arc<dyn ResourceItem>, u32, u32>::new();
    for resource in items {
        let idx = dag.add_node(Arc::clone(resource));
        idx_id_map.insert(resource.id(), idx);
    }
    for resource in items {
        let idx = idx_id_map[&resource.id()];
        for dep in resource.dependencies() {
            let dep_idx = match idx_id_map.get(&dep) {
                Some(dep_idx) => *dep_idx,
                None if skip_missing => continue,
                None => return Err(PlanError::DependencyNotFound(dep)),
            };
            dag.add_edge(dep_idx, idx, 0)
                .map_err(|err| PlanError::DagCreationError(format!("{:?}", err)))?;
        }
    }
    let sorted_indexes = toposort(dag.graph(), None)
        .map_err(|err| PlanError::DagCreationError(format!("{:?}", err)))?;
    Ok(sorted_indexes
        .into_iter()
        .filter_map(|idx| dag.node_weight(idx).map(Arc::clone))
        .collect())
}

pub trait ResourceItem: fmt::Debug {
    fn as_any(&self) -> &dyn std::any::Any;
    fn resource_type(&self) -> ResourceType;
    fn id(&self) -> String;
    fn name(&self) -> String;
    fn presence(&self) -> Presence;
    fn set_presence(&self, presence: Presence);
    fn dependencies(&self) -> HashSet<String>;
    fn ensure_present(&self, latest: Option<Arc<dyn ResourceItem>>) -> Result<(), ResourceError>;
    fn ensure_absent(&self) -> Result<bool, ResourceError>;
    fn apply_bindings(&self) -> Result<(), ResourceError>;
}

pub fn item_as_resource<Config: Clone + 'static, State: Clone + 'static>(
    item: &dyn ResourceItem,
) -> Result<Resource<Config, State>, ResourceError> {
    let shared = item
        .as_any()
        .downcast_ref::<SharedResource<Config, State>>()
        .ok_or_else(|| ResourceError::DowncastFail(item.id()))?;
    let resource = shared
        .resource
        .lock()
        .map_err(|err| ResourceError::LockFail(err.to_string()))?;
    Ok(resource.clone())
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Resource {0} already exists")]
    ResourceAlreadyExists(String),
    #[error("Dependency {0} not found")]
    DependencyNotFound(String),
    #[error("Dag creation error: {0}")]
    DagCreationError(String),
    #[error("Plan lock failed: {0}")]
    LockFail(String),
    #[error(transparent)]
    ResourceError(#[from] ResourceError),
    #[error(transparent)]
    DatastoreError(#[from] DatastoreError),
}
