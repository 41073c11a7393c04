use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{
    manager::ResourceManager,
    plan::ResourceItem,
    resource::{Resource, SharedResource},
};

#[derive(Debug, Default, Clone, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct RProvider {
    pub name: String,
}

#[derive(Debug, Default, Clone, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct RType {
    pub name: String,
}

#[derive(Debug, Default, Clone, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct ResourceType {
    pub rprovider: RProvider,
    pub rtype: RType,
}

impl ResourceType {
    /// Datastore key of a resource: `<provider>/<type>/<name>`.
    pub fn resource_id(&self, name: &str) -> String {
        format!("{}/{}/{}", self.rprovider.name, self.rtype.name, name)
    }
}

type Serializer = Arc<dyn Fn(&dyn ResourceItem) -> Result<Value, RegistryError> + Sync + Send>;
type Deserializer =
    Arc<dyn Fn(&Value) -> Result<Arc<dyn ResourceItem>, RegistryError> + Sync + Send>;

pub struct ResourceSerde {
    serializer: Serializer,
    deserializer: Deserializer,
}

pub trait ResourceSerdeProvider {
    fn get_resource_serde(
        &self,
        registry: &Registry,
        rt: &ResourceType,
    ) -> Result<ResourceSerde, RegistryError>;
}

#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl SharedRegistry {
    pub fn new(provider_factory: ProviderFactory) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry::new(provider_factory))),
        }
    }
    fn lock(&self) -> Result<MutexGuard<'_, Registry>, RegistryError> {
        self.inner.lock().map_err(|_| RegistryError::LockResourceError)
    }
    pub fn register_provider(
        &self,
        rprovider: &RProvider,
        provider: &Arc<Mutex<dyn ResourceSerdeProvider>>,
    ) -> Result<(), RegistryError> {
        self.lock()?.register_provider(rprovider, provider);
        Ok(())
    }
    pub fn serialize_resource(
        &self,
        resource: &dyn ResourceItem,
        resource_type: &ResourceType,
    ) -> Result<Value, RegistryError> {
        self.lock()?.serialize_resource(resource, resource_type)
    }
    pub fn deserialize_resource(
        &self,
        value: &Value,
        resource_type: &ResourceType,
    ) -> Result<Arc<dyn ResourceItem>, RegistryError> {
        self.lock()?.deserialize_resource(value, resource_type)
    }
}

pub type ProviderFactory =
    Box<dyn Fn(&RProvider) -> Result<Arc<Mutex<dyn ResourceSerdeProvider>>, RegistryError>>;

pub struct Registry {
    serde_store: HashMap<ResourceType, ResourceSerde>,
    provider_store: HashMap<RProvider, Arc<Mutex<dyn ResourceSerdeProvider>>>,
    provider_factory: ProviderFactory,
}

impl Registry {
    pub fn new(provider_factory: ProviderFactory) -> Self {
        Self {
            serde_store: HashMap::new(),
            provider_store: HashMap::new(),
            provider_factory,
        }
    }
    pub fn register_provider(
        &mut self,
        rprovider: &RProvider,
        provider: &Arc<Mutex<dyn ResourceSerdeProvider>>,
    ) {
        self.provider_store
            .insert(rprovider.clone(), provider.clone());
    }

    /// Type-erased (de)serializers for one resource type. Deserialized
    /// resources get `mngr` attached so they can be deleted or refreshed.
    pub fn serde<Config, State>(
        &self,
        mngr: Arc<dyn ResourceManager<Config, State>>,
    ) -> Result<ResourceSerde, RegistryError>
    where
        Config: 'static + Serialize + for<'de> Deserialize<'de> + Clone + PartialEq + fmt::Debug,
        State: 'static + Serialize + for<'de> Deserialize<'de> + Clone + fmt::Debug,
    {
        let serialize_fn: Serializer = Arc::new(
            move |res: &dyn ResourceItem| -> Result<Value, RegistryError> {
                let res: Resource<Config, State> = res
                    .as_any()
                    .downcast_ref::<SharedResource<Config, State>>()
                    .ok_or(RegistryError::DowncastError)?
                    .resource
                    .lock()
                    .map_err(|_| RegistryError::LockResourceError)?
                    .clone();
                serde_json::to_value(res).map_err(RegistryError::SerializationError)
            },
        );
        let deserialize_fn: Deserializer = Arc::new(
            move |value: &Value| -> Result<Arc<dyn ResourceItem>, RegistryError> {
                serde_json::from_value(value.clone())
                    .map(|mut resource: Resource<Config, State>| {
                        resource.manager = Some(Arc::clone(&mngr));
                        Arc::new(SharedResource::new(resource)) as Arc<dyn ResourceItem>
                    })
                    .map_err(RegistryError::SerializationError)
            },
        );
        Ok(ResourceSerde {
            serializer: serialize_fn,
            deserializer: deserialize_fn,
        })
    }

    pub fn register_type(
        &mut self,
        resource_type: &ResourceType,
        resource_serde: ResourceSerde,
    ) -> Result<(), RegistryError> {
        match self
            .serde_store
            .insert(resource_type.clone(), resource_serde)
        {
            Some(_) => Err(RegistryError::TypeRegisteredAlready(format!(
                "{:?}",
                resource_type
            ))),
            None => Ok(()),
        }
    }

    pub fn serialize_resource(
        &mut self,
        resource: &dyn ResourceItem,
        resource_type: &ResourceType,
    ) -> Result<Value, RegistryError> {
        (self.resource_serde(resource_type)?.serializer)(resource)
    }

    pub fn deserialize_resource(
        &mut self,
        value: &Value,
        resource_type: &ResourceType,
    ) -> Result<Arc<dyn ResourceItem>, RegistryError> {
        (self.resource_serde(resource_type)?.deserializer)(value)
    }

    fn resource_serde(&mut self, resource_type: &ResourceType) -> Result<&ResourceSerde, RegistryError> {
        if !self.serde_store.contains_key(resource_type) {
            let provider = self.provider(&resource_type.rprovider)?;
            let resource_serde = provider
                .lock()
                .map_err(|_| RegistryError::LockResourceError)?
                .get_resource_serde(self, resource_type)?;
            self.register_type(resource_type, resource_serde)?;
        }
        self.serde_store.get(resource_type).ok_or_else(|| {
            RegistryError::TypeNotRegistered(format!(
                "Provider: {}, Type: {}",
                resource_type.rprovider.name, resource_type.rtype.name
            ))
        })
    }

    fn provider(
        &mut self,
        rprovider: &RProvider,
    ) -> Result<Arc<Mutex<dyn ResourceSerdeProvider>>, RegistryError> {
        if let Some(provider) = self.provider_store.get(rprovider) {
            return Ok(Arc::clone(provider));
        }
        let provider = (self.provider_factory)(rprovider)?;
        self.register_provider(rprovider, &provider);
        Ok(provider)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("DowncastError, could not downcast to SharedResource")]
    DowncastError,
    #[error("TypeNotRegistered, provider was not able to register resource: {0}")]
    TypeNotRegistered(String),
    #[error("TypeRegisteredAlready: {0}")]
    TypeRegisteredAlready(String),
    #[error("ProviderNotFound, provider factory was not able to build provider {0}")]
    ProviderNotFound(String),
    #[error("LockResourceError, could not lock resource")]
    LockResourceError,
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Unknown type to register {0}")]
    ResourceTypeNotSupported(String),
}
