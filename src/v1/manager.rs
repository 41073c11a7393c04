use thiserror::Error;

use super::tir::transport::ApiError;

/// Lifecycle callbacks for one resource type.
///
/// `Config` is what the user declared, `State` what the API reported back.
/// Previously applied config and state come from the datastore.
pub trait ResourceManager<Config, State>: Send + Sync {
    fn create(&self, config: &Config) -> Result<State, ManagerError>;
    /// `Ok(None)` means the resource is gone and its identity must be cleared.
    fn read(&self, config: &Config, latest: &State) -> Result<Option<State>, ManagerError>;
    fn update(
        &self,
        previous: &Config,
        config: &Config,
        latest: &State,
    ) -> Result<State, ManagerError>;
    /// Returns `false` when the resource was already gone.
    fn delete(&self, config: &Config, latest: &State) -> Result<bool, ManagerError>;

    fn ensure_absent(&self, config: &Config, latest: &State) -> Result<bool, ManagerError> {
        self.delete(config, latest)
    }
    fn ensure_present(
        &self,
        previous: Option<(&Config, &State)>,
        config: &Config,
    ) -> Result<State, ManagerError>
    where
        Config: PartialEq,
    {
        let Some((applied, latest)) = previous else {
            return self.create(config);
        };
        match self.read(applied, latest)? {
            None => self.create(config),
            Some(current) if applied == config => Ok(current),
            Some(current) => self.update(applied, config, &current),
        }
    }
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("DeleteFail: {0}")]
    DeleteFail(#[source] ApiError),
    #[error("CreateFail: {0}")]
    CreateFail(#[source] ApiError),
    #[error("UpdateFail: {0}")]
    UpdateFail(#[source] ApiError),
    #[error("LookupFail: {0}")]
    LookupFail(#[source] ApiError),
    #[error("InvalidConfig: {0}")]
    InvalidConfig(String),
    #[error("CannotSyncWithoutRecreate: {0}")]
    CannotSyncWithoutRecreate(String),
}
