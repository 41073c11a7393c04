use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::v1::datastore::{DatastoreError, Storage};

/// Storage kept in process memory. Clones share the same snapshot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn snapshot(&self) -> HashMap<String, Vec<u8>> {
        self.data
            .lock()
            .map(|data| data.clone())
            .unwrap_or_default()
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<HashMap<String, Vec<u8>>, DatastoreError> {
        self.data
            .lock()
            .map(|data| data.clone())
            .map_err(|err| DatastoreError::LoadError(err.to_string()))
    }
    fn save(&self, data: &HashMap<String, Vec<u8>>) -> Result<(), DatastoreError> {
        let mut stored = self
            .data
            .lock()
            .map_err(|err| DatastoreError::LoadError(err.to_string()))?;
        *stored = data.clone();
        Ok(())
    }
}
