use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::v1::datastore::{DatastoreError, Storage};

pub const DEFAULT_STORE_FILE: &str = "tircloud.store";

/// Bincode snapshot of the datastore on local disk.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_FILE)
    }
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileStorage { path: path.into() }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<HashMap<String, Vec<u8>>, DatastoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let file = File::open(&self.path)?;
        Ok(bincode::deserialize_from(BufReader::new(file))?)
    }
    fn save(&self, data: &HashMap<String, Vec<u8>>) -> Result<(), DatastoreError> {
        let file = File::create(&self.path)?;
        bincode::serialize_into(BufWriter::new(file), data)?;
        Ok(())
    }
}
