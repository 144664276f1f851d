use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::MappingTable;
use crate::server::error::MappingError;

pub type DynMappingSource = Arc<dyn MappingSource + Send + Sync>;

/// where the mapping table comes from, read once at startup and again on every reload
pub trait MappingSource {
    fn load(&self) -> Result<MappingTable, MappingError>;

    /// human readable origin for logs
    fn describe(&self) -> String;
}

/// json file on disk, the only source used in production
pub struct FileMappingSource {
    path: PathBuf,
}

impl FileMappingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MappingSource for FileMappingSource {
    fn load(&self) -> Result<MappingTable, MappingError> {
        let data = std::fs::read_to_string(&self.path).map_err(|source| MappingError::Read {
            path: self.path.clone(),
            source,
        })?;

        debug!("read {} bytes of mappings from {}", data.len(), self.describe());

        Ok(serde_json::from_str(&data)?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
