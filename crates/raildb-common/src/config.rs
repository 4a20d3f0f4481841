//! Configuration structures for RailDB.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the database engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after page writes. Off by default: commands are
    /// serialized and durability is only promised on clean exit.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: false,
        }
    }
}

impl StorageConfig {
    /// Creates a configuration rooted at `data_dir` with defaults
    /// elsewhere.
    pub fn with_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }
}
