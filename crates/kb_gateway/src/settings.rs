//! Embedder-facing configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for one relay instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Applications whose identity bindings are provisioned on open.
    #[serde(default)]
    pub applications: Vec<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("keybridge.db"),
            applications: vec![],
        }
    }
}
