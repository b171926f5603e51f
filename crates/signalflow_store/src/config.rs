// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store configuration file name
pub const STORE_CONFIG_FILE_NAME: &str = "store.ron";

/// Where and how records are persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for the durable backend. `None` keeps records in memory.
    pub root: Option<PathBuf>,
    /// Pretty-print stored JSON
    pub pretty: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: None,
            pretty: true,
        }
    }
}

impl StoreConfig {
    /// Config for an on-disk store rooted at `root`
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Parse from RON
    pub fn from_ron(s: &str) -> Result<Self> {
        Ok(ron::from_str(s)?)
    }

    /// Serialize to RON
    pub fn to_ron(&self) -> std::result::Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }

    /// Save to a RON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let ron_str = self
            .to_ron()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, ron_str)
    }
}
