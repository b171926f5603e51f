// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration file name
pub const ENGINE_CONFIG_FILE_NAME: &str = "engine.ron";

/// Runaway-loop advisory settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopGuardConfig {
    /// Transform calls allowed per window before warning
    pub threshold: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Default for LoopGuardConfig {
    fn default() -> Self {
        Self {
            threshold: 1000,
            window_ms: 1000,
        }
    }
}

impl LoopGuardConfig {
    /// Window as a duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Runaway-loop advisory
    pub loop_guard: LoopGuardConfig,
    /// Action button label for bangable types without one
    pub default_action_label: String,
    /// Maximum composite nesting depth
    pub max_composite_depth: usize,
    /// Propagation steps one firing may take before it is cut off
    pub step_budget: usize,
    /// Seed for random nodes; `None` seeds from entropy
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            loop_guard: LoopGuardConfig::default(),
            default_action_label: "Action".to_string(),
            max_composite_depth: 32,
            step_budget: 100_000,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Parse from RON
    pub fn from_ron(s: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(s)
    }

    /// Serialize to RON
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save to a RON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = self
            .to_ron()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.loop_guard.threshold, 1000);
        assert_eq!(config.loop_guard.window(), Duration::from_secs(1));
        assert_eq!(config.default_action_label, "Action");
    }

    #[test]
    fn test_partial_ron() {
        let config = EngineConfig::from_ron("(loop_guard: (threshold: 5), rng_seed: Some(7))").unwrap();
        assert_eq!(config.loop_guard.threshold, 5);
        assert_eq!(config.loop_guard.window_ms, 1000);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.max_composite_depth, 32);
        assert_eq!(config.step_budget, 100_000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ENGINE_CONFIG_FILE_NAME);
        let config = EngineConfig {
            default_action_label: "Go".to_string(),
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }
}
