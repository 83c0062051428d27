// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine and plugin configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DokwerkError, Result};

/// Per-plugin settings handed to `Plugin::initialize` and used to bound
/// every dispatch to that plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Free-form plugin settings.
    pub settings: HashMap<String, serde_json::Value>,
    /// Scratch directory the plugin may use.
    pub temp_dir: PathBuf,
    /// Upper bound for the payload a plugin receives or returns, in MiB.
    pub max_memory_mb: u64,
    /// Wall-clock budget for one `process` call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            settings: HashMap::new(),
            temp_dir: std::env::temp_dir(),
            max_memory_mb: 512,
            timeout_ms: 30_000,
        }
    }
}

impl PluginConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn memory_budget_bytes(&self) -> u64 {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_memory_mb(mut self, max_memory_mb: u64) -> Self {
        self.max_memory_mb = max_memory_mb;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Applied to plugins that have no entry in `plugins`.
    pub default_plugin: PluginConfig,
    /// Per-plugin configuration keyed by plugin name.
    pub plugins: HashMap<String, PluginConfig>,
    /// Run metadata extraction as part of `open`.
    pub extract_metadata_on_open: bool,
    /// Author recorded on annotations created through the engine.
    pub default_author: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_plugin: PluginConfig::default(),
            plugins: HashMap::new(),
            extract_metadata_on_open: true,
            default_author: None,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&data)
    }

    /// Configuration for the named plugin, falling back to the default.
    pub fn plugin_config(&self, name: &str) -> PluginConfig {
        self.plugins
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_plugin.clone())
    }

    fn validate(&self) -> Result<()> {
        let all = std::iter::once(("<default>", &self.default_plugin))
            .chain(self.plugins.iter().map(|(name, cfg)| (name.as_str(), cfg)));
        for (name, cfg) in all {
            if cfg.timeout_ms == 0 {
                return Err(DokwerkError::Config(format!(
                    "plugin {name}: timeout_ms must be greater than zero"
                )));
            }
            if cfg.max_memory_mb == 0 {
                return Err(DokwerkError::Config(format!(
                    "plugin {name}: max_memory_mb must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}
