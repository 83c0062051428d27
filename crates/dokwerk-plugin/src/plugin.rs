// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The plugin contract and the values that cross it.

use std::collections::HashMap;

use dokwerk_core::error::Result;
use dokwerk_core::{Capability, PluginConfig};
use serde::{Deserialize, Serialize};

/// Loosely typed key/value map carried by plugin inputs and outputs.
pub type ParamMap = HashMap<String, serde_json::Value>;

/// A capability provider.
///
/// Every method takes `&self`: the registry shares one instance between all
/// concurrent dispatches, so implementations keep mutable state behind their
/// own locks. `process` runs on a blocking worker thread and may be abandoned
/// on timeout, so it must never leave shared state half-written.
pub trait Plugin: Send + Sync {
    /// Unique key in the registry.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn author(&self) -> &str {
        ""
    }

    /// Capabilities this plugin declares. Read once at registration.
    fn capabilities(&self) -> Vec<Capability>;

    fn initialize(&self, config: &PluginConfig) -> Result<()>;

    fn process(&self, input: &PluginInput) -> Result<PluginOutput>;

    fn cleanup(&self) -> Result<()>;
}

/// Lifecycle of a registered plugin.
///
/// `Unregistered -> Initialized -> Ready -> Disposed`, or
/// `Initialized -> Disposed` when `initialize` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Unregistered,
    Initialized,
    Ready,
    Disposed,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Unregistered => "unregistered",
            Self::Initialized => "initialized",
            Self::Ready => "ready",
            Self::Disposed => "disposed",
        };
        f.write_str(label)
    }
}

/// Request handed to `Plugin::process`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginInput {
    pub data: Vec<u8>,
    /// MIME type of `data`.
    pub format: String,
    pub metadata: ParamMap,
    pub parameters: ParamMap,
}

impl PluginInput {
    pub fn new(data: Vec<u8>, format: impl Into<String>) -> Self {
        Self {
            data,
            format: format.into(),
            ..Self::default()
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn parameter_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Bytes counted against a plugin's memory budget.
    pub fn payload_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Result of `Plugin::process`.
///
/// `success = false` is an ordinary data result carrying `error`; it never
/// aborts the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOutput {
    pub data: Vec<u8>,
    /// MIME type of `data`.
    pub format: String,
    pub metadata: ParamMap,
    pub success: bool,
    pub error: Option<String>,
}

impl PluginOutput {
    pub fn success(data: Vec<u8>, format: impl Into<String>) -> Self {
        Self {
            data,
            format: format.into(),
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn payload_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Listing entry for a registered plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub capabilities: Vec<String>,
    pub state: PluginState,
}
