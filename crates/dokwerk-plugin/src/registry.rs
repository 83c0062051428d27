// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plugin registry: registration, lifecycle and capability dispatch.
//
// Entries live in registration order behind one `RwLock`. The lock is only
// ever held for bookkeeping: plugin code (`initialize`, `process`, `cleanup`)
// always runs on a cloned `Arc` after the guard is dropped, so a slow or
// misbehaving plugin never stalls lookups or other plugins.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dokwerk_core::error::{DokwerkError, Result};
use dokwerk_core::{Capability, PluginConfig};
use tracing::{debug, error, info, instrument, warn};

use crate::plugin::{Plugin, PluginInput, PluginOutput, PluginState, PluginSummary};
use crate::sandbox;

struct RegisteredPlugin {
    name: String,
    plugin: Arc<dyn Plugin>,
    capabilities: Vec<Capability>,
    state: PluginState,
    /// Bounds applied to dispatches; set by `initialize_all`.
    config: PluginConfig,
}

/// Outcome of [`PluginRegistry::initialize_all`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InitReport {
    /// Plugins now `Ready`, in registration order.
    pub ready: Vec<String>,
    /// Plugins that failed and are now `Disposed`, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Owns every registered plugin for the lifetime of the registry.
#[derive(Default)]
pub struct PluginRegistry {
    entries: RwLock<Vec<RegisteredPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Registration ---------------------------------------------------------

    /// Add a plugin in the `Initialized` state.
    #[instrument(skip_all, fields(plugin = %plugin.name()))]
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_owned();
        let version = plugin.version().to_owned();
        let capabilities = plugin.capabilities();

        let mut entries = self.write_entries();
        if entries.iter().any(|entry| entry.name == name) {
            return Err(DokwerkError::DuplicateName(name));
        }
        entries.push(RegisteredPlugin {
            name,
            plugin,
            capabilities,
            state: PluginState::Initialized,
            config: PluginConfig::default(),
        });
        info!(%version, "Plugin registered");
        Ok(())
    }

    /// Run the plugin's cleanup hook and remove it.
    ///
    /// The entry is marked `Disposed` first so no new dispatch selects it,
    /// cleanup runs outside the lock, and only then is the entry removed.
    /// Cleanup failures (including panics) are logged and do not block removal.
    #[instrument(skip(self))]
    pub fn unregister(&self, name: &str) -> Result<()> {
        let plugin = {
            let mut entries = self.write_entries();
            let entry = entries
                .iter_mut()
                .find(|entry| entry.name == name)
                .ok_or_else(|| DokwerkError::PluginNotFound(name.to_owned()))?;
            entry.state = PluginState::Disposed;
            Arc::clone(&entry.plugin)
        };

        match catch_unwind(AssertUnwindSafe(|| plugin.cleanup())) {
            Ok(Ok(())) => debug!("Plugin cleaned up"),
            Ok(Err(err)) => warn!(%err, "Plugin cleanup failed; removing anyway"),
            Err(_) => error!("Plugin cleanup panicked; removing anyway"),
        }

        self.write_entries()
            .retain(|entry| !(entry.name == name && Arc::ptr_eq(&entry.plugin, &plugin)));
        info!("Plugin unregistered");
        Ok(())
    }

    /// Unregister every plugin, most recently registered first.
    pub fn shutdown(&self) {
        let names: Vec<String> = self.read_entries().iter().rev().map(|e| e.name.clone()).collect();
        for name in names {
            if let Err(err) = self.unregister(&name) {
                debug!(%err, plugin = %name, "Plugin already gone during shutdown");
            }
        }
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Drive every `Initialized` plugin to `Ready`.
    ///
    /// `config_for` supplies each plugin's configuration by name. A plugin
    /// whose `initialize` fails or panics is marked `Disposed`; the others
    /// carry on regardless.
    #[instrument(skip_all)]
    pub fn initialize_all(&self, config_for: impl Fn(&str) -> PluginConfig) -> InitReport {
        let pending: Vec<(String, Arc<dyn Plugin>)> = self
            .read_entries()
            .iter()
            .filter(|entry| entry.state == PluginState::Initialized)
            .map(|entry| (entry.name.clone(), Arc::clone(&entry.plugin)))
            .collect();

        let mut report = InitReport::default();
        for (name, plugin) in pending {
            let config = config_for(&name);
            let outcome = match catch_unwind(AssertUnwindSafe(|| plugin.initialize(&config))) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err.to_string()),
                Err(_) => Err("initialize panicked".to_owned()),
            };

            let mut entries = self.write_entries();
            // Skip entries unregistered (or replaced) while we were initialising.
            let Some(entry) = entries.iter_mut().find(|entry| {
                entry.name == name
                    && Arc::ptr_eq(&entry.plugin, &plugin)
                    && entry.state == PluginState::Initialized
            }) else {
                continue;
            };
            match outcome {
                Ok(()) => {
                    entry.state = PluginState::Ready;
                    entry.config = config;
                    info!(plugin = %name, "Plugin ready");
                    report.ready.push(name);
                }
                Err(reason) => {
                    entry.state = PluginState::Disposed;
                    error!(plugin = %name, %reason, "Plugin failed to initialise");
                    report.failed.push((name, reason));
                }
            }
        }
        report
    }

    // -- Lookup ---------------------------------------------------------------

    /// Plugins declaring `capability`, in registration order. Disposed
    /// plugins are excluded.
    pub fn find_by_capability(&self, capability: &Capability) -> Vec<Arc<dyn Plugin>> {
        self.read_entries()
            .iter()
            .filter(|entry| entry.state != PluginState::Disposed)
            .filter(|entry| entry.capabilities.contains(capability))
            .map(|entry| Arc::clone(&entry.plugin))
            .collect()
    }

    /// Whether any `Ready` plugin provides `capability`.
    pub fn supports(&self, capability: &Capability) -> bool {
        self.first_ready(capability).is_some()
    }

    /// Lifecycle state of `name`; `Unregistered` when no such plugin is held.
    pub fn state(&self, name: &str) -> PluginState {
        self.read_entries()
            .iter()
            .find(|entry| entry.name == name)
            .map_or(PluginState::Unregistered, |entry| entry.state)
    }

    pub fn summaries(&self) -> Vec<PluginSummary> {
        self.read_entries()
            .iter()
            .map(|entry| PluginSummary {
                name: entry.name.clone(),
                version: entry.plugin.version().to_owned(),
                description: entry.plugin.description().to_owned(),
                author: entry.plugin.author().to_owned(),
                capabilities: entry.capabilities.iter().map(Capability::tag).collect(),
                state: entry.state,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- Dispatch -------------------------------------------------------------

    /// Route `input` to the first `Ready` plugin declaring `capability`.
    ///
    /// Fails only with `NoCapablePlugin`; everything the plugin does wrong is
    /// reported inside the returned output.
    #[instrument(skip_all, fields(capability = %capability))]
    pub async fn dispatch(&self, capability: &Capability, input: PluginInput) -> Result<PluginOutput> {
        let (name, plugin, config) = self
            .first_ready(capability)
            .ok_or_else(|| DokwerkError::NoCapablePlugin(capability.tag()))?;
        debug!(plugin = %name, "Dispatching");
        Ok(sandbox::run(plugin, input, &config).await)
    }

    /// Send `input` to the named plugin, which must be `Ready`.
    #[instrument(skip(self, input))]
    pub async fn process(&self, name: &str, input: PluginInput) -> Result<PluginOutput> {
        let (plugin, config) = {
            let entries = self.read_entries();
            let entry = entries
                .iter()
                .find(|entry| entry.name == name)
                .ok_or_else(|| DokwerkError::PluginNotFound(name.to_owned()))?;
            if entry.state != PluginState::Ready {
                return Err(DokwerkError::PluginNotReady {
                    name: name.to_owned(),
                    state: entry.state.to_string(),
                });
            }
            (Arc::clone(&entry.plugin), entry.config.clone())
        };
        Ok(sandbox::run(plugin, input, &config).await)
    }

    // -- Helpers --------------------------------------------------------------

    fn first_ready(&self, capability: &Capability) -> Option<(String, Arc<dyn Plugin>, PluginConfig)> {
        self.read_entries()
            .iter()
            .find(|entry| entry.state == PluginState::Ready && entry.capabilities.contains(capability))
            .map(|entry| (entry.name.clone(), Arc::clone(&entry.plugin), entry.config.clone()))
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<RegisteredPlugin>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("plugin registry lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<RegisteredPlugin>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("plugin registry lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.read_entries().iter().map(|e| e.name.clone()).collect();
        f.debug_struct("PluginRegistry").field("plugins", &names).finish()
    }
}
