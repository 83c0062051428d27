// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// dokwerk-plugin: Capability plugin microkernel for Dokwerk.
//
// Defines the `Plugin` contract, the registry that owns every registered
// plugin and drives its lifecycle, and the sandbox that bounds each dispatch
// by a timeout and a memory budget while turning plugin faults into data.

pub mod builtin;
pub mod plugin;
pub mod registry;
pub mod sandbox;

pub use plugin::{ParamMap, Plugin, PluginInput, PluginOutput, PluginState, PluginSummary};
pub use registry::{InitReport, PluginRegistry};
