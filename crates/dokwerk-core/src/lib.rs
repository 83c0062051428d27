// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dokwerk: Core types, configuration and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod metadata;
pub mod types;

pub use config::{EngineConfig, PluginConfig};
pub use error::DokwerkError;
pub use metadata::DocumentMetadata;
pub use types::*;
