// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Dokwerk.

use thiserror::Error;

/// Top-level error type for all Dokwerk operations.
///
/// Plugin processing failures normally travel as data inside a
/// `PluginOutput` with `success = false`; the `PluginProcessing` variant only
/// appears when a convenience operation needs the plugin's result to continue.
#[derive(Debug, Error)]
pub enum DokwerkError {
    // -- Handle / document errors --
    #[error("no document is registered under handle {0}")]
    HandleNotFound(u64),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("page {page} is out of range (document has {page_count} pages)")]
    InvalidPage { page: u32, page_count: u32 },

    #[error("invalid annotation rectangle: {0}")]
    InvalidRect(String),

    #[error("document parsing failed: {0}")]
    Parse(String),

    #[error("document {0} changed while a rewrite was in flight")]
    ConcurrentModification(u64),

    // -- Plugin errors --
    #[error("plugin {name} is not ready (state: {state})")]
    PluginNotReady { name: String, state: String },

    #[error("no ready plugin provides capability {0}")]
    NoCapablePlugin(String),

    #[error("a plugin named {0} is already registered")]
    DuplicateName(String),

    #[error("no plugin named {0} is registered")]
    PluginNotFound(String),

    #[error("plugin processing failed: {0}")]
    PluginProcessing(String),

    // -- Boundary --
    #[error("marshaling failed: {0}")]
    Marshaling(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DokwerkError {
    /// Whether the error is one of the conditions a host is expected to hit
    /// during normal cross-boundary races (stale or double-disposed handles).
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, Self::HandleNotFound(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DokwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_handles_count_as_stale() {
        assert!(DokwerkError::HandleNotFound(3).is_stale_handle());
        assert!(!DokwerkError::ConcurrentModification(3).is_stale_handle());
        assert!(!DokwerkError::Parse("truncated".into()).is_stale_handle());
    }
}
