// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host-facing error descriptions.
//
// Every engine error is mapped to a stable machine code plus a plain English
// message and suggestion, so each host adapter (UI binding, web binding,
// service endpoint) renders the same failure the same way without looking at
// engine internals. Hosts localise by keying their own strings off `code`.

use serde::Serialize;

use crate::error::DokwerkError;

/// Severity of an error from the host's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected during normal use (stale handle, plugin timeout); retry or ignore.
    Transient,
    /// The caller passed something wrong and must change the request.
    InvalidRequest,
    /// Missing capability or unsupported input; retrying will not help.
    Permanent,
}

/// A host-renderable description of an engine error.
#[derive(Debug, Clone, Serialize)]
pub struct HostError {
    /// Stable machine-readable code, e.g. `"handle_not_found"`.
    pub code: &'static str,
    /// Plain English summary.
    pub message: String,
    /// What the user or integrator should try next.
    pub suggestion: String,
    /// Whether repeating the same call may succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `DokwerkError` into a `HostError`.
pub fn describe_error(err: &DokwerkError) -> HostError {
    match err {
        // -- Handle / document errors --
        DokwerkError::HandleNotFound(handle) => HostError {
            code: "handle_not_found",
            message: "This document is no longer open.".into(),
            suggestion: format!(
                "Open the document again. (Handle {handle} was closed or never existed.)"
            ),
            retriable: false,
            severity: Severity::Transient,
        },

        DokwerkError::UnsupportedFormat(detail) => HostError {
            code: "unsupported_format",
            message: "This type of document isn't supported.".into(),
            suggestion: format!(
                "Supported types are PDF, DOCX, XLSX, PPTX, JPEG, PNG and TIFF. (Got: {detail})"
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        DokwerkError::InvalidPage { page, page_count } => HostError {
            code: "invalid_page",
            message: "That page doesn't exist in this document.".into(),
            suggestion: format!("Choose a page between 1 and {page_count}. (Requested: {page})"),
            retriable: false,
            severity: Severity::InvalidRequest,
        },

        DokwerkError::InvalidRect(detail) => HostError {
            code: "invalid_page",
            message: "The annotation area isn't valid.".into(),
            suggestion: format!("Use a non-negative width and height. ({detail})"),
            retriable: false,
            severity: Severity::InvalidRequest,
        },

        DokwerkError::Parse(detail) => HostError {
            code: "parse_failure",
            message: "There's a problem with this document's contents.".into(),
            suggestion: format!("The file may be damaged or truncated. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        DokwerkError::ConcurrentModification(handle) => HostError {
            code: "concurrent_modification",
            message: "The document changed while it was being processed.".into(),
            suggestion: format!(
                "Run the operation again on the current document. (Handle {handle} was edited meanwhile.)"
            ),
            retriable: true,
            severity: Severity::Transient,
        },

        // -- Plugin errors --
        DokwerkError::PluginNotReady { name, state } => HostError {
            code: "plugin_not_ready",
            message: "A processing plugin isn't ready yet.".into(),
            suggestion: format!("Initialise plugin '{name}' before using it (state: {state})."),
            retriable: true,
            severity: Severity::Transient,
        },

        DokwerkError::NoCapablePlugin(capability) => HostError {
            code: "no_capable_plugin",
            message: "No installed plugin can do that.".into(),
            suggestion: format!("Install and initialise a plugin that provides '{capability}'."),
            retriable: false,
            severity: Severity::Permanent,
        },

        DokwerkError::DuplicateName(name) => HostError {
            code: "duplicate_name",
            message: "A plugin with that name is already installed.".into(),
            suggestion: format!("Unregister '{name}' first, or give the new plugin another name."),
            retriable: false,
            severity: Severity::InvalidRequest,
        },

        DokwerkError::PluginNotFound(name) => HostError {
            code: "plugin_not_found",
            message: "That plugin isn't installed.".into(),
            suggestion: format!("Check the plugin name '{name}'."),
            retriable: false,
            severity: Severity::InvalidRequest,
        },

        DokwerkError::PluginProcessing(detail) => humanize_plugin_failure(detail),

        // -- Boundary --
        DokwerkError::Marshaling(detail) => HostError {
            code: "marshaling_error",
            message: "The request couldn't be read.".into(),
            suggestion: format!("Check the values passed across the binding. ({detail})"),
            retriable: false,
            severity: Severity::InvalidRequest,
        },

        DokwerkError::Config(detail) => HostError {
            code: "invalid_config",
            message: "The engine configuration isn't valid.".into(),
            suggestion: detail.clone(),
            retriable: false,
            severity: Severity::InvalidRequest,
        },

        DokwerkError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HostError {
                    code: "io_failure",
                    message: "The destination folder couldn't be found.".into(),
                    suggestion: "Choose an existing folder and try again.".into(),
                    retriable: false,
                    severity: Severity::InvalidRequest,
                }
            } else if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HostError {
                    code: "io_failure",
                    message: "There's no permission to write there.".into(),
                    suggestion: "Pick a different location, or check the folder permissions."
                        .into(),
                    retriable: false,
                    severity: Severity::InvalidRequest,
                }
            } else {
                HostError {
                    code: "io_failure",
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, the disk may be full."
                        .into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        DokwerkError::Serialization(_) => HostError {
            code: "marshaling_error",
            message: "The engine had an internal data problem.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

/// Parse plugin failure details into host messages.
fn humanize_plugin_failure(detail: &str) -> HostError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("timed out") {
        HostError {
            code: "plugin_processing_failure",
            message: "Processing took too long and was stopped.".into(),
            suggestion: "Try a smaller document, or raise the plugin's timeout.".into(),
            retriable: true,
            severity: Severity::Transient,
        }
    } else if lower.contains("memory budget") {
        HostError {
            code: "plugin_processing_failure",
            message: "This document is too large for the plugin.".into(),
            suggestion: "Raise the plugin's memory budget or split the document.".into(),
            retriable: false,
            severity: Severity::Permanent,
        }
    } else if lower.contains("panicked") {
        HostError {
            code: "plugin_processing_failure",
            message: "A plugin crashed while processing.".into(),
            suggestion: "The document is unchanged. Report the problem to the plugin author."
                .into(),
            retriable: false,
            severity: Severity::Permanent,
        }
    } else {
        HostError {
            code: "plugin_processing_failure",
            message: "The plugin couldn't process this document.".into(),
            suggestion: format!("Detail: {detail}"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_is_transient() {
        let host = describe_error(&DokwerkError::HandleNotFound(7));
        assert_eq!(host.code, "handle_not_found");
        assert_eq!(host.severity, Severity::Transient);
        assert!(host.suggestion.contains('7'));
    }

    #[test]
    fn bad_rect_shares_the_invalid_page_code() {
        let host = describe_error(&DokwerkError::InvalidRect("width -1".into()));
        assert_eq!(host.code, "invalid_page");
        assert_eq!(host.severity, Severity::InvalidRequest);
    }

    #[test]
    fn plugin_timeout_is_retriable() {
        let host = describe_error(&DokwerkError::PluginProcessing(
            "plugin stamp timed out after 250ms".into(),
        ));
        assert!(host.retriable);
        assert_eq!(host.code, "plugin_processing_failure");
    }

    #[test]
    fn plugin_panic_is_permanent() {
        let host = describe_error(&DokwerkError::PluginProcessing("plugin x panicked".into()));
        assert_eq!(host.severity, Severity::Permanent);
        assert!(!host.retriable);
    }

    #[test]
    fn missing_capability_is_permanent() {
        let host = describe_error(&DokwerkError::NoCapablePlugin("ocr".into()));
        assert_eq!(host.severity, Severity::Permanent);
    }
}
