// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Boundary status codes and the per-thread last-error slot.

use std::cell::RefCell;

use dokwerk_core::DokwerkError;
use dokwerk_core::human_errors::describe_error;

/// Status codes shared with host adapters. Values are stable.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DokwerkStatus {
    Ok = 0,
    HandleNotFound = 1,
    UnsupportedFormat = 2,
    /// Page out of range, or a rectangle with negative width/height.
    InvalidPage = 3,
    PluginNotReady = 4,
    NoCapablePlugin = 5,
    DuplicateName = 6,
    /// Null pointer, bad UTF-8, malformed JSON or an unknown tag.
    MarshalingError = 7,
    PluginProcessingFailure = 8,
    IoFailure = 9,
    /// Panic or unexpected condition inside the library.
    InternalError = 10,
    /// The document was edited while a content rewrite was in flight.
    ConcurrentModification = 11,
}

impl DokwerkStatus {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// Boundary status for an engine error.
pub fn status_for(err: &DokwerkError) -> DokwerkStatus {
    match err {
        DokwerkError::HandleNotFound(_) => DokwerkStatus::HandleNotFound,
        DokwerkError::UnsupportedFormat(_) => DokwerkStatus::UnsupportedFormat,
        DokwerkError::InvalidPage { .. } | DokwerkError::InvalidRect(_) => DokwerkStatus::InvalidPage,
        DokwerkError::PluginNotReady { .. } => DokwerkStatus::PluginNotReady,
        DokwerkError::NoCapablePlugin(_) => DokwerkStatus::NoCapablePlugin,
        DokwerkError::DuplicateName(_) => DokwerkStatus::DuplicateName,
        DokwerkError::Marshaling(_)
        | DokwerkError::Serialization(_)
        | DokwerkError::Config(_) => DokwerkStatus::MarshalingError,
        DokwerkError::PluginProcessing(_) | DokwerkError::PluginNotFound(_) => {
            DokwerkStatus::PluginProcessingFailure
        }
        DokwerkError::Io(_) => DokwerkStatus::IoFailure,
        DokwerkError::Parse(_) => DokwerkStatus::UnsupportedFormat,
        DokwerkError::ConcurrentModification(_) => DokwerkStatus::ConcurrentModification,
    }
}

// -- Last error -----------------------------------------------------------------

#[derive(Debug, Clone)]
struct LastError {
    status: DokwerkStatus,
    message: String,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<LastError>> = const { RefCell::new(None) };
}

/// Record `err` as this thread's last error, with the host-facing message.
pub fn record_error(err: &DokwerkError) {
    let host = describe_error(err);
    let message = if host.suggestion.is_empty() {
        format!("{}: {}", host.code, host.message)
    } else {
        format!("{}: {} ({})", host.code, host.message, host.suggestion)
    };
    set_error(status_for(err), message);
}

pub fn set_error(status: DokwerkStatus, message: impl Into<String>) {
    let entry = LastError {
        status,
        message: message.into(),
    };
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(entry));
}

pub fn clear_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Status of the last failed call on this thread; `Ok` after a success.
pub fn last_status() -> DokwerkStatus {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|e| e.status)
            .unwrap_or(DokwerkStatus::Ok)
    })
}

pub fn last_message() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map(|e| e.message.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_rect_reports_invalid_page() {
        assert_eq!(
            status_for(&DokwerkError::InvalidRect("width -1".into())),
            DokwerkStatus::InvalidPage
        );
        assert_eq!(
            status_for(&DokwerkError::InvalidPage { page: 9, page_count: 3 }),
            DokwerkStatus::InvalidPage
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(DokwerkStatus::Ok as i32, 0);
        assert_eq!(DokwerkStatus::MarshalingError as i32, 7);
        assert_eq!(DokwerkStatus::InternalError as i32, 10);
        assert_eq!(DokwerkStatus::ConcurrentModification as i32, 11);
    }

    #[test]
    fn last_error_is_per_thread() {
        record_error(&DokwerkError::HandleNotFound(5));
        assert_eq!(last_status(), DokwerkStatus::HandleNotFound);
        assert!(last_message().expect("message").starts_with("handle_not_found"));

        let other = std::thread::spawn(last_status).join().expect("join");
        assert_eq!(other, DokwerkStatus::Ok);

        clear_error();
        assert_eq!(last_status(), DokwerkStatus::Ok);
        assert!(last_message().is_none());
    }
}
