// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dokwerk host boundary.
//
// `marshal` converts between flat boundary values (pointers, lengths, JSON
// text) and engine types. `status` holds the status codes and the per-thread
// last-error slot. `ffi` is the `extern "C"` surface built on both.
//
// Ownership rule for every function in `ffi`: pointers passed in are borrowed
// for the duration of the call and never freed here; strings and buffers
// returned are allocated by the library and must be released with
// `dokwerk_string_free` / `dokwerk_plugin_result_free`.

pub mod ffi;
pub mod marshal;
pub mod status;

pub use status::DokwerkStatus;
