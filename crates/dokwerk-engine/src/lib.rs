// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// dokwerk-engine: The engine facade.
//
// Composes the document handle table, the format collaborators and the plugin
// registry into the operations every host adapter calls: open, annotate,
// dispatch, save and dispose.

pub mod engine;

pub use engine::Engine;
