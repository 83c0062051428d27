// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// dokwerk-document: Document lifetime and format collaborators for Dokwerk.
//
// Provides the in-memory document model and its state machine, the opaque
// handle table that owns every live document, and the format collaborators
// (PDF via lopdf, raster images via the image crate) that turn raw bytes into
// page counts, text and metadata.

pub mod formats;
pub mod handles;
pub mod model;

// Re-export the primary types so callers can use `dokwerk_document::HandleTable` etc.
pub use formats::{FormatParser, MetadataExtractor, ParsedDocument, ParserSet};
pub use handles::HandleTable;
pub use model::{DocumentModel, DocumentState};
