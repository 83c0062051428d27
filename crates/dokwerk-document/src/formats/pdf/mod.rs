// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: reading, creating and rewriting PDFs.

pub mod reader;
pub mod writer;

use dokwerk_core::error::Result;
use dokwerk_core::{DocumentFormat, DocumentMetadata};

pub use reader::PdfReader;
pub use writer::PdfWriter;

use super::{FormatParser, MetadataExtractor, ParsedDocument};

/// PDF collaborator backed by lopdf.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfFormat;

impl FormatParser for PdfFormat {
    fn parse(&self, data: &[u8]) -> Result<ParsedDocument> {
        let reader = PdfReader::from_bytes(data)?;
        Ok(ParsedDocument {
            page_count: Some(reader.page_count()),
            text: reader.text(),
        })
    }
}

impl MetadataExtractor for PdfFormat {
    fn extract(&self, data: &[u8], _format: DocumentFormat) -> Result<DocumentMetadata> {
        Ok(PdfReader::from_bytes(data)?.metadata(data))
    }
}
