// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format collaborators: parsers and metadata extractors keyed by format.
//
// The engine never looks inside document bytes itself. It asks the parser set
// for a page count and plain text, and for a metadata record; each format
// plugs in its own implementation.

pub mod image;
pub mod pdf;

use std::collections::HashMap;
use std::sync::Arc;

use dokwerk_core::error::Result;
use dokwerk_core::{DocumentFormat, DocumentMetadata};
use sha2::{Digest, Sha256};
use tracing::debug;

pub use self::image::RasterFormat;
pub use self::pdf::PdfFormat;

/// Custom metadata key carrying the SHA-256 of the document bytes.
pub const SHA256_KEY: &str = "sha256";

/// Skeleton a parser derives from raw bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub page_count: Option<u32>,
    pub text: Option<String>,
}

/// Turns raw bytes into a [`ParsedDocument`].
pub trait FormatParser: Send + Sync {
    fn parse(&self, data: &[u8]) -> Result<ParsedDocument>;
}

/// Produces the metadata record for a document.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, data: &[u8], format: DocumentFormat) -> Result<DocumentMetadata>;
}

/// Hex-encoded SHA-256 of `data`.
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// The fields every extractor fills in regardless of format.
pub fn base_metadata(data: &[u8], format: DocumentFormat) -> DocumentMetadata {
    let mut meta = DocumentMetadata::sentinel(format, data.len() as u64);
    meta.set_custom(SHA256_KEY, fingerprint(data));
    meta
}

/// Collaborator for formats whose contents the engine treats as a blob
/// (the Office family): page count unknown, no text, base metadata only.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpaqueFormat;

impl FormatParser for OpaqueFormat {
    fn parse(&self, _data: &[u8]) -> Result<ParsedDocument> {
        Ok(ParsedDocument::default())
    }
}

impl MetadataExtractor for OpaqueFormat {
    fn extract(&self, data: &[u8], format: DocumentFormat) -> Result<DocumentMetadata> {
        Ok(base_metadata(data, format))
    }
}

/// Parsers and extractors registered per format.
#[derive(Clone, Default)]
pub struct ParserSet {
    parsers: HashMap<DocumentFormat, Arc<dyn FormatParser>>,
    extractors: HashMap<DocumentFormat, Arc<dyn MetadataExtractor>>,
}

impl ParserSet {
    /// A set with no collaborators; every format falls back to [`OpaqueFormat`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// PDF via lopdf, raster images via the image crate, Office as opaque.
    pub fn with_defaults() -> Self {
        let mut set = Self::empty();
        let pdf = Arc::new(PdfFormat);
        set.register(DocumentFormat::Pdf, pdf.clone(), pdf);
        let image = Arc::new(RasterFormat);
        for format in DocumentFormat::KNOWN.into_iter().filter(DocumentFormat::is_image) {
            set.register(format, image.clone(), image.clone());
        }
        let opaque = Arc::new(OpaqueFormat);
        for format in DocumentFormat::KNOWN.into_iter().filter(DocumentFormat::is_office) {
            set.register(format, opaque.clone(), opaque.clone());
        }
        set
    }

    /// Install (or replace) the collaborators for `format`.
    pub fn register(
        &mut self,
        format: DocumentFormat,
        parser: Arc<dyn FormatParser>,
        extractor: Arc<dyn MetadataExtractor>,
    ) {
        self.parsers.insert(format, parser);
        self.extractors.insert(format, extractor);
    }

    pub fn parse(&self, data: &[u8], format: DocumentFormat) -> Result<ParsedDocument> {
        match self.parsers.get(&format) {
            Some(parser) => parser.parse(data),
            None => {
                debug!(%format, "no parser registered, treating as opaque");
                OpaqueFormat.parse(data)
            }
        }
    }

    pub fn extract_metadata(&self, data: &[u8], format: DocumentFormat) -> Result<DocumentMetadata> {
        match self.extractors.get(&format) {
            Some(extractor) => extractor.extract(data, format),
            None => OpaqueFormat.extract(data, format),
        }
    }
}

impl std::fmt::Debug for ParserSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut formats: Vec<&str> = self.parsers.keys().map(|format| format.tag()).collect();
        formats.sort_unstable();
        f.debug_struct("ParserSet").field("formats", &formats).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dokwerk_core::DokwerkError;

    struct Failing;

    impl MetadataExtractor for Failing {
        fn extract(&self, _data: &[u8], _format: DocumentFormat) -> Result<DocumentMetadata> {
            Err(DokwerkError::Parse("corrupt".into()))
        }
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn office_formats_are_opaque() {
        let set = ParserSet::with_defaults();
        let parsed = set.parse(b"PK\x03\x04", DocumentFormat::Docx).expect("parse");
        assert_eq!(parsed, ParsedDocument::default());
        let meta = set
            .extract_metadata(b"PK\x03\x04", DocumentFormat::Docx)
            .expect("extract");
        assert_eq!(meta.page_count, 0);
        assert_eq!(meta.byte_size, 4);
        assert!(meta.custom.contains_key(SHA256_KEY));
    }

    #[test]
    fn registered_extractor_replaces_default() {
        let mut set = ParserSet::with_defaults();
        set.register(DocumentFormat::Png, Arc::new(OpaqueFormat), Arc::new(Failing));
        assert!(set.extract_metadata(b"", DocumentFormat::Png).is_err());
    }
}
