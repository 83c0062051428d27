// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Dokwerk document engine.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DokwerkError, Result};

/// Opaque reference to a document owned by a handle table.
///
/// Handle `0` never names a document; it is the failure sentinel at the
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentHandle(pub u64);

impl DocumentHandle {
    /// The "no document" sentinel.
    pub const NONE: Self = Self(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document formats the engine accepts at `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    Jpeg,
    Png,
    Tiff,
    /// Anything else. Rejected by `open`.
    Unknown,
}

impl DocumentFormat {
    /// Every format the engine can open.
    pub const KNOWN: [Self; 7] = [
        Self::Pdf,
        Self::Docx,
        Self::Xlsx,
        Self::Pptx,
        Self::Jpeg,
        Self::Png,
        Self::Tiff,
    ];

    /// MIME type string for the format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Tiff => "image/tiff",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Short lowercase tag used at the boundary (`"pdf"`, `"png"`, ...).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Pptx => "pptx",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Tiff => "tiff",
            Self::Unknown => "unknown",
        }
    }

    /// Infer the format from a file extension or boundary tag.
    ///
    /// Never fails; unrecognised input maps to [`DocumentFormat::Unknown`].
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "xlsx" => Self::Xlsx,
            "pptx" => Self::Pptx,
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "tif" | "tiff" => Self::Tiff,
            _ => Self::Unknown,
        }
    }

    /// Infer the format from a MIME type string.
    pub fn from_mime(mime: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|format| format.mime_type().eq_ignore_ascii_case(mime.trim()))
            .unwrap_or(Self::Unknown)
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Tiff)
    }

    pub fn is_office(&self) -> bool {
        matches!(self, Self::Docx | Self::Xlsx | Self::Pptx)
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Kinds of annotation a document can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    Text,
    Highlight,
    Underline,
    Strikethrough,
    Note,
    Drawing,
    Stamp,
    Link,
}

impl AnnotationType {
    /// All variants in boundary-code order.
    pub const ALL: [Self; 8] = [
        Self::Text,
        Self::Highlight,
        Self::Underline,
        Self::Strikethrough,
        Self::Note,
        Self::Drawing,
        Self::Stamp,
        Self::Link,
    ];

    /// Integer code used by the C boundary (0 = text ... 7 = link).
    pub fn code(&self) -> i32 {
        match self {
            Self::Text => 0,
            Self::Highlight => 1,
            Self::Underline => 2,
            Self::Strikethrough => 3,
            Self::Note => 4,
            Self::Drawing => 5,
            Self::Stamp => 6,
            Self::Link => 7,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

/// Position of an annotation on its page, in page units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Reject negative or non-finite extents.
    pub fn validate(&self) -> Result<()> {
        let all_finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(DokwerkError::InvalidRect(format!(
                "coordinates must be finite (got {self:?})"
            )));
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(DokwerkError::InvalidRect(format!(
                "width and height must be >= 0 (got {} x {})",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Logical clock feeding annotation ids; never goes backwards within a process.
static ANNOTATION_CLOCK: AtomicU64 = AtomicU64::new(1);

/// Process-unique annotation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub String);

impl AnnotationId {
    /// Mint a fresh id of the form `ann-<seq>-<uuid8>`.
    pub fn mint() -> Self {
        let seq = ANNOTATION_CLOCK.fetch_add(1, Ordering::Relaxed);
        let salt = Uuid::new_v4().simple().to_string();
        Self(format!("ann-{seq:010}-{}", &salt[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnnotationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A single annotation attached to a document page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    /// 1-based page number.
    pub page: u32,
    #[serde(flatten)]
    pub rect: Rect,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: AnnotationType,
    pub author: Option<String>,
    /// RFC 3339 timestamp, immutable after creation.
    pub created_at: String,
    /// Reserved for an explicit edit operation; annotate/remove never set it.
    pub modified_at: Option<String>,
}

impl Annotation {
    pub fn new(
        page: u32,
        rect: Rect,
        content: impl Into<String>,
        kind: AnnotationType,
        author: Option<String>,
    ) -> Self {
        Self {
            id: AnnotationId::mint(),
            page,
            rect,
            content: content.into(),
            kind,
            author,
            created_at: chrono::Utc::now().to_rfc3339(),
            modified_at: None,
        }
    }
}

/// Units of processing functionality a plugin can declare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Ocr,
    DigitalSignature,
    Watermark,
    FileConversion,
    AiSummarization,
    AiTagging,
    SemanticSearch,
    Compression,
    Encryption,
    Custom(String),
}

impl Capability {
    /// Boundary tag (`"ocr"`, `"watermark"`, `"custom:<tag>"`, ...).
    pub fn tag(&self) -> String {
        match self {
            Self::Ocr => "ocr".into(),
            Self::DigitalSignature => "digital_signature".into(),
            Self::Watermark => "watermark".into(),
            Self::FileConversion => "file_conversion".into(),
            Self::AiSummarization => "ai_summarization".into(),
            Self::AiTagging => "ai_tagging".into(),
            Self::SemanticSearch => "semantic_search".into(),
            Self::Compression => "compression".into(),
            Self::Encryption => "encryption".into(),
            Self::Custom(tag) => format!("custom:{tag}"),
        }
    }

    /// Parse a boundary tag. Case-insensitive for the closed set; the text
    /// after `custom:` is kept verbatim.
    pub fn from_tag(tag: &str) -> Result<Self> {
        let trimmed = tag.trim();
        if let Some(custom) = trimmed.strip_prefix("custom:") {
            if custom.is_empty() {
                return Err(DokwerkError::Marshaling(
                    "custom capability requires a non-empty tag".into(),
                ));
            }
            return Ok(Self::Custom(custom.to_owned()));
        }
        match trimmed.to_ascii_lowercase().replace('-', "_").as_str() {
            "ocr" => Ok(Self::Ocr),
            "digital_signature" | "signature" => Ok(Self::DigitalSignature),
            "watermark" => Ok(Self::Watermark),
            "file_conversion" | "conversion" => Ok(Self::FileConversion),
            "ai_summarization" => Ok(Self::AiSummarization),
            "ai_tagging" => Ok(Self::AiTagging),
            "semantic_search" => Ok(Self::SemanticSearch),
            "compression" => Ok(Self::Compression),
            "encryption" => Ok(Self::Encryption),
            other => Err(DokwerkError::Marshaling(format!(
                "unknown capability tag: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tags_and_mime_types_round_trip() {
        for format in [
            DocumentFormat::Pdf,
            DocumentFormat::Docx,
            DocumentFormat::Png,
            DocumentFormat::Tiff,
        ] {
            assert_eq!(DocumentFormat::from_extension(format.tag()), format);
            assert_eq!(DocumentFormat::from_mime(format.mime_type()), format);
        }
        assert_eq!(DocumentFormat::from_extension("JPG"), DocumentFormat::Jpeg);
        assert_eq!(DocumentFormat::from_extension("exe"), DocumentFormat::Unknown);
    }

    #[test]
    fn known_formats_split_into_families() {
        let office: Vec<_> = DocumentFormat::KNOWN.into_iter().filter(DocumentFormat::is_office).collect();
        assert_eq!(office, vec![DocumentFormat::Docx, DocumentFormat::Xlsx, DocumentFormat::Pptx]);
        let images = DocumentFormat::KNOWN.iter().filter(|f| f.is_image()).count();
        assert_eq!(images, 3);
        assert!(!DocumentFormat::Pdf.is_office() && !DocumentFormat::Pdf.is_image());
        assert!(!DocumentFormat::KNOWN.contains(&DocumentFormat::Unknown));
    }

    #[test]
    fn annotation_codes_cover_every_variant() {
        for kind in AnnotationType::ALL {
            assert_eq!(AnnotationType::from_code(kind.code()), Some(kind));
        }
        assert_eq!(AnnotationType::from_code(8), None);
        assert_eq!(AnnotationType::from_code(-1), None);
    }

    #[test]
    fn negative_extent_is_rejected() {
        assert!(Rect::new(0.0, 0.0, 0.0, 0.0).validate().is_ok());
        assert!(Rect::new(-5.0, -5.0, 1.0, 1.0).validate().is_ok());
        assert!(Rect::new(0.0, 0.0, -1.0, 1.0).validate().is_err());
        assert!(Rect::new(0.0, 0.0, 1.0, -0.5).validate().is_err());
        assert!(Rect::new(f64::NAN, 0.0, 1.0, 1.0).validate().is_err());
    }

    #[test]
    fn minted_ids_are_distinct_and_ordered() {
        let ids: Vec<AnnotationId> = (0..1000).map(|_| AnnotationId::mint()).collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        // The zero-padded sequence makes lexical order follow mint order.
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn capability_tags_parse() {
        assert_eq!(Capability::from_tag("OCR").expect("ocr"), Capability::Ocr);
        assert_eq!(
            Capability::from_tag("digital-signature").expect("signature"),
            Capability::DigitalSignature
        );
        assert_eq!(
            Capability::from_tag("custom:redact").expect("custom"),
            Capability::Custom("redact".into())
        );
        assert_eq!(Capability::Custom("x".into()).tag(), "custom:x");
        assert!(Capability::from_tag("custom:").is_err());
        assert!(Capability::from_tag("teleport").is_err());
    }

    #[test]
    fn annotation_serialises_with_flat_rect_and_type_key() {
        let annotation = Annotation::new(
            2,
            Rect::new(1.0, 2.0, 3.0, 4.0),
            "hello",
            AnnotationType::Highlight,
            None,
        );
        let json = serde_json::to_value(&annotation).expect("serialise");
        assert_eq!(json["type"], "highlight");
        assert_eq!(json["width"], 3.0);
        assert_eq!(json["page"], 2);
        assert!(json["modified_at"].is_null());
    }
}
