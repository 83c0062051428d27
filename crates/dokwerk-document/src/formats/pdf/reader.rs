// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: page tree, plain text and the /Info dictionary of an existing
// PDF, using the `lopdf` crate.

use chrono::{FixedOffset, NaiveDate, TimeZone};
use dokwerk_core::error::{DokwerkError, Result};
use dokwerk_core::{DocumentFormat, DocumentMetadata};
use lopdf::{Dictionary, Document, Object};
use tracing::{debug, instrument, warn};

use crate::formats::base_metadata;

/// Read-only view over a PDF held in memory.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Load a PDF from raw bytes.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| DokwerkError::Parse(format!("failed to load PDF from memory: {err}")))?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the page tree.
    pub fn page_count(&self) -> u32 {
        u32::try_from(self.document.get_pages().len()).unwrap_or(u32::MAX)
    }

    /// Plain text of every page, or `None` when the document carries none.
    pub fn text(&self) -> Option<String> {
        let pages: Vec<u32> = self.document.get_pages().keys().copied().collect();
        if pages.is_empty() {
            return None;
        }
        match self.document.extract_text(&pages) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(err) => {
                warn!(%err, "Text extraction failed");
                None
            }
        }
    }

    /// Build the metadata record from the /Info dictionary and page tree.
    pub fn metadata(&self, data: &[u8]) -> DocumentMetadata {
        let mut meta = base_metadata(data, DocumentFormat::Pdf).with_page_count(self.page_count());

        let Some(info) = self.info_dictionary() else {
            return meta;
        };

        meta.title = info_string(info, b"Title");
        meta.author = info_string(info, b"Author");
        meta.subject = info_string(info, b"Subject");
        meta.creator = info_string(info, b"Creator");
        meta.producer = info_string(info, b"Producer");
        meta.created_at = info_string(info, b"CreationDate").and_then(|d| pdf_date_to_rfc3339(&d));
        meta.modified_at = info_string(info, b"ModDate").and_then(|d| pdf_date_to_rfc3339(&d));
        if let Some(keywords) = info_string(info, b"Keywords") {
            for keyword in keywords.split([',', ';']) {
                meta.add_keyword(keyword.trim());
            }
        }
        meta
    }

    // -- Helpers --------------------------------------------------------------

    /// The trailer's /Info entry, following one level of indirection.
    fn info_dictionary(&self) -> Option<&Dictionary> {
        match self.document.trailer.get(b"Info").ok()? {
            Object::Reference(id) => self.document.get_dictionary(*id).ok(),
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }
}

/// Decode a text entry of the /Info dictionary.
fn info_string(info: &Dictionary, key: &[u8]) -> Option<String> {
    let text = match info.get(key).ok()? {
        Object::String(bytes, _) => decode_pdf_text(bytes),
        Object::Name(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        _ => return None,
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// PDF text strings are UTF-16BE with a byte-order mark, or a single-byte
/// encoding. Writers in the wild also emit raw UTF-8, so try that before
/// falling back to Latin-1.
fn decode_pdf_text(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Convert a PDF date (`D:YYYYMMDDHHmmSSOHH'mm'`, trailing parts optional)
/// into RFC 3339. Returns `None` if the string is not a PDF date.
pub fn pdf_date_to_rfc3339(raw: &str) -> Option<String> {
    let body = raw.trim().strip_prefix("D:").unwrap_or(raw.trim());
    let digits: String = body.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() < 4 {
        return None;
    }

    let field = |start: usize, len: usize, default: u32| -> Option<u32> {
        match digits.get(start..start + len) {
            Some(part) => part.parse().ok(),
            None => Some(default),
        }
    };
    let year = i32::try_from(field(0, 4, 0)?).ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(4, 2, 1)?, field(6, 2, 1)?)?;
    let naive = date.and_hms_opt(field(8, 2, 0)?, field(10, 2, 0)?, field(12, 2, 0)?)?;

    let offset = parse_offset(&body[digits.len()..])?;
    let stamped = offset.from_local_datetime(&naive).single()?;
    Some(stamped.to_rfc3339())
}

/// Parse the `Z`, `+HH'mm'` or `-HH'mm'` suffix of a PDF date.
fn parse_offset(suffix: &str) -> Option<FixedOffset> {
    let mut chars = suffix.chars();
    let sign = match chars.next() {
        None | Some('Z') | Some('z') => return FixedOffset::east_opt(0),
        Some('+') => 1,
        Some('-') => -1,
        Some(_) => return None,
    };
    let rest: String = chars.filter(char::is_ascii_digit).collect();
    let hours: i32 = rest.get(0..2)?.parse().ok()?;
    let minutes: i32 = rest.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
