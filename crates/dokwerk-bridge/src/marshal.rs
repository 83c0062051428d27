// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Boundary marshaling.
//
// Decoding borrows host memory for the duration of one call. Encoding hands
// back library-owned allocations that the host releases through the matching
// free function; nothing here frees memory it did not allocate.

use std::collections::BTreeMap;
use std::ffi::{CStr, CString, c_char};
use std::ptr;

use dokwerk_core::error::{DokwerkError, Result};
use dokwerk_core::metadata::UNKNOWN;
use dokwerk_core::{Annotation, AnnotationType, Capability, DocumentFormat, DocumentMetadata};
use dokwerk_plugin::ParamMap;
use serde::{Deserialize, Serialize};

// -- Decoding -------------------------------------------------------------------

/// Borrow a NUL-terminated UTF-8 string from the host.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// and unmodified for the returned lifetime.
pub unsafe fn read_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(DokwerkError::Marshaling(format!("{what} is a null pointer")));
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    let raw = unsafe { CStr::from_ptr(ptr) };
    raw.to_str()
        .map_err(|err| DokwerkError::Marshaling(format!("{what} is not valid UTF-8: {err}")))
}

/// Like [`read_str`], but null means "not supplied".
///
/// # Safety
/// Same contract as [`read_str`].
pub unsafe fn read_optional_str<'a>(ptr: *const c_char, what: &str) -> Result<Option<&'a str>> {
    if ptr.is_null() {
        Ok(None)
    } else {
        // SAFETY: forwarded caller contract.
        unsafe { read_str(ptr, what) }.map(Some)
    }
}

/// Borrow a host byte buffer. A null pointer is accepted only with `len == 0`.
///
/// # Safety
/// When non-null, `ptr` must point to `len` readable bytes that stay valid for
/// the returned lifetime.
pub unsafe fn read_bytes<'a>(ptr: *const u8, len: usize) -> Result<&'a [u8]> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(DokwerkError::Marshaling(format!(
            "null buffer with non-zero length {len}"
        )));
    }
    // SAFETY: non-null, `len` readable bytes per the caller contract.
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Resolve a format given as a boundary tag, file extension or MIME type.
pub fn decode_format(tag: &str) -> Result<DocumentFormat> {
    let format = if tag.contains('/') {
        DocumentFormat::from_mime(tag)
    } else {
        DocumentFormat::from_extension(tag)
    };
    match format {
        DocumentFormat::Unknown => Err(DokwerkError::UnsupportedFormat(tag.to_owned())),
        known => Ok(known),
    }
}

pub fn decode_capability(tag: &str) -> Result<Capability> {
    Capability::from_tag(tag)
}

pub fn decode_annotation_type(code: i32) -> Result<AnnotationType> {
    AnnotationType::from_code(code)
        .ok_or_else(|| DokwerkError::Marshaling(format!("unknown annotation type code {code}")))
}

/// Parse a JSON object of plugin parameters. Absent or blank text is an
/// empty map.
pub fn decode_params(json: Option<&str>) -> Result<ParamMap> {
    match json.map(str::trim) {
        None | Some("") => Ok(ParamMap::new()),
        Some(text) => serde_json::from_str::<ParamMap>(text).map_err(|err| {
            DokwerkError::Marshaling(format!("parameters must be a JSON object: {err}"))
        }),
    }
}

// -- Wire records -----------------------------------------------------------------

fn unknown() -> String {
    UNKNOWN.to_owned()
}

fn or_unknown(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(unknown)
}

/// Metadata as it crosses the boundary. Optional fields are never null: they
/// carry `"unknown"` instead, both when encoding and when decoding partial
/// JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataRecord {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: Vec<String>,
    pub creator: String,
    pub producer: String,
    pub created_at: String,
    pub modified_at: String,
    pub page_count: u32,
    pub byte_size: u64,
    pub mime_type: String,
    pub custom: BTreeMap<String, String>,
}

impl Default for MetadataRecord {
    fn default() -> Self {
        Self {
            title: unknown(),
            author: unknown(),
            subject: unknown(),
            keywords: Vec::new(),
            creator: unknown(),
            producer: unknown(),
            created_at: unknown(),
            modified_at: unknown(),
            page_count: 0,
            byte_size: 0,
            mime_type: DocumentFormat::Unknown.mime_type().to_owned(),
            custom: BTreeMap::new(),
        }
    }
}

impl From<&DocumentMetadata> for MetadataRecord {
    fn from(meta: &DocumentMetadata) -> Self {
        Self {
            title: or_unknown(&meta.title),
            author: or_unknown(&meta.author),
            subject: or_unknown(&meta.subject),
            keywords: meta.keywords.clone(),
            creator: or_unknown(&meta.creator),
            producer: or_unknown(&meta.producer),
            created_at: or_unknown(&meta.created_at),
            modified_at: or_unknown(&meta.modified_at),
            page_count: meta.page_count,
            byte_size: meta.byte_size,
            mime_type: meta.mime_type.clone(),
            custom: meta.custom.clone(),
        }
    }
}

/// Annotation as it crosses the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationRecord {
    pub id: String,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: AnnotationType,
    /// Integer form of `kind`, as accepted by `dokwerk_annotate`.
    pub type_code: i32,
    pub author: String,
    pub created_at: String,
    pub modified_at: String,
}

impl Default for AnnotationRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            page: 0,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            content: String::new(),
            kind: AnnotationType::Text,
            type_code: AnnotationType::Text.code(),
            author: unknown(),
            created_at: unknown(),
            modified_at: unknown(),
        }
    }
}

impl From<&Annotation> for AnnotationRecord {
    fn from(annotation: &Annotation) -> Self {
        Self {
            id: annotation.id.to_string(),
            page: annotation.page,
            x: annotation.rect.x,
            y: annotation.rect.y,
            width: annotation.rect.width,
            height: annotation.rect.height,
            content: annotation.content.clone(),
            kind: annotation.kind,
            type_code: annotation.kind.code(),
            author: or_unknown(&annotation.author),
            created_at: annotation.created_at.clone(),
            modified_at: or_unknown(&annotation.modified_at),
        }
    }
}

pub fn encode_metadata(meta: &DocumentMetadata) -> Result<String> {
    Ok(serde_json::to_string(&MetadataRecord::from(meta))?)
}

pub fn encode_annotations(annotations: &[Annotation]) -> Result<String> {
    let records: Vec<AnnotationRecord> = annotations.iter().map(AnnotationRecord::from).collect();
    Ok(serde_json::to_string(&records)?)
}

pub fn encode_params(params: &ParamMap) -> Result<String> {
    Ok(serde_json::to_string(params)?)
}

// -- Library-owned allocations ----------------------------------------------------

/// Move `text` into a C string the host must release with `dokwerk_string_free`.
pub fn into_c_string(text: String) -> Result<*mut c_char> {
    to_c_string(text).map(CString::into_raw)
}

/// Owned C string for `text`; an interior NUL is a marshaling error.
pub fn to_c_string(text: String) -> Result<CString> {
    CString::new(text)
        .map_err(|err| DokwerkError::Marshaling(format!("string contains an interior NUL: {err}")))
}

/// Owned C string for text the library does not control (plugin output).
/// Interior NULs become U+FFFD instead of failing the call.
pub fn to_c_string_lossy(text: String) -> CString {
    match CString::new(text) {
        Ok(c_string) => c_string,
        Err(err) => {
            let cleaned = String::from_utf8_lossy(&err.into_vec()).replace('\0', "\u{FFFD}");
            CString::new(cleaned).unwrap_or_default()
        }
    }
}

/// Release a string produced by [`into_c_string`]. Null is ignored.
///
/// # Safety
/// `ptr` must be null or come from [`into_c_string`] and not have been freed.
pub unsafe fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        // SAFETY: allocated by `CString::into_raw` per the caller contract.
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Move `bytes` into a library-owned buffer. Empty input yields a null pointer
/// with length 0.
pub fn into_c_bytes(bytes: Vec<u8>) -> (*mut u8, usize) {
    if bytes.is_empty() {
        return (ptr::null_mut(), 0);
    }
    let boxed = bytes.into_boxed_slice();
    let len = boxed.len();
    (Box::into_raw(boxed).cast::<u8>(), len)
}

/// Release a buffer produced by [`into_c_bytes`].
///
/// # Safety
/// `ptr`/`len` must be exactly a pair returned by [`into_c_bytes`] that has not
/// been freed.
pub unsafe fn free_c_bytes(ptr: *mut u8, len: usize) {
    if !ptr.is_null() && len > 0 {
        // SAFETY: reconstructs the boxed slice leaked by `into_c_bytes`.
        drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dokwerk_core::Rect;

    #[test]
    fn formats_accept_tags_extensions_and_mime() {
        assert_eq!(decode_format("pdf").expect("tag"), DocumentFormat::Pdf);
        assert_eq!(decode_format(".JPG").expect("ext"), DocumentFormat::Jpeg);
        assert_eq!(decode_format("image/png").expect("mime"), DocumentFormat::Png);
        assert!(matches!(
            decode_format("unknown"),
            Err(DokwerkError::UnsupportedFormat(_))
        ));
        assert!(decode_format("text/html").is_err());
    }

    #[test]
    fn null_and_invalid_strings_are_marshaling_errors() {
        let err = unsafe { read_str(ptr::null(), "content") }.expect_err("null");
        assert!(matches!(err, DokwerkError::Marshaling(_)));

        let bad = [0xFFu8, 0xFE, 0x00];
        let err = unsafe { read_str(bad.as_ptr().cast(), "content") }.expect_err("utf8");
        assert!(matches!(err, DokwerkError::Marshaling(_)));

        assert_eq!(unsafe { read_optional_str(ptr::null(), "params") }.expect("none"), None);
        assert_eq!(unsafe { read_str(c"hello".as_ptr(), "greeting") }.expect("ok"), "hello");
    }

    #[test]
    fn byte_buffers() {
        assert!(unsafe { read_bytes(ptr::null(), 0) }.expect("empty").is_empty());
        assert!(unsafe { read_bytes(ptr::null(), 4) }.is_err());
        let data = [1u8, 2, 3];
        assert_eq!(unsafe { read_bytes(data.as_ptr(), 3) }.expect("slice"), &data);
    }

    #[test]
    fn plugin_text_with_nul_is_cleaned_not_rejected() {
        assert!(to_c_string("bad\0msg".to_owned()).is_err());
        let cleaned = to_c_string_lossy("bad\0msg".to_owned());
        assert_eq!(cleaned.to_str().expect("utf8"), "bad\u{FFFD}msg");
        assert_eq!(to_c_string_lossy("fine".to_owned()).to_bytes(), b"fine");
    }

    #[test]
    fn params_must_be_an_object() {
        assert!(decode_params(None).expect("none").is_empty());
        assert!(decode_params(Some("  ")).expect("blank").is_empty());
        let params = decode_params(Some(r#"{"text":"DRAFT","opacity":0.4}"#)).expect("object");
        assert_eq!(params.get("text").and_then(|v| v.as_str()), Some("DRAFT"));
        assert!(decode_params(Some("[1,2]")).is_err());
        assert!(decode_params(Some("{oops")).is_err());
    }

    #[test]
    fn absent_metadata_fields_render_as_unknown() {
        let meta = DocumentMetadata::sentinel(DocumentFormat::Pdf, 10).with_title("Report");
        let json: serde_json::Value =
            serde_json::from_str(&encode_metadata(&meta).expect("encode")).expect("json");
        assert_eq!(json["title"], "Report");
        assert_eq!(json["author"], "unknown");
        assert_eq!(json["created_at"], "unknown");
        assert_eq!(json["page_count"], 0);
        assert_eq!(json["mime_type"], "application/pdf");
    }

    #[test]
    fn partial_records_decode_to_sentinels() {
        let record: MetadataRecord = serde_json::from_str(r#"{"page_count":3}"#).expect("decode");
        assert_eq!(record.page_count, 3);
        assert_eq!(record.title, "unknown");
        assert_eq!(record.producer, "unknown");

        let annotation: AnnotationRecord =
            serde_json::from_str(r#"{"id":"a","page":2,"type":"note"}"#).expect("decode");
        assert_eq!(annotation.kind, AnnotationType::Note);
        assert_eq!(annotation.author, "unknown");
        assert_eq!(annotation.modified_at, "unknown");
    }

    #[test]
    fn annotation_records_carry_type_code() {
        let annotation = Annotation::new(1, Rect::new(1.0, 2.0, 3.0, 4.0), "hi", AnnotationType::Stamp, None);
        let json: serde_json::Value =
            serde_json::from_str(&encode_annotations(&[annotation.clone()]).expect("encode"))
                .expect("json");
        assert_eq!(json[0]["id"], annotation.id.as_str());
        assert_eq!(json[0]["type"], "stamp");
        assert_eq!(json[0]["type_code"], 6);
        assert_eq!(json[0]["width"], 3.0);
        assert_eq!(json[0]["author"], "unknown");
    }

    #[test]
    fn owned_allocations_round_trip_through_free() {
        let ptr = into_c_string("owned".into()).expect("cstring");
        assert_eq!(unsafe { CStr::from_ptr(ptr) }.to_str().expect("utf8"), "owned");
        unsafe { free_c_string(ptr) };
        unsafe { free_c_string(ptr::null_mut()) };

        assert!(into_c_string("a\0b".into()).is_err());

        let (data, len) = into_c_bytes(vec![9, 8, 7]);
        assert_eq!(len, 3);
        assert_eq!(unsafe { std::slice::from_raw_parts(data, len) }, &[9, 8, 7]);
        unsafe { free_c_bytes(data, len) };

        let (empty, zero) = into_c_bytes(Vec::new());
        assert!(empty.is_null());
        assert_eq!(zero, 0);
    }
}
