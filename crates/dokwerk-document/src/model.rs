// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory document model and its lifecycle state.

use dokwerk_core::error::{DokwerkError, Result};
use dokwerk_core::{Annotation, AnnotationId, DocumentFormat, DocumentMetadata, Rect};

use crate::formats::ParsedDocument;

/// Where a document is in its lifecycle.
///
/// `Opened` until a metadata record is attached, then `Ready`. Disposal is
/// represented by removal from the handle table, after which no model exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Opened,
    Ready,
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened => f.write_str("opened"),
            Self::Ready => f.write_str("ready"),
        }
    }
}

/// One live document: raw content plus everything derived from or attached to it.
#[derive(Debug, Clone)]
pub struct DocumentModel {
    format: DocumentFormat,
    content: Vec<u8>,
    /// Page count reported by the format parser, if it could tell.
    parsed_pages: Option<u32>,
    text: Option<String>,
    metadata: Option<DocumentMetadata>,
    annotations: Vec<Annotation>,
    dirty: bool,
    /// Bumped on every mutation; lets `mark_saved` detect a racing edit.
    revision: u64,
}

impl DocumentModel {
    // -- Construction ---------------------------------------------------------

    /// A fresh model in the `Opened` state with no derived data.
    pub fn new(format: DocumentFormat, content: Vec<u8>) -> Self {
        Self {
            format,
            content,
            parsed_pages: None,
            text: None,
            metadata: None,
            annotations: Vec::new(),
            dirty: false,
            revision: 0,
        }
    }

    /// A model seeded with a parser's skeleton.
    pub fn from_parsed(format: DocumentFormat, content: Vec<u8>, parsed: ParsedDocument) -> Self {
        Self {
            parsed_pages: parsed.page_count,
            text: parsed.text,
            ..Self::new(format, content)
        }
    }

    // -- Queries --------------------------------------------------------------

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn byte_size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn parsed_pages(&self) -> Option<u32> {
        self.parsed_pages
    }

    pub fn state(&self) -> DocumentState {
        if self.metadata.is_some() {
            DocumentState::Ready
        } else {
            DocumentState::Opened
        }
    }

    pub fn metadata(&self) -> Option<&DocumentMetadata> {
        self.metadata.as_ref()
    }

    /// The metadata record, or the sentinel record if none is loaded yet.
    pub fn metadata_or_sentinel(&self) -> DocumentMetadata {
        self.metadata
            .clone()
            .unwrap_or_else(|| DocumentMetadata::sentinel(self.format, self.byte_size()))
    }

    /// Page count used to bound annotation placement. Known only once
    /// metadata is loaded and reports at least one page.
    pub fn known_page_count(&self) -> Option<u32> {
        self.metadata
            .as_ref()
            .filter(|meta| meta.has_page_count())
            .map(|meta| meta.page_count)
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Annotations on `page`, in insertion order.
    pub fn annotations_for_page(&self, page: u32) -> Vec<&Annotation> {
        self.annotations.iter().filter(|a| a.page == page).collect()
    }

    pub fn annotation(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| &a.id == id)
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // -- Validation -----------------------------------------------------------

    /// Check that an annotation may be placed at `page` / `rect`.
    pub fn validate_placement(&self, page: u32, rect: &Rect) -> Result<()> {
        let page_count = self.known_page_count();
        if page == 0 || page_count.is_some_and(|count| page > count) {
            return Err(DokwerkError::InvalidPage {
                page,
                page_count: page_count.unwrap_or(0),
            });
        }
        rect.validate()
    }

    // -- Mutation -------------------------------------------------------------

    /// Attach a metadata record, replacing any previous one. Moves the model
    /// to `Ready`. Not a user edit, so the dirty flag is left alone.
    pub fn set_metadata(&mut self, metadata: DocumentMetadata) {
        self.metadata = Some(metadata);
    }

    /// Replace the plain-text rendering (e.g. after OCR).
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    /// Append an annotation after validating its placement.
    pub fn add_annotation(&mut self, annotation: Annotation) -> Result<AnnotationId> {
        self.validate_placement(annotation.page, &annotation.rect)?;
        let id = annotation.id.clone();
        self.annotations.push(annotation);
        self.touch();
        Ok(id)
    }

    /// Remove the annotation with `id`. Only an actual removal dirties the model.
    pub fn remove_annotation(&mut self, id: &AnnotationId) -> bool {
        match self.annotations.iter().position(|a| &a.id == id) {
            Some(index) => {
                self.annotations.remove(index);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Swap in new content bytes (watermarking and similar rewrites).
    pub fn replace_content(&mut self, content: Vec<u8>) {
        self.content = content;
        self.touch();
    }

    /// Swap in `content` only if nothing changed since `revision` was read.
    ///
    /// Returns whether the swap happened. A rewrite computed from older
    /// content must not clobber an edit made in the meantime.
    pub fn replace_content_at(&mut self, revision: u64, content: Vec<u8>) -> bool {
        if self.revision != revision {
            return false;
        }
        self.replace_content(content);
        true
    }

    /// Clear the dirty flag if nothing changed since `revision` was read.
    ///
    /// Returns whether the flag was cleared. A mutation that slipped in while
    /// the save was writing keeps the model dirty.
    pub fn mark_saved(&mut self, revision: u64) -> bool {
        if self.revision == revision {
            self.dirty = false;
            true
        } else {
            false
        }
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dokwerk_core::AnnotationType;

    fn note(page: u32) -> Annotation {
        Annotation::new(
            page,
            Rect::new(10.0, 10.0, 5.0, 5.0),
            "note",
            AnnotationType::Note,
            None,
        )
    }

    fn three_page_model() -> DocumentModel {
        let mut model = DocumentModel::new(DocumentFormat::Pdf, b"%PDF".to_vec());
        model.set_metadata(DocumentMetadata::sentinel(DocumentFormat::Pdf, 4).with_page_count(3));
        model
    }

    #[test]
    fn metadata_moves_model_to_ready() {
        let mut model = DocumentModel::new(DocumentFormat::Png, vec![0; 8]);
        assert_eq!(model.state(), DocumentState::Opened);
        assert_eq!(model.metadata_or_sentinel().byte_size, 8);
        model.set_metadata(DocumentMetadata::sentinel(DocumentFormat::Png, 8));
        assert_eq!(model.state(), DocumentState::Ready);
        assert!(!model.is_dirty());
    }

    #[test]
    fn metadata_extraction_replaces() {
        let mut model = three_page_model();
        let mut meta = DocumentMetadata::sentinel(DocumentFormat::Pdf, 4).with_page_count(5);
        meta.add_keyword("draft");
        model.set_metadata(meta.clone());
        model.set_metadata(meta);
        let loaded = model.metadata().expect("metadata");
        assert_eq!(loaded.page_count, 5);
        assert_eq!(loaded.keywords, vec!["draft".to_string()]);
    }

    #[test]
    fn page_bounds_are_enforced_once_known() {
        let mut model = three_page_model();
        assert!(matches!(
            model.add_annotation(note(0)),
            Err(DokwerkError::InvalidPage { page: 0, .. })
        ));
        assert!(matches!(
            model.add_annotation(note(4)),
            Err(DokwerkError::InvalidPage {
                page: 4,
                page_count: 3
            })
        ));
        assert!(model.add_annotation(note(3)).is_ok());
        assert_eq!(model.annotation_count(), 1);
    }

    #[test]
    fn unknown_page_count_only_rejects_page_zero() {
        let mut model = DocumentModel::new(DocumentFormat::Docx, vec![1, 2, 3]);
        assert!(model.add_annotation(note(0)).is_err());
        assert!(model.add_annotation(note(250)).is_ok());
    }

    #[test]
    fn negative_extent_is_rejected_without_side_effects() {
        let mut model = three_page_model();
        let mut bad = note(1);
        bad.rect.width = -1.0;
        assert!(matches!(
            model.add_annotation(bad),
            Err(DokwerkError::InvalidRect(_))
        ));
        assert!(!model.is_dirty());
        assert_eq!(model.revision(), 0);
    }

    #[test]
    fn annotations_for_page_keep_insertion_order() {
        let mut model = three_page_model();
        let first = model.add_annotation(note(2)).expect("first");
        model.add_annotation(note(1)).expect("other page");
        let second = model.add_annotation(note(2)).expect("second");
        let on_two: Vec<_> = model
            .annotations_for_page(2)
            .into_iter()
            .map(|a| a.id.clone())
            .collect();
        assert_eq!(on_two, vec![first, second]);
        assert!(model.annotations_for_page(3).is_empty());
    }

    #[test]
    fn removing_missing_annotation_keeps_clean_flag() {
        let mut model = three_page_model();
        assert!(!model.remove_annotation(&AnnotationId::from("ann-missing")));
        assert!(!model.is_dirty());

        let id = model.add_annotation(note(1)).expect("add");
        assert!(model.mark_saved(model.revision()));
        assert!(model.remove_annotation(&id));
        assert!(model.is_dirty());
        assert!(model.annotation(&id).is_none());
    }

    #[test]
    fn stale_save_revision_keeps_model_dirty() {
        let mut model = three_page_model();
        model.add_annotation(note(1)).expect("add");
        let saved_revision = model.revision();
        model.add_annotation(note(2)).expect("racing add");
        assert!(!model.mark_saved(saved_revision));
        assert!(model.is_dirty());
        assert!(model.mark_saved(model.revision()));
        assert!(!model.is_dirty());
    }

    #[test]
    fn stale_rewrite_is_refused() {
        let mut model = three_page_model();
        let read_at = model.revision();
        let id = model.add_annotation(note(1)).expect("racing add");
        assert!(!model.replace_content_at(read_at, vec![1; 8]));
        assert_ne!(model.byte_size(), 8);
        assert!(model.annotation(&id).is_some());

        assert!(model.replace_content_at(model.revision(), vec![1; 8]));
        assert_eq!(model.byte_size(), 8);
    }

    #[test]
    fn replacing_content_dirties_and_resizes() {
        let mut model = three_page_model();
        model.replace_content(vec![0; 16]);
        assert!(model.is_dirty());
        assert_eq!(model.byte_size(), 16);
    }
}
