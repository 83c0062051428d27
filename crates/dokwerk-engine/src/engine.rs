// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The engine facade over documents, format collaborators and plugins.
//
// Every document operation touches the handle table for exactly as long as it
// needs to read or mutate one model. Parsing, extraction, file writes and
// plugin work all happen on cloned data with no table or entry lock held.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use dokwerk_core::error::{DokwerkError, Result};
use dokwerk_core::{
    Annotation, AnnotationId, AnnotationType, Capability, DocumentFormat, DocumentHandle,
    DocumentMetadata, EngineConfig, Rect,
};
use dokwerk_document::formats::pdf::PdfWriter;
use dokwerk_document::formats::{ParsedDocument, base_metadata};
use dokwerk_document::{DocumentModel, HandleTable, ParserSet};
use dokwerk_plugin::{InitReport, Plugin, PluginInput, PluginOutput, PluginRegistry, PluginSummary};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

/// Process-wide document engine. Shareable across threads by reference or
/// behind an `Arc`.
pub struct Engine {
    config: EngineConfig,
    documents: HandleTable<DocumentModel>,
    parsers: ParserSet,
    plugins: PluginRegistry,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    // -- Construction ---------------------------------------------------------

    /// Engine with the default PDF / image / Office collaborators.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_parsers(config, ParserSet::with_defaults())
    }

    /// Engine with caller-supplied format collaborators.
    pub fn with_parsers(config: EngineConfig, parsers: ParserSet) -> Self {
        Self {
            config,
            documents: HandleTable::new(),
            parsers,
            plugins: PluginRegistry::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -- Document lifetime ----------------------------------------------------

    /// Take ownership of `bytes` as a new document and return its handle.
    ///
    /// Parsing and metadata extraction are best-effort: failures are logged
    /// and leave the document usable with sentinel metadata.
    #[instrument(skip(self, bytes), fields(%format, bytes_len = bytes.len()))]
    pub fn open(&self, bytes: Vec<u8>, format: DocumentFormat) -> Result<DocumentHandle> {
        if format == DocumentFormat::Unknown {
            return Err(DokwerkError::UnsupportedFormat(format.tag().to_owned()));
        }

        let parsed = self.parse_or_default(&bytes, format);
        let metadata = self
            .config
            .extract_metadata_on_open
            .then(|| self.extract_or_sentinel(&bytes, format, parsed.page_count));

        let mut model = DocumentModel::from_parsed(format, bytes, parsed);
        if let Some(metadata) = metadata {
            model.set_metadata(metadata);
        }

        let handle = DocumentHandle(self.documents.insert(model));
        info!(%handle, "Document opened");
        Ok(handle)
    }

    /// Read the file at `path` and open it, inferring the format from the
    /// extension.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn open_file(&self, path: impl AsRef<Path>) -> Result<DocumentHandle> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        let format = DocumentFormat::from_extension(&extension);
        if format == DocumentFormat::Unknown {
            return Err(DokwerkError::UnsupportedFormat(format!(
                "cannot infer a format from {}",
                path.display()
            )));
        }
        let bytes = tokio::fs::read(path).await?;
        debug!(bytes = bytes.len(), "File read");
        self.open(bytes, format)
    }

    /// Release the document behind `handle`. Unknown or already disposed
    /// handles are a no-op. Returns whether a document was released.
    #[instrument(skip(self), fields(%handle))]
    pub fn dispose(&self, handle: DocumentHandle) -> bool {
        match self.documents.remove(handle.raw()) {
            Ok(model) => {
                info!(
                    bytes = model.byte_size(),
                    annotations = model.annotation_count(),
                    dirty = model.is_dirty(),
                    "Document disposed"
                );
                true
            }
            Err(_) => {
                debug!("Dispose of unknown handle ignored");
                false
            }
        }
    }

    pub fn contains(&self, handle: DocumentHandle) -> bool {
        self.documents.contains(handle.raw())
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    // -- Queries --------------------------------------------------------------

    /// Owned copy of the whole model.
    pub fn snapshot(&self, handle: DocumentHandle) -> Result<DocumentModel> {
        self.documents.get(handle.raw())
    }

    /// Metadata record; the sentinel record while none is loaded.
    pub fn metadata(&self, handle: DocumentHandle) -> Result<DocumentMetadata> {
        self.documents
            .read(handle.raw(), DocumentModel::metadata_or_sentinel)
    }

    pub fn text(&self, handle: DocumentHandle) -> Result<Option<String>> {
        self.documents
            .read(handle.raw(), |model| model.text().map(str::to_owned))
    }

    pub fn format(&self, handle: DocumentHandle) -> Result<DocumentFormat> {
        self.documents.read(handle.raw(), DocumentModel::format)
    }

    pub fn annotations(&self, handle: DocumentHandle) -> Result<Vec<Annotation>> {
        self.documents
            .read(handle.raw(), |model| model.annotations().to_vec())
    }

    /// Annotations on `page`, in insertion order.
    pub fn annotations_for_page(&self, handle: DocumentHandle, page: u32) -> Result<Vec<Annotation>> {
        self.documents.read(handle.raw(), |model| {
            model
                .annotations_for_page(page)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    pub fn is_dirty(&self, handle: DocumentHandle) -> Result<bool> {
        self.documents.read(handle.raw(), DocumentModel::is_dirty)
    }

    // -- Mutation -------------------------------------------------------------

    /// Re-run metadata extraction, replacing the current record.
    #[instrument(skip(self), fields(%handle))]
    pub fn refresh_metadata(&self, handle: DocumentHandle) -> Result<DocumentMetadata> {
        let (content, format, pages) = self.documents.read(handle.raw(), |model| {
            (model.content().to_vec(), model.format(), model.parsed_pages())
        })?;
        let metadata = self.extract_or_sentinel(&content, format, pages);
        self.documents
            .mutate(handle.raw(), |model| model.set_metadata(metadata.clone()))?;
        Ok(metadata)
    }

    /// Attach an annotation and return its fresh id.
    #[instrument(skip_all, fields(%handle, page = page, kind = ?kind))]
    pub fn annotate(
        &self,
        handle: DocumentHandle,
        page: u32,
        rect: Rect,
        content: &str,
        kind: AnnotationType,
    ) -> Result<AnnotationId> {
        let annotation = Annotation::new(page, rect, content, kind, self.config.default_author.clone());
        let id = self
            .documents
            .mutate(handle.raw(), |model| model.add_annotation(annotation))??;
        debug!(%id, "Annotation added");
        Ok(id)
    }

    /// Remove an annotation. `Ok(false)` when no annotation has that id.
    #[instrument(skip(self), fields(%handle, %id))]
    pub fn remove_annotation(&self, handle: DocumentHandle, id: &AnnotationId) -> Result<bool> {
        self.documents
            .mutate(handle.raw(), |model| model.remove_annotation(id))
    }

    /// Write the document to `destination` and clear its dirty flag.
    ///
    /// PDFs are written with their annotations embedded; other formats (or
    /// PDFs lopdf cannot rewrite) are written byte for byte. Annotations and
    /// metadata are not altered. An edit that lands while the file is being
    /// written keeps the document dirty.
    #[instrument(skip(self, destination), fields(%handle, destination = %destination.as_ref().display()))]
    pub fn save(&self, handle: DocumentHandle, destination: impl AsRef<Path>) -> Result<()> {
        let (content, annotations, format, revision) = self.documents.read(handle.raw(), |model| {
            (
                model.content().to_vec(),
                model.annotations().to_vec(),
                model.format(),
                model.revision(),
            )
        })?;

        let bytes = if format == DocumentFormat::Pdf && !annotations.is_empty() {
            PdfWriter::embed_annotations(&content, &annotations).unwrap_or_else(|err| {
                warn!(%err, "Could not embed annotations; writing original bytes");
                content
            })
        } else {
            content
        };

        std::fs::write(destination.as_ref(), &bytes)?;

        match self
            .documents
            .mutate(handle.raw(), |model| model.mark_saved(revision))
        {
            Ok(true) => info!(bytes = bytes.len(), "Document saved"),
            Ok(false) => info!(bytes = bytes.len(), "Document saved; edited during save, still dirty"),
            Err(_) => debug!("Document disposed during save"),
        }
        Ok(())
    }

    // -- Plugins --------------------------------------------------------------

    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        self.plugins.register(plugin)
    }

    /// Register the built-in watermark, signature and conversion plugins.
    pub fn register_builtin_plugins(&self) -> Result<()> {
        dokwerk_plugin::builtin::defaults()
            .into_iter()
            .try_for_each(|plugin| self.plugins.register(plugin))
    }

    pub fn unregister_plugin(&self, name: &str) -> Result<()> {
        self.plugins.unregister(name)
    }

    /// Initialise every pending plugin with its configured settings.
    pub fn initialize_plugins(&self) -> InitReport {
        self.plugins
            .initialize_all(|name| self.config.plugin_config(name))
    }

    pub fn plugins(&self) -> Vec<PluginSummary> {
        self.plugins.summaries()
    }

    pub fn supports(&self, capability: &Capability) -> bool {
        self.plugins.supports(capability)
    }

    /// Route `input` to the first ready plugin providing `capability`.
    ///
    /// When `input` carries no payload, the document's content and MIME type
    /// are used. Plugin failures come back as `success = false`.
    #[instrument(skip(self, input), fields(%handle, %capability))]
    pub async fn dispatch(
        &self,
        handle: DocumentHandle,
        capability: &Capability,
        mut input: PluginInput,
    ) -> Result<PluginOutput> {
        let (content, format, metadata) = self.documents.read(handle.raw(), |model| {
            let content = input.data.is_empty().then(|| model.content().to_vec());
            (content, model.format(), model.metadata_or_sentinel())
        })?;

        if let Some(content) = content {
            input.data = content;
            input.format = format.mime_type().to_owned();
        }
        input
            .metadata
            .entry("page_count".into())
            .or_insert_with(|| json!(metadata.page_count));
        if let Some(title) = metadata.title {
            input.metadata.entry("title".into()).or_insert_with(|| json!(title));
        }

        let output = self.plugins.dispatch(capability, input).await?;
        if !output.success {
            warn!(error = output.error.as_deref().unwrap_or_default(), "Plugin reported failure");
        }
        Ok(output)
    }

    /// Stamp `text` onto the document. On success the document's content is
    /// replaced and its metadata refreshed.
    ///
    /// Fails with `ConcurrentModification` if the document was edited while
    /// the plugin ran; the edit is kept and the stamped bytes are dropped.
    #[instrument(skip(self, text), fields(%handle))]
    pub async fn apply_watermark(&self, handle: DocumentHandle, text: &str, opacity: f64) -> Result<PluginOutput> {
        let (content, format, revision) = self.documents.read(handle.raw(), |model| {
            (model.content().to_vec(), model.format(), model.revision())
        })?;
        let input = PluginInput::new(content, format.mime_type())
            .with_parameter("text", json!(text))
            .with_parameter("opacity", json!(opacity));
        let output = self.dispatch(handle, &Capability::Watermark, input).await?;
        if output.success {
            let committed = self
                .documents
                .mutate(handle.raw(), |model| model.replace_content_at(revision, output.data.clone()))?;
            if !committed {
                warn!(revision, "Document changed during watermarking; discarding stamped content");
                return Err(DokwerkError::ConcurrentModification(handle.raw()));
            }
            self.refresh_metadata(handle)?;
        }
        Ok(output)
    }

    /// Run OCR and store the recognised text as the document's text.
    #[instrument(skip(self), fields(%handle))]
    pub async fn recognize_text(&self, handle: DocumentHandle) -> Result<String> {
        let output = self
            .dispatch(handle, &Capability::Ocr, PluginInput::default())
            .await?;
        let output = require_success(output)?;
        let text = String::from_utf8_lossy(&output.data).into_owned();
        self.documents
            .mutate(handle.raw(), |model| model.set_text(text.clone()))?;
        Ok(text)
    }

    /// Convert the document and open the result as a new document.
    #[instrument(skip(self), fields(%handle, %target))]
    pub async fn convert(&self, handle: DocumentHandle, target: DocumentFormat) -> Result<DocumentHandle> {
        if target == DocumentFormat::Unknown {
            return Err(DokwerkError::UnsupportedFormat(target.tag().to_owned()));
        }
        let input = PluginInput::default().with_parameter("target_format", json!(target.mime_type()));
        let output = self
            .dispatch(handle, &Capability::FileConversion, input)
            .await?;
        let output = require_success(output)?;
        let format = match DocumentFormat::from_mime(&output.format) {
            DocumentFormat::Unknown => target,
            reported => reported,
        };
        self.open(output.data, format)
    }

    /// Dispose every document and unregister every plugin.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        let handles = self.documents.handles();
        let released = handles
            .into_iter()
            .filter(|raw| self.dispose(DocumentHandle(*raw)))
            .count();
        self.plugins.shutdown();
        info!(released, "Engine shut down");
    }

    // -- Helpers --------------------------------------------------------------

    /// Run the format parser. An error or a panic leaves the document with no
    /// page count and no text.
    fn parse_or_default(&self, bytes: &[u8], format: DocumentFormat) -> ParsedDocument {
        match panic::catch_unwind(AssertUnwindSafe(|| self.parsers.parse(bytes, format))) {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(err)) => {
                warn!(%err, "Parser failed; opening without page count or text");
                ParsedDocument::default()
            }
            Err(payload) => {
                warn!(detail = %panic_detail(payload.as_ref()), "Parser panicked; opening without page count or text");
                ParsedDocument::default()
            }
        }
    }

    /// Run the metadata extractor. An error or a panic yields base metadata
    /// (sentinel fields, size, MIME type, fingerprint, parser page count).
    fn extract_or_sentinel(&self, bytes: &[u8], format: DocumentFormat, pages: Option<u32>) -> DocumentMetadata {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.parsers.extract_metadata(bytes, format)));
        match outcome {
            Ok(Ok(metadata)) => return metadata,
            Ok(Err(err)) => warn!(%err, "Metadata extraction failed; using sentinel metadata"),
            Err(payload) => warn!(
                detail = %panic_detail(payload.as_ref()),
                "Metadata extractor panicked; using sentinel metadata"
            ),
        }
        base_metadata(bytes, format).with_page_count(pages.unwrap_or(0))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("documents", &self.documents.len())
            .field("plugins", &self.plugins)
            .field("parsers", &self.parsers)
            .finish()
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

fn require_success(output: PluginOutput) -> Result<PluginOutput> {
    if output.success {
        Ok(output)
    } else {
        Err(DokwerkError::PluginProcessing(
            output
                .error
                .unwrap_or_else(|| "plugin reported failure without a message".to_owned()),
        ))
    }
}
