// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster-to-PDF conversion plugin.

use dokwerk_core::error::Result;
use dokwerk_core::{Capability, DocumentFormat, PluginConfig};
use dokwerk_document::formats::pdf::PdfWriter;
use serde_json::json;
use tracing::{debug, info};

use crate::plugin::{Plugin, PluginInput, PluginOutput};

pub const NAME: &str = "raster-to-pdf";

/// Wraps a JPEG, PNG or TIFF in a single-page PDF.
///
/// The `target_format` parameter (MIME type or extension) must name PDF;
/// when absent, PDF is assumed.
#[derive(Debug, Default)]
pub struct RasterToPdfPlugin;

impl RasterToPdfPlugin {
    pub fn new() -> Self {
        Self
    }
}

fn target_format(input: &PluginInput) -> DocumentFormat {
    match input.parameter_str("target_format") {
        None => DocumentFormat::Pdf,
        Some(target) if target.contains('/') => DocumentFormat::from_mime(target),
        Some(target) => DocumentFormat::from_extension(target),
    }
}

impl Plugin for RasterToPdfPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Converts raster images into single-page PDFs"
    }

    fn author(&self) -> &str {
        "Dokwerk"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::FileConversion]
    }

    fn initialize(&self, _config: &PluginConfig) -> Result<()> {
        info!("Initialising raster-to-PDF plugin");
        Ok(())
    }

    fn process(&self, input: &PluginInput) -> Result<PluginOutput> {
        let source = DocumentFormat::from_mime(&input.format);
        let target = target_format(input);
        if !source.is_image() || target != DocumentFormat::Pdf {
            return Ok(PluginOutput::failure(format!(
                "cannot convert {} to {target}",
                input.format
            )));
        }

        let title = input
            .metadata
            .get("title")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("Converted image");
        let pdf = PdfWriter::new().with_title(title).create_from_image(&input.data)?;
        debug!(output_bytes = pdf.len(), "Image converted");
        Ok(PluginOutput::success(pdf, DocumentFormat::Pdf.mime_type())
            .with_metadata("source_format", json!(source.tag())))
    }

    fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
