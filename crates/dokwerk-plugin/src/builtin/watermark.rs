// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stamp watermark plugin: draws a translucent text stamp across PDF pages.

use std::sync::Mutex;

use dokwerk_core::error::Result;
use dokwerk_core::{Capability, DocumentFormat, PluginConfig};
use dokwerk_document::formats::pdf::PdfWriter;
use serde_json::json;
use tracing::info;

use crate::plugin::{Plugin, PluginInput, PluginOutput};

pub const NAME: &str = "stamp-watermark";

const DEFAULT_TEXT: &str = "CONFIDENTIAL";
const DEFAULT_OPACITY: f64 = 0.3;

#[derive(Debug, Clone)]
struct StampDefaults {
    text: String,
    opacity: f64,
}

impl Default for StampDefaults {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT.to_owned(),
            opacity: DEFAULT_OPACITY,
        }
    }
}

#[derive(Debug, Default)]
pub struct StampWatermarkPlugin {
    /// Fallbacks for the `text` / `opacity` parameters, from settings.
    defaults: Mutex<StampDefaults>,
}

impl StampWatermarkPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn defaults(&self) -> StampDefaults {
        self.defaults
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl Plugin for StampWatermarkPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Translucent text stamp on every page of a PDF"
    }

    fn author(&self) -> &str {
        "Dokwerk"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Watermark]
    }

    fn initialize(&self, config: &PluginConfig) -> Result<()> {
        let mut defaults = StampDefaults::default();
        if let Some(text) = config.settings.get("text").and_then(serde_json::Value::as_str) {
            defaults.text = text.to_owned();
        }
        if let Some(opacity) = config.settings.get("opacity").and_then(serde_json::Value::as_f64) {
            defaults.opacity = opacity;
        }
        info!(text = %defaults.text, opacity = defaults.opacity, "Initialising stamp watermark plugin");
        if let Ok(mut slot) = self.defaults.lock() {
            *slot = defaults;
        }
        Ok(())
    }

    fn process(&self, input: &PluginInput) -> Result<PluginOutput> {
        if DocumentFormat::from_mime(&input.format) != DocumentFormat::Pdf {
            return Ok(PluginOutput::failure(format!(
                "unsupported format for watermarking: {}",
                input.format
            )));
        }

        let defaults = self.defaults();
        let text = input.parameter_str("text").unwrap_or(&defaults.text);
        let opacity = input.parameter_f64("opacity").unwrap_or(defaults.opacity);

        let stamped = PdfWriter::stamp_text(&input.data, text, opacity as f32)?;
        Ok(PluginOutput::success(stamped, input.format.clone())
            .with_metadata("watermark_text", json!(text))
            .with_metadata("opacity", json!(opacity)))
    }

    fn cleanup(&self) -> Result<()> {
        if let Ok(mut slot) = self.defaults.lock() {
            *slot = StampDefaults::default();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dokwerk_document::formats::pdf::PdfReader;

    #[test]
    fn stamps_pdf_pages() {
        let pdf = PdfWriter::new()
            .create_from_pages(&["one", "two"])
            .expect("build");
        let plugin = StampWatermarkPlugin::new();
        plugin.initialize(&PluginConfig::default()).expect("init");
        let out = plugin
            .process(
                &PluginInput::new(pdf.clone(), "application/pdf")
                    .with_parameter("text", json!("DRAFT")),
            )
            .expect("process");
        assert!(out.success);
        assert_ne!(out.data, pdf);
        assert_eq!(out.metadata["watermark_text"], json!("DRAFT"));
        let reader = PdfReader::from_bytes(&out.data).expect("reload");
        assert_eq!(reader.page_count(), 2);
    }

    #[test]
    fn settings_supply_defaults() {
        let pdf = PdfWriter::new().create_from_pages(&["one"]).expect("build");
        let plugin = StampWatermarkPlugin::new();
        plugin
            .initialize(&PluginConfig::default().with_setting("text", json!("INTERNAL")))
            .expect("init");
        let out = plugin
            .process(&PluginInput::new(pdf, "application/pdf"))
            .expect("process");
        assert_eq!(out.metadata["watermark_text"], json!("INTERNAL"));
    }

    #[test]
    fn non_pdf_is_a_failure_result() {
        let out = StampWatermarkPlugin::new()
            .process(&PluginInput::new(vec![0x89, b'P'], "image/png"))
            .expect("process");
        assert!(!out.success);
        assert!(out.error.expect("message").contains("image/png"));
    }

    #[test]
    fn corrupt_pdf_is_an_error() {
        assert!(
            StampWatermarkPlugin::new()
                .process(&PluginInput::new(b"%PDF-junk".to_vec(), "application/pdf"))
                .is_err()
        );
    }
}
