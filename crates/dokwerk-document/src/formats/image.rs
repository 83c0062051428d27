// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster image collaborator (JPEG, PNG, TIFF) using the `image` crate.
//
// Only the header is read: a raster is always one page with no text, and the
// pixel dimensions go into the custom metadata map.

use std::io::Cursor;

use dokwerk_core::error::{DokwerkError, Result};
use dokwerk_core::{DocumentFormat, DocumentMetadata};
use tracing::{debug, instrument};

use super::{FormatParser, MetadataExtractor, ParsedDocument, base_metadata};

/// Custom metadata keys for the pixel dimensions.
pub const WIDTH_KEY: &str = "width_px";
pub const HEIGHT_KEY: &str = "height_px";

#[derive(Debug, Default, Clone, Copy)]
pub struct RasterFormat;

impl RasterFormat {
    /// Pixel dimensions read from the image header, without decoding pixels.
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn dimensions(data: &[u8]) -> Result<(u32, u32)> {
        let reader = ::image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|err| DokwerkError::Parse(format!("failed to sniff image: {err}")))?;
        if reader.format().is_none() {
            return Err(DokwerkError::Parse("unrecognised image data".into()));
        }
        let (width, height) = reader
            .into_dimensions()
            .map_err(|err| DokwerkError::Parse(format!("failed to read image header: {err}")))?;
        debug!(width, height, "Image header read");
        Ok((width, height))
    }
}

impl FormatParser for RasterFormat {
    fn parse(&self, data: &[u8]) -> Result<ParsedDocument> {
        Self::dimensions(data)?;
        Ok(ParsedDocument {
            page_count: Some(1),
            text: None,
        })
    }
}

impl MetadataExtractor for RasterFormat {
    fn extract(&self, data: &[u8], format: DocumentFormat) -> Result<DocumentMetadata> {
        let (width, height) = Self::dimensions(data)?;
        let mut meta = base_metadata(data, format).with_page_count(1);
        meta.set_custom(WIDTH_KEY, width.to_string());
        meta.set_custom(HEIGHT_KEY, height.to_string());
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ::image::DynamicImage::ImageRgb8(::image::RgbImage::new(width, height));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ::image::ImageFormat::Png)
            .expect("encode png");
        buf
    }

    #[test]
    fn png_is_a_single_page_without_text() {
        let parsed = RasterFormat.parse(&png(4, 3)).expect("parse");
        assert_eq!(parsed.page_count, Some(1));
        assert!(parsed.text.is_none());
    }

    #[test]
    fn dimensions_land_in_custom_metadata() {
        let data = png(40, 30);
        let meta = RasterFormat
            .extract(&data, DocumentFormat::Png)
            .expect("extract");
        assert_eq!(meta.page_count, 1);
        assert_eq!(meta.mime_type, "image/png");
        assert_eq!(meta.byte_size, data.len() as u64);
        assert_eq!(meta.custom.get(WIDTH_KEY).map(String::as_str), Some("40"));
        assert_eq!(meta.custom.get(HEIGHT_KEY).map(String::as_str), Some("30"));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = RasterFormat.parse(b"not an image").expect_err("garbage");
        assert!(matches!(err, DokwerkError::Parse(_)));
    }
}
