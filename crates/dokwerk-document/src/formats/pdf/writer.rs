// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer: build new PDFs and rewrite existing ones using `lopdf`.
//
// Covers the three writes the engine needs: simple text pages, embedding
// engine annotations as PDF annotation dictionaries on save, and stamping a
// text watermark onto every page.

use dokwerk_core::error::{DokwerkError, Result};
use dokwerk_core::{Annotation, AnnotationType};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info, instrument, warn};

/// US Letter in points.
const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;

/// Resource names used by the watermark stamp.
const STAMP_FONT: &str = "FDokwerkStamp";
const STAMP_STATE: &str = "GSDokwerkStamp";

/// Builds and rewrites PDF documents.
#[derive(Debug, Default, Clone)]
pub struct PdfWriter {
    /// Title embedded in the /Info dictionary.
    title: Option<String>,
    /// Author embedded in the /Info dictionary.
    author: Option<String>,
}

impl PdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    // -- Creation -------------------------------------------------------------

    /// Create a PDF with one page per entry, each showing its line of text in
    /// Helvetica. An empty slice yields a single blank page.
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub fn create_from_pages(&self, pages: &[&str]) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let lines: Vec<&str> = if pages.is_empty() { vec![""] } else { pages.to_vec() };
        let mut page_ids = Vec::with_capacity(lines.len());
        for line in lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), Object::Integer(12)]),
                    Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                    Operation::new("Tj", vec![Object::string_literal(line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, encode(&content)?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "MediaBox" => media_box(),
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                },
            });
            page_ids.push(page_id);
        }

        let output = self.finish(doc, page_ids)?;
        debug!(output_bytes = output.len(), "Text PDF created");
        Ok(output)
    }

    /// Create a single-page PDF that shows `image_bytes` scaled to the page.
    #[instrument(skip_all, fields(bytes_len = image_bytes.len()))]
    pub fn create_from_image(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let decoded = ::image::load_from_memory(image_bytes).map_err(|err| {
            DokwerkError::Parse(format!("failed to decode image for PDF: {err}"))
        })?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(DokwerkError::Parse("image has no pixels".into()));
        }

        let mut doc = Document::with_version("1.5");
        let mut pixels = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(i64::from(width)),
                "Height" => Object::Integer(i64::from(height)),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
            },
            rgb.into_raw(),
        );
        if let Err(err) = pixels.compress() {
            warn!(%err, "Image stream left uncompressed");
        }
        let image_id = doc.add_object(pixels);

        // Fit inside the page with a 36pt margin, preserving aspect ratio.
        let usable_w = (PAGE_WIDTH - 72) as f32;
        let usable_h = (PAGE_HEIGHT - 72) as f32;
        let scale = (usable_w / width as f32).min(usable_h / height as f32);
        let (draw_w, draw_h) = (width as f32 * scale, height as f32 * scale);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(draw_w),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(draw_h),
                        Object::Real(36.0),
                        Object::Real(PAGE_HEIGHT as f32 - 36.0 - draw_h),
                    ],
                ),
                Operation::new("Do", vec!["Im1".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, encode(&content)?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => media_box(),
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => Object::Reference(image_id) },
            },
        });

        info!(width, height, "Image PDF created");
        self.finish(doc, vec![page_id])
    }

    // -- Rewriting ------------------------------------------------------------

    /// Return `data` with `annotations` appended to each page's /Annots array.
    #[instrument(skip_all, fields(bytes_len = data.len(), annotations = annotations.len()))]
    pub fn embed_annotations(data: &[u8], annotations: &[Annotation]) -> Result<Vec<u8>> {
        let mut doc = load(data)?;
        let pages = doc.get_pages();

        for annotation in annotations {
            let Some(&page_id) = pages.get(&annotation.page) else {
                warn!(page = annotation.page, id = %annotation.id, "Annotation page missing from PDF, skipped");
                continue;
            };
            let annot_id = doc.add_object(annotation_dictionary(annotation));
            let mut annots = existing_annots(&doc, page_id);
            annots.push(Object::Reference(annot_id));
            page_dict_mut(&mut doc, page_id)?.set("Annots", Object::Array(annots));
        }

        save(&mut doc)
    }

    /// Draw `text` diagonally across every page at the given opacity (0..=1).
    #[instrument(skip_all, fields(bytes_len = data.len(), opacity))]
    pub fn stamp_text(data: &[u8], text: &str, opacity: f32) -> Result<Vec<u8>> {
        let opacity = if opacity.is_finite() { opacity.clamp(0.0, 1.0) } else { 0.3 };
        let mut doc = load(data)?;

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let state_id = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => Object::Real(opacity),
            "CA" => Object::Real(opacity),
        });

        // 45 degree rotation, starting near the lower-left of the page.
        let (cos, sin) = (std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("gs", vec![STAMP_STATE.into()]),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![STAMP_FONT.into(), Object::Integer(48)]),
                Operation::new(
                    "Tm",
                    vec![
                        Object::Real(cos),
                        Object::Real(sin),
                        Object::Real(-sin),
                        Object::Real(cos),
                        Object::Integer(120),
                        Object::Integer(200),
                    ],
                ),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ],
        };
        let stamp_id = doc.add_object(Stream::new(dictionary! {}, encode(&content)?));

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for page_id in &pages {
            let mut resources = inherited_resources(&doc, *page_id);
            let mut fonts = nested_dictionary(&doc, &resources, b"Font");
            fonts.set(STAMP_FONT, Object::Reference(font_id));
            let mut states = nested_dictionary(&doc, &resources, b"ExtGState");
            states.set(STAMP_STATE, Object::Reference(state_id));
            resources.set("Font", Object::Dictionary(fonts));
            resources.set("ExtGState", Object::Dictionary(states));

            let contents = match doc.get_dictionary(*page_id).and_then(|page| page.get(b"Contents")) {
                Ok(Object::Array(items)) => {
                    let mut items = items.clone();
                    items.push(Object::Reference(stamp_id));
                    Object::Array(items)
                }
                Ok(existing) => Object::Array(vec![existing.clone(), Object::Reference(stamp_id)]),
                Err(_) => Object::Reference(stamp_id),
            };

            let page = page_dict_mut(&mut doc, *page_id)?;
            page.set("Resources", Object::Dictionary(resources));
            page.set("Contents", contents);
        }

        info!(pages = pages.len(), "Watermark stamped");
        save(&mut doc)
    }

    // -- Helpers --------------------------------------------------------------

    /// Wire up the page tree, catalog and /Info, then serialise.
    fn finish(&self, mut doc: Document, page_ids: Vec<ObjectId>) -> Result<Vec<u8>> {
        let count = page_ids.len() as i64;
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => Object::Integer(count),
        });
        for page_id in &page_ids {
            page_dict_mut(&mut doc, *page_id)?.set("Parent", Object::Reference(pages_id));
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let stamp = chrono::Utc::now().format("D:%Y%m%d%H%M%SZ").to_string();
        let mut info = dictionary! {
            "Producer" => Object::string_literal(concat!("Dokwerk ", env!("CARGO_PKG_VERSION"))),
            "CreationDate" => Object::string_literal(stamp.as_str()),
        };
        if let Some(title) = &self.title {
            info.set("Title", Object::string_literal(title.as_str()));
        }
        if let Some(author) = &self.author {
            info.set("Author", Object::string_literal(author.as_str()));
        }
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", Object::Reference(info_id));

        save(&mut doc)
    }
}

fn load(data: &[u8]) -> Result<Document> {
    Document::load_mem(data)
        .map_err(|err| DokwerkError::Parse(format!("failed to load PDF from memory: {err}")))
}

fn save(doc: &mut Document) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|err| DokwerkError::Parse(format!("failed to serialise PDF: {err}")))?;
    Ok(output)
}

fn encode(content: &Content) -> Result<Vec<u8>> {
    content
        .encode()
        .map_err(|err| DokwerkError::Parse(format!("failed to encode content stream: {err}")))
}

fn media_box() -> Vec<Object> {
    vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Integer(PAGE_WIDTH),
        Object::Integer(PAGE_HEIGHT),
    ]
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|err| DokwerkError::Parse(format!("page {page_id:?} is not a dictionary: {err}")))
}

/// The page's current /Annots entries, following an indirect array.
fn existing_annots(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    match page.get(b"Annots") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Upper bound on /Parent hops, so a cyclic page tree cannot spin forever.
const MAX_TREE_DEPTH: usize = 64;

/// Owned copy of the /Resources in effect for a page: its own, or else the
/// nearest one inherited through the /Parent chain.
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut node_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        match node.get(b"Resources") {
            Ok(Object::Dictionary(dict)) => return dict.clone(),
            Ok(Object::Reference(id)) => return doc.get_dictionary(*id).cloned().unwrap_or_default(),
            _ => {}
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => node_id = parent,
            Err(_) => break,
        }
    }
    Dictionary::new()
}

/// Owned copy of a dictionary nested in `parent`, resolving one reference.
fn nested_dictionary(doc: &Document, parent: &Dictionary, key: &[u8]) -> Dictionary {
    match parent.get(key) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).cloned().unwrap_or_default(),
        _ => Dictionary::new(),
    }
}

/// PDF annotation subtype for an engine annotation kind.
fn subtype(kind: AnnotationType) -> &'static str {
    match kind {
        AnnotationType::Text => "FreeText",
        AnnotationType::Highlight => "Highlight",
        AnnotationType::Underline => "Underline",
        AnnotationType::Strikethrough => "StrikeOut",
        AnnotationType::Note => "Text",
        AnnotationType::Drawing => "Square",
        AnnotationType::Stamp => "Stamp",
        AnnotationType::Link => "Link",
    }
}

fn annotation_dictionary(annotation: &Annotation) -> Dictionary {
    let rect = &annotation.rect;
    let (x1, y1) = (rect.x as f32, rect.y as f32);
    let (x2, y2) = ((rect.x + rect.width) as f32, (rect.y + rect.height) as f32);

    let mut dict = dictionary! {
        "Type" => "Annot",
        "Subtype" => subtype(annotation.kind),
        "Rect" => vec![Object::Real(x1), Object::Real(y1), Object::Real(x2), Object::Real(y2)],
        "Contents" => Object::string_literal(annotation.content.as_str()),
        "NM" => Object::string_literal(annotation.id.as_str()),
    };
    if matches!(
        annotation.kind,
        AnnotationType::Highlight | AnnotationType::Underline | AnnotationType::Strikethrough
    ) {
        dict.set(
            "QuadPoints",
            vec![x1, y2, x2, y2, x1, y1, x2, y1]
                .into_iter()
                .map(Object::Real)
                .collect::<Vec<_>>(),
        );
    }
    if matches!(annotation.kind, AnnotationType::Text) {
        dict.set("DA", Object::string_literal("/Helv 12 Tf 0 g"));
    }
    if let Some(author) = &annotation.author {
        dict.set("T", Object::string_literal(author.as_str()));
    }
    dict
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use dokwerk_core::Rect;

    use crate::formats::pdf::PdfReader;

    fn annotation(page: u32, kind: AnnotationType) -> Annotation {
        Annotation::new(
            page,
            Rect::new(10.0, 10.0, 5.0, 5.0),
            "check this",
            kind,
            Some("reviewer".into()),
        )
    }

    fn annots_on(data: &[u8], page: u32) -> Vec<Dictionary> {
        let doc = Document::load_mem(data).expect("reload");
        let page_id = doc.get_pages()[&page];
        existing_annots(&doc, page_id)
            .into_iter()
            .map(|obj| match obj {
                Object::Reference(id) => doc.get_dictionary(id).expect("annot").clone(),
                other => other.as_dict().expect("inline annot").clone(),
            })
            .collect()
    }

    #[test]
    fn empty_page_list_yields_one_blank_page() {
        let data = PdfWriter::new().create_from_pages(&[]).expect("build");
        assert_eq!(PdfReader::from_bytes(&data).expect("load").page_count(), 1);
    }

    #[test]
    fn annotations_land_on_their_pages() {
        let data = PdfWriter::new()
            .create_from_pages(&["one", "two"])
            .expect("build");
        let notes = vec![
            annotation(2, AnnotationType::Highlight),
            annotation(2, AnnotationType::Note),
            annotation(9, AnnotationType::Note),
        ];
        let saved = PdfWriter::embed_annotations(&data, &notes).expect("embed");

        assert!(annots_on(&saved, 1).is_empty());
        let on_two = annots_on(&saved, 2);
        assert_eq!(on_two.len(), 2);
        assert_eq!(
            on_two[0].get(b"Subtype").and_then(Object::as_name).expect("subtype"),
            b"Highlight"
        );
        assert!(on_two[0].get(b"QuadPoints").is_ok());
        assert_eq!(
            on_two[1].get(b"NM").and_then(Object::as_str).expect("name"),
            notes[1].id.as_str().as_bytes()
        );
    }

    #[test]
    fn stamp_adds_a_content_stream_to_every_page() {
        let data = PdfWriter::new()
            .create_from_pages(&["one", "two", "three"])
            .expect("build");
        let stamped = PdfWriter::stamp_text(&data, "CONFIDENTIAL", 0.3).expect("stamp");

        let doc = Document::load_mem(&stamped).expect("reload");
        for (_, page_id) in doc.get_pages() {
            let page = doc.get_dictionary(page_id).expect("page");
            let contents = page.get(b"Contents").and_then(Object::as_array).expect("array");
            assert_eq!(contents.len(), 2);
            let resources = page.get(b"Resources").and_then(Object::as_dict).expect("resources");
            assert!(resources.get(b"ExtGState").is_ok());
        }
        let text = PdfReader::from_bytes(&stamped).expect("load").text().expect("text");
        assert!(text.contains("CONFIDENTIAL"));
    }

    /// One page whose fonts live on the /Pages node rather than the page.
    fn pdf_with_inherited_font() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), Object::Integer(12)]),
                Operation::new("Tj", vec![Object::string_literal("body text")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode")));
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => media_box(),
            "Contents" => Object::Reference(content_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        save(&mut doc).expect("save")
    }

    #[test]
    fn stamp_keeps_resources_inherited_from_the_page_tree() {
        let stamped = PdfWriter::stamp_text(&pdf_with_inherited_font(), "DRAFT", 0.5).expect("stamp");

        let doc = Document::load_mem(&stamped).expect("reload");
        let page_id = doc.get_pages()[&1];
        let resources = inherited_resources(&doc, page_id);
        let fonts = nested_dictionary(&doc, &resources, b"Font");
        assert!(fonts.get(b"F1").is_ok(), "inherited font was dropped");
        assert!(fonts.get(STAMP_FONT.as_bytes()).is_ok());
        let text = PdfReader::from_bytes(&stamped).expect("load").text().expect("text");
        assert!(text.contains("body text"));
        assert!(text.contains("DRAFT"));
    }

    #[test]
    fn image_becomes_a_single_page() {
        let img = ::image::DynamicImage::ImageRgb8(::image::RgbImage::new(20, 10));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ::image::ImageFormat::Png)
            .expect("encode");
        let data = PdfWriter::new().create_from_image(&png).expect("convert");
        assert_eq!(PdfReader::from_bytes(&data).expect("load").page_count(), 1);
    }

    #[test]
    fn rewriting_garbage_fails_cleanly() {
        assert!(PdfWriter::embed_annotations(b"nope", &[]).is_err());
        assert!(PdfWriter::stamp_text(b"nope", "x", 0.5).is_err());
    }
}
