//! Bakes overlays into a fresh copy of the source PDF.
//!
//! The source bytes are reparsed for every export. Overlays are drawn as
//! ordinary page content (an image XObject for the signature, Helvetica text
//! for the rest) appended after the existing content of their page.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::config::{ExportOptions, OUTPUT_MIME_TYPE};
use crate::error::{AnnotateError, Result};
use crate::geometry::PageGeometryTable;
use crate::overlay::{OverlayModel, SignatureOverlay};
use crate::render::SourceDocument;
use crate::transform::{viewer_rect_to_matrix, viewer_text_matrix};

/// Distance from a text overlay's anchor down to its baseline, in ems.
/// The on-screen text box hangs from its anchor, so the glyphs do too.
pub const TEXT_BASELINE_DROP_EM: f64 = 1.0;

/// Baseline-to-baseline distance of multi-line text, in ems.
pub const TEXT_LINE_HEIGHT_EM: f64 = 1.2;

const FONT_RESOURCE: &str = "SgnHelv";
const IMAGE_RESOURCE: &str = "SgnImg";

/// Result of an export
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub pdf_bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub images_drawn: usize,
    pub texts_drawn: usize,
    /// Overlays that were skipped; the rest of the export still went through
    pub warnings: Vec<AnnotateError>,
}

enum DrawItem {
    Image { xobject: ObjectId, matrix: [f64; 6] },
    Text { matrix: [f64; 6], text: String },
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

/// Write `overlays` into a copy of `source` and serialize it.
///
/// A signature whose payload is not a decodable PNG is skipped and reported
/// in [`ExportReport::warnings`]; text overlays are still drawn.
pub fn export_pdf(
    source: &SourceDocument,
    overlays: &OverlayModel,
    table: &PageGeometryTable,
    options: &ExportOptions,
) -> Result<ExportReport> {
    if table.page_count() != source.page_count() {
        return Err(AnnotateError::GeometryUnavailable);
    }

    let mut doc = Document::load_mem(source.bytes())
        .map_err(|e| AnnotateError::Export(format!("Failed to reload source PDF: {}", e)))?;
    let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();

    let mut draws: BTreeMap<usize, Vec<DrawItem>> = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut images_drawn = 0;

    if let Some(signature) = overlays.signature().filter(|s| s.visible) {
        let placed = viewer_rect_to_matrix(signature.position, signature.size, table)?;
        match embed_signature(&mut doc, signature) {
            Ok(xobject) => {
                tracing::debug!(
                    "signature on page {} with matrix {:?}",
                    placed.page_index + 1,
                    placed.matrix
                );
                draws
                    .entry(placed.page_index)
                    .or_default()
                    .push(DrawItem::Image {
                        xobject,
                        matrix: placed.matrix,
                    });
                images_drawn += 1;
            }
            Err(e) => {
                tracing::warn!("skipping signature: {}", e);
                warnings.push(e);
            }
        }
    }

    let baseline_drop = options.font_size * TEXT_BASELINE_DROP_EM;
    for text in overlays.texts() {
        let placed = viewer_text_matrix(text.position, baseline_drop, table)?;
        tracing::debug!(
            "text {:?} on page {} at ({:.2}, {:.2})",
            text.text,
            placed.page_index + 1,
            placed.matrix[4],
            placed.matrix[5]
        );
        draws
            .entry(placed.page_index)
            .or_default()
            .push(DrawItem::Text {
                matrix: placed.matrix,
                text: text.text.clone(),
            });
    }
    let texts_drawn = overlays.texts().len();

    let font_id = if texts_drawn > 0 {
        Some(doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        }))
    } else {
        None
    };

    for (page_index, items) in draws {
        let page_id = *page_ids
            .get(page_index)
            .ok_or(AnnotateError::GeometryUnavailable)?;
        draw_on_page(&mut doc, page_id, &items, font_id, options.font_size)?;
    }

    if options.compress_streams {
        doc.compress();
    }

    let mut pdf_bytes = Vec::new();
    doc.save_to(&mut pdf_bytes)
        .map_err(|e| AnnotateError::Export(e.to_string()))?;

    tracing::info!(
        "exported {} bytes: {} image(s), {} text(s), {} warning(s)",
        pdf_bytes.len(),
        images_drawn,
        texts_drawn,
        warnings.len()
    );

    Ok(ExportReport {
        pdf_bytes,
        file_name: options.file_name.clone(),
        mime_type: OUTPUT_MIME_TYPE.to_string(),
        images_drawn,
        texts_drawn,
        warnings,
    })
}

/// Decode the signature PNG and add it (plus its soft mask) as an image XObject.
fn embed_signature(doc: &mut Document, signature: &SignatureOverlay) -> Result<ObjectId> {
    let img = image::load_from_memory_with_format(signature.image.png_bytes(), ImageFormat::Png)
        .map_err(|e| AnnotateError::MissingImagePayload(e.to_string()))?;

    let (mut image_stream, smask_stream) = encode_image_streams(&img)?;
    if let Some(smask) = smask_stream {
        let smask_id = doc.add_object(smask);
        image_stream.dict.set("SMask", Object::Reference(smask_id));
    }
    Ok(doc.add_object(image_stream))
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .map_err(|e| AnnotateError::Export(format!("Failed to compress image data: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| AnnotateError::Export(format!("Failed to finish compression: {}", e)))
}

fn image_dict(width: u32, height: u32, color_space: &str) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    }
}

/// Flate-encoded RGB stream, plus a grayscale soft mask when the image has
/// transparency. Both are lossless so thin pen strokes survive.
fn encode_image_streams(img: &DynamicImage) -> Result<(Stream, Option<Stream>)> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb_data = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha_data = Vec::with_capacity((width * height) as usize);
    for chunk in rgba.as_raw().chunks(4) {
        rgb_data.extend_from_slice(&chunk[..3]);
        alpha_data.push(chunk[3]);
    }

    let main = Stream::new(image_dict(width, height, "DeviceRGB"), deflate(&rgb_data)?);
    let smask = if alpha_data.iter().any(|&a| a < 255) {
        Some(Stream::new(
            image_dict(width, height, "DeviceGray"),
            deflate(&alpha_data)?,
        ))
    } else {
        None
    };
    Ok((main, smask))
}

/// Encode one line of text for a WinAnsi-encoded standard font. Characters
/// outside Latin-1 become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

/// Lines of a text box; `\r\n` and `\n` both break.
fn text_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

/// Resolve `obj` to a dictionary, following one reference.
fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d.clone()),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Dictionary(d)) => Some(d.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Effective resources of a page, including ones inherited from the page tree.
fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = doc.get_object(page_id).ok();
    for _ in 0..32 {
        let dict = match current {
            Some(Object::Dictionary(d)) => d,
            _ => break,
        };
        if let Some(resources) = dict.get(b"Resources").ok().and_then(|r| resolve_dict(doc, r)) {
            return resources;
        }
        current = match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => doc.get_object(*parent_id).ok(),
            _ => None,
        };
    }
    Dictionary::new()
}

fn sub_dict(doc: &Document, resources: &Dictionary, key: &[u8]) -> Dictionary {
    resources
        .get(key)
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .unwrap_or_default()
}

/// `base`, or `base` with the smallest numeric suffix not yet used in `dict`.
fn unique_name(dict: &Dictionary, base: &str) -> String {
    if !dict.has(base.as_bytes()) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !dict.has(candidate.as_bytes()))
        .unwrap_or_else(|| base.to_string())
}

fn draw_on_page(
    doc: &mut Document,
    page_id: ObjectId,
    items: &[DrawItem],
    font_id: Option<ObjectId>,
    font_size: f64,
) -> Result<()> {
    let mut resources = page_resources(doc, page_id);
    let mut fonts = sub_dict(doc, &resources, b"Font");
    let mut xobjects = sub_dict(doc, &resources, b"XObject");

    let mut operations = vec![Operation::new("q", vec![])];
    let mut font_name: Option<String> = None;

    for item in items {
        match item {
            DrawItem::Image { xobject, matrix } => {
                let image_name = unique_name(&xobjects, IMAGE_RESOURCE);
                xobjects.set(image_name.as_str(), Object::Reference(*xobject));
                operations.extend([
                    Operation::new("q", vec![]),
                    Operation::new("cm", matrix.iter().copied().map(real).collect()),
                    Operation::new("Do", vec![name(&image_name)]),
                    Operation::new("Q", vec![]),
                ]);
            }
            DrawItem::Text { matrix, text } => {
                let font_ref = font_id.ok_or_else(|| {
                    AnnotateError::Export("text overlay without a font".to_string())
                })?;
                let resource = match &font_name {
                    Some(existing) => existing.clone(),
                    None => {
                        let fresh = unique_name(&fonts, FONT_RESOURCE);
                        fonts.set(fresh.as_str(), Object::Reference(font_ref));
                        font_name = Some(fresh.clone());
                        fresh
                    }
                };
                operations.extend([
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![name(&resource), real(font_size)]),
                    Operation::new("TL", vec![real(font_size * TEXT_LINE_HEIGHT_EM)]),
                    Operation::new("rg", vec![real(0.0), real(0.0), real(0.0)]),
                    Operation::new("Tm", matrix.iter().copied().map(real).collect()),
                ]);
                for (i, line) in text_lines(text).enumerate() {
                    if i > 0 {
                        operations.push(Operation::new("T*", vec![]));
                    }
                    operations.push(Operation::new(
                        "Tj",
                        vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
                    ));
                }
                operations.push(Operation::new("ET", vec![]));
            }
        }
    }
    operations.push(Operation::new("Q", vec![]));

    if !fonts.is_empty() {
        resources.set("Font", Object::Dictionary(fonts));
    }
    if !xobjects.is_empty() {
        resources.set("XObject", Object::Dictionary(xobjects));
    }

    let overlay = Content { operations }
        .encode()
        .map_err(|e| AnnotateError::Export(format!("Failed to encode overlay content: {}", e)))?;
    append_isolated_content(doc, page_id, overlay, resources)
}

/// Existing content references of a page, flattening an indirect array.
fn content_refs(doc: &Document, page: &Dictionary) -> Vec<Object> {
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    }
}

/// Wrap the page's existing content in `q`/`Q` so its graphics state cannot
/// leak into the overlay, then append the overlay stream.
fn append_isolated_content(
    doc: &mut Document,
    page_id: ObjectId,
    overlay: Vec<u8>,
    resources: Dictionary,
) -> Result<()> {
    let existing = match doc.get_object(page_id) {
        Ok(Object::Dictionary(page)) => content_refs(doc, page),
        _ => return Err(AnnotateError::Export(format!("page {:?} is not a dictionary", page_id))),
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    if !existing.is_empty() {
        let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        contents.push(Object::Reference(save_id));
        contents.extend(existing);
        let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"Q\n".to_vec()));
        contents.push(Object::Reference(restore_id));
    }
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));
    contents.push(Object::Reference(overlay_id));

    match doc.get_object_mut(page_id) {
        Ok(Object::Dictionary(page)) => {
            page.set("Contents", Object::Array(contents));
            page.set("Resources", Object::Dictionary(resources));
            Ok(())
        }
        _ => Err(AnnotateError::Export(format!("page {:?} is not a dictionary", page_id))),
    }
}
