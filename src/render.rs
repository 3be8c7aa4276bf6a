//! Document loading and page-by-page rasterization.
//!
//! The renderer parses the PDF, reads each page's visible box, hands every
//! page in order to a [`PageRasterizer`] and only publishes the
//! [`PageGeometryTable`] once all pages succeeded.

use std::sync::Arc;

use image::{Rgba, RgbaImage};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{AnnotateError, Result};
use crate::geometry::{PageBox, PageGeometry, PageGeometryTable};

/// Depth limit when walking `Parent` links for inherited page attributes.
const MAX_INHERIT_DEPTH: usize = 32;

/// A parsed source PDF: its original bytes and the box of every page.
///
/// Immutable once loaded. Export always reparses `bytes` so repeated exports
/// never accumulate drawing operations.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    bytes: Arc<[u8]>,
    page_boxes: Vec<PageBox>,
}

impl SourceDocument {
    /// Parse `bytes` and read the visible box of every page.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| AnnotateError::DocumentLoad(e.to_string()))?;

        let page_boxes: Vec<PageBox> = doc
            .get_pages()
            .values()
            .map(|&page_id| page_box(&doc, page_id))
            .collect();

        if page_boxes.is_empty() {
            return Err(AnnotateError::DocumentLoad(
                "document has no pages".to_string(),
            ));
        }

        Ok(Self {
            bytes: Arc::from(bytes),
            page_boxes,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_count(&self) -> usize {
        self.page_boxes.len()
    }

    pub fn page_boxes(&self) -> &[PageBox] {
        &self.page_boxes
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(n) => Some(*n as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn rect_from(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let arr = match obj {
        Object::Array(arr) => arr,
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr,
            _ => return None,
        },
        _ => return None,
    };
    if arr.len() != 4 {
        return None;
    }
    let values: Vec<f64> = arr.iter().filter_map(number).collect();
    match values.as_slice() {
        [a, b, c, d] => Some([*a, *b, *c, *d]),
        _ => None,
    }
}

/// Look `key` up on the page, then on its ancestors, until `read` accepts
/// a value.
fn inherited<T>(
    doc: &Document,
    page: &Dictionary,
    key: &[u8],
    read: impl Fn(&Object) -> Option<T>,
) -> Option<T> {
    let mut dict = page;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Some(value) = dict.get(key).ok().and_then(&read) {
            return Some(value);
        }
        dict = match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => match doc.get_object(*parent_id) {
                Ok(Object::Dictionary(parent)) => parent,
                _ => return None,
            },
            _ => return None,
        };
    }
    None
}

fn integer(doc: &Document, obj: &Object) -> Option<i64> {
    match obj {
        Object::Integer(n) => Some(*n),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Integer(n)) => Some(*n),
            _ => None,
        },
        _ => None,
    }
}

/// Visible box of a page: CropBox when present, otherwise MediaBox,
/// otherwise US Letter, turned by the page's `/Rotate`.
fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let page = match doc.get_object(page_id) {
        Ok(Object::Dictionary(d)) => d,
        _ => return PageBox::LETTER,
    };

    let rect = |obj: &Object| rect_from(doc, obj);
    let rotation = inherited(doc, page, b"Rotate", |obj| integer(doc, obj)).unwrap_or(0);
    inherited(doc, page, b"CropBox", rect)
        .or_else(|| inherited(doc, page, b"MediaBox", rect))
        .map(PageBox::from_rect)
        .filter(|b| b.width > 0.0 && b.height > 0.0)
        .unwrap_or(PageBox::LETTER)
        .with_rotation(rotation)
}

/// One page handed to a rasterizer.
#[derive(Debug, Clone, Copy)]
pub struct PageRasterRequest {
    pub page_index: usize,
    pub geometry: PageGeometry,
    /// Backing bitmap size in device pixels (viewer size times the device
    /// pixel ratio).
    pub bitmap_width: u32,
    pub bitmap_height: u32,
}

/// Produces the bitmap for a page. Called once per page, in page order.
pub trait PageRasterizer {
    fn rasterize(&mut self, source: &SourceDocument, request: &PageRasterRequest) -> Result<()>;
}

/// Records no bitmaps; the host rasterizes from the published table.
#[derive(Debug, Default)]
pub struct GeometryOnly;

impl PageRasterizer for GeometryOnly {
    fn rasterize(&mut self, _source: &SourceDocument, _request: &PageRasterRequest) -> Result<()> {
        Ok(())
    }
}

/// Allocates a white RGBA surface per page at bitmap size.
#[derive(Debug, Default)]
pub struct BlankSurfaceRasterizer {
    pub surfaces: Vec<RgbaImage>,
}

impl PageRasterizer for BlankSurfaceRasterizer {
    fn rasterize(&mut self, _source: &SourceDocument, request: &PageRasterRequest) -> Result<()> {
        self.surfaces.push(RgbaImage::from_pixel(
            request.bitmap_width,
            request.bitmap_height,
            Rgba([255, 255, 255, 255]),
        ));
        Ok(())
    }
}

/// A document whose geometry has been fully built.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub source: SourceDocument,
    pub geometry: PageGeometryTable,
}

/// Loads documents and builds their page geometry.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRenderer {
    pub zoom: f64,
    pub device_pixel_ratio: f64,
}

impl DocumentRenderer {
    pub fn new(zoom: f64, device_pixel_ratio: f64) -> Self {
        Self {
            zoom,
            device_pixel_ratio,
        }
    }

    /// Parse `bytes` and rasterize every page in order.
    ///
    /// `is_current` is polled before each page; once it returns `false` the
    /// load stops with [`AnnotateError::LoadCancelled`] and nothing is
    /// published.
    pub fn load(
        &self,
        bytes: &[u8],
        rasterizer: &mut dyn PageRasterizer,
        is_current: &dyn Fn() -> bool,
    ) -> Result<LoadedDocument> {
        let source = SourceDocument::parse(bytes)?;
        self.render(source, rasterizer, is_current)
    }

    /// Rebuild geometry for an already parsed document, e.g. on zoom change.
    pub fn render(
        &self,
        source: SourceDocument,
        rasterizer: &mut dyn PageRasterizer,
        is_current: &dyn Fn() -> bool,
    ) -> Result<LoadedDocument> {
        let geometry =
            PageGeometryTable::build(source.page_boxes(), self.zoom, self.device_pixel_ratio)?;
        let page_count = geometry.page_count();

        for (page_index, page) in geometry.pages().iter().enumerate() {
            if !is_current() {
                tracing::debug!("load superseded before page {}", page_index + 1);
                return Err(AnnotateError::LoadCancelled);
            }
            let (bitmap_width, bitmap_height) = geometry.bitmap_size(page_index)?;
            let request = PageRasterRequest {
                page_index,
                geometry: *page,
                bitmap_width,
                bitmap_height,
            };
            rasterizer.rasterize(&source, &request)?;
            tracing::debug!(
                "rendered page {}/{}: {:.1}x{:.1} pt -> {}x{} px",
                page_index + 1,
                page_count,
                page.pdf_width,
                page.pdf_height,
                bitmap_width,
                bitmap_height
            );
        }

        if !is_current() {
            return Err(AnnotateError::LoadCancelled);
        }

        tracing::info!(
            "loaded {} pages at zoom {} ({:.0} px tall)",
            page_count,
            self.zoom,
            geometry.total_viewer_height()
        );
        Ok(LoadedDocument { source, geometry })
    }
}
