//! Page geometry: PDF page sizes in points and their rendered sizes in
//! viewer pixels, stacked vertically.
//!
//! Viewer space has its origin at the top-left of the first page with Y
//! increasing downward. Pages follow each other with no gap. PDF space is
//! per page, origin bottom-left, Y increasing upward.

use serde::{Deserialize, Serialize};

use crate::error::{AnnotateError, Result};

/// A point in viewer space (CSS pixels at the active zoom).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewerPoint {
    pub x: f64,
    pub y: f64,
}

impl ViewerPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// `NonFinite` if either coordinate is NaN or infinite.
    pub fn check_finite(&self) -> Result<()> {
        finite("x", self.x)?;
        finite("y", self.y)
    }
}

/// A size in viewer space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewerSize {
    pub width: f64,
    pub height: f64,
}

impl ViewerSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn check_finite(&self) -> Result<()> {
        finite("width", self.width)?;
        finite("height", self.height)
    }
}

pub(crate) fn finite(what: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AnnotateError::NonFinite { what, value })
    }
}

/// A point in the user space of a single PDF page (points).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfPoint {
    pub x: f64,
    pub y: f64,
}

impl PdfPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A size in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfSize {
    pub width: f64,
    pub height: f64,
}

/// The visible box of a page in PDF points.
///
/// `origin_x`/`origin_y` are the lower-left corner of the box, which is
/// `(0, 0)` for almost every real document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBox {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
    /// Clockwise display rotation in degrees: 0, 90, 180 or 270.
    #[serde(default)]
    pub rotation: u16,
}

impl PageBox {
    /// US Letter, used when a page declares no usable box.
    pub const LETTER: PageBox = PageBox {
        origin_x: 0.0,
        origin_y: 0.0,
        width: 612.0,
        height: 792.0,
        rotation: 0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            width,
            height,
            rotation: 0,
        }
    }

    /// Build from a PDF rectangle `[llx lly urx ury]`, whose corners may be
    /// given in any order.
    pub fn from_rect(rect: [f64; 4]) -> Self {
        let [x0, y0, x1, y1] = rect;
        Self {
            origin_x: x0.min(x1),
            origin_y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
            rotation: 0,
        }
    }

    /// Apply a `/Rotate` value. Anything that is not a multiple of 90 is
    /// treated as no rotation, the way viewers do.
    pub fn with_rotation(self, degrees: i64) -> Self {
        let rotation = if degrees % 90 == 0 {
            degrees.rem_euclid(360) as u16
        } else {
            0
        };
        Self { rotation, ..self }
    }

    /// True when the page is displayed on its side (90 or 270 degrees).
    pub fn is_quarter_turn(&self) -> bool {
        self.rotation % 180 == 90
    }

    /// Width as displayed, after rotation.
    pub fn display_width(&self) -> f64 {
        if self.is_quarter_turn() {
            self.height
        } else {
            self.width
        }
    }

    pub fn display_height(&self) -> f64 {
        if self.is_quarter_turn() {
            self.width
        } else {
            self.height
        }
    }
}

/// Geometry of one page, in both coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub pdf_width: f64,
    pub pdf_height: f64,
    pub pdf_origin_x: f64,
    pub pdf_origin_y: f64,
    pub viewer_width: f64,
    pub viewer_height: f64,
    /// Sum of the viewer heights of every preceding page.
    pub cumulative_viewer_offset_y: f64,
    /// Clockwise display rotation in degrees: 0, 90, 180 or 270.
    #[serde(default)]
    pub rotation: u16,
}

impl PageGeometry {
    pub fn is_quarter_turn(&self) -> bool {
        self.rotation % 180 == 90
    }

    /// Page width as displayed, in points.
    pub fn display_width(&self) -> f64 {
        if self.is_quarter_turn() {
            self.pdf_height
        } else {
            self.pdf_width
        }
    }

    pub fn display_height(&self) -> f64 {
        if self.is_quarter_turn() {
            self.pdf_width
        } else {
            self.pdf_height
        }
    }

    /// Horizontal scale, displayed points per viewer pixel.
    pub fn scale_x(&self) -> f64 {
        self.display_width() / self.viewer_width
    }

    /// Vertical scale, displayed points per viewer pixel.
    pub fn scale_y(&self) -> f64 {
        self.display_height() / self.viewer_height
    }

    /// Viewer Y of the bottom edge of this page (exclusive).
    pub fn viewer_bottom(&self) -> f64 {
        self.cumulative_viewer_offset_y + self.viewer_height
    }
}

/// Ordered geometry of every page of a loaded document at one zoom factor.
///
/// Built once per load or zoom change and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageGeometryTable {
    pages: Vec<PageGeometry>,
    zoom: f64,
    device_pixel_ratio: f64,
}

fn check_factor(value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnnotateError::InvalidZoom(value))
    }
}

impl PageGeometryTable {
    /// Lay out `boxes` top to bottom at `zoom`.
    ///
    /// `device_pixel_ratio` only affects [`bitmap_size`](Self::bitmap_size);
    /// viewer coordinates are logical pixels.
    pub fn build(boxes: &[PageBox], zoom: f64, device_pixel_ratio: f64) -> Result<Self> {
        check_factor(zoom)?;
        check_factor(device_pixel_ratio)?;
        if boxes.is_empty() {
            return Err(AnnotateError::DocumentLoad(
                "document has no pages".to_string(),
            ));
        }

        let mut pages = Vec::with_capacity(boxes.len());
        let mut offset = 0.0;
        for (index, page_box) in boxes.iter().enumerate() {
            if !(page_box.width > 0.0 && page_box.height > 0.0) {
                return Err(AnnotateError::DocumentLoad(format!(
                    "page {} has an empty page box ({} x {})",
                    index + 1,
                    page_box.width,
                    page_box.height
                )));
            }
            let geometry = PageGeometry {
                pdf_width: page_box.width,
                pdf_height: page_box.height,
                pdf_origin_x: page_box.origin_x,
                pdf_origin_y: page_box.origin_y,
                viewer_width: page_box.display_width() * zoom,
                viewer_height: page_box.display_height() * zoom,
                cumulative_viewer_offset_y: offset,
                rotation: page_box.rotation,
            };
            offset += geometry.viewer_height;
            pages.push(geometry);
        }

        Ok(Self {
            pages,
            zoom,
            device_pixel_ratio,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    pub fn pages(&self) -> &[PageGeometry] {
        &self.pages
    }

    /// Geometry of page `index`, or `GeometryUnavailable` when out of range.
    pub fn page(&self, index: usize) -> Result<&PageGeometry> {
        self.pages
            .get(index)
            .ok_or(AnnotateError::GeometryUnavailable)
    }

    /// Height of the whole stacked document in viewer pixels.
    pub fn total_viewer_height(&self) -> f64 {
        self.pages.last().map(|p| p.viewer_bottom()).unwrap_or(0.0)
    }

    /// Widest page in viewer pixels; hosts size the scroll container with it.
    pub fn max_viewer_width(&self) -> f64 {
        self.pages
            .iter()
            .map(|p| p.viewer_width)
            .fold(0.0, f64::max)
    }

    /// Pixel dimensions of the backing bitmap for page `index`.
    pub fn bitmap_size(&self, index: usize) -> Result<(u32, u32)> {
        let page = self.page(index)?;
        Ok((
            (page.viewer_width * self.device_pixel_ratio).round().max(1.0) as u32,
            (page.viewer_height * self.device_pixel_ratio).round().max(1.0) as u32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_accumulate() {
        let boxes = [
            PageBox::new(612.0, 792.0),
            PageBox::new(612.0, 400.0),
            PageBox::new(300.0, 500.0),
        ];
        let table = PageGeometryTable::build(&boxes, 2.0, 1.0).unwrap();
        let offsets: Vec<f64> = table
            .pages()
            .iter()
            .map(|p| p.cumulative_viewer_offset_y)
            .collect();
        assert_eq!(offsets, vec![0.0, 1584.0, 2384.0]);
        assert_eq!(table.total_viewer_height(), 3384.0);
        assert_eq!(table.max_viewer_width(), 1224.0);
    }

    #[test]
    fn test_letter_at_one_and_a_half() {
        let table = PageGeometryTable::build(&[PageBox::LETTER], 1.5, 1.0).unwrap();
        let page = table.page(0).unwrap();
        assert_eq!(page.viewer_width, 918.0);
        assert_eq!(page.viewer_height, 1188.0);
    }

    #[test]
    fn test_device_pixel_ratio_only_affects_bitmap() {
        let sharp = PageGeometryTable::build(&[PageBox::LETTER], 1.5, 2.0).unwrap();
        let plain = PageGeometryTable::build(&[PageBox::LETTER], 1.5, 1.0).unwrap();
        assert_eq!(sharp.pages(), plain.pages());
        assert_eq!(sharp.bitmap_size(0).unwrap(), (1836, 2376));
        assert_eq!(plain.bitmap_size(0).unwrap(), (918, 1188));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(
            PageGeometryTable::build(&[PageBox::LETTER], 0.0, 1.0),
            Err(AnnotateError::InvalidZoom(0.0))
        );
        assert!(matches!(
            PageGeometryTable::build(&[PageBox::LETTER], f64::NAN, 1.0),
            Err(AnnotateError::InvalidZoom(_))
        ));
        assert!(matches!(
            PageGeometryTable::build(&[], 1.0, 1.0),
            Err(AnnotateError::DocumentLoad(_))
        ));
        assert!(matches!(
            PageGeometryTable::build(&[PageBox::new(612.0, 0.0)], 1.0, 1.0),
            Err(AnnotateError::DocumentLoad(_))
        ));
    }

    #[test]
    fn test_page_box_from_reversed_rect() {
        let b = PageBox::from_rect([612.0, 792.0, 0.0, 0.0]);
        assert_eq!(b, PageBox::LETTER);
    }

    #[test]
    fn test_quarter_turn_swaps_viewer_size() {
        let boxes = [PageBox::LETTER.with_rotation(90), PageBox::LETTER.with_rotation(-180)];
        let table = PageGeometryTable::build(&boxes, 1.0, 1.0).unwrap();
        let sideways = table.page(0).unwrap();
        assert_eq!(sideways.rotation, 90);
        assert_eq!((sideways.viewer_width, sideways.viewer_height), (792.0, 612.0));
        assert_eq!((sideways.pdf_width, sideways.pdf_height), (612.0, 792.0));
        let upside_down = table.page(1).unwrap();
        assert_eq!(upside_down.rotation, 180);
        assert_eq!(upside_down.cumulative_viewer_offset_y, 612.0);
        assert_eq!(upside_down.viewer_height, 792.0);
    }

    #[test]
    fn test_odd_rotation_is_ignored() {
        assert_eq!(PageBox::LETTER.with_rotation(45).rotation, 0);
        assert_eq!(PageBox::LETTER.with_rotation(450).rotation, 90);
    }

    #[test]
    fn test_non_finite_point() {
        assert!(matches!(
            ViewerPoint::new(f64::NAN, 1.0).check_finite(),
            Err(AnnotateError::NonFinite { what: "x", .. })
        ));
        assert!(ViewerSize::new(10.0, f64::INFINITY).check_finite().is_err());
        assert!(ViewerPoint::new(-5.0, 1e9).check_finite().is_ok());
    }

    #[test]
    fn test_page_out_of_range() {
        let table = PageGeometryTable::build(&[PageBox::LETTER], 1.0, 1.0).unwrap();
        assert_eq!(table.page(1), Err(AnnotateError::GeometryUnavailable));
    }
}
