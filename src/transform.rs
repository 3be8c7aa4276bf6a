//! Mapping between stacked viewer space and per-page PDF user space.
//!
//! Scale factors always come from the recorded [`PageGeometry`]; the Y flip
//! between the two spaces is applied exactly once, here.
//!
//! Between the two sits page-local display space: points measured from the
//! top-left corner of the page as shown, after its `/Rotate`.

use serde::{Deserialize, Serialize};

use crate::error::{AnnotateError, Result};
use crate::geometry::{
    finite, PageGeometry, PageGeometryTable, PdfPoint, PdfSize, ViewerPoint, ViewerSize,
};

/// A point resolved onto a specific page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfPlacement {
    pub page_index: usize,
    pub point: PdfPoint,
}

/// A rectangle on a page, described by its lower-left corner the way PDF
/// drawing operators expect it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfRect {
    pub page_index: usize,
    pub lower_left: PdfPoint,
    pub size: PdfSize,
}

/// An affine matrix `[a b c d e f]` in PDF user space, as taken by the
/// `cm` and `Tm` operators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfMatrix {
    pub page_index: usize,
    pub matrix: [f64; 6],
}

fn nonempty(table: &PageGeometryTable) -> Result<()> {
    if table.is_empty() {
        Err(AnnotateError::GeometryUnavailable)
    } else {
        Ok(())
    }
}

/// Index of the page under viewer Y coordinate `viewer_y`.
///
/// Returns the last page whose top offset is `<= viewer_y`, clamped to the
/// valid range: anything above the first page resolves to page 0 and
/// anything below the last page to the last page. NaN and infinities are
/// rejected with `NonFinite`.
pub fn resolve_page(viewer_y: f64, table: &PageGeometryTable) -> Result<usize> {
    finite("y", viewer_y)?;
    nonempty(table)?;
    let pages = table.pages();
    // Offsets are strictly increasing because every page has positive height.
    let above = pages.partition_point(|p| p.cumulative_viewer_offset_y <= viewer_y);
    Ok(above.saturating_sub(1).min(pages.len() - 1))
}

/// Display point `(a, b)` (points, `b` downward from the top edge) to PDF
/// user space. `/Rotate` turns the page clockwise for display.
fn display_to_pdf(page: &PageGeometry, a: f64, b: f64) -> PdfPoint {
    let (ox, oy) = (page.pdf_origin_x, page.pdf_origin_y);
    let (w, h) = (page.pdf_width, page.pdf_height);
    let (x, y) = match page.rotation {
        90 => (ox + b, oy + a),
        180 => (ox + w - a, oy + b),
        270 => (ox + w - b, oy + h - a),
        _ => (ox + a, oy + h - b),
    };
    PdfPoint { x, y }
}

fn pdf_to_display(page: &PageGeometry, point: PdfPoint) -> (f64, f64) {
    let (dx, dy) = (point.x - page.pdf_origin_x, point.y - page.pdf_origin_y);
    let (w, h) = (page.pdf_width, page.pdf_height);
    match page.rotation {
        90 => (dy, dx),
        180 => (w - dx, dy),
        270 => (h - dy, w - dx),
        _ => (dx, h - dy),
    }
}

/// Page-local display coordinates of a viewer point on `page`.
fn viewer_to_display(page: &PageGeometry, point: ViewerPoint) -> (f64, f64) {
    (
        point.x * page.scale_x(),
        (point.y - page.cumulative_viewer_offset_y) * page.scale_y(),
    )
}

/// Map a viewer point to the page it falls on and its PDF coordinates there.
pub fn viewer_to_pdf(point: ViewerPoint, table: &PageGeometryTable) -> Result<PdfPlacement> {
    point.check_finite()?;
    let page_index = resolve_page(point.y, table)?;
    let page = table.page(page_index)?;
    let (a, b) = viewer_to_display(page, point);
    Ok(PdfPlacement {
        page_index,
        point: display_to_pdf(page, a, b),
    })
}

/// Map a PDF point on `page_index` back to viewer space.
pub fn pdf_to_viewer(
    page_index: usize,
    point: PdfPoint,
    table: &PageGeometryTable,
) -> Result<ViewerPoint> {
    let page = table.page(page_index)?;
    let (a, b) = pdf_to_display(page, point);
    Ok(ViewerPoint {
        x: a / page.scale_x(),
        y: page.cumulative_viewer_offset_y + b / page.scale_y(),
    })
}

/// Inverse of [`viewer_to_pdf`] taking its own output.
pub fn placement_to_viewer(
    placement: PdfPlacement,
    table: &PageGeometryTable,
) -> Result<ViewerPoint> {
    pdf_to_viewer(placement.page_index, placement.point, table)
}

/// Scale a viewer size into points using the scale of `page_index`.
/// X and Y are scaled independently; on pages turned a quarter the result
/// is in unrotated page axes, so width and height swap.
pub fn viewer_size_to_pdf(
    page_index: usize,
    size: ViewerSize,
    table: &PageGeometryTable,
) -> Result<PdfSize> {
    let page = table.page(page_index)?;
    let (width, height) = (size.width * page.scale_x(), size.height * page.scale_y());
    Ok(if page.is_quarter_turn() {
        PdfSize {
            width: height,
            height: width,
        }
    } else {
        PdfSize { width, height }
    })
}

pub fn pdf_size_to_viewer(
    page_index: usize,
    size: PdfSize,
    table: &PageGeometryTable,
) -> Result<ViewerSize> {
    let page = table.page(page_index)?;
    let (width, height) = if page.is_quarter_turn() {
        (size.height, size.width)
    } else {
        (size.width, size.height)
    };
    Ok(ViewerSize {
        width: width / page.scale_x(),
        height: height / page.scale_y(),
    })
}

/// Map a viewer rectangle anchored at its top-left corner onto a page, as
/// the PDF-space box it covers.
///
/// The page is chosen from the anchor alone; a rectangle hanging past the
/// bottom of its page is not split.
pub fn viewer_rect_to_pdf(
    top_left: ViewerPoint,
    size: ViewerSize,
    table: &PageGeometryTable,
) -> Result<PdfRect> {
    let placed = viewer_rect_to_matrix(top_left, size, table)?;
    let [a, b, c, d, e, f] = placed.matrix;
    let xs = [e, e + a, e + c, e + a + c];
    let ys = [f, f + b, f + d, f + b + d];
    let min = |v: [f64; 4]| v.iter().copied().fold(f64::INFINITY, f64::min);
    let max = |v: [f64; 4]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(PdfRect {
        page_index: placed.page_index,
        lower_left: PdfPoint::new(min(xs), min(ys)),
        size: PdfSize {
            width: max(xs) - min(xs),
            height: max(ys) - min(ys),
        },
    })
}

/// Matrix taking the unit square onto a viewer rectangle anchored at its
/// top-left corner, so that an image drawn with it appears upright on the
/// displayed page.
pub fn viewer_rect_to_matrix(
    top_left: ViewerPoint,
    size: ViewerSize,
    table: &PageGeometryTable,
) -> Result<PdfMatrix> {
    top_left.check_finite()?;
    size.check_finite()?;
    let page_index = resolve_page(top_left.y, table)?;
    let page = table.page(page_index)?;
    let (a0, b0) = viewer_to_display(page, top_left);
    let (w, h) = (size.width * page.scale_x(), size.height * page.scale_y());

    let origin = display_to_pdf(page, a0, b0 + h);
    let right = display_to_pdf(page, a0 + w, b0 + h);
    let up = display_to_pdf(page, a0, b0);
    Ok(PdfMatrix {
        page_index,
        matrix: [
            right.x - origin.x,
            right.y - origin.y,
            up.x - origin.x,
            up.y - origin.y,
            origin.x,
            origin.y,
        ],
    })
}

/// Text matrix for a line of text whose baseline starts `drop` points
/// below the viewer anchor, reading left to right on the displayed page.
pub fn viewer_text_matrix(
    anchor: ViewerPoint,
    drop: f64,
    table: &PageGeometryTable,
) -> Result<PdfMatrix> {
    anchor.check_finite()?;
    finite("text offset", drop)?;
    let page_index = resolve_page(anchor.y, table)?;
    let page = table.page(page_index)?;
    let (a0, b0) = viewer_to_display(page, anchor);

    let origin = display_to_pdf(page, a0, b0 + drop);
    let right = display_to_pdf(page, a0 + 1.0, b0 + drop);
    let up = display_to_pdf(page, a0, b0 + drop - 1.0);
    Ok(PdfMatrix {
        page_index,
        matrix: [
            right.x - origin.x,
            right.y - origin.y,
            up.x - origin.x,
            up.y - origin.y,
            origin.x,
            origin.y,
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PageBox;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    fn two_letter_pages() -> PageGeometryTable {
        PageGeometryTable::build(&[PageBox::LETTER, PageBox::LETTER], 1.5, 1.0).unwrap()
    }

    #[test]
    fn test_single_page_anchor() {
        let table = PageGeometryTable::build(&[PageBox::LETTER], 1.5, 1.0).unwrap();
        let placement = viewer_to_pdf(ViewerPoint::new(100.0, 100.0), &table).unwrap();
        assert_eq!(placement.page_index, 0);
        assert!(close(placement.point.x, 66.67));
        assert!(close(placement.point.y, 725.33));
    }

    #[test]
    fn test_drag_onto_second_page() {
        let table = two_letter_pages();
        assert_eq!(resolve_page(1187.9, &table).unwrap(), 0);
        assert_eq!(resolve_page(1188.0, &table).unwrap(), 1);
        assert_eq!(resolve_page(1200.0, &table).unwrap(), 1);

        let placement = viewer_to_pdf(ViewerPoint::new(0.0, 1200.0), &table).unwrap();
        assert_eq!(placement.page_index, 1);
        // 12 viewer px into page two
        assert!(close(placement.point.y, 792.0 - 12.0 / 1.5));
    }

    #[test]
    fn test_resolve_clamps() {
        let table = two_letter_pages();
        assert_eq!(resolve_page(-50.0, &table).unwrap(), 0);
        assert_eq!(resolve_page(1e9, &table).unwrap(), 1);
    }

    #[test]
    fn test_page_origin_is_honoured() {
        let boxes = [PageBox::from_rect([10.0, 20.0, 110.0, 220.0])];
        let table = PageGeometryTable::build(&boxes, 2.0, 1.0).unwrap();
        let placement = viewer_to_pdf(ViewerPoint::new(0.0, 0.0), &table).unwrap();
        assert_eq!(placement.point, PdfPoint::new(10.0, 220.0));
        let back = placement_to_viewer(placement, &table).unwrap();
        assert_eq!(back, ViewerPoint::new(0.0, 0.0));
    }

    #[test]
    fn test_non_uniform_scale() {
        let table = PageGeometryTable::build(&[PageBox::LETTER], 1.0, 1.0).unwrap();
        // pretend the host stretched the page horizontally
        let mut json = serde_json::to_value(&table).unwrap();
        json["pages"][0]["viewer_width"] = serde_json::json!(1224.0);
        let stretched: PageGeometryTable = serde_json::from_value(json).unwrap();

        let size = viewer_size_to_pdf(0, ViewerSize::new(100.0, 100.0), &stretched).unwrap();
        assert!(close(size.width, 50.0));
        assert!(close(size.height, 100.0));
        let back = pdf_size_to_viewer(0, size, &stretched).unwrap();
        assert!(close(back.width, 100.0));
    }

    #[test]
    fn test_rect_hangs_below_anchor() {
        let table = PageGeometryTable::build(&[PageBox::LETTER], 1.5, 1.0).unwrap();
        let rect = viewer_rect_to_pdf(
            ViewerPoint::new(150.0, 300.0),
            ViewerSize::new(150.0, 75.0),
            &table,
        )
        .unwrap();
        assert_eq!(rect.page_index, 0);
        assert!(close(rect.size.width, 100.0));
        assert!(close(rect.size.height, 50.0));
        assert!(close(rect.lower_left.x, 100.0));
        assert!(close(rect.lower_left.y, 792.0 - 200.0 - 50.0));
    }

    fn sideways_letter(rotation: i64) -> PageGeometryTable {
        PageGeometryTable::build(&[PageBox::LETTER.with_rotation(rotation)], 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_rotated_page_corners() {
        // top-left of the displayed page, for each /Rotate
        let expected = [
            (0, PdfPoint::new(0.0, 792.0)),
            (90, PdfPoint::new(0.0, 0.0)),
            (180, PdfPoint::new(612.0, 0.0)),
            (270, PdfPoint::new(612.0, 792.0)),
        ];
        for (rotation, corner) in expected {
            let table = sideways_letter(rotation);
            let placement = viewer_to_pdf(ViewerPoint::new(0.0, 0.0), &table).unwrap();
            assert_eq!(placement.point, corner, "rotation {}", rotation);
        }
    }

    #[test]
    fn test_rotated_page_axes() {
        let table = sideways_letter(90);
        // moving right on screen walks up the unrotated page
        let p = viewer_to_pdf(ViewerPoint::new(100.0, 0.0), &table).unwrap();
        assert_eq!(p.point, PdfPoint::new(0.0, 100.0));
        let p = viewer_to_pdf(ViewerPoint::new(0.0, 50.0), &table).unwrap();
        assert_eq!(p.point, PdfPoint::new(50.0, 0.0));

        let size = viewer_size_to_pdf(0, ViewerSize::new(100.0, 50.0), &table).unwrap();
        assert_eq!((size.width, size.height), (50.0, 100.0));
        let back = pdf_size_to_viewer(0, size, &table).unwrap();
        assert_eq!(back, ViewerSize::new(100.0, 50.0));
    }

    #[test]
    fn test_image_matrix_upright_and_rotated() {
        let flat = PageGeometryTable::build(&[PageBox::LETTER], 1.0, 1.0).unwrap();
        let placed = viewer_rect_to_matrix(
            ViewerPoint::new(10.0, 20.0),
            ViewerSize::new(100.0, 50.0),
            &flat,
        )
        .unwrap();
        assert_eq!(placed.matrix, [100.0, 0.0, 0.0, 50.0, 10.0, 722.0]);

        let placed = viewer_rect_to_matrix(
            ViewerPoint::new(10.0, 20.0),
            ViewerSize::new(100.0, 50.0),
            &sideways_letter(90),
        )
        .unwrap();
        // image x axis runs up the page, its y axis runs left
        assert_eq!(placed.matrix, [0.0, 100.0, -50.0, 0.0, 70.0, 10.0]);

        let rect = viewer_rect_to_pdf(
            ViewerPoint::new(10.0, 20.0),
            ViewerSize::new(100.0, 50.0),
            &sideways_letter(90),
        )
        .unwrap();
        assert_eq!(rect.lower_left, PdfPoint::new(20.0, 10.0));
        assert_eq!((rect.size.width, rect.size.height), (50.0, 100.0));
    }

    #[test]
    fn test_text_matrix_drops_baseline() {
        let flat = PageGeometryTable::build(&[PageBox::LETTER], 1.0, 1.0).unwrap();
        let text = viewer_text_matrix(ViewerPoint::new(10.0, 20.0), 12.0, &flat).unwrap();
        assert_eq!(text.matrix, [1.0, 0.0, 0.0, 1.0, 10.0, 760.0]);

        let text =
            viewer_text_matrix(ViewerPoint::new(10.0, 20.0), 12.0, &sideways_letter(270)).unwrap();
        assert_eq!(text.matrix, [0.0, -1.0, 1.0, 0.0, 580.0, 782.0]);
    }

    #[test]
    fn test_non_finite_input_is_rejected() {
        let table = two_letter_pages();
        assert!(matches!(
            resolve_page(f64::NAN, &table),
            Err(AnnotateError::NonFinite { what: "y", .. })
        ));
        assert!(matches!(
            viewer_to_pdf(ViewerPoint::new(f64::INFINITY, 10.0), &table),
            Err(AnnotateError::NonFinite { what: "x", .. })
        ));
        assert!(matches!(
            viewer_rect_to_matrix(
                ViewerPoint::new(0.0, 0.0),
                ViewerSize::new(f64::NAN, 10.0),
                &table
            ),
            Err(AnnotateError::NonFinite { what: "width", .. })
        ));
    }

    #[test]
    fn test_unavailable_geometry() {
        let empty: PageGeometryTable = serde_json::from_value(serde_json::json!({
            "pages": [],
            "zoom": 1.0,
            "device_pixel_ratio": 1.0
        }))
        .unwrap();
        assert_eq!(
            resolve_page(0.0, &empty),
            Err(AnnotateError::GeometryUnavailable)
        );
        assert_eq!(
            pdf_to_viewer(3, PdfPoint::default(), &two_letter_pages()),
            Err(AnnotateError::GeometryUnavailable)
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::geometry::PageBox;
    use proptest::prelude::*;

    fn page_box() -> impl Strategy<Value = PageBox> {
        (50.0f64..2000.0, 50.0f64..2000.0, 0i64..4)
            .prop_map(|(w, h, quarter)| PageBox::new(w, h).with_rotation(quarter * 90))
    }

    fn table() -> impl Strategy<Value = PageGeometryTable> {
        (prop::collection::vec(page_box(), 1..8), 0.25f64..4.0)
            .prop_map(|(boxes, zoom)| PageGeometryTable::build(&boxes, zoom, 1.0).unwrap())
    }

    proptest! {
        #[test]
        fn round_trip_returns_original_point(
            table in table(),
            fx in 0.0f64..=1.0,
            fy in 0.0f64..1.0,
        ) {
            let point = ViewerPoint::new(
                fx * table.max_viewer_width(),
                fy * table.total_viewer_height(),
            );
            let placement = viewer_to_pdf(point, &table).unwrap();
            let back = placement_to_viewer(placement, &table).unwrap();
            prop_assert!((back.x - point.x).abs() < 1e-6);
            prop_assert!((back.y - point.y).abs() < 1e-6);
        }

        #[test]
        fn resolution_is_monotonic(table in table(), a in -100.0f64..20000.0, b in -100.0f64..20000.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(resolve_page(lo, &table).unwrap() <= resolve_page(hi, &table).unwrap());
        }

        #[test]
        fn page_top_resolves_to_page(table in table()) {
            for (i, page) in table.pages().iter().enumerate() {
                prop_assert_eq!(resolve_page(page.cumulative_viewer_offset_y, &table).unwrap(), i);
            }
        }

        #[test]
        fn pdf_coordinates_ignore_zoom(
            boxes in prop::collection::vec(page_box(), 1..5),
            zoom in 0.25f64..4.0,
            fx in 0.0f64..=1.0,
            fy in 0.0f64..1.0,
        ) {
            let base = PageGeometryTable::build(&boxes, zoom, 1.0).unwrap();
            let doubled = PageGeometryTable::build(&boxes, zoom * 2.0, 1.0).unwrap();
            let point = ViewerPoint::new(
                fx * base.max_viewer_width(),
                fy * base.total_viewer_height(),
            );
            let scaled = ViewerPoint::new(point.x * 2.0, point.y * 2.0);
            let a = viewer_to_pdf(point, &base).unwrap();
            let b = viewer_to_pdf(scaled, &doubled).unwrap();
            prop_assert_eq!(a.page_index, b.page_index);
            prop_assert!((a.point.x - b.point.x).abs() < 1e-6);
            prop_assert!((a.point.y - b.point.y).abs() < 1e-6);
        }
    }
}
