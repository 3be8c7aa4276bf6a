//! Overlays placed on top of the rendered pages: at most one signature
//! image and any number of text (date) boxes.
//!
//! Every mutation either succeeds completely or leaves the model untouched.

use base64::Engine;
use serde::Serialize;

use crate::error::{AnnotateError, Result};
use crate::geometry::{PageGeometryTable, ViewerPoint, ViewerSize};
use crate::transform::resolve_page;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Opaque PNG payload of a captured signature. Decoding is deferred to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureImage {
    png: Vec<u8>,
}

impl SignatureImage {
    pub fn from_png_bytes(png: Vec<u8>) -> Self {
        Self { png }
    }

    /// Accept the `data:image/png;base64,...` URL a capture canvas produces.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let payload = url.trim().strip_prefix(PNG_DATA_URL_PREFIX).ok_or_else(|| {
            AnnotateError::MissingImagePayload("expected a PNG data URL".to_string())
        })?;
        let png = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| AnnotateError::MissingImagePayload(e.to_string()))?;
        Ok(Self { png })
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignatureOverlay {
    #[serde(skip_serializing)]
    pub image: SignatureImage,
    /// Top-left corner in viewer space
    pub position: ViewerPoint,
    pub size: ViewerSize,
    pub page_index: usize,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextOverlay {
    pub text: String,
    /// Top-left corner in viewer space
    pub position: ViewerPoint,
    pub page_index: usize,
}

/// Inclusive size limits for the signature box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeBounds {
    pub min: ViewerSize,
    pub max: ViewerSize,
}

impl SizeBounds {
    pub fn clamp(&self, size: ViewerSize) -> ViewerSize {
        ViewerSize {
            width: size.width.max(self.min.width).min(self.max.width),
            height: size.height.max(self.min.height).min(self.max.height),
        }
    }
}

/// The overlays of the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayModel {
    signature: Option<SignatureOverlay>,
    texts: Vec<TextOverlay>,
    bounds: SizeBounds,
    default_size: ViewerSize,
}

impl OverlayModel {
    pub fn new(bounds: SizeBounds, default_size: ViewerSize) -> Self {
        Self {
            signature: None,
            texts: Vec::new(),
            bounds,
            default_size: bounds.clamp(default_size),
        }
    }

    pub fn signature(&self) -> Option<&SignatureOverlay> {
        self.signature.as_ref()
    }

    pub fn texts(&self) -> &[TextOverlay] {
        &self.texts
    }

    pub fn is_empty(&self) -> bool {
        self.signature.is_none() && self.texts.is_empty()
    }

    /// Drop every overlay; used when a new document replaces the old one.
    pub fn clear(&mut self) {
        self.signature = None;
        self.texts.clear();
    }

    /// Install a freshly captured signature, replacing any previous one.
    /// It starts at the top-left of the first page with the default size.
    pub fn create_signature(&mut self, image: SignatureImage) {
        self.signature = Some(SignatureOverlay {
            image,
            position: ViewerPoint::default(),
            size: self.default_size,
            page_index: 0,
            visible: true,
        });
    }

    pub fn place_or_move_signature(
        &mut self,
        position: ViewerPoint,
        table: &PageGeometryTable,
    ) -> Result<usize> {
        position.check_finite()?;
        let page_index = resolve_page(position.y, table)?;
        let signature = self.signature.as_mut().ok_or(AnnotateError::NoSignature)?;
        signature.position = position;
        signature.page_index = page_index;
        signature.visible = true;
        Ok(page_index)
    }

    /// Resize the signature, clamped to the configured bounds. Returns the
    /// size actually applied.
    pub fn resize_signature(&mut self, size: ViewerSize) -> Result<ViewerSize> {
        size.check_finite()?;
        let clamped = self.bounds.clamp(size);
        let signature = self.signature.as_mut().ok_or(AnnotateError::NoSignature)?;
        signature.size = clamped;
        Ok(clamped)
    }

    /// Returns the removed overlay, if there was one.
    pub fn remove_signature(&mut self) -> Option<SignatureOverlay> {
        self.signature.take()
    }

    /// Append an empty text overlay and return its index.
    pub fn add_text(&mut self, position: ViewerPoint, table: &PageGeometryTable) -> Result<usize> {
        position.check_finite()?;
        let page_index = resolve_page(position.y, table)?;
        self.texts.push(TextOverlay {
            text: String::new(),
            position,
            page_index,
        });
        Ok(self.texts.len() - 1)
    }

    fn text_mut(&mut self, index: usize) -> Result<&mut TextOverlay> {
        let len = self.texts.len();
        self.texts
            .get_mut(index)
            .ok_or(AnnotateError::OverlayIndex { index, len })
    }

    pub fn move_text(
        &mut self,
        index: usize,
        position: ViewerPoint,
        table: &PageGeometryTable,
    ) -> Result<usize> {
        position.check_finite()?;
        let page_index = resolve_page(position.y, table)?;
        let overlay = self.text_mut(index)?;
        overlay.position = position;
        overlay.page_index = page_index;
        Ok(page_index)
    }

    pub fn edit_text(&mut self, index: usize, text: impl Into<String>) -> Result<()> {
        self.text_mut(index)?.text = text.into();
        Ok(())
    }

    /// Scale every position (and the signature size) by `factor`, keeping
    /// overlays over the same spot of the page after a zoom change.
    pub fn rescale(&mut self, factor: f64, table: &PageGeometryTable) -> Result<()> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(AnnotateError::InvalidZoom(factor));
        }
        let scale = |p: ViewerPoint| ViewerPoint::new(p.x * factor, p.y * factor);
        let signature_page = match &self.signature {
            Some(sig) => Some(resolve_page(scale(sig.position).y, table)?),
            None => None,
        };
        let text_pages = self
            .texts
            .iter()
            .map(|t| resolve_page(scale(t.position).y, table))
            .collect::<Result<Vec<_>>>()?;

        if let (Some(sig), Some(page_index)) = (self.signature.as_mut(), signature_page) {
            sig.position = scale(sig.position);
            sig.size = ViewerSize::new(sig.size.width * factor, sig.size.height * factor);
            sig.page_index = page_index;
        }
        for (text, page_index) in self.texts.iter_mut().zip(text_pages) {
            text.position = scale(text.position);
            text.page_index = page_index;
        }
        Ok(())
    }

    /// Remove overlay `index`. Later overlays shift down by one, so hosts must
    /// re-key their views after a delete.
    pub fn delete_text(&mut self, index: usize) -> Result<TextOverlay> {
        let len = self.texts.len();
        if index >= len {
            return Err(AnnotateError::OverlayIndex { index, len });
        }
        Ok(self.texts.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PageBox;

    fn model() -> OverlayModel {
        OverlayModel::new(
            SizeBounds {
                min: ViewerSize::new(50.0, 25.0),
                max: ViewerSize::new(300.0, 150.0),
            },
            ViewerSize::new(100.0, 50.0),
        )
    }

    fn table() -> PageGeometryTable {
        PageGeometryTable::build(&[PageBox::LETTER, PageBox::LETTER], 1.5, 1.0).unwrap()
    }

    #[test]
    fn test_signature_lifecycle() {
        let table = table();
        let mut overlays = model();
        assert_eq!(
            overlays.place_or_move_signature(ViewerPoint::new(1.0, 1.0), &table),
            Err(AnnotateError::NoSignature)
        );

        overlays.create_signature(SignatureImage::from_png_bytes(vec![1, 2, 3]));
        let sig = overlays.signature().unwrap();
        assert!(sig.visible);
        assert_eq!(sig.size, ViewerSize::new(100.0, 50.0));

        let page = overlays
            .place_or_move_signature(ViewerPoint::new(40.0, 1200.0), &table)
            .unwrap();
        assert_eq!(page, 1);
        assert_eq!(overlays.signature().unwrap().page_index, 1);

        overlays.create_signature(SignatureImage::from_png_bytes(vec![9]));
        let replaced = overlays.signature().unwrap();
        assert_eq!(replaced.image.png_bytes(), &[9]);
        assert_eq!(replaced.position, ViewerPoint::default());

        assert!(overlays.remove_signature().is_some());
        assert!(overlays.signature().is_none());
    }

    #[test]
    fn test_resize_clamps() {
        let mut overlays = model();
        overlays.create_signature(SignatureImage::from_png_bytes(Vec::new()));
        assert_eq!(
            overlays.resize_signature(ViewerSize::new(10.0, 500.0)).unwrap(),
            ViewerSize::new(50.0, 150.0)
        );
        assert_eq!(
            overlays.resize_signature(ViewerSize::new(120.0, 60.0)).unwrap(),
            ViewerSize::new(120.0, 60.0)
        );
    }

    #[test]
    fn test_delete_shifts_indices() {
        let table = table();
        let mut overlays = model();
        for (i, y) in [10.0, 20.0, 30.0].into_iter().enumerate() {
            let index = overlays.add_text(ViewerPoint::new(5.0, y), &table).unwrap();
            overlays.edit_text(index, format!("date {i}")).unwrap();
        }

        let removed = overlays.delete_text(1).unwrap();
        assert_eq!(removed.text, "date 1");

        let texts = overlays.texts();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0].text, "date 0");
        assert_eq!(texts[0].position, ViewerPoint::new(5.0, 10.0));
        assert_eq!(texts[1].text, "date 2");
        assert_eq!(texts[1].position, ViewerPoint::new(5.0, 30.0));
    }

    #[test]
    fn test_edit_does_not_move() {
        let table = table();
        let mut overlays = model();
        let index = overlays.add_text(ViewerPoint::new(50.0, 50.0), &table).unwrap();
        overlays.move_text(index, ViewerPoint::new(70.0, 1300.0), &table).unwrap();
        overlays.edit_text(index, "01-02-2024").unwrap();
        let text = &overlays.texts()[index];
        assert_eq!(text.position, ViewerPoint::new(70.0, 1300.0));
        assert_eq!(text.page_index, 1);
        assert_eq!(text.text, "01-02-2024");
    }

    #[test]
    fn test_bad_index_leaves_model_untouched() {
        let table = table();
        let mut overlays = model();
        overlays.add_text(ViewerPoint::new(0.0, 0.0), &table).unwrap();
        let before = overlays.clone();
        assert_eq!(
            overlays.move_text(3, ViewerPoint::new(1.0, 1.0), &table),
            Err(AnnotateError::OverlayIndex { index: 3, len: 1 })
        );
        assert!(overlays.delete_text(1).is_err());
        assert_eq!(overlays, before);
    }

    #[test]
    fn test_non_finite_input_leaves_model_untouched() {
        let table = table();
        let mut overlays = model();
        overlays.create_signature(SignatureImage::from_png_bytes(Vec::new()));
        overlays.add_text(ViewerPoint::new(5.0, 5.0), &table).unwrap();
        let before = overlays.clone();

        assert!(matches!(
            overlays.place_or_move_signature(ViewerPoint::new(f64::NAN, 100.0), &table),
            Err(AnnotateError::NonFinite { what: "x", .. })
        ));
        assert!(matches!(
            overlays.add_text(ViewerPoint::new(f64::INFINITY, 50.0), &table),
            Err(AnnotateError::NonFinite { what: "x", .. })
        ));
        assert!(matches!(
            overlays.move_text(0, ViewerPoint::new(1.0, f64::NEG_INFINITY), &table),
            Err(AnnotateError::NonFinite { what: "y", .. })
        ));
        assert!(matches!(
            overlays.resize_signature(ViewerSize::new(100.0, f64::NAN)),
            Err(AnnotateError::NonFinite { what: "height", .. })
        ));
        assert!(matches!(
            overlays.rescale(f64::NAN, &table),
            Err(AnnotateError::InvalidZoom(_))
        ));
        assert_eq!(overlays, before);
    }

    #[test]
    fn test_rescale_follows_zoom() {
        let table = table();
        let mut overlays = model();
        overlays.create_signature(SignatureImage::from_png_bytes(Vec::new()));
        overlays
            .place_or_move_signature(ViewerPoint::new(30.0, 1190.0), &table)
            .unwrap();
        overlays.add_text(ViewerPoint::new(10.0, 20.0), &table).unwrap();

        let doubled =
            PageGeometryTable::build(&[PageBox::LETTER, PageBox::LETTER], 3.0, 1.0).unwrap();
        overlays.rescale(2.0, &doubled).unwrap();

        let sig = overlays.signature().unwrap();
        assert_eq!(sig.position, ViewerPoint::new(60.0, 2380.0));
        assert_eq!(sig.size, ViewerSize::new(200.0, 100.0));
        assert_eq!(sig.page_index, 1);
        assert_eq!(overlays.texts()[0].position, ViewerPoint::new(20.0, 40.0));
    }

    #[test]
    fn test_data_url() {
        let image = SignatureImage::from_data_url("data:image/png;base64,AQID").unwrap();
        assert_eq!(image.png_bytes(), &[1, 2, 3]);
        assert!(matches!(
            SignatureImage::from_data_url("data:image/jpeg;base64,AQID"),
            Err(AnnotateError::MissingImagePayload(_))
        ));
        assert!(matches!(
            SignatureImage::from_data_url("data:image/png;base64,@@@"),
            Err(AnnotateError::MissingImagePayload(_))
        ));
    }
}
