//! WebAssembly bindings for the PDF signer
//!
//! The page bitmaps are drawn by the host (pdf.js) from the geometry JSON
//! returned by `load`; everything else (page resolution, overlay state and
//! export) runs here.

use std::io::{self, Write};

use wasm_bindgen::prelude::*;

use crate::{
    date, pdf_to_viewer, resolve_page, viewer_to_pdf, AnnotatorConfig, DragTarget, GeometryOnly,
    PdfPoint, Session, SignatureImage, ViewerPoint, ViewerSize,
};

/// Buffers one formatted log line and hands it to the browser console.
#[derive(Default)]
struct ConsoleWriter {
    buf: Vec<u8>,
}

impl Write for ConsoleWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buf);
        web_sys::console::log_1(&JsValue::from_str(line.trim_end()));
    }
}

/// Initialize panic hook and console logging
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    let _ = tracing_subscriber::fmt()
        .with_writer(ConsoleWriter::default)
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_ansi(false)
        .try_init();
}

fn js_err(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(js_err)
}

/// Today's date as `dd-MM-yyyy`, from the browser clock
#[wasm_bindgen(js_name = todayDate)]
pub fn today_date() -> Option<String> {
    let now = js_sys::Date::new_0();
    date::format_ymd(
        now.get_full_year() as i32,
        now.get_month() + 1,
        now.get_date(),
    )
}

/// A document plus the signature and text overlays placed on it
#[wasm_bindgen]
pub struct SignerSession {
    inner: Session,
}

#[wasm_bindgen]
impl SignerSession {
    /// Create a session rendering at `zoom` (default 1.5) for a display
    /// with the given device pixel ratio (default 1).
    #[wasm_bindgen(constructor)]
    pub fn new(zoom: Option<f64>, device_pixel_ratio: Option<f64>) -> SignerSession {
        let defaults = AnnotatorConfig::default();
        let config = AnnotatorConfig {
            zoom: zoom.unwrap_or(defaults.zoom),
            device_pixel_ratio: device_pixel_ratio.unwrap_or(defaults.device_pixel_ratio),
            ..defaults
        };
        SignerSession {
            inner: Session::new(config),
        }
    }

    /// Load a PDF, replacing the current document and clearing all overlays.
    ///
    /// Viewer sizes in the table already account for `/Rotate`, matching
    /// the viewport pdf.js produces for the page's own rotation.
    ///
    /// # Returns
    /// The page geometry table as JSON
    pub fn load(&mut self, pdf_bytes: &[u8]) -> Result<String, JsError> {
        self.inner.load(pdf_bytes, &mut GeometryOnly).map_err(js_err)?;
        self.geometry_json()
    }

    /// Re-layout at a new zoom, scaling overlay positions with it.
    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&mut self, zoom: f64) -> Result<String, JsError> {
        self.inner.set_zoom(zoom, &mut GeometryOnly).map_err(js_err)?;
        self.geometry_json()
    }

    #[wasm_bindgen(js_name = geometryJson)]
    pub fn geometry_json(&self) -> Result<String, JsError> {
        to_json(self.inner.geometry().map_err(js_err)?)
    }

    /// Current signature and text overlays as JSON
    #[wasm_bindgen(js_name = overlaysJson)]
    pub fn overlays_json(&self) -> Result<String, JsError> {
        let overlays = self.inner.overlays();
        to_json(&serde_json::json!({
            "signature": overlays.signature(),
            "texts": overlays.texts(),
        }))
    }

    /// Create the signature from a `data:image/png;base64,` URL.
    #[wasm_bindgen(js_name = createSignature)]
    pub fn create_signature(&mut self, data_url: &str) -> Result<(), JsError> {
        let image = SignatureImage::from_data_url(data_url).map_err(js_err)?;
        self.inner.create_signature(image);
        Ok(())
    }

    /// Place or move the signature; returns the page it landed on.
    #[wasm_bindgen(js_name = moveSignature)]
    pub fn move_signature(&mut self, x: f64, y: f64) -> Result<usize, JsError> {
        self.inner
            .place_signature(ViewerPoint::new(x, y))
            .map_err(js_err)
    }

    /// Resize the signature; returns the clamped `[width, height]`.
    #[wasm_bindgen(js_name = resizeSignature)]
    pub fn resize_signature(&mut self, width: f64, height: f64) -> Result<Vec<f64>, JsError> {
        let size = self
            .inner
            .resize_signature(ViewerSize::new(width, height))
            .map_err(js_err)?;
        Ok(vec![size.width, size.height])
    }

    #[wasm_bindgen(js_name = removeSignature)]
    pub fn remove_signature(&mut self) -> bool {
        self.inner.remove_signature()
    }

    /// Add a text overlay at the default anchor (or at `x`, `y`). It starts
    /// empty unless `text` is given; hosts stamp a date with `todayDate()`.
    /// Returns its index.
    #[wasm_bindgen(js_name = addText)]
    pub fn add_text(
        &mut self,
        x: Option<f64>,
        y: Option<f64>,
        text: Option<String>,
    ) -> Result<usize, JsError> {
        let index = match (x, y) {
            (Some(x), Some(y)) => self.inner.add_text_at(ViewerPoint::new(x, y)),
            _ => self.inner.add_text(),
        }
        .map_err(js_err)?;
        if let Some(text) = text {
            self.inner.edit_text(index, text).map_err(js_err)?;
        }
        Ok(index)
    }

    #[wasm_bindgen(js_name = moveText)]
    pub fn move_text(&mut self, index: usize, x: f64, y: f64) -> Result<usize, JsError> {
        self.inner
            .move_text(index, ViewerPoint::new(x, y))
            .map_err(js_err)
    }

    #[wasm_bindgen(js_name = editText)]
    pub fn edit_text(&mut self, index: usize, text: String) -> Result<(), JsError> {
        self.inner.edit_text(index, text).map_err(js_err)
    }

    #[wasm_bindgen(js_name = deleteText)]
    pub fn delete_text(&mut self, index: usize) -> Result<(), JsError> {
        self.inner.delete_text(index).map_err(js_err)
    }

    /// Feed a pointer move for the signature (`text_index` omitted) or a
    /// text overlay. Returns the page when applied now, `undefined` when
    /// throttled.
    pub fn drag(&mut self, text_index: Option<usize>, x: f64, y: f64) -> Result<Option<usize>, JsError> {
        let target = match text_index {
            Some(index) => DragTarget::Text(index),
            None => DragTarget::Signature,
        };
        self.inner
            .drag(target, ViewerPoint::new(x, y), js_sys::Date::now())
            .map_err(js_err)
    }

    #[wasm_bindgen(js_name = pollDrag)]
    pub fn poll_drag(&mut self) -> Result<Option<usize>, JsError> {
        self.inner.poll_drag(js_sys::Date::now()).map_err(js_err)
    }

    #[wasm_bindgen(js_name = endDrag)]
    pub fn end_drag(&mut self) -> Result<Option<usize>, JsError> {
        self.inner.end_drag().map_err(js_err)
    }

    #[wasm_bindgen(js_name = resolvePage)]
    pub fn resolve_page(&self, y: f64) -> Result<usize, JsError> {
        resolve_page(y, self.inner.geometry().map_err(js_err)?).map_err(js_err)
    }

    /// Map a viewer point to `{ page_index, point: { x, y } }` JSON.
    #[wasm_bindgen(js_name = viewerToPdf)]
    pub fn viewer_to_pdf(&self, x: f64, y: f64) -> Result<String, JsError> {
        let table = self.inner.geometry().map_err(js_err)?;
        to_json(&viewer_to_pdf(ViewerPoint::new(x, y), table).map_err(js_err)?)
    }

    /// Map a PDF point on `page_index` back to viewer `[x, y]`.
    #[wasm_bindgen(js_name = pdfToViewer)]
    pub fn pdf_to_viewer(&self, page_index: usize, x: f64, y: f64) -> Result<Vec<f64>, JsError> {
        let table = self.inner.geometry().map_err(js_err)?;
        let point = pdf_to_viewer(page_index, PdfPoint::new(x, y), table).map_err(js_err)?;
        Ok(vec![point.x, point.y])
    }

    /// Bake all overlays into a copy of the document.
    #[wasm_bindgen(js_name = exportPdf)]
    pub fn export_pdf(&mut self) -> Result<ExportResultJs, JsError> {
        let report = self.inner.export().map_err(js_err)?;
        let warnings: Vec<String> = report.warnings.iter().map(|w| w.to_string()).collect();
        Ok(ExportResultJs {
            pdf_bytes: report.pdf_bytes,
            file_name: report.file_name,
            mime_type: report.mime_type,
            images_drawn: report.images_drawn,
            texts_drawn: report.texts_drawn,
            warnings_json: serde_json::to_string(&warnings).unwrap_or_else(|_| "[]".to_string()),
        })
    }
}

/// Exported document with what was drawn into it
#[wasm_bindgen]
pub struct ExportResultJs {
    pdf_bytes: Vec<u8>,
    file_name: String,
    mime_type: String,
    images_drawn: usize,
    texts_drawn: usize,
    warnings_json: String,
}

#[wasm_bindgen]
impl ExportResultJs {
    /// Get the signed PDF bytes
    #[wasm_bindgen(getter)]
    pub fn pdf_bytes(&self) -> Vec<u8> {
        self.pdf_bytes.clone()
    }

    /// Suggested download file name
    #[wasm_bindgen(getter)]
    pub fn file_name(&self) -> String {
        self.file_name.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn mime_type(&self) -> String {
        self.mime_type.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn images_drawn(&self) -> usize {
        self.images_drawn
    }

    #[wasm_bindgen(getter)]
    pub fn texts_drawn(&self) -> usize {
        self.texts_drawn
    }

    /// Overlays that could not be drawn, as a JSON array of messages
    #[wasm_bindgen(getter)]
    pub fn warnings_json(&self) -> String {
        self.warnings_json.clone()
    }
}
