//! PDF Signing Overlay Library
//!
//! Core logic for placing a signature image and date/text boxes over the
//! pages of a PDF shown in a scrolling viewer, and baking them into the
//! document. Shared between CLI and WASM targets.
//!
//! Pages are laid out top to bottom in viewer space at a zoom factor
//! ([`geometry`]); [`transform`] maps any viewer point to a page and a PDF
//! user-space coordinate and back; [`export`] draws the overlays as native
//! page content.

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub mod config;
pub mod date;
pub mod error;
pub mod export;
pub mod geometry;
pub mod overlay;
pub mod render;
pub mod session;
pub mod throttle;
pub mod transform;

pub use config::{AnnotatorConfig, ExportOptions, OUTPUT_FILE_NAME, OUTPUT_MIME_TYPE};
pub use error::{AnnotateError, Result};
pub use export::{export_pdf, ExportReport};
pub use geometry::{
    PageBox, PageGeometry, PageGeometryTable, PdfPoint, PdfSize, ViewerPoint, ViewerSize,
};
pub use overlay::{OverlayModel, SignatureImage, SignatureOverlay, TextOverlay};
pub use render::{
    BlankSurfaceRasterizer, DocumentRenderer, GeometryOnly, LoadedDocument, PageRasterRequest,
    PageRasterizer, SourceDocument,
};
pub use session::{DragTarget, LoadTicket, Session};
pub use transform::{
    pdf_to_viewer, resolve_page, viewer_rect_to_matrix, viewer_text_matrix, viewer_to_pdf,
    PdfMatrix, PdfPlacement, PdfRect,
};

#[cfg(not(target_arch = "wasm32"))]
pub mod file_ops {
    use super::*;
    use std::path::Path;

    /// Overlays to place on a document read from disk, in viewer space at
    /// the session zoom.
    #[derive(Debug, Clone, Default)]
    pub struct SigningPlan {
        pub signature_png: Option<Vec<u8>>,
        pub signature_at: ViewerPoint,
        pub signature_size: Option<ViewerSize>,
        /// (anchor, text) pairs, drawn in order
        pub texts: Vec<(ViewerPoint, String)>,
    }

    /// Read `input_path`, apply `plan` and write the result to `output_path`.
    pub fn sign_pdf_file(
        input_path: &Path,
        output_path: &Path,
        config: AnnotatorConfig,
        plan: &SigningPlan,
    ) -> Result<ExportReport> {
        let bytes = std::fs::read(input_path)
            .map_err(|e| AnnotateError::DocumentLoad(format!("{:?}: {}", input_path, e)))?;

        let mut session = Session::new(config);
        session.load(&bytes, &mut GeometryOnly)?;

        if let Some(png) = &plan.signature_png {
            session.create_signature(SignatureImage::from_png_bytes(png.clone()));
            if let Some(size) = plan.signature_size {
                session.resize_signature(size)?;
            }
            session.place_signature(plan.signature_at)?;
        }

        for (anchor, text) in &plan.texts {
            let index = session.add_text_at(*anchor)?;
            session.edit_text(index, text.as_str())?;
        }

        let report = session.export()?;
        write_atomically(output_path, &report.pdf_bytes)?;
        Ok(report)
    }

    /// Write to a sibling temp file and rename it over `path`, so a failed
    /// write never leaves a truncated PDF behind.
    fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
        let partial = path.with_extension("pdf.part");
        let result = std::fs::write(&partial, bytes).and_then(|_| std::fs::rename(&partial, path));
        if let Err(e) = result {
            let _ = std::fs::remove_file(&partial);
            return Err(AnnotateError::Export(format!("{:?}: {}", path, e)));
        }
        Ok(())
    }
}
