//! A signing session: the loaded document, its published geometry and the
//! overlays the user has placed on it.
//!
//! Only the most recently started load may publish. Drag updates go through
//! a trailing throttle whose last value is always applied. Export is guarded
//! against re-entrant triggers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::AnnotatorConfig;
use crate::error::{AnnotateError, Result};
use crate::export::{export_pdf, ExportReport};
use crate::geometry::{PageGeometryTable, ViewerPoint, ViewerSize};
use crate::overlay::{OverlayModel, SignatureImage, SizeBounds};
use crate::render::{DocumentRenderer, LoadedDocument, PageRasterizer};
use crate::throttle::TrailingThrottle;
use crate::transform::{viewer_to_pdf, PdfPlacement};

/// Identifies one load attempt. Becomes stale as soon as a newer load begins.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl LoadTicket {
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.generation
    }
}

/// Shared flag marking an export in flight.
#[derive(Debug, Clone, Default)]
pub struct ExportLatch {
    busy: Arc<AtomicBool>,
}

/// Clears the latch when dropped.
#[derive(Debug)]
pub struct ExportGuard {
    busy: Arc<AtomicBool>,
}

impl ExportLatch {
    pub fn try_begin(&self) -> Result<ExportGuard> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(AnnotateError::ExportInFlight);
        }
        Ok(ExportGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// What a pointer drag is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragTarget {
    Signature,
    Text(usize),
}

fn published(document: &Option<LoadedDocument>) -> Result<&PageGeometryTable> {
    document
        .as_ref()
        .map(|d| &d.geometry)
        .ok_or(AnnotateError::GeometryUnavailable)
}

pub struct Session {
    config: AnnotatorConfig,
    document: Option<LoadedDocument>,
    overlays: OverlayModel,
    generation: Arc<AtomicU64>,
    export_latch: ExportLatch,
    drag: TrailingThrottle<(DragTarget, ViewerPoint)>,
}

impl Session {
    pub fn new(config: AnnotatorConfig) -> Self {
        let overlays = OverlayModel::new(
            SizeBounds {
                min: config.signature_min,
                max: config.signature_max,
            },
            config.signature_default,
        );
        let drag = TrailingThrottle::new(config.drag_throttle_ms);
        Self {
            config,
            document: None,
            overlays,
            generation: Arc::new(AtomicU64::new(0)),
            export_latch: ExportLatch::default(),
            drag,
        }
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&LoadedDocument> {
        self.document.as_ref()
    }

    pub fn overlays(&self) -> &OverlayModel {
        &self.overlays
    }

    /// The published geometry, or `GeometryUnavailable` before the first load.
    pub fn geometry(&self) -> Result<&PageGeometryTable> {
        published(&self.document)
    }

    pub fn export_latch(&self) -> ExportLatch {
        self.export_latch.clone()
    }

    /// Start a new load, superseding any load still in flight.
    pub fn begin_load(&self) -> LoadTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        LoadTicket {
            generation,
            latest: Arc::clone(&self.generation),
        }
    }

    /// Renderer configured with this session's zoom and pixel ratio.
    pub fn renderer(&self) -> DocumentRenderer {
        DocumentRenderer::new(self.config.zoom, self.config.device_pixel_ratio)
    }

    /// Publish a finished load. Returns `false` (and changes nothing) when
    /// `ticket` has been superseded. A successful commit resets all overlays.
    pub fn commit_load(&mut self, ticket: &LoadTicket, loaded: LoadedDocument) -> bool {
        if !ticket.is_current() {
            tracing::warn!("discarding superseded load of {} pages", loaded.geometry.page_count());
            return false;
        }
        self.document = Some(loaded);
        self.overlays.clear();
        self.drag.reset();
        true
    }

    /// Load `bytes` as the new document. On failure the previous document and
    /// overlays are kept.
    pub fn load(&mut self, bytes: &[u8], rasterizer: &mut dyn PageRasterizer) -> Result<()> {
        let ticket = self.begin_load();
        let loaded = self
            .renderer()
            .load(bytes, rasterizer, &|| ticket.is_current())?;
        if self.commit_load(&ticket, loaded) {
            Ok(())
        } else {
            Err(AnnotateError::LoadCancelled)
        }
    }

    /// Re-render the current document at `zoom`, carrying overlays along.
    pub fn set_zoom(&mut self, zoom: f64, rasterizer: &mut dyn PageRasterizer) -> Result<()> {
        self.flush_drag()?;
        let current = self
            .document
            .as_ref()
            .ok_or(AnnotateError::GeometryUnavailable)?;
        let old_zoom = current.geometry.zoom();
        let source = current.source.clone();

        let ticket = self.begin_load();
        let loaded = DocumentRenderer::new(zoom, self.config.device_pixel_ratio).render(
            source,
            rasterizer,
            &|| ticket.is_current(),
        )?;

        let mut overlays = self.overlays.clone();
        overlays.rescale(zoom / old_zoom, &loaded.geometry)?;

        self.config.zoom = zoom;
        self.document = Some(loaded);
        self.overlays = overlays;
        Ok(())
    }

    /// Install a new signature. A held drag of the previous one is dropped.
    pub fn create_signature(&mut self, image: SignatureImage) {
        self.discard_signature_drag();
        self.overlays.create_signature(image);
    }

    pub fn place_signature(&mut self, position: ViewerPoint) -> Result<usize> {
        let table = published(&self.document)?;
        self.overlays.place_or_move_signature(position, table)
    }

    pub fn resize_signature(&mut self, size: ViewerSize) -> Result<ViewerSize> {
        self.overlays.resize_signature(size)
    }

    pub fn remove_signature(&mut self) -> bool {
        self.discard_signature_drag();
        self.overlays.remove_signature().is_some()
    }

    /// Add an empty date/text overlay at the configured default anchor.
    pub fn add_text(&mut self) -> Result<usize> {
        let anchor = self.config.text_anchor;
        self.add_text_at(anchor)
    }

    pub fn add_text_at(&mut self, position: ViewerPoint) -> Result<usize> {
        let table = published(&self.document)?;
        self.overlays.add_text(position, table)
    }

    pub fn move_text(&mut self, index: usize, position: ViewerPoint) -> Result<usize> {
        let table = published(&self.document)?;
        self.overlays.move_text(index, position, table)
    }

    pub fn edit_text(&mut self, index: usize, text: impl Into<String>) -> Result<()> {
        self.overlays.edit_text(index, text)
    }

    pub fn delete_text(&mut self, index: usize) -> Result<()> {
        self.flush_drag()?;
        self.overlays.delete_text(index).map(|_| ())
    }

    /// Where a viewer point lands in PDF space.
    pub fn locate(&self, position: ViewerPoint) -> Result<PdfPlacement> {
        viewer_to_pdf(position, self.geometry()?)
    }

    fn apply_drag(&mut self, target: DragTarget, position: ViewerPoint) -> Result<usize> {
        match target {
            DragTarget::Signature => self.place_signature(position),
            DragTarget::Text(index) => self.move_text(index, position),
        }
    }

    /// Feed one pointer-move event. Returns the resolved page when the update
    /// was applied now, `None` when it is held by the throttle.
    pub fn drag(
        &mut self,
        target: DragTarget,
        position: ViewerPoint,
        now_ms: f64,
    ) -> Result<Option<usize>> {
        if self.drag.pending().is_some_and(|(held, _)| *held != target) {
            self.flush_drag()?;
        }
        match self.drag.push((target, position), now_ms) {
            Some((target, position)) => self.apply_drag(target, position).map(Some),
            None => Ok(None),
        }
    }

    /// Apply a held drag update once its interval has passed.
    pub fn poll_drag(&mut self, now_ms: f64) -> Result<Option<usize>> {
        match self.drag.poll(now_ms) {
            Some((target, position)) => self.apply_drag(target, position).map(Some),
            None => Ok(None),
        }
    }

    /// Apply the last held update of a burst, e.g. on pointer release.
    pub fn end_drag(&mut self) -> Result<Option<usize>> {
        self.flush_drag()
    }

    fn discard_signature_drag(&mut self) {
        if self
            .drag
            .pending()
            .is_some_and(|(target, _)| *target == DragTarget::Signature)
        {
            self.drag.flush();
        }
    }

    fn flush_drag(&mut self) -> Result<Option<usize>> {
        match self.drag.flush() {
            Some((target, position)) => self.apply_drag(target, position).map(Some),
            None => Ok(None),
        }
    }

    /// Export the document with all overlays baked in.
    pub fn export(&mut self) -> Result<ExportReport> {
        let _guard = self.export_latch.try_begin()?;
        self.flush_drag()?;
        let document = self
            .document
            .as_ref()
            .ok_or(AnnotateError::GeometryUnavailable)?;
        export_pdf(
            &document.source,
            &self.overlays,
            &document.geometry,
            &self.config.export,
        )
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(AnnotatorConfig::default())
    }
}
