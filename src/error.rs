//! Error type shared by every stage of the signing pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnnotateError>;

/// Errors raised while loading, manipulating overlays on, or exporting a PDF.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnnotateError {
    /// The input bytes are not a usable PDF.
    #[error("Failed to load PDF: {0}")]
    DocumentLoad(String),

    #[error("Zoom factor and device pixel ratio must be finite and positive, got {0}")]
    InvalidZoom(f64),

    /// A newer load superseded this one before it finished.
    #[error("Document load was superseded by a newer load")]
    LoadCancelled,

    /// Page geometry has not been published yet, or the page index is out of range.
    /// Callers treat this as transient and retry on the next event.
    #[error("Page geometry is not available")]
    GeometryUnavailable,

    #[error("No signature has been created")]
    NoSignature,

    /// A position or size component was NaN or infinite.
    #[error("{what} must be a finite number, got {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Overlay index {index} out of range (have {len})")]
    OverlayIndex { index: usize, len: usize },

    /// The signature payload could not be decoded as a PNG image.
    #[error("Signature image payload is missing or malformed: {0}")]
    MissingImagePayload(String),

    #[error("An export is already in progress")]
    ExportInFlight,

    #[error("Failed to export PDF: {0}")]
    Export(String),
}
