//! Tunable settings. Everything has a default; hosts override fields in code
//! or from command-line flags.

use crate::geometry::{ViewerPoint, ViewerSize};

/// File name offered for the exported document.
pub const OUTPUT_FILE_NAME: &str = "signed_document.pdf";

pub const OUTPUT_MIME_TYPE: &str = "application/pdf";

/// Options for the export compositor
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Font size of text overlays in points
    pub font_size: f64,
    /// Compress PDF streams (reduces file size)
    pub compress_streams: bool,
    pub file_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            compress_streams: true,
            file_name: OUTPUT_FILE_NAME.to_string(),
        }
    }
}

/// Session-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatorConfig {
    /// Scale from PDF points to viewer pixels
    pub zoom: f64,
    /// Bitmap sharpness multiplier; never affects viewer coordinates
    pub device_pixel_ratio: f64,
    pub signature_min: ViewerSize,
    pub signature_max: ViewerSize,
    /// Size given to a freshly created signature
    pub signature_default: ViewerSize,
    /// Where "add date" drops a new text overlay
    pub text_anchor: ViewerPoint,
    /// Minimum spacing between applied drag updates
    pub drag_throttle_ms: f64,
    pub export: ExportOptions,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            zoom: 1.5,
            device_pixel_ratio: 1.0,
            signature_min: ViewerSize::new(50.0, 25.0),
            signature_max: ViewerSize::new(300.0, 150.0),
            signature_default: ViewerSize::new(100.0, 50.0),
            text_anchor: ViewerPoint::new(50.0, 50.0),
            drag_throttle_ms: 100.0,
            export: ExportOptions::default(),
        }
    }
}
