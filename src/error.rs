//! Error kinds shared by the loader, page store, capture engine and
//! selection controller.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while loading pages or capturing a region.
///
/// Payloads are plain strings so a single failure can be cloned out to
/// every caller waiting on the same page load.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewerError {
    #[error("Failed to initialize PDFium: {0}")]
    InitError(String),

    #[error("Failed to parse document: {0}")]
    ParseFailure(String),

    #[error("Invalid document locator: {0}")]
    InvalidLocator(String),

    #[error("No document loaded")]
    NoDocument,

    #[error("Page not found: {0}")]
    PageNotFound(u32),

    #[error("Rendering page {page} failed: {reason}")]
    PageRenderFailure { page: u32, reason: String },

    #[error("Selection is below the drag threshold")]
    EmptySelection,

    #[error("Selection of {width}x{height} pixels is too large to capture")]
    SelectionTooLarge { width: f64, height: f64 },

    #[error("No rendered pages in view")]
    NoRenderedPages,

    #[error("No active selection")]
    NoActiveSelection,

    #[error("Surface capture refused: canvas is tainted by cross-origin content")]
    TaintedCanvas,

    #[error("Surface capture timed out after {0} ms")]
    CaptureTimeout(u64),

    #[error("Image encoding failed: {0}")]
    ImageError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Background load failed: {0}")]
    BackgroundTaskFailed(String),
}

impl ViewerError {
    pub fn render_failure(page: u32, reason: impl ToString) -> Self {
        Self::PageRenderFailure {
            page,
            reason: reason.to_string(),
        }
    }

    /// True for the precondition failures a UI can recover from by letting
    /// the user try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EmptySelection
                | Self::SelectionTooLarge { .. }
                | Self::NoRenderedPages
                | Self::NoActiveSelection
                | Self::PageRenderFailure { .. }
                | Self::TaintedCanvas
                | Self::CaptureTimeout(_)
        )
    }
}

impl Serialize for ViewerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<std::io::Error> for ViewerError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<image::ImageError> for ViewerError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}
