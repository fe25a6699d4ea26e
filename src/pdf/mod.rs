//! PDF backend using pdfium-render.
//!
//! This module provides:
//! - On-demand PDFium binding
//! - Page rasterization at an arbitrary scale
//! - Positioned text runs built from per-glyph bounds
//! - Page metadata for laying out placeholders

mod renderer;

pub use renderer::*;
