//! Pdfium-backed document parser and page source.
//!
//! Note: pdfium-render's Pdfium struct is not Send+Sync, so we bind an
//! instance on demand within each operation and keep only the document
//! bytes between calls.

use image::RgbaImage;
use log::{debug, info, warn};
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ViewerError;
use crate::loader::{DocumentParser, PageSource, TextDirection, TextItem};
use crate::source::DocumentSource;

/// Page metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    /// Page number (1-based)
    pub page_number: u32,
    /// Page width in PDF points
    pub width: f32,
    /// Page height in PDF points
    pub height: f32,
}

/// Document metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Total number of pages
    pub page_count: u32,
    /// Document title (if available)
    pub title: Option<String>,
    /// Document author (if available)
    pub author: Option<String>,
    /// PDF version string
    pub pdf_version: String,
}

#[cfg(target_os = "macos")]
const PLATFORM_LIBRARY: &str = "libpdfium.dylib";
#[cfg(target_os = "windows")]
const PLATFORM_LIBRARY: &str = "pdfium.dll";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PLATFORM_LIBRARY: &str = "libpdfium.so";

/// Bind to PDFium library and return a usable Pdfium instance.
/// This is called on-demand for each operation since Pdfium is not Send+Sync.
fn bind_pdfium() -> Result<Pdfium, ViewerError> {
    use std::sync::atomic::{AtomicBool, Ordering};
    static LOGGED_SUCCESS: AtomicBool = AtomicBool::new(false);

    // Explicit override first, then next to the executable, then the system.
    if let Ok(explicit) = std::env::var("PDFIUM_LIBRARY_PATH") {
        match Pdfium::bind_to_library(&explicit) {
            Ok(bindings) => {
                if !LOGGED_SUCCESS.swap(true, Ordering::Relaxed) {
                    info!("Loaded PDFium from PDFIUM_LIBRARY_PATH: {}", explicit);
                }
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => warn!("Failed to bind PDFium at {}: {:?}", explicit, e),
        }
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let bundled = exe_dir.join(PLATFORM_LIBRARY);
            if bundled.exists() {
                match Pdfium::bind_to_library(&bundled) {
                    Ok(bindings) => {
                        if !LOGGED_SUCCESS.swap(true, Ordering::Relaxed) {
                            info!("Loaded bundled PDFium: {:?}", bundled);
                        }
                        return Ok(Pdfium::new(bindings));
                    }
                    Err(e) => warn!("Failed bundled PDFium {:?}: {:?}", bundled, e),
                }
            }
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => {
            if !LOGGED_SUCCESS.swap(true, Ordering::Relaxed) {
                info!("Loaded system PDFium library");
            }
            Ok(Pdfium::new(bindings))
        }
        Err(e) => Err(ViewerError::InitError(format!(
            "could not load the PDFium library ({:?}); set PDFIUM_LIBRARY_PATH",
            e
        ))),
    }
}

/// Parses PDF bytes with PDFium.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumParser;

impl DocumentParser for PdfiumParser {
    type Document = PdfiumDocument;

    async fn parse(&self, source: DocumentSource) -> Result<PdfiumDocument, ViewerError> {
        let description = source.describe();
        let bytes = source.into_bytes().await?;
        let document = PdfiumDocument::from_bytes(bytes)?;
        let info = document.info();
        info!(
            "Parsed {} ({} pages, {})",
            description, info.page_count, info.pdf_version
        );
        if info.title.is_some() || info.author.is_some() {
            info!(
                "Title: {}, author: {}",
                info.title.as_deref().unwrap_or("untitled"),
                info.author.as_deref().unwrap_or("unknown")
            );
        }
        Ok(document)
    }
}

/// A parsed PDF. Holds the raw bytes; PDFium documents borrow from them
/// and are reopened per operation.
pub struct PdfiumDocument {
    bytes: Vec<u8>,
    info: DocumentInfo,
}

/// Page handle: a 0-based index validated against the page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfiumPage {
    index: u16,
}

impl PdfiumDocument {
    /// Parse PDF bytes and read document metadata.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ViewerError> {
        let pdfium = bind_pdfium()?;
        let info = {
            let doc = pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|e| ViewerError::ParseFailure(e.to_string()))?;

            let metadata = doc.metadata();
            let title = metadata
                .get(PdfDocumentMetadataTagType::Title)
                .map(|t| t.value().to_string());
            let author = metadata
                .get(PdfDocumentMetadataTagType::Author)
                .map(|t| t.value().to_string());

            DocumentInfo {
                page_count: doc.pages().len() as u32,
                title,
                author,
                pdf_version: format!("{:?}", doc.version()),
            }
        };
        Ok(Self { bytes, info })
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    /// Page sizes in points, used to lay out placeholders before rendering.
    pub fn page_infos(&self) -> Result<Vec<PageInfo>, ViewerError> {
        let pdfium = bind_pdfium()?;
        let doc = self.open(&pdfium)?;

        let page_count = self.info.page_count;
        let mut infos = Vec::with_capacity(page_count as usize);
        for i in 0..page_count {
            let page = doc
                .pages()
                .get(i as u16)
                .map_err(|_| ViewerError::PageNotFound(i + 1))?;
            infos.push(PageInfo {
                page_number: i + 1,
                width: page.width().value,
                height: page.height().value,
            });
        }
        Ok(infos)
    }

    fn open<'a>(&'a self, pdfium: &'a Pdfium) -> Result<PdfDocument<'a>, ViewerError> {
        pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(|e| ViewerError::ParseFailure(e.to_string()))
    }

    fn render_blocking(&self, handle: PdfiumPage, scale: f32) -> Result<RgbaImage, ViewerError> {
        let page_number = u32::from(handle.index) + 1;
        let pdfium = bind_pdfium()?;
        let doc = self.open(&pdfium)?;
        let page = doc
            .pages()
            .get(handle.index)
            .map_err(|_| ViewerError::PageNotFound(page_number))?;

        let width = (page.width().value * scale).round().max(1.0) as i32;
        let height = (page.height().value * scale).round().max(1.0) as i32;

        // Configure high-quality rendering
        let config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ViewerError::render_failure(page_number, e))?;

        debug!("Rendered page {} at {}x{} (scale {})", page_number, width, height, scale);
        Ok(bitmap.as_image().to_rgba8())
    }

    fn text_blocking(&self, handle: PdfiumPage) -> Result<Vec<TextItem>, ViewerError> {
        let page_number = u32::from(handle.index) + 1;
        let pdfium = bind_pdfium()?;
        let doc = self.open(&pdfium)?;
        let page = doc
            .pages()
            .get(handle.index)
            .map_err(|_| ViewerError::PageNotFound(page_number))?;

        let text_page = page
            .text()
            .map_err(|e| ViewerError::render_failure(page_number, e))?;

        let page_height = page.height().value;
        let mut glyphs = Vec::new();
        for char_obj in text_page.chars().iter() {
            let Some(text) = char_obj.unicode_string() else {
                continue;
            };
            // Skip whitespace characters that don't have meaningful bounds (except space)
            if let Some(c) = text.chars().next() {
                if c.is_whitespace() && c != ' ' {
                    continue;
                }
            }
            if let Ok(rect) = char_obj.tight_bounds() {
                glyphs.push(Glyph {
                    text,
                    x: rect.left().value,
                    // PDF coordinates are bottom-up, convert to top-down
                    y: page_height - rect.top().value,
                    width: rect.width().value,
                    height: rect.height().value,
                });
            }
        }

        Ok(group_into_runs(glyphs))
    }
}

impl PageSource for PdfiumDocument {
    type Page = PdfiumPage;

    fn page_count(&self) -> u32 {
        self.info.page_count
    }

    async fn page(&self, page_number: u32) -> Result<PdfiumPage, ViewerError> {
        if page_number == 0 || page_number > self.info.page_count {
            return Err(ViewerError::PageNotFound(page_number));
        }
        let index =
            u16::try_from(page_number - 1).map_err(|_| ViewerError::PageNotFound(page_number))?;
        Ok(PdfiumPage { index })
    }

    async fn render_page(&self, page: &PdfiumPage, scale: f32) -> Result<RgbaImage, ViewerError> {
        // Let other pending loads register before the blocking render starts.
        tokio::task::yield_now().await;
        self.render_blocking(*page, scale)
    }

    async fn extract_text(&self, page: &PdfiumPage) -> Result<Vec<TextItem>, ViewerError> {
        self.text_blocking(*page)
    }
}

/// One character with its top-down bounds in points.
#[derive(Debug, Clone)]
struct Glyph {
    text: String,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// Merge consecutive glyphs on the same line into text runs.
fn group_into_runs(glyphs: Vec<Glyph>) -> Vec<TextItem> {
    let tolerance = 2.0; // Points tolerance for "same line"
    let mut runs: Vec<TextItem> = Vec::new();
    let mut current: Option<(Glyph, bool)> = None;

    for glyph in glyphs {
        match current.as_mut() {
            Some((run, reversed)) if (glyph.y - run.y).abs() < tolerance => {
                let run_right = run.x + run.width;
                let glyph_right = glyph.x + glyph.width;
                if glyph.x + glyph.width <= run.x {
                    *reversed = true;
                }
                let left = run.x.min(glyph.x);
                run.width = run_right.max(glyph_right) - left;
                run.x = left;
                run.height = run.height.max(glyph.height);
                run.text.push_str(&glyph.text);
            }
            _ => {
                if let Some((run, reversed)) = current.take() {
                    runs.push(to_text_item(run, reversed));
                }
                current = Some((glyph, false));
            }
        }
    }
    if let Some((run, reversed)) = current {
        runs.push(to_text_item(run, reversed));
    }

    runs.retain(|item| !item.text.trim().is_empty());
    runs
}

fn to_text_item(run: Glyph, reversed: bool) -> TextItem {
    TextItem {
        text: run.text,
        transform: [1.0, 0.0, 0.0, 1.0, run.x, run.y],
        width: run.width,
        height: run.height,
        font_name: None,
        direction: if reversed {
            TextDirection::Rtl
        } else {
            TextDirection::Ltr
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(text: &str, x: f32, y: f32) -> Glyph {
        Glyph {
            text: text.to_string(),
            x,
            y,
            width: 10.0,
            height: 12.0,
        }
    }

    #[test]
    fn test_group_into_runs() {
        let glyphs = vec![
            glyph("a", 0.0, 10.0),
            glyph("b", 10.0, 10.0),
            glyph("c", 20.0, 10.0),
            glyph("d", 0.0, 40.0),
        ];

        let runs = group_into_runs(glyphs);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "abc");
        assert_eq!(runs[0].width, 30.0);
        assert_eq!(runs[0].origin(), (0.0, 10.0));
        assert_eq!(runs[1].text, "d");
        assert_eq!(runs[0].direction, TextDirection::Ltr);
    }

    #[test]
    fn right_to_left_runs_are_flagged() {
        let glyphs = vec![glyph("x", 40.0, 5.0), glyph("y", 25.0, 5.0)];
        let runs = group_into_runs(glyphs);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].direction, TextDirection::Rtl);
        assert_eq!(runs[0].origin(), (25.0, 5.0));
        assert_eq!(runs[0].width, 25.0);
    }

    #[test]
    fn whitespace_only_runs_are_dropped() {
        let runs = group_into_runs(vec![glyph(" ", 0.0, 0.0), glyph("z", 0.0, 50.0)]);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "z");
    }
}
