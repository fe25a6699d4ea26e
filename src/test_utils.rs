//! In-memory stand-ins for the document engine, surface rasterizer and
//! export sink, shared by unit and integration tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use image::{Rgba, RgbaImage};

use crate::capture::{ExportSink, LocalBoxFuture, SurfaceRasterizer};
use crate::error::ViewerError;
use crate::geometry::Rect;
use crate::loader::{DocumentParser, PageSource, TextDirection, TextItem};
use crate::source::DocumentSource;

/// A raster whose pixel at `(x, y)` is `[x, y, tag, 255]` (coordinates
/// truncated to `u8`), so every pixel of a small page is distinguishable.
pub fn patterned_raster(width: u32, height: u32, tag: u8) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, tag, 255]))
}

/// A document whose pages are fixed rasters.
///
/// Rendering can be made to yield a few times before finishing, which lets
/// tests interleave concurrent loads, and individual pages can be made to
/// fail.
pub struct MemoryDocument {
    pages: Vec<RgbaImage>,
    text: HashMap<u32, Vec<TextItem>>,
    render_yields: usize,
    failing: RefCell<HashSet<u32>>,
    render_calls: RefCell<HashMap<u32, usize>>,
    total_calls: Cell<usize>,
}

impl MemoryDocument {
    pub fn new(pages: Vec<RgbaImage>) -> Self {
        Self {
            pages,
            text: HashMap::new(),
            render_yields: 0,
            failing: RefCell::new(HashSet::new()),
            render_calls: RefCell::new(HashMap::new()),
            total_calls: Cell::new(0),
        }
    }

    /// Pages of the given sizes filled with [`patterned_raster`], tagged
    /// with their page number.
    pub fn with_page_sizes(sizes: &[(u32, u32)]) -> Self {
        Self::new(
            sizes
                .iter()
                .enumerate()
                .map(|(i, &(w, h))| patterned_raster(w, h, i as u8 + 1))
                .collect(),
        )
    }

    pub fn with_render_yields(mut self, yields: usize) -> Self {
        self.render_yields = yields;
        self
    }

    pub fn with_text(mut self, page_number: u32, items: Vec<TextItem>) -> Self {
        self.text.insert(page_number, items);
        self
    }

    /// A left-to-right run with its origin at `(x, y)`.
    pub fn text_item(text: &str, x: f32, y: f32) -> TextItem {
        TextItem {
            text: text.to_string(),
            transform: [1.0, 0.0, 0.0, 1.0, x, y],
            width: text.len() as f32 * 6.0,
            height: 12.0,
            font_name: Some("Helvetica".to_string()),
            direction: TextDirection::Ltr,
        }
    }

    pub fn fail_page(&self, page_number: u32) {
        self.failing.borrow_mut().insert(page_number);
    }

    pub fn heal_page(&self, page_number: u32) {
        self.failing.borrow_mut().remove(&page_number);
    }

    pub fn render_calls(&self, page_number: u32) -> usize {
        self.render_calls
            .borrow()
            .get(&page_number)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_render_calls(&self) -> usize {
        self.total_calls.get()
    }
}

impl PageSource for MemoryDocument {
    type Page = u32;

    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    async fn page(&self, page_number: u32) -> Result<u32, ViewerError> {
        if page_number == 0 || page_number > self.page_count() {
            return Err(ViewerError::PageNotFound(page_number));
        }
        Ok(page_number)
    }

    async fn render_page(&self, page: &u32, _scale: f32) -> Result<RgbaImage, ViewerError> {
        let page_number = *page;
        *self.render_calls.borrow_mut().entry(page_number).or_insert(0) += 1;
        self.total_calls.set(self.total_calls.get() + 1);

        for _ in 0..self.render_yields {
            tokio::task::yield_now().await;
        }

        if self.failing.borrow().contains(&page_number) {
            return Err(ViewerError::render_failure(page_number, "injected failure"));
        }
        (page_number as usize)
            .checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .cloned()
            .ok_or(ViewerError::PageNotFound(page_number))
    }

    async fn extract_text(&self, page: &u32) -> Result<Vec<TextItem>, ViewerError> {
        Ok(self.text.get(page).cloned().unwrap_or_default())
    }
}

/// Parses any non-empty input into a [`MemoryDocument`] with fixed page
/// sizes.
pub struct MemoryParser {
    page_sizes: Vec<(u32, u32)>,
}

impl MemoryParser {
    pub fn new(page_sizes: &[(u32, u32)]) -> Self {
        Self {
            page_sizes: page_sizes.to_vec(),
        }
    }
}

impl DocumentParser for MemoryParser {
    type Document = MemoryDocument;

    async fn parse(&self, source: DocumentSource) -> Result<MemoryDocument, ViewerError> {
        let bytes = source.into_bytes().await?;
        if bytes.is_empty() {
            return Err(ViewerError::ParseFailure("empty document".to_string()));
        }
        Ok(MemoryDocument::with_page_sizes(&self.page_sizes))
    }
}

/// Surface rasterizer that returns a fixed image or a fixed error.
pub struct StaticRasterizer {
    result: Result<RgbaImage, ViewerError>,
    requests: RefCell<Vec<Rect>>,
}

impl StaticRasterizer {
    pub fn solid(color: Rgba<u8>, (width, height): (u32, u32)) -> Self {
        Self {
            result: Ok(RgbaImage::from_pixel(width, height, color)),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn tainted() -> Self {
        Self {
            result: Err(ViewerError::TaintedCanvas),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Rect> {
        self.requests.borrow().clone()
    }
}

impl SurfaceRasterizer for StaticRasterizer {
    fn capture_region(&self, region: Rect) -> LocalBoxFuture<'_, Result<RgbaImage, ViewerError>> {
        self.requests.borrow_mut().push(region);
        let result = self.result.clone();
        Box::pin(async move {
            tokio::task::yield_now().await;
            result
        })
    }
}

/// Export sink that keeps files in memory.
#[derive(Default)]
pub struct MemoryExport {
    files: RefCell<Vec<(String, Vec<u8>)>>,
}

impl MemoryExport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.borrow().clone()
    }
}

impl ExportSink for MemoryExport {
    fn save(&self, file_name: &str, png: &[u8]) -> Result<PathBuf, ViewerError> {
        self.files
            .borrow_mut()
            .push((file_name.to_string(), png.to_vec()));
        Ok(PathBuf::from(file_name))
    }
}
