//! Document loader contract.
//!
//! The page store never talks to a parsing engine directly. It renders
//! through a [`PageSource`] produced by a [`DocumentParser`], which lets the
//! pdfium backend be swapped for an in-memory one in tests.

use std::future::Future;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::ViewerError;
use crate::source::DocumentSource;

/// Writing direction of a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    #[default]
    Ltr,
    Rtl,
    Ttb,
}

/// A positioned run of text on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub text: String,
    /// Affine transform `[a, b, c, d, e, f]`; `e`/`f` is the run origin in
    /// page points with a top-left origin.
    pub transform: [f32; 6],
    pub width: f32,
    pub height: f32,
    pub font_name: Option<String>,
    pub direction: TextDirection,
}

impl TextItem {
    pub fn origin(&self) -> (f32, f32) {
        (self.transform[4], self.transform[5])
    }
}

/// Everything the page store keeps for a loaded page.
#[derive(Clone)]
pub struct RenderedPage {
    /// 1-based page number.
    pub page_number: u32,
    /// Raster at the store's fixed render scale.
    pub raster: RgbaImage,
    pub text_items: Vec<TextItem>,
    /// Scale the raster was rendered at.
    pub render_scale: f32,
}

impl RenderedPage {
    pub fn native_width(&self) -> u32 {
        self.raster.width()
    }

    pub fn native_height(&self) -> u32 {
        self.raster.height()
    }
}

impl std::fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedPage")
            .field("page_number", &self.page_number)
            .field("native_width", &self.native_width())
            .field("native_height", &self.native_height())
            .field("render_scale", &self.render_scale)
            .field("text_items_count", &self.text_items.len())
            .finish_non_exhaustive()
    }
}

/// A parsed document that can render its pages.
///
/// Futures returned here are polled on a single thread, so implementations
/// need not be `Send`.
pub trait PageSource {
    /// Engine-specific handle for one page.
    type Page;

    fn page_count(&self) -> u32;

    /// Resolve a 1-based page number. Fails with [`ViewerError::PageNotFound`].
    fn page(&self, page_number: u32) -> impl Future<Output = Result<Self::Page, ViewerError>>;

    /// Rasterize a page at `scale` (1.0 = 72 DPI).
    fn render_page(
        &self,
        page: &Self::Page,
        scale: f32,
    ) -> impl Future<Output = Result<RgbaImage, ViewerError>>;

    /// Extract positioned text runs in reading order.
    fn extract_text(
        &self,
        page: &Self::Page,
    ) -> impl Future<Output = Result<Vec<TextItem>, ViewerError>>;
}

/// Turns bytes or a locator into a [`PageSource`].
pub trait DocumentParser {
    type Document: PageSource;

    /// Parse a document. Fails with [`ViewerError::ParseFailure`].
    fn parse(
        &self,
        source: DocumentSource,
    ) -> impl Future<Output = Result<Self::Document, ViewerError>>;
}

/// Render one page completely: resolve the handle, rasterize, extract text.
pub async fn render_full_page<D: PageSource>(
    document: &D,
    page_number: u32,
    scale: f32,
) -> Result<RenderedPage, ViewerError> {
    let page = document.page(page_number).await?;
    let raster = document
        .render_page(&page, scale)
        .await
        .map_err(|e| as_render_failure(page_number, e))?;
    let text_items = document
        .extract_text(&page)
        .await
        .map_err(|e| as_render_failure(page_number, e))?;

    Ok(RenderedPage {
        page_number,
        raster,
        text_items,
        render_scale: scale,
    })
}

fn as_render_failure(page_number: u32, err: ViewerError) -> ViewerError {
    match err {
        ViewerError::PageRenderFailure { .. } => err,
        other => ViewerError::render_failure(page_number, other),
    }
}
