//! Multi-page region compositing.
//!
//! The selection is mapped onto every laid-out page it overlaps. Each overlap
//! is converted into that page's native raster space and copied into a
//! white output buffer with nearest-neighbour sampling at pixel centres, so
//! two pages that touch share their seam row without overlap or gaps.

use std::sync::Arc;
use std::time::Duration;

use image::{imageops, Rgb, RgbImage, Rgba, RgbaImage};
use log::{debug, info, warn};

use crate::capture::fallback::SurfaceRasterizer;
use crate::capture::output::{CaptureOrigin, OutputRaster};
use crate::config::ViewerConfig;
use crate::error::ViewerError;
use crate::geometry::{clamp_to_bounds, intersect, to_native_space, Point, Rect};
use crate::loader::{PageSource, RenderedPage};
use crate::page_store::PageStore;
use crate::surface::{PageLayoutEntry, SurfaceSnapshot};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Absorbs float error when a sample lands exactly on a source pixel edge.
const SAMPLE_EPSILON: f64 = 1e-9;

/// Largest output buffer the engine will allocate (about 400 MB of RGB).
pub const MAX_OUTPUT_PIXELS: f64 = (1u64 << 27) as f64;

/// Read access to native page rasters.
pub trait RasterLookup {
    fn rendered_page(&self, page_number: u32) -> Option<Arc<RenderedPage>>;
}

impl<D: PageSource> RasterLookup for PageStore<D> {
    fn rendered_page(&self, page_number: u32) -> Option<Arc<RenderedPage>> {
        self.raster(page_number)
    }
}

/// How one page contributes to the output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePlacement {
    /// Destination in output pixels, relative to the selection's top-left.
    pub dest: Rect,
    /// Source region in native raster pixels, clamped to the raster.
    pub source: Rect,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Page box top-left relative to the selection's top-left.
    pub page_offset: Point,
}

/// Work out where a page's raster lands in the output, or `None` when the
/// page does not overlap the selection.
pub fn plan_page(
    display_box: &Rect,
    native_width: u32,
    native_height: u32,
    selection: &Rect,
) -> Option<PagePlacement> {
    if native_width == 0 || native_height == 0 {
        return None;
    }
    let scale_x = display_box.width / f64::from(native_width);
    let scale_y = display_box.height / f64::from(native_height);

    let overlap = intersect(display_box, selection);
    if overlap.is_empty() {
        return None;
    }

    let local = overlap.translate(-display_box.left, -display_box.top);
    let requested = to_native_space(&local, scale_x, scale_y);
    let source = clamp_to_bounds(&requested, f64::from(native_width), f64::from(native_height));
    if source.is_empty() {
        return None;
    }

    // Trim the destination by whatever the clamp cut off the source.
    let dest = Rect::new(
        overlap.left - selection.left + (source.left - requested.left) * scale_x,
        overlap.top - selection.top + (source.top - requested.top) * scale_y,
        source.width * scale_x,
        source.height * scale_y,
    );

    Some(PagePlacement {
        dest,
        source,
        scale_x,
        scale_y,
        page_offset: Point::new(
            display_box.left - selection.left,
            display_box.top - selection.top,
        ),
    })
}

/// Copy a page's pixels into `canvas` according to `placement`.
///
/// An output pixel belongs to the page when its centre lies inside
/// `placement.dest`; its colour is the native pixel under that centre,
/// blended over white.
pub fn blit_page(canvas: &mut RgbImage, raster: &RgbaImage, placement: &PagePlacement) {
    let (x0, x1) = pixel_span(placement.dest.left, placement.dest.right(), canvas.width());
    let (y0, y1) = pixel_span(placement.dest.top, placement.dest.bottom(), canvas.height());
    let max_x = raster.width().saturating_sub(1);
    let max_y = raster.height().saturating_sub(1);

    for oy in y0..y1 {
        let sy = source_index(oy, placement.page_offset.y, placement.scale_y, max_y);
        for ox in x0..x1 {
            let sx = source_index(ox, placement.page_offset.x, placement.scale_x, max_x);
            let pixel = over_white(*raster.get_pixel(sx, sy));
            canvas.put_pixel(ox, oy, pixel);
        }
    }
}

/// Output pixels whose centres fall in `[start, end)`, clipped to `limit`.
fn pixel_span(start: f64, end: f64, limit: u32) -> (u32, u32) {
    let clip = |v: f64| -> u32 {
        if v <= 0.0 {
            0
        } else if v >= f64::from(limit) {
            limit
        } else {
            v as u32
        }
    };
    (clip((start - 0.5).ceil()), clip((end - 0.5).ceil()))
}

fn source_index(output: u32, page_offset: f64, scale: f64, max: u32) -> u32 {
    let native = (f64::from(output) + 0.5 - page_offset) / scale + SAMPLE_EPSILON;
    if native <= 0.0 {
        0
    } else {
        (native.floor() as u32).min(max)
    }
}

fn over_white(Rgba([r, g, b, a]): Rgba<u8>) -> Rgb<u8> {
    if a == 255 {
        return Rgb([r, g, b]);
    }
    let blend = |c: u8| -> u8 {
        let (c, a) = (u32::from(c), u32::from(a));
        ((c * a + 255 * (255 - a) + 127) / 255) as u8
    };
    Rgb([blend(r), blend(g), blend(b)])
}

/// Output dimensions for a selection: rounded, at least one pixel.
pub fn output_size(selection: &Rect) -> (u32, u32) {
    let dim = |v: f64| -> u32 { (v.round().max(1.0)).min(f64::from(u32::MAX)) as u32 };
    (dim(selection.width), dim(selection.height))
}

/// Turns a selection plus page layout into an [`OutputRaster`].
#[derive(Debug, Clone)]
pub struct CaptureEngine {
    drag_threshold: f64,
    placeholder_height: f64,
    fallback_timeout: Duration,
}

impl Default for CaptureEngine {
    fn default() -> Self {
        Self::new(&ViewerConfig::default())
    }
}

impl CaptureEngine {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            drag_threshold: config.drag_threshold,
            placeholder_height: config.placeholder_height,
            fallback_timeout: Duration::from_millis(config.fallback_timeout_ms),
        }
    }

    pub fn drag_threshold(&self) -> f64 {
        self.drag_threshold
    }

    /// `EmptySelection` unless both sides reach the drag threshold, and
    /// `SelectionTooLarge` when the output would not fit in memory.
    pub fn check_selection(&self, selection: &Rect) -> Result<(), ViewerError> {
        if selection.width < self.drag_threshold || selection.height < self.drag_threshold {
            return Err(ViewerError::EmptySelection);
        }
        let (width, height) = (selection.width.round(), selection.height.round());
        if !(width * height).is_finite() || width * height > MAX_OUTPUT_PIXELS {
            return Err(ViewerError::SelectionTooLarge {
                width: selection.width,
                height: selection.height,
            });
        }
        Ok(())
    }

    /// Pages tall enough on screen to have been laid out.
    fn laid_out<'a>(&self, snapshot: &'a SurfaceSnapshot) -> Vec<&'a PageLayoutEntry> {
        snapshot
            .pages
            .iter()
            .filter(|entry| entry.display_box.height >= self.placeholder_height)
            .collect()
    }

    /// Composite the selection from native page rasters.
    ///
    /// Pages without a raster are left white.
    pub fn capture(
        &self,
        rasters: &dyn RasterLookup,
        snapshot: &SurfaceSnapshot,
        selection: &Rect,
    ) -> Result<OutputRaster, ViewerError> {
        self.check_selection(selection)?;

        let pages = self.laid_out(snapshot);
        if pages.is_empty() {
            return Err(ViewerError::NoRenderedPages);
        }

        let (width, height) = output_size(selection);
        let mut canvas = RgbImage::from_pixel(width, height, WHITE);
        let mut contributed = 0;

        for entry in pages {
            let Some(page) = rasters.rendered_page(entry.page_number) else {
                if !intersect(&entry.display_box, selection).is_empty() {
                    warn!(
                        "Page {} overlaps the selection but is not rendered; leaving it blank",
                        entry.page_number
                    );
                }
                continue;
            };

            let Some(placement) = plan_page(
                &entry.display_box,
                page.native_width(),
                page.native_height(),
                selection,
            ) else {
                continue;
            };

            debug!(
                "Page {}: native {:?} -> output {:?} (scale {:.3}x{:.3})",
                entry.page_number, placement.source, placement.dest, placement.scale_x, placement.scale_y
            );
            blit_page(&mut canvas, &page.raster, &placement);
            contributed += 1;
        }

        info!(
            "Captured {}x{} region from {} page(s)",
            width, height, contributed
        );
        Ok(OutputRaster::new(canvas, *selection, CaptureOrigin::Native))
    }

    /// Capture through the surface rasterizer, bounded by the configured
    /// timeout. Used when no page store is available.
    pub async fn capture_from_surface(
        &self,
        rasterizer: &dyn SurfaceRasterizer,
        selection: &Rect,
    ) -> Result<OutputRaster, ViewerError> {
        self.check_selection(selection)?;

        let region = rasterizer.capture_region(*selection);
        let raster = tokio::time::timeout(self.fallback_timeout, region)
            .await
            .map_err(|_| ViewerError::CaptureTimeout(self.fallback_timeout.as_millis() as u64))??;

        let (width, height) = output_size(selection);
        let raster = if raster.dimensions() != (width, height) {
            debug!(
                "Resizing surface capture from {:?} to {}x{}",
                raster.dimensions(),
                width,
                height
            );
            imageops::resize(&raster, width, height, imageops::FilterType::Nearest)
        } else {
            raster
        };

        let canvas = RgbImage::from_fn(width, height, |x, y| over_white(*raster.get_pixel(x, y)));
        info!("Captured {}x{} region from the surface", width, height);
        Ok(OutputRaster::new(canvas, *selection, CaptureOrigin::Surface))
    }
}
