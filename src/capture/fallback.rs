//! Surface rasterizer used when no native page rasters are available.

use std::future::Future;
use std::pin::Pin;

use image::RgbaImage;

use crate::error::ViewerError;
use crate::geometry::Rect;

/// A boxed future polled on the current thread.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Rasterizes a region of the rendered surface directly.
///
/// Implementations fail with [`ViewerError::TaintedCanvas`] when the host
/// refuses to read back the pixels. The call may take arbitrarily long; the
/// capture engine bounds it with a timeout.
pub trait SurfaceRasterizer {
    /// Rasterize `region` (container space) at display resolution.
    fn capture_region(&self, region: Rect) -> LocalBoxFuture<'_, Result<RgbaImage, ViewerError>>;
}
