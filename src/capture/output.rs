use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use image::{ImageFormat, Rgb, RgbImage};

use crate::error::ViewerError;
use crate::geometry::Rect;

/// Which path produced a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOrigin {
    /// Composited from the page store's native rasters.
    Native,
    /// Produced by the surface rasterizer.
    Surface,
}

/// An opaque capture of a selection, sized to the selection's display
/// dimensions.
#[derive(Clone)]
pub struct OutputRaster {
    image: RgbImage,
    selection: Rect,
    origin: CaptureOrigin,
    captured_at: DateTime<Utc>,
}

impl OutputRaster {
    pub(crate) fn new(image: RgbImage, selection: Rect, origin: CaptureOrigin) -> Self {
        Self {
            image,
            selection,
            origin,
            captured_at: Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgb<u8> {
        *self.image.get_pixel(x, y)
    }

    /// The selection this raster was captured from, in container space.
    pub fn selection(&self) -> Rect {
        self.selection
    }

    pub fn origin(&self) -> CaptureOrigin {
        self.origin
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, ViewerError> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    /// Encode as a `data:image/png;base64,...` URL.
    pub fn to_data_url(&self) -> Result<String, ViewerError> {
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(self.to_png()?)))
    }

    /// Export file name, e.g. `capture-1700000000000.png`.
    pub fn file_name(&self) -> String {
        format!("capture-{}.png", self.captured_at.timestamp_millis())
    }
}

impl std::fmt::Debug for OutputRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRaster")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("selection", &self.selection)
            .field("origin", &self.origin)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster() -> OutputRaster {
        OutputRaster::new(
            RgbImage::from_pixel(3, 2, Rgb([10, 20, 30])),
            Rect::new(0.0, 0.0, 3.0, 2.0),
            CaptureOrigin::Native,
        )
    }

    #[test]
    fn png_decodes_back_to_the_same_pixels() {
        let out = raster();
        let png = out.to_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded, *out.image());
    }

    #[test]
    fn data_url_has_png_prefix() {
        let url = raster().to_data_url().unwrap();
        assert!(url.starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[test]
    fn file_name_uses_capture_time() {
        let out = raster();
        assert_eq!(
            out.file_name(),
            format!("capture-{}.png", out.captured_at().timestamp_millis())
        );
    }
}
