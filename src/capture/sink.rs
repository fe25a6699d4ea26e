//! Destinations for a finished capture.

use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::capture::output::OutputRaster;
use crate::error::ViewerError;
use crate::geometry::Rect;

/// Receives exported PNG files.
pub trait ExportSink {
    /// Store `png` under `file_name`; returns where it ended up.
    fn save(&self, file_name: &str, png: &[u8]) -> Result<PathBuf, ViewerError>;
}

/// Writes exports into a directory, creating it if needed.
#[derive(Debug, Clone)]
pub struct DirectoryExport {
    dir: PathBuf,
}

impl DirectoryExport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for DirectoryExport {
    fn save(&self, file_name: &str, png: &[u8]) -> Result<PathBuf, ViewerError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, png)?;
        info!("Saved capture to {}", path.display());
        Ok(path)
    }
}

/// A capture handed to the assistant, with the region it came from.
#[derive(Debug, Clone)]
pub struct AssistantRequest {
    pub raster: OutputRaster,
    pub selection: Rect,
}

/// Wire form of an [`AssistantRequest`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantPayload {
    pub image_data_url: String,
    pub selection: Rect,
    pub captured_at: String,
}

impl AssistantRequest {
    pub fn to_payload(&self) -> Result<AssistantPayload, ViewerError> {
        Ok(AssistantPayload {
            image_data_url: self.raster.to_data_url()?,
            selection: self.selection,
            captured_at: self.raster.captured_at().to_rfc3339(),
        })
    }
}

/// Receives captures dispatched for the assistant.
pub trait SelectionSink {
    fn on_capture(&self, request: AssistantRequest) -> Result<(), ViewerError>;
}

impl SelectionSink for UnboundedSender<AssistantRequest> {
    fn on_capture(&self, request: AssistantRequest) -> Result<(), ViewerError> {
        self.send(request)
            .map_err(|_| ViewerError::IoError("assistant channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::output::CaptureOrigin;
    use image::{Rgb, RgbImage};

    fn request() -> AssistantRequest {
        let selection = Rect::new(5.0, 6.0, 12.0, 14.0);
        AssistantRequest {
            raster: OutputRaster::new(
                RgbImage::from_pixel(12, 14, Rgb([255, 255, 255])),
                selection,
                CaptureOrigin::Native,
            ),
            selection,
        }
    }

    #[test]
    fn directory_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryExport::new(dir.path().join("captures"));
        let path = sink.save("capture-1.png", b"png").unwrap();
        assert_eq!(path, dir.path().join("captures").join("capture-1.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"png");
    }

    #[test]
    fn channel_sink_delivers_and_reports_closed() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<AssistantRequest>();
        tx.on_capture(request()).unwrap();
        let received = rx.try_recv().unwrap();
        assert_eq!(received.selection, Rect::new(5.0, 6.0, 12.0, 14.0));

        drop(rx);
        assert!(matches!(tx.on_capture(request()), Err(ViewerError::IoError(_))));
    }

    #[test]
    fn payload_serializes_with_camel_case_keys() {
        let json = serde_json::to_value(request().to_payload().unwrap()).unwrap();
        assert!(json["imageDataUrl"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert_eq!(json["selection"]["width"], 12.0);
        assert!(json["capturedAt"].is_string());
    }
}
