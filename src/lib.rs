// pageshot - incremental page rendering and region capture
//
// Pages of a document are rendered on demand into a per-document store.
// A rectangular selection drawn over the continuously scrolling view can
// span several pages; it is composited from the native page rasters into
// a single PNG.

pub mod capture;
pub mod config;
pub mod error;
pub mod geometry;
pub mod loader;
pub mod page_store;
pub mod pdf;
pub mod selection;
pub mod source;
pub mod surface;
pub mod viewer;

pub mod test_utils;

pub use capture::{
    AssistantRequest, CaptureEngine, DirectoryExport, ExportSink, OutputRaster, SelectionSink,
    SurfaceRasterizer,
};
pub use config::{LoadPolicy, ViewerConfig};
pub use error::ViewerError;
pub use geometry::{Point, Rect};
pub use loader::{DocumentParser, PageSource, RenderedPage, TextItem};
pub use page_store::{PageStatus, PageStore};
pub use selection::{SelectionController, SelectionState};
pub use source::DocumentSource;
pub use surface::{ContinuousSurface, RenderingSurface, SurfaceSnapshot};
pub use viewer::Viewer;
