//! Viewer operations exposed to the UI shell.
//!
//! The viewer owns the page store for the open document, the selection
//! controller and the local executor that runs prefetch and eager loads.
//! Background loads advance while a viewer future is being awaited, or
//! inside [`Viewer::drive_background`]. Closing the document drops that
//! executor and every load still queued on it.

use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use log::{error, info};
use tokio::task::{JoinHandle, LocalSet};

use crate::capture::{
    AssistantRequest, CaptureEngine, ExportSink, OutputRaster, SelectionSink, SurfaceRasterizer,
};
use crate::config::{LoadPolicy, ViewerConfig};
use crate::error::ViewerError;
use crate::geometry::{Point, Rect};
use crate::loader::{DocumentParser, PageSource, RenderedPage};
use crate::page_store::PageStore;
use crate::selection::{SelectionController, SelectionState};
use crate::source::DocumentSource;
use crate::surface::{RenderingSurface, SurfaceSnapshot};

pub struct Viewer<D: PageSource + 'static> {
    config: ViewerConfig,
    store: Option<Rc<PageStore<D>>>,
    source_name: Option<String>,
    controller: SelectionController,
    engine: CaptureEngine,
    fallback: Option<Rc<dyn SurfaceRasterizer>>,
    selection_sink: Option<Box<dyn SelectionSink>>,
    /// Prefetch and eager loads for the open document.
    background: LocalSet,
    eager_load: Option<JoinHandle<usize>>,
}

impl<D: PageSource + 'static> Viewer<D> {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            controller: SelectionController::new(config.drag_threshold, config.action_menu_offset),
            engine: CaptureEngine::new(&config),
            config,
            store: None,
            source_name: None,
            fallback: None,
            selection_sink: None,
            background: LocalSet::new(),
            eager_load: None,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Register the receiver for [`Self::dispatch_selection_for_assistant`].
    pub fn set_selection_sink(&mut self, sink: Box<dyn SelectionSink>) {
        self.selection_sink = Some(sink);
    }

    /// Rasterizer used for captures while no document is open.
    pub fn set_fallback_rasterizer(&mut self, rasterizer: Rc<dyn SurfaceRasterizer>) {
        self.fallback = Some(rasterizer);
    }

    /// Parse a document and make it current. Returns its page count.
    ///
    /// On failure the previously open document stays open.
    pub async fn open<P>(&mut self, parser: &P, source: DocumentSource) -> Result<u32, ViewerError>
    where
        P: DocumentParser<Document = D>,
    {
        let name = source.describe();
        let document = parser.parse(source).await.map_err(|e| {
            error!("Failed to open {}: {}", name, e);
            e
        })?;

        self.close();
        let store = Rc::new(PageStore::new(Rc::new(document), self.config.render_scale));
        let page_count = store.page_count();
        info!("Opened {} ({} pages)", name, page_count);

        if self.config.load_policy == LoadPolicy::Eager {
            let _entered = self.background.enter();
            self.eager_load = Some(store.spawn_load_all());
        }
        self.store = Some(store);
        self.source_name = Some(name);
        Ok(page_count)
    }

    /// Drop the current document and cancel its background loads.
    pub fn close(&mut self) {
        self.controller.cancel();
        self.eager_load = None;
        // Dropping the executor drops every task still queued on it.
        self.background = LocalSet::new();
        if let Some(name) = self.source_name.take() {
            info!("Closed {}", name);
        }
        self.store = None;
    }

    pub fn page_store(&self) -> Option<&Rc<PageStore<D>>> {
        self.store.as_ref()
    }

    pub fn page_count(&self) -> u32 {
        self.store.as_ref().map(|s| s.page_count()).unwrap_or(0)
    }

    /// A page scrolled into view: load it, then prefetch its neighbours.
    pub async fn on_page_visible(&self, page_number: u32) -> Result<Arc<RenderedPage>, ViewerError> {
        let store = Rc::clone(self.store.as_ref().ok_or(ViewerError::NoDocument)?);
        let radius = self.config.prefetch_radius;
        self.background
            .run_until(async move {
                let page = store.load_page(page_number).await?;
                store.prefetch_neighbors(page_number, radius);
                Ok(page)
            })
            .await
    }

    /// Await `future` while background loads make progress. A UI shell
    /// wraps its idle wait in this.
    pub async fn drive_background<F: Future>(&self, future: F) -> F::Output {
        self.background.run_until(future).await
    }

    /// Wait for the eager background load, if one is running. Returns the
    /// number of pages that failed.
    pub async fn wait_for_eager_load(&mut self) -> Result<usize, ViewerError> {
        let Some(task) = self.eager_load.take() else {
            return Ok(0);
        };
        self.background.run_until(task).await.map_err(|e| {
            error!("Eager load did not finish: {}", e);
            ViewerError::BackgroundTaskFailed(e.to_string())
        })
    }

    // Selection

    pub fn start_selection(&mut self, surface: Rc<dyn RenderingSurface>) {
        self.controller.start(surface);
    }

    pub fn cancel_selection(&mut self) {
        self.controller.cancel();
    }

    pub fn escape(&mut self) {
        self.controller.escape();
    }

    pub fn pointer_down(&mut self, client: Point) -> Result<(), ViewerError> {
        self.controller.pointer_down(client)
    }

    pub fn pointer_move(&mut self, client: Point) {
        self.controller.pointer_move(client);
    }

    pub fn pointer_up(&mut self, client: Point) -> Result<Rect, ViewerError> {
        self.controller.pointer_up(client)
    }

    pub fn selection_state(&self) -> SelectionState {
        self.controller.state()
    }

    pub fn is_capture_mode(&self) -> bool {
        self.controller.is_armed()
    }

    pub fn selection(&self) -> Option<Rect> {
        self.controller.selection()
    }

    // Terminal actions

    /// Capture the finalized selection and save it as a PNG through `sink`.
    pub async fn export_selection(&mut self, sink: &dyn ExportSink) -> Result<OutputRaster, ViewerError> {
        let raster = self.capture_selection().await?;
        let png = raster.to_png()?;
        sink.save(&raster.file_name(), &png)?;
        Ok(raster)
    }

    /// Capture the finalized selection and hand it to the registered
    /// selection sink together with its geometry.
    pub async fn dispatch_selection_for_assistant(&mut self) -> Result<OutputRaster, ViewerError> {
        if self.selection_sink.is_none() {
            return Err(ViewerError::ConfigError("no selection sink registered".to_string()));
        }
        let raster = self.capture_selection().await?;
        if let Some(sink) = &self.selection_sink {
            sink.on_capture(AssistantRequest {
                raster: raster.clone(),
                selection: raster.selection(),
            })?;
        }
        Ok(raster)
    }

    async fn capture_selection(&mut self) -> Result<OutputRaster, ViewerError> {
        let selection = self.controller.begin_capture()?;
        let result = self.produce(selection).await;
        if let Err(e) = &result {
            error!("Capture of {:?} failed: {}", selection, e);
        }
        self.controller.finish_capture();
        result
    }

    async fn produce(&self, selection: Rect) -> Result<OutputRaster, ViewerError> {
        match (&self.store, &self.fallback) {
            (Some(store), _) => {
                let surface = self
                    .controller
                    .surface()
                    .ok_or(ViewerError::NoActiveSelection)?;
                let snapshot = SurfaceSnapshot::capture(surface.as_ref());
                self.engine.capture(store.as_ref(), &snapshot, &selection)
            }
            (None, Some(fallback)) => {
                self.engine
                    .capture_from_surface(fallback.as_ref(), &selection)
                    .await
            }
            (None, None) => Err(ViewerError::NoDocument),
        }
    }
}
