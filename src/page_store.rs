//! Per-document page records with deduplicated, on-demand rendering.
//!
//! Rendering a page is expensive, so every page is rendered at most once
//! per document. Concurrent requests for a page that is already loading
//! attach to the in-flight load's completion handle instead of starting a
//! second render.
//!
//! The store lives on one thread. Slots sit behind a `RefCell` that is never
//! borrowed across an `.await`; interleaving only happens at suspension
//! points, so no lock is needed.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::ViewerError;
use crate::geometry::{Point, Rect};
use crate::loader::{render_full_page, PageSource, RenderedPage, TextItem};

type LoadOutcome = Result<Arc<RenderedPage>, ViewerError>;

/// Load state of one page record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageStatus {
    NotLoaded,
    Loading,
    Loaded,
}

enum PageSlot {
    NotLoaded,
    /// Completion handle shared by every caller waiting on this page.
    Loading(watch::Receiver<Option<LoadOutcome>>),
    Loaded(Arc<RenderedPage>),
}

impl PageSlot {
    fn status(&self) -> PageStatus {
        match self {
            Self::NotLoaded => PageStatus::NotLoaded,
            Self::Loading(_) => PageStatus::Loading,
            Self::Loaded(_) => PageStatus::Loaded,
        }
    }
}

struct Slots {
    /// Bumped by `initialize` so loads started earlier cannot write back.
    generation: u64,
    pages: Vec<PageSlot>,
}

enum Role {
    Lead(watch::Sender<Option<LoadOutcome>>, u64),
    Wait(watch::Receiver<Option<LoadOutcome>>),
}

/// Ordered page records for one open document.
pub struct PageStore<D: PageSource> {
    document: Rc<D>,
    render_scale: f32,
    slots: RefCell<Slots>,
}

impl<D: PageSource> PageStore<D> {
    /// Create a store sized to the document's page count.
    pub fn new(document: Rc<D>, render_scale: f32) -> Self {
        let store = Self {
            document,
            render_scale,
            slots: RefCell::new(Slots {
                generation: 0,
                pages: Vec::new(),
            }),
        };
        store.initialize(store.document.page_count());
        store
    }

    /// Reset to `page_count` records, all `NotLoaded`.
    pub fn initialize(&self, page_count: u32) {
        let mut slots = self.slots.borrow_mut();
        slots.generation += 1;
        slots.pages.clear();
        slots
            .pages
            .resize_with(page_count as usize, || PageSlot::NotLoaded);
        debug!(
            "Page store initialized with {} pages (generation {})",
            page_count, slots.generation
        );
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn render_scale(&self) -> f32 {
        self.render_scale
    }

    pub fn page_count(&self) -> u32 {
        self.slots.borrow().pages.len() as u32
    }

    pub fn loaded_count(&self) -> usize {
        self.slots
            .borrow()
            .pages
            .iter()
            .filter(|slot| matches!(slot, PageSlot::Loaded(_)))
            .count()
    }

    /// Status of a page, or `None` when the number is out of range.
    pub fn status(&self, page_number: u32) -> Option<PageStatus> {
        let slots = self.slots.borrow();
        slot_index(slots.pages.len(), page_number)
            .ok()
            .map(|index| slots.pages[index].status())
    }

    /// The loaded record for a page, without waiting.
    pub fn page(&self, page_number: u32) -> Option<Arc<RenderedPage>> {
        let slots = self.slots.borrow();
        let index = slot_index(slots.pages.len(), page_number).ok()?;
        match &slots.pages[index] {
            PageSlot::Loaded(page) => Some(Arc::clone(page)),
            _ => None,
        }
    }

    /// Native raster of a page if it is loaded.
    pub fn raster(&self, page_number: u32) -> Option<Arc<RenderedPage>> {
        self.page(page_number)
    }

    /// Text runs of a page; empty until the page is loaded.
    pub fn text_items(&self, page_number: u32) -> Vec<TextItem> {
        self.page(page_number)
            .map(|page| page.text_items.clone())
            .unwrap_or_default()
    }

    /// Text of the runs whose origin lies inside `region` (page points,
    /// top-left origin), in reading order.
    pub fn text_in_region(&self, page_number: u32, region: &Rect) -> Vec<String> {
        self.page(page_number)
            .map(|page| {
                page.text_items
                    .iter()
                    .filter(|item| {
                        let (x, y) = item.origin();
                        region.contains(Point::new(f64::from(x), f64::from(y)))
                    })
                    .map(|item| item.text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Load a page, rendering it if nobody has yet.
    ///
    /// Callers arriving while the page is loading wait for that load and get
    /// the same record, or the same error. A failed render leaves the page
    /// `NotLoaded` so a later call retries.
    pub async fn load_page(&self, page_number: u32) -> Result<Arc<RenderedPage>, ViewerError> {
        let role = {
            let mut slots = self.slots.borrow_mut();
            let index = slot_index(slots.pages.len(), page_number)?;
            match &slots.pages[index] {
                PageSlot::Loaded(page) => return Ok(Arc::clone(page)),
                PageSlot::Loading(rx) => Role::Wait(rx.clone()),
                PageSlot::NotLoaded => {
                    let (tx, rx) = watch::channel(None);
                    slots.pages[index] = PageSlot::Loading(rx);
                    Role::Lead(tx, slots.generation)
                }
            }
        };

        match role {
            Role::Wait(rx) => wait_for_load(page_number, rx).await,
            Role::Lead(tx, generation) => self.lead_load(page_number, tx, generation).await,
        }
    }

    async fn lead_load(
        &self,
        page_number: u32,
        tx: watch::Sender<Option<LoadOutcome>>,
        generation: u64,
    ) -> LoadOutcome {
        debug!("Rendering page {} at scale {}", page_number, self.render_scale);
        let mut guard = LoadGuard {
            slots: &self.slots,
            index: (page_number - 1) as usize,
            generation,
            tx: Some(tx),
        };

        let outcome = render_full_page(self.document.as_ref(), page_number, self.render_scale)
            .await
            .map(Arc::new);

        match &outcome {
            Ok(page) => debug!(
                "Page {} loaded ({}x{}, {} text runs)",
                page_number,
                page.native_width(),
                page.native_height(),
                page.text_items.len()
            ),
            Err(e) => warn!("Page {} failed to load: {}", page_number, e),
        }

        guard.complete(outcome.clone());
        outcome
    }
}

impl<D: PageSource + 'static> PageStore<D> {
    /// Start loading the pages around `page_number` without waiting.
    ///
    /// Must run inside a `tokio::task::LocalSet`. Returns how many loads were
    /// started; failures are only logged.
    pub fn prefetch_neighbors(self: &Rc<Self>, page_number: u32, radius: u32) -> usize {
        let page_count = self.page_count();
        if page_count == 0 {
            return 0;
        }
        let first = page_number.saturating_sub(radius).max(1);
        let last = page_number.saturating_add(radius).min(page_count);

        let mut started = 0;
        for n in first..=last {
            if self.status(n) != Some(PageStatus::NotLoaded) {
                continue;
            }
            let store = Rc::clone(self);
            tokio::task::spawn_local(async move {
                if let Err(e) = store.load_page(n).await {
                    warn!("Prefetch of page {} failed: {}", n, e);
                }
            });
            started += 1;
        }
        started
    }

    /// Load every page in order on a background local task.
    pub fn spawn_load_all(self: &Rc<Self>) -> tokio::task::JoinHandle<usize> {
        let store = Rc::clone(self);
        tokio::task::spawn_local(async move {
            let mut failures = 0;
            for n in 1..=store.page_count() {
                if let Err(e) = store.load_page(n).await {
                    warn!("Eager load of page {} failed: {}", n, e);
                    failures += 1;
                }
            }
            info!(
                "Eager load finished: {} pages, {} failures",
                store.page_count(),
                failures
            );
            failures
        })
    }
}

fn slot_index(len: usize, page_number: u32) -> Result<usize, ViewerError> {
    if page_number == 0 || page_number as usize > len {
        return Err(ViewerError::PageNotFound(page_number));
    }
    Ok(page_number as usize - 1)
}

async fn wait_for_load(
    page_number: u32,
    mut rx: watch::Receiver<Option<LoadOutcome>>,
) -> LoadOutcome {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(published) => (*published).clone(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| Err(ViewerError::render_failure(page_number, "load abandoned")))
}

/// Publishes the outcome of a leading load. If the load future is dropped
/// before finishing, the slot reverts to `NotLoaded` and waiters are released
/// with an error.
struct LoadGuard<'a> {
    slots: &'a RefCell<Slots>,
    index: usize,
    generation: u64,
    tx: Option<watch::Sender<Option<LoadOutcome>>>,
}

impl LoadGuard<'_> {
    fn complete(&mut self, outcome: LoadOutcome) {
        let slot = match &outcome {
            Ok(page) => PageSlot::Loaded(Arc::clone(page)),
            Err(_) => PageSlot::NotLoaded,
        };
        self.store_slot(slot);
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome));
        }
    }

    fn store_slot(&self, slot: PageSlot) {
        let Ok(mut slots) = self.slots.try_borrow_mut() else {
            return;
        };
        if slots.generation != self.generation {
            debug!("Discarding load result from a previous document");
            return;
        }
        if let Some(current) = slots.pages.get_mut(self.index) {
            *current = slot;
        }
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.store_slot(PageSlot::NotLoaded);
            // Dropping the sender wakes waiters with an error.
            self.tx = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{patterned_raster, MemoryDocument};
    use std::future::Future;

    fn store_with(doc: MemoryDocument) -> (Rc<MemoryDocument>, PageStore<MemoryDocument>) {
        let doc = Rc::new(doc);
        let store = PageStore::new(Rc::clone(&doc), 1.5);
        (doc, store)
    }

    fn three_pages() -> MemoryDocument {
        MemoryDocument::new(vec![
            patterned_raster(40, 60, 1),
            patterned_raster(40, 60, 2),
            patterned_raster(40, 60, 3),
        ])
    }

    #[tokio::test]
    async fn starts_with_every_page_not_loaded() {
        let (_, store) = store_with(three_pages());
        assert_eq!(store.page_count(), 3);
        assert_eq!(store.loaded_count(), 0);
        for n in 1..=3 {
            assert_eq!(store.status(n), Some(PageStatus::NotLoaded));
            assert!(store.raster(n).is_none());
            assert!(store.text_items(n).is_empty());
        }
        assert_eq!(store.status(4), None);
    }

    #[tokio::test]
    async fn load_page_renders_and_caches() {
        let (doc, store) = store_with(three_pages());

        let page = store.load_page(2).await.unwrap();
        assert_eq!(page.page_number, 2);
        assert_eq!(page.native_width(), 40);
        assert_eq!(page.render_scale, 1.5);
        assert_eq!(store.status(2), Some(PageStatus::Loaded));

        let again = store.load_page(2).await.unwrap();
        assert!(Arc::ptr_eq(&page, &again));
        assert_eq!(doc.render_calls(2), 1);
    }

    #[tokio::test]
    async fn concurrent_loads_render_once() {
        let (doc, store) = store_with(three_pages().with_render_yields(5));

        let (a, b, c) = tokio::join!(store.load_page(1), store.load_page(1), store.load_page(1));
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(doc.render_calls(1), 1);
        assert_eq!(doc.total_render_calls(), 1);
    }

    #[tokio::test]
    async fn waiters_share_the_failure_and_retry_succeeds() {
        let (doc, store) = store_with(three_pages().with_render_yields(3));
        doc.fail_page(3);

        let (a, b) = tokio::join!(store.load_page(3), store.load_page(3));
        assert!(matches!(a, Err(ViewerError::PageRenderFailure { page: 3, .. })));
        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(doc.render_calls(3), 1);
        assert_eq!(store.status(3), Some(PageStatus::NotLoaded));

        doc.heal_page(3);
        let page = store.load_page(3).await.unwrap();
        assert_eq!(page.page_number, 3);
        assert_eq!(doc.render_calls(3), 2);
    }

    #[tokio::test]
    async fn failure_does_not_affect_siblings() {
        let (doc, store) = store_with(three_pages());
        doc.fail_page(1);

        let (bad, good) = tokio::join!(store.load_page(1), store.load_page(2));
        assert!(bad.is_err());
        assert!(good.is_ok());
        assert_eq!(store.loaded_count(), 1);
    }

    #[tokio::test]
    async fn out_of_range_is_page_not_found() {
        let (_, store) = store_with(three_pages());
        assert_eq!(store.load_page(0).await.unwrap_err(), ViewerError::PageNotFound(0));
        assert_eq!(store.load_page(4).await.unwrap_err(), ViewerError::PageNotFound(4));
    }

    #[tokio::test]
    async fn dropped_leader_releases_the_slot() {
        let (doc, store) = store_with(three_pages().with_render_yields(10));

        {
            let leader = store.load_page(1);
            tokio::pin!(leader);
            // Poll once so the leader claims the slot, then drop it.
            let _ = futures_poll_once(leader.as_mut()).await;
            assert_eq!(store.status(1), Some(PageStatus::Loading));
        }
        assert_eq!(store.status(1), Some(PageStatus::NotLoaded));

        store.load_page(1).await.unwrap();
        assert_eq!(doc.render_calls(1), 2);
    }

    #[tokio::test]
    async fn initialize_discards_in_flight_results() {
        let (_, store) = store_with(three_pages().with_render_yields(3));

        let load = store.load_page(1);
        let reset = async {
            tokio::task::yield_now().await;
            store.initialize(2);
        };
        let (loaded, ()) = tokio::join!(load, reset);

        assert!(loaded.is_ok());
        assert_eq!(store.page_count(), 2);
        assert_eq!(store.status(1), Some(PageStatus::NotLoaded));
    }

    #[tokio::test]
    async fn text_lookups_follow_load_state() {
        let doc = three_pages().with_text(
            1,
            vec![
                MemoryDocument::text_item("Title", 10.0, 20.0),
                MemoryDocument::text_item("Body", 10.0, 200.0),
            ],
        );
        let (_, store) = store_with(doc);
        assert!(store.text_in_region(1, &Rect::new(0.0, 0.0, 100.0, 100.0)).is_empty());

        store.load_page(1).await.unwrap();
        assert_eq!(store.text_items(1).len(), 2);
        assert_eq!(
            store.text_in_region(1, &Rect::new(0.0, 0.0, 100.0, 100.0)),
            vec!["Title".to_string()]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prefetch_loads_neighbors_in_background() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let doc = Rc::new(MemoryDocument::new(
                    (0..6).map(|i| patterned_raster(8, 8, i)).collect(),
                ));
                let store = Rc::new(PageStore::new(Rc::clone(&doc), 1.0));
                doc.fail_page(5);

                let started = store.prefetch_neighbors(4, 1);
                assert_eq!(started, 3);
                // Nothing has run yet: prefetch never blocks the caller.
                assert_eq!(store.loaded_count(), 0);

                // A user request and the prefetch of the same page share one render.
                let page = store.load_page(4).await.unwrap();
                assert_eq!(page.page_number, 4);

                for _ in 0..20 {
                    tokio::task::yield_now().await;
                }
                assert_eq!(store.status(3), Some(PageStatus::Loaded));
                assert_eq!(store.status(5), Some(PageStatus::NotLoaded));
                assert_eq!(doc.render_calls(4), 1);

                // Loaded pages are not prefetched again; bounds are clamped.
                assert_eq!(store.prefetch_neighbors(4, 0), 0);
                assert_eq!(store.prefetch_neighbors(6, 3), 2);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn load_all_renders_every_page() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let doc = Rc::new(three_pages());
                let store = Rc::new(PageStore::new(Rc::clone(&doc), 1.0));
                doc.fail_page(2);

                let failures = store.spawn_load_all().await.unwrap();
                assert_eq!(failures, 1);
                assert_eq!(store.loaded_count(), 2);
            })
            .await;
    }

    /// Poll a future exactly once.
    async fn futures_poll_once<F: Future + Unpin>(fut: F) -> Option<F::Output> {
        let mut fut = fut;
        std::future::poll_fn(|cx| {
            std::task::Poll::Ready(match std::pin::Pin::new(&mut fut).poll(cx) {
                std::task::Poll::Ready(v) => Some(v),
                std::task::Poll::Pending => None,
            })
        })
        .await
    }
}
