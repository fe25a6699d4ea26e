//! The view layer as seen by the capture engine and selection controller.
//!
//! A host UI implements [`RenderingSurface`]: it reports the scroll
//! container's geometry, the page elements it currently has materialized,
//! and hosts the transient overlays drawn during a selection gesture.
//! [`ContinuousSurface`] is a headless implementation that stacks pages
//! vertically, used by the CLI and tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{client_rect_to_container, intersect, Point, Rect};

/// Geometry of the scroll container.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    /// Container's top-left corner in client space.
    pub origin: Point,
    pub scroll: Point,
    /// Visible size of the container.
    pub width: f64,
    pub height: f64,
    /// Full scrollable content height.
    pub scroll_height: f64,
}

impl Viewport {
    /// The visible part of the content, in container space.
    pub fn visible_rect(&self) -> Rect {
        Rect::new(self.scroll.x, self.scroll.y, self.width, self.height)
    }
}

/// A page element as reported by the host, in client space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageElement {
    pub page_number: u32,
    pub client_box: Rect,
}

/// A page's on-screen box in container space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageLayoutEntry {
    pub page_number: u32,
    pub display_box: Rect,
}

/// Page layout read from a surface at one instant, in container space and
/// ordered by page number.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurfaceSnapshot {
    pub viewport: Viewport,
    pub pages: Vec<PageLayoutEntry>,
}

impl SurfaceSnapshot {
    pub fn capture(surface: &dyn RenderingSurface) -> Self {
        let viewport = surface.viewport();
        let mut pages: Vec<PageLayoutEntry> = surface
            .materialized_pages()
            .into_iter()
            .map(|element| PageLayoutEntry {
                page_number: element.page_number,
                display_box: client_rect_to_container(
                    &element.client_box,
                    viewport.origin,
                    viewport.scroll,
                ),
            })
            .collect();
        pages.sort_by_key(|entry| entry.page_number);
        Self { viewport, pages }
    }
}

/// Handle to a transient overlay element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverlayId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlayKind {
    /// Dimming layer covering the whole container; receives pointer input.
    Mask,
    /// The rectangle being drawn.
    SelectionBox,
    /// Export / assistant / cancel buttons below a finished selection.
    ActionMenu,
}

/// Host view layer.
pub trait RenderingSurface {
    fn viewport(&self) -> Viewport;

    /// Every page element currently present in the view, in client space.
    fn materialized_pages(&self) -> Vec<PageElement>;

    fn create_overlay(&self, kind: OverlayKind, client_rect: Rect) -> OverlayId;

    fn update_overlay(&self, id: OverlayId, client_rect: Rect);

    fn release_overlay(&self, id: OverlayId);
}

/// Headless surface: pages stacked top to bottom with a fixed gap,
/// horizontally centred in the container.
pub struct ContinuousSurface {
    origin: Point,
    width: f64,
    height: f64,
    gap: f64,
    /// Pages within this distance of the viewport are materialized.
    overscan: f64,
    /// Container-space boxes, index = page_number - 1.
    boxes: Vec<Rect>,
    placeholder_height: Option<f64>,
    placeholders: RefCell<Vec<bool>>,
    scroll: Cell<Point>,
    next_overlay: Cell<u64>,
    overlays: RefCell<BTreeMap<OverlayId, (OverlayKind, Rect)>>,
}

impl ContinuousSurface {
    /// Lay out pages of the given display sizes.
    pub fn new(origin: Point, width: f64, height: f64, gap: f64, page_sizes: &[(f64, f64)]) -> Self {
        let mut boxes = Vec::with_capacity(page_sizes.len());
        let mut top = gap;
        for &(page_width, page_height) in page_sizes {
            let left = ((width - page_width) / 2.0).max(0.0);
            boxes.push(Rect::new(left, top, page_width, page_height));
            top += page_height + gap;
        }

        Self {
            origin,
            width,
            height,
            gap,
            overscan: height,
            placeholders: RefCell::new(vec![false; boxes.len()]),
            boxes,
            placeholder_height: None,
            scroll: Cell::new(Point::default()),
            next_overlay: Cell::new(1),
            overlays: RefCell::new(BTreeMap::new()),
        }
    }

    /// Scale page sizes (in points) so each page is `display_width` wide.
    pub fn fit_width(
        origin: Point,
        width: f64,
        height: f64,
        gap: f64,
        display_width: f64,
        page_sizes_pt: &[(f64, f64)],
    ) -> Self {
        let sizes: Vec<(f64, f64)> = page_sizes_pt
            .iter()
            .map(|&(w, h)| {
                if w > 0.0 {
                    (display_width, h * display_width / w)
                } else {
                    (display_width, 0.0)
                }
            })
            .collect();
        Self::new(origin, width, height, gap, &sizes)
    }

    pub fn with_overscan(mut self, overscan: f64) -> Self {
        self.overscan = overscan.max(0.0);
        self
    }

    /// Report unrendered pages at `height` instead of their full size.
    pub fn with_placeholder_height(mut self, height: f64) -> Self {
        self.placeholder_height = Some(height);
        self
    }

    pub fn set_placeholder(&self, page_number: u32, placeholder: bool) {
        if let Some(flag) = self
            .placeholders
            .borrow_mut()
            .get_mut((page_number as usize).wrapping_sub(1))
        {
            *flag = placeholder;
        }
    }

    pub fn scroll_to(&self, y: f64) {
        let max = (self.content_height() - self.height).max(0.0);
        self.scroll.set(Point::new(0.0, y.clamp(0.0, max)));
    }

    /// Scroll so the top of `page_number` is at the top of the viewport.
    pub fn scroll_to_page(&self, page_number: u32) {
        if let Some(rect) = self.page_box(page_number) {
            self.scroll_to(rect.top - self.gap);
        }
    }

    pub fn content_height(&self) -> f64 {
        self.boxes
            .last()
            .map(|last| last.bottom() + self.gap)
            .unwrap_or(0.0)
    }

    /// Container-space box of a page.
    pub fn page_box(&self, page_number: u32) -> Option<Rect> {
        self.boxes
            .get((page_number as usize).wrapping_sub(1))
            .copied()
    }

    /// Pages intersecting the visible part of the container.
    pub fn visible_pages(&self) -> Vec<u32> {
        self.pages_intersecting(&self.viewport().visible_rect())
    }

    /// Pages whose box overlaps `region` (container space).
    pub fn pages_intersecting(&self, region: &Rect) -> Vec<u32> {
        self.boxes
            .iter()
            .enumerate()
            .filter(|(_, rect)| !intersect(rect, region).is_empty())
            .map(|(i, _)| i as u32 + 1)
            .collect()
    }

    pub fn live_overlays(&self) -> Vec<(OverlayId, OverlayKind, Rect)> {
        self.overlays
            .borrow()
            .iter()
            .map(|(id, (kind, rect))| (*id, *kind, *rect))
            .collect()
    }

    pub fn overlay(&self, kind: OverlayKind) -> Option<Rect> {
        self.overlays
            .borrow()
            .values()
            .find(|(k, _)| *k == kind)
            .map(|(_, rect)| *rect)
    }
}

impl RenderingSurface for ContinuousSurface {
    fn viewport(&self) -> Viewport {
        Viewport {
            origin: self.origin,
            scroll: self.scroll.get(),
            width: self.width,
            height: self.height,
            scroll_height: self.content_height(),
        }
    }

    fn materialized_pages(&self) -> Vec<PageElement> {
        let viewport = self.viewport();
        let visible = viewport.visible_rect();
        let window = Rect::new(
            visible.left,
            visible.top - self.overscan,
            visible.width,
            visible.height + 2.0 * self.overscan,
        );
        let placeholders = self.placeholders.borrow();

        self.boxes
            .iter()
            .enumerate()
            .filter(|(_, rect)| rect.bottom() >= window.top && rect.top <= window.bottom())
            .map(|(i, rect)| {
                let mut shown = *rect;
                if let (Some(height), true) = (self.placeholder_height, placeholders[i]) {
                    shown.height = height;
                }
                PageElement {
                    page_number: i as u32 + 1,
                    client_box: shown.translate(
                        viewport.origin.x - viewport.scroll.x,
                        viewport.origin.y - viewport.scroll.y,
                    ),
                }
            })
            .collect()
    }

    fn create_overlay(&self, kind: OverlayKind, client_rect: Rect) -> OverlayId {
        let id = OverlayId(self.next_overlay.get());
        self.next_overlay.set(id.0 + 1);
        self.overlays.borrow_mut().insert(id, (kind, client_rect));
        id
    }

    fn update_overlay(&self, id: OverlayId, client_rect: Rect) {
        if let Some(entry) = self.overlays.borrow_mut().get_mut(&id) {
            entry.1 = client_rect;
        }
    }

    fn release_overlay(&self, id: OverlayId) {
        self.overlays.borrow_mut().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> ContinuousSurface {
        ContinuousSurface::new(
            Point::new(10.0, 50.0),
            800.0,
            600.0,
            10.0,
            &[(600.0, 800.0), (600.0, 800.0), (600.0, 800.0)],
        )
    }

    #[test]
    fn pages_stack_with_gaps() {
        let s = surface();
        assert_eq!(s.page_box(1), Some(Rect::new(100.0, 10.0, 600.0, 800.0)));
        assert_eq!(s.page_box(2), Some(Rect::new(100.0, 820.0, 600.0, 800.0)));
        assert_eq!(s.page_box(4), None);
        assert_eq!(s.page_box(0), None);
        assert_eq!(s.content_height(), 2440.0);
    }

    #[test]
    fn snapshot_is_scroll_compensated() {
        let s = surface();
        s.scroll_to(700.0);

        let snapshot = SurfaceSnapshot::capture(&s);
        assert_eq!(snapshot.viewport.scroll, Point::new(0.0, 700.0));
        let second = snapshot
            .pages
            .iter()
            .find(|p| p.page_number == 2)
            .unwrap();
        // Client boxes move with scroll; the container-space box does not.
        assert_eq!(second.display_box, s.page_box(2).unwrap());
    }

    #[test]
    fn scroll_is_clamped_to_content() {
        let s = surface();
        s.scroll_to(10_000.0);
        assert_eq!(s.viewport().scroll.y, 2440.0 - 600.0);
        s.scroll_to(-5.0);
        assert_eq!(s.viewport().scroll.y, 0.0);
    }

    #[test]
    fn only_nearby_pages_are_materialized() {
        let s = surface().with_overscan(0.0);
        let pages: Vec<u32> = s.materialized_pages().iter().map(|p| p.page_number).collect();
        assert_eq!(pages, vec![1]);

        s.scroll_to_page(2);
        assert_eq!(s.visible_pages(), vec![2]);
    }

    #[test]
    fn placeholders_report_short_boxes() {
        let s = surface().with_placeholder_height(40.0);
        s.set_placeholder(2, true);
        let elements = s.materialized_pages();
        assert_eq!(elements[1].client_box.height, 40.0);
        assert_eq!(elements[0].client_box.height, 800.0);
    }

    #[test]
    fn fit_width_preserves_aspect() {
        let s = ContinuousSurface::fit_width(
            Point::default(),
            800.0,
            600.0,
            0.0,
            400.0,
            &[(612.0, 792.0)],
        );
        let rect = s.page_box(1).unwrap();
        assert_eq!(rect.width, 400.0);
        assert!((rect.height - 792.0 * 400.0 / 612.0).abs() < 1e-9);
    }

    #[test]
    fn overlays_are_tracked_until_released() {
        let s = surface();
        let mask = s.create_overlay(OverlayKind::Mask, Rect::new(0.0, 0.0, 800.0, 600.0));
        let bx = s.create_overlay(OverlayKind::SelectionBox, Rect::default());
        s.update_overlay(bx, Rect::new(5.0, 5.0, 20.0, 20.0));
        assert_eq!(s.overlay(OverlayKind::SelectionBox), Some(Rect::new(5.0, 5.0, 20.0, 20.0)));

        s.release_overlay(mask);
        s.release_overlay(bx);
        assert!(s.live_overlays().is_empty());
    }
}
