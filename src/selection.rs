//! Pointer-driven region selection.
//!
//! Capture mode is armed explicitly. While armed, a mask covers the
//! container and a drag draws the selection box; releasing a large enough
//! drag finalizes it and shows the action menu. Cancelling from any state
//! removes every overlay at once.

use std::rc::Rc;

use log::debug;
use serde::Serialize;

use crate::error::ViewerError;
use crate::geometry::{client_to_container, container_rect_to_client, Point, Rect};
use crate::surface::{OverlayId, OverlayKind, RenderingSurface};

const ACTION_MENU_HEIGHT: f64 = 36.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SelectionState {
    Idle,
    Drawing,
    Finalized,
    Capturing,
}

#[derive(Default)]
struct Overlays {
    mask: Option<OverlayId>,
    selection_box: Option<OverlayId>,
    action_menu: Option<OverlayId>,
}

impl Overlays {
    fn release_all(&mut self, surface: &dyn RenderingSurface) {
        for id in [
            self.action_menu.take(),
            self.selection_box.take(),
            self.mask.take(),
        ]
        .into_iter()
        .flatten()
        {
            surface.release_overlay(id);
        }
    }
}

pub struct SelectionController {
    drag_threshold: f64,
    menu_offset: f64,
    armed: bool,
    state: SelectionState,
    surface: Option<Rc<dyn RenderingSurface>>,
    anchor: Point,
    rect: Rect,
    overlays: Overlays,
}

impl SelectionController {
    pub fn new(drag_threshold: f64, menu_offset: f64) -> Self {
        Self {
            drag_threshold,
            menu_offset,
            armed: false,
            state: SelectionState::Idle,
            surface: None,
            anchor: Point::default(),
            rect: Rect::default(),
            overlays: Overlays::default(),
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn surface(&self) -> Option<&Rc<dyn RenderingSurface>> {
        self.surface.as_ref()
    }

    /// Current selection in container space, while one exists.
    pub fn selection(&self) -> Option<Rect> {
        match self.state {
            SelectionState::Idle => None,
            _ => Some(self.rect),
        }
    }

    /// Arm capture mode on `surface`. Re-arming cancels whatever was in
    /// progress first.
    pub fn start(&mut self, surface: Rc<dyn RenderingSurface>) {
        if self.armed {
            self.cancel();
        }

        let viewport = surface.viewport();
        let mask_rect = Rect::new(viewport.origin.x, viewport.origin.y, viewport.width, viewport.height);
        self.overlays.mask = Some(surface.create_overlay(OverlayKind::Mask, mask_rect));
        self.overlays.selection_box =
            Some(surface.create_overlay(OverlayKind::SelectionBox, Rect::default()));

        self.surface = Some(surface);
        self.armed = true;
        self.state = SelectionState::Idle;
        debug!("Capture mode armed");
    }

    pub fn pointer_down(&mut self, client: Point) -> Result<(), ViewerError> {
        let Some(surface) = self.surface.clone().filter(|_| self.armed) else {
            return Err(ViewerError::NoActiveSelection);
        };
        if self.state == SelectionState::Capturing {
            return Ok(());
        }
        if let Some(menu) = self.overlays.action_menu.take() {
            surface.release_overlay(menu);
        }

        let viewport = surface.viewport();
        self.anchor = client_to_container(client, viewport.origin, viewport.scroll);
        self.rect = Rect::new(self.anchor.x, self.anchor.y, 0.0, 0.0);
        self.state = SelectionState::Drawing;
        self.sync_box(surface.as_ref());
        Ok(())
    }

    pub fn pointer_move(&mut self, client: Point) {
        if self.state != SelectionState::Drawing {
            return;
        }
        let Some(surface) = self.surface.clone() else {
            return;
        };
        let viewport = surface.viewport();
        let point = client_to_container(client, viewport.origin, viewport.scroll);
        self.rect = Rect::from_corners(self.anchor, point);
        self.sync_box(surface.as_ref());
    }

    /// Finish the drag. A drag below the threshold returns
    /// [`ViewerError::EmptySelection`] and leaves capture mode armed.
    pub fn pointer_up(&mut self, client: Point) -> Result<Rect, ViewerError> {
        if self.state != SelectionState::Drawing {
            return Err(ViewerError::NoActiveSelection);
        }
        self.pointer_move(client);
        let Some(surface) = self.surface.clone() else {
            return Err(ViewerError::NoActiveSelection);
        };

        if self.rect.width < self.drag_threshold || self.rect.height < self.drag_threshold {
            debug!("Selection {:?} below threshold, discarded", self.rect);
            self.state = SelectionState::Idle;
            self.rect = Rect::default();
            if let Some(id) = self.overlays.selection_box {
                surface.update_overlay(id, Rect::default());
            }
            return Err(ViewerError::EmptySelection);
        }

        let viewport = surface.viewport();
        let client_box = container_rect_to_client(&self.rect, viewport.origin, viewport.scroll);
        let menu_rect = Rect::new(
            client_box.left,
            client_box.bottom() + self.menu_offset,
            client_box.width,
            ACTION_MENU_HEIGHT,
        );
        self.overlays.action_menu = Some(surface.create_overlay(OverlayKind::ActionMenu, menu_rect));
        self.state = SelectionState::Finalized;
        debug!("Selection finalized at {:?}", self.rect);
        Ok(self.rect)
    }

    /// Leave capture mode, releasing every overlay. Safe in any state.
    pub fn cancel(&mut self) {
        if let Some(surface) = self.surface.take() {
            self.overlays.release_all(surface.as_ref());
        }
        if self.armed {
            debug!("Capture mode disarmed");
        }
        self.armed = false;
        self.state = SelectionState::Idle;
        self.rect = Rect::default();
    }

    /// Escape key; same as [`Self::cancel`].
    pub fn escape(&mut self) {
        self.cancel();
    }

    /// Lock the finalized selection for capture.
    pub fn begin_capture(&mut self) -> Result<Rect, ViewerError> {
        if self.state != SelectionState::Finalized {
            return Err(ViewerError::NoActiveSelection);
        }
        self.state = SelectionState::Capturing;
        Ok(self.rect)
    }

    /// End a capture, successful or not, and leave capture mode.
    pub fn finish_capture(&mut self) {
        if self.state == SelectionState::Capturing {
            self.cancel();
        }
    }

    fn sync_box(&self, surface: &dyn RenderingSurface) {
        if let Some(id) = self.overlays.selection_box {
            let viewport = surface.viewport();
            surface.update_overlay(
                id,
                container_rect_to_client(&self.rect, viewport.origin, viewport.scroll),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::ContinuousSurface;

    fn setup() -> (Rc<ContinuousSurface>, SelectionController) {
        let surface = Rc::new(ContinuousSurface::new(
            Point::new(20.0, 30.0),
            800.0,
            600.0,
            10.0,
            &[(600.0, 800.0), (600.0, 800.0)],
        ));
        (surface, SelectionController::new(10.0, 10.0))
    }

    fn drag(controller: &mut SelectionController, from: (f64, f64), to: (f64, f64)) -> Result<Rect, ViewerError> {
        controller.pointer_down(Point::new(from.0, from.1))?;
        controller.pointer_move(Point::new((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0));
        controller.pointer_up(Point::new(to.0, to.1))
    }

    #[test]
    fn arming_creates_mask_and_box() {
        let (surface, mut controller) = setup();
        controller.start(surface.clone());
        assert!(controller.is_armed());
        assert_eq!(surface.overlay(OverlayKind::Mask), Some(Rect::new(20.0, 30.0, 800.0, 600.0)));
        assert!(surface.overlay(OverlayKind::SelectionBox).is_some());
    }

    #[test]
    fn pointer_down_requires_capture_mode() {
        let (_, mut controller) = setup();
        assert_eq!(
            controller.pointer_down(Point::new(0.0, 0.0)).unwrap_err(),
            ViewerError::NoActiveSelection
        );
    }

    #[test]
    fn drag_is_mapped_to_container_space_with_scroll() {
        let (surface, mut controller) = setup();
        surface.scroll_to(500.0);
        controller.start(surface.clone());

        // Dragging up-left still yields a positive rectangle.
        let rect = drag(&mut controller, (220.0, 230.0), (120.0, 130.0)).unwrap();
        assert_eq!(rect, Rect::new(100.0, 600.0, 100.0, 100.0));
        assert_eq!(controller.state(), SelectionState::Finalized);

        assert_eq!(
            surface.overlay(OverlayKind::SelectionBox),
            Some(Rect::new(120.0, 130.0, 100.0, 100.0))
        );
        assert_eq!(
            surface.overlay(OverlayKind::ActionMenu),
            Some(Rect::new(120.0, 240.0, 100.0, ACTION_MENU_HEIGHT))
        );
    }

    #[test]
    fn small_drag_is_discarded_but_mode_stays_armed() {
        let (surface, mut controller) = setup();
        controller.start(surface.clone());

        let err = drag(&mut controller, (100.0, 100.0), (105.0, 300.0)).unwrap_err();
        assert_eq!(err, ViewerError::EmptySelection);
        assert_eq!(controller.state(), SelectionState::Idle);
        assert!(controller.is_armed());
        assert!(controller.selection().is_none());
        assert!(surface.overlay(OverlayKind::ActionMenu).is_none());
        assert_eq!(controller.begin_capture().unwrap_err(), ViewerError::NoActiveSelection);

        // A second attempt in the same mode works.
        assert!(drag(&mut controller, (100.0, 100.0), (150.0, 150.0)).is_ok());
    }

    #[test]
    fn cancel_from_drawing_releases_everything() {
        let (surface, mut controller) = setup();
        controller.start(surface.clone());
        controller.pointer_down(Point::new(50.0, 50.0)).unwrap();
        controller.pointer_move(Point::new(90.0, 90.0));
        assert_eq!(controller.state(), SelectionState::Drawing);

        controller.escape();
        assert!(surface.live_overlays().is_empty());
        assert!(!controller.is_armed());
        assert_eq!(controller.state(), SelectionState::Idle);
    }

    #[test]
    fn cancel_from_finalized_releases_everything() {
        let (surface, mut controller) = setup();
        controller.start(surface.clone());
        drag(&mut controller, (50.0, 50.0), (150.0, 150.0)).unwrap();
        assert_eq!(surface.live_overlays().len(), 3);

        controller.cancel();
        assert!(surface.live_overlays().is_empty());
        // Cancelling twice is harmless.
        controller.cancel();
    }

    #[test]
    fn redraw_after_finalize_drops_the_menu() {
        let (surface, mut controller) = setup();
        controller.start(surface.clone());
        drag(&mut controller, (50.0, 50.0), (150.0, 150.0)).unwrap();

        controller.pointer_down(Point::new(300.0, 300.0)).unwrap();
        assert_eq!(controller.state(), SelectionState::Drawing);
        assert!(surface.overlay(OverlayKind::ActionMenu).is_none());
    }

    #[test]
    fn rearming_cancels_previous_gesture() {
        let (surface, mut controller) = setup();
        controller.start(surface.clone());
        drag(&mut controller, (50.0, 50.0), (150.0, 150.0)).unwrap();

        controller.start(surface.clone());
        assert_eq!(controller.state(), SelectionState::Idle);
        assert_eq!(surface.live_overlays().len(), 2);
    }

    #[test]
    fn capture_is_one_shot() {
        let (surface, mut controller) = setup();
        controller.start(surface.clone());
        let rect = drag(&mut controller, (50.0, 50.0), (150.0, 150.0)).unwrap();

        assert_eq!(controller.begin_capture().unwrap(), rect);
        assert_eq!(controller.state(), SelectionState::Capturing);
        // Input is ignored while capturing.
        controller.pointer_down(Point::new(0.0, 0.0)).unwrap();
        assert_eq!(controller.state(), SelectionState::Capturing);

        controller.finish_capture();
        assert_eq!(controller.state(), SelectionState::Idle);
        assert!(surface.live_overlays().is_empty());
        assert_eq!(controller.begin_capture().unwrap_err(), ViewerError::NoActiveSelection);
    }
}
