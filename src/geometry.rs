//! Rectangle math for mapping selections between coordinate spaces.
//!
//! Three spaces are involved:
//! - client space: relative to the visible viewport of the host window
//! - container space: relative to the scroll container's top-left at zero
//!   scroll, so it includes content scrolled out of view
//! - native space: pixels of a page raster at the fixed render scale
//!
//! Every function here is total. Degenerate input yields a zero-area
//! rectangle, never a negative one.

use serde::{Deserialize, Serialize};

/// A point in any of the coordinate spaces.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle with its origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Build a rectangle, flooring negative or NaN extents to zero.
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width: non_negative(width),
            height: non_negative(height),
        }
    }

    /// Normalize a drag between two corners regardless of its direction.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(
            a.x.min(b.x),
            a.y.min(b.y),
            (b.x - a.x).abs(),
            (b.y - a.y).abs(),
        )
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.right()
            && point.y >= self.top
            && point.y <= self.bottom()
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            ..*self
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Axis-aligned intersection. When the rectangles do not overlap the result
/// is a zero-area rectangle positioned at the clamp point.
pub fn intersect(a: &Rect, b: &Rect) -> Rect {
    let (left, width) = overlap(a.left, a.width, b.left, b.width);
    let (top, height) = overlap(a.top, a.height, b.top, b.height);
    Rect::new(left, top, width, height)
}

/// One-axis overlap. A span fully inside the other keeps its own length so
/// that containment is exact under floating point.
fn overlap(a_start: f64, a_len: f64, b_start: f64, b_len: f64) -> (f64, f64) {
    let a_end = a_start + a_len;
    let b_end = b_start + b_len;
    let start = a_start.max(b_start);
    let a_inside = a_start >= b_start && a_end <= b_end;
    let b_inside = b_start >= a_start && b_end <= a_end;
    let len = match (a_inside, b_inside) {
        (true, true) => a_len.min(b_len),
        (true, false) => a_len,
        (false, true) => b_len,
        (false, false) => a_end.min(b_end) - start,
    };
    (start, len)
}

/// Convert a display-space rectangle to native space given the
/// display-to-native scale of each axis (display = native * scale).
pub fn to_native_space(rect: &Rect, scale_x: f64, scale_y: f64) -> Rect {
    if !valid_scale(scale_x) || !valid_scale(scale_y) {
        return Rect::new(0.0, 0.0, 0.0, 0.0);
    }
    Rect::new(
        rect.left / scale_x,
        rect.top / scale_y,
        rect.width / scale_x,
        rect.height / scale_y,
    )
}

/// Inverse of [`to_native_space`].
pub fn to_display_space(rect: &Rect, scale_x: f64, scale_y: f64) -> Rect {
    if !valid_scale(scale_x) || !valid_scale(scale_y) {
        return Rect::new(0.0, 0.0, 0.0, 0.0);
    }
    Rect::new(
        rect.left * scale_x,
        rect.top * scale_y,
        rect.width * scale_x,
        rect.height * scale_y,
    )
}

fn valid_scale(scale: f64) -> bool {
    scale.is_finite() && scale > 0.0
}

/// Clamp a rectangle to `[0, bounds_width] x [0, bounds_height]`.
pub fn clamp_to_bounds(rect: &Rect, bounds_width: f64, bounds_height: f64) -> Rect {
    let bounds = Rect::new(0.0, 0.0, bounds_width, bounds_height);
    intersect(rect, &bounds)
}

/// Map a point from client space into container space.
///
/// `container_origin` is the container's top-left in client space and
/// `scroll` its current scroll offset.
pub fn client_to_container(point: Point, container_origin: Point, scroll: Point) -> Point {
    Point::new(
        point.x - container_origin.x + scroll.x,
        point.y - container_origin.y + scroll.y,
    )
}

/// Map a client-space rectangle into container space.
pub fn client_rect_to_container(rect: &Rect, container_origin: Point, scroll: Point) -> Rect {
    rect.translate(scroll.x - container_origin.x, scroll.y - container_origin.y)
}

/// Map a container-space rectangle back into client space, e.g. to place an
/// overlay inside the visible viewport.
pub fn container_rect_to_client(rect: &Rect, container_origin: Point, scroll: Point) -> Rect {
    rect.translate(container_origin.x - scroll.x, container_origin.y - scroll.y)
}
