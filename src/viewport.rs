//! Pan/zoom viewport math for the infinite canvas.
//!
//! Stored note positions are world coordinates; pointer input arrives in
//! screen coordinates relative to the canvas container's top-left corner.
//! The contract the canvas layer builds on:
//!
//! ```text
//! worldX = (screenX - panX) / scale
//! worldY = (screenY - panY) / scale
//! ```
//!
//! Drag deltas are divided by scale before being added to a note's stored
//! position, since deltas are measured in screen space.

use crate::models::Note;

/// Zoom bounds. Scale is clamped so it can never reach zero or go negative.
pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 6.0;

/// Pannable world region: x bounded on both sides, y only from above.
pub const EXTENT_MIN_X: f64 = -2000.0;
pub const EXTENT_MIN_Y: f64 = -2000.0;
pub const EXTENT_MAX_X: f64 = 20000.0;

/// Clamp a requested zoom level into the valid range.
///
/// Non-finite requests reset to 1.0.
pub fn clamp_zoom(scale: f64) -> f64 {
    if scale.is_finite() {
        scale.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

/// Current pan offset and zoom scale of the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub pan_x: f64,
    pub pan_y: f64,
    scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            scale: 1.0,
        }
    }
}

impl Viewport {
    /// Create a viewport; the scale is clamped into [MIN_ZOOM, MAX_ZOOM].
    pub fn new(pan_x: f64, pan_y: f64, scale: f64) -> Self {
        Self {
            pan_x,
            pan_y,
            scale: clamp_zoom(scale),
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = clamp_zoom(scale);
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen_x: f64, screen_y: f64) -> (f64, f64) {
        (
            (screen_x - self.pan_x) / self.scale,
            (screen_y - self.pan_y) / self.scale,
        )
    }

    /// Convert a world point back to screen coordinates.
    pub fn world_to_screen(&self, world_x: f64, world_y: f64) -> (f64, f64) {
        (
            world_x * self.scale + self.pan_x,
            world_y * self.scale + self.pan_y,
        )
    }

    /// Convert a drag delta measured in screen pixels into world units.
    pub fn drag_delta_to_world(&self, dx: f64, dy: f64) -> (f64, f64) {
        (dx / self.scale, dy / self.scale)
    }

    /// The viewport that places `(world_x, world_y)` at the center of a view
    /// of `view_width` x `view_height` pixels, at the given zoom.
    ///
    /// Used by jump-to-note: the canvas layer animates from the current
    /// viewport to this one.
    pub fn centered_on(
        world_x: f64,
        world_y: f64,
        view_width: f64,
        view_height: f64,
        zoom: f64,
    ) -> Self {
        let scale = clamp_zoom(zoom);
        Self {
            pan_x: view_width / 2.0 - world_x * scale,
            pan_y: view_height / 2.0 - world_y * scale,
            scale,
        }
    }

    /// The viewport centered on a note (jump-to-note target).
    pub fn centered_on_note(note: &Note, view_width: f64, view_height: f64, zoom: f64) -> Self {
        let (cx, cy) = note.center();
        Self::centered_on(cx, cy, view_width, view_height, zoom)
    }
}

/// Clamp a world position into the pannable extent.
pub fn clamp_to_extent(x: f64, y: f64) -> (f64, f64) {
    (x.clamp(EXTENT_MIN_X, EXTENT_MAX_X), y.max(EXTENT_MIN_Y))
}
