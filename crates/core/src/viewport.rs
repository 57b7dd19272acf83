//! Pan/zoom state machine for the single-image detail view.
//!
//! Scale is clamped to `[1, 4]`; panning is only meaningful above
//! scale 1 and captures the pointer offset at drag start so motion is
//! relative. Wheel zoom anchors at the pointer position instead of the
//! viewport centre. Closing the view resets everything.

use serde::{Deserialize, Serialize};

pub const MIN_SCALE: f64 = 1.0;
pub const MAX_SCALE: f64 = 4.0;
/// Scale step for the zoom buttons.
pub const BUTTON_STEP: f64 = 0.5;
/// Scale step for modifier+wheel zoom.
pub const WHEEL_STEP: f64 = 0.25;

/// Viewport state for one inspected image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub is_dragging: bool,
    /// Pointer-minus-offset captured at drag start.
    drag_start_x: f64,
    drag_start_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: MIN_SCALE,
            offset_x: 0.0,
            offset_y: 0.0,
            is_dragging: false,
            drag_start_x: 0.0,
            drag_start_y: 0.0,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zoom_in(&mut self) {
        self.scale = (self.scale + BUTTON_STEP).min(MAX_SCALE);
    }

    pub fn zoom_out(&mut self) {
        self.scale = (self.scale - BUTTON_STEP).max(MIN_SCALE);
        if self.scale <= MIN_SCALE {
            // Fully zoomed out: pan has no meaning anymore.
            self.offset_x = 0.0;
            self.offset_y = 0.0;
        }
    }

    /// Wheel zoom anchored at the pointer position `(x, y)` in viewport
    /// coordinates. Offsets are recomputed so the point under the
    /// cursor stays put.
    pub fn wheel_zoom(&mut self, zoom_in: bool, x: f64, y: f64) {
        let new_scale = if zoom_in {
            (self.scale + WHEEL_STEP).min(MAX_SCALE)
        } else {
            (self.scale - WHEEL_STEP).max(MIN_SCALE)
        };
        if (new_scale - self.scale).abs() < f64::EPSILON {
            return;
        }
        let scale_change = new_scale / self.scale;
        self.offset_x = x - (x - self.offset_x) * scale_change;
        self.offset_y = y - (y - self.offset_y) * scale_change;
        self.scale = new_scale;
    }

    /// Begin a drag at pointer `(x, y)`. Ignored at identity scale.
    pub fn begin_drag(&mut self, x: f64, y: f64) {
        if self.scale > MIN_SCALE {
            self.is_dragging = true;
            self.drag_start_x = x - self.offset_x;
            self.drag_start_y = y - self.offset_y;
        }
    }

    /// Continue a drag: motion is relative to the captured start point.
    pub fn drag_to(&mut self, x: f64, y: f64) {
        if self.is_dragging && self.scale > MIN_SCALE {
            self.offset_x = x - self.drag_start_x;
            self.offset_y = y - self.drag_start_y;
        }
    }

    pub fn end_drag(&mut self) {
        self.is_dragging = false;
    }

    /// Return to identity. Called on reset and whenever the detail view
    /// closes.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
