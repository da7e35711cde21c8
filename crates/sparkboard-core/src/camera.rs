//! Viewport onto the board: pan offset and zoom.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Relates board space to screen space.
///
/// `screen = board * zoom + offset`. Boards are larger than any viewport,
/// so the camera also decides which region an organize pass targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Current translation offset (pan), in screen pixels
    pub offset: Vec2,
    /// Current zoom level (1.0 = one board pixel per screen pixel)
    pub zoom: f64,
    /// Minimum allowed zoom level
    pub min_zoom: f64,
    /// Maximum allowed zoom level
    pub max_zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: 0.25,
            max_zoom: 4.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Board-to-screen transform.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Screen-to-board transform.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-self.offset)
    }

    /// Convert a screen point to board coordinates.
    pub fn screen_to_board(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    /// Convert a board point to screen coordinates.
    pub fn board_to_screen(&self, board_point: Point) -> Point {
        self.transform() * board_point
    }

    /// Pan by a delta in screen coordinates. Non-finite deltas are ignored.
    pub fn pan(&mut self, delta: Vec2) {
        if delta.is_finite() {
            self.offset += delta;
        }
    }

    /// Zoom, keeping the given screen point fixed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let new_zoom = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }

        let anchor = self.screen_to_board(screen_point);
        self.zoom = new_zoom;
        let moved = self.board_to_screen(anchor);
        self.offset += screen_point - moved;
    }

    /// The board-space rectangle visible through a viewport of the given size.
    pub fn visible_region(&self, viewport: Size) -> Rect {
        let top_left = self.screen_to_board(Point::ZERO);
        let bottom_right = self.screen_to_board(Point::new(viewport.width, viewport.height));
        Rect::from_points(top_left, bottom_right)
    }

    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.zoom = 1.0;
    }
}
