// ============================================================================
// VIEWPORT — zoom/pan state and the world↔screen mapping
// ============================================================================

use glam::Vec2;

use crate::geometry::WorldRect;

pub const DEFAULT_MIN_ZOOM: f32 = 0.01;
pub const DEFAULT_MAX_ZOOM: f32 = 50.0;

/// Fraction of the viewport left as padding by `fit_to_content`.
pub const FIT_PADDING_FRACTION: f32 = 0.9;

/// Per-canvas view state.  Mapping: `screen = (world + pan) * zoom`;
/// pan is stored in world units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    zoom: f32,
    pub pan: Vec2,
    pub min_zoom: f32,
    pub max_zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: Vec2::ZERO,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Clamped on every write.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        (world + self.pan) * self.zoom
    }

    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        screen / self.zoom - self.pan
    }

    /// Multiply zoom by `factor`, keeping the world point under
    /// `screen_point` fixed on screen.  No-op when the clamp leaves zoom
    /// unchanged.  Returns whether anything changed.
    pub fn zoom_at(&mut self, screen_point: Vec2, factor: f32) -> bool {
        let target = self.screen_to_world(screen_point);
        let new_zoom = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        if new_zoom == self.zoom {
            return false;
        }
        self.zoom = new_zoom;
        let drifted = self.screen_to_world(screen_point);
        self.pan += drifted - target;
        true
    }

    /// Pan by a screen-space delta (drag gestures hand us screen pixels).
    pub fn pan_by_screen_delta(&mut self, delta: Vec2) {
        self.pan += delta / self.zoom;
    }

    /// Frame `bounds` inside a viewport of `viewport_size` screen pixels,
    /// leaving `FIT_PADDING_FRACTION` of the fitted zoom as padding and
    /// centering the content.  Degenerate bounds or viewport: no-op.
    pub fn fit_to_content(&mut self, bounds: WorldRect, viewport_size: Vec2) -> bool {
        if bounds.is_degenerate() || viewport_size.x <= 0.0 || viewport_size.y <= 0.0 {
            return false;
        }
        let fit = (viewport_size.x / bounds.w).min(viewport_size.y / bounds.h);
        self.set_zoom(fit * FIT_PADDING_FRACTION);

        // Center of content maps to center of viewport:
        // screen_center = (content_center + pan) * zoom
        let center = bounds.center();
        self.pan = viewport_size * 0.5 / self.zoom - center;
        true
    }

    pub fn reset(&mut self) {
        self.zoom = 1.0;
        self.pan = Vec2::ZERO;
    }

    /// World rect currently visible in a viewport of `screen_size` pixels,
    /// used for culling.
    pub fn visible_world_rect(&self, screen_size: Vec2) -> WorldRect {
        let top_left = self.screen_to_world(Vec2::ZERO);
        let bottom_right = self.screen_to_world(screen_size);
        WorldRect::from_points(top_left, bottom_right)
    }
}
