// ============================================================================
// GEOMETRY — world-space rectangles and point helpers
// ============================================================================

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in world units.  `w`/`h` are always non-negative
/// for rects produced by [`WorldRect::from_points`]; a rect with zero width
/// or height is degenerate and treated explicitly by callers.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl WorldRect {
    pub const ZERO: WorldRect = WorldRect { x: 0.0, y: 0.0, w: 0.0, h: 0.0 };

    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Build a normalized rect from two corner points in any order.
    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self { x: min.x, y: min.y, w: max.x - min.x, h: max.y - min.y }
    }

    pub fn min(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x + self.w, self.y + self.h)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    pub fn is_degenerate(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    /// AABB overlap test.  Touching edges count as intersecting, matching the
    /// inclusive rectangle semantics of the selection tool.
    pub fn intersects(&self, other: &WorldRect) -> bool {
        self.x <= other.x + other.w
            && other.x <= self.x + self.w
            && self.y <= other.y + other.h
            && other.y <= self.y + self.h
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x < self.x + self.w && p.y >= self.y && p.y < self.y + self.h
    }

    /// Smallest rect covering both `self` and `other`.
    pub fn union(&self, other: &WorldRect) -> WorldRect {
        let min = self.min().min(other.min());
        let max = self.max().max(other.max());
        WorldRect { x: min.x, y: min.y, w: max.x - min.x, h: max.y - min.y }
    }
}
