// ============================================================================
// DRAW SURFACE — the only capability the engine needs from a host toolkit
// ============================================================================

use glam::Vec2;
use image::{Rgba, RgbaImage};

use crate::geometry::WorldRect;

/// Abstract 2D drawing surface.  The paint step composites through this
/// trait; UI adapters implement it over their native painter.  The transform
/// stack supports uniform scale plus translate, which covers the viewport
/// mapping `screen = (world + pan) * zoom`.
pub trait DrawSurface {
    /// Fill the whole surface with `color`.
    fn fill_background(&mut self, color: Rgba<u8>);
    /// Push `scale` then `translate` onto the transform stack; subsequent
    /// coordinates are world units.
    fn push_transform(&mut self, scale: f32, translate: Vec2);
    fn pop_transform(&mut self);
    /// Blit a bitmap with its top-left at `pos` (current transform space),
    /// blended with `opacity` in [0, 1].
    fn draw_bitmap(&mut self, bitmap: &RgbaImage, pos: Vec2, opacity: f32);
    /// Unfilled rectangle outline.
    fn draw_rect_outline(&mut self, rect: WorldRect, stroke_width: f32, color: Rgba<u8>);
}

/// Surface that records draw calls instead of rasterizing, for paint-step
/// tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSurface {
    pub calls: Vec<DrawCall>,
}

#[cfg(test)]
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum DrawCall {
    Background(Rgba<u8>),
    PushTransform { scale: f32, translate: Vec2 },
    PopTransform,
    Bitmap { size: (u32, u32), pos: Vec2, opacity: f32 },
    RectOutline { rect: WorldRect, stroke_width: f32, color: Rgba<u8> },
}

#[cfg(test)]
impl DrawSurface for RecordingSurface {
    fn fill_background(&mut self, color: Rgba<u8>) {
        self.calls.push(DrawCall::Background(color));
    }

    fn push_transform(&mut self, scale: f32, translate: Vec2) {
        self.calls.push(DrawCall::PushTransform { scale, translate });
    }

    fn pop_transform(&mut self) {
        self.calls.push(DrawCall::PopTransform);
    }

    fn draw_bitmap(&mut self, bitmap: &RgbaImage, pos: Vec2, opacity: f32) {
        self.calls.push(DrawCall::Bitmap { size: bitmap.dimensions(), pos, opacity });
    }

    fn draw_rect_outline(&mut self, rect: WorldRect, stroke_width: f32, color: Rgba<u8>) {
        self.calls.push(DrawCall::RectOutline { rect, stroke_width, color });
    }
}
