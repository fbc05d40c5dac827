// ============================================================================
// FRAGMENT — one placed image piece and its pixel-transform derivation
// ============================================================================

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::geometry::WorldRect;

/// Rotations closer than this to a right angle take the exact
/// `imageops::rotate90/180/270` path instead of resampling.
pub const RIGHT_ANGLE_EPSILON: f32 = 0.01;

/// Opaque unique fragment identifier, stable for the fragment's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentId(Uuid);

impl FragmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FragmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FragmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a raw pixel buffer was rejected.  A fragment with rejected (or not yet
/// supplied) pixel data stays in the store as "pending render": listed, but
/// skipped by caching, drawing, hit-testing and bounds computation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PixelDataError {
    #[error("empty pixel buffer")]
    Empty,
    #[error("zero-size image ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },
    #[error("unsupported channel count {0} (expected 3 or 4)")]
    UnsupportedChannels(u8),
    #[error("buffer length {actual} does not match {expected} for the given dimensions")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Validate an interleaved 8-bit buffer (RGB or RGBA) and convert it to RGBA.
pub fn pixels_from_raw(
    width: u32,
    height: u32,
    channels: u8,
    data: &[u8],
) -> Result<RgbaImage, PixelDataError> {
    if data.is_empty() {
        return Err(PixelDataError::Empty);
    }
    if width == 0 || height == 0 {
        return Err(PixelDataError::ZeroSize { width, height });
    }
    if channels != 3 && channels != 4 {
        return Err(PixelDataError::UnsupportedChannels(channels));
    }
    let expected = width as usize * height as usize * channels as usize;
    if data.len() != expected {
        return Err(PixelDataError::LengthMismatch { expected, actual: data.len() });
    }
    let rgba = match channels {
        4 => RgbaImage::from_raw(width, height, data.to_vec())
            .ok_or(PixelDataError::LengthMismatch { expected, actual: data.len() })?,
        _ => {
            let mut out = Vec::with_capacity(width as usize * height as usize * 4);
            for px in data.chunks_exact(3) {
                out.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
            RgbaImage::from_raw(width, height, out)
                .ok_or(PixelDataError::LengthMismatch { expected, actual: data.len() })?
        }
    };
    Ok(rgba)
}

/// One placed image piece on the canvas.
///
/// Position and orientation live in world units; `rotation` is kept in
/// [0, 360) by every mutator.  `cache_valid` is false whenever the cached
/// rotated/flipped bitmap held by the render cache no longer reflects the
/// current rotation/flip state.
pub struct Fragment {
    pub id: FragmentId,
    pub name: String,
    pub source_path: String,
    /// Immutable after load.  `None` means the fragment is pending render.
    pixels: Option<RgbaImage>,
    pub x: f32,
    pub y: f32,
    /// Degrees, always in [0, 360).
    pub rotation: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Compositing alpha in [0, 1]; never affects pixel data or the cache.
    pub opacity: f32,
    pub visible: bool,
    /// Mirror of the store's primary-selection pointer, kept for rendering
    /// convenience; the store is authoritative.
    pub selected: bool,
    pub cache_valid: bool,
}

impl Fragment {
    pub fn new(name: impl Into<String>, source_path: impl Into<String>, pixels: Option<RgbaImage>) -> Self {
        Self {
            id: FragmentId::new(),
            name: name.into(),
            source_path: source_path.into(),
            pixels,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            flip_horizontal: false,
            flip_vertical: false,
            opacity: 1.0,
            visible: true,
            selected: false,
            cache_valid: false,
        }
    }

    pub fn pixels(&self) -> Option<&RgbaImage> {
        self.pixels.as_ref()
    }

    pub fn has_pixel_data(&self) -> bool {
        self.pixels.is_some()
    }

    /// Bind (or replace) the source pixel buffer.  The render cache must
    /// re-derive afterwards.
    pub fn set_pixels(&mut self, pixels: RgbaImage) {
        self.pixels = Some(pixels);
        self.invalidate_cache();
    }

    pub fn invalidate_cache(&mut self) {
        self.cache_valid = false;
    }

    pub fn reset_transform(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
        self.rotation = 0.0;
        self.flip_horizontal = false;
        self.flip_vertical = false;
        self.invalidate_cache();
    }

    /// Dimensions of the rotated/flipped image, without touching pixel data.
    /// Right angles swap width/height exactly; arbitrary angles use the
    /// rotated AABB.  `None` while pending render.
    pub fn transformed_size(&self) -> Option<(u32, u32)> {
        let px = self.pixels.as_ref()?;
        Some(rotated_dimensions(px.width(), px.height(), self.rotation))
    }

    /// World-space bounding box of the transformed image at the current
    /// position.  `None` while pending render.
    pub fn bounding_box(&self) -> Option<WorldRect> {
        let (w, h) = self.transformed_size()?;
        Some(WorldRect::new(self.x, self.y, w as f32, h as f32))
    }

    /// Derive the displayable bitmap: flips first (horizontal, then vertical),
    /// then rotation.  This order is fixed; hit-testing applies its exact
    /// inverse.  Expensive for arbitrary angles — callers cache the result.
    pub fn derive_bitmap(&self) -> Option<RgbaImage> {
        let px = self.pixels.as_ref()?;
        Some(derive_bitmap(px, self.rotation, self.flip_horizontal, self.flip_vertical))
    }
}

/// Apply flips then rotation to a source buffer.
pub fn derive_bitmap(src: &RgbaImage, rotation: f32, flip_h: bool, flip_v: bool) -> RgbaImage {
    let flipped: RgbaImage;
    let mut img: &RgbaImage = src;
    if flip_h || flip_v {
        let mut tmp = if flip_h { imageops::flip_horizontal(img) } else { img.clone() };
        if flip_v {
            tmp = imageops::flip_vertical(&tmp);
        }
        flipped = tmp;
        img = &flipped;
    }

    if (rotation - 0.0).abs() < RIGHT_ANGLE_EPSILON || (rotation - 360.0).abs() < RIGHT_ANGLE_EPSILON {
        img.clone()
    } else if (rotation - 90.0).abs() < RIGHT_ANGLE_EPSILON {
        imageops::rotate90(img)
    } else if (rotation - 180.0).abs() < RIGHT_ANGLE_EPSILON {
        imageops::rotate180(img)
    } else if (rotation - 270.0).abs() < RIGHT_ANGLE_EPSILON {
        imageops::rotate270(img)
    } else {
        rotate_arbitrary(img, rotation)
    }
}

/// AABB dimensions of a w×h image rotated by `degrees` (clockwise, y-down).
pub fn rotated_dimensions(width: u32, height: u32, degrees: f32) -> (u32, u32) {
    let deg = degrees.rem_euclid(360.0);
    if (deg - 0.0).abs() < RIGHT_ANGLE_EPSILON
        || (deg - 180.0).abs() < RIGHT_ANGLE_EPSILON
        || (deg - 360.0).abs() < RIGHT_ANGLE_EPSILON
    {
        (width, height)
    } else if (deg - 90.0).abs() < RIGHT_ANGLE_EPSILON || (deg - 270.0).abs() < RIGHT_ANGLE_EPSILON {
        (height, width)
    } else {
        let theta = deg.to_radians();
        let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
        let w = width as f32;
        let h = height as f32;
        (
            (w * cos + h * sin).ceil().max(1.0) as u32,
            (w * sin + h * cos).ceil().max(1.0) as u32,
        )
    }
}

/// Rotate by an arbitrary angle (clockwise, y-down) onto an expanded canvas
/// sized to the rotated AABB.  Inverse-mapped bilinear sampling; pixels that
/// map outside the source stay fully transparent.  Rows are resampled in
/// parallel.
fn rotate_arbitrary(src: &RgbaImage, degrees: f32) -> RgbaImage {
    let (src_w, src_h) = (src.width(), src.height());
    let (dst_w, dst_h) = rotated_dimensions(src_w, src_h, degrees);

    let theta = degrees.to_radians();
    let (sin, cos) = theta.sin_cos();
    let src_cx = src_w as f32 * 0.5;
    let src_cy = src_h as f32 * 0.5;
    let dst_cx = dst_w as f32 * 0.5;
    let dst_cy = dst_h as f32 * 0.5;

    let row_stride = dst_w as usize * 4;
    let mut buf = vec![0u8; row_stride * dst_h as usize];

    buf.par_chunks_mut(row_stride).enumerate().for_each(|(y, row)| {
        let dy = y as f32 + 0.5 - dst_cy;
        for x in 0..dst_w as usize {
            let dx = x as f32 + 0.5 - dst_cx;
            // Inverse rotation: dest → source.
            let sx = cos * dx + sin * dy + src_cx - 0.5;
            let sy = -sin * dx + cos * dy + src_cy - 0.5;
            let px = sample_bilinear(src, sx, sy);
            row[x * 4..x * 4 + 4].copy_from_slice(&px.0);
        }
    });

    RgbaImage::from_raw(dst_w, dst_h, buf).unwrap_or_else(|| RgbaImage::new(dst_w, dst_h))
}

/// Bilinear sample at a continuous source coordinate; out-of-bounds taps
/// contribute transparent black.
fn sample_bilinear(src: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let tap = |ix: f32, iy: f32| -> [f32; 4] {
        if ix < 0.0 || iy < 0.0 || ix >= src.width() as f32 || iy >= src.height() as f32 {
            [0.0; 4]
        } else {
            let p = src.get_pixel(ix as u32, iy as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };

    let p00 = tap(x0, y0);
    let p10 = tap(x0 + 1.0, y0);
    let p01 = tap(x0, y0 + 1.0);
    let p11 = tap(x0 + 1.0, y0 + 1.0);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    #[test]
    fn raw_rgb_expands_to_opaque_rgba() {
        let img = pixels_from_raw(2, 1, 3, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [4, 5, 6, 255]);
    }

    #[test]
    fn raw_buffer_validation_rejects_malformed_data() {
        assert_eq!(pixels_from_raw(2, 2, 4, &[]), Err(PixelDataError::Empty));
        assert_eq!(
            pixels_from_raw(0, 5, 4, &[0]),
            Err(PixelDataError::ZeroSize { width: 0, height: 5 })
        );
        assert_eq!(pixels_from_raw(1, 1, 2, &[0, 0]), Err(PixelDataError::UnsupportedChannels(2)));
        assert_eq!(
            pixels_from_raw(2, 2, 4, &[0; 15]),
            Err(PixelDataError::LengthMismatch { expected: 16, actual: 15 })
        );
    }

    #[test]
    fn right_angle_rotation_swaps_bounding_box() {
        let mut frag = Fragment::new("a", "", Some(solid(100, 50, [255, 0, 0, 255])));
        assert_eq!(frag.bounding_box(), Some(WorldRect::new(0.0, 0.0, 100.0, 50.0)));
        frag.rotation = 90.0;
        assert_eq!(frag.bounding_box(), Some(WorldRect::new(0.0, 0.0, 50.0, 100.0)));
        frag.rotation = 180.0;
        assert_eq!(frag.bounding_box(), Some(WorldRect::new(0.0, 0.0, 100.0, 50.0)));
    }

    #[test]
    fn square_bounding_box_unaffected_by_right_angles() {
        let mut frag = Fragment::new("sq", "", Some(solid(100, 100, [0, 0, 0, 255])));
        frag.rotation = 90.0;
        assert_eq!(frag.transformed_size(), Some((100, 100)));
    }

    #[test]
    fn pending_render_fragment_has_no_bounds() {
        let frag = Fragment::new("pending", "scan.tif", None);
        assert!(frag.bounding_box().is_none());
        assert!(frag.derive_bitmap().is_none());
    }

    #[test]
    fn derive_applies_flip_before_rotation() {
        // 2x1 image: [A, B].  flip_h -> [B, A]; rotate90 cw -> column [B; A].
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([10, 0, 0, 255])); // A
        img.put_pixel(1, 0, Rgba([20, 0, 0, 255])); // B

        let out = derive_bitmap(&img, 90.0, true, false);
        assert_eq!(out.dimensions(), (1, 2));
        assert_eq!(out.get_pixel(0, 0).0[0], 20);
        assert_eq!(out.get_pixel(0, 1).0[0], 10);
    }

    #[test]
    fn derive_vertical_flip() {
        let mut img = RgbaImage::new(1, 2);
        img.put_pixel(0, 0, Rgba([10, 0, 0, 255]));
        img.put_pixel(0, 1, Rgba([20, 0, 0, 255]));
        let out = derive_bitmap(&img, 0.0, false, true);
        assert_eq!(out.get_pixel(0, 0).0[0], 20);
        assert_eq!(out.get_pixel(0, 1).0[0], 10);
    }

    #[test]
    fn arbitrary_rotation_expands_canvas_and_fills_transparent() {
        let src = solid(100, 50, [0, 255, 0, 255]);
        let out = derive_bitmap(&src, 45.0, false, false);
        let (w, h) = rotated_dimensions(100, 50, 45.0);
        assert_eq!(out.dimensions(), (w, h));
        assert!(w > 100 && h > 50);
        // Corner of the expanded canvas lies outside the rotated source.
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
        // Center is inside.
        assert_eq!(out.get_pixel(w / 2, h / 2).0[3], 255);
    }

    #[test]
    fn rotated_dimensions_right_angles_are_exact() {
        assert_eq!(rotated_dimensions(100, 50, 0.0), (100, 50));
        assert_eq!(rotated_dimensions(100, 50, 90.0), (50, 100));
        assert_eq!(rotated_dimensions(100, 50, 270.0), (50, 100));
        assert_eq!(rotated_dimensions(100, 50, 180.0), (100, 50));
    }
}
