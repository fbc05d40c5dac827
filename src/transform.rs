// ============================================================================
// TRANSFORM ENGINE — placement/orientation mutators and invalidation policy
// ============================================================================
//
// Every mutator is a silent no-op (returning false) when the target id is
// absent.  The invalidation rule is the load-bearing invariant here:
// position, opacity and visibility never invalidate the pixel-transform
// cache; rotation and flips always do.  Re-deriving a rotated/flipped bitmap
// is a full resample, re-placing a cached bitmap is free.

use crate::fragment::FragmentId;
use crate::store::FragmentStore;

/// Flip axis for [`toggle_flip`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

/// Closed set of supported transform operations with typed payloads,
/// replacing ad-hoc request strings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransformOp {
    SetPosition { x: f32, y: f32 },
    Translate { dx: f32, dy: f32 },
    SetRotation { degrees: f32 },
    RotateBy { degrees: f32 },
    ToggleFlip { axis: FlipAxis },
    Reset,
}

/// Batched transform write.  Fields left `None` are untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransformRequest {
    pub rotation: Option<f32>,
    pub position: Option<(f32, f32)>,
    pub flip_horizontal: Option<bool>,
    pub flip_vertical: Option<bool>,
}

/// Dispatch a [`TransformOp`] against the store.
pub fn apply(store: &mut FragmentStore, id: FragmentId, op: TransformOp) -> bool {
    match op {
        TransformOp::SetPosition { x, y } => set_position(store, id, x, y),
        TransformOp::Translate { dx, dy } => translate(store, id, dx, dy),
        TransformOp::SetRotation { degrees } => set_rotation(store, id, degrees),
        TransformOp::RotateBy { degrees } => rotate_by(store, id, degrees),
        TransformOp::ToggleFlip { axis } => toggle_flip(store, id, axis),
        TransformOp::Reset => reset(store, id),
    }
}

/// Absolute placement.  No rounding, no cache invalidation.
pub fn set_position(store: &mut FragmentStore, id: FragmentId, x: f32, y: f32) -> bool {
    let Some(frag) = store.get_mut(id) else { return false };
    frag.x = x;
    frag.y = y;
    store.mark_changed();
    true
}

/// Relative placement.  No cache invalidation.
pub fn translate(store: &mut FragmentStore, id: FragmentId, dx: f32, dy: f32) -> bool {
    let Some(frag) = store.get_mut(id) else { return false };
    frag.x += dx;
    frag.y += dy;
    store.mark_changed();
    true
}

/// Absolute rotation, normalized into [0, 360).  Invalidates the cache.
pub fn set_rotation(store: &mut FragmentStore, id: FragmentId, degrees: f32) -> bool {
    let Some(frag) = store.get_mut(id) else { return false };
    frag.rotation = degrees.rem_euclid(360.0);
    frag.invalidate_cache();
    store.mark_changed();
    true
}

/// Relative rotation, result normalized into [0, 360).  Invalidates the cache.
pub fn rotate_by(store: &mut FragmentStore, id: FragmentId, degrees: f32) -> bool {
    let Some(frag) = store.get_mut(id) else { return false };
    frag.rotation = (frag.rotation + degrees).rem_euclid(360.0);
    frag.invalidate_cache();
    store.mark_changed();
    true
}

/// Toggle one flip axis.  Invalidates the cache.
pub fn toggle_flip(store: &mut FragmentStore, id: FragmentId, axis: FlipAxis) -> bool {
    let Some(frag) = store.get_mut(id) else { return false };
    match axis {
        FlipAxis::Horizontal => frag.flip_horizontal = !frag.flip_horizontal,
        FlipAxis::Vertical => frag.flip_vertical = !frag.flip_vertical,
    }
    frag.invalidate_cache();
    store.mark_changed();
    true
}

/// Batched write.  Invalidation fires once if any rotation/flip field was
/// present in the request, even when the written value is numerically equal
/// to the current one; a present position field alone never invalidates.
pub fn set_transform(store: &mut FragmentStore, id: FragmentId, req: TransformRequest) -> bool {
    let Some(frag) = store.get_mut(id) else { return false };

    let mut invalidate = false;
    if let Some(degrees) = req.rotation {
        frag.rotation = degrees.rem_euclid(360.0);
        invalidate = true;
    }
    if let Some((x, y)) = req.position {
        frag.x = x;
        frag.y = y;
    }
    if let Some(h) = req.flip_horizontal {
        frag.flip_horizontal = h;
        invalidate = true;
    }
    if let Some(v) = req.flip_vertical {
        frag.flip_vertical = v;
        invalidate = true;
    }
    if invalidate {
        frag.invalidate_cache();
    }
    store.mark_changed();
    true
}

/// Restore position (0, 0), rotation 0, both flips off.  Invalidates the cache.
pub fn reset(store: &mut FragmentStore, id: FragmentId) -> bool {
    let Some(frag) = store.get_mut(id) else { return false };
    frag.reset_transform();
    store.mark_changed();
    true
}

pub fn reset_all(store: &mut FragmentStore) {
    let ids: Vec<FragmentId> = store.list_all().iter().map(|f| f.id).collect();
    for id in ids {
        if let Some(frag) = store.get_mut(id) {
            frag.reset_transform();
        }
    }
    store.mark_changed();
}

/// Rotate every listed fragment in place around its own origin.  Group
/// rotation deliberately does not pivot around the group centroid: members
/// keep their relative positions and only change individual orientation.
pub fn rotate_each(store: &mut FragmentStore, ids: &[FragmentId], degrees: f32) {
    for &id in ids {
        rotate_by(store, id, degrees);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use proptest::prelude::*;

    fn store_with_one() -> (FragmentStore, FragmentId) {
        let mut store = FragmentStore::new();
        let id = store.add(
            Some(RgbaImage::from_pixel(8, 8, Rgba([200, 0, 0, 255]))),
            "a",
            "",
        );
        (store, id)
    }

    #[test]
    fn set_rotation_normalizes_into_range() {
        let (mut store, id) = store_with_one();
        set_rotation(&mut store, id, -90.0);
        assert_eq!(store.get(id).unwrap().rotation, 270.0);
        set_rotation(&mut store, id, 720.0);
        assert_eq!(store.get(id).unwrap().rotation, 0.0);
        set_rotation(&mut store, id, 450.0);
        assert_eq!(store.get(id).unwrap().rotation, 90.0);
    }

    #[test]
    fn position_writes_never_invalidate_the_cache() {
        let (mut store, id) = store_with_one();
        store.get_mut(id).unwrap().cache_valid = true;

        set_position(&mut store, id, 12.5, -3.25);
        translate(&mut store, id, 1.0, 1.0);
        assert!(store.get(id).unwrap().cache_valid);

        let frag = store.get(id).unwrap();
        assert_eq!((frag.x, frag.y), (13.5, -2.25));
    }

    #[test]
    fn rotation_and_flip_always_invalidate() {
        let (mut store, id) = store_with_one();

        store.get_mut(id).unwrap().cache_valid = true;
        rotate_by(&mut store, id, 90.0);
        assert!(!store.get(id).unwrap().cache_valid);

        store.get_mut(id).unwrap().cache_valid = true;
        toggle_flip(&mut store, id, FlipAxis::Horizontal);
        let frag = store.get(id).unwrap();
        assert!(frag.flip_horizontal);
        assert!(!frag.cache_valid);
    }

    #[test]
    fn set_transform_invalidates_on_present_rotation_even_if_equal() {
        let (mut store, id) = store_with_one();
        set_rotation(&mut store, id, 90.0);
        store.get_mut(id).unwrap().cache_valid = true;

        // Same numeric value, but the field is present: still re-triggers.
        set_transform(&mut store, id, TransformRequest { rotation: Some(90.0), ..Default::default() });
        assert!(!store.get(id).unwrap().cache_valid);

        // Position-only request leaves the cache alone.
        store.get_mut(id).unwrap().cache_valid = true;
        set_transform(&mut store, id, TransformRequest { position: Some((5.0, 5.0)), ..Default::default() });
        let frag = store.get(id).unwrap();
        assert!(frag.cache_valid);
        assert_eq!((frag.x, frag.y), (5.0, 5.0));
    }

    #[test]
    fn unknown_id_is_a_silent_no_op() {
        let (mut store, _) = store_with_one();
        let ghost = FragmentId::new();
        assert!(!set_position(&mut store, ghost, 1.0, 1.0));
        assert!(!rotate_by(&mut store, ghost, 90.0));
        assert!(!toggle_flip(&mut store, ghost, FlipAxis::Vertical));
        assert!(!set_transform(&mut store, ghost, TransformRequest::default()));
        assert!(!reset(&mut store, ghost));
    }

    #[test]
    fn reset_restores_defaults() {
        let (mut store, id) = store_with_one();
        apply(&mut store, id, TransformOp::SetPosition { x: 40.0, y: 2.0 });
        apply(&mut store, id, TransformOp::SetRotation { degrees: 45.0 });
        apply(&mut store, id, TransformOp::ToggleFlip { axis: FlipAxis::Vertical });

        apply(&mut store, id, TransformOp::Reset);
        let frag = store.get(id).unwrap();
        assert_eq!((frag.x, frag.y, frag.rotation), (0.0, 0.0, 0.0));
        assert!(!frag.flip_horizontal && !frag.flip_vertical);
        assert!(!frag.cache_valid);
    }

    #[test]
    fn rotate_each_spins_members_in_place() {
        let mut store = FragmentStore::new();
        let px = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let a = store.add(Some(px.clone()), "a", "");
        let b = store.add(Some(px), "b", "");
        set_position(&mut store, a, 10.0, 10.0);
        set_position(&mut store, b, 50.0, 50.0);

        rotate_each(&mut store, &[a, b], 90.0);

        for id in [a, b] {
            assert_eq!(store.get(id).unwrap().rotation, 90.0);
        }
        assert_eq!((store.get(a).unwrap().x, store.get(a).unwrap().y), (10.0, 10.0));
        assert_eq!((store.get(b).unwrap().x, store.get(b).unwrap().y), (50.0, 50.0));
    }

    proptest! {
        /// rotate_by(t) then rotate_by(-t) restores the angle modulo 360.
        #[test]
        fn prop_rotation_round_trips(start in 0.0f32..360.0, theta in -720.0f32..720.0) {
            let (mut store, id) = store_with_one();
            set_rotation(&mut store, id, start);
            let before = store.get(id).unwrap().rotation;

            rotate_by(&mut store, id, theta);
            rotate_by(&mut store, id, -theta);

            let after = store.get(id).unwrap().rotation;
            let diff = (after - before).abs();
            prop_assert!(diff < 1e-3 || (360.0 - diff) < 1e-3, "before={before} after={after}");
        }

        /// set_rotation lands in [0, 360) for any input.
        #[test]
        fn prop_rotation_always_normalized(deg in -10_000.0f32..10_000.0) {
            let (mut store, id) = store_with_one();
            set_rotation(&mut store, id, deg);
            let r = store.get(id).unwrap().rotation;
            prop_assert!((0.0..360.0).contains(&r), "rotation {r} out of range");
        }

        /// translate(a); translate(b) lands where translate(a + b) does.
        #[test]
        fn prop_translate_is_associative(
            ax in -1000.0f32..1000.0, ay in -1000.0f32..1000.0,
            bx in -1000.0f32..1000.0, by in -1000.0f32..1000.0,
        ) {
            let (mut store, id) = store_with_one();
            translate(&mut store, id, ax, ay);
            translate(&mut store, id, bx, by);
            let stepped = (store.get(id).unwrap().x, store.get(id).unwrap().y);

            let (mut store2, id2) = store_with_one();
            translate(&mut store2, id2, ax + bx, ay + by);
            let direct = (store2.get(id2).unwrap().x, store2.get(id2).unwrap().y);

            prop_assert!((stepped.0 - direct.0).abs() < 1e-3);
            prop_assert!((stepped.1 - direct.1).abs() < 1e-3);
        }
    }
}
