// ============================================================================
// FRAGMENT STORE — owns the fragment set and single-selection state
// ============================================================================

use image::RgbaImage;

use crate::events::{CanvasEvent, EventBus};
use crate::fragment::{Fragment, FragmentId};
use crate::geometry::WorldRect;
use crate::log_info;

/// Ordered collection of fragments (insertion order is draw order: last added
/// draws frontmost) plus the primary-selection pointer.
///
/// Invariants: ids are unique; at most one fragment carries the `selected`
/// flag, and it matches `selected_id`.  Operations given an unknown id are
/// silent no-ops returning a failure indicator, never an error.
#[derive(Default)]
pub struct FragmentStore {
    fragments: Vec<Fragment>,
    selected_id: Option<FragmentId>,
    /// Set by every mutation; observers that poll instead of subscribing
    /// read-and-clear it via `take_changed`.
    changed: bool,
    pub events: EventBus,
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment built from already-validated pixel data (`None` leaves
    /// it pending render).  The first fragment added is auto-selected.
    pub fn add(
        &mut self,
        pixels: Option<RgbaImage>,
        name: impl Into<String>,
        source_path: impl Into<String>,
    ) -> FragmentId {
        let fragment = Fragment::new(name, source_path, pixels);
        let id = fragment.id;
        self.fragments.push(fragment);
        log_info!("added fragment {} ({} total)", id, self.fragments.len());

        if self.fragments.len() == 1 {
            self.select(Some(id));
        }
        self.mark_changed();
        id
    }

    /// Insert a fully-formed fragment (used by metadata import, which must
    /// preserve ids).  An id already present is overwritten in place, keeping
    /// ids unique with the last record winning.
    pub(crate) fn insert(&mut self, fragment: Fragment) {
        if let Some(existing) = self.fragments.iter_mut().find(|f| f.id == fragment.id) {
            *existing = fragment;
        } else {
            self.fragments.push(fragment);
        }
        self.mark_changed();
    }

    /// Remove a fragment.  If it held the primary selection, an arbitrary
    /// remaining fragment is promoted (or selection is cleared).
    pub fn remove(&mut self, id: FragmentId) -> bool {
        let Some(idx) = self.fragments.iter().position(|f| f.id == id) else {
            return false;
        };
        self.fragments.remove(idx);

        if self.selected_id == Some(id) {
            let next = self.fragments.first().map(|f| f.id);
            self.select(next);
        }
        self.mark_changed();
        true
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
        self.selected_id = None;
        self.mark_changed();
    }

    pub fn get(&self, id: FragmentId) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.id == id)
    }

    pub fn get_mut(&mut self, id: FragmentId) -> Option<&mut Fragment> {
        self.fragments.iter_mut().find(|f| f.id == id)
    }

    /// All fragments in draw order (first = bottom).
    pub fn list_all(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn list_visible(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter().filter(|f| f.visible)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Set (or clear) the primary selection.  Clears the previous fragment's
    /// `selected` flag first; an unknown id is a silent no-op.
    pub fn select(&mut self, id: Option<FragmentId>) {
        if let Some(id) = id
            && !self.fragments.iter().any(|f| f.id == id)
        {
            return;
        }

        if let Some(prev) = self.selected_id
            && let Some(frag) = self.get_mut(prev)
        {
            frag.selected = false;
        }

        self.selected_id = id;
        if let Some(id) = id
            && let Some(frag) = self.get_mut(id)
        {
            frag.selected = true;
        }

        self.events.emit(CanvasEvent::SelectionChanged(id));
        self.mark_changed();
    }

    pub fn selected_id(&self) -> Option<FragmentId> {
        self.selected_id
    }

    pub fn selected_fragment(&self) -> Option<&Fragment> {
        self.selected_id.and_then(|id| self.get(id))
    }

    pub fn set_visible(&mut self, id: FragmentId, visible: bool) -> bool {
        let Some(frag) = self.get_mut(id) else { return false };
        frag.visible = visible;
        // The cached bitmap is stale while hidden; force a re-derive on show.
        frag.invalidate_cache();
        self.mark_changed();
        true
    }

    /// Compositing alpha only; never touches pixel data or the cache.
    pub fn set_opacity(&mut self, id: FragmentId, opacity: f32) -> bool {
        let Some(frag) = self.get_mut(id) else { return false };
        frag.opacity = opacity.clamp(0.0, 1.0);
        self.mark_changed();
        true
    }

    /// Bind validated pixel data to a pending-render fragment.
    pub fn set_pixel_data(&mut self, id: FragmentId, pixels: RgbaImage) -> bool {
        let Some(frag) = self.get_mut(id) else { return false };
        frag.set_pixels(pixels);
        self.mark_changed();
        true
    }

    /// Union AABB of all visible fragments' transformed bounding boxes.
    /// Returns the all-zero rect when nothing visible has pixel data — an
    /// explicit edge case, not an error.
    pub fn composite_bounds(&self) -> WorldRect {
        let mut bounds: Option<WorldRect> = None;
        for frag in self.list_visible() {
            if let Some(bbox) = frag.bounding_box() {
                bounds = Some(match bounds {
                    Some(b) => b.union(&bbox),
                    None => bbox,
                });
            }
        }
        bounds.unwrap_or(WorldRect::ZERO)
    }

    /// Flag the store changed and notify observers.  Every mutation of any
    /// fragment field funnels through here.
    pub fn mark_changed(&mut self) {
        self.changed = true;
        self.events.emit(CanvasEvent::FragmentsChanged);
    }

    pub fn take_changed(&mut self) -> bool {
        std::mem::replace(&mut self.changed, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([128, 128, 128, 255]))
    }

    #[test]
    fn first_fragment_is_auto_selected() {
        let mut store = FragmentStore::new();
        let a = store.add(Some(solid(4, 4)), "a", "");
        assert_eq!(store.selected_id(), Some(a));
        assert!(store.get(a).unwrap().selected);

        let b = store.add(Some(solid(4, 4)), "b", "");
        assert_eq!(store.selected_id(), Some(a), "later adds do not steal selection");
        assert!(!store.get(b).unwrap().selected);
    }

    #[test]
    fn select_clears_previous_flag_and_ignores_unknown() {
        let mut store = FragmentStore::new();
        let a = store.add(Some(solid(4, 4)), "a", "");
        let b = store.add(Some(solid(4, 4)), "b", "");

        store.select(Some(b));
        assert!(!store.get(a).unwrap().selected);
        assert!(store.get(b).unwrap().selected);

        store.select(Some(FragmentId::new())); // unknown: silent no-op
        assert_eq!(store.selected_id(), Some(b));

        store.select(None);
        assert_eq!(store.selected_id(), None);
        assert!(!store.get(b).unwrap().selected);
    }

    #[test]
    fn removing_selected_fragment_promotes_a_remaining_one() {
        let mut store = FragmentStore::new();
        let a = store.add(Some(solid(4, 4)), "a", "");
        let b = store.add(Some(solid(4, 4)), "b", "");

        assert!(store.remove(a));
        assert_eq!(store.selected_id(), Some(b));

        assert!(store.remove(b));
        assert_eq!(store.selected_id(), None);
        assert!(!store.remove(b), "second remove reports absence");
    }

    #[test]
    fn composite_bounds_unions_visible_fragments_only() {
        let mut store = FragmentStore::new();
        assert_eq!(store.composite_bounds(), WorldRect::ZERO);

        let a = store.add(Some(solid(100, 50)), "a", "");
        let b = store.add(Some(solid(10, 10)), "b", "");
        {
            let fb = store.get_mut(b).unwrap();
            fb.x = 200.0;
            fb.y = -20.0;
        }
        assert_eq!(store.composite_bounds(), WorldRect::new(0.0, -20.0, 210.0, 70.0));

        store.set_visible(b, false);
        assert_eq!(store.composite_bounds(), WorldRect::new(0.0, 0.0, 100.0, 50.0));

        store.set_visible(a, false);
        assert_eq!(store.composite_bounds(), WorldRect::ZERO);
    }

    #[test]
    fn pending_render_fragments_are_listed_but_skip_bounds() {
        let mut store = FragmentStore::new();
        store.add(None, "pending", "slide.tif");
        assert_eq!(store.len(), 1);
        assert_eq!(store.composite_bounds(), WorldRect::ZERO);
    }

    #[test]
    fn opacity_is_clamped_and_never_invalidates_cache() {
        let mut store = FragmentStore::new();
        let a = store.add(Some(solid(4, 4)), "a", "");
        store.get_mut(a).unwrap().cache_valid = true;

        assert!(store.set_opacity(a, 3.5));
        let frag = store.get(a).unwrap();
        assert_eq!(frag.opacity, 1.0);
        assert!(frag.cache_valid);
    }

    #[test]
    fn mutations_set_the_changed_flag() {
        let mut store = FragmentStore::new();
        let a = store.add(Some(solid(4, 4)), "a", "");
        assert!(store.take_changed());
        assert!(!store.take_changed());
        store.set_opacity(a, 0.5);
        assert!(store.take_changed());
    }

    #[test]
    fn selection_events_are_emitted() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = FragmentStore::new();
        {
            let seen = Rc::clone(&seen);
            store.events.subscribe(move |ev| {
                if let CanvasEvent::SelectionChanged(id) = ev {
                    seen.borrow_mut().push(*id);
                }
            });
        }
        let a = store.add(Some(solid(4, 4)), "a", "");
        store.select(None);
        assert_eq!(*seen.borrow(), vec![Some(a), None]);
    }
}
