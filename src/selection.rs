// ============================================================================
// SELECTION — rectangle multi-select and rigid group drag
// ============================================================================

use std::collections::{HashMap, HashSet};

use glam::Vec2;

use crate::fragment::{Fragment, FragmentId};
use crate::geometry::WorldRect;
use crate::store::FragmentStore;

/// Rectangle-selection tool state plus the group produced by the last
/// completed drag.  All points are world coordinates.
#[derive(Default)]
pub struct SelectionController {
    /// Tool armed (rectangle drags go to selection instead of fragment moves).
    pub active: bool,
    selecting: bool,
    anchor: Vec2,
    cursor: Vec2,
    group: HashSet<FragmentId>,
    /// Captured press-point offsets for an in-progress group drag.
    drag_offsets: HashMap<FragmentId, Vec2>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm or disarm the tool; disarming drops the group selection.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.selecting = false;
            self.group.clear();
        }
    }

    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    pub fn begin(&mut self, anchor: Vec2) {
        self.selecting = true;
        self.anchor = anchor;
        self.cursor = anchor;
    }

    pub fn update(&mut self, cursor: Vec2) {
        if self.selecting {
            self.cursor = cursor;
        }
    }

    /// The live rectangle, normalized regardless of drag direction.
    pub fn selection_rect(&self) -> Option<WorldRect> {
        self.selecting.then(|| WorldRect::from_points(self.anchor, self.cursor))
    }

    /// Complete the drag: every visible fragment whose bounding box
    /// intersects (not: is contained in) the normalized rectangle joins the
    /// new group, replacing any prior one.  A zero-area rectangle matches
    /// nothing.
    pub fn end(&mut self, fragments: &[Fragment]) -> HashSet<FragmentId> {
        if !self.selecting {
            return self.group.clone();
        }
        self.selecting = false;

        let rect = WorldRect::from_points(self.anchor, self.cursor);
        self.group.clear();
        if rect.is_degenerate() {
            return self.group.clone();
        }
        for frag in fragments {
            if !frag.visible {
                continue;
            }
            if let Some(bbox) = frag.bounding_box()
                && bbox.intersects(&rect)
            {
                self.group.insert(frag.id);
            }
        }
        self.group.clone()
    }

    pub fn cancel(&mut self) {
        self.selecting = false;
    }

    pub fn group(&self) -> &HashSet<FragmentId> {
        &self.group
    }

    pub fn clear_group(&mut self) {
        self.group.clear();
    }

    pub fn is_in_group(&self, id: FragmentId) -> bool {
        self.group.contains(&id)
    }

    /// Ids targeted by "apply to current selection" operations: the group
    /// when non-empty, else the store's primary selection.
    pub fn targets(&self, store: &FragmentStore) -> Vec<FragmentId> {
        if !self.group.is_empty() {
            self.group.iter().copied().collect()
        } else {
            store.selected_id().into_iter().collect()
        }
    }

    /// Capture per-member offsets between the press point and each member's
    /// current position; drops ids that vanished from the store.
    pub fn begin_group_drag(&mut self, press: Vec2, store: &FragmentStore) {
        self.drag_offsets.clear();
        for &id in &self.group {
            if let Some(frag) = store.get(id) {
                self.drag_offsets.insert(id, press - Vec2::new(frag.x, frag.y));
            }
        }
    }

    pub fn is_group_dragging(&self) -> bool {
        !self.drag_offsets.is_empty()
    }

    /// New position for every member under `cursor`: rigid translation that
    /// preserves the group's relative layout.
    pub fn group_drag_positions(&self, cursor: Vec2) -> Vec<(FragmentId, Vec2)> {
        self.drag_offsets
            .iter()
            .map(|(&id, &offset)| (id, cursor - offset))
            .collect()
    }

    pub fn end_group_drag(&mut self) {
        self.drag_offsets.clear();
    }
}
