// ============================================================================
// CANVAS CONTROLLER — interaction engine and paint step
// ============================================================================
//
// Routes input events to the viewport (pan/zoom), hit tester and selection
// controller, and composites through the abstract surface.  Fragment moves
// are *requested* through the event bus; the collaborator applies them back
// into the store, so the canvas never owns authoritative position state.

use glam::Vec2;
use image::Rgba;

use crate::events::{CanvasEvent, EventBus};
use crate::fragment::FragmentId;
use crate::geometry::WorldRect;
use crate::hit_test;
use crate::log_info;
use crate::render_cache::{RenderCache, Scheduler, TimerToken};
use crate::selection::SelectionController;
use crate::store::FragmentStore;
use crate::surface::DrawSurface;
use crate::viewport::Viewport;

pub const BACKGROUND_COLOR: Rgba<u8> = Rgba([42, 42, 42, 255]);
pub const SELECTION_COLOR: Rgba<u8> = Rgba([74, 144, 226, 255]);
/// Selection outline width in screen pixels (divided by zoom when drawing in
/// world space).
pub const SELECTION_STROKE: f32 = 2.0;

/// Wheel-zoom step per notch.
pub const WHEEL_ZOOM_STEP: f32 = 1.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
}

pub struct CanvasController {
    pub viewport: Viewport,
    pub cache: RenderCache,
    pub selection: SelectionController,
    pub events: EventBus,
    screen_size: Vec2,
    last_mouse: Vec2,
    panning: bool,
    /// Fragment id and press offset for a single-fragment drag.
    dragging: Option<(FragmentId, Vec2)>,
    group_dragging: bool,
}

impl Default for CanvasController {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasController {
    pub fn new() -> Self {
        Self {
            viewport: Viewport::new(),
            cache: RenderCache::new(),
            selection: SelectionController::new(),
            events: EventBus::new(),
            screen_size: Vec2::new(400.0, 300.0),
            last_mouse: Vec2::ZERO,
            panning: false,
            dragging: None,
            group_dragging: false,
        }
    }

    pub fn with_scheduler(scheduler: Box<dyn Scheduler>) -> Self {
        let mut canvas = Self::new();
        canvas.cache = RenderCache::with_scheduler(scheduler);
        canvas
    }

    pub fn set_screen_size(&mut self, size: Vec2) {
        self.screen_size = size;
    }

    pub fn screen_size(&self) -> Vec2 {
        self.screen_size
    }

    /// A drag or pan gesture is in progress; render scheduling uses the fast
    /// debounce tier while this holds.
    pub fn is_interacting(&self) -> bool {
        self.panning || self.dragging.is_some() || self.group_dragging
    }

    // ---- input events ------------------------------------------------------

    pub fn on_mouse_press(&mut self, store: &mut FragmentStore, screen_pos: Vec2, button: MouseButton) {
        let world = self.viewport.screen_to_world(screen_pos);

        match button {
            MouseButton::Left => {
                let hit = hit_test::topmost_at(store.list_all(), world).map(|f| (f.id, Vec2::new(f.x, f.y)));
                // Pressing a group member always drags the group, even while
                // the selection tool is armed; otherwise a fresh rectangle
                // would discard the group it just produced.
                if let Some((hit_id, _)) = hit
                    && self.selection.is_in_group(hit_id)
                {
                    self.selection.begin_group_drag(world, store);
                    self.group_dragging = true;
                } else if self.selection.active {
                    self.selection.begin(world);
                } else if let Some((hit_id, hit_pos)) = hit {
                    self.selection.clear_group();
                    store.select(Some(hit_id));
                    self.dragging = Some((hit_id, world - hit_pos));
                } else {
                    // Background press: drop the group and start panning.
                    self.selection.clear_group();
                    self.panning = true;
                }
            }
            MouseButton::Middle => {
                self.panning = true;
            }
        }
        self.last_mouse = screen_pos;
    }

    pub fn on_mouse_move(&mut self, screen_pos: Vec2) {
        let world = self.viewport.screen_to_world(screen_pos);

        if self.selection.active && self.selection.is_selecting() {
            self.selection.update(world);
        } else if self.group_dragging {
            for (id, pos) in self.selection.group_drag_positions(world) {
                self.events.emit(CanvasEvent::FragmentMoved { id, x: pos.x, y: pos.y });
            }
        } else if let Some((id, offset)) = self.dragging {
            let pos = world - offset;
            self.events.emit(CanvasEvent::FragmentMoved { id, x: pos.x, y: pos.y });
        } else if self.panning {
            self.viewport.pan_by_screen_delta(screen_pos - self.last_mouse);
            self.emit_viewport_changed();
        }
        self.last_mouse = screen_pos;
    }

    pub fn on_mouse_release(&mut self, store: &mut FragmentStore) {
        if self.selection.active && self.selection.is_selecting() {
            let ids = self.selection.end(store.list_all());
            if !ids.is_empty() {
                // Frame the fresh group, matching the original interaction.
                self.zoom_to_selection(store);
            }
        }
        self.panning = false;
        self.dragging = None;
        if self.group_dragging {
            self.selection.end_group_drag();
            self.group_dragging = false;
        }
    }

    /// Wheel zoom anchored at the cursor; positive `scroll_delta` zooms in.
    pub fn on_wheel(&mut self, screen_pos: Vec2, scroll_delta: f32) {
        let factor = if scroll_delta > 0.0 { WHEEL_ZOOM_STEP } else { 1.0 / WHEEL_ZOOM_STEP };
        if self.viewport.zoom_at(screen_pos, factor) {
            self.emit_viewport_changed();
        }
    }

    /// Delete key: ask the collaborator to remove the primary selection.
    pub fn on_delete_key(&mut self, store: &FragmentStore) {
        if let Some(id) = store.selected_id() {
            self.events.emit(CanvasEvent::DeleteRequested(id));
        }
    }

    // ---- framing -----------------------------------------------------------

    pub fn zoom_to_fit(&mut self, store: &FragmentStore) {
        if self.viewport.fit_to_content(store.composite_bounds(), self.screen_size) {
            self.emit_viewport_changed();
        }
    }

    /// Frame the current group selection's union bounds.
    pub fn zoom_to_selection(&mut self, store: &FragmentStore) {
        let mut bounds: Option<WorldRect> = None;
        for &id in self.selection.group() {
            if let Some(frag) = store.get(id)
                && frag.visible
                && let Some(bbox) = frag.bounding_box()
            {
                bounds = Some(match bounds {
                    Some(b) => b.union(&bbox),
                    None => bbox,
                });
            }
        }
        if let Some(bounds) = bounds
            && self.viewport.fit_to_content(bounds, self.screen_size)
        {
            log_info!("framed {} selected fragment(s)", self.selection.group().len());
            self.emit_viewport_changed();
        }
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset();
        self.emit_viewport_changed();
    }

    fn emit_viewport_changed(&mut self) {
        self.events.emit(CanvasEvent::ViewportChanged {
            zoom: self.viewport.zoom(),
            pan_x: self.viewport.pan.x,
            pan_y: self.viewport.pan.y,
        });
    }

    // ---- timers ------------------------------------------------------------

    /// Host callback when a scheduled debounce timer elapses.
    pub fn on_timer_fired(&mut self, token: TimerToken, store: &mut FragmentStore) {
        self.cache.on_timer_fired(token, store, self.viewport.zoom());
    }

    // ---- paint -------------------------------------------------------------

    /// Composite the scene.  Dirty fragments are queued and scheduled, never
    /// derived inline here; a fragment with no cached bitmap yet is simply
    /// absent from this frame.
    pub fn paint(&mut self, store: &mut FragmentStore, surface: &mut dyn DrawSurface) {
        self.cache.refresh_from_store(store);
        self.cache.drain_background_results(store, self.viewport.zoom());
        if self.cache.stats(self.viewport.zoom()).dirty > 0 {
            self.cache.schedule_render(self.is_interacting());
        }

        surface.fill_background(BACKGROUND_COLOR);
        surface.push_transform(self.viewport.zoom(), self.viewport.pan);

        let visible_rect = self.viewport.visible_world_rect(self.screen_size);
        let zoom = self.viewport.zoom();

        for frag in store.list_all() {
            if !frag.visible {
                continue;
            }
            let Some(bbox) = frag.bounding_box() else { continue };
            if !hit_test::intersects_viewport(&bbox, &visible_rect) {
                continue;
            }
            if let Some(bitmap) = self.cache.get(frag.id) {
                surface.draw_bitmap(bitmap, Vec2::new(frag.x, frag.y), frag.opacity);
            }
        }

        // Selection outlines stay a constant screen width.
        let stroke = SELECTION_STROKE / zoom;
        for frag in store.list_all() {
            if !frag.visible {
                continue;
            }
            let selected = frag.selected
                || store.selected_id() == Some(frag.id)
                || self.selection.is_in_group(frag.id);
            if selected && let Some(bbox) = frag.bounding_box() {
                surface.draw_rect_outline(bbox, stroke, SELECTION_COLOR);
            }
        }

        if let Some(rect) = self.selection.selection_rect() {
            surface.draw_rect_outline(rect, stroke, SELECTION_COLOR);
        }

        surface.pop_transform();
    }
}
