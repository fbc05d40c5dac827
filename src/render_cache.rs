// ============================================================================
// RENDER CACHE — per-fragment bitmap cache, dirty tracking, LOD policy
// ============================================================================
//
// The cache decouples expensive pixel transforms from the paint step.  The
// authoritative cached bitmap is always the full-resolution rotation+flip
// derivation; LOD factors are computed for stats only and never baked into
// the cache (scaling the cached bitmap would drift fragment positions as the
// zoom changes).

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use image::RgbaImage;

use crate::fragment::{self, Fragment, FragmentId};
use crate::store::FragmentStore;
use crate::{log_info, log_warn};

/// Trailing delay while an interactive drag/pan is in progress.
pub const FAST_RENDER_DELAY: Duration = Duration::from_millis(16);
/// Trailing delay for settled edits.
pub const SETTLED_RENDER_DELAY: Duration = Duration::from_millis(50);

/// Rotation differences below this do not count as a transform change.
pub const ROTATION_TOLERANCE: f32 = 0.01;

/// Images at or above this pixel count are handed to the background worker
/// instead of being derived on the interaction thread.
pub const BACKGROUND_RENDER_THRESHOLD: u32 = 1 << 21; // ~2 Mpx

/// One-shot debounce timers owned by the cache.  A pending timer of either
/// kind is never restarted while still pending, so bursts of invalidations
/// coalesce into a single trailing recompute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerToken {
    FastRender,
    SettledRender,
}

/// Host-provided timer facility.  The engine never owns an event loop; the
/// host schedules the callback and feeds the token back through
/// [`RenderCache::on_timer_fired`] when it elapses.
pub trait Scheduler {
    fn schedule_once(&mut self, delay: Duration, token: TimerToken);
    fn cancel(&mut self, token: TimerToken);
}

/// Scheduler that drops every request; hosts that poll `render_dirty`
/// directly (or tests driving the cache by hand) use this.
#[derive(Default)]
pub struct NullScheduler;

impl Scheduler for NullScheduler {
    fn schedule_once(&mut self, _delay: Duration, _token: TimerToken) {}
    fn cancel(&mut self, _token: TimerToken) {}
}

struct CacheEntry {
    bitmap: RgbaImage,
    /// Zoom at derivation time.  Stats only; the bitmap is zoom-independent.
    rendered_at_zoom: f32,
}

/// Immutable snapshot handed to the background worker.  The worker never
/// touches fragment or cache state.
pub struct RenderJob {
    pub id: FragmentId,
    pub pixels: RgbaImage,
    pub rotation: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

/// Transform parameters captured when a job was submitted, compared against
/// the fragment's current state when its result arrives.  A mismatch means a
/// mutation landed while the job was in flight; the result is stale.
#[derive(Clone, Copy, PartialEq)]
struct SubmittedParams {
    rotation: f32,
    flip_horizontal: bool,
    flip_vertical: bool,
}

struct RenderWorker {
    jobs: Option<Sender<RenderJob>>,
    results: Receiver<(FragmentId, RgbaImage)>,
    handle: Option<JoinHandle<()>>,
}

impl RenderWorker {
    fn spawn() -> Self {
        let (job_tx, job_rx) = mpsc::channel::<RenderJob>();
        let (result_tx, result_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            while let Ok(job) = job_rx.recv() {
                let bitmap = fragment::derive_bitmap(
                    &job.pixels,
                    job.rotation,
                    job.flip_horizontal,
                    job.flip_vertical,
                );
                if result_tx.send((job.id, bitmap)).is_err() {
                    break;
                }
            }
        });
        Self { jobs: Some(job_tx), results: result_rx, handle: Some(handle) }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub struct RenderCache {
    entries: HashMap<FragmentId, CacheEntry>,
    dirty: HashSet<FragmentId>,
    in_flight: HashMap<FragmentId, SubmittedParams>,
    scheduler: Box<dyn Scheduler>,
    fast_pending: bool,
    settled_pending: bool,
    worker: Option<RenderWorker>,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::with_scheduler(Box::new(NullScheduler))
    }
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheduler(scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            entries: HashMap::new(),
            dirty: HashSet::new(),
            in_flight: HashMap::new(),
            scheduler,
            fast_pending: false,
            settled_pending: false,
            worker: None,
        }
    }

    /// Spawn the background derivation worker.  Without it every derivation
    /// runs synchronously on the interaction thread.
    pub fn enable_background_worker(&mut self) {
        if self.worker.is_none() {
            self.worker = Some(RenderWorker::spawn());
            log_info!("background render worker started");
        }
    }

    pub fn get(&self, id: FragmentId) -> Option<&RgbaImage> {
        self.entries.get(&id).map(|e| &e.bitmap)
    }

    /// Zoom recorded when this entry was derived.  Metrics only; entries are
    /// never considered stale because the zoom moved.
    pub fn rendered_at_zoom(&self, id: FragmentId) -> Option<f32> {
        self.entries.get(&id).map(|e| e.rendered_at_zoom)
    }

    pub fn is_dirty(&self, id: FragmentId) -> bool {
        self.dirty.contains(&id)
    }

    /// Drop the cached bitmap and queue the fragment for re-derivation.
    pub fn invalidate(&mut self, id: FragmentId) {
        self.entries.remove(&id);
        self.dirty.insert(id);
    }

    /// Forget a removed fragment entirely (no re-render queued).
    pub fn remove(&mut self, id: FragmentId) {
        self.entries.remove(&id);
        self.dirty.remove(&id);
        self.in_flight.remove(&id);
    }

    /// Drop every cached bitmap and mark all visible fragments dirty.  Used
    /// after bulk operations such as reset-all.
    pub fn invalidate_all(&mut self, store: &FragmentStore) {
        self.entries.clear();
        self.dirty.clear();
        for frag in store.list_visible() {
            self.dirty.insert(frag.id);
        }
    }

    /// Compare two snapshots of the same fragment and invalidate when the
    /// pixel-transform inputs differ: rotation (within tolerance), flips, or
    /// visibility.  Pure position changes only need a repaint, which the
    /// paint step handles without touching the cache.
    pub fn mark_dirty_on_change(&mut self, old: &Fragment, new: &Fragment) {
        let transform_changed = (old.rotation - new.rotation).abs() > ROTATION_TOLERANCE
            || old.flip_horizontal != new.flip_horizontal
            || old.flip_vertical != new.flip_vertical;
        let visibility_changed = old.visible != new.visible;
        if transform_changed || visibility_changed {
            self.invalidate(new.id);
        }
    }

    /// Queue dirty entries for any fragment whose `cache_valid` flag was
    /// cleared by a transform mutator, and for visible fragments that have no
    /// cached bitmap yet.
    pub fn refresh_from_store(&mut self, store: &FragmentStore) {
        for frag in store.list_all() {
            let pending = self.in_flight.contains_key(&frag.id);
            if pending {
                continue;
            }
            if !frag.cache_valid || (frag.visible && frag.has_pixel_data() && !self.entries.contains_key(&frag.id)) {
                self.invalidate(frag.id);
            }
        }
    }

    /// Synchronously derive bitmaps for every dirty, visible fragment with
    /// pixel data; large images are offloaded to the worker when enabled.
    /// Successfully handled ids leave the dirty set; a failed derivation
    /// stays dirty and visually absent rather than corrupting cached state.
    pub fn render_dirty(&mut self, store: &mut FragmentStore, zoom: f32) {
        if self.dirty.is_empty() {
            return;
        }
        let ids: Vec<FragmentId> = self.dirty.iter().copied().collect();
        let mut rendered = 0usize;
        for id in ids {
            if self.in_flight.contains_key(&id) {
                // A result is already pending; the drain reconciles it.
                continue;
            }
            let Some(frag) = store.get(id) else {
                // Removed since it was marked; drop silently.
                self.dirty.remove(&id);
                continue;
            };
            if !frag.visible {
                // Re-queued when visibility flips back.
                self.dirty.remove(&id);
                continue;
            }
            let Some(pixels) = frag.pixels() else {
                // Pending render; re-queued when data arrives.
                self.dirty.remove(&id);
                continue;
            };
            let large = pixels.width().saturating_mul(pixels.height()) >= BACKGROUND_RENDER_THRESHOLD;
            if large && let Some(worker) = &self.worker {
                let job = RenderJob {
                    id,
                    pixels: pixels.clone(),
                    rotation: frag.rotation,
                    flip_horizontal: frag.flip_horizontal,
                    flip_vertical: frag.flip_vertical,
                };
                let submitted = SubmittedParams {
                    rotation: frag.rotation,
                    flip_horizontal: frag.flip_horizontal,
                    flip_vertical: frag.flip_vertical,
                };
                if let Some(tx) = &worker.jobs
                    && tx.send(job).is_ok()
                {
                    self.dirty.remove(&id);
                    self.in_flight.insert(id, submitted);
                    continue;
                }
                log_warn!("background render submit failed for {}, deriving inline", id);
            }

            match frag.derive_bitmap() {
                Some(bitmap) => {
                    self.entries.insert(id, CacheEntry { bitmap, rendered_at_zoom: zoom });
                    self.dirty.remove(&id);
                    if let Some(frag) = store.get_mut(id) {
                        frag.cache_valid = true;
                    }
                    rendered += 1;
                }
                None => {
                    // Leave dirty; previously cached state is already gone.
                    log_warn!("bitmap derivation failed for {}", id);
                }
            }
        }
        if rendered > 0 {
            log_info!("rendered {} dirty fragment(s) at zoom {:.2}", rendered, zoom);
        }
    }

    /// Store completed background results.  A result is discarded when its
    /// fragment is gone from the store, or when the fragment's rotation/flip
    /// state no longer matches what the job was submitted with — in that case
    /// the fragment goes back on the dirty queue so the next render pass
    /// derives with the current parameters.
    pub fn drain_background_results(&mut self, store: &mut FragmentStore, zoom: f32) -> usize {
        let Some(worker) = &self.worker else { return 0 };
        let mut stored = 0usize;
        while let Ok((id, bitmap)) = worker.results.try_recv() {
            let Some(submitted) = self.in_flight.remove(&id) else {
                continue; // stale: forgotten while rendering
            };
            let Some(frag) = store.get_mut(id) else {
                continue; // stale: fragment removed while rendering
            };
            let current = SubmittedParams {
                rotation: frag.rotation,
                flip_horizontal: frag.flip_horizontal,
                flip_vertical: frag.flip_vertical,
            };
            if current != submitted {
                // A mutation landed mid-flight; re-derive instead of storing.
                self.dirty.insert(id);
                continue;
            }
            frag.cache_valid = true;
            self.entries.insert(id, CacheEntry { bitmap, rendered_at_zoom: zoom });
            stored += 1;
        }
        stored
    }

    /// Arm the debounced recompute.  `interactive` picks the fast tier used
    /// mid-drag/pan; either timer is one-shot and never re-armed while
    /// pending.
    pub fn schedule_render(&mut self, interactive: bool) {
        if interactive {
            if !self.fast_pending {
                self.fast_pending = true;
                self.scheduler.schedule_once(FAST_RENDER_DELAY, TimerToken::FastRender);
            }
        } else if !self.settled_pending {
            self.settled_pending = true;
            self.scheduler.schedule_once(SETTLED_RENDER_DELAY, TimerToken::SettledRender);
        }
    }

    /// Host callback for an elapsed timer.
    pub fn on_timer_fired(&mut self, token: TimerToken, store: &mut FragmentStore, zoom: f32) {
        match token {
            TimerToken::FastRender => self.fast_pending = false,
            TimerToken::SettledRender => self.settled_pending = false,
        }
        self.drain_background_results(store, zoom);
        self.render_dirty(store, zoom);
    }

    pub fn stats(&self, zoom: f32) -> CacheStats {
        CacheStats {
            cached: self.entries.len(),
            dirty: self.dirty.len(),
            in_flight: self.in_flight.len(),
            quantized_zoom: quantized_zoom(zoom),
            lod_scale: lod_scale_for_zoom(zoom),
        }
    }
}

impl Drop for RenderCache {
    fn drop(&mut self) {
        // Pending debounce timers die with the owning canvas.
        if self.fast_pending {
            self.scheduler.cancel(TimerToken::FastRender);
        }
        if self.settled_pending {
            self.scheduler.cancel(TimerToken::SettledRender);
        }
    }
}

/// Advisory cache/metrics snapshot.  `lod_scale` and `quantized_zoom` are
/// never applied to cached bitmaps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CacheStats {
    pub cached: usize,
    pub dirty: usize,
    pub in_flight: usize,
    pub quantized_zoom: f32,
    pub lod_scale: f32,
}

/// Zoom below which a reduced-resolution bitmap would be acceptable.
pub const LOD_THRESHOLD: f32 = 0.5;

/// Downsample factor the LOD policy would pick at this zoom.  Advisory only.
pub fn lod_scale_for_zoom(zoom: f32) -> f32 {
    if zoom >= LOD_THRESHOLD {
        1.0
    } else if zoom < 0.1 {
        0.25
    } else if zoom < 0.25 {
        0.5
    } else {
        0.75
    }
}

/// Bucketed zoom used as a coarse cache-key/metrics value.
pub fn quantized_zoom(zoom: f32) -> f32 {
    if zoom < 0.1 {
        0.1
    } else if zoom < 0.25 {
        0.25
    } else if zoom < 0.5 {
        0.5
    } else if zoom < 1.0 {
        1.0
    } else if zoom < 2.0 {
        2.0
    } else {
        zoom.min(10.0)
    }
}
