//! Engine for arranging independent raster image pieces ("fragments") on an
//! infinite 2D canvas: pan/zoom viewport, per-fragment and group transforms,
//! a level-of-detail-aware render cache, and hit-testing / rectangle
//! selection.  Widget chrome, image decoding and file persistence live in
//! collaborators; the engine renders through the [`surface::DrawSurface`]
//! capability and raises [`events::CanvasEvent`] notifications.

pub mod canvas;
pub mod events;
pub mod fragment;
pub mod geometry;
pub mod logger;
pub mod project;
pub mod render_cache;
pub mod selection;
pub mod store;
pub mod surface;
pub mod transform;
pub mod viewport;

pub use canvas::{CanvasController, MouseButton};
pub use events::{CanvasEvent, EventBus};
pub use fragment::{Fragment, FragmentId, PixelDataError, pixels_from_raw};
pub use geometry::WorldRect;
pub use project::{FragmentRecord, ProjectMetadata, export_metadata, import_metadata};
pub use render_cache::{CacheStats, RenderCache, Scheduler, TimerToken};
pub use selection::SelectionController;
pub use store::FragmentStore;
pub use surface::DrawSurface;
pub use transform::{FlipAxis, TransformOp, TransformRequest};
pub use viewport::Viewport;
