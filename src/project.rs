// ============================================================================
// PROJECT METADATA — interchange format for arrangement persistence
// ============================================================================
//
// The store produces and consumes these records; the collaborator owns the
// actual file I/O (and the pixel data, which is rebound after import via
// `FragmentStore::set_pixel_data`).

use serde::{Deserialize, Serialize};

use crate::fragment::{Fragment, FragmentId};
use crate::log_info;
use crate::store::FragmentStore;

pub const METADATA_VERSION: &str = "1.0";

/// One fragment's placement and display metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub id: FragmentId,
    pub name: String,
    pub file_path: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub visible: bool,
    pub opacity: f32,
}

impl FragmentRecord {
    pub fn from_fragment(frag: &Fragment) -> Self {
        Self {
            id: frag.id,
            name: frag.name.clone(),
            file_path: frag.source_path.clone(),
            x: frag.x,
            y: frag.y,
            rotation: frag.rotation,
            flip_horizontal: frag.flip_horizontal,
            flip_vertical: frag.flip_vertical,
            visible: frag.visible,
            opacity: frag.opacity,
        }
    }

    fn into_fragment(self) -> Fragment {
        let mut frag = Fragment::new(self.name, self.file_path, None);
        frag.id = self.id;
        frag.x = self.x;
        frag.y = self.y;
        frag.rotation = self.rotation.rem_euclid(360.0);
        frag.flip_horizontal = self.flip_horizontal;
        frag.flip_vertical = self.flip_vertical;
        frag.visible = self.visible;
        frag.opacity = self.opacity.clamp(0.0, 1.0);
        frag
    }
}

/// Ordered fragment records plus the primary selection and a version tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub version: String,
    pub fragments: Vec<FragmentRecord>,
    pub selected_fragment_id: Option<FragmentId>,
}

/// Snapshot the store's arrangement.
pub fn export_metadata(store: &FragmentStore) -> ProjectMetadata {
    ProjectMetadata {
        version: METADATA_VERSION.to_string(),
        fragments: store.list_all().iter().map(FragmentRecord::from_fragment).collect(),
        selected_fragment_id: store.selected_id(),
    }
}

/// Replace the entire fragment set with the imported records.  Every
/// imported fragment starts pending render until the collaborator rebinds
/// pixel data.  An unknown `selected_fragment_id` is silently ignored.
pub fn import_metadata(store: &mut FragmentStore, metadata: ProjectMetadata) {
    store.clear();
    let count = metadata.fragments.len();
    for record in metadata.fragments {
        store.insert(record.into_fragment());
    }
    store.select(metadata.selected_fragment_id);
    log_info!("imported {} fragment record(s) (version {})", count, metadata.version);
}
