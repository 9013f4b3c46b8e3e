/// Per-frame snapshot of what the scene wants drawn

use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::camera::{CameraData, CullingStats};
use crate::resource::MeshId;
use super::component::{Material, Skybox};
use super::light::Light;
use super::scene::GameObjectId;

/// One drawable
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub object: GameObjectId,
    pub mesh: MeshId,
    pub world: Mat4,
    pub material: Material,
    /// Distance from the camera to the world-space bounds center
    pub distance: f32,
}

/// Drawables, lights and camera collected from a scene
#[derive(Debug, Clone, Default)]
pub struct RenderList {
    pub opaque: Vec<RenderItem>,
    pub transparent: Vec<RenderItem>,
    /// Every object carrying a drawable mesh, drawn this frame or not
    pub mesh_owners: Vec<GameObjectId>,
    pub lights: Vec<Light>,
    pub skybox: Option<Skybox>,
    pub camera: Option<CameraData>,
    pub culling: CullingStats,
}

impl RenderList {
    /// Opaque then transparent
    pub fn drawables(&self) -> impl Iterator<Item = &RenderItem> {
        self.opaque.iter().chain(self.transparent.iter())
    }

    pub fn drawable_count(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    /// Lookup table from owning object to item
    pub fn by_object(&self) -> FxHashMap<GameObjectId, &RenderItem> {
        self.drawables().map(|item| (item.object, item)).collect()
    }
}
