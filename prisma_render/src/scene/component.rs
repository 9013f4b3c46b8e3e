/// Component storage indexed by a type tag
///
/// Each component kind has its own `SecondaryMap` keyed by `GameObjectId`,
/// so typed lookup is one array index plus a generation check and the render
/// collection step can iterate one kind densely.

use slotmap::SecondaryMap;

use crate::camera::Camera;
use crate::resource::MeshId;
use super::light::Light;
use super::scene::GameObjectId;
use super::transform::Transform;

/// Objects at or below this alpha are not drawn at all
pub const TRANSPARENCY_CUTOFF: f32 = 0.01;

/// Stable tag of every component kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Transform,
    MeshRenderer,
    Camera,
    Light,
    Skybox,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::Transform,
        ComponentKind::MeshRenderer,
        ComponentKind::Camera,
        ComponentKind::Light,
        ComponentKind::Skybox,
    ];
}

/// Surface parameters of a drawable
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub base_color: [f32; 4],
    /// Texture name resolved through the ResourceManager, white when `None`
    pub texture: Option<String>,
    pub alpha: f32,
}

impl Material {
    pub fn is_transparent(&self) -> bool {
        self.alpha < 1.0
    }

    /// Fully transparent objects are skipped instead of drawn
    pub fn is_invisible(&self) -> bool {
        self.alpha <= TRANSPARENCY_CUTOFF
    }
}

impl Default for Material {
    fn default() -> Self {
        Self { base_color: [1.0; 4], texture: None, alpha: 1.0 }
    }
}

/// Mesh + material pair making a game object drawable
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRenderer {
    pub mesh: MeshId,
    pub material: Material,
}

impl MeshRenderer {
    pub fn new(mesh: MeshId) -> Self {
        Self { mesh, material: Material::default() }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }
}

/// Cubemap drawn behind everything else
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skybox {
    pub cubemap: String,
}

impl Skybox {
    pub fn new(cubemap: impl Into<String>) -> Self {
        Self { cubemap: cubemap.into() }
    }
}

/// Per-kind storages
#[derive(Debug, Default)]
pub struct ComponentArena {
    transforms: SecondaryMap<GameObjectId, Transform>,
    mesh_renderers: SecondaryMap<GameObjectId, MeshRenderer>,
    cameras: SecondaryMap<GameObjectId, Camera>,
    lights: SecondaryMap<GameObjectId, Light>,
    skyboxes: SecondaryMap<GameObjectId, Skybox>,
}

impl ComponentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<C: Component>(&mut self, id: GameObjectId, component: C) -> Option<C> {
        C::storage_mut(self).insert(id, component)
    }

    pub fn get<C: Component>(&self, id: GameObjectId) -> Option<&C> {
        C::storage(self).get(id)
    }

    pub fn get_mut<C: Component>(&mut self, id: GameObjectId) -> Option<&mut C> {
        C::storage_mut(self).get_mut(id)
    }

    pub fn remove<C: Component>(&mut self, id: GameObjectId) -> Option<C> {
        C::storage_mut(self).remove(id)
    }

    pub fn contains(&self, kind: ComponentKind, id: GameObjectId) -> bool {
        match kind {
            ComponentKind::Transform => self.transforms.contains_key(id),
            ComponentKind::MeshRenderer => self.mesh_renderers.contains_key(id),
            ComponentKind::Camera => self.cameras.contains_key(id),
            ComponentKind::Light => self.lights.contains_key(id),
            ComponentKind::Skybox => self.skyboxes.contains_key(id),
        }
    }

    /// Kinds attached to `id`, in tag order
    pub fn kinds(&self, id: GameObjectId) -> Vec<ComponentKind> {
        ComponentKind::ALL.into_iter().filter(|kind| self.contains(*kind, id)).collect()
    }

    /// Every component of one kind
    pub fn iter<C: Component>(&self) -> impl Iterator<Item = (GameObjectId, &C)> {
        C::storage(self).iter()
    }

    /// Drop every component of `id`
    pub fn remove_all(&mut self, id: GameObjectId) {
        self.transforms.remove(id);
        self.mesh_renderers.remove(id);
        self.cameras.remove(id);
        self.lights.remove(id);
        self.skyboxes.remove(id);
    }
}

/// Typed access to one storage of the arena
pub trait Component: Sized + 'static {
    const KIND: ComponentKind;

    fn storage(arena: &ComponentArena) -> &SecondaryMap<GameObjectId, Self>;
    fn storage_mut(arena: &mut ComponentArena) -> &mut SecondaryMap<GameObjectId, Self>;
}

macro_rules! impl_component {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl Component for $ty {
            const KIND: ComponentKind = ComponentKind::$kind;

            fn storage(arena: &ComponentArena) -> &SecondaryMap<GameObjectId, Self> {
                &arena.$field
            }

            fn storage_mut(arena: &mut ComponentArena) -> &mut SecondaryMap<GameObjectId, Self> {
                &mut arena.$field
            }
        }
    };
}

impl_component!(Transform, Transform, transforms);
impl_component!(MeshRenderer, MeshRenderer, mesh_renderers);
impl_component!(Camera, Camera, cameras);
impl_component!(Light, Light, lights);
impl_component!(Skybox, Skybox, skyboxes);
