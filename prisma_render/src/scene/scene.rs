/// Scene - game objects, hierarchy and components.
///
/// Objects live in a SlotMap, so ids stay valid until the object is
/// destroyed and a destroyed id never aliases a new object. Insertion order
/// is kept separately and is the order drawables are reported in.

use std::path::Path;

use glam::Mat4;
use slotmap::{new_key_type, SlotMap};

use crate::camera::{Camera, FrustumCuller};
use crate::error::{Error, Result};
use crate::resource::ResourceManager;
use crate::{engine_debug, engine_warn};
use super::component::{Component, ComponentArena, MeshRenderer, Skybox};
use super::light::Light;
use super::render_list::{RenderItem, RenderList};
use super::transform::Transform;

const SOURCE: &str = "prisma::Scene";

new_key_type! {
    /// Stable game object id
    pub struct GameObjectId;
}

#[derive(Debug, Clone)]
pub struct GameObject {
    pub name: String,
    pub active: bool,
    parent: Option<GameObjectId>,
    children: Vec<GameObjectId>,
}

impl GameObject {
    pub fn parent(&self) -> Option<GameObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[GameObjectId] {
        &self.children
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    name: String,
    objects: SlotMap<GameObjectId, GameObject>,
    order: Vec<GameObjectId>,
    components: ComponentArena,
    main_camera: Option<GameObjectId>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ===== OBJECTS =====

    pub fn create_game_object(&mut self, name: impl Into<String>) -> GameObjectId {
        let id = self.objects.insert(GameObject {
            name: name.into(),
            active: true,
            parent: None,
            children: Vec::new(),
        });
        self.order.push(id);
        id
    }

    /// Destroy an object and its whole subtree; false for an unknown id
    pub fn destroy_game_object(&mut self, id: GameObjectId) -> bool {
        let Some(object) = self.objects.get(id) else {
            return false;
        };
        if let Some(parent) = object.parent {
            if let Some(parent) = self.objects.get_mut(parent) {
                parent.children.retain(|child| *child != id);
            }
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(object) = self.objects.remove(current) {
                stack.extend(object.children);
                self.components.remove_all(current);
                if self.main_camera == Some(current) {
                    self.main_camera = None;
                }
            }
        }
        let objects = &self.objects;
        self.order.retain(|id| objects.contains_key(*id));
        true
    }

    pub fn game_object(&self, id: GameObjectId) -> Option<&GameObject> {
        self.objects.get(id)
    }

    /// Objects in insertion order
    pub fn game_objects(&self) -> impl Iterator<Item = (GameObjectId, &GameObject)> {
        self.order.iter().filter_map(|id| self.objects.get(*id).map(|o| (*id, o)))
    }

    pub fn game_object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn set_active(&mut self, id: GameObjectId, active: bool) -> Result<()> {
        let object = self.objects.get_mut(id).ok_or_else(|| unknown_object(id))?;
        object.active = active;
        Ok(())
    }

    /// Active and every ancestor active
    pub fn is_active_in_hierarchy(&self, id: GameObjectId) -> bool {
        let mut current = Some(id);
        while let Some(cid) = current {
            match self.objects.get(cid) {
                Some(object) if object.active => current = object.parent,
                _ => return false,
            }
        }
        true
    }

    /// Re-parent `child`; refuses to create a cycle
    pub fn set_parent(&mut self, child: GameObjectId, parent: Option<GameObjectId>) -> Result<()> {
        if !self.objects.contains_key(child) {
            return Err(unknown_object(child));
        }
        if let Some(parent) = parent {
            if !self.objects.contains_key(parent) {
                return Err(unknown_object(parent));
            }
            let mut ancestor = Some(parent);
            while let Some(a) = ancestor {
                if a == child {
                    return Err(Error::InvalidState("parent link would create a cycle".to_string()));
                }
                ancestor = self.objects.get(a).and_then(|o| o.parent);
            }
        }

        let old_parent = self.objects.get(child).and_then(|o| o.parent);
        if let Some(old) = old_parent.and_then(|p| self.objects.get_mut(p)) {
            old.children.retain(|c| *c != child);
        }
        if let Some(new) = parent.and_then(|p| self.objects.get_mut(p)) {
            new.children.push(child);
        }
        if let Some(object) = self.objects.get_mut(child) {
            object.parent = parent;
        }
        Ok(())
    }

    /// Local transform composed with every ancestor's
    pub fn world_matrix(&self, id: GameObjectId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(cid) = current {
            if let Some(transform) = self.components.get::<Transform>(cid) {
                matrix = transform.matrix() * matrix;
            }
            current = self.objects.get(cid).and_then(|o| o.parent);
        }
        matrix
    }

    // ===== COMPONENTS =====

    /// Attach a component, replacing any previous one of the same kind
    pub fn add_component<C: Component>(&mut self, id: GameObjectId, component: C) -> Result<()> {
        if !self.objects.contains_key(id) {
            return Err(unknown_object(id));
        }
        if self.components.insert(id, component).is_some() {
            engine_debug!(SOURCE, "Replaced {:?} component", C::KIND);
        }
        Ok(())
    }

    pub fn get_component<C: Component>(&self, id: GameObjectId) -> Option<&C> {
        self.components.get::<C>(id)
    }

    pub fn get_component_mut<C: Component>(&mut self, id: GameObjectId) -> Option<&mut C> {
        self.components.get_mut::<C>(id)
    }

    pub fn remove_component<C: Component>(&mut self, id: GameObjectId) -> Option<C> {
        self.components.remove::<C>(id)
    }

    pub fn has_component<C: Component>(&self, id: GameObjectId) -> bool {
        self.components.contains(C::KIND, id)
    }

    pub fn components(&self) -> &ComponentArena {
        &self.components
    }

    // ===== CAMERA =====

    pub fn set_main_camera(&mut self, id: GameObjectId) -> Result<()> {
        if !self.components.contains(<Camera as Component>::KIND, id) {
            return Err(Error::InvalidResource("object has no camera component".to_string()));
        }
        self.main_camera = Some(id);
        Ok(())
    }

    /// Explicit main camera, else the first active object carrying one
    pub fn main_camera(&self) -> Option<&Camera> {
        if let Some(id) = self.main_camera {
            if self.is_active_in_hierarchy(id) {
                if let Some(camera) = self.components.get::<Camera>(id) {
                    return Some(camera);
                }
            }
        }
        self.order
            .iter()
            .filter(|id| self.is_active_in_hierarchy(**id))
            .find_map(|id| self.components.get::<Camera>(*id))
    }

    pub fn main_camera_mut(&mut self) -> Option<&mut Camera> {
        let id = match self.main_camera {
            Some(id) if self.components.contains(<Camera as Component>::KIND, id) => Some(id),
            _ => self
                .order
                .iter()
                .copied()
                .find(|id| self.components.contains(<Camera as Component>::KIND, *id)),
        }?;
        self.components.get_mut::<Camera>(id)
    }

    // ===== RENDER COLLECTION =====

    /// Split active drawables into opaque/transparent buckets.
    ///
    /// With a culler and a camera, drawables whose world bounding sphere
    /// misses the frustum are left out and counted in `culling`. Objects
    /// whose mesh is not registered are skipped with a warning.
    pub fn collect_render_list(
        &self,
        resources: &ResourceManager,
        culler: Option<&mut FrustumCuller>,
    ) -> RenderList {
        self.collect(resources, culler, false)
    }

    /// Every mesh-bearing object, inactive and nearly invisible ones included,
    /// bucketed by material. Used to create drawable resources up front.
    pub fn collect_build_list(&self, resources: &ResourceManager) -> RenderList {
        self.collect(resources, None, true)
    }

    fn collect(
        &self,
        resources: &ResourceManager,
        mut culler: Option<&mut FrustumCuller>,
        include_hidden: bool,
    ) -> RenderList {
        let camera = self.main_camera().map(|c| c.data());
        let mut list = RenderList { camera, ..RenderList::default() };

        if let (Some(culler), Some(camera)) = (culler.as_deref_mut(), camera.as_ref()) {
            culler.reset(camera.frustum());
        }

        for (id, _) in self.game_objects() {
            let active = self.is_active_in_hierarchy(id);
            if active {
                if let Some(light) = self.components.get::<Light>(id) {
                    list.lights.push(self.world_light(id, light));
                }
                if list.skybox.is_none() {
                    if let Some(skybox) = self.components.get::<Skybox>(id) {
                        list.skybox = Some(skybox.clone());
                    }
                }
            }

            let Some(renderer) = self.components.get::<MeshRenderer>(id) else {
                continue;
            };
            let Some(mesh) = resources.mesh(renderer.mesh) else {
                if active {
                    engine_warn!(SOURCE, "Object '{}' references an unknown mesh",
                        self.objects[id].name);
                }
                continue;
            };
            list.mesh_owners.push(id);
            if !include_hidden && (!active || renderer.material.is_invisible()) {
                continue;
            }

            let world = self.world_matrix(id);
            let bounds = mesh.bounds().transformed(&world);
            if let (Some(culler), true) = (culler.as_deref_mut(), camera.is_some()) {
                if !culler.test_sphere(&bounds) {
                    continue;
                }
            }

            let distance = camera.map(|c| c.position.distance(bounds.center)).unwrap_or(0.0);
            let item = RenderItem {
                object: id,
                mesh: renderer.mesh,
                world,
                material: renderer.material.clone(),
                distance,
            };
            if item.material.is_transparent() {
                list.transparent.push(item);
            } else {
                list.opaque.push(item);
            }
        }

        if let Some(culler) = culler {
            list.culling = culler.stats();
        }
        list
    }

    fn world_light(&self, id: GameObjectId, light: &Light) -> Light {
        let world = self.world_matrix(id);
        Light {
            position: world.transform_point3(light.position),
            direction: world.transform_vector3(light.direction).normalize_or_zero(),
            ..*light
        }
    }

    // ===== PERSISTENCE =====

    /// Scene serialization is not implemented
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> bool {
        engine_warn!(SOURCE, "save_to_file('{}'): not implemented", path.as_ref().display());
        false
    }

    /// Scene deserialization is not implemented
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> bool {
        engine_warn!(SOURCE, "load_from_file('{}'): not implemented", path.as_ref().display());
        false
    }
}

fn unknown_object(id: GameObjectId) -> Error {
    Error::InvalidResource(format!("unknown game object {:?}", id))
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
