/// Per-drawable GPU resources owned by a mesh pass
///
/// The set follows scene membership: an owner seen in the pass' bucket for
/// the first time gets its resources on that frame, and an owner that left
/// the scene is retired. Retired objects are destroyed once every frame slot
/// that could still reference them has been waited on.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::Result;
use crate::graphics_device::{CommandList, DescriptorLayout, GraphicsDevice};
use crate::render_object::RenderObjectData;
use crate::scene::{GameObjectId, RenderItem};
use crate::{engine_debug, engine_error};

use super::{PassStats, SceneContext};

struct Retired {
    object: RenderObjectData,
    frames_left: usize,
}

pub(crate) struct DrawableSet {
    source: &'static str,
    objects: Vec<RenderObjectData>,
    by_owner: FxHashMap<GameObjectId, usize>,
    /// Indices of this frame's items, in item order
    frame_order: Vec<usize>,
    retired: Vec<Retired>,
    /// Owners whose resources could not be created; not retried while they stay in the scene
    failed: FxHashSet<GameObjectId>,
}

impl DrawableSet {
    pub(crate) fn new(source: &'static str) -> Self {
        Self {
            source,
            objects: Vec::new(),
            by_owner: FxHashMap::default(),
            frame_order: Vec::new(),
            retired: Vec::new(),
            failed: FxHashSet::default(),
        }
    }

    /// Replace the set with one object per item, in item order
    pub(crate) fn build(
        &mut self,
        device: &mut dyn GraphicsDevice,
        ctx: &mut SceneContext,
        items: &[RenderItem],
    ) -> Result<()> {
        self.release(device);
        let layout = RenderObjectData::descriptor_layout();
        let frames = ctx.frames_in_flight;
        for item in items {
            let object = RenderObjectData::from_item(device, ctx.resources, item, frames, &layout)?;
            self.by_owner.insert(item.object, self.objects.len());
            self.frame_order.push(self.objects.len());
            self.objects.push(object);
        }
        engine_debug!(self.source, "Built {} drawables", self.objects.len());
        Ok(())
    }

    /// Bring the set in line with this frame's `items`.
    ///
    /// Owners no longer in `ctx.list.mesh_owners` are retired, unknown owners
    /// get resources, and only objects named by `items` stay visible.
    pub(crate) fn sync(
        &mut self,
        device: &mut dyn GraphicsDevice,
        ctx: &mut SceneContext,
        items: &[RenderItem],
    ) {
        self.collect_retired(device);

        let members: FxHashSet<GameObjectId> = ctx
            .list
            .mesh_owners
            .iter()
            .copied()
            .chain(items.iter().map(|item| item.object))
            .collect();
        self.retire_departed(&members, ctx.frames_in_flight);
        self.failed.retain(|owner| members.contains(owner));

        let layout = RenderObjectData::descriptor_layout();
        for object in &mut self.objects {
            object.set_visible(false);
        }
        self.frame_order.clear();

        for item in items {
            let index = match self.by_owner.get(&item.object) {
                Some(&index) => index,
                None => match self.adopt(device, ctx, item, &layout) {
                    Some(index) => index,
                    None => continue,
                },
            };
            let object = &mut self.objects[index];
            object.sync(item);
            object.set_visible(true);
            self.frame_order.push(index);
        }
    }

    /// Create resources for an owner first seen after the scene was built
    fn adopt(
        &mut self,
        device: &mut dyn GraphicsDevice,
        ctx: &mut SceneContext,
        item: &RenderItem,
        layout: &DescriptorLayout,
    ) -> Option<usize> {
        if self.failed.contains(&item.object) {
            return None;
        }
        let created =
            RenderObjectData::from_item(device, ctx.resources, item, ctx.frames_in_flight, layout);
        match created {
            Ok(object) => {
                let index = self.objects.len();
                engine_debug!(self.source, "Created drawable '{}'", object.name());
                self.by_owner.insert(item.object, index);
                self.objects.push(object);
                Some(index)
            }
            Err(e) => {
                engine_error!(self.source, "Drawable for object {:?} not created: {}",
                    item.object, e);
                self.failed.insert(item.object);
                None
            }
        }
    }

    fn retire_departed(&mut self, members: &FxHashSet<GameObjectId>, frames_in_flight: usize) {
        let departed = self
            .objects
            .iter()
            .any(|o| o.owner().is_some_and(|owner| !members.contains(&owner)));
        if !departed {
            return;
        }

        let mut kept = Vec::with_capacity(self.objects.len());
        for object in self.objects.drain(..) {
            match object.owner() {
                Some(owner) if !members.contains(&owner) => {
                    engine_debug!(self.source, "Retiring drawable '{}'", object.name());
                    self.retired.push(Retired { object, frames_left: frames_in_flight.max(1) });
                }
                _ => kept.push(object),
            }
        }
        self.objects = kept;
        self.by_owner = self
            .objects
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.owner().map(|owner| (owner, i)))
            .collect();
    }

    /// One frame slot was waited on since the last call
    fn collect_retired(&mut self, device: &mut dyn GraphicsDevice) {
        let mut index = 0;
        while index < self.retired.len() {
            if self.retired[index].frames_left <= 1 {
                let mut retired = self.retired.swap_remove(index);
                retired.object.destroy(device);
            } else {
                self.retired[index].frames_left -= 1;
                index += 1;
            }
        }
    }

    pub(crate) fn prepare(
        &self,
        device: &mut dyn GraphicsDevice,
        frame_index: usize,
        view: &glam::Mat4,
        projection: &glam::Mat4,
    ) -> Result<()> {
        for object in self.objects.iter().filter(|o| o.is_visible()) {
            object.update_uniforms(device, frame_index, view, projection)?;
        }
        Ok(())
    }

    /// Record visible objects in `order` (indices into the set).
    ///
    /// A failing object is logged and skipped; the others still draw.
    pub(crate) fn record(
        &self,
        cmd: &mut dyn CommandList,
        frame_index: usize,
        order: impl Iterator<Item = usize>,
    ) -> PassStats {
        let mut stats = PassStats::default();
        for index in order {
            let Some(object) = self.objects.get(index).filter(|o| o.is_visible()) else {
                continue;
            };
            match object.record(cmd, frame_index) {
                Ok(()) => {
                    stats.draw_calls += 1;
                    stats.objects += 1;
                    stats.triangles += object.triangle_count();
                }
                Err(e) => engine_error!(self.source, "Skipping '{}': {}", object.name(), e),
            }
        }
        stats.culled_objects = (self.objects.len() - self.visible_count()) as u32;
        stats
    }

    /// Destroy everything, retired objects included. Callers wait for the
    /// device to go idle first.
    pub(crate) fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for object in &mut self.objects {
            object.destroy(device);
        }
        for mut retired in self.retired.drain(..) {
            retired.object.destroy(device);
        }
        self.objects.clear();
        self.by_owner.clear();
        self.frame_order.clear();
        self.failed.clear();
    }

    pub(crate) fn objects(&self) -> &[RenderObjectData] {
        &self.objects
    }

    /// Visible objects of the last sync, in item order
    pub(crate) fn frame_order(&self) -> &[usize] {
        &self.frame_order
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn retired_count(&self) -> usize {
        self.retired.len()
    }

    pub(crate) fn visible_count(&self) -> usize {
        self.objects.iter().filter(|o| o.is_visible()).count()
    }
}

#[cfg(test)]
#[path = "drawables_tests.rs"]
mod tests;
