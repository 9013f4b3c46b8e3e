/// RenderObjectData - GPU resources of one drawable
///
/// One vertex buffer, an optional index buffer, and per frame-in-flight one
/// uniform buffer (model/view/projection + base color) with a descriptor set
/// binding it next to the material texture. The index width is decided once
/// from the largest index at upload time and never changes afterwards.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::error::{Error, Result};
use crate::graphics_device::{
    BufferDesc, BufferHandle, BufferUsage, CommandList, DescriptorBinding, DescriptorKind,
    DescriptorLayout, DescriptorResource, DescriptorSetDesc, DescriptorSetHandle,
    DescriptorSlot, GraphicsDevice, IndexFormat, SamplerKind, ShaderStages, TextureHandle,
};
use crate::resource::{MeshData, MeshId, ResourceManager};
use crate::scene::{GameObjectId, Material, RenderItem};

/// Per-object uniform block, rewritten every frame
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub base_color: [f32; 4],
}

impl ObjectUniforms {
    pub fn new(model: &Mat4, view: &Mat4, projection: &Mat4, base_color: [f32; 4]) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            base_color,
        }
    }
}

/// Index buffer plus the width chosen at upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBuffer {
    pub buffer: BufferHandle,
    pub format: IndexFormat,
    pub count: u32,
}

pub struct RenderObjectData {
    name: String,
    owner: Option<GameObjectId>,
    mesh: MeshId,
    world: Mat4,
    material: Material,
    visible: bool,
    distance: f32,
    vertex_buffer: BufferHandle,
    vertex_count: u32,
    index_buffer: Option<IndexBuffer>,
    triangle_count: u32,
    uniform_buffers: Vec<BufferHandle>,
    descriptor_sets: Vec<DescriptorSetHandle>,
}

impl RenderObjectData {
    /// Descriptor layout every object set follows: UBO at 0, texture at 1
    pub fn descriptor_layout() -> DescriptorLayout {
        DescriptorLayout::new(vec![
            DescriptorSlot { binding: 0, kind: DescriptorKind::UniformBuffer, stages: ShaderStages::ALL_GRAPHICS },
            DescriptorSlot { binding: 1, kind: DescriptorKind::CombinedImageSampler, stages: ShaderStages::FRAGMENT },
        ])
    }

    /// Upload `mesh` and create `frames_in_flight` uniform buffers and sets.
    ///
    /// `layout` is the binding set the consuming pass declared; a layout the
    /// object cannot satisfy fails here instead of at draw time. Anything
    /// created before a failure is destroyed again.
    pub fn create(
        device: &mut dyn GraphicsDevice,
        name: &str,
        mesh_id: MeshId,
        mesh: &MeshData,
        texture: TextureHandle,
        frames_in_flight: usize,
        layout: &DescriptorLayout,
    ) -> Result<Self> {
        if mesh.vertices.is_empty() {
            return Err(Error::InvalidResource(format!("mesh of '{}' has no vertices", name)));
        }
        if frames_in_flight == 0 {
            return Err(Error::InvalidState("frames in flight must be at least 1".to_string()));
        }

        let mut object = Self {
            name: name.to_string(),
            owner: None,
            mesh: mesh_id,
            world: Mat4::IDENTITY,
            material: Material::default(),
            visible: true,
            distance: 0.0,
            vertex_buffer: BufferHandle::default(),
            vertex_count: mesh.vertices.len() as u32,
            index_buffer: None,
            triangle_count: mesh.triangle_count(),
            uniform_buffers: Vec::with_capacity(frames_in_flight),
            descriptor_sets: Vec::with_capacity(frames_in_flight),
        };

        match object.upload(device, mesh, texture, frames_in_flight, layout) {
            Ok(()) => Ok(object),
            Err(e) => {
                object.destroy(device);
                Err(e)
            }
        }
    }

    /// Build from a render list item, resolving the material texture
    pub fn from_item(
        device: &mut dyn GraphicsDevice,
        resources: &mut ResourceManager,
        item: &RenderItem,
        frames_in_flight: usize,
        layout: &DescriptorLayout,
    ) -> Result<Self> {
        let texture = match &item.material.texture {
            Some(name) => resources.texture(device, name)?,
            None => resources.fallback_texture(device)?,
        };
        let mesh = resources
            .mesh(item.mesh)
            .ok_or_else(|| Error::InvalidResource(format!("unknown mesh for object {:?}", item.object)))?;
        let name = format!("object{:?}", item.object);

        let mut object = Self::create(device, &name, item.mesh, mesh, texture, frames_in_flight, layout)?;
        object.owner = Some(item.object);
        object.sync(item);
        Ok(object)
    }

    fn upload(
        &mut self,
        device: &mut dyn GraphicsDevice,
        mesh: &MeshData,
        texture: TextureHandle,
        frames_in_flight: usize,
        layout: &DescriptorLayout,
    ) -> Result<()> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        self.vertex_buffer = device.create_buffer(&BufferDesc {
            name: format!("{}_vertices", self.name),
            size: vertex_bytes.len() as u64,
            usage: BufferUsage::Vertex,
        })?;
        device.write_buffer(self.vertex_buffer, 0, vertex_bytes)?;

        if let Some(indices) = mesh.indices.as_ref().filter(|i| !i.is_empty()) {
            let format = IndexFormat::for_max_index(mesh.max_index().unwrap_or(0));
            let bytes = encode_indices(indices, format);
            let buffer = device.create_buffer(&BufferDesc {
                name: format!("{}_indices", self.name),
                size: bytes.len() as u64,
                usage: BufferUsage::Index,
            })?;
            self.index_buffer = Some(IndexBuffer { buffer, format, count: indices.len() as u32 });
            device.write_buffer(buffer, 0, &bytes)?;
        }

        for frame in 0..frames_in_flight {
            let ubo = device.create_buffer(&BufferDesc {
                name: format!("{}_ubo_frame{}", self.name, frame),
                size: std::mem::size_of::<ObjectUniforms>() as u64,
                usage: BufferUsage::Uniform,
            })?;
            self.uniform_buffers.push(ubo);

            let set = device.create_descriptor_set(&DescriptorSetDesc {
                name: format!("{}_set_frame{}", self.name, frame),
                layout: layout.clone(),
                bindings: vec![
                    DescriptorBinding { binding: 0, resource: DescriptorResource::UniformBuffer(ubo) },
                    DescriptorBinding {
                        binding: 1,
                        resource: DescriptorResource::Texture { texture, sampler: SamplerKind::LinearRepeat },
                    },
                ],
            })?;
            self.descriptor_sets.push(set);
        }
        Ok(())
    }

    // ===== PER FRAME =====

    /// Copy world matrix, material and distance from this frame's render list
    pub fn sync(&mut self, item: &RenderItem) {
        self.world = item.world;
        self.material = item.material.clone();
        self.distance = item.distance;
    }

    /// Write the uniform buffer of `frame_index`.
    ///
    /// Callers must have waited on that slot's fence first.
    pub fn update_uniforms(
        &self,
        device: &mut dyn GraphicsDevice,
        frame_index: usize,
        view: &Mat4,
        projection: &Mat4,
    ) -> Result<()> {
        let ubo = *self.uniform_buffers.get(frame_index).ok_or_else(|| self.bad_frame(frame_index))?;
        let mut color = self.material.base_color;
        color[3] *= self.material.alpha;
        let uniforms = ObjectUniforms::new(&self.world, view, projection, color);
        device.write_buffer(ubo, 0, bytemuck::bytes_of(&uniforms))
    }

    /// Bind this object's set, vertex and index buffers, then draw
    pub fn record(&self, cmd: &mut dyn CommandList, frame_index: usize) -> Result<()> {
        let set = *self.descriptor_sets.get(frame_index).ok_or_else(|| self.bad_frame(frame_index))?;
        cmd.bind_descriptor_set(0, set)?;
        cmd.bind_vertex_buffer(self.vertex_buffer, 0)?;
        match self.index_buffer {
            Some(index) => {
                cmd.bind_index_buffer(index.buffer, 0, index.format)?;
                cmd.draw_indexed(index.count, 0, 0)
            }
            None => cmd.draw(self.vertex_count, 0),
        }
    }

    /// Read the index buffer back as u32 values, whatever width it uses
    pub fn read_indices(&self, device: &dyn GraphicsDevice) -> Result<Vec<u32>> {
        let Some(index) = self.index_buffer else {
            return Ok(Vec::new());
        };
        let len = index.count as u64 * index.format.bytes_per_index();
        let bytes = device.read_buffer(index.buffer, 0, len)?;
        Ok(decode_indices(&bytes, index.format))
    }

    /// Destroy every GPU resource; handles already freed are skipped by the device
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for set in self.descriptor_sets.drain(..) {
            device.destroy_descriptor_set(set);
        }
        for ubo in self.uniform_buffers.drain(..) {
            device.destroy_buffer(ubo);
        }
        if let Some(index) = self.index_buffer.take() {
            device.destroy_buffer(index.buffer);
        }
        if self.vertex_buffer != BufferHandle::default() {
            device.destroy_buffer(std::mem::take(&mut self.vertex_buffer));
        }
    }

    fn bad_frame(&self, frame_index: usize) -> Error {
        Error::InvalidState(format!(
            "'{}' has {} frame slots, frame {} requested", self.name, self.uniform_buffers.len(), frame_index
        ))
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<GameObjectId> {
        self.owner
    }

    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    pub fn world(&self) -> &Mat4 {
        &self.world
    }

    pub fn set_world(&mut self, world: Mat4) {
        self.world = world;
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Distance to the camera at the last sync
    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn index_buffer(&self) -> Option<&IndexBuffer> {
        self.index_buffer.as_ref()
    }

    pub fn index_format(&self) -> Option<IndexFormat> {
        self.index_buffer.map(|i| i.format)
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn triangle_count(&self) -> u32 {
        self.triangle_count
    }

    pub fn frame_count(&self) -> usize {
        self.uniform_buffers.len()
    }

    pub fn uniform_buffer(&self, frame_index: usize) -> Option<BufferHandle> {
        self.uniform_buffers.get(frame_index).copied()
    }

    pub fn descriptor_set(&self, frame_index: usize) -> Option<DescriptorSetHandle> {
        self.descriptor_sets.get(frame_index).copied()
    }
}

fn encode_indices(indices: &[u32], format: IndexFormat) -> Vec<u8> {
    match format {
        IndexFormat::U16 => {
            let narrow: Vec<u16> = indices.iter().map(|i| *i as u16).collect();
            bytemuck::cast_slice(&narrow).to_vec()
        }
        IndexFormat::U32 => bytemuck::cast_slice(indices).to_vec(),
    }
}

fn decode_indices(bytes: &[u8], format: IndexFormat) -> Vec<u32> {
    match format {
        IndexFormat::U16 => bytes
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]) as u32)
            .collect(),
        IndexFormat::U32 => bytes
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}

#[cfg(test)]
#[path = "render_object_tests.rs"]
mod tests;
