/// Background pass - skybox or clear color
///
/// Whether the skybox path is taken is decided once, when the scene is
/// built: a loadable cubemap sets `has_texture`, anything else leaves the
/// flat clear-color quad. A missing cubemap or skybox shader degrades to
/// the clear color with a warning and is never an error.

use std::any::Any;
use std::sync::Arc;

use glam::{Mat3, Mat4};

use crate::camera::CameraData;
use crate::error::Result;
use crate::graphics_device::{
    BlendMode, BufferDesc, BufferHandle, BufferUsage, CommandList, ConstantSlot, CullMode,
    DepthState, DescriptorBinding, DescriptorKind, DescriptorLayout, DescriptorResource,
    DescriptorSetDesc, DescriptorSetHandle, DescriptorSlot, GraphicsDevice, PipelineDesc,
    PipelineHandle, PrimitiveTopology, SamplerKind, ShaderStages, TextureHandle, VertexAttribute,
    VertexFormat, VertexLayout,
};
use crate::resource::{MeshData, ShaderLibrary};
use crate::{engine_debug, engine_warn};

use super::{
    create_pipeline, log_not_initialized, report_record, FrameState, Pass, PassSetup, PassStats,
    PassTarget, SceneContext, MAT4_SIZE, SHADER_BACKGROUND_FRAG, SHADER_BACKGROUND_VERT,
    SHADER_SKYBOX_FRAG, SHADER_SKYBOX_VERT,
};

const SOURCE: &str = "prisma::BackgroundPass";

pub const BACKGROUND_PASS_PRIORITY: i32 = 200;

/// Vertices of the full-screen clear quad (triangle strip)
pub const CLEAR_QUAD_VERTICES: u32 = 4;

/// Position-only cube drawn around the camera
struct SkyboxGeometry {
    vertex_buffer: BufferHandle,
    vertex_count: u32,
    descriptor_set: DescriptorSetHandle,
}

impl SkyboxGeometry {
    fn layout() -> DescriptorLayout {
        DescriptorLayout::new(vec![DescriptorSlot {
            binding: 0,
            kind: DescriptorKind::CombinedImageSampler,
            stages: ShaderStages::FRAGMENT,
        }])
    }

    fn create(device: &mut dyn GraphicsDevice, cubemap: TextureHandle) -> Result<Self> {
        let cube = MeshData::cube(2.0);
        let positions: Vec<[f32; 3]> = match &cube.indices {
            Some(indices) => indices.iter().map(|&i| cube.vertices[i as usize].position).collect(),
            None => cube.vertices.iter().map(|v| v.position).collect(),
        };
        let bytes: &[u8] = bytemuck::cast_slice(&positions);

        let vertex_buffer = device.create_buffer(&BufferDesc {
            name: "skybox_vertices".to_string(),
            size: bytes.len() as u64,
            usage: BufferUsage::Vertex,
        })?;
        let set = device.write_buffer(vertex_buffer, 0, bytes).and_then(|()| {
            device.create_descriptor_set(&DescriptorSetDesc {
                name: "skybox_set".to_string(),
                layout: Self::layout(),
                bindings: vec![DescriptorBinding {
                    binding: 0,
                    resource: DescriptorResource::Texture { texture: cubemap, sampler: SamplerKind::LinearClamp },
                }],
            })
        });
        match set {
            Ok(descriptor_set) => Ok(Self { vertex_buffer, vertex_count: positions.len() as u32, descriptor_set }),
            Err(e) => {
                device.destroy_buffer(vertex_buffer);
                Err(e)
            }
        }
    }

    fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.destroy_descriptor_set(self.descriptor_set);
        device.destroy_buffer(self.vertex_buffer);
    }
}

pub struct BackgroundPass {
    library: Arc<dyn ShaderLibrary>,
    priority: i32,
    target: PassTarget,
    has_texture: bool,
    skybox: Option<SkyboxGeometry>,
    pipeline: Option<PipelineHandle>,
    camera: CameraData,
    stats: PassStats,
}

impl BackgroundPass {
    pub fn new(library: Arc<dyn ShaderLibrary>) -> Self {
        Self {
            library,
            priority: BACKGROUND_PASS_PRIORITY,
            target: PassTarget::Backbuffer,
            has_texture: false,
            skybox: None,
            pipeline: None,
            camera: CameraData::default(),
            stats: PassStats::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_target(mut self, target: PassTarget) -> Self {
        self.target = target;
        self
    }

    /// True when the skybox path will be recorded
    pub fn has_texture(&self) -> bool {
        self.has_texture
    }

    pub fn pipeline(&self) -> Option<PipelineHandle> {
        self.pipeline
    }

    fn drop_skybox(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(skybox) = self.skybox.take() {
            skybox.destroy(device);
        }
        self.has_texture = false;
    }

    fn clear_pipeline(&self, device: &mut dyn GraphicsDevice, setup: &PassSetup) -> Result<PipelineHandle> {
        create_pipeline(device, self.library.as_ref(), SHADER_BACKGROUND_VERT, SHADER_BACKGROUND_FRAG, |vs, fs| {
            PipelineDesc {
                name: "background_clear".to_string(),
                vertex_shader: vs,
                fragment_shader: fs,
                vertex_layout: VertexLayout::empty(),
                topology: PrimitiveTopology::TriangleStrip,
                cull_mode: CullMode::None,
                depth: DepthState::disabled(),
                blend: BlendMode::Opaque,
                render_target_format: setup.format,
                descriptor_layouts: Vec::new(),
                constants: vec![ConstantSlot::new("ClearColor", 0, 16, ShaderStages::FRAGMENT)],
            }
        })
    }

    fn skybox_pipeline(&self, device: &mut dyn GraphicsDevice, setup: &PassSetup) -> Result<PipelineHandle> {
        create_pipeline(device, self.library.as_ref(), SHADER_SKYBOX_VERT, SHADER_SKYBOX_FRAG, |vs, fs| {
            PipelineDesc {
                name: "background_skybox".to_string(),
                vertex_shader: vs,
                fragment_shader: fs,
                vertex_layout: VertexLayout {
                    stride: 12,
                    attributes: vec![VertexAttribute { location: 0, format: VertexFormat::Float3, offset: 0 }],
                },
                topology: PrimitiveTopology::TriangleList,
                // The camera sits inside the cube
                cull_mode: CullMode::Front,
                depth: DepthState::disabled(),
                blend: BlendMode::Opaque,
                render_target_format: setup.format,
                descriptor_layouts: vec![SkyboxGeometry::layout()],
                constants: vec![ConstantSlot::new("ViewProjection", 0, MAT4_SIZE, ShaderStages::VERTEX)],
            }
        })
    }

    fn record_clear(&mut self, cmd: &mut dyn CommandList, frame: &FrameState, pipeline: PipelineHandle) -> Result<()> {
        cmd.set_viewport(frame.viewport)?;
        cmd.set_scissor(frame.scissor)?;
        cmd.bind_pipeline(pipeline)?;
        cmd.set_constant_buffer("ClearColor", bytemuck::bytes_of(&self.camera.clear_color))?;
        cmd.draw(CLEAR_QUAD_VERTICES, 0)?;
        self.stats.draw_calls = 1;
        self.stats.triangles = 2;
        Ok(())
    }

    fn record_skybox(&mut self, cmd: &mut dyn CommandList, frame: &FrameState, pipeline: PipelineHandle) -> Result<()> {
        let Some(skybox) = &self.skybox else {
            return Ok(());
        };
        // Rotation only, the cube stays centered on the camera
        let view = Mat4::from_mat3(Mat3::from_mat4(self.camera.view));
        let view_projection = (self.camera.projection * view).to_cols_array();

        cmd.set_viewport(frame.viewport)?;
        cmd.set_scissor(frame.scissor)?;
        cmd.bind_pipeline(pipeline)?;
        cmd.bind_descriptor_set(0, skybox.descriptor_set)?;
        cmd.bind_vertex_buffer(skybox.vertex_buffer, 0)?;
        cmd.set_constant_buffer("ViewProjection", bytemuck::bytes_of(&view_projection))?;
        cmd.draw(skybox.vertex_count, 0)?;
        self.stats.draw_calls = 1;
        self.stats.triangles = skybox.vertex_count / 3;
        Ok(())
    }
}

impl Pass for BackgroundPass {
    fn name(&self) -> &str {
        "Background"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn target(&self) -> PassTarget {
        self.target
    }

    fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    fn build(&mut self, device: &mut dyn GraphicsDevice, ctx: &mut SceneContext) -> Result<()> {
        self.drop_skybox(device);
        let Some(skybox) = &ctx.list.skybox else {
            return Ok(());
        };

        let Some(cubemap) = ctx.resources.cubemap(device, &skybox.cubemap) else {
            engine_warn!(SOURCE, "Skybox '{}' has no usable cubemap, using clear color", skybox.cubemap);
            return Ok(());
        };
        match SkyboxGeometry::create(device, cubemap) {
            Ok(geometry) => {
                self.skybox = Some(geometry);
                self.has_texture = true;
            }
            Err(e) => engine_warn!(SOURCE, "Skybox geometry unavailable ({}), using clear color", e),
        }
        Ok(())
    }

    fn initialize(&mut self, device: &mut dyn GraphicsDevice, setup: &PassSetup) -> Result<()> {
        self.cleanup(device);
        if self.has_texture {
            match self.skybox_pipeline(device, setup) {
                Ok(pipeline) => {
                    self.pipeline = Some(pipeline);
                    engine_debug!(SOURCE, "Initialized (skybox)");
                    return Ok(());
                }
                Err(e) => {
                    engine_warn!(SOURCE, "Skybox pipeline unavailable ({}), using clear color", e);
                    self.drop_skybox(device);
                }
            }
        }
        self.pipeline = Some(self.clear_pipeline(device, setup)?);
        engine_debug!(SOURCE, "Initialized (clear color)");
        Ok(())
    }

    fn update(&mut self, frame: &FrameState) {
        self.camera = frame.camera;
    }

    fn record(&mut self, cmd: &mut dyn CommandList, frame: &FrameState) {
        self.stats = PassStats::default();
        let Some(pipeline) = self.pipeline else {
            log_not_initialized(SOURCE, "Background");
            return;
        };
        let result = if self.has_texture {
            self.record_skybox(cmd, frame, pipeline)
        } else {
            self.record_clear(cmd, frame, pipeline)
        };
        report_record(SOURCE, "Background", result);
    }

    fn cleanup(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            device.destroy_pipeline(pipeline);
        }
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.drop_skybox(device);
    }

    fn stats(&self) -> PassStats {
        self.stats
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "background_tests.rs"]
mod tests;
