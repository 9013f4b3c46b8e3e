/// Forward opaque pass
///
/// Draws every opaque drawable straight into the backbuffer in render list
/// order; the depth test resolves overlap. After a depth pre-pass the depth
/// buffer is only tested, never written.

use std::any::Any;
use std::sync::Arc;

use crate::camera::CameraData;
use crate::error::Result;
use crate::graphics_device::{
    BlendMode, CommandList, ConstantSlot, CullMode, DepthState, GraphicsDevice, PipelineDesc,
    PipelineHandle, PrimitiveTopology, RenderTargetFormatHandle, ShaderHandle, ShaderStages,
};
use crate::render_object::RenderObjectData;
use crate::resource::{ShaderLibrary, Vertex};
use crate::engine_debug;

use super::drawables::DrawableSet;
use super::{
    create_pipeline, log_not_initialized, report_record, FrameState, Pass, PassSetup, PassStats,
    PassTarget, SceneContext, MAT4_SIZE, SHADER_MESH_VERT, SHADER_OPAQUE_FRAG,
};

const SOURCE: &str = "prisma::OpaquePass";

pub const OPAQUE_PASS_PRIORITY: i32 = 300;

pub struct OpaquePass {
    library: Arc<dyn ShaderLibrary>,
    priority: i32,
    depth_prepass: bool,
    pipeline: Option<PipelineHandle>,
    drawables: DrawableSet,
    camera: CameraData,
    stats: PassStats,
}

impl OpaquePass {
    pub fn new(library: Arc<dyn ShaderLibrary>) -> Self {
        Self {
            library,
            priority: OPAQUE_PASS_PRIORITY,
            depth_prepass: false,
            pipeline: None,
            drawables: DrawableSet::new(SOURCE),
            camera: CameraData::default(),
            stats: PassStats::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// A `DepthPrePass` runs first and has already written depth
    pub fn with_depth_prepass(mut self, enabled: bool) -> Self {
        self.depth_prepass = enabled;
        self
    }

    pub fn depth_prepass(&self) -> bool {
        self.depth_prepass
    }

    pub fn pipeline(&self) -> Option<PipelineHandle> {
        self.pipeline
    }

    pub fn objects(&self) -> &[RenderObjectData] {
        self.drawables.objects()
    }

    fn try_record(
        &mut self,
        cmd: &mut dyn CommandList,
        frame: &FrameState,
        pipeline: PipelineHandle,
    ) -> Result<()> {
        cmd.set_viewport(frame.viewport)?;
        cmd.set_scissor(frame.scissor)?;
        cmd.bind_pipeline(pipeline)?;
        let view_projection = self.camera.view_projection().to_cols_array();
        cmd.set_constant_buffer("ViewProjection", bytemuck::bytes_of(&view_projection))?;

        let order = self.drawables.frame_order().iter().copied();
        self.stats = self.drawables.record(cmd, frame.frame_index, order);
        Ok(())
    }
}

/// Depth already laid down by a pre-pass is tested, not rewritten
pub(super) fn mesh_depth_state(depth_prepass: bool) -> DepthState {
    if depth_prepass {
        DepthState::read_only()
    } else {
        DepthState::read_write()
    }
}

/// Pipeline description shared by the mesh passes
pub(super) fn mesh_pipeline_desc(
    name: &str,
    vs: ShaderHandle,
    fs: ShaderHandle,
    format: RenderTargetFormatHandle,
    depth: DepthState,
    blend: BlendMode,
) -> PipelineDesc {
    PipelineDesc {
        name: name.to_string(),
        vertex_shader: vs,
        fragment_shader: fs,
        vertex_layout: Vertex::layout(),
        topology: PrimitiveTopology::TriangleList,
        cull_mode: CullMode::Back,
        depth,
        blend,
        render_target_format: format,
        descriptor_layouts: vec![RenderObjectData::descriptor_layout()],
        constants: vec![ConstantSlot::new("ViewProjection", 0, MAT4_SIZE, ShaderStages::VERTEX)],
    }
}

impl Pass for OpaquePass {
    fn name(&self) -> &str {
        "Opaque"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn target(&self) -> PassTarget {
        PassTarget::Backbuffer
    }

    fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    fn build(&mut self, device: &mut dyn GraphicsDevice, ctx: &mut SceneContext) -> Result<()> {
        let list = ctx.list;
        self.drawables.build(device, ctx, &list.opaque)
    }

    fn initialize(&mut self, device: &mut dyn GraphicsDevice, setup: &PassSetup) -> Result<()> {
        self.cleanup(device);
        let format = setup.format;
        let depth = mesh_depth_state(self.depth_prepass);
        let pipeline = create_pipeline(
            device,
            self.library.as_ref(),
            SHADER_MESH_VERT,
            SHADER_OPAQUE_FRAG,
            |vs, fs| mesh_pipeline_desc("opaque", vs, fs, format, depth, BlendMode::Opaque),
        )?;
        self.pipeline = Some(pipeline);
        engine_debug!(SOURCE, "Initialized ({} drawables)", self.drawables.len());
        Ok(())
    }

    fn update(&mut self, frame: &FrameState) {
        self.camera = frame.camera;
    }

    fn sync_scene(&mut self, device: &mut dyn GraphicsDevice, ctx: &mut SceneContext) {
        let list = ctx.list;
        self.drawables.sync(device, ctx, &list.opaque);
    }

    fn prepare(&mut self, device: &mut dyn GraphicsDevice, frame: &FrameState) -> Result<()> {
        let camera = &self.camera;
        self.drawables.prepare(device, frame.frame_index, &camera.view, &camera.projection)
    }

    fn record(&mut self, cmd: &mut dyn CommandList, frame: &FrameState) {
        self.stats = PassStats::default();
        let Some(pipeline) = self.pipeline else {
            log_not_initialized(SOURCE, "Opaque");
            return;
        };
        let result = self.try_record(cmd, frame, pipeline);
        report_record(SOURCE, "Opaque", result);
    }

    fn cleanup(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            device.destroy_pipeline(pipeline);
        }
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.drawables.release(device);
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
#[path = "opaque_tests.rs"]
mod tests;
