/// Depth pre-pass
///
/// Lays down depth for every opaque drawable with color writes masked off,
/// so the opaque or geometry pass that follows shades each pixel once. It
/// shares the target of the pass it feeds: the backbuffer in the forward
/// pipeline, the G-Buffer in the deferred one.

use std::any::Any;
use std::sync::Arc;

use crate::camera::CameraData;
use crate::error::Result;
use crate::graphics_device::{BlendMode, CommandList, DepthState, GraphicsDevice, PipelineHandle};
use crate::render_object::RenderObjectData;
use crate::resource::ShaderLibrary;
use crate::engine_debug;

use super::drawables::DrawableSet;
use super::opaque::mesh_pipeline_desc;
use super::{
    create_pipeline, log_not_initialized, report_record, FrameState, Pass, PassSetup, PassStats,
    PassTarget, SceneContext, SHADER_DEPTH_FRAG, SHADER_MESH_VERT,
};

const SOURCE: &str = "prisma::DepthPrePass";

pub const DEPTH_PREPASS_PRIORITY: i32 = 50;

pub struct DepthPrePass {
    library: Arc<dyn ShaderLibrary>,
    priority: i32,
    target: PassTarget,
    pipeline: Option<PipelineHandle>,
    drawables: DrawableSet,
    camera: CameraData,
    stats: PassStats,
}

impl DepthPrePass {
    pub fn new(library: Arc<dyn ShaderLibrary>) -> Self {
        Self {
            library,
            priority: DEPTH_PREPASS_PRIORITY,
            target: PassTarget::Backbuffer,
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

    /// `GBuffer` in the deferred pipeline
    pub fn with_target(mut self, target: PassTarget) -> Self {
        self.target = target;
        self
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

impl Pass for DepthPrePass {
    fn name(&self) -> &str {
        "DepthPrePass"
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
        let list = ctx.list;
        self.drawables.build(device, ctx, &list.opaque)
    }

    fn initialize(&mut self, device: &mut dyn GraphicsDevice, setup: &PassSetup) -> Result<()> {
        self.cleanup(device);
        let format = setup.format;
        let pipeline = create_pipeline(
            device,
            self.library.as_ref(),
            SHADER_MESH_VERT,
            SHADER_DEPTH_FRAG,
            |vs, fs| {
                mesh_pipeline_desc(
                    "depth_prepass", vs, fs, format, DepthState::read_write(), BlendMode::DepthOnly,
                )
            },
        )?;
        self.pipeline = Some(pipeline);
        engine_debug!(SOURCE, "Initialized ({} drawables, target {:?})",
            self.drawables.len(), self.target);
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
            log_not_initialized(SOURCE, "DepthPrePass");
            return;
        };
        let result = self.try_record(cmd, frame, pipeline);
        report_record(SOURCE, "DepthPrePass", result);
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
#[path = "depth_prepass_tests.rs"]
mod tests;
