/// Deferred geometry pass
///
/// Writes opaque drawables into the G-Buffer attachments. Without a depth
/// pre-pass the draw order is far-to-near by camera distance. With one, the
/// pre-pass has already written depth: the order is the render list's and
/// depth is tested without being written.

use std::any::Any;
use std::sync::Arc;

use crate::camera::CameraData;
use crate::error::{Error, Result};
use crate::graphics_device::{BlendMode, CommandList, GraphicsDevice, PipelineHandle};
use crate::render_object::RenderObjectData;
use crate::resource::ShaderLibrary;
use crate::engine_debug;

use super::drawables::DrawableSet;
use super::opaque::{mesh_depth_state, mesh_pipeline_desc};
use super::{
    create_pipeline, log_not_initialized, report_record, FrameState, Pass, PassSetup, PassStats,
    PassTarget, SceneContext, SHADER_GEOMETRY_FRAG, SHADER_MESH_VERT,
};

const SOURCE: &str = "prisma::GeometryPass";

pub const GEOMETRY_PASS_PRIORITY: i32 = 100;

pub struct GeometryPass {
    library: Arc<dyn ShaderLibrary>,
    priority: i32,
    depth_prepass: bool,
    pipeline: Option<PipelineHandle>,
    drawables: DrawableSet,
    /// Indices into `drawables`, in draw order
    order: Vec<usize>,
    camera: CameraData,
    stats: PassStats,
}

impl GeometryPass {
    pub fn new(library: Arc<dyn ShaderLibrary>) -> Self {
        Self {
            library,
            priority: GEOMETRY_PASS_PRIORITY,
            depth_prepass: false,
            pipeline: None,
            drawables: DrawableSet::new(SOURCE),
            order: Vec::new(),
            camera: CameraData::default(),
            stats: PassStats::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// A `DepthPrePass` runs first; the far-to-near sort buys nothing then
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

    /// Visible objects in the order the next `record()` draws them
    pub fn draw_order(&self) -> Vec<&RenderObjectData> {
        self.order
            .iter()
            .filter_map(|&i| self.drawables.objects().get(i))
            .filter(|o| o.is_visible())
            .collect()
    }

    fn sort(&mut self) {
        self.order = self.drawables.frame_order().to_vec();
        if self.depth_prepass {
            return;
        }
        let objects = self.drawables.objects();
        // Stable, so equal distances keep list order
        self.order.sort_by(|&a, &b| objects[b].distance().total_cmp(&objects[a].distance()));
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

        self.stats = self.drawables.record(cmd, frame.frame_index, self.order.iter().copied());
        Ok(())
    }
}

impl Pass for GeometryPass {
    fn name(&self) -> &str {
        "Geometry"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn target(&self) -> PassTarget {
        PassTarget::GBuffer
    }

    fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    fn build(&mut self, device: &mut dyn GraphicsDevice, ctx: &mut SceneContext) -> Result<()> {
        let list = ctx.list;
        self.drawables.build(device, ctx, &list.opaque)?;
        self.sort();
        Ok(())
    }

    fn initialize(&mut self, device: &mut dyn GraphicsDevice, setup: &PassSetup) -> Result<()> {
        if setup.gbuffer.is_none() {
            return Err(Error::InitializationFailed("geometry pass needs a G-Buffer".to_string()));
        }
        self.cleanup(device);
        let format = setup.format;
        let depth = mesh_depth_state(self.depth_prepass);
        let pipeline = create_pipeline(
            device,
            self.library.as_ref(),
            SHADER_MESH_VERT,
            SHADER_GEOMETRY_FRAG,
            |vs, fs| mesh_pipeline_desc("geometry", vs, fs, format, depth, BlendMode::Opaque),
        )?;
        self.pipeline = Some(pipeline);
        engine_debug!(SOURCE, "Initialized (depth pre-pass: {})", self.depth_prepass);
        Ok(())
    }

    fn update(&mut self, frame: &FrameState) {
        self.camera = frame.camera;
    }

    fn sync_scene(&mut self, device: &mut dyn GraphicsDevice, ctx: &mut SceneContext) {
        let list = ctx.list;
        self.drawables.sync(device, ctx, &list.opaque);
        self.sort();
    }

    fn prepare(&mut self, device: &mut dyn GraphicsDevice, frame: &FrameState) -> Result<()> {
        let camera = &self.camera;
        self.drawables.prepare(device, frame.frame_index, &camera.view, &camera.projection)
    }

    fn record(&mut self, cmd: &mut dyn CommandList, frame: &FrameState) {
        self.stats = PassStats::default();
        let Some(pipeline) = self.pipeline else {
            log_not_initialized(SOURCE, "Geometry");
            return;
        };
        let result = self.try_record(cmd, frame, pipeline);
        report_record(SOURCE, "Geometry", result);
    }

    fn cleanup(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            device.destroy_pipeline(pipeline);
        }
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.drawables.release(device);
        self.order.clear();
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
#[path = "geometry_tests.rs"]
mod tests;
