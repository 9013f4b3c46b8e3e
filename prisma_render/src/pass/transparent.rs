/// Alpha-blended pass
///
/// Runs after opaque geometry and the background. Depth is tested against
/// the populated buffer but never written, and objects are drawn back to
/// front so blending composes correctly. The ordering is a radix sort on
/// the float bits of the camera distance.

use std::any::Any;
use std::sync::Arc;

use rdst::{RadixKey, RadixSort};

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
    PassTarget, SceneContext, SHADER_MESH_VERT, SHADER_TRANSPARENT_FRAG,
};

const SOURCE: &str = "prisma::TransparentPass";

pub const TRANSPARENT_PASS_PRIORITY: i32 = 500;

/// Sort entry: ascending `key` is descending distance
#[derive(Debug, Clone, Copy)]
struct DepthKey {
    key: u32,
    index: u32,
}

impl DepthKey {
    /// Non-negative floats order like their bit patterns, so inverting the
    /// bits turns an ascending sort into far-first.
    fn far_first(distance: f32, index: usize) -> Self {
        Self { key: !distance.max(0.0).to_bits(), index: index as u32 }
    }
}

impl RadixKey for DepthKey {
    const LEVELS: usize = 4;

    #[inline]
    fn get_level(&self, level: usize) -> u8 {
        (self.key >> (level * 8)) as u8
    }
}

pub struct TransparentPass {
    library: Arc<dyn ShaderLibrary>,
    priority: i32,
    target: PassTarget,
    pipeline: Option<PipelineHandle>,
    drawables: DrawableSet,
    order: Vec<usize>,
    camera: CameraData,
    stats: PassStats,
}

impl TransparentPass {
    pub fn new(library: Arc<dyn ShaderLibrary>) -> Self {
        Self {
            library,
            priority: TRANSPARENT_PASS_PRIORITY,
            target: PassTarget::Backbuffer,
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

    /// `LitColor` in the deferred pipeline
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

    /// Visible objects back to front
    pub fn draw_order(&self) -> Vec<&RenderObjectData> {
        self.order.iter().filter_map(|&i| self.drawables.objects().get(i)).collect()
    }

    fn sort_back_to_front(&mut self) {
        let objects = self.drawables.objects();
        let mut keys: Vec<DepthKey> = self
            .drawables
            .frame_order()
            .iter()
            .map(|&i| (i, &objects[i]))
            .filter(|(_, o)| !o.material().is_invisible())
            .map(|(i, o)| DepthKey::far_first(o.distance(), i))
            .collect();
        keys.radix_sort_unstable();
        self.order = keys.into_iter().map(|k| k.index as usize).collect();
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

impl Pass for TransparentPass {
    fn name(&self) -> &str {
        "Transparent"
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
        self.drawables.build(device, ctx, &list.transparent)?;
        self.sort_back_to_front();
        Ok(())
    }

    fn initialize(&mut self, device: &mut dyn GraphicsDevice, setup: &PassSetup) -> Result<()> {
        self.cleanup(device);
        let format = setup.format;
        let pipeline = create_pipeline(
            device,
            self.library.as_ref(),
            SHADER_MESH_VERT,
            SHADER_TRANSPARENT_FRAG,
            |vs, fs| {
                mesh_pipeline_desc(
                    "transparent", vs, fs, format, DepthState::read_only(), BlendMode::Alpha,
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
        self.drawables.sync(device, ctx, &list.transparent);
        self.sort_back_to_front();
    }

    fn prepare(&mut self, device: &mut dyn GraphicsDevice, frame: &FrameState) -> Result<()> {
        let camera = &self.camera;
        self.drawables.prepare(device, frame.frame_index, &camera.view, &camera.projection)
    }

    fn record(&mut self, cmd: &mut dyn CommandList, frame: &FrameState) {
        self.stats = PassStats::default();
        let Some(pipeline) = self.pipeline else {
            log_not_initialized(SOURCE, "Transparent");
            return;
        };
        let result = self.try_record(cmd, frame, pipeline);
        report_record(SOURCE, "Transparent", result);
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
#[path = "transparent_tests.rs"]
mod tests;
