/// RenderPipeline - ordered passes with an explicit lifecycle
///
/// ```text
/// Uninitialized --initialize--> Initialized --execute--> Executing
///       ^                            ^                       |
///       |                            +------initialize-------+-- cleanup --> Cleaned
///    add_pass                                                                   |
///                                  initialize (swapchain recovery) <------------+
/// ```
///
/// Passes run in insertion order, or by priority when auto-sort is on (ties
/// keep insertion order). Consecutive passes drawing into the same target
/// form a run that shares one device render pass; a target may only appear
/// in one run. The pipeline owns the G-Buffer and the lit color target when
/// a pass needs them, and times every pass' `record()`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RendererConfig;
use crate::error::{Error, Result};
use crate::gbuffer::GBuffer;
use crate::graphics_device::{
    ClearValue, CommandList, Extent2D, FramebufferHandle, GraphicsDevice, Rect2D,
    RenderTargetFormatHandle, Viewport,
};
use crate::lit_target::LitColorTarget;
use crate::pass::{
    BackgroundPass, CompositionPass, DepthPrePass, FrameState, GeometryPass, LightingPass,
    OpaquePass, Pass, PassSetup, PassStats, PassTarget, SceneContext, TransparentPass,
};
use crate::resource::{ResourceManager, ShaderLibrary};
use crate::scene::RenderList;
use crate::{engine_debug, engine_error, engine_info};

const SOURCE: &str = "prisma::Pipeline";

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Initialized,
    Executing,
    Cleaned,
}

/// Consecutive passes sharing a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TargetRun {
    target: PassTarget,
    start: usize,
    end: usize,
}

pub struct RenderPipeline {
    name: String,
    passes: Vec<Box<dyn Pass>>,
    state: PipelineState,
    auto_sort: bool,
    frames_in_flight: usize,
    runs: Vec<TargetRun>,
    extent: Extent2D,
    backbuffer_format: Option<RenderTargetFormatHandle>,
    gbuffer: Option<GBuffer>,
    lit_target: Option<LitColorTarget>,
    viewport: Option<Viewport>,
    /// CPU time of each pass' last `record()`, in pass order
    record_times: Vec<Duration>,
}

impl RenderPipeline {
    pub fn new(name: impl Into<String>, frames_in_flight: usize) -> Self {
        Self {
            name: name.into(),
            passes: Vec::new(),
            state: PipelineState::Uninitialized,
            auto_sort: false,
            frames_in_flight: frames_in_flight.max(1),
            runs: Vec::new(),
            extent: Extent2D::default(),
            backbuffer_format: None,
            gbuffer: None,
            lit_target: None,
            viewport: None,
            record_times: Vec::new(),
        }
    }

    pub fn with_auto_sort(mut self, enabled: bool) -> Self {
        self.auto_sort = enabled;
        self.sort_passes();
        self
    }

    // ===== BUILDERS =====

    /// Background, Opaque, Transparent into the backbuffer. With
    /// `depth_prepass` a `DepthPrePass` runs before Opaque.
    pub fn forward(library: Arc<dyn ShaderLibrary>, config: &RendererConfig) -> Result<Self> {
        let prepass = config.depth_prepass;
        let mut pipeline = Self::new("forward", config.frames_in_flight())
            .with_auto_sort(config.auto_sort_passes);
        pipeline.add_pass(BackgroundPass::new(library.clone()))?;
        if prepass {
            pipeline.add_pass(DepthPrePass::new(library.clone()))?;
        }
        pipeline.add_pass(OpaquePass::new(library.clone()).with_depth_prepass(prepass))?;
        pipeline.add_pass(TransparentPass::new(library))?;
        Ok(pipeline)
    }

    /// Geometry into the G-Buffer (after a `DepthPrePass` when enabled);
    /// Background, Lighting and Transparent into the lit color target;
    /// Composition into the backbuffer
    pub fn deferred(library: Arc<dyn ShaderLibrary>, config: &RendererConfig) -> Result<Self> {
        let prepass = config.depth_prepass;
        let mut pipeline = Self::new("deferred", config.frames_in_flight())
            .with_auto_sort(config.auto_sort_passes);
        if prepass {
            pipeline.add_pass(DepthPrePass::new(library.clone()).with_target(PassTarget::GBuffer))?;
        }
        pipeline.add_pass(GeometryPass::new(library.clone()).with_depth_prepass(prepass))?;
        pipeline.add_pass(BackgroundPass::new(library.clone()).with_target(PassTarget::LitColor))?;
        pipeline.add_pass(LightingPass::new(library.clone()))?;
        pipeline.add_pass(TransparentPass::new(library.clone()).with_target(PassTarget::LitColor))?;
        pipeline.add_pass(CompositionPass::with_settings(library, config.composition))?;
        Ok(pipeline)
    }

    // ===== PASSES =====

    /// Append a pass. Only valid before the first `initialize()`.
    pub fn add_pass(&mut self, pass: impl Pass) -> Result<()> {
        if self.state != PipelineState::Uninitialized {
            return Err(Error::InvalidState(format!(
                "pipeline '{}': add_pass('{}') in state {:?}",
                self.name,
                pass.name(),
                self.state
            )));
        }
        self.passes.push(Box::new(pass));
        self.sort_passes();
        Ok(())
    }

    fn sort_passes(&mut self) {
        if self.auto_sort {
            // Vec::sort_by_key is stable
            self.passes.sort_by_key(|pass| pass.priority());
        }
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Pass names in execution order
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn find_pass(&self, name: &str) -> Option<&dyn Pass> {
        self.passes.iter().find(|pass| pass.name() == name).map(|pass| pass.as_ref())
    }

    pub fn find_pass_mut(&mut self, name: &str) -> Option<&mut (dyn Pass + 'static)> {
        self.passes.iter_mut().find(|pass| pass.name() == name).map(|pass| pass.as_mut())
    }

    /// First pass of concrete type `T`
    pub fn pass<T: Pass>(&self) -> Option<&T> {
        self.passes.iter().find_map(|pass| pass.as_any().downcast_ref::<T>())
    }

    pub fn pass_mut<T: Pass>(&mut self) -> Option<&mut T> {
        self.passes.iter_mut().find_map(|pass| pass.as_any_mut().downcast_mut::<T>())
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, PipelineState::Initialized | PipelineState::Executing)
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn gbuffer(&self) -> Option<&GBuffer> {
        self.gbuffer.as_ref()
    }

    pub fn lit_target(&self) -> Option<&LitColorTarget> {
        self.lit_target.as_ref()
    }

    /// Override the full-extent viewport handed to every pass
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    pub fn reset_viewport(&mut self) {
        self.viewport = None;
    }

    /// Counters of each pass for the last frame, with its record time
    pub fn pass_stats(&self) -> Vec<(&str, PassStats)> {
        self.passes
            .iter()
            .enumerate()
            .map(|(i, pass)| {
                let cpu_time = self.record_times.get(i).copied().unwrap_or_default();
                (pass.name(), PassStats { cpu_time, ..pass.stats() })
            })
            .collect()
    }

    /// Sum of every pass' counters for the last frame
    pub fn stats(&self) -> PassStats {
        let mut total = PassStats::default();
        for (_, stats) in self.pass_stats() {
            total += stats;
        }
        total
    }

    fn needs(&self, target: PassTarget) -> bool {
        self.passes.iter().any(|pass| pass.target() == target)
    }

    // ===== LIFECYCLE =====

    /// Create per-drawable resources for every pass
    pub fn build(
        &mut self,
        device: &mut dyn GraphicsDevice,
        list: &RenderList,
        resources: &mut ResourceManager,
    ) -> Result<()> {
        let frames_in_flight = self.frames_in_flight;
        let mut ctx = SceneContext { list, resources, frames_in_flight };
        for pass in &mut self.passes {
            pass.build(device, &mut ctx)?;
        }
        engine_debug!(SOURCE, "'{}' built {} drawables", self.name, list.drawable_count());
        Ok(())
    }

    /// Create targets and every pass' pipeline state.
    ///
    /// Valid from `Uninitialized` and `Cleaned`; the latter is the swapchain
    /// recovery path. If any pass fails, the passes initialized so far are
    /// cleaned up again and the error is returned.
    pub fn initialize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        backbuffer_format: RenderTargetFormatHandle,
        extent: Extent2D,
    ) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::InvalidState(format!(
                "pipeline '{}' is already initialized, cleanup() first", self.name
            )));
        }
        self.runs = compute_runs(&self.passes)?;
        self.ensure_targets(device, extent)?;
        self.extent = extent;
        self.backbuffer_format = Some(backbuffer_format);

        for i in 0..self.passes.len() {
            let target = self.passes[i].target();
            let setup = PassSetup {
                format: self.target_format(target, backbuffer_format),
                extent,
                frames_in_flight: self.frames_in_flight,
                gbuffer: self.gbuffer.as_ref(),
                lit_color: self.lit_target.as_ref().map(|lit| lit.color()),
            };
            if let Err(e) = self.passes[i].initialize(device, &setup) {
                engine_error!(SOURCE, "'{}': pass '{}' failed to initialize: {}",
                    self.name, self.passes[i].name(), e);
                for pass in self.passes[..i].iter_mut().rev() {
                    pass.cleanup(device);
                }
                return Err(e);
            }
        }

        self.state = PipelineState::Initialized;
        engine_info!(SOURCE, "'{}' initialized: [{}] at {}x{}",
            self.name, self.pass_names().join(", "), extent.width, extent.height);
        Ok(())
    }

    /// Propagate camera and frame slot to every pass
    pub fn update(&mut self, frame: &FrameState) {
        let frame = self.frame_view(frame);
        for pass in &mut self.passes {
            pass.update(&frame);
        }
    }

    /// Hand this frame's render list to every pass. Mesh passes create
    /// resources for new drawables here and retire departed ones.
    pub fn sync_scene(
        &mut self,
        device: &mut dyn GraphicsDevice,
        list: &RenderList,
        resources: &mut ResourceManager,
    ) {
        let frames_in_flight = self.frames_in_flight;
        let mut ctx = SceneContext { list, resources, frames_in_flight };
        for pass in &mut self.passes {
            pass.sync_scene(device, &mut ctx);
        }
    }

    /// Per-frame uniform writes, after the frame slot's fence was waited on
    pub fn prepare(&mut self, device: &mut dyn GraphicsDevice, frame: &FrameState) -> Result<()> {
        let frame = self.frame_view(frame);
        for pass in &mut self.passes {
            pass.prepare(device, &frame)?;
        }
        Ok(())
    }

    /// Record every pass in order, one device render pass per target run
    pub fn execute(
        &mut self,
        cmd: &mut dyn CommandList,
        frame: &FrameState,
        backbuffer: FramebufferHandle,
    ) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::InvalidState(format!(
                "pipeline '{}' executed in state {:?}", self.name, self.state
            )));
        }
        self.state = PipelineState::Executing;
        let frame = self.frame_view(frame);
        let area = Rect2D::from_extent(self.extent);
        self.record_times.clear();
        self.record_times.resize(self.passes.len(), Duration::ZERO);

        for run in self.runs.clone() {
            let (format, framebuffer, clear_values) =
                self.run_target(run.target, backbuffer, &frame)?;
            cmd.begin_render_pass(format, framebuffer, area, &clear_values)?;
            for i in run.start..run.end {
                let started = Instant::now();
                self.passes[i].record(cmd, &frame);
                self.record_times[i] = started.elapsed();
            }
            cmd.end_render_pass()?;
        }
        Ok(())
    }

    /// Release every pass' pipeline state, last initialized first
    pub fn cleanup(&mut self, device: &mut dyn GraphicsDevice) {
        for pass in self.passes.iter_mut().rev() {
            pass.cleanup(device);
        }
        if self.state != PipelineState::Uninitialized {
            self.state = PipelineState::Cleaned;
        }
    }

    /// Drop every pass' per-drawable resources before a new scene is built
    pub fn release_scene(&mut self, device: &mut dyn GraphicsDevice) {
        for pass in self.passes.iter_mut().rev() {
            pass.release(device);
        }
    }

    /// Cleanup plus per-drawable resources and owned targets
    pub fn shutdown(&mut self, device: &mut dyn GraphicsDevice) {
        self.cleanup(device);
        self.release_scene(device);
        if let Some(lit) = self.lit_target.take() {
            lit.destroy(device);
        }
        if let Some(gbuffer) = self.gbuffer.take() {
            gbuffer.destroy(device);
        }
        self.state = PipelineState::Cleaned;
        engine_debug!(SOURCE, "'{}' shut down", self.name);
    }

    // ===== INTERNALS =====

    fn frame_view(&self, frame: &FrameState) -> FrameState {
        match self.viewport {
            Some(viewport) => FrameState { viewport, ..*frame },
            None => *frame,
        }
    }

    /// Create the G-Buffer and lit target on first use, resize them when the
    /// extent changed
    fn ensure_targets(&mut self, device: &mut dyn GraphicsDevice, extent: Extent2D) -> Result<()> {
        if self.needs(PassTarget::GBuffer) {
            match &mut self.gbuffer {
                Some(gbuffer) if gbuffer.extent() != extent => gbuffer.resize(device, extent)?,
                Some(_) => {}
                None => self.gbuffer = Some(GBuffer::create(device, extent)?),
            }
        }

        if self.needs(PassTarget::LitColor) {
            // the resized G-Buffer has a new depth texture
            let depth = self.gbuffer.as_ref().map(|gbuffer| gbuffer.depth());
            match &mut self.lit_target {
                Some(lit) if lit.extent() != extent || depth.is_some_and(|d| d != lit.depth()) => {
                    lit.resize(device, extent, depth)?
                }
                Some(_) => {}
                None => self.lit_target = Some(LitColorTarget::create(device, extent, depth)?),
            }
        }
        Ok(())
    }

    fn target_format(
        &self,
        target: PassTarget,
        backbuffer: RenderTargetFormatHandle,
    ) -> RenderTargetFormatHandle {
        match target {
            PassTarget::GBuffer => self.gbuffer.as_ref().map(|g| g.format()),
            PassTarget::LitColor => self.lit_target.as_ref().map(|l| l.format()),
            PassTarget::Backbuffer => None,
        }
        .unwrap_or(backbuffer)
    }

    fn run_target(
        &self,
        target: PassTarget,
        backbuffer: FramebufferHandle,
        frame: &FrameState,
    ) -> Result<(RenderTargetFormatHandle, FramebufferHandle, Vec<ClearValue>)> {
        let clear_color = frame.camera.clear_color;
        match target {
            PassTarget::GBuffer => {
                let gbuffer = self.gbuffer.as_ref().ok_or_else(|| missing_target(target))?;
                Ok((gbuffer.format(), gbuffer.framebuffer(), GBuffer::clear_values()))
            }
            PassTarget::LitColor => {
                let lit = self.lit_target.as_ref().ok_or_else(|| missing_target(target))?;
                Ok((lit.format(), lit.framebuffer(), LitColorTarget::clear_values(clear_color)))
            }
            PassTarget::Backbuffer => {
                let format = self.backbuffer_format.ok_or_else(|| missing_target(target))?;
                let clear_values = vec![
                    ClearValue::Color(clear_color),
                    ClearValue::DepthStencil { depth: 1.0, stencil: 0 },
                ];
                Ok((format, backbuffer, clear_values))
            }
        }
    }
}

fn missing_target(target: PassTarget) -> Error {
    Error::InvalidState(format!("{:?} target does not exist", target))
}

/// Group passes into runs, rejecting a target that appears twice
fn compute_runs(passes: &[Box<dyn Pass>]) -> Result<Vec<TargetRun>> {
    let mut runs: Vec<TargetRun> = Vec::new();
    for (i, pass) in passes.iter().enumerate() {
        let target = pass.target();
        match runs.last_mut() {
            Some(run) if run.target == target => run.end = i + 1,
            _ => {
                if runs.iter().any(|run| run.target == target) {
                    return Err(Error::InitializationFailed(format!(
                        "pass '{}' targets {:?} but is not adjacent to the other {:?} passes",
                        pass.name(), target, target
                    )));
                }
                runs.push(TargetRun { target, start: i, end: i + 1 });
            }
        }
    }
    Ok(runs)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
