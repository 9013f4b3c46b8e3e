/// Renderer - frame loop and swapchain-loss recovery
///
/// Owns the device, the swapchain-backed targets, frame synchronization and
/// the configured `RenderPipeline`. A frame is:
///
/// ```text
/// minimized? skip
/// wait in-flight fence (slot K)
/// acquire image        -- out of date / suboptimal --> recover, drop frame
/// update, sync_scene, prepare (uniforms of slot K)
/// record, reset fence, submit
/// present              -- out of date / suboptimal --> recover
/// advance K
/// ```
///
/// Recovery tears everything window-dependent down and rebuilds it in a
/// fixed order; scene state is never touched.

use std::sync::Arc;

use crate::camera::{Camera, FrustumCuller};
use crate::config::{PipelineKind, RendererConfig};
use crate::error::{Error, Result};
use crate::frame::FrameSync;
use crate::graphics_device::{
    AcquireOutcome, AttachmentDesc, AttachmentUsage, CommandList, Extent2D, FramebufferDesc,
    FramebufferHandle, GraphicsDevice, LoadOp, PresentOutcome, RenderTargetFormatDesc,
    RenderTargetFormatHandle, SurfaceState, SwapchainDesc, SwapchainInfo, TextureDesc,
    TextureFormat, TextureHandle,
};
use crate::pass::FrameState;
use crate::pipeline::RenderPipeline;
use crate::resource::{ResourceManager, ShaderLibrary};
use crate::scene::Scene;
use crate::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};

const SOURCE: &str = "prisma::Renderer";

/// Depth format of the backbuffer framebuffers
pub const BACKBUFFER_DEPTH_FORMAT: TextureFormat = TextureFormat::D32_FLOAT;

/// Frame loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames submitted and presented
    pub frames_rendered: u64,
    /// Frames abandoned after acquire reported a stale swapchain
    pub frames_dropped: u64,
    /// Completed swapchain recreations
    pub recoveries: u64,
}

// ============================================================================
// Backbuffer targets
// ============================================================================

/// Everything created from the swapchain
struct Backbuffer {
    info: SwapchainInfo,
    views: Vec<TextureHandle>,
    format: RenderTargetFormatHandle,
    depth: Option<TextureHandle>,
    framebuffers: Vec<FramebufferHandle>,
}

impl Backbuffer {
    fn format_desc(color: TextureFormat) -> RenderTargetFormatDesc {
        let depth = AttachmentDesc::new(
            BACKBUFFER_DEPTH_FORMAT,
            LoadOp::Clear,
            AttachmentUsage::Attachment,
        );
        RenderTargetFormatDesc {
            name: "backbuffer".to_string(),
            color: vec![AttachmentDesc::new(color, LoadOp::Clear, AttachmentUsage::Present)],
            depth: Some(depth),
        }
    }

    /// Swapchain, views and render-target format. Depth and framebuffers
    /// come later through `create_framebuffers()`.
    fn create(device: &mut dyn GraphicsDevice, desc: &SwapchainDesc) -> Result<Self> {
        let info = device.create_swapchain(desc)?;
        let views = match device.create_swapchain_views() {
            Ok(views) => views,
            Err(e) => {
                device.destroy_swapchain();
                return Err(e);
            }
        };
        let format = match device.create_render_target_format(&Self::format_desc(info.format)) {
            Ok(format) => format,
            Err(e) => {
                device.destroy_swapchain_views();
                device.destroy_swapchain();
                return Err(e);
            }
        };
        Ok(Self { info, views, format, depth: None, framebuffers: Vec::new() })
    }

    fn create_framebuffers(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        let extent = self.info.extent;
        let depth_desc =
            TextureDesc::attachment("backbuffer_depth", extent, BACKBUFFER_DEPTH_FORMAT);
        let depth = device.create_texture(&depth_desc)?;
        self.depth = Some(depth);
        for (i, view) in self.views.iter().enumerate() {
            let framebuffer = device.create_framebuffer(&FramebufferDesc {
                name: format!("backbuffer{}", i),
                format: self.format,
                color: vec![*view],
                depth: Some(depth),
                extent,
            })?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    fn destroy_framebuffers(&mut self, device: &mut dyn GraphicsDevice) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
        if let Some(depth) = self.depth.take() {
            device.destroy_texture(depth);
        }
    }

    /// Render-target format, views and swapchain, in that order
    fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.destroy_render_target_format(self.format);
        device.destroy_swapchain_views();
        device.destroy_swapchain();
    }

    /// Unwind a partially attached backbuffer: framebuffers, the pipeline
    /// state built against its format, then the swapchain objects
    fn abandon(mut self, device: &mut dyn GraphicsDevice, pipeline: &mut RenderPipeline) {
        self.destroy_framebuffers(device);
        pipeline.cleanup(device);
        self.destroy(device);
    }

    fn framebuffer(&self, image_index: u32) -> Result<FramebufferHandle> {
        self.framebuffers.get(image_index as usize).copied().ok_or_else(|| {
            Error::InvalidState(format!("no framebuffer for swapchain image {}", image_index))
        })
    }
}

// ============================================================================
// Renderer
// ============================================================================

pub struct Renderer {
    device: Box<dyn GraphicsDevice>,
    config: RendererConfig,
    resources: ResourceManager,
    pipeline: RenderPipeline,
    frames: FrameSync,
    command_lists: Vec<Box<dyn CommandList>>,
    backbuffer: Option<Backbuffer>,
    is_shut_down: bool,
    surface: SurfaceState,
    preferred_extent: Extent2D,
    swapchain_dirty: bool,
    default_camera: Camera,
    culler: Option<FrustumCuller>,
    stats: FrameStats,
}

impl Renderer {
    /// Create the swapchain targets, frame slots and the configured pipeline.
    ///
    /// The pipeline is initialized against an empty scene so frames can be
    /// rendered before `load_scene()`.
    pub fn new(
        device: Box<dyn GraphicsDevice>,
        config: RendererConfig,
        resources: ResourceManager,
    ) -> Result<Self> {
        let pipeline = Self::build_pipeline(resources.shader_library(), &config)?;
        Self::with_pipeline(device, config, resources, pipeline)
    }

    /// Same as `new()` with a caller-assembled pipeline
    pub fn with_pipeline(
        mut device: Box<dyn GraphicsDevice>,
        config: RendererConfig,
        resources: ResourceManager,
        mut pipeline: RenderPipeline,
    ) -> Result<Self> {
        let surface = device.surface_state()?;
        let desc = SwapchainDesc { preferred_extent: surface.extent, vsync: config.vsync };
        let mut backbuffer = Backbuffer::create(device.as_mut(), &desc)?;
        let extent = backbuffer.info.extent;

        let mut frames = FrameSync::empty();
        let frames_in_flight = config.frames_in_flight();
        let attached = attach_backbuffer(
            device.as_mut(),
            &mut pipeline,
            &mut frames,
            frames_in_flight,
            &mut backbuffer,
        )
        .and_then(|()| create_command_lists(device.as_mut(), frames.frames_in_flight()));
        let command_lists = match attached {
            Ok(command_lists) => command_lists,
            Err(e) => {
                backbuffer.abandon(device.as_mut(), &mut pipeline);
                pipeline.shutdown(device.as_mut());
                frames.destroy(device.as_mut());
                return Err(e);
            }
        };

        let mut default_camera =
            Camera::perspective(60f32.to_radians(), extent.aspect(), 0.1, 1000.0);
        default_camera.set_clear_color(config.clear_color);
        let culler = config.frustum_culling.then(|| FrustumCuller::new(default_camera.frustum()));

        engine_info!(SOURCE, "'{}' ready: {} pipeline, {}x{}, {} frames in flight",
            config.app_name, pipeline.name(), extent.width, extent.height,
            frames.frames_in_flight());

        Ok(Self {
            device,
            config,
            resources,
            pipeline,
            frames,
            command_lists,
            backbuffer: Some(backbuffer),
            is_shut_down: false,
            surface,
            preferred_extent: extent,
            swapchain_dirty: false,
            default_camera,
            culler,
            stats: FrameStats::default(),
        })
    }

    fn build_pipeline(
        library: Arc<dyn ShaderLibrary>,
        config: &RendererConfig,
    ) -> Result<RenderPipeline> {
        match config.pipeline {
            PipelineKind::Forward => RenderPipeline::forward(library, config),
            PipelineKind::Deferred => RenderPipeline::deferred(library, config),
        }
    }

    // ===== ACCESSORS =====

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut RenderPipeline {
        &mut self.pipeline
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Slot the next frame records into
    pub fn frame_index(&self) -> usize {
        self.frames.frame_index()
    }

    /// Current swapchain extent (zero after shutdown)
    pub fn extent(&self) -> Extent2D {
        self.backbuffer.as_ref().map(|b| b.info.extent).unwrap_or_default()
    }

    // ===== SCENE =====

    /// Rebuild per-drawable resources for `scene` and reinitialize the passes.
    ///
    /// Every mesh-bearing object gets resources, inactive and nearly
    /// invisible ones included, so toggling them later costs no allocation.
    /// While a swapchain rebuild is pending the passes are initialized by
    /// that rebuild instead.
    pub fn load_scene(&mut self, scene: &Scene) -> Result<()> {
        if self.is_shut_down {
            return Err(shut_down());
        }
        let target = self.backbuffer.as_ref().map(|b| (b.format, b.info.extent));

        self.device.wait_idle()?;
        self.pipeline.cleanup(self.device.as_mut());
        self.pipeline.release_scene(self.device.as_mut());

        let list = scene.collect_build_list(&self.resources);
        self.pipeline.build(self.device.as_mut(), &list, &mut self.resources)?;
        if let Some((format, extent)) = target {
            self.pipeline.initialize(self.device.as_mut(), format, extent)?;
        }

        engine_info!(SOURCE, "Scene '{}' loaded: {} opaque, {} transparent, {} lights",
            scene.name(), list.opaque.len(), list.transparent.len(), list.lights.len());
        Ok(())
    }

    // ===== FRAME LOOP =====

    /// Render and present one frame of `scene`
    pub fn render_frame(&mut self, scene: &Scene) -> Result<()> {
        if self.is_shut_down {
            return Err(shut_down());
        }

        let surface = self.device.surface_state()?;
        if surface.extent.is_zero() {
            engine_trace!(SOURCE, "Surface minimized, frame skipped");
            return Ok(());
        }
        if self.swapchain_dirty || surface != self.surface {
            self.recover()?;
        }

        // Slot K's previous submission must be done before its uniforms are rewritten
        self.frames.wait(self.device.as_mut())?;
        let slot = self.frames.current();
        let frame_index = self.frames.frame_index();

        let image_index = match self.device.acquire_next_image(slot.image_available)? {
            AcquireOutcome::Image(index) => index,
            outcome @ (AcquireOutcome::Suboptimal(_) | AcquireOutcome::OutOfDate) => {
                engine_warn!(SOURCE, "Acquire reported {:?}, recreating swapchain", outcome);
                self.stats.frames_dropped += 1;
                return self.recover();
            }
        };

        let list = scene.collect_render_list(&self.resources, self.culler.as_mut());
        let camera = list.camera.unwrap_or_else(|| self.default_camera.data());
        let frame = FrameState::new(frame_index, self.extent(), camera);

        self.pipeline.update(&frame);
        self.pipeline.sync_scene(self.device.as_mut(), &list, &mut self.resources);
        self.pipeline.prepare(self.device.as_mut(), &frame)?;

        let framebuffer = self
            .backbuffer
            .as_ref()
            .ok_or_else(|| Error::InvalidState("no swapchain targets".to_string()))?
            .framebuffer(image_index)?;
        let cmd = self
            .command_lists
            .get_mut(frame_index)
            .ok_or_else(|| {
                Error::InvalidState(format!("no command list for frame slot {}", frame_index))
            })?;
        cmd.begin()?;
        self.pipeline.execute(cmd.as_mut(), &frame, framebuffer)?;
        cmd.end()?;

        // Reset right before submit so a failed recording never leaves an
        // unsignaled fence behind
        self.frames.reset(self.device.as_mut())?;
        self.device.submit(cmd.as_ref(), &slot.submit_sync())?;

        let presented = self.device.present(image_index, slot.render_finished)?;
        self.frames.advance();
        self.stats.frames_rendered += 1;

        if presented != PresentOutcome::Presented {
            engine_warn!(SOURCE, "Present reported {:?}, recreating swapchain", presented);
            self.recover()?;
        }
        Ok(())
    }

    // ===== SURFACE EVENTS =====

    /// Compare the surface with the swapchain and recover when it changed.
    /// Returns true when a recreation happened.
    pub fn on_config_changed(&mut self) -> Result<bool> {
        let surface = self.device.surface_state()?;
        if surface == self.surface && !self.swapchain_dirty {
            return Ok(false);
        }
        engine_debug!(SOURCE, "Surface changed to {}x{} ({:?})",
            surface.extent.width, surface.extent.height, surface.transform);
        self.recover()?;
        Ok(!self.swapchain_dirty)
    }

    /// Request a swapchain of `width`x`height` at the next frame
    pub fn resize(&mut self, width: u32, height: u32) {
        self.preferred_extent = Extent2D::new(width, height);
        self.swapchain_dirty = true;
    }

    /// Full teardown and rebuild of everything created from the swapchain.
    ///
    /// With a minimized surface the swapchain is only marked dirty; the next
    /// frame with a visible surface performs the rebuild.
    fn recover(&mut self) -> Result<()> {
        // Stays set until the rebuild completed so a failed attempt is retried
        self.swapchain_dirty = true;
        if self.device.surface_state()?.extent.is_zero() {
            return Ok(());
        }

        let device = self.device.as_mut();
        device.wait_idle()?;

        if let Some(mut backbuffer) = self.backbuffer.take() {
            backbuffer.destroy_framebuffers(device);
            self.pipeline.cleanup(device);
            backbuffer.destroy(device);
        }

        let desc = SwapchainDesc {
            preferred_extent: self.preferred_extent,
            vsync: self.config.vsync,
        };
        let mut backbuffer = Backbuffer::create(device, &desc)?;
        let extent = backbuffer.info.extent;

        let frames_in_flight = self.config.frames_in_flight();
        let attached = attach_backbuffer(
            device,
            &mut self.pipeline,
            &mut self.frames,
            frames_in_flight,
            &mut backbuffer,
        );
        if let Err(e) = attached {
            // Nothing created from the new swapchain survives, so the next attempt starts clean
            engine_error!(SOURCE, "Swapchain rebuild failed, retrying on the next frame: {}", e);
            backbuffer.abandon(device, &mut self.pipeline);
            return Err(e);
        }

        self.default_camera.set_aspect(extent.aspect());
        self.surface = device.surface_state()?;
        self.preferred_extent = extent;
        self.backbuffer = Some(backbuffer);
        self.swapchain_dirty = false;
        self.stats.recoveries += 1;

        engine_info!(SOURCE, "Swapchain recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }

    // ===== SHUTDOWN =====

    /// Release everything in reverse creation order. Idempotent.
    pub fn shutdown(&mut self) {
        if self.is_shut_down {
            return;
        }
        self.is_shut_down = true;
        let device = self.device.as_mut();
        if let Err(e) = device.wait_idle() {
            engine_error!(SOURCE, "wait_idle failed during shutdown: {}", e);
        }

        // A failed swapchain rebuild leaves no backbuffer behind
        let mut backbuffer = self.backbuffer.take();
        if let Some(backbuffer) = backbuffer.as_mut() {
            backbuffer.destroy_framebuffers(device);
        }
        self.pipeline.shutdown(device);
        if let Some(backbuffer) = backbuffer {
            backbuffer.destroy(device);
        }
        self.command_lists.clear();
        self.frames.destroy(device);
        self.resources.release(device);
        self.swapchain_dirty = false;

        engine_info!(SOURCE, "Renderer shut down after {} frames", self.stats.frames_rendered);
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Fresh frame slots, pipeline state and framebuffers for `backbuffer`.
///
/// Acquire may have signaled a semaphore nobody waits on, so the slots are
/// always recreated. On failure the caller abandons the backbuffer.
fn attach_backbuffer(
    device: &mut dyn GraphicsDevice,
    pipeline: &mut RenderPipeline,
    frames: &mut FrameSync,
    frames_in_flight: usize,
    backbuffer: &mut Backbuffer,
) -> Result<()> {
    frames.destroy(device);
    *frames = FrameSync::new(device, frames_in_flight)?;
    pipeline.initialize(device, backbuffer.format, backbuffer.info.extent)?;
    backbuffer.create_framebuffers(device)
}

fn create_command_lists(
    device: &mut dyn GraphicsDevice,
    count: usize,
) -> Result<Vec<Box<dyn CommandList>>> {
    (0..count).map(|_| device.create_command_list()).collect()
}

fn shut_down() -> Error {
    Error::InvalidState("renderer was shut down".to_string())
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
