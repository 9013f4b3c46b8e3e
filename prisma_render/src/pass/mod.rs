/// Render passes
///
/// A pass is one unit of GPU work recorded into the frame's command list.
/// Its pipeline state object is created in `initialize()` against the
/// render target format of the run it belongs to, and released in
/// `cleanup()`; per-drawable resources are created in `build()` at
/// scene-load time, or in `sync_scene()` for drawables that show up later,
/// and survive swapchain recreation until `release()`.
///
/// # Lifecycle
///
/// ```text
/// build -> initialize -> { update -> sync_scene -> prepare -> record }* -> cleanup -> release
///                 ^______________ cleanup (swapchain lost) _______|
/// ```

mod drawables;
mod background;
mod depth_prepass;
mod opaque;
mod geometry;
mod transparent;
mod lighting;
mod composition;

pub use background::{BackgroundPass, BACKGROUND_PASS_PRIORITY, CLEAR_QUAD_VERTICES};
pub use depth_prepass::{DepthPrePass, DEPTH_PREPASS_PRIORITY};
pub use opaque::{OpaquePass, OPAQUE_PASS_PRIORITY};
pub use geometry::{GeometryPass, GEOMETRY_PASS_PRIORITY};
pub use transparent::{TransparentPass, TRANSPARENT_PASS_PRIORITY};
pub use lighting::{IblMaps, LightingPass, LIGHTING_PASS_PRIORITY};
pub use composition::{
    CompositionPass, CompositionSettings, CompositionUniforms, PostEffect, PostEffects,
    COMPOSITION_PASS_PRIORITY, MAX_EFFECT_STAGES,
};

use std::any::Any;
use std::time::Duration;

use glam::Mat4;

use crate::camera::CameraData;
use crate::error::Result;
use crate::gbuffer::GBuffer;
use crate::graphics_device::{
    CommandList, Extent2D, GraphicsDevice, PipelineDesc, PipelineHandle, Rect2D,
    RenderTargetFormatHandle, ShaderHandle, ShaderStage, TextureHandle, Viewport,
};
use crate::resource::{load_shader, ResourceManager, ShaderLibrary};
use crate::scene::RenderList;
use crate::engine_error;

// ============================================================================
// Built-in shader names
// ============================================================================

pub const SHADER_BACKGROUND_VERT: &str = "background.vert";
pub const SHADER_BACKGROUND_FRAG: &str = "background.frag";
pub const SHADER_SKYBOX_VERT: &str = "skybox.vert";
pub const SHADER_SKYBOX_FRAG: &str = "skybox.frag";
pub const SHADER_MESH_VERT: &str = "mesh.vert";
pub const SHADER_DEPTH_FRAG: &str = "depth.frag";
pub const SHADER_OPAQUE_FRAG: &str = "opaque.frag";
pub const SHADER_GEOMETRY_FRAG: &str = "geometry.frag";
pub const SHADER_TRANSPARENT_FRAG: &str = "transparent.frag";
pub const SHADER_FULLSCREEN_VERT: &str = "fullscreen.vert";
pub const SHADER_LIGHTING_FRAG: &str = "lighting.frag";
pub const SHADER_COMPOSITION_FRAG: &str = "composition.frag";

/// Every shader a built-in pass may load
pub const BUILTIN_SHADERS: &[&str] = &[
    SHADER_BACKGROUND_VERT,
    SHADER_BACKGROUND_FRAG,
    SHADER_SKYBOX_VERT,
    SHADER_SKYBOX_FRAG,
    SHADER_MESH_VERT,
    SHADER_DEPTH_FRAG,
    SHADER_OPAQUE_FRAG,
    SHADER_GEOMETRY_FRAG,
    SHADER_TRANSPARENT_FRAG,
    SHADER_FULLSCREEN_VERT,
    SHADER_LIGHTING_FRAG,
    SHADER_COMPOSITION_FRAG,
];

/// Size of a column-major 4x4 float matrix constant
pub(crate) const MAT4_SIZE: u32 = 64;

// ============================================================================
// Pass inputs
// ============================================================================

/// Render target a pass draws into
///
/// Consecutive passes with the same target share one device render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassTarget {
    /// Deferred geometry attachments
    GBuffer,
    /// Offscreen HDR color resolved by composition
    LitColor,
    /// Swapchain image
    Backbuffer,
}

/// Everything `initialize()` needs to build a pipeline state object
pub struct PassSetup<'a> {
    /// Format of the render target run this pass belongs to
    pub format: RenderTargetFormatHandle,
    pub extent: Extent2D,
    pub frames_in_flight: usize,
    pub gbuffer: Option<&'a GBuffer>,
    /// Lit color texture, sampled by composition
    pub lit_color: Option<TextureHandle>,
}

/// Scene inputs for `build()` and `sync_scene()`
pub struct SceneContext<'a> {
    pub list: &'a RenderList,
    pub resources: &'a mut ResourceManager,
    pub frames_in_flight: usize,
}

/// Per-frame state propagated to every pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    /// Frame-in-flight slot, indexes every per-frame resource array
    pub frame_index: usize,
    pub extent: Extent2D,
    pub viewport: Viewport,
    pub scissor: Rect2D,
    pub camera: CameraData,
}

impl FrameState {
    /// Full-extent viewport and scissor
    pub fn new(frame_index: usize, extent: Extent2D, camera: CameraData) -> Self {
        Self {
            frame_index,
            extent,
            viewport: Viewport::from_extent(extent),
            scissor: Rect2D::from_extent(extent),
            camera,
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.camera.view_projection()
    }
}

/// Counters for the last recorded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassStats {
    pub draw_calls: u32,
    pub triangles: u32,
    pub objects: u32,
    pub culled_objects: u32,
    /// Lights shaded (lighting pass only)
    pub lights: u32,
    /// CPU time spent in `record()`, measured by the pipeline
    pub cpu_time: Duration,
}

impl std::ops::AddAssign for PassStats {
    fn add_assign(&mut self, other: Self) {
        self.draw_calls += other.draw_calls;
        self.triangles += other.triangles;
        self.objects += other.objects;
        self.culled_objects += other.culled_objects;
        self.lights += other.lights;
        self.cpu_time += other.cpu_time;
    }
}

// ============================================================================
// Pass trait
// ============================================================================

/// One unit of GPU work inside a `RenderPipeline`
///
/// `record()` never fails from the caller's point of view: errors are logged
/// and the pass (or the offending draw) is skipped for the frame.
pub trait Pass: Send + 'static {
    fn name(&self) -> &str;

    /// Sort key when the pipeline auto-sorts (lower first, ties keep insertion order)
    fn priority(&self) -> i32 {
        0
    }

    fn target(&self) -> PassTarget;

    /// True between a successful `initialize()` and the next `cleanup()`
    fn is_initialized(&self) -> bool;

    /// Create per-drawable resources from the scene
    fn build(&mut self, _device: &mut dyn GraphicsDevice, _ctx: &mut SceneContext) -> Result<()> {
        Ok(())
    }

    /// Create the pipeline state object. Fatal for the pipeline on failure.
    fn initialize(&mut self, device: &mut dyn GraphicsDevice, setup: &PassSetup) -> Result<()>;

    /// Receive the camera and frame slot for this frame
    fn update(&mut self, _frame: &FrameState) {}

    /// Pick up transforms, visibility and lights collected this frame.
    ///
    /// Mesh passes also create resources for drawables that joined the scene
    /// and retire those that left it; failures are logged, never returned.
    fn sync_scene(&mut self, _device: &mut dyn GraphicsDevice, _ctx: &mut SceneContext) {}

    /// Write per-frame GPU data; the slot's fence has been waited on
    fn prepare(&mut self, _device: &mut dyn GraphicsDevice, _frame: &FrameState) -> Result<()> {
        Ok(())
    }

    /// Record viewport, scissor, binds and draws
    fn record(&mut self, cmd: &mut dyn CommandList, frame: &FrameState);

    /// Release the pipeline state object; no-op when already released
    fn cleanup(&mut self, device: &mut dyn GraphicsDevice);

    /// Release per-drawable resources created by `build()`
    fn release(&mut self, _device: &mut dyn GraphicsDevice) {}

    fn stats(&self) -> PassStats;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Load both stages, create the pipeline, then drop the shader modules
///
/// `describe` fills in everything but the shader handles.
pub(crate) fn create_pipeline(
    device: &mut dyn GraphicsDevice,
    library: &dyn ShaderLibrary,
    vertex: &str,
    fragment: &str,
    describe: impl FnOnce(ShaderHandle, ShaderHandle) -> PipelineDesc,
) -> Result<PipelineHandle> {
    let vs = load_shader(library, device, vertex, ShaderStage::Vertex)?;
    let fs = match load_shader(library, device, fragment, ShaderStage::Fragment) {
        Ok(fs) => fs,
        Err(e) => {
            device.destroy_shader(vs);
            return Err(e);
        }
    };

    let pipeline = device.create_pipeline(&describe(vs, fs));
    device.destroy_shader(vs);
    device.destroy_shader(fs);
    pipeline
}

/// Logged when `record()` runs before `initialize()`
pub(crate) fn log_not_initialized(source: &str, pass: &str) {
    engine_error!(source, "Pass '{}' recorded before initialize(), skipping", pass);
}

/// Log a failed record and move on
pub(crate) fn report_record(source: &str, pass: &str, result: Result<()>) {
    if let Err(e) = result {
        engine_error!(source, "Pass '{}' skipped this frame: {}", pass, e);
    }
}

#[cfg(test)]
pub(crate) mod test_helpers;
