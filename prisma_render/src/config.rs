//! Renderer configuration

use crate::pass::CompositionSettings;

/// Default number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Which pass chain `Renderer` builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineKind {
    /// Background, Opaque, Transparent straight into the backbuffer
    #[default]
    Forward,
    /// Geometry into the G-Buffer, Lighting, Transparent, Composition
    Deferred,
}

/// Renderer configuration
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Frames in flight, clamped to 1..=3 by `frames_in_flight()`
    pub frames_in_flight: usize,
    pub pipeline: PipelineKind,
    /// Order passes by priority instead of insertion order
    pub auto_sort_passes: bool,
    /// Used when the scene has no camera
    pub clear_color: [f32; 4],
    pub composition: CompositionSettings,
    /// Lay down depth in a `DepthPrePass` before the opaque or geometry pass.
    /// When false the deferred geometry pass sorts objects far-to-near.
    pub depth_prepass: bool,
    pub frustum_culling: bool,
    pub vsync: bool,
}

impl RendererConfig {
    /// Effective frames-in-flight count
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.clamp(1, 3)
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Prisma Application".to_string(),
            app_version: (1, 0, 0),
            enable_validation: cfg!(debug_assertions),
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            pipeline: PipelineKind::Forward,
            auto_sort_passes: false,
            clear_color: [0.1, 0.1, 0.15, 1.0],
            composition: CompositionSettings::default(),
            depth_prepass: false,
            frustum_culling: true,
            vsync: true,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
