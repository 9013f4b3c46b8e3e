/*!
# Prisma Render

Platform-agnostic core of the Prisma real-time renderer.

The crate models a frame as an ordered pipeline of render passes executed
against an abstract graphics device. Backends (see `prisma_render_vulkan`)
implement `GraphicsDevice` and `CommandList`; everything above that seam is
backend independent and testable with the recording mock device.

## Architecture

- **GraphicsDevice / CommandList**: resource factory, queue, swapchain and command recording
- **Pass**: one unit of GPU work (Background, Opaque, Geometry, Transparent, Lighting, Composition)
- **RenderPipeline**: ordered collection of passes with an explicit lifecycle
- **RenderObjectData**: per-drawable vertex/index/uniform buffers and descriptor sets
- **GBuffer**: deferred shading render targets, created and resized as a unit
- **Renderer**: frame loop, frame-in-flight synchronization and swapchain-loss recovery
- **Scene / Camera / ResourceManager**: explicitly constructed collaborators
*/

// Internal modules
mod error;
pub mod log;
pub mod config;
pub mod graphics_device;
pub mod camera;
pub mod scene;
pub mod resource;
pub mod render_object;
pub mod gbuffer;
pub mod lit_target;
pub mod pass;
pub mod pipeline;
pub mod frame;
pub mod renderer;

#[cfg(test)]
mod test_support;

// Main prisma namespace module
pub mod prisma {
    // Error types
    pub use crate::error::{Error, Result};

    // Frame loop
    pub use crate::renderer::{Renderer, FrameStats};
    pub use crate::config::{RendererConfig, PipelineKind};

    // Logging sub-module (types only, macros are exported at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Device abstraction
    pub mod device {
        pub use crate::graphics_device::*;
    }

    // Passes and pipeline
    pub mod render {
        pub use crate::pass::*;
        pub use crate::pipeline::*;
        pub use crate::gbuffer::*;
        pub use crate::lit_target::*;
        pub use crate::render_object::*;
        pub use crate::frame::*;
    }

    pub mod camera {
        pub use crate::camera::*;
    }

    pub mod scene {
        pub use crate::scene::*;
    }

    pub mod resource {
        pub use crate::resource::*;
    }
}

// Re-export math library at crate root
pub use glam;
