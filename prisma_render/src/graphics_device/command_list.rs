//! CommandList trait - for recording rendering commands

use std::any::Any;

use crate::error::Result;
use crate::graphics_device::{
    BufferHandle, DescriptorSetHandle, Extent2D, FramebufferHandle, IndexFormat,
    PipelineHandle, RenderTargetFormatHandle,
};

/// Command list for recording rendering commands
///
/// Commands are recorded on the render thread and later handed to
/// `GraphicsDevice::submit()`.
pub trait CommandList: Send {
    /// Begin recording commands
    fn begin(&mut self) -> Result<()>;

    /// End recording commands
    fn end(&mut self) -> Result<()>;

    /// Begin a render pass on `framebuffer`
    ///
    /// # Arguments
    ///
    /// * `format` - Attachment layout the framebuffer was created against
    /// * `framebuffer` - Target attachments
    /// * `area` - Render area
    /// * `clear_values` - One per attachment, color attachments first
    fn begin_render_pass(
        &mut self,
        format: RenderTargetFormatHandle,
        framebuffer: FramebufferHandle,
        area: Rect2D,
        clear_values: &[ClearValue],
    ) -> Result<()>;

    /// End the current render pass
    fn end_render_pass(&mut self) -> Result<()>;

    /// Set the viewport
    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    /// Set the scissor rectangle
    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()>;

    /// Bind a graphics pipeline
    fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> Result<()>;

    /// Bind a descriptor set at `set_index` of the bound pipeline's layout
    fn bind_descriptor_set(&mut self, set_index: u32, set: DescriptorSetHandle) -> Result<()>;

    /// Bind a vertex buffer
    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, offset: u64) -> Result<()>;

    /// Bind an index buffer
    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) -> Result<()>;

    /// Write a named constant slot of the bound pipeline
    ///
    /// # Arguments
    ///
    /// * `name` - Slot name declared in `PipelineDesc::constants` (e.g. "ViewProjection")
    /// * `data` - Raw bytes, at most the slot size
    fn set_constant_buffer(&mut self, name: &str, data: &[u8]) -> Result<()>;

    /// Draw vertices
    ///
    /// # Arguments
    ///
    /// * `vertex_count` - Number of vertices to draw
    /// * `first_vertex` - Index of first vertex
    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()>;

    /// Draw indexed vertices
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()>;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-extent viewport with a 0..1 depth range
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 2D rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn from_extent(extent: Extent2D) -> Self {
        Self { x: 0, y: 0, width: extent.width, height: extent.height }
    }
}

/// Clear value for an attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}
