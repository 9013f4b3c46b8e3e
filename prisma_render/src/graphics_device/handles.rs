//! Generation-checked resource handles
//!
//! Every GPU object is referred to by a slotmap key. A handle whose slot was
//! freed (for instance across a swapchain recreation) no longer resolves, so
//! backends report `Error::InvalidResource` instead of touching freed memory.

use slotmap::new_key_type;

new_key_type! {
    /// Vertex, index or uniform buffer
    pub struct BufferHandle;
    /// Texture or image view (including swapchain views)
    pub struct TextureHandle;
    /// Compiled shader module
    pub struct ShaderHandle;
    /// Pipeline state object + layout
    pub struct PipelineHandle;
    /// Bound group of buffers and textures
    pub struct DescriptorSetHandle;
    /// Attachment layout a pipeline and framebuffer must agree on
    pub struct RenderTargetFormatHandle;
    /// Attachments bound to a render target format
    pub struct FramebufferHandle;
    /// CPU-waitable GPU completion signal
    pub struct FenceHandle;
    /// GPU-GPU ordering primitive
    pub struct SemaphoreHandle;
}

/// Kind of resource, used for bookkeeping and statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Shader,
    Pipeline,
    DescriptorSet,
    RenderTargetFormat,
    Framebuffer,
    Fence,
    Semaphore,
    Swapchain,
    SwapchainView,
}

impl ResourceKind {
    /// All kinds, in declaration order
    pub const ALL: [ResourceKind; 11] = [
        ResourceKind::Buffer,
        ResourceKind::Texture,
        ResourceKind::Shader,
        ResourceKind::Pipeline,
        ResourceKind::DescriptorSet,
        ResourceKind::RenderTargetFormat,
        ResourceKind::Framebuffer,
        ResourceKind::Fence,
        ResourceKind::Semaphore,
        ResourceKind::Swapchain,
        ResourceKind::SwapchainView,
    ];

    /// Position of this kind in `ALL`
    pub fn index(self) -> usize {
        self as usize
    }
}
