//! GraphicsDevice trait - the backend-facing factory and queue interface

use crate::error::Result;
use crate::graphics_device::{
    AcquireOutcome, BufferDesc, BufferHandle, CommandList, DescriptorSetDesc,
    DescriptorSetHandle, FenceHandle, FramebufferDesc, FramebufferHandle, PipelineDesc,
    PipelineHandle, PresentOutcome, RenderTargetFormatDesc, RenderTargetFormatHandle,
    ResourceKind, SemaphoreHandle, ShaderDesc, ShaderHandle, SubmitSync, SurfaceState,
    SwapchainDesc, SwapchainInfo, TextureDesc, TextureHandle,
};

/// Live resource counts reported by a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    live: [u32; ResourceKind::ALL.len()],
    /// Bytes of GPU memory currently allocated
    pub gpu_memory_used: u64,
}

impl DeviceStats {
    pub fn live(&self, kind: ResourceKind) -> u32 {
        self.live[kind.index()]
    }

    pub fn set_live(&mut self, kind: ResourceKind, count: u32) {
        self.live[kind.index()] = count;
    }
}

/// GPU device, queues, swapchain and synchronization primitives
///
/// Resources are addressed through generation-checked handles. Using a handle
/// after its resource was destroyed returns `Error::InvalidResource`; destroying
/// a stale handle logs an error and does nothing else.
///
/// The device owns at most one swapchain. Swapchain images are exposed as
/// texture handles through `create_swapchain_views()` so they can be attached
/// to framebuffers like any other render target.
pub trait GraphicsDevice: Send {
    // ===== BUFFERS =====

    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle>;

    /// Copy `data` into a CPU-visible buffer at `offset`
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    /// Read `len` bytes back from a buffer
    fn read_buffer(&self, buffer: BufferHandle, offset: u64, len: u64) -> Result<Vec<u8>>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // ===== TEXTURES / SHADERS / PIPELINES =====

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle>;
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderHandle>;
    fn destroy_shader(&mut self, shader: ShaderHandle);

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle>;
    fn destroy_pipeline(&mut self, pipeline: PipelineHandle);

    fn create_descriptor_set(&mut self, desc: &DescriptorSetDesc) -> Result<DescriptorSetHandle>;
    fn destroy_descriptor_set(&mut self, set: DescriptorSetHandle);

    fn create_render_target_format(&mut self, desc: &RenderTargetFormatDesc) -> Result<RenderTargetFormatHandle>;
    fn destroy_render_target_format(&mut self, format: RenderTargetFormatHandle);

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle>;
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    // ===== SWAPCHAIN =====

    /// Current surface extent and transform
    fn surface_state(&self) -> Result<SurfaceState>;

    /// Create the swapchain from the current surface capabilities
    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<SwapchainInfo>;

    /// Destroy the swapchain (views must already be destroyed)
    fn destroy_swapchain(&mut self);

    /// Create one view per swapchain image
    fn create_swapchain_views(&mut self) -> Result<Vec<TextureHandle>>;

    fn destroy_swapchain_views(&mut self);

    /// Acquire the next presentable image, signaling `signal` when it is ready
    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> Result<AcquireOutcome>;

    /// Queue `image_index` for presentation once `wait` is signaled
    fn present(&mut self, image_index: u32, wait: SemaphoreHandle) -> Result<PresentOutcome>;

    // ===== SYNCHRONIZATION =====

    fn create_fence(&mut self, name: &str, signaled: bool) -> Result<FenceHandle>;
    fn destroy_fence(&mut self, fence: FenceHandle);

    /// Block until `fence` is signaled (no timeout)
    fn wait_for_fence(&mut self, fence: FenceHandle) -> Result<()>;

    fn reset_fence(&mut self, fence: FenceHandle) -> Result<()>;

    fn create_semaphore(&mut self, name: &str) -> Result<SemaphoreHandle>;
    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle);

    // ===== COMMANDS =====

    fn create_command_list(&mut self) -> Result<Box<dyn CommandList>>;

    /// Submit a recorded command list
    fn submit(&mut self, commands: &dyn CommandList, sync: &SubmitSync) -> Result<()>;

    /// Block until the GPU is idle
    fn wait_idle(&mut self) -> Result<()>;

    fn stats(&self) -> DeviceStats;
}
