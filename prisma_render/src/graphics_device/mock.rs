//! Mock graphics device for tests (no GPU required)
//!
//! `MockGraphicsDevice` keeps real slotmap tables so stale handles behave the
//! way they do on a GPU backend, and records every call as a `DeviceEvent`.
//! A cloneable `MockInspector` shares the same state so tests can inspect the log
//! and inject failures after the device was moved into a `Renderer`.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashSet;
use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::graphics_device::{
    AcquireOutcome, BlendMode, BufferDesc, BufferHandle, ClearValue, CommandList, ConstantSlot,
    DepthState, DescriptorSetDesc, DescriptorSetHandle, DeviceStats, Extent2D, FenceHandle,
    FramebufferDesc, FramebufferHandle, GraphicsDevice, IndexFormat, PipelineDesc,
    PipelineHandle, PresentOutcome, Rect2D, RenderTargetFormatDesc, RenderTargetFormatHandle,
    ResourceKind, SemaphoreHandle, ShaderDesc, ShaderHandle, SubmitSync, SurfaceState,
    SurfaceTransform, SwapchainDesc, SwapchainInfo, TextureDesc, TextureFormat, TextureHandle,
    Viewport,
};
use crate::engine_error;

const SOURCE: &str = "prisma::MockDevice";

// ============================================================================
// Recorded data
// ============================================================================

/// A command captured by `MockCommandList`
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Begin,
    End,
    BeginRenderPass { format: RenderTargetFormatHandle, framebuffer: FramebufferHandle, clear_values: Vec<ClearValue> },
    EndRenderPass,
    SetViewport(Viewport),
    SetScissor(Rect2D),
    BindPipeline(PipelineHandle),
    BindDescriptorSet { set_index: u32, set: DescriptorSetHandle },
    BindVertexBuffer(BufferHandle),
    BindIndexBuffer { buffer: BufferHandle, format: IndexFormat },
    SetConstantBuffer { name: String, data: Vec<u8> },
    Draw { vertex_count: u32, first_vertex: u32 },
    DrawIndexed { index_count: u32, first_index: u32, vertex_offset: i32 },
}

/// A device call captured by `MockGraphicsDevice`
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Create { kind: ResourceKind, name: String },
    Destroy { kind: ResourceKind, name: String },
    WriteBuffer { name: String, offset: u64, len: usize },
    WaitFence { name: String },
    ResetFence { name: String },
    Submit { fence: Option<String>, commands: usize },
    Acquire(AcquireOutcome),
    Present { image_index: u32, outcome: PresentOutcome },
    WaitIdle,
}

// ============================================================================
// Shared state
// ============================================================================

struct MockBuffer {
    name: String,
    data: Vec<u8>,
}

struct MockTexture {
    name: String,
    swapchain_view: bool,
}

struct MockPipeline {
    name: String,
    constants: Vec<ConstantSlot>,
    depth: DepthState,
    blend: BlendMode,
}

struct MockFence {
    name: String,
    signaled: bool,
    in_flight: bool,
}

struct MockState {
    buffers: SlotMap<BufferHandle, MockBuffer>,
    textures: SlotMap<TextureHandle, MockTexture>,
    shaders: SlotMap<ShaderHandle, String>,
    pipelines: SlotMap<PipelineHandle, MockPipeline>,
    descriptor_sets: SlotMap<DescriptorSetHandle, String>,
    formats: SlotMap<RenderTargetFormatHandle, String>,
    framebuffers: SlotMap<FramebufferHandle, String>,
    fences: SlotMap<FenceHandle, MockFence>,
    semaphores: SlotMap<SemaphoreHandle, String>,

    surface: SurfaceState,
    swapchain: Option<SwapchainInfo>,
    swapchain_views: Vec<TextureHandle>,
    next_image: u32,

    events: Vec<DeviceEvent>,
    created: [u32; ResourceKind::ALL.len()],
    destroyed: [u32; ResourceKind::ALL.len()],
    invalid_destroys: u32,

    failing_shaders: FxHashSet<String>,
    /// Remaining creations per kind that fail before creates succeed again
    failing_creates: [u32; ResourceKind::ALL.len()],
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    submissions: Vec<Vec<RecordedCommand>>,
}

impl MockState {
    fn new(extent: Extent2D) -> Self {
        Self {
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            descriptor_sets: SlotMap::with_key(),
            formats: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            fences: SlotMap::with_key(),
            semaphores: SlotMap::with_key(),
            surface: SurfaceState { extent, transform: SurfaceTransform::Identity },
            swapchain: None,
            swapchain_views: Vec::new(),
            next_image: 0,
            events: Vec::new(),
            created: [0; ResourceKind::ALL.len()],
            destroyed: [0; ResourceKind::ALL.len()],
            invalid_destroys: 0,
            failing_shaders: FxHashSet::default(),
            failing_creates: [0; ResourceKind::ALL.len()],
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            submissions: Vec::new(),
        }
    }

    fn injected_failure(&mut self, kind: ResourceKind, name: &str) -> Result<()> {
        let remaining = &mut self.failing_creates[kind.index()];
        if *remaining == 0 {
            return Ok(());
        }
        *remaining -= 1;
        Err(Error::BackendError(format!("injected failure creating {:?} '{}'", kind, name)))
    }

    fn on_create(&mut self, kind: ResourceKind, name: &str) {
        self.created[kind.index()] += 1;
        self.events.push(DeviceEvent::Create { kind, name: name.to_string() });
    }

    fn on_destroy(&mut self, kind: ResourceKind, name: Option<String>) {
        match name {
            Some(name) => {
                self.destroyed[kind.index()] += 1;
                self.events.push(DeviceEvent::Destroy { kind, name });
            }
            None => {
                self.invalid_destroys += 1;
                engine_error!(SOURCE, "destroy of stale {:?} handle ignored", kind);
            }
        }
    }

    fn live(&self, kind: ResourceKind) -> u32 {
        self.created[kind.index()] - self.destroyed[kind.index()]
    }
}

fn lock(state: &Arc<Mutex<MockState>>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn stale(kind: &str) -> Error {
    Error::InvalidResource(format!("stale or unknown {} handle", kind))
}

// ============================================================================
// Mock device
// ============================================================================

/// GPU-free `GraphicsDevice`
pub struct MockGraphicsDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockGraphicsDevice {
    /// Mock device with an 800x600 surface
    pub fn new() -> Self {
        Self::with_extent(Extent2D::new(800, 600))
    }

    pub fn with_extent(extent: Extent2D) -> Self {
        Self { state: Arc::new(Mutex::new(MockState::new(extent))) }
    }

    /// Inspection and fault-injection handle sharing this device's state
    pub fn inspector(&self) -> MockInspector {
        MockInspector { state: Arc::clone(&self.state) }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }
}

impl Default for MockGraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle> {
        if desc.size == 0 {
            return Err(Error::InvalidResource(format!("buffer '{}' has zero size", desc.name)));
        }
        let mut state = self.state();
        state.injected_failure(ResourceKind::Buffer, &desc.name)?;
        state.on_create(ResourceKind::Buffer, &desc.name);
        Ok(state.buffers.insert(MockBuffer {
            name: desc.name.clone(),
            data: vec![0; desc.size as usize],
        }))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        let entry = state.buffers.get_mut(buffer).ok_or_else(|| stale("buffer"))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > entry.data.len() {
            return Err(Error::InvalidResource(format!(
                "write of {} bytes at {} overflows buffer '{}' ({} bytes)",
                data.len(), offset, entry.name, entry.data.len()
            )));
        }
        entry.data[start..end].copy_from_slice(data);
        let name = entry.name.clone();
        state.events.push(DeviceEvent::WriteBuffer { name, offset, len: data.len() });
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, len: u64) -> Result<Vec<u8>> {
        let state = self.state();
        let entry = state.buffers.get(buffer).ok_or_else(|| stale("buffer"))?;
        let start = offset as usize;
        let end = start + len as usize;
        entry
            .data
            .get(start..end)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| Error::InvalidResource(format!("read past the end of buffer '{}'", entry.name)))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        let mut state = self.state();
        let name = state.buffers.remove(buffer).map(|b| b.name);
        state.on_destroy(ResourceKind::Buffer, name);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        if desc.extent.is_zero() {
            return Err(Error::InvalidResource(format!("texture '{}' has zero extent", desc.name)));
        }
        if let Some(data) = &desc.data {
            if data.len() != desc.data_size() {
                return Err(Error::InvalidResource(format!(
                    "texture '{}' expects {} bytes, got {}",
                    desc.name, desc.data_size(), data.len()
                )));
            }
        }
        let mut state = self.state();
        state.on_create(ResourceKind::Texture, &desc.name);
        Ok(state.textures.insert(MockTexture { name: desc.name.clone(), swapchain_view: false }))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        let mut state = self.state();
        let is_view = state.textures.get(texture).map(|t| t.swapchain_view).unwrap_or(false);
        if is_view {
            engine_error!(SOURCE, "swapchain views are destroyed with destroy_swapchain_views");
            return;
        }
        let name = state.textures.remove(texture).map(|t| t.name);
        state.on_destroy(ResourceKind::Texture, name);
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderHandle> {
        let mut state = self.state();
        if state.failing_shaders.contains(&desc.name) || desc.code.is_empty() {
            return Err(Error::InitializationFailed(format!("shader module '{}' rejected", desc.name)));
        }
        state.on_create(ResourceKind::Shader, &desc.name);
        Ok(state.shaders.insert(desc.name.clone()))
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        let mut state = self.state();
        let name = state.shaders.remove(shader);
        state.on_destroy(ResourceKind::Shader, name);
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle> {
        let mut state = self.state();
        if !state.shaders.contains_key(desc.vertex_shader) || !state.shaders.contains_key(desc.fragment_shader) {
            return Err(stale("shader"));
        }
        if !state.formats.contains_key(desc.render_target_format) {
            return Err(stale("render target format"));
        }
        state.on_create(ResourceKind::Pipeline, &desc.name);
        Ok(state.pipelines.insert(MockPipeline {
            name: desc.name.clone(),
            constants: desc.constants.clone(),
            depth: desc.depth,
            blend: desc.blend,
        }))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        let mut state = self.state();
        let name = state.pipelines.remove(pipeline).map(|p| p.name);
        state.on_destroy(ResourceKind::Pipeline, name);
    }

    fn create_descriptor_set(&mut self, desc: &DescriptorSetDesc) -> Result<DescriptorSetHandle> {
        if !desc.layout.matches(&desc.bindings) {
            return Err(Error::InvalidResource(format!(
                "descriptor set '{}' does not match its layout", desc.name
            )));
        }
        let mut state = self.state();
        for binding in &desc.bindings {
            let live = match binding.resource {
                crate::graphics_device::DescriptorResource::UniformBuffer(buffer) => state.buffers.contains_key(buffer),
                crate::graphics_device::DescriptorResource::Texture { texture, .. } => state.textures.contains_key(texture),
            };
            if !live {
                return Err(stale("descriptor resource"));
            }
        }
        state.on_create(ResourceKind::DescriptorSet, &desc.name);
        Ok(state.descriptor_sets.insert(desc.name.clone()))
    }

    fn destroy_descriptor_set(&mut self, set: DescriptorSetHandle) {
        let mut state = self.state();
        let name = state.descriptor_sets.remove(set);
        state.on_destroy(ResourceKind::DescriptorSet, name);
    }

    fn create_render_target_format(&mut self, desc: &RenderTargetFormatDesc) -> Result<RenderTargetFormatHandle> {
        if desc.color.is_empty() && desc.depth.is_none() {
            return Err(Error::InvalidResource(format!("render target format '{}' has no attachments", desc.name)));
        }
        let mut state = self.state();
        state.on_create(ResourceKind::RenderTargetFormat, &desc.name);
        Ok(state.formats.insert(desc.name.clone()))
    }

    fn destroy_render_target_format(&mut self, format: RenderTargetFormatHandle) {
        let mut state = self.state();
        let name = state.formats.remove(format);
        state.on_destroy(ResourceKind::RenderTargetFormat, name);
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle> {
        let mut state = self.state();
        if !state.formats.contains_key(desc.format) {
            return Err(stale("render target format"));
        }
        let attachments_live = desc
            .color
            .iter()
            .chain(desc.depth.iter())
            .all(|t| state.textures.contains_key(*t));
        if !attachments_live {
            return Err(stale("framebuffer attachment"));
        }
        state.injected_failure(ResourceKind::Framebuffer, &desc.name)?;
        state.on_create(ResourceKind::Framebuffer, &desc.name);
        Ok(state.framebuffers.insert(desc.name.clone()))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        let mut state = self.state();
        let name = state.framebuffers.remove(framebuffer);
        state.on_destroy(ResourceKind::Framebuffer, name);
    }

    fn surface_state(&self) -> Result<SurfaceState> {
        Ok(self.state().surface)
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<SwapchainInfo> {
        let mut state = self.state();
        if state.swapchain.is_some() {
            return Err(Error::InvalidState("swapchain already exists".to_string()));
        }
        let extent = if state.surface.extent.is_zero() { desc.preferred_extent } else { state.surface.extent };
        if extent.is_zero() {
            return Err(Error::InitializationFailed("surface has zero extent".to_string()));
        }
        let info = SwapchainInfo {
            extent,
            format: TextureFormat::B8G8R8A8_SRGB,
            image_count: 3,
            transform: state.surface.transform,
        };
        state.on_create(ResourceKind::Swapchain, "swapchain");
        state.swapchain = Some(info);
        state.next_image = 0;
        Ok(info)
    }

    fn destroy_swapchain(&mut self) {
        let mut state = self.state();
        let name = state.swapchain.take().map(|_| "swapchain".to_string());
        state.on_destroy(ResourceKind::Swapchain, name);
    }

    fn create_swapchain_views(&mut self) -> Result<Vec<TextureHandle>> {
        let mut state = self.state();
        let info = state.swapchain.ok_or_else(|| Error::InvalidState("no swapchain".to_string()))?;
        if !state.swapchain_views.is_empty() {
            return Err(Error::InvalidState("swapchain views already exist".to_string()));
        }
        let mut views = Vec::with_capacity(info.image_count as usize);
        for i in 0..info.image_count {
            let name = format!("swapchain_view_{}", i);
            state.on_create(ResourceKind::SwapchainView, &name);
            views.push(state.textures.insert(MockTexture { name, swapchain_view: true }));
        }
        state.swapchain_views = views.clone();
        Ok(views)
    }

    fn destroy_swapchain_views(&mut self) {
        let mut state = self.state();
        let views = std::mem::take(&mut state.swapchain_views);
        for view in views {
            let name = state.textures.remove(view).map(|t| t.name);
            state.on_destroy(ResourceKind::SwapchainView, name);
        }
    }

    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> Result<AcquireOutcome> {
        let mut state = self.state();
        let info = state.swapchain.ok_or_else(|| Error::InvalidState("acquire without swapchain".to_string()))?;
        if !state.semaphores.contains_key(signal) {
            return Err(stale("semaphore"));
        }
        let outcome = match state.acquire_script.pop_front() {
            Some(AcquireOutcome::OutOfDate) => AcquireOutcome::OutOfDate,
            Some(AcquireOutcome::Suboptimal(_)) => AcquireOutcome::Suboptimal(state.next_image),
            Some(AcquireOutcome::Image(_)) | None => AcquireOutcome::Image(state.next_image),
        };
        if outcome != AcquireOutcome::OutOfDate {
            state.next_image = (state.next_image + 1) % info.image_count;
        }
        state.events.push(DeviceEvent::Acquire(outcome));
        Ok(outcome)
    }

    fn present(&mut self, image_index: u32, wait: SemaphoreHandle) -> Result<PresentOutcome> {
        let mut state = self.state();
        let info = state.swapchain.ok_or_else(|| Error::InvalidState("present without swapchain".to_string()))?;
        if image_index >= info.image_count {
            return Err(Error::InvalidResource(format!("image index {} out of range", image_index)));
        }
        if !state.semaphores.contains_key(wait) {
            return Err(stale("semaphore"));
        }
        let outcome = state.present_script.pop_front().unwrap_or(PresentOutcome::Presented);
        state.events.push(DeviceEvent::Present { image_index, outcome });
        Ok(outcome)
    }

    fn create_fence(&mut self, name: &str, signaled: bool) -> Result<FenceHandle> {
        let mut state = self.state();
        state.injected_failure(ResourceKind::Fence, name)?;
        state.on_create(ResourceKind::Fence, name);
        Ok(state.fences.insert(MockFence { name: name.to_string(), signaled, in_flight: false }))
    }

    fn destroy_fence(&mut self, fence: FenceHandle) {
        let mut state = self.state();
        let name = state.fences.remove(fence).map(|f| f.name);
        state.on_destroy(ResourceKind::Fence, name);
    }

    fn wait_for_fence(&mut self, fence: FenceHandle) -> Result<()> {
        let mut state = self.state();
        let entry = state.fences.get_mut(fence).ok_or_else(|| stale("fence"))?;
        if entry.in_flight {
            // Simulated GPU completion
            entry.in_flight = false;
            entry.signaled = true;
        }
        if !entry.signaled {
            return Err(Error::InvalidState(format!(
                "wait on fence '{}' that was reset and never submitted", entry.name
            )));
        }
        let name = entry.name.clone();
        state.events.push(DeviceEvent::WaitFence { name });
        Ok(())
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> Result<()> {
        let mut state = self.state();
        let entry = state.fences.get_mut(fence).ok_or_else(|| stale("fence"))?;
        if entry.in_flight {
            return Err(Error::InvalidState(format!("reset of in-flight fence '{}'", entry.name)));
        }
        entry.signaled = false;
        let name = entry.name.clone();
        state.events.push(DeviceEvent::ResetFence { name });
        Ok(())
    }

    fn create_semaphore(&mut self, name: &str) -> Result<SemaphoreHandle> {
        let mut state = self.state();
        state.on_create(ResourceKind::Semaphore, name);
        Ok(state.semaphores.insert(name.to_string()))
    }

    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) {
        let mut state = self.state();
        let name = state.semaphores.remove(semaphore);
        state.on_destroy(ResourceKind::Semaphore, name);
    }

    fn create_command_list(&mut self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(MockCommandList::attached(Arc::clone(&self.state))))
    }

    fn submit(&mut self, commands: &dyn CommandList, sync: &SubmitSync) -> Result<()> {
        let recorded = commands
            .as_any()
            .downcast_ref::<MockCommandList>()
            .map(|c| c.commands.clone())
            .ok_or_else(|| Error::BackendError("foreign command list submitted to mock device".to_string()))?;

        let mut state = self.state();
        for semaphore in sync.wait.iter().chain(sync.signal.iter()) {
            if !state.semaphores.contains_key(*semaphore) {
                return Err(stale("semaphore"));
            }
        }
        let fence_name = match sync.fence {
            Some(fence) => {
                let entry = state.fences.get_mut(fence).ok_or_else(|| stale("fence"))?;
                if entry.signaled || entry.in_flight {
                    return Err(Error::InvalidState(format!(
                        "submit with fence '{}' that was not reset", entry.name
                    )));
                }
                entry.in_flight = true;
                Some(entry.name.clone())
            }
            None => None,
        };
        state.events.push(DeviceEvent::Submit { fence: fence_name, commands: recorded.len() });
        state.submissions.push(recorded);
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        let mut state = self.state();
        for (_, fence) in state.fences.iter_mut() {
            if fence.in_flight {
                fence.in_flight = false;
                fence.signaled = true;
            }
        }
        state.events.push(DeviceEvent::WaitIdle);
        Ok(())
    }

    fn stats(&self) -> DeviceStats {
        let state = self.state();
        let mut stats = DeviceStats::default();
        for kind in ResourceKind::ALL {
            stats.set_live(kind, state.live(kind));
        }
        stats.gpu_memory_used = state.buffers.values().map(|b| b.data.len() as u64).sum();
        stats
    }
}

// ============================================================================
// Inspector
// ============================================================================

/// Shared view into a `MockGraphicsDevice`
#[derive(Clone)]
pub struct MockInspector {
    state: Arc<Mutex<MockState>>,
}

impl MockInspector {
    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    pub fn created(&self, kind: ResourceKind) -> u32 {
        self.state().created[kind.index()]
    }

    pub fn destroyed(&self, kind: ResourceKind) -> u32 {
        self.state().destroyed[kind.index()]
    }

    pub fn live(&self, kind: ResourceKind) -> u32 {
        self.state().live(kind)
    }

    /// Destroy calls that targeted an already freed handle
    pub fn invalid_destroys(&self) -> u32 {
        self.state().invalid_destroys
    }

    /// Names of live resources of `kind`
    pub fn live_names(&self, kind: ResourceKind) -> Vec<String> {
        let state = self.state();
        match kind {
            ResourceKind::Buffer => state.buffers.values().map(|b| b.name.clone()).collect(),
            ResourceKind::Texture => state.textures.values().filter(|t| !t.swapchain_view).map(|t| t.name.clone()).collect(),
            ResourceKind::SwapchainView => state.textures.values().filter(|t| t.swapchain_view).map(|t| t.name.clone()).collect(),
            ResourceKind::Shader => state.shaders.values().cloned().collect(),
            ResourceKind::Pipeline => state.pipelines.values().map(|p| p.name.clone()).collect(),
            ResourceKind::DescriptorSet => state.descriptor_sets.values().cloned().collect(),
            ResourceKind::RenderTargetFormat => state.formats.values().cloned().collect(),
            ResourceKind::Framebuffer => state.framebuffers.values().cloned().collect(),
            ResourceKind::Fence => state.fences.values().map(|f| f.name.clone()).collect(),
            ResourceKind::Semaphore => state.semaphores.values().cloned().collect(),
            ResourceKind::Swapchain => state.swapchain.iter().map(|_| "swapchain".to_string()).collect(),
        }
    }

    /// Make every future `create_shader` with this name fail
    pub fn fail_shader(&self, name: &str) {
        self.state().failing_shaders.insert(name.to_string());
    }

    /// Make the next `count` creations of `kind` fail.
    /// Honored for buffers, framebuffers and fences.
    pub fn fail_creates(&self, kind: ResourceKind, count: u32) {
        self.state().failing_creates[kind.index()] = count;
    }

    pub fn queue_acquire(&self, outcome: AcquireOutcome) {
        self.state().acquire_script.push_back(outcome);
    }

    pub fn queue_present(&self, outcome: PresentOutcome) {
        self.state().present_script.push_back(outcome);
    }

    pub fn set_surface_extent(&self, extent: Extent2D) {
        self.state().surface.extent = extent;
    }

    pub fn set_surface_transform(&self, transform: SurfaceTransform) {
        self.state().surface.transform = transform;
    }

    /// Commands of every submitted command list, in submission order
    pub fn submissions(&self) -> Vec<Vec<RecordedCommand>> {
        self.state().submissions.clone()
    }

    /// Depth and blend state of the live pipeline called `name`
    pub fn pipeline_state(&self, name: &str) -> Option<(DepthState, BlendMode)> {
        let state = self.state();
        state.pipelines.values().find(|p| p.name == name).map(|p| (p.depth, p.blend))
    }

    pub fn buffer_contents(&self, name: &str) -> Option<Vec<u8>> {
        self.state().buffers.values().find(|b| b.name == name).map(|b| b.data.clone())
    }
}

// ============================================================================
// Mock command list
// ============================================================================

/// Command list that records calls instead of encoding GPU commands
///
/// Created by `MockGraphicsDevice::create_command_list()` it validates
/// pipeline handles and constant slot names against the device state;
/// created standalone with `new()` it only records.
pub struct MockCommandList {
    pub commands: Vec<RecordedCommand>,
    device: Option<Arc<Mutex<MockState>>>,
    bound_pipeline: Option<PipelineHandle>,
}

impl MockCommandList {
    pub fn new() -> Self {
        Self { commands: Vec::new(), device: None, bound_pipeline: None }
    }

    fn attached(state: Arc<Mutex<MockState>>) -> Self {
        Self { commands: Vec::new(), device: Some(state), bound_pipeline: None }
    }

    /// Number of recorded commands matching `predicate`
    pub fn count(&self, predicate: impl Fn(&RecordedCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    /// Names passed to `set_constant_buffer`, in order
    pub fn constant_names(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::SetConstantBuffer { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockCommandList {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandList for MockCommandList {
    fn begin(&mut self) -> Result<()> {
        self.commands.clear();
        self.bound_pipeline = None;
        self.commands.push(RecordedCommand::Begin);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.commands.push(RecordedCommand::End);
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        format: RenderTargetFormatHandle,
        framebuffer: FramebufferHandle,
        _area: Rect2D,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        if let Some(device) = &self.device {
            let state = lock(device);
            if !state.formats.contains_key(format) || !state.framebuffers.contains_key(framebuffer) {
                return Err(stale("framebuffer"));
            }
        }
        self.commands.push(RecordedCommand::BeginRenderPass {
            format,
            framebuffer,
            clear_values: clear_values.to_vec(),
        });
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.commands.push(RecordedCommand::EndRenderPass);
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.commands.push(RecordedCommand::SetViewport(viewport));
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.commands.push(RecordedCommand::SetScissor(scissor));
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> Result<()> {
        if let Some(device) = &self.device {
            if !lock(device).pipelines.contains_key(pipeline) {
                return Err(stale("pipeline"));
            }
        }
        self.bound_pipeline = Some(pipeline);
        self.commands.push(RecordedCommand::BindPipeline(pipeline));
        Ok(())
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: DescriptorSetHandle) -> Result<()> {
        if let Some(device) = &self.device {
            if !lock(device).descriptor_sets.contains_key(set) {
                return Err(stale("descriptor set"));
            }
        }
        self.commands.push(RecordedCommand::BindDescriptorSet { set_index, set });
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, _offset: u64) -> Result<()> {
        self.commands.push(RecordedCommand::BindVertexBuffer(buffer));
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, format: IndexFormat) -> Result<()> {
        self.commands.push(RecordedCommand::BindIndexBuffer { buffer, format });
        Ok(())
    }

    fn set_constant_buffer(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if let (Some(device), Some(pipeline)) = (&self.device, self.bound_pipeline) {
            let state = lock(device);
            let slot = state
                .pipelines
                .get(pipeline)
                .and_then(|p| p.constants.iter().find(|s| s.name == name).cloned())
                .ok_or_else(|| Error::InvalidResource(format!("no constant slot '{}' on bound pipeline", name)))?;
            if data.len() as u32 > slot.size {
                return Err(Error::InvalidResource(format!(
                    "{} bytes do not fit constant slot '{}' ({} bytes)", data.len(), name, slot.size
                )));
            }
        }
        self.commands.push(RecordedCommand::SetConstantBuffer { name: name.to_string(), data: data.to_vec() });
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.commands.push(RecordedCommand::Draw { vertex_count, first_vertex });
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        self.commands.push(RecordedCommand::DrawIndexed { index_count, first_index, vertex_offset });
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
