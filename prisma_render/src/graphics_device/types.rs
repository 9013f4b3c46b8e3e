//! Resource descriptors shared by every backend

use bitflags::bitflags;

use crate::graphics_device::{
    BufferHandle, TextureHandle, ShaderHandle, RenderTargetFormatHandle,
};

// ============================================================================
// Extents
// ============================================================================

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-sized surface means the window is minimized or gone
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width / height, 1.0 for a degenerate extent
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

// ============================================================================
// Buffers
// ============================================================================

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// CPU-writable, GPU-readable, rewritten every frame
    Uniform,
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub name: String,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Width of the indices stored in an index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    /// Narrowest format able to address `max_index`
    pub fn for_max_index(max_index: u32) -> Self {
        if max_index <= u16::MAX as u32 {
            IndexFormat::U16
        } else {
            IndexFormat::U32
        }
    }

    pub fn bytes_per_index(self) -> u64 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

// ============================================================================
// Textures
// ============================================================================

/// Texture formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,
    B10G11R11_UFLOAT,
    D32_FLOAT,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::D32_FLOAT)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::R16G16B16A16_SFLOAT => 8,
            _ => 4,
        }
    }
}

bitflags! {
    /// How a texture will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED = 1 << 0;
        const COLOR_ATTACHMENT = 1 << 1;
        const DEPTH_ATTACHMENT = 1 << 2;
        const TRANSFER_DST = 1 << 3;
    }
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Texture2D,
    /// Six square faces, +X -X +Y -Y +Z -Z
    Cube,
}

impl TextureKind {
    pub fn layer_count(self) -> u32 {
        match self {
            TextureKind::Texture2D => 1,
            TextureKind::Cube => 6,
        }
    }
}

/// Texture descriptor
///
/// `data`, when present, holds tightly packed texels for every layer in order.
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub name: String,
    pub extent: Extent2D,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub kind: TextureKind,
    pub data: Option<Vec<u8>>,
}

impl TextureDesc {
    /// Color or depth attachment sized to `extent`
    pub fn attachment(name: impl Into<String>, extent: Extent2D, format: TextureFormat) -> Self {
        let usage = if format.is_depth() {
            TextureUsage::DEPTH_ATTACHMENT | TextureUsage::SAMPLED
        } else {
            TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED
        };
        Self {
            name: name.into(),
            extent,
            format,
            usage,
            kind: TextureKind::Texture2D,
            data: None,
        }
    }

    /// Expected size of `data` in bytes
    pub fn data_size(&self) -> usize {
        (self.extent.width * self.extent.height * self.format.bytes_per_pixel()
            * self.kind.layer_count()) as usize
    }
}

/// Sampler preset used when a texture is bound into a descriptor set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    LinearRepeat,
    LinearClamp,
    NearestClamp,
}

// ============================================================================
// Shaders
// ============================================================================

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

bitflags! {
    /// Set of shader stages that can see a binding or constant slot
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

/// Shader module descriptor (SPIR-V bytes)
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    pub name: String,
    pub stage: ShaderStage,
    pub code: Vec<u8>,
    pub entry_point: String,
}

// ============================================================================
// Pipelines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessOrEqual,
    Always,
}

/// Depth test/write configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: CompareOp,
}

impl DepthState {
    pub const fn disabled() -> Self {
        Self { test: false, write: false, compare: CompareOp::Always }
    }

    pub const fn read_write() -> Self {
        Self { test: true, write: true, compare: CompareOp::Less }
    }

    /// Test against an already populated depth buffer without writing
    pub const fn read_only() -> Self {
        Self { test: true, write: false, compare: CompareOp::LessOrEqual }
    }
}

/// Color blending preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Opaque,
    /// src_alpha, one_minus_src_alpha
    Alpha,
    /// one, one
    Additive,
    /// Color attachments are left untouched; only depth is written
    DepthOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float2,
    Float3,
    Float4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Single interleaved vertex stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// No vertex input (vertices generated from gl_VertexIndex)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Named block of small per-draw constants
///
/// Command lists address constants by name; the Vulkan backend maps each slot
/// onto a push-constant range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantSlot {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub stages: ShaderStages,
}

impl ConstantSlot {
    pub fn new(name: impl Into<String>, offset: u32, size: u32, stages: ShaderStages) -> Self {
        Self { name: name.into(), offset, size, stages }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    UniformBuffer,
    CombinedImageSampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSlot {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub stages: ShaderStages,
}

/// Binding set a pipeline expects at one descriptor-set index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DescriptorLayout {
    pub slots: Vec<DescriptorSlot>,
}

impl DescriptorLayout {
    pub fn new(slots: Vec<DescriptorSlot>) -> Self {
        Self { slots }
    }

    /// True when `bindings` provides exactly one resource of the right kind per slot
    pub fn matches(&self, bindings: &[DescriptorBinding]) -> bool {
        if bindings.len() != self.slots.len() {
            return false;
        }
        self.slots.iter().all(|slot| {
            bindings
                .iter()
                .filter(|b| b.binding == slot.binding)
                .map(|b| b.resource.kind())
                .eq(std::iter::once(slot.kind))
        })
    }
}

/// Pipeline state object descriptor
#[derive(Debug, Clone)]
pub struct PipelineDesc {
    pub name: String,
    pub vertex_shader: ShaderHandle,
    pub fragment_shader: ShaderHandle,
    pub vertex_layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub depth: DepthState,
    pub blend: BlendMode,
    pub render_target_format: RenderTargetFormatHandle,
    /// One layout per descriptor-set index
    pub descriptor_layouts: Vec<DescriptorLayout>,
    pub constants: Vec<ConstantSlot>,
}

// ============================================================================
// Descriptor sets
// ============================================================================

/// Resource bound at one binding slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    UniformBuffer(BufferHandle),
    Texture { texture: TextureHandle, sampler: SamplerKind },
}

impl DescriptorResource {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            DescriptorResource::UniformBuffer(_) => DescriptorKind::UniformBuffer,
            DescriptorResource::Texture { .. } => DescriptorKind::CombinedImageSampler,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub resource: DescriptorResource,
}

/// Descriptor set descriptor
#[derive(Debug, Clone)]
pub struct DescriptorSetDesc {
    pub name: String,
    pub layout: DescriptorLayout,
    pub bindings: Vec<DescriptorBinding>,
}

// ============================================================================
// Render target formats and framebuffers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Clear,
    Load,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// What an attachment is used for once the render pass ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentUsage {
    /// Swapchain image handed to present
    Present,
    /// Sampled by a later pass
    ShaderRead,
    /// Stays an attachment (depth kept for a later pass)
    Attachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    pub format: TextureFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub final_usage: AttachmentUsage,
}

impl AttachmentDesc {
    pub const fn new(format: TextureFormat, load_op: LoadOp, final_usage: AttachmentUsage) -> Self {
        Self { format, load_op, store_op: StoreOp::Store, final_usage }
    }
}

/// Attachment layout shared by pipelines and framebuffers that render together
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTargetFormatDesc {
    pub name: String,
    pub color: Vec<AttachmentDesc>,
    pub depth: Option<AttachmentDesc>,
}

#[derive(Debug, Clone)]
pub struct FramebufferDesc {
    pub name: String,
    pub format: RenderTargetFormatHandle,
    pub color: Vec<TextureHandle>,
    pub depth: Option<TextureHandle>,
    pub extent: Extent2D,
}

// ============================================================================
// Swapchain and synchronization
// ============================================================================

/// Surface pre-rotation reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceTransform {
    #[default]
    Identity,
    Rotate90,
    Rotate180,
    Rotate270,
}

/// Current surface capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceState {
    pub extent: Extent2D,
    pub transform: SurfaceTransform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    /// Used when the surface does not dictate its own extent
    pub preferred_extent: Extent2D,
    pub vsync: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub extent: Extent2D,
    pub format: TextureFormat,
    pub image_count: u32,
    pub transform: SurfaceTransform,
}

/// Result of acquiring the next swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image(u32),
    /// Image acquired but the swapchain no longer matches the surface
    Suboptimal(u32),
    OutOfDate,
}

/// Result of presenting a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// Synchronization attached to a queue submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmitSync {
    pub wait: Option<crate::graphics_device::SemaphoreHandle>,
    pub signal: Option<crate::graphics_device::SemaphoreHandle>,
    pub fence: Option<crate::graphics_device::FenceHandle>,
}
