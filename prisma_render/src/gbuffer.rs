/// G-Buffer - render targets of the deferred geometry pass
///
/// Four color slots plus a depth buffer, all at the same extent, with the
/// render target format and framebuffer that bind them. The format does not
/// depend on the extent and lives as long as the G-Buffer; textures and
/// framebuffer are replaced as a unit on resize.

use crate::error::{Error, Result};
use crate::graphics_device::{
    AttachmentDesc, AttachmentUsage, ClearValue, Extent2D, FramebufferDesc, FramebufferHandle,
    GraphicsDevice, LoadOp, RenderTargetFormatDesc, RenderTargetFormatHandle, TextureDesc,
    TextureFormat, TextureHandle,
};
use crate::engine_debug;

const SOURCE: &str = "prisma::GBuffer";

pub const GBUFFER_DEPTH_FORMAT: TextureFormat = TextureFormat::D32_FLOAT;

/// Semantic color slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GBufferSlot {
    /// World-space position, w = 1 where geometry was written
    Position,
    Normal,
    Albedo,
    Emissive,
}

impl GBufferSlot {
    pub const ALL: [GBufferSlot; 4] = [
        GBufferSlot::Position,
        GBufferSlot::Normal,
        GBufferSlot::Albedo,
        GBufferSlot::Emissive,
    ];

    pub fn format(self) -> TextureFormat {
        match self {
            GBufferSlot::Position | GBufferSlot::Normal => TextureFormat::R16G16B16A16_SFLOAT,
            GBufferSlot::Albedo => TextureFormat::R8G8B8A8_UNORM,
            GBufferSlot::Emissive => TextureFormat::B10G11R11_UFLOAT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GBufferSlot::Position => "gbuffer_position",
            GBufferSlot::Normal => "gbuffer_normal",
            GBufferSlot::Albedo => "gbuffer_albedo",
            GBufferSlot::Emissive => "gbuffer_emissive",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Extent-dependent part, swapped atomically on resize
struct Targets {
    color: [TextureHandle; 4],
    depth: TextureHandle,
    framebuffer: FramebufferHandle,
}

impl Targets {
    fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.destroy_framebuffer(self.framebuffer);
        for texture in self.color {
            device.destroy_texture(texture);
        }
        device.destroy_texture(self.depth);
    }
}

pub struct GBuffer {
    extent: Extent2D,
    format: RenderTargetFormatHandle,
    targets: Targets,
}

impl GBuffer {
    /// Attachment layout of the geometry pass
    pub fn format_desc() -> RenderTargetFormatDesc {
        RenderTargetFormatDesc {
            name: "gbuffer".to_string(),
            color: GBufferSlot::ALL
                .iter()
                .map(|slot| AttachmentDesc::new(slot.format(), LoadOp::Clear, AttachmentUsage::ShaderRead))
                .collect(),
            // Depth stays an attachment: the transparent pass tests against it later
            depth: Some(AttachmentDesc::new(GBUFFER_DEPTH_FORMAT, LoadOp::Clear, AttachmentUsage::Attachment)),
        }
    }

    pub fn create(device: &mut dyn GraphicsDevice, extent: Extent2D) -> Result<Self> {
        if extent.is_zero() {
            return Err(Error::InvalidState("G-Buffer extent must not be zero".to_string()));
        }
        let format = device.create_render_target_format(&Self::format_desc())?;
        match create_targets(device, format, extent) {
            Ok(targets) => {
                engine_debug!(SOURCE, "Created G-Buffer {}x{}", extent.width, extent.height);
                Ok(Self { extent, format, targets })
            }
            Err(e) => {
                device.destroy_render_target_format(format);
                Err(e)
            }
        }
    }

    /// Replace every target at `extent`.
    ///
    /// The new set is fully created before the old one is destroyed; on
    /// failure the G-Buffer keeps its previous targets.
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, extent: Extent2D) -> Result<()> {
        if extent == self.extent {
            return Ok(());
        }
        if extent.is_zero() {
            return Err(Error::InvalidState("G-Buffer extent must not be zero".to_string()));
        }
        let new_targets = create_targets(device, self.format, extent)?;
        let old_targets = std::mem::replace(&mut self.targets, new_targets);
        old_targets.destroy(device);
        engine_debug!(
            SOURCE,
            "Resized G-Buffer {}x{} -> {}x{}",
            self.extent.width, self.extent.height, extent.width, extent.height
        );
        self.extent = extent;
        Ok(())
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        self.targets.destroy(device);
        device.destroy_render_target_format(self.format);
    }

    // ===== ACCESSORS =====

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn format(&self) -> RenderTargetFormatHandle {
        self.format
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.targets.framebuffer
    }

    pub fn texture(&self, slot: GBufferSlot) -> TextureHandle {
        self.targets.color[slot.index()]
    }

    pub fn depth(&self) -> TextureHandle {
        self.targets.depth
    }

    /// Clear values in attachment order (four colors, then depth)
    pub fn clear_values() -> Vec<ClearValue> {
        let mut values = vec![ClearValue::Color([0.0; 4]); GBufferSlot::ALL.len()];
        values.push(ClearValue::DepthStencil { depth: 1.0, stencil: 0 });
        values
    }
}

fn create_targets(
    device: &mut dyn GraphicsDevice,
    format: RenderTargetFormatHandle,
    extent: Extent2D,
) -> Result<Targets> {
    let mut created: Vec<TextureHandle> = Vec::with_capacity(5);
    match build_targets(device, format, extent, &mut created) {
        Ok(framebuffer) => Ok(Targets {
            color: [created[0], created[1], created[2], created[3]],
            depth: created[4],
            framebuffer,
        }),
        Err(e) => {
            for texture in created {
                device.destroy_texture(texture);
            }
            Err(e)
        }
    }
}

/// Pushes every texture it creates into `created` so the caller can undo
fn build_targets(
    device: &mut dyn GraphicsDevice,
    format: RenderTargetFormatHandle,
    extent: Extent2D,
    created: &mut Vec<TextureHandle>,
) -> Result<FramebufferHandle> {
    for slot in GBufferSlot::ALL {
        created.push(device.create_texture(&TextureDesc::attachment(slot.name(), extent, slot.format()))?);
    }
    created.push(device.create_texture(&TextureDesc::attachment("gbuffer_depth", extent, GBUFFER_DEPTH_FORMAT))?);
    device.create_framebuffer(&FramebufferDesc {
        name: "gbuffer".to_string(),
        format,
        color: created[..4].to_vec(),
        depth: Some(created[4]),
        extent,
    })
}

#[cfg(test)]
#[path = "gbuffer_tests.rs"]
mod tests;
