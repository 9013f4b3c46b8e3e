/// Offscreen HDR color target written by the lighting pass
///
/// In the deferred pipeline the background, lighting and transparent passes
/// render here and the composition pass resolves it into the backbuffer. The
/// depth attachment is either borrowed from the G-Buffer (loaded, so the
/// transparent pass tests against opaque depth) or owned and cleared.

use crate::error::{Error, Result};
use crate::graphics_device::{
    AttachmentDesc, AttachmentUsage, ClearValue, Extent2D, FramebufferDesc, FramebufferHandle,
    GraphicsDevice, LoadOp, RenderTargetFormatDesc, RenderTargetFormatHandle, TextureDesc,
    TextureFormat, TextureHandle,
};
use crate::gbuffer::GBUFFER_DEPTH_FORMAT;

pub const LIT_COLOR_FORMAT: TextureFormat = TextureFormat::R16G16B16A16_SFLOAT;

pub struct LitColorTarget {
    extent: Extent2D,
    format: RenderTargetFormatHandle,
    color: TextureHandle,
    /// Depth this target created itself, `None` when borrowing
    owned_depth: Option<TextureHandle>,
    depth: TextureHandle,
    framebuffer: FramebufferHandle,
}

impl LitColorTarget {
    pub fn format_desc(shared_depth: bool) -> RenderTargetFormatDesc {
        let depth_load = if shared_depth { LoadOp::Load } else { LoadOp::Clear };
        RenderTargetFormatDesc {
            name: "lit_color".to_string(),
            color: vec![AttachmentDesc::new(LIT_COLOR_FORMAT, LoadOp::Clear, AttachmentUsage::ShaderRead)],
            depth: Some(AttachmentDesc::new(GBUFFER_DEPTH_FORMAT, depth_load, AttachmentUsage::Attachment)),
        }
    }

    pub fn create(
        device: &mut dyn GraphicsDevice,
        extent: Extent2D,
        shared_depth: Option<TextureHandle>,
    ) -> Result<Self> {
        if extent.is_zero() {
            return Err(Error::InvalidState("lit color extent must not be zero".to_string()));
        }
        let format = device.create_render_target_format(&Self::format_desc(shared_depth.is_some()))?;
        let mut target = Self {
            extent,
            format,
            color: TextureHandle::default(),
            owned_depth: None,
            depth: TextureHandle::default(),
            framebuffer: FramebufferHandle::default(),
        };
        if let Err(e) = target.build(device, extent, shared_depth) {
            device.destroy_render_target_format(format);
            return Err(e);
        }
        Ok(target)
    }

    /// Recreate color, depth and framebuffer at `extent`; `shared_depth`
    /// must be the G-Buffer depth of the same extent when borrowing.
    pub fn resize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        extent: Extent2D,
        shared_depth: Option<TextureHandle>,
    ) -> Result<()> {
        if extent.is_zero() {
            return Err(Error::InvalidState("lit color extent must not be zero".to_string()));
        }
        let old_color = self.color;
        let old_owned_depth = self.owned_depth.take();
        let old_framebuffer = self.framebuffer;
        let old_depth = self.depth;

        if let Err(e) = self.build(device, extent, shared_depth) {
            self.color = old_color;
            self.owned_depth = old_owned_depth;
            self.depth = old_depth;
            self.framebuffer = old_framebuffer;
            return Err(e);
        }

        device.destroy_framebuffer(old_framebuffer);
        device.destroy_texture(old_color);
        if let Some(depth) = old_owned_depth {
            device.destroy_texture(depth);
        }
        self.extent = extent;
        Ok(())
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_texture(self.color);
        if let Some(depth) = self.owned_depth {
            device.destroy_texture(depth);
        }
        device.destroy_render_target_format(self.format);
    }

    fn build(
        &mut self,
        device: &mut dyn GraphicsDevice,
        extent: Extent2D,
        shared_depth: Option<TextureHandle>,
    ) -> Result<()> {
        let color = device.create_texture(&TextureDesc::attachment("lit_color", extent, LIT_COLOR_FORMAT))?;
        let (depth, owned_depth) = match shared_depth {
            Some(depth) => (depth, None),
            None => match device.create_texture(&TextureDesc::attachment("lit_depth", extent, GBUFFER_DEPTH_FORMAT)) {
                Ok(depth) => (depth, Some(depth)),
                Err(e) => {
                    device.destroy_texture(color);
                    return Err(e);
                }
            },
        };
        let framebuffer = device.create_framebuffer(&FramebufferDesc {
            name: "lit_color".to_string(),
            format: self.format,
            color: vec![color],
            depth: Some(depth),
            extent,
        });
        match framebuffer {
            Ok(framebuffer) => {
                self.color = color;
                self.depth = depth;
                self.owned_depth = owned_depth;
                self.framebuffer = framebuffer;
                Ok(())
            }
            Err(e) => {
                device.destroy_texture(color);
                if let Some(depth) = owned_depth {
                    device.destroy_texture(depth);
                }
                Err(e)
            }
        }
    }

    // ===== ACCESSORS =====

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn format(&self) -> RenderTargetFormatHandle {
        self.format
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    pub fn color(&self) -> TextureHandle {
        self.color
    }

    pub fn depth(&self) -> TextureHandle {
        self.depth
    }

    pub fn clear_values(clear_color: [f32; 4]) -> Vec<ClearValue> {
        vec![ClearValue::Color(clear_color), ClearValue::DepthStencil { depth: 1.0, stencil: 0 }]
    }
}

#[cfg(test)]
#[path = "lit_target_tests.rs"]
mod tests;
