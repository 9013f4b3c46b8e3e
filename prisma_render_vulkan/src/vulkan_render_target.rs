/// Render target formats (VkRenderPass) and framebuffers

use ash::vk;
use prisma_render::prisma::device::{AttachmentDesc, Extent2D, RenderTargetFormatDesc, TextureFormat};
use prisma_render::prisma::{Error, Result};
use prisma_render::engine_err;

use crate::vulkan_context::{GpuContext, SOURCE};
use crate::vulkan_format::{final_layout, initial_layout, load_op_to_vk, store_op_to_vk, texture_format_to_vk};

pub(crate) struct RenderTargetFormat {
    pub name: String,
    pub render_pass: vk::RenderPass,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
}

pub(crate) fn attachment_description(attachment: &AttachmentDesc) -> vk::AttachmentDescription {
    let depth = attachment.format.is_depth();
    let final_layout = final_layout(attachment.final_usage, depth);
    vk::AttachmentDescription::default()
        .format(texture_format_to_vk(attachment.format))
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(load_op_to_vk(attachment.load_op))
        .store_op(store_op_to_vk(attachment.store_op))
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(initial_layout(attachment.load_op, final_layout))
        .final_layout(final_layout)
}

impl RenderTargetFormat {
    pub fn create(ctx: &GpuContext, desc: &RenderTargetFormatDesc) -> Result<Self> {
        if desc.color.iter().any(|a| a.format.is_depth()) || desc.depth.is_some_and(|d| !d.format.is_depth()) {
            return Err(Error::InvalidResource(format!(
                "Render target format '{}' mixes color and depth formats",
                desc.name
            )));
        }

        let mut attachments: Vec<vk::AttachmentDescription> =
            desc.color.iter().map(attachment_description).collect();
        let color_refs: Vec<vk::AttachmentReference> = (0..desc.color.len() as u32)
            .map(|i| vk::AttachmentReference {
                attachment: i,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();
        let depth_ref = vk::AttachmentReference {
            attachment: desc.color.len() as u32,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        if let Some(depth) = &desc.depth {
            attachments.push(attachment_description(depth));
        }

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if desc.depth.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        // Earlier passes may have written attachments this one loads or samples
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        let dependencies = [
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(stages)
                .src_access_mask(access)
                .dst_stage_mask(stages | vk::PipelineStageFlags::FRAGMENT_SHADER)
                .dst_access_mask(access | vk::AccessFlags::SHADER_READ),
            vk::SubpassDependency::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(stages)
                .src_access_mask(access)
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER | stages)
                .dst_access_mask(vk::AccessFlags::SHADER_READ | access),
        ];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);

        let render_pass = unsafe { ctx.device.create_render_pass(&info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create render pass '{}': {:?}", desc.name, e))?;

        Ok(Self {
            name: desc.name.clone(),
            render_pass,
            color_formats: desc.color.iter().map(|a| a.format).collect(),
            depth_format: desc.depth.map(|d| d.format),
        })
    }

    pub fn attachment_count(&self) -> usize {
        self.color_formats.len() + usize::from(self.depth_format.is_some())
    }

    pub fn destroy(self, ctx: &GpuContext) {
        unsafe { ctx.device.destroy_render_pass(self.render_pass, None) };
    }
}

pub(crate) struct Framebuffer {
    pub name: String,
    pub framebuffer: vk::Framebuffer,
    pub render_pass: vk::RenderPass,
    pub extent: Extent2D,
}

impl Framebuffer {
    /// `views` are color views in order followed by the depth view
    pub fn create(
        ctx: &GpuContext,
        name: &str,
        format: &RenderTargetFormat,
        views: &[vk::ImageView],
        extent: Extent2D,
    ) -> Result<Self> {
        if views.len() != format.attachment_count() {
            return Err(Error::InvalidResource(format!(
                "Framebuffer '{}' has {} attachments, format '{}' expects {}",
                name,
                views.len(),
                format.name,
                format.attachment_count()
            )));
        }
        if extent.is_zero() {
            return Err(Error::InvalidResource(format!("Framebuffer '{}' has a zero extent", name)));
        }

        let info = vk::FramebufferCreateInfo::default()
            .render_pass(format.render_pass)
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { ctx.device.create_framebuffer(&info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create framebuffer '{}': {:?}", name, e))?;

        Ok(Self {
            name: name.to_string(),
            framebuffer,
            render_pass: format.render_pass,
            extent,
        })
    }

    pub fn destroy(self, ctx: &GpuContext) {
        unsafe { ctx.device.destroy_framebuffer(self.framebuffer, None) };
    }
}

#[cfg(test)]
#[path = "vulkan_render_target_tests.rs"]
mod tests;
