/// Texture - Vulkan image + view backing a `TextureHandle`
///
/// Swapchain views are textures too: they own their view but not the image.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use prisma_render::prisma::device::{Extent2D, TextureDesc, TextureFormat, TextureKind, TextureUsage};
use prisma_render::prisma::{Error, Result};
use prisma_render::{engine_bail_warn, engine_debug, engine_err};

use crate::vulkan_context::{GpuContext, SOURCE};
use crate::vulkan_format::{aspect_mask, texture_format_to_vk, texture_usage_to_vk};

pub(crate) struct Texture {
    pub name: String,
    pub image: vk::Image,
    pub view: vk::ImageView,
    allocation: Option<Allocation>,
    pub extent: Extent2D,
    pub format: TextureFormat,
    /// False for swapchain images, which belong to the swapchain
    owns_image: bool,
}

fn full_range(aspect: vk::ImageAspectFlags, layers: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: layers,
    }
}

pub(crate) fn create_view(
    device: &ash::Device,
    image: vk::Image,
    format: TextureFormat,
    kind: TextureKind,
) -> std::result::Result<vk::ImageView, vk::Result> {
    let view_type = match kind {
        TextureKind::Texture2D => vk::ImageViewType::TYPE_2D,
        TextureKind::Cube => vk::ImageViewType::CUBE,
    };
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(texture_format_to_vk(format))
        .components(vk::ComponentMapping::default())
        .subresource_range(full_range(aspect_mask(format), kind.layer_count()));
    unsafe { device.create_image_view(&create_info, None) }
}

impl Texture {
    pub fn create(ctx: &GpuContext, desc: &TextureDesc) -> Result<Self> {
        if desc.extent.is_zero() {
            engine_bail_warn!(SOURCE, "Texture '{}' has a zero extent", desc.name);
        }
        if let Some(data) = &desc.data {
            if data.len() != desc.data_size() {
                return Err(Error::InvalidResource(format!(
                    "Texture '{}' data is {} bytes, expected {}",
                    desc.name,
                    data.len(),
                    desc.data_size()
                )));
            }
        }

        let layers = desc.kind.layer_count();
        let flags = match desc.kind {
            TextureKind::Texture2D => vk::ImageCreateFlags::empty(),
            TextureKind::Cube => vk::ImageCreateFlags::CUBE_COMPATIBLE,
        };

        unsafe {
            let image_info = vk::ImageCreateInfo::default()
                .flags(flags)
                .image_type(vk::ImageType::TYPE_2D)
                .format(texture_format_to_vk(desc.format))
                .extent(vk::Extent3D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(layers)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(texture_usage_to_vk(desc.usage, desc.data.is_some()))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create image '{}': {:?}", desc.name, e))?;

            let requirements = ctx.device.get_image_memory_requirements(image);
            let allocation = match ctx.allocate(&desc.name, requirements, MemoryLocation::GpuOnly, false) {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            if let Err(e) = ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                ctx.free(allocation);
                ctx.device.destroy_image(image, None);
                return Err(engine_err!(SOURCE, "Failed to bind memory of image '{}': {:?}", desc.name, e));
            }

            let mut texture = Self {
                name: desc.name.clone(),
                image,
                view: vk::ImageView::null(),
                allocation: Some(allocation),
                extent: desc.extent,
                format: desc.format,
                owns_image: true,
            };

            match create_view(&ctx.device, image, desc.format, desc.kind) {
                Ok(view) => texture.view = view,
                Err(e) => {
                    texture.destroy(ctx);
                    return Err(engine_err!(SOURCE, "Failed to create view of '{}': {:?}", desc.name, e));
                }
            }

            let prepared = match &desc.data {
                Some(data) => texture.upload(ctx, data, layers),
                // Sampled-only images get a layout a shader can read; attachments
                // are transitioned by their first render pass.
                None if !desc.usage.intersects(TextureUsage::COLOR_ATTACHMENT | TextureUsage::DEPTH_ATTACHMENT) => {
                    texture.transition_to_shader_read(ctx, layers)
                }
                None => Ok(()),
            };
            if let Err(e) = prepared {
                texture.destroy(ctx);
                return Err(e);
            }

            Ok(texture)
        }
    }

    /// Wrap a swapchain image
    pub fn from_swapchain_image(
        ctx: &GpuContext,
        name: String,
        image: vk::Image,
        extent: Extent2D,
        format: TextureFormat,
    ) -> Result<Self> {
        let view = create_view(&ctx.device, image, format, TextureKind::Texture2D)
            .map_err(|e| engine_err!(SOURCE, "Failed to create swapchain view '{}': {:?}", name, e))?;
        Ok(Self {
            name,
            image,
            view,
            allocation: None,
            extent,
            format,
            owns_image: false,
        })
    }

    pub fn is_swapchain_view(&self) -> bool {
        !self.owns_image
    }

    fn upload(&self, ctx: &GpuContext, data: &[u8], layers: u32) -> Result<()> {
        unsafe {
            let staging_info = vk::BufferCreateInfo::default()
                .size(data.len() as u64)
                .usage(vk::BufferUsageFlags::TRANSFER_SRC)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let staging = ctx.device.create_buffer(&staging_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create staging buffer for '{}': {:?}", self.name, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(staging);
            let allocation = match ctx.allocate("texture_staging", requirements, MemoryLocation::CpuToGpu, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(staging, None);
                    return Err(e);
                }
            };

            let result = (|| {
                ctx.device.bind_buffer_memory(staging, allocation.memory(), allocation.offset())
                    .map_err(|e| engine_err!(SOURCE, "Failed to bind staging memory for '{}': {:?}", self.name, e))?;
                let mapped = allocation
                    .mapped_ptr()
                    .ok_or_else(|| engine_err!(SOURCE, "Staging buffer for '{}' is not mapped", self.name))?
                    .as_ptr() as *mut u8;
                std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());

                let aspect = aspect_mask(self.format);
                let image = self.image;
                let extent = self.extent;
                ctx.one_shot("texture upload", |device, cb| {
                    let to_transfer = vk::ImageMemoryBarrier::default()
                        .old_layout(vk::ImageLayout::UNDEFINED)
                        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(image)
                        .subresource_range(full_range(aspect, layers))
                        .src_access_mask(vk::AccessFlags::empty())
                        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);
                    device.cmd_pipeline_barrier(
                        cb,
                        vk::PipelineStageFlags::TOP_OF_PIPE,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[to_transfer],
                    );

                    // Layers are tightly packed one after the other
                    let region = vk::BufferImageCopy::default()
                        .buffer_offset(0)
                        .image_subresource(vk::ImageSubresourceLayers {
                            aspect_mask: aspect,
                            mip_level: 0,
                            base_array_layer: 0,
                            layer_count: layers,
                        })
                        .image_extent(vk::Extent3D { width: extent.width, height: extent.height, depth: 1 });
                    device.cmd_copy_buffer_to_image(
                        cb,
                        staging,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );

                    let to_shader = vk::ImageMemoryBarrier::default()
                        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(image)
                        .subresource_range(full_range(aspect, layers))
                        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                        .dst_access_mask(vk::AccessFlags::SHADER_READ);
                    device.cmd_pipeline_barrier(
                        cb,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::FRAGMENT_SHADER,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[to_shader],
                    );
                })
            })();

            ctx.device.destroy_buffer(staging, None);
            ctx.free(allocation);
            engine_debug!(SOURCE, "Uploaded {} bytes into '{}'", data.len(), self.name);
            result
        }
    }

    fn transition_to_shader_read(&self, ctx: &GpuContext, layers: u32) -> Result<()> {
        let aspect = aspect_mask(self.format);
        let image = self.image;
        ctx.one_shot("layout transition", |device, cb| unsafe {
            let barrier = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(full_range(aspect, layers))
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::SHADER_READ);
            device.cmd_pipeline_barrier(
                cb,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })
    }

    pub fn destroy(mut self, ctx: &GpuContext) {
        unsafe {
            if self.view != vk::ImageView::null() {
                ctx.device.destroy_image_view(self.view, None);
            }
            if self.owns_image {
                ctx.device.destroy_image(self.image, None);
            }
        }
        if let Some(allocation) = self.allocation.take() {
            ctx.free(allocation);
        }
    }
}
