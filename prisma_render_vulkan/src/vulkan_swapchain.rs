/// Surface and swapchain
///
/// The device owns one surface for its whole life and at most one swapchain
/// at a time. Out-of-date and suboptimal results are reported as outcomes,
/// never as errors, so the frame loop can recover.

use ash::vk;
use prisma_render::prisma::device::{
    AcquireOutcome, Extent2D, PresentOutcome, SurfaceState, SurfaceTransform, SwapchainDesc,
    TextureFormat, TextureHandle,
};
use prisma_render::prisma::{Error, Result};
use prisma_render::{engine_err, engine_error, engine_info};

use crate::vulkan_context::{GpuContext, SOURCE};
use crate::vulkan_format::{surface_transform_from_vk, texture_format_from_vk};

// ===== SELECTION HELPERS =====

/// Surface extent, with `fallback` when the surface lets the swapchain decide
pub(crate) fn surface_extent(current: vk::Extent2D, fallback: Extent2D) -> Extent2D {
    if current.width == u32::MAX && current.height == u32::MAX {
        fallback
    } else {
        Extent2D::new(current.width, current.height)
    }
}

/// Swapchain extent: the surface's when it dictates one, else `preferred` clamped to the limits
pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, preferred: Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: preferred.width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: preferred.height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 = unbounded)
pub(crate) fn choose_image_count(min: u32, max: u32) -> u32 {
    let wanted = min + 1;
    if max > 0 {
        wanted.min(max)
    } else {
        wanted
    }
}

/// FIFO with vsync; otherwise MAILBOX, then IMMEDIATE, then FIFO (always available)
pub(crate) fn choose_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Prefer an sRGB BGRA/RGBA format, else the first one the renderer understands
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, TextureFormat)> {
    let preferred = formats.iter().find(|f| {
        (f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    preferred
        .into_iter()
        .chain(formats.iter())
        .find_map(|f| texture_format_from_vk(f.format).map(|format| (*f, format)))
}

pub(crate) fn acquire_outcome(result: std::result::Result<(u32, bool), vk::Result>) -> Result<AcquireOutcome> {
    match result {
        Ok((index, false)) => Ok(AcquireOutcome::Image(index)),
        Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(engine_err!(SOURCE, "Failed to acquire swapchain image: {:?}", e)),
    }
}

pub(crate) fn present_outcome(result: std::result::Result<bool, vk::Result>) -> Result<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(engine_err!(SOURCE, "Failed to present swapchain image: {:?}", e)),
    }
}

// ===== SURFACE =====

pub(crate) struct Surface {
    pub loader: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
    /// Reported when the platform leaves the extent to the swapchain
    pub fallback_extent: Extent2D,
}

impl Surface {
    pub fn capabilities(&self, ctx: &GpuContext) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(ctx.physical_device, self.surface)
                .map_err(|e| engine_err!(SOURCE, "Failed to query surface capabilities: {:?}", e))
        }
    }

    pub fn state(&self, ctx: &GpuContext) -> Result<SurfaceState> {
        let caps = match self.capabilities(ctx) {
            Ok(caps) => caps,
            // A lost surface reads as minimized until the platform hands out a new one
            Err(_) => return Ok(SurfaceState { extent: Extent2D::default(), transform: SurfaceTransform::Identity }),
        };
        Ok(SurfaceState {
            extent: surface_extent(caps.current_extent, self.fallback_extent),
            transform: surface_transform_from_vk(caps.current_transform),
        })
    }

    pub fn destroy(&self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

// ===== SWAPCHAIN =====

pub(crate) struct Swapchain {
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub format: TextureFormat,
    pub extent: Extent2D,
    pub transform: SurfaceTransform,
    /// Texture handles of the views, empty until `create_swapchain_views`
    pub views: Vec<TextureHandle>,
}

impl Swapchain {
    pub fn create(ctx: &GpuContext, surface: &Surface, desc: &SwapchainDesc) -> Result<Self> {
        let caps = surface.capabilities(ctx)?;
        unsafe {
            let formats = surface.loader
                .get_physical_device_surface_formats(ctx.physical_device, surface.surface)
                .map_err(|e| engine_err!(SOURCE, "Failed to query surface formats: {:?}", e))?;
            let (surface_format, format) = choose_surface_format(&formats).ok_or_else(|| {
                engine_error!(SOURCE, "Surface offers no supported color format ({} formats)", formats.len());
                Error::InitializationFailed("No supported surface format".to_string())
            })?;

            let present_modes = surface.loader
                .get_physical_device_surface_present_modes(ctx.physical_device, surface.surface)
                .map_err(|e| engine_err!(SOURCE, "Failed to query present modes: {:?}", e))?;
            let present_mode = choose_present_mode(&present_modes, desc.vsync);

            let extent = choose_extent(&caps, desc.preferred_extent);
            if extent.width == 0 || extent.height == 0 {
                return Err(Error::InvalidState("Cannot create a swapchain for a zero-sized surface".to_string()));
            }

            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(surface.surface)
                .min_image_count(choose_image_count(caps.min_image_count, caps.max_image_count))
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(caps.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode)
                .clipped(true);

            let loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);
            let swapchain = loader
                .create_swapchain(&create_info, None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to create swapchain: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
                })?;

            let images = match loader.get_swapchain_images(swapchain) {
                Ok(images) => images,
                Err(e) => {
                    loader.destroy_swapchain(swapchain, None);
                    return Err(engine_err!(SOURCE, "Failed to get swapchain images: {:?}", e));
                }
            };

            let extent = Extent2D::new(extent.width, extent.height);
            engine_info!(SOURCE, "Swapchain created: {}x{}, {:?}, {} images, {:?}",
                extent.width, extent.height, format, images.len(), present_mode);

            Ok(Self {
                loader,
                swapchain,
                images,
                format,
                extent,
                transform: surface_transform_from_vk(caps.current_transform),
                views: Vec::new(),
            })
        }
    }

    pub fn acquire(&self, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.loader.acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
        };
        acquire_outcome(result)
    }

    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> Result<PresentOutcome> {
        if image_index as usize >= self.images.len() {
            return Err(Error::InvalidResource(format!(
                "Swapchain image {} out of range ({} images)",
                image_index,
                self.images.len()
            )));
        }
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        present_outcome(unsafe { self.loader.queue_present(queue, &present_info) })
    }

    pub fn destroy(self) {
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
