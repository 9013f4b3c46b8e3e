/// VulkanGraphicsDevice - Vulkan implementation of the `GraphicsDevice` trait

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use prisma_render::prisma::device::{
    AcquireOutcome, BufferDesc, BufferHandle, CommandList, DescriptorResource, DescriptorSetDesc,
    DescriptorSetHandle, DeviceStats, Extent2D, FenceHandle, FramebufferDesc, FramebufferHandle,
    GraphicsDevice, PipelineDesc, PipelineHandle, PresentOutcome, RenderTargetFormatDesc,
    RenderTargetFormatHandle, ResourceKind, SemaphoreHandle, ShaderDesc, ShaderHandle, SubmitSync,
    SurfaceState, SwapchainDesc, SwapchainInfo, TextureDesc, TextureHandle,
};
use prisma_render::prisma::{Error, RendererConfig, Result};
use prisma_render::{engine_debug, engine_err, engine_error, engine_info, engine_trace, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CString;
use std::sync::{Arc, Mutex, MutexGuard};
use winit::window::Window;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_command_list::VulkanCommandList;
use crate::vulkan_config::VulkanConfig;
use crate::vulkan_context::{GpuContext, QueueSetup, SOURCE};
use crate::vulkan_descriptor_set::{validate_bindings, DescriptorAllocator};
use crate::vulkan_pipeline::Pipeline;
use crate::vulkan_render_target::{Framebuffer, RenderTargetFormat};
use crate::vulkan_resources::ResourceTables;
use crate::vulkan_sampler::SamplerCache;
use crate::vulkan_shader::Shader;
use crate::vulkan_swapchain::{Surface, Swapchain};
use crate::vulkan_texture::Texture;

const VALIDATION_LAYER: &std::ffi::CStr = c"VK_LAYER_KHRONOS_validation";

fn lock_tables(resources: &Mutex<ResourceTables>) -> Result<MutexGuard<'_, ResourceTables>> {
    resources
        .lock()
        .map_err(|_| engine_err!(SOURCE, "Resource table lock poisoned"))
}

fn init_error(what: &str, e: impl std::fmt::Debug) -> Error {
    engine_error!(SOURCE, "Failed to {}: {:?}", what, e);
    Error::InitializationFailed(format!("Failed to {}: {:?}", what, e))
}

/// Queue families a physical device offers for this surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

/// Pick graphics and present families, preferring one family that does both
pub(crate) fn select_queue_families(graphics_capable: &[bool], present_capable: &[bool]) -> Option<QueueFamilies> {
    let both = (0..graphics_capable.len())
        .find(|&i| graphics_capable[i] && present_capable.get(i).copied().unwrap_or(false));
    if let Some(index) = both {
        return Some(QueueFamilies { graphics: index as u32, present: index as u32 });
    }
    let graphics = graphics_capable.iter().position(|&g| g)?;
    let present = present_capable.iter().position(|&p| p)?;
    Some(QueueFamilies { graphics: graphics as u32, present: present as u32 })
}

/// Rank a suitable device; discrete GPUs first
pub(crate) fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    }
}

/// Vulkan graphics device
///
/// Owns the surface, the optional swapchain and every resource created through
/// it. Resources live in handle tables shared with the command lists; the
/// device context (instance, device, allocator) outlives both.
pub struct VulkanGraphicsDevice {
    ctx: Arc<GpuContext>,
    resources: Arc<Mutex<ResourceTables>>,
    samplers: SamplerCache,
    descriptors: DescriptorAllocator,
    surface: Surface,
    swapchain: Option<Swapchain>,
}

impl VulkanGraphicsDevice {
    /// Create a Vulkan device presenting to `window`
    ///
    /// # Arguments
    ///
    /// * `window` - Window for surface creation; its inner size is the
    ///   fallback extent when the platform leaves sizing to the swapchain
    /// * `config` - Renderer configuration (application info, validation request)
    /// * `vk_config` - Backend options (validation verbosity)
    pub fn new(window: &Window, config: &RendererConfig, vk_config: VulkanConfig) -> Result<Self> {
        let validation = VulkanConfig::validation_enabled(config.enable_validation);

        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_error("load the Vulkan library", e))?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|_| Error::InitializationFailed("Application name contains a NUL byte".to_string()))?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"Prisma")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let display_handle = window.display_handle().map_err(|e| init_error("get the display handle", e))?;
            let window_handle = window.window_handle().map_err(|e| init_error("get the window handle", e))?;

            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_error("query required instance extensions", e))?
                .to_vec();

            let validation = validation && {
                let available = entry.enumerate_instance_layer_properties().unwrap_or_default();
                let found = available
                    .iter()
                    .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
                if !found {
                    engine_warn!(SOURCE, "Validation requested but {:?} is not installed", VALIDATION_LAYER);
                }
                found
            };
            let layer_names = if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                vec![VALIDATION_LAYER.as_ptr()]
            } else {
                vec![]
            };

            let instance_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);
            let instance = entry
                .create_instance(&instance_info, None)
                .map_err(|e| init_error("create the Vulkan instance", e))?;

            let (debug_utils_loader, debug_messenger) = if validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
                crate::debug::init_debug_config(&vk_config);
                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(crate::debug::severity_flags(vk_config.validation_severity))
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));
                match debug_utils.create_debug_utils_messenger(&debug_info, None) {
                    Ok(messenger) => (Some(debug_utils), Some(messenger)),
                    Err(e) => {
                        crate::debug::cleanup_debug_config();
                        instance.destroy_instance(None);
                        return Err(init_error("create the debug messenger", e));
                    }
                }
            } else {
                (None, None)
            };

            let destroy_instance = |instance: &ash::Instance| {
                if let (Some(loader), Some(messenger)) = (&debug_utils_loader, debug_messenger) {
                    crate::debug::cleanup_debug_config();
                    loader.destroy_debug_utils_messenger(messenger, None);
                }
                instance.destroy_instance(None);
            };

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
            let surface_handle = match ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            ) {
                Ok(surface) => surface,
                Err(e) => {
                    destroy_instance(&instance);
                    return Err(init_error("create the window surface", e));
                }
            };
            let size = window.inner_size();
            let surface = Surface {
                loader: surface_loader,
                surface: surface_handle,
                fallback_extent: Extent2D::new(size.width, size.height),
            };

            let (physical_device, families) = match Self::pick_physical_device(&instance, &surface) {
                Ok(found) => found,
                Err(e) => {
                    surface.destroy();
                    destroy_instance(&instance);
                    return Err(e);
                }
            };

            let queue_priorities = [1.0];
            let mut queue_infos = vec![vk::DeviceQueueCreateInfo::default()
                .queue_family_index(families.graphics)
                .queue_priorities(&queue_priorities)];
            if families.present != families.graphics {
                queue_infos.push(
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(families.present)
                        .queue_priorities(&queue_priorities),
                );
            }
            let device_extensions = [ash::khr::swapchain::NAME.as_ptr()];
            let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);
            let device_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_infos)
                .enabled_extension_names(&device_extensions)
                .enabled_features(&features);

            let device = match instance.create_device(physical_device, &device_info, None) {
                Ok(device) => device,
                Err(e) => {
                    surface.destroy();
                    destroy_instance(&instance);
                    return Err(init_error("create the logical device", e));
                }
            };
            let queues = QueueSetup {
                graphics_queue: device.get_device_queue(families.graphics, 0),
                graphics_queue_family: families.graphics,
                present_queue: device.get_device_queue(families.present, 0),
            };

            let allocator = match Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            }) {
                Ok(allocator) => allocator,
                Err(e) => {
                    device.destroy_device(None);
                    surface.destroy();
                    destroy_instance(&instance);
                    return Err(init_error("create the GPU allocator", e));
                }
            };

            let upload_pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(families.graphics)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_command_pool = match device.create_command_pool(&upload_pool_info, None) {
                Ok(pool) => pool,
                Err(e) => {
                    drop(allocator);
                    device.destroy_device(None);
                    surface.destroy();
                    destroy_instance(&instance);
                    return Err(init_error("create the upload command pool", e));
                }
            };

            let properties = instance.get_physical_device_properties(physical_device);
            engine_info!(SOURCE, "Using GPU {:?} ({:?}), graphics family {}, present family {}, validation {}",
                properties.device_name_as_c_str().unwrap_or(c"unknown"),
                properties.device_type,
                families.graphics,
                families.present,
                if validation { "on" } else { "off" });

            // The context owns the instance and device from here on
            let ctx = Arc::new(GpuContext::new(
                entry,
                instance,
                physical_device,
                device,
                allocator,
                queues,
                upload_command_pool,
                debug_utils_loader,
                debug_messenger,
            ));

            Ok(Self {
                ctx,
                resources: Arc::new(Mutex::new(ResourceTables::default())),
                samplers: SamplerCache::default(),
                descriptors: DescriptorAllocator::default(),
                surface,
                swapchain: None,
            })
        }
    }

    /// Best-scoring device with swapchain support, anisotropic filtering and
    /// queues that can draw and present to `surface`
    unsafe fn pick_physical_device(
        instance: &ash::Instance,
        surface: &Surface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let devices = instance
            .enumerate_physical_devices()
            .map_err(|e| init_error("enumerate physical devices", e))?;

        let mut best: Option<(u32, vk::PhysicalDevice, QueueFamilies)> = None;
        for physical_device in devices {
            let properties = instance.get_physical_device_properties(physical_device);
            let name = properties.device_name_as_c_str().unwrap_or(c"unknown");

            let has_swapchain = instance
                .enumerate_device_extension_properties(physical_device)
                .unwrap_or_default()
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == ash::khr::swapchain::NAME));
            let features = instance.get_physical_device_features(physical_device);
            if !has_swapchain || features.sampler_anisotropy == vk::FALSE {
                engine_debug!(SOURCE, "Skipping GPU {:?}: missing swapchain or anisotropy support", name);
                continue;
            }

            let families = instance.get_physical_device_queue_family_properties(physical_device);
            let graphics: Vec<bool> = families
                .iter()
                .map(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .collect();
            let present: Vec<bool> = (0..families.len() as u32)
                .map(|i| {
                    surface.loader
                        .get_physical_device_surface_support(physical_device, i, surface.surface)
                        .unwrap_or(false)
                })
                .collect();
            let Some(queue_families) = select_queue_families(&graphics, &present) else {
                engine_debug!(SOURCE, "Skipping GPU {:?}: cannot draw and present", name);
                continue;
            };

            let score = device_type_score(properties.device_type);
            if best.map_or(true, |(best_score, _, _)| score > best_score) {
                best = Some((score, physical_device, queue_families));
            }
        }

        best.map(|(_, device, families)| (device, families)).ok_or_else(|| {
            engine_error!(SOURCE, "No Vulkan GPU can render and present to this window");
            Error::InitializationFailed("No suitable Vulkan GPU found".to_string())
        })
    }

    fn destroy_views(&mut self, tables: &mut ResourceTables) {
        let Some(swapchain) = self.swapchain.as_mut() else { return };
        for handle in swapchain.views.drain(..) {
            if let Some(view) = tables.textures.remove(handle) {
                view.destroy(&self.ctx);
            }
        }
    }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    // ===== BUFFERS =====

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle> {
        let buffer = Buffer::create(&self.ctx, desc)?;
        engine_trace!(SOURCE, "Buffer '{}' created ({} bytes)", desc.name, desc.size);
        Ok(lock_tables(&self.resources)?.buffers.insert(buffer))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        lock_tables(&self.resources)?.buffer(buffer)?.write(offset, data)
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, len: u64) -> Result<Vec<u8>> {
        lock_tables(&self.resources)?.buffer(buffer)?.read(offset, len)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        let removed = lock_tables(&self.resources).ok().and_then(|mut t| t.buffers.remove(buffer));
        match removed {
            Some(buffer) => buffer.destroy(&self.ctx),
            None => engine_error!(SOURCE, "destroy_buffer: stale handle {:?}", buffer),
        }
    }

    // ===== TEXTURES / SHADERS / PIPELINES =====

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        let texture = Texture::create(&self.ctx, desc)?;
        engine_trace!(SOURCE, "Texture '{}' created ({}x{} {:?})",
            desc.name, desc.extent.width, desc.extent.height, desc.format);
        Ok(lock_tables(&self.resources)?.textures.insert(texture))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        let Ok(mut tables) = lock_tables(&self.resources) else { return };
        match tables.textures.get(texture).map(Texture::is_swapchain_view) {
            Some(true) => {
                engine_warn!(SOURCE, "destroy_texture: swapchain views are released with destroy_swapchain_views");
            }
            Some(false) => {
                if let Some(texture) = tables.textures.remove(texture) {
                    texture.destroy(&self.ctx);
                }
            }
            None => engine_error!(SOURCE, "destroy_texture: stale handle {:?}", texture),
        }
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderHandle> {
        let shader = Shader::create(&self.ctx, desc)?;
        Ok(lock_tables(&self.resources)?.shaders.insert(shader))
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        let removed = lock_tables(&self.resources).ok().and_then(|mut t| t.shaders.remove(shader));
        match removed {
            Some(shader) => shader.destroy(&self.ctx),
            None => engine_error!(SOURCE, "destroy_shader: stale handle {:?}", shader),
        }
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle> {
        let set_layouts = desc
            .descriptor_layouts
            .iter()
            .map(|layout| self.descriptors.set_layout(&self.ctx, layout))
            .collect::<Result<Vec<_>>>()?;

        let mut tables = lock_tables(&self.resources)?;
        let pipeline = {
            let vertex = tables.shader(desc.vertex_shader)?;
            let fragment = tables.shader(desc.fragment_shader)?;
            let format = tables.format(desc.render_target_format)?;
            Pipeline::create(
                &self.ctx,
                desc,
                vertex,
                fragment,
                format.render_pass,
                format.color_formats.len(),
                &set_layouts,
            )?
        };
        engine_debug!(SOURCE, "Pipeline '{}' created", desc.name);
        Ok(tables.pipelines.insert(pipeline))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        let removed = lock_tables(&self.resources).ok().and_then(|mut t| t.pipelines.remove(pipeline));
        match removed {
            Some(pipeline) => pipeline.destroy(&self.ctx),
            None => engine_error!(SOURCE, "destroy_pipeline: stale handle {:?}", pipeline),
        }
    }

    fn create_descriptor_set(&mut self, desc: &DescriptorSetDesc) -> Result<DescriptorSetHandle> {
        validate_bindings(&desc.name, &desc.layout, &desc.bindings)?;

        let mut tables = lock_tables(&self.resources)?;

        // Resolve everything before allocating so a stale handle leaks nothing
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for binding in &desc.bindings {
            match binding.resource {
                DescriptorResource::UniformBuffer(buffer) => {
                    let buffer = tables.buffer(buffer)?;
                    buffer_infos.push((binding.binding, vk::DescriptorBufferInfo {
                        buffer: buffer.buffer,
                        offset: 0,
                        range: vk::WHOLE_SIZE,
                    }));
                }
                DescriptorResource::Texture { texture, sampler } => {
                    let texture = tables.texture(texture)?;
                    let layout = if texture.format.is_depth() {
                        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
                    } else {
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                    };
                    image_infos.push((binding.binding, vk::DescriptorImageInfo {
                        sampler: self.samplers.get(&self.ctx, sampler)?,
                        image_view: texture.view,
                        image_layout: layout,
                    }));
                }
            }
        }

        let set = self.descriptors.allocate(&self.ctx, &desc.name, &desc.layout)?;

        let writes: Vec<vk::WriteDescriptorSet> = buffer_infos
            .iter()
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set.set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
            })
            .chain(image_infos.iter().map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set.set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info))
            }))
            .collect();
        unsafe { self.ctx.device.update_descriptor_sets(&writes, &[]) };

        Ok(tables.descriptor_sets.insert(set))
    }

    fn destroy_descriptor_set(&mut self, set: DescriptorSetHandle) {
        let removed = lock_tables(&self.resources).ok().and_then(|mut t| t.descriptor_sets.remove(set));
        match removed {
            Some(set) => self.descriptors.free(&self.ctx, set),
            None => engine_error!(SOURCE, "destroy_descriptor_set: stale handle {:?}", set),
        }
    }

    fn create_render_target_format(&mut self, desc: &RenderTargetFormatDesc) -> Result<RenderTargetFormatHandle> {
        let format = RenderTargetFormat::create(&self.ctx, desc)?;
        Ok(lock_tables(&self.resources)?.formats.insert(format))
    }

    fn destroy_render_target_format(&mut self, format: RenderTargetFormatHandle) {
        let removed = lock_tables(&self.resources).ok().and_then(|mut t| t.formats.remove(format));
        match removed {
            Some(format) => format.destroy(&self.ctx),
            None => engine_error!(SOURCE, "destroy_render_target_format: stale handle {:?}", format),
        }
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle> {
        let mut tables = lock_tables(&self.resources)?;
        let framebuffer = {
            let format = tables.format(desc.format)?;
            let mut views = Vec::with_capacity(desc.color.len() + 1);
            for &handle in desc.color.iter().chain(desc.depth.iter()) {
                let texture = tables.texture(handle)?;
                if texture.extent != desc.extent {
                    return Err(Error::InvalidResource(format!(
                        "Framebuffer '{}': attachment '{}' is {}x{}, framebuffer is {}x{}",
                        desc.name, texture.name, texture.extent.width, texture.extent.height,
                        desc.extent.width, desc.extent.height
                    )));
                }
                views.push(texture.view);
            }
            Framebuffer::create(&self.ctx, &desc.name, format, &views, desc.extent)?
        };
        Ok(tables.framebuffers.insert(framebuffer))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        let removed = lock_tables(&self.resources).ok().and_then(|mut t| t.framebuffers.remove(framebuffer));
        match removed {
            Some(framebuffer) => framebuffer.destroy(&self.ctx),
            None => engine_error!(SOURCE, "destroy_framebuffer: stale handle {:?}", framebuffer),
        }
    }

    // ===== SWAPCHAIN =====

    fn surface_state(&self) -> Result<SurfaceState> {
        self.surface.state(&self.ctx)
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<SwapchainInfo> {
        if self.swapchain.is_some() {
            return Err(Error::InvalidState("A swapchain already exists".to_string()));
        }
        if !desc.preferred_extent.is_zero() {
            self.surface.fallback_extent = desc.preferred_extent;
        }
        let swapchain = Swapchain::create(&self.ctx, &self.surface, desc)?;
        let info = SwapchainInfo {
            extent: swapchain.extent,
            format: swapchain.format,
            image_count: swapchain.images.len() as u32,
            transform: swapchain.transform,
        };
        self.swapchain = Some(swapchain);
        Ok(info)
    }

    fn destroy_swapchain(&mut self) {
        if self.swapchain.as_ref().is_some_and(|s| !s.views.is_empty()) {
            engine_warn!(SOURCE, "destroy_swapchain: views still alive, releasing them first");
            if let Ok(mut tables) = self.resources.clone().lock() {
                self.destroy_views(&mut tables);
            }
        }
        match self.swapchain.take() {
            Some(swapchain) => swapchain.destroy(),
            None => engine_warn!(SOURCE, "destroy_swapchain: no swapchain"),
        }
    }

    fn create_swapchain_views(&mut self) -> Result<Vec<TextureHandle>> {
        let swapchain = self
            .swapchain
            .as_mut()
            .ok_or_else(|| Error::InvalidState("No swapchain to create views for".to_string()))?;
        if !swapchain.views.is_empty() {
            return Err(Error::InvalidState("Swapchain views already exist".to_string()));
        }

        let mut tables = lock_tables(&self.resources)?;
        for (i, &image) in swapchain.images.iter().enumerate() {
            let view = Texture::from_swapchain_image(
                &self.ctx,
                format!("swapchain_view_{}", i),
                image,
                swapchain.extent,
                swapchain.format,
            );
            match view {
                Ok(view) => swapchain.views.push(tables.textures.insert(view)),
                Err(e) => {
                    for handle in swapchain.views.drain(..) {
                        if let Some(view) = tables.textures.remove(handle) {
                            view.destroy(&self.ctx);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(swapchain.views.clone())
    }

    fn destroy_swapchain_views(&mut self) {
        let resources = Arc::clone(&self.resources);
        let Ok(mut tables) = resources.lock() else { return };
        self.destroy_views(&mut tables);
    }

    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> Result<AcquireOutcome> {
        let signal = lock_tables(&self.resources)?.semaphore(signal)?;
        self.swapchain
            .as_ref()
            .ok_or_else(|| Error::InvalidState("No swapchain to acquire from".to_string()))?
            .acquire(signal)
    }

    fn present(&mut self, image_index: u32, wait: SemaphoreHandle) -> Result<PresentOutcome> {
        let wait = lock_tables(&self.resources)?.semaphore(wait)?;
        self.swapchain
            .as_ref()
            .ok_or_else(|| Error::InvalidState("No swapchain to present to".to_string()))?
            .present(self.ctx.present_queue, image_index, wait)
    }

    // ===== SYNCHRONIZATION =====

    fn create_fence(&mut self, name: &str, signaled: bool) -> Result<FenceHandle> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { self.ctx.device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create fence '{}': {:?}", name, e))?;
        Ok(lock_tables(&self.resources)?.fences.insert(fence))
    }

    fn destroy_fence(&mut self, fence: FenceHandle) {
        let removed = lock_tables(&self.resources).ok().and_then(|mut t| t.fences.remove(fence));
        match removed {
            Some(fence) => unsafe { self.ctx.device.destroy_fence(fence, None) },
            None => engine_error!(SOURCE, "destroy_fence: stale handle {:?}", fence),
        }
    }

    fn wait_for_fence(&mut self, fence: FenceHandle) -> Result<()> {
        let fence = lock_tables(&self.resources)?.fence(fence)?;
        unsafe { self.ctx.device.wait_for_fences(&[fence], true, u64::MAX) }
            .map_err(|e| engine_err!(SOURCE, "Failed to wait for fence: {:?}", e))
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> Result<()> {
        let fence = lock_tables(&self.resources)?.fence(fence)?;
        unsafe { self.ctx.device.reset_fences(&[fence]) }
            .map_err(|e| engine_err!(SOURCE, "Failed to reset fence: {:?}", e))
    }

    fn create_semaphore(&mut self, name: &str) -> Result<SemaphoreHandle> {
        let semaphore = unsafe { self.ctx.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create semaphore '{}': {:?}", name, e))?;
        Ok(lock_tables(&self.resources)?.semaphores.insert(semaphore))
    }

    fn destroy_semaphore(&mut self, semaphore: SemaphoreHandle) {
        let removed = lock_tables(&self.resources).ok().and_then(|mut t| t.semaphores.remove(semaphore));
        match removed {
            Some(semaphore) => unsafe { self.ctx.device.destroy_semaphore(semaphore, None) },
            None => engine_error!(SOURCE, "destroy_semaphore: stale handle {:?}", semaphore),
        }
    }

    // ===== COMMANDS =====

    fn create_command_list(&mut self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(VulkanCommandList::new(Arc::clone(&self.ctx), Arc::clone(&self.resources))?))
    }

    fn submit(&mut self, commands: &dyn CommandList, sync: &SubmitSync) -> Result<()> {
        let commands = commands
            .as_any()
            .downcast_ref::<VulkanCommandList>()
            .ok_or_else(|| Error::InvalidResource("Command list was not created by this device".to_string()))?;
        if commands.is_recording() {
            return Err(Error::InvalidState("Command list is still recording".to_string()));
        }

        let (wait, signal, fence) = {
            let tables = lock_tables(&self.resources)?;
            (
                sync.wait.map(|s| tables.semaphore(s)).transpose()?,
                sync.signal.map(|s| tables.semaphore(s)).transpose()?,
                sync.fence.map(|f| tables.fence(f)).transpose()?,
            )
        };

        let command_buffers = [commands.command_buffer()];
        let wait_semaphores: Vec<vk::Semaphore> = wait.into_iter().collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = wait_semaphores
            .iter()
            .map(|_| vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = signal.into_iter().collect();
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.ctx.device
                .queue_submit(self.ctx.graphics_queue, &[submit_info], fence.unwrap_or(vk::Fence::null()))
                .map_err(|e| engine_err!(SOURCE, "Failed to submit commands to the graphics queue: {:?}", e))
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.ctx.device.device_wait_idle() }
            .map_err(|e| engine_err!(SOURCE, "Failed to wait for the device to idle: {:?}", e))
    }

    fn stats(&self) -> DeviceStats {
        let mut stats = DeviceStats::default();
        if let Ok(tables) = self.resources.lock() {
            for (kind, count) in tables.live_counts() {
                stats.set_live(kind, count as u32);
            }
        }
        let views = self.swapchain.as_ref().map_or(0, |s| s.views.len());
        stats.set_live(ResourceKind::Swapchain, u32::from(self.swapchain.is_some()));
        stats.set_live(ResourceKind::SwapchainView, views as u32);
        stats.gpu_memory_used = self.ctx.memory_used();
        stats
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe { self.ctx.device.device_wait_idle().ok() };

        let resources = Arc::clone(&self.resources);
        if let Ok(mut tables) = resources.lock() {
            self.destroy_views(&mut tables);

            let leaked: usize = tables.live_counts().iter().map(|(_, count)| count).sum();
            if leaked > 0 {
                engine_warn!(SOURCE, "{} resources still alive at device shutdown, releasing them", leaked);
            }

            let ctx = &self.ctx;
            for (_, framebuffer) in tables.framebuffers.drain() {
                framebuffer.destroy(ctx);
            }
            // Sets go away with their pools
            tables.descriptor_sets.clear();
            for (_, pipeline) in tables.pipelines.drain() {
                pipeline.destroy(ctx);
            }
            for (_, format) in tables.formats.drain() {
                format.destroy(ctx);
            }
            for (_, shader) in tables.shaders.drain() {
                shader.destroy(ctx);
            }
            for (_, texture) in tables.textures.drain() {
                texture.destroy(ctx);
            }
            for (_, buffer) in tables.buffers.drain() {
                buffer.destroy(ctx);
            }
            unsafe {
                for (_, fence) in tables.fences.drain() {
                    ctx.device.destroy_fence(fence, None);
                }
                for (_, semaphore) in tables.semaphores.drain() {
                    ctx.device.destroy_semaphore(semaphore, None);
                }
            }
        }

        self.samplers.shutdown(&self.ctx);
        self.descriptors.shutdown(&self.ctx);
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy();
        }
        self.surface.destroy();
        // Instance, device and allocator go with the last GpuContext reference
    }
}

#[cfg(test)]
#[path = "vulkan_tests.rs"]
mod tests;
