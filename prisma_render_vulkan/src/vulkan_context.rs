/// GpuContext - Vulkan objects shared by the device and its command lists
///
/// Contains everything needed for GPU operations:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Graphics and present queues
/// - Command pool for one-shot upload operations
///
/// The last `Arc<GpuContext>` to go away destroys the device and the instance,
/// so command lists that outlive the device never call into a dead device.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use prisma_render::prisma::{Error, Result};
use prisma_render::{engine_err, engine_error, engine_warn};
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub(crate) const SOURCE: &str = "prisma::vulkan";

pub(crate) struct GpuContext {
    /// Kept alive for the lifetime of the instance
    _entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,

    /// Dropped before the device is destroyed
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Bytes currently handed out by `allocate()`
    memory_used: AtomicU64,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,

    /// TRANSIENT + RESET_COMMAND_BUFFER pool for one-shot uploads
    upload_command_pool: Mutex<vk::CommandPool>,

    pub limits: vk::PhysicalDeviceLimits,

    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

/// Queue selection produced by device bring-up
pub(crate) struct QueueSetup {
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
}

impl GpuContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        allocator: Allocator,
        queues: QueueSetup,
        upload_command_pool: vk::CommandPool,
        debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
        debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    ) -> Self {
        let limits = unsafe { instance.get_physical_device_properties(physical_device).limits };
        Self {
            _entry: entry,
            instance,
            physical_device,
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            memory_used: AtomicU64::new(0),
            graphics_queue: queues.graphics_queue,
            graphics_queue_family: queues.graphics_queue_family,
            present_queue: queues.present_queue,
            upload_command_pool: Mutex::new(upload_command_pool),
            limits,
            debug_utils_loader,
            debug_messenger,
        }
    }

    /// Allocate memory for a buffer or image
    pub fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let mut allocator = self
            .allocator
            .lock()
            .map_err(|_| engine_err!(SOURCE, "GPU allocator lock poisoned"))?;
        let allocation = allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                engine_error!(SOURCE, "Out of GPU memory for '{}' ({:.2} MB): {:?}", name, size_mb, e);
                Error::OutOfMemory
            })?;
        self.memory_used.fetch_add(allocation.size(), Ordering::Relaxed);
        Ok(allocation)
    }

    /// Return an allocation to the allocator
    pub fn free(&self, allocation: Allocation) {
        let size = allocation.size();
        match self.allocator.lock() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    engine_warn!(SOURCE, "Failed to free GPU allocation: {:?}", e);
                    return;
                }
                self.memory_used.fetch_sub(size, Ordering::Relaxed);
            }
            Err(_) => engine_warn!(SOURCE, "GPU allocator lock poisoned, leaking {} bytes", size),
        }
    }

    pub fn memory_used(&self) -> u64 {
        self.memory_used.load(Ordering::Relaxed)
    }

    /// Record `record` into a throwaway command buffer, submit it and wait for
    /// the graphics queue to drain.
    pub fn one_shot<F>(&self, label: &str, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let pool = self
            .upload_command_pool
            .lock()
            .map_err(|_| engine_err!(SOURCE, "Upload command pool lock poisoned"))?;

        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = self
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!(SOURCE, "Failed to allocate command buffer for {}: {:?}", label, e))?[0];

            let result = (|| {
                let begin_info = vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                self.device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(|e| engine_err!(SOURCE, "Failed to begin command buffer for {}: {:?}", label, e))?;

                record(&self.device, command_buffer);

                self.device
                    .end_command_buffer(command_buffer)
                    .map_err(|e| engine_err!(SOURCE, "Failed to end command buffer for {}: {:?}", label, e))?;

                let command_buffers = [command_buffer];
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                self.device
                    .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())
                    .map_err(|e| engine_err!(SOURCE, "Failed to submit {}: {:?}", label, e))?;
                self.device
                    .queue_wait_idle(self.graphics_queue)
                    .map_err(|e| engine_err!(SOURCE, "Failed to wait for {}: {:?}", label, e))
            })();

            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            if let Ok(pool) = self.upload_command_pool.get_mut() {
                if *pool != vk::CommandPool::null() {
                    self.device.destroy_command_pool(*pool, None);
                    *pool = vk::CommandPool::null();
                }
            }

            // Allocator pages must be released while the device is alive
            ManuallyDrop::drop(&mut self.allocator);

            crate::debug::cleanup_debug_config();
            if let (Some(debug_utils), Some(messenger)) =
                (&self.debug_utils_loader, self.debug_messenger.take())
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

