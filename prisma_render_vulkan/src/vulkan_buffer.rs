/// Buffer - host-visible Vulkan buffer backing a `BufferHandle`

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use prisma_render::prisma::device::BufferDesc;
use prisma_render::prisma::{Error, Result};
use prisma_render::{engine_bail_warn, engine_err};

use crate::vulkan_context::{GpuContext, SOURCE};
use crate::vulkan_format::buffer_usage_to_vk;

pub(crate) struct Buffer {
    pub name: String,
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    pub size: u64,
}

impl Buffer {
    /// Create a CPU-writable buffer
    ///
    /// Vertex, index and uniform buffers all live in `CpuToGpu` memory so the
    /// frame loop can write them directly through the persistent mapping.
    pub fn create(ctx: &GpuContext, desc: &BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            engine_bail_warn!(SOURCE, "Buffer '{}' has zero size", desc.name);
        }

        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage) | vk::BufferUsageFlags::TRANSFER_DST)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create buffer '{}' ({} bytes): {:?}", desc.name, desc.size, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);
            let allocation = match ctx.allocate(&desc.name, requirements, MemoryLocation::CpuToGpu, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                ctx.free(allocation);
                ctx.device.destroy_buffer(buffer, None);
                return Err(engine_err!(SOURCE, "Failed to bind memory of buffer '{}': {:?}", desc.name, e));
            }

            Ok(Self {
                name: desc.name.clone(),
                buffer,
                allocation: Some(allocation),
                size: desc.size,
            })
        }
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::InvalidResource(format!(
                "Range {}..{} out of bounds for buffer '{}' ({} bytes)",
                offset,
                offset.saturating_add(len),
                self.name,
                self.size
            ))),
        }
    }

    fn mapped_ptr(&self) -> Result<*mut u8> {
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, "Buffer '{}' has no allocation", self.name))?;
        allocation
            .mapped_ptr()
            .map(|ptr| ptr.as_ptr() as *mut u8)
            .ok_or_else(|| Error::BackendError(format!("Buffer '{}' is not CPU-accessible", self.name)))
    }

    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_range(offset, data.len() as u64)?;
        let ptr = self.mapped_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }
        Ok(())
    }

    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.check_range(offset, len)?;
        let ptr = self.mapped_ptr()?;
        let mut out = vec![0u8; len as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr.add(offset as usize), out.as_mut_ptr(), out.len());
        }
        Ok(out)
    }

    pub fn destroy(mut self, ctx: &GpuContext) {
        if let Some(allocation) = self.allocation.take() {
            ctx.free(allocation);
        }
        unsafe {
            ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
