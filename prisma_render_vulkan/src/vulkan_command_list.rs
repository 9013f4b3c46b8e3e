/// VulkanCommandList - Vulkan implementation of the `CommandList` trait

use ash::vk;
use prisma_render::prisma::device::{
    BufferHandle, ClearValue, CommandList, ConstantSlot, DescriptorSetHandle, FramebufferHandle,
    IndexFormat, PipelineHandle, Rect2D, RenderTargetFormatHandle, Viewport,
};
use prisma_render::prisma::{Error, Result};
use prisma_render::engine_err;
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::vulkan_context::{GpuContext, SOURCE};
use crate::vulkan_format::{clear_value_to_vk, index_format_to_vk};
use crate::vulkan_resources::ResourceTables;

/// Pipeline state needed after `bind_pipeline` (layout for sets and constants)
#[derive(Debug, Clone)]
struct BoundPipeline {
    name: String,
    layout: vk::PipelineLayout,
    constants: Vec<ConstantSlot>,
    push_stages: vk::ShaderStageFlags,
    set_count: u32,
}

/// Byte offset of a named constant write, after checking it fits its slot
pub(crate) fn constant_offset(pipeline: &str, constants: &[ConstantSlot], name: &str, len: usize) -> Result<u32> {
    let slot = constants.iter().find(|slot| slot.name == name).ok_or_else(|| {
        Error::InvalidResource(format!("Pipeline '{}' has no constant slot '{}'", pipeline, name))
    })?;
    if len == 0 || len % 4 != 0 || len > slot.size as usize {
        return Err(Error::InvalidResource(format!(
            "Constant '{}' of pipeline '{}': {} bytes do not fit the {}-byte slot",
            name, pipeline, len, slot.size
        )));
    }
    Ok(slot.offset)
}

/// Records into one primary command buffer from its own pool
///
/// Handles are resolved against the device's resource tables at record time,
/// so a stale handle fails the call instead of recording garbage.
pub struct VulkanCommandList {
    ctx: Arc<GpuContext>,
    resources: Arc<Mutex<ResourceTables>>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    is_recording: bool,
    in_render_pass: bool,
    bound_pipeline: Option<BoundPipeline>,
}

impl VulkanCommandList {
    pub(crate) fn new(ctx: Arc<GpuContext>, resources: Arc<Mutex<ResourceTables>>) -> Result<Self> {
        unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let command_pool = ctx.device.create_command_pool(&pool_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create command pool: {:?}", e))?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = match ctx.device.allocate_command_buffers(&allocate_info) {
                Ok(buffers) => buffers[0],
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    return Err(engine_err!(SOURCE, "Failed to allocate command buffer: {:?}", e));
                }
            };

            Ok(Self {
                ctx,
                resources,
                command_pool,
                command_buffer,
                is_recording: false,
                in_render_pass: false,
                bound_pipeline: None,
            })
        }
    }

    /// Underlying Vulkan command buffer
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub(crate) fn is_recording(&self) -> bool {
        self.is_recording
    }

    fn tables(&self) -> Result<MutexGuard<'_, ResourceTables>> {
        self.resources
            .lock()
            .map_err(|_| engine_err!(SOURCE, "Resource table lock poisoned"))
    }

    fn require_recording(&self) -> Result<()> {
        if self.is_recording {
            Ok(())
        } else {
            Err(Error::InvalidState("Command list is not recording".to_string()))
        }
    }

    fn require_render_pass(&self) -> Result<()> {
        self.require_recording()?;
        if self.in_render_pass {
            Ok(())
        } else {
            Err(Error::InvalidState("No render pass is active".to_string()))
        }
    }

    fn require_pipeline(&self) -> Result<&BoundPipeline> {
        self.bound_pipeline
            .as_ref()
            .ok_or_else(|| Error::InvalidState("No pipeline is bound".to_string()))
    }
}

impl CommandList for VulkanCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(Error::InvalidState("Command list is already recording".to_string()));
        }
        unsafe {
            self.ctx.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| engine_err!(SOURCE, "Failed to reset command buffer: {:?}", e))?;
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.ctx.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| engine_err!(SOURCE, "Failed to begin command buffer: {:?}", e))?;
        }
        self.is_recording = true;
        self.in_render_pass = false;
        self.bound_pipeline = None;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.require_recording()?;
        if self.in_render_pass {
            return Err(Error::InvalidState("Cannot end a command list inside a render pass".to_string()));
        }
        unsafe {
            self.ctx.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| engine_err!(SOURCE, "Failed to end command buffer: {:?}", e))?;
        }
        self.is_recording = false;
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        format: RenderTargetFormatHandle,
        framebuffer: FramebufferHandle,
        area: Rect2D,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        self.require_recording()?;
        if self.in_render_pass {
            return Err(Error::InvalidState("A render pass is already active".to_string()));
        }

        let tables = self.tables()?;
        let format = tables.format(format)?;
        let framebuffer = tables.framebuffer(framebuffer)?;
        if framebuffer.render_pass != format.render_pass {
            return Err(Error::InvalidResource(format!(
                "Framebuffer '{}' was not created against format '{}'",
                framebuffer.name, format.name
            )));
        }
        if clear_values.len() != format.attachment_count() {
            return Err(Error::InvalidResource(format!(
                "Render pass '{}' takes {} clear values, got {}",
                format.name,
                format.attachment_count(),
                clear_values.len()
            )));
        }

        let vk_clear_values: Vec<vk::ClearValue> = clear_values.iter().copied().map(clear_value_to_vk).collect();
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(format.render_pass)
            .framebuffer(framebuffer.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: area.x, y: area.y },
                extent: vk::Extent2D { width: area.width, height: area.height },
            })
            .clear_values(&vk_clear_values);

        unsafe {
            self.ctx.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
        }
        drop(tables);
        self.in_render_pass = true;
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.require_render_pass()?;
        unsafe { self.ctx.device.cmd_end_render_pass(self.command_buffer) };
        self.in_render_pass = false;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.require_recording()?;
        let vk_viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.ctx.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]) };
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.require_recording()?;
        let vk_scissor = vk::Rect2D {
            offset: vk::Offset2D { x: scissor.x, y: scissor.y },
            extent: vk::Extent2D { width: scissor.width, height: scissor.height },
        };
        unsafe { self.ctx.device.cmd_set_scissor(self.command_buffer, 0, &[vk_scissor]) };
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> Result<()> {
        self.require_render_pass()?;
        let bound = {
            let tables = self.tables()?;
            let pipeline = tables.pipeline(pipeline)?;
            unsafe {
                self.ctx.device.cmd_bind_pipeline(
                    self.command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline.pipeline,
                );
            }
            BoundPipeline {
                name: pipeline.name.clone(),
                layout: pipeline.layout,
                constants: pipeline.constants.clone(),
                push_stages: pipeline.push_stages,
                set_count: pipeline.set_count,
            }
        };
        self.bound_pipeline = Some(bound);
        Ok(())
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: DescriptorSetHandle) -> Result<()> {
        self.require_render_pass()?;
        let bound = self.require_pipeline()?;
        if set_index >= bound.set_count {
            return Err(Error::InvalidResource(format!(
                "Pipeline '{}' has {} descriptor sets, cannot bind set {}",
                bound.name, bound.set_count, set_index
            )));
        }
        let tables = self.tables()?;
        let set = tables.descriptor_set(set)?;
        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                bound.layout,
                set_index,
                &[set.set],
                &[],
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, offset: u64) -> Result<()> {
        self.require_recording()?;
        let tables = self.tables()?;
        let buffer = tables.buffer(buffer)?;
        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer.buffer], &[offset]);
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) -> Result<()> {
        self.require_recording()?;
        let tables = self.tables()?;
        let buffer = tables.buffer(buffer)?;
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(
                self.command_buffer,
                buffer.buffer,
                offset,
                index_format_to_vk(format),
            );
        }
        Ok(())
    }

    fn set_constant_buffer(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.require_recording()?;
        let bound = self.require_pipeline()?;
        let offset = constant_offset(&bound.name, &bound.constants, name, data.len())?;
        unsafe {
            self.ctx.device.cmd_push_constants(
                self.command_buffer,
                bound.layout,
                bound.push_stages,
                offset,
                data,
            );
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.require_render_pass()?;
        self.require_pipeline()?;
        unsafe { self.ctx.device.cmd_draw(self.command_buffer, vertex_count, 1, first_vertex, 0) };
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        self.require_render_pass()?;
        self.require_pipeline()?;
        unsafe {
            self.ctx.device.cmd_draw_indexed(self.command_buffer, index_count, 1, first_index, vertex_offset, 0);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        // Frees the command buffer with it; the frame loop waits on its fence first
        unsafe { self.ctx.device.destroy_command_pool(self.command_pool, None) };
    }
}

#[cfg(test)]
#[path = "vulkan_command_list_tests.rs"]
mod tests;
