/// Handle-addressed tables of live Vulkan objects
///
/// Shared between the device and the command lists it hands out. A handle that
/// no longer resolves (its slot was freed) yields `Error::InvalidResource`.

use ash::vk;
use prisma_render::prisma::device::{
    BufferHandle, DescriptorSetHandle, FenceHandle, FramebufferHandle, PipelineHandle,
    RenderTargetFormatHandle, ResourceKind, SemaphoreHandle, ShaderHandle, TextureHandle,
};
use prisma_render::prisma::{Error, Result};
use slotmap::{Key, SlotMap};

use crate::vulkan_buffer::Buffer;
use crate::vulkan_descriptor_set::DescriptorSet;
use crate::vulkan_pipeline::Pipeline;
use crate::vulkan_render_target::{Framebuffer, RenderTargetFormat};
use crate::vulkan_shader::Shader;
use crate::vulkan_texture::Texture;

#[derive(Default)]
pub(crate) struct ResourceTables {
    pub buffers: SlotMap<BufferHandle, Buffer>,
    pub textures: SlotMap<TextureHandle, Texture>,
    pub shaders: SlotMap<ShaderHandle, Shader>,
    pub pipelines: SlotMap<PipelineHandle, Pipeline>,
    pub descriptor_sets: SlotMap<DescriptorSetHandle, DescriptorSet>,
    pub formats: SlotMap<RenderTargetFormatHandle, RenderTargetFormat>,
    pub framebuffers: SlotMap<FramebufferHandle, Framebuffer>,
    pub fences: SlotMap<FenceHandle, vk::Fence>,
    pub semaphores: SlotMap<SemaphoreHandle, vk::Semaphore>,
}

/// Resolve `key` or report which kind of handle went stale
pub(crate) fn lookup<K: Key, V>(table: &SlotMap<K, V>, key: K, kind: ResourceKind) -> Result<&V> {
    table
        .get(key)
        .ok_or_else(|| Error::InvalidResource(format!("Stale or unknown {:?} handle {:?}", kind, key.data())))
}

impl ResourceTables {
    pub fn buffer(&self, handle: BufferHandle) -> Result<&Buffer> {
        lookup(&self.buffers, handle, ResourceKind::Buffer)
    }

    pub fn texture(&self, handle: TextureHandle) -> Result<&Texture> {
        lookup(&self.textures, handle, ResourceKind::Texture)
    }

    pub fn shader(&self, handle: ShaderHandle) -> Result<&Shader> {
        lookup(&self.shaders, handle, ResourceKind::Shader)
    }

    pub fn pipeline(&self, handle: PipelineHandle) -> Result<&Pipeline> {
        lookup(&self.pipelines, handle, ResourceKind::Pipeline)
    }

    pub fn descriptor_set(&self, handle: DescriptorSetHandle) -> Result<&DescriptorSet> {
        lookup(&self.descriptor_sets, handle, ResourceKind::DescriptorSet)
    }

    pub fn format(&self, handle: RenderTargetFormatHandle) -> Result<&RenderTargetFormat> {
        lookup(&self.formats, handle, ResourceKind::RenderTargetFormat)
    }

    pub fn framebuffer(&self, handle: FramebufferHandle) -> Result<&Framebuffer> {
        lookup(&self.framebuffers, handle, ResourceKind::Framebuffer)
    }

    pub fn fence(&self, handle: FenceHandle) -> Result<vk::Fence> {
        lookup(&self.fences, handle, ResourceKind::Fence).copied()
    }

    pub fn semaphore(&self, handle: SemaphoreHandle) -> Result<vk::Semaphore> {
        lookup(&self.semaphores, handle, ResourceKind::Semaphore).copied()
    }

    /// Live counts per kind, swapchain kinds excluded
    pub fn live_counts(&self) -> [(ResourceKind, usize); 9] {
        let swapchain_views = self.textures.values().filter(|t| t.is_swapchain_view()).count();
        [
            (ResourceKind::Buffer, self.buffers.len()),
            (ResourceKind::Texture, self.textures.len() - swapchain_views),
            (ResourceKind::Shader, self.shaders.len()),
            (ResourceKind::Pipeline, self.pipelines.len()),
            (ResourceKind::DescriptorSet, self.descriptor_sets.len()),
            (ResourceKind::RenderTargetFormat, self.formats.len()),
            (ResourceKind::Framebuffer, self.framebuffers.len()),
            (ResourceKind::Fence, self.fences.len()),
            (ResourceKind::Semaphore, self.semaphores.len()),
        ]
    }
}

#[cfg(test)]
#[path = "vulkan_resources_tests.rs"]
mod tests;
