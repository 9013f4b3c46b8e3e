/// Descriptor set allocation
///
/// Set layouts are cached by `DescriptorLayout`, so a pipeline and every set
/// created against the same layout description share one VkDescriptorSetLayout
/// and are always compatible. Pools grow when exhausted.

use ash::vk;
use prisma_render::prisma::device::DescriptorLayout;
use prisma_render::prisma::{Error, Result};
use prisma_render::{engine_debug, engine_err};
use rustc_hash::FxHashMap;

use crate::vulkan_context::{GpuContext, SOURCE};
use crate::vulkan_format::{descriptor_kind_to_vk, shader_stages_to_vk};

const SETS_PER_POOL: u32 = 1024;

pub(crate) struct DescriptorSet {
    pub name: String,
    pub set: vk::DescriptorSet,
    pool: vk::DescriptorPool,
}

#[derive(Default)]
pub(crate) struct DescriptorAllocator {
    layouts: FxHashMap<DescriptorLayout, vk::DescriptorSetLayout>,
    pools: Vec<vk::DescriptorPool>,
}

impl DescriptorAllocator {
    fn create_pool(ctx: &GpuContext) -> Result<vk::DescriptorPool> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: SETS_PER_POOL * 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: SETS_PER_POOL,
            },
        ];
        // Individual sets are freed when their owner is released
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(&pool_sizes)
            .max_sets(SETS_PER_POOL);

        unsafe {
            ctx.device.create_descriptor_pool(&info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create descriptor pool: {:?}", e))
        }
    }

    /// Cached set layout for `layout`
    pub fn set_layout(&mut self, ctx: &GpuContext, layout: &DescriptorLayout) -> Result<vk::DescriptorSetLayout> {
        if let Some(&vk_layout) = self.layouts.get(layout) {
            return Ok(vk_layout);
        }

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = layout
            .slots
            .iter()
            .map(|slot| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(slot.binding)
                    .descriptor_type(descriptor_kind_to_vk(slot.kind))
                    .descriptor_count(1)
                    .stage_flags(shader_stages_to_vk(slot.stages))
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let vk_layout = unsafe { ctx.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create descriptor set layout: {:?}", e))?;
        self.layouts.insert(layout.clone(), vk_layout);
        Ok(vk_layout)
    }

    /// Allocate one set, growing the pool list when every pool is full
    pub fn allocate(&mut self, ctx: &GpuContext, name: &str, layout: &DescriptorLayout) -> Result<DescriptorSet> {
        let vk_layout = self.set_layout(ctx, layout)?;
        let layouts = [vk_layout];

        if let Some(&pool) = self.pools.last() {
            match Self::allocate_from(ctx, pool, &layouts) {
                Ok(set) => return Ok(DescriptorSet { name: name.to_string(), set, pool }),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {}
                Err(e) => return Err(engine_err!(SOURCE, "Failed to allocate descriptor set '{}': {:?}", name, e)),
            }
        }

        let pool = Self::create_pool(ctx)?;
        self.pools.push(pool);
        engine_debug!(SOURCE, "Descriptor pool #{} created", self.pools.len());

        let set = Self::allocate_from(ctx, pool, &layouts)
            .map_err(|e| engine_err!(SOURCE, "Failed to allocate descriptor set '{}' from a fresh pool: {:?}", name, e))?;
        Ok(DescriptorSet { name: name.to_string(), set, pool })
    }

    fn allocate_from(
        ctx: &GpuContext,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> std::result::Result<vk::DescriptorSet, vk::Result> {
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(layouts);
        let sets = unsafe { ctx.device.allocate_descriptor_sets(&info)? };
        sets.into_iter().next().ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
    }

    pub fn free(&self, ctx: &GpuContext, set: DescriptorSet) {
        unsafe {
            let _ = ctx.device.free_descriptor_sets(set.pool, &[set.set]);
        }
    }

    pub fn shutdown(&mut self, ctx: &GpuContext) {
        unsafe {
            for pool in self.pools.drain(..) {
                ctx.device.destroy_descriptor_pool(pool, None);
            }
            for (_, layout) in self.layouts.drain() {
                ctx.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }
}

/// Reject sets whose bindings disagree with their layout
pub(crate) fn validate_bindings(
    name: &str,
    layout: &DescriptorLayout,
    bindings: &[prisma_render::prisma::device::DescriptorBinding],
) -> Result<()> {
    if layout.matches(bindings) {
        Ok(())
    } else {
        Err(Error::InvalidResource(format!(
            "Descriptor set '{}' bindings do not match its layout",
            name
        )))
    }
}
