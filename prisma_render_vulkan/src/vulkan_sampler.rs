/// SamplerCache - one VkSampler per `SamplerKind`, created on first use

use ash::vk;
use prisma_render::prisma::device::SamplerKind;
use prisma_render::prisma::Result;
use prisma_render::engine_err;
use rustc_hash::FxHashMap;

use crate::vulkan_context::{GpuContext, SOURCE};

#[derive(Default)]
pub(crate) struct SamplerCache {
    cache: FxHashMap<SamplerKind, vk::Sampler>,
}

impl SamplerCache {
    pub fn get(&mut self, ctx: &GpuContext, kind: SamplerKind) -> Result<vk::Sampler> {
        if let Some(&sampler) = self.cache.get(&kind) {
            return Ok(sampler);
        }
        let sampler = Self::create_vk_sampler(ctx, kind)?;
        self.cache.insert(kind, sampler);
        Ok(sampler)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Destroy every cached sampler (device must still be alive)
    pub fn shutdown(&mut self, ctx: &GpuContext) {
        for (_, sampler) in self.cache.drain() {
            unsafe { ctx.device.destroy_sampler(sampler, None) };
        }
    }

    fn create_vk_sampler(ctx: &GpuContext, kind: SamplerKind) -> Result<vk::Sampler> {
        let (filter, mipmap, address, anisotropy) = match kind {
            SamplerKind::LinearRepeat => (
                vk::Filter::LINEAR,
                vk::SamplerMipmapMode::LINEAR,
                vk::SamplerAddressMode::REPEAT,
                true,
            ),
            SamplerKind::LinearClamp => (
                vk::Filter::LINEAR,
                vk::SamplerMipmapMode::LINEAR,
                vk::SamplerAddressMode::CLAMP_TO_EDGE,
                true,
            ),
            // G-Buffer reads are 1:1 texel fetches
            SamplerKind::NearestClamp => (
                vk::Filter::NEAREST,
                vk::SamplerMipmapMode::NEAREST,
                vk::SamplerAddressMode::CLAMP_TO_EDGE,
                false,
            ),
        };

        let max_anisotropy = ctx.limits.max_sampler_anisotropy.min(16.0);
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap)
            .address_mode_u(address)
            .address_mode_v(address)
            .address_mode_w(address)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy { max_anisotropy } else { 1.0 })
            .unnormalized_coordinates(false);

        unsafe {
            ctx.device
                .create_sampler(&create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create {:?} sampler: {:?}", kind, e))
        }
    }
}
