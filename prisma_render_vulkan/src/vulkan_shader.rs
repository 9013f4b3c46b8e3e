/// Shader - SPIR-V module plus the interface reflected from it with spirq
///
/// Reflection lets pipeline creation catch a `PipelineDesc` that disagrees
/// with what the shader actually declares before the driver does.

use ash::vk;
use prisma_render::prisma::device::{DescriptorKind, ShaderDesc, ShaderStage};
use prisma_render::prisma::{Error, Result};
use prisma_render::{engine_bail_warn, engine_err, engine_warn};
use std::ffi::CString;
use std::io::Cursor;

use crate::vulkan_context::{GpuContext, SOURCE};

/// Descriptor binding declared by a shader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReflectedBinding {
    pub set: u32,
    pub binding: u32,
    /// None for descriptor types the renderer never binds
    pub kind: Option<DescriptorKind>,
}

/// Interface of one shader entry point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ShaderInterface {
    pub bindings: Vec<ReflectedBinding>,
    /// Size in bytes of the push-constant block, if any
    pub push_constant_size: Option<u32>,
}

pub(crate) struct Shader {
    pub name: String,
    pub module: vk::ShaderModule,
    pub stage: ShaderStage,
    pub entry_point: CString,
    pub interface: ShaderInterface,
}

fn descriptor_kind(desc_ty: &spirq::ty::DescriptorType) -> Option<DescriptorKind> {
    use spirq::ty::DescriptorType;
    match desc_ty {
        DescriptorType::UniformBuffer() => Some(DescriptorKind::UniformBuffer),
        DescriptorType::CombinedImageSampler() => Some(DescriptorKind::CombinedImageSampler),
        _ => None,
    }
}

/// Reflect descriptor bindings and the push-constant block of `entry_point`
pub(crate) fn reflect_shader(code: &[u32], entry_point: &str) -> Result<ShaderInterface> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| engine_err!(SOURCE, "SPIR-V reflection failed: {:?}", e))?;

    let mut interface = ShaderInterface::default();
    for ep in entry_points.iter().filter(|ep| ep.name == entry_point) {
        for var in ep.vars.iter() {
            match var {
                spirq::var::Variable::Descriptor { desc_bind, desc_ty, .. } => {
                    interface.bindings.push(ReflectedBinding {
                        set: desc_bind.set(),
                        binding: desc_bind.bind(),
                        kind: descriptor_kind(desc_ty),
                    });
                }
                spirq::var::Variable::PushConstant { ty, .. } => {
                    interface.push_constant_size = ty.nbyte().map(|size| size as u32);
                }
                _ => {}
            }
        }
    }
    Ok(interface)
}

impl Shader {
    pub fn create(ctx: &GpuContext, desc: &ShaderDesc) -> Result<Self> {
        if desc.code.len() % 4 != 0 {
            engine_bail_warn!(SOURCE,
                "Shader '{}' code is not 4-byte aligned ({} bytes)", desc.name, desc.code.len());
        }
        // read_spv copies into u32 words, so the byte vector's alignment does not matter
        let words = ash::util::read_spv(&mut Cursor::new(&desc.code))
            .map_err(|e| engine_err!(SOURCE, "Shader '{}' is not valid SPIR-V: {}", desc.name, e))?;

        let entry_point = CString::new(desc.entry_point.as_str())
            .map_err(|_| Error::InvalidResource(format!(
                "Shader '{}' entry point contains a NUL byte", desc.name)))?;

        let interface = match reflect_shader(&words, &desc.entry_point) {
            Ok(interface) => interface,
            Err(_) => {
                engine_warn!(SOURCE, "Shader '{}' could not be reflected, skipping interface checks", desc.name);
                ShaderInterface::default()
            }
        };

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { ctx.device.create_shader_module(&create_info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create shader module '{}': {:?}", desc.name, e))?;

        Ok(Self {
            name: desc.name.clone(),
            module,
            stage: desc.stage,
            entry_point,
            interface,
        })
    }

    pub fn destroy(self, ctx: &GpuContext) {
        unsafe { ctx.device.destroy_shader_module(self.module, None) };
    }
}
