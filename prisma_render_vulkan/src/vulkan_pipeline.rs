/// Pipeline - graphics pipeline, its layout and the named constant slots
///
/// Named constant slots map onto a single push-constant range covering every
/// slot, visible to the union of the slots' stages. Vulkan forbids two ranges
/// naming the same stage, so one merged range is the only layout that accepts
/// any mix of per-stage slots.

use ash::vk;
use prisma_render::prisma::device::{ConstantSlot, PipelineDesc, ShaderStage};
use prisma_render::prisma::{Error, Result};
use prisma_render::{engine_err, engine_error};

use crate::vulkan_context::{GpuContext, SOURCE};
use crate::vulkan_format::{
    blend_attachment, compare_op_to_vk, cull_mode_to_vk, shader_stage_to_vk, shader_stages_to_vk,
    topology_to_vk, vertex_format_to_vk,
};
use crate::vulkan_shader::Shader;

pub(crate) struct Pipeline {
    pub name: String,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub constants: Vec<ConstantSlot>,
    /// Stage flags of the merged push-constant range
    pub push_stages: vk::ShaderStageFlags,
    pub set_count: u32,
}

/// Merge constant slots into one push-constant range
///
/// Slots must be 4-byte aligned, must not overlap and must fit `max_size`.
pub(crate) fn push_constant_range(
    name: &str,
    constants: &[ConstantSlot],
    max_size: u32,
) -> Result<Option<vk::PushConstantRange>> {
    if constants.is_empty() {
        return Ok(None);
    }

    let mut sorted: Vec<&ConstantSlot> = constants.iter().collect();
    sorted.sort_by_key(|slot| slot.offset);

    let mut stage_flags = vk::ShaderStageFlags::empty();
    let mut end = 0u32;
    for slot in &sorted {
        if slot.offset % 4 != 0 || slot.size % 4 != 0 || slot.size == 0 {
            return Err(Error::InitializationFailed(format!(
                "Pipeline '{}': constant slot '{}' must be a non-empty multiple of 4 bytes at a 4-byte offset",
                name, slot.name
            )));
        }
        if slot.offset < end {
            return Err(Error::InitializationFailed(format!(
                "Pipeline '{}': constant slot '{}' overlaps the previous slot",
                name, slot.name
            )));
        }
        end = slot.offset + slot.size;
        stage_flags |= shader_stages_to_vk(slot.stages);
    }

    if end > max_size {
        return Err(Error::InitializationFailed(format!(
            "Pipeline '{}': constants need {} bytes, device allows {}",
            name, end, max_size
        )));
    }

    Ok(Some(vk::PushConstantRange { stage_flags, offset: 0, size: end }))
}

/// Compare what the shaders declare against the pipeline description.
///
/// A shader reading a descriptor or constant bytes the pipeline does not
/// provide is fatal. Unreflected shaders pass trivially.
pub(crate) fn check_interface(desc: &PipelineDesc, shaders: [&Shader; 2]) -> Result<()> {
    let declared_constants: u32 = desc.constants.iter().map(|c| c.offset + c.size).max().unwrap_or(0);

    for shader in shaders {
        for binding in &shader.interface.bindings {
            let slot = desc
                .descriptor_layouts
                .get(binding.set as usize)
                .and_then(|layout| layout.slots.iter().find(|s| s.binding == binding.binding));
            match slot {
                None => {
                    return Err(engine_err!(SOURCE,
                        "Pipeline '{}': shader '{}' reads set {} binding {} which no descriptor layout declares",
                        desc.name, shader.name, binding.set, binding.binding));
                }
                Some(slot) if binding.kind.is_some_and(|kind| kind != slot.kind) => {
                    return Err(engine_err!(SOURCE,
                        "Pipeline '{}': shader '{}' set {} binding {} is {:?}, layout declares {:?}",
                        desc.name, shader.name, binding.set, binding.binding, binding.kind, slot.kind));
                }
                Some(_) => {}
            }
        }

        if let Some(size) = shader.interface.push_constant_size {
            if size > declared_constants {
                return Err(engine_err!(SOURCE,
                    "Pipeline '{}': shader '{}' uses {} bytes of push constants, slots cover {}",
                    desc.name, shader.name, size, declared_constants));
            }
        }
    }
    Ok(())
}

impl Pipeline {
    pub fn create(
        ctx: &GpuContext,
        desc: &PipelineDesc,
        vertex: &Shader,
        fragment: &Shader,
        render_pass: vk::RenderPass,
        color_attachment_count: usize,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Self> {
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err(Error::InitializationFailed(format!(
                "Pipeline '{}': shader stages do not match their slots",
                desc.name
            )));
        }
        check_interface(desc, [vertex, fragment])?;
        let push_range = push_constant_range(&desc.name, &desc.constants, ctx.limits.max_push_constants_size)?;

        unsafe {
            let shader_stages = [
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader_stage_to_vk(vertex.stage))
                    .module(vertex.module)
                    .name(&vertex.entry_point),
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader_stage_to_vk(fragment.stage))
                    .module(fragment.module)
                    .name(&fragment.entry_point),
            ];

            // Single interleaved stream at binding 0, or no vertex input at all
            let vertex_bindings: Vec<vk::VertexInputBindingDescription> = if desc.vertex_layout.is_empty() {
                Vec::new()
            } else {
                vec![vk::VertexInputBindingDescription {
                    binding: 0,
                    stride: desc.vertex_layout.stride,
                    input_rate: vk::VertexInputRate::VERTEX,
                }]
            };
            let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
                .vertex_layout
                .attributes
                .iter()
                .map(|attribute| vk::VertexInputAttributeDescription {
                    location: attribute.location,
                    binding: 0,
                    format: vertex_format_to_vk(attribute.format),
                    offset: attribute.offset,
                })
                .collect();
            let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
                .vertex_binding_descriptions(&vertex_bindings)
                .vertex_attribute_descriptions(&vertex_attributes);

            let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(topology_to_vk(desc.topology))
                .primitive_restart_enable(false);

            // Viewport and scissor are dynamic
            let viewport_state = vk::PipelineViewportStateCreateInfo::default()
                .viewport_count(1)
                .scissor_count(1);

            let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(cull_mode_to_vk(desc.cull_mode))
                .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
                .depth_bias_enable(false);

            let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(desc.depth.test)
                .depth_write_enable(desc.depth.write)
                .depth_compare_op(compare_op_to_vk(desc.depth.compare))
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false);

            let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
                .sample_shading_enable(false)
                .rasterization_samples(vk::SampleCountFlags::TYPE_1);

            // Every color attachment of the target (the G-Buffer has several) shares the blend mode
            let blend_attachments = vec![blend_attachment(desc.blend); color_attachment_count];
            let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
                .logic_op_enable(false)
                .attachments(&blend_attachments);

            let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
            let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

            let push_ranges: Vec<vk::PushConstantRange> = push_range.into_iter().collect();
            let layout_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(set_layouts)
                .push_constant_ranges(&push_ranges);
            let layout = ctx.device.create_pipeline_layout(&layout_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create layout of pipeline '{}': {:?}", desc.name, e))?;

            let create_info = vk::GraphicsPipelineCreateInfo::default()
                .stages(&shader_stages)
                .vertex_input_state(&vertex_input_state)
                .input_assembly_state(&input_assembly_state)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterization_state)
                .depth_stencil_state(&depth_stencil_state)
                .multisample_state(&multisample_state)
                .color_blend_state(&color_blend_state)
                .dynamic_state(&dynamic_state)
                .layout(layout)
                .render_pass(render_pass)
                .subpass(0);

            let pipelines = match ctx.device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None) {
                Ok(pipelines) => pipelines,
                Err((_, e)) => {
                    ctx.device.destroy_pipeline_layout(layout, None);
                    engine_error!(SOURCE, "Failed to create pipeline '{}': {:?}", desc.name, e);
                    return Err(Error::InitializationFailed(format!(
                        "Failed to create pipeline '{}': {:?}", desc.name, e)));
                }
            };
            let pipeline = pipelines.into_iter().next().ok_or_else(|| {
                Error::InitializationFailed(format!("Driver returned no pipeline for '{}'", desc.name))
            })?;

            Ok(Self {
                name: desc.name.clone(),
                pipeline,
                layout,
                constants: desc.constants.clone(),
                push_stages: push_range.map(|r| r.stage_flags).unwrap_or_default(),
                set_count: set_layouts.len() as u32,
            })
        }
    }

    /// Constant slot by name
    pub fn constant(&self, name: &str) -> Option<&ConstantSlot> {
        self.constants.iter().find(|slot| slot.name == name)
    }

    pub fn destroy(self, ctx: &GpuContext) {
        unsafe {
            ctx.device.destroy_pipeline(self.pipeline, None);
            ctx.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
