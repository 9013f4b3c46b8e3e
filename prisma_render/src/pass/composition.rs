/// Composition pass - post effects into the backbuffer
///
/// Resolves the lit color target through a fixed chain of independently
/// toggleable effects: tone mapping and gamma in one step, then
/// anti-aliasing, bloom, SSR, SSAO and depth of field. The chain runs in a
/// single full-screen draw; the enabled stages and every effect parameter
/// travel in the "Composition" constant block.

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::error::{Error, Result};
use crate::gbuffer::GBufferSlot;
use crate::graphics_device::{
    BlendMode, CommandList, ConstantSlot, CullMode, DepthState, DescriptorBinding, DescriptorKind,
    DescriptorLayout, DescriptorResource, DescriptorSetDesc, DescriptorSetHandle, DescriptorSlot,
    GraphicsDevice, PipelineDesc, PipelineHandle, PrimitiveTopology, SamplerKind, ShaderStages,
    TextureHandle, VertexLayout,
};
use crate::resource::ShaderLibrary;
use crate::engine_debug;

use super::{
    create_pipeline, log_not_initialized, report_record, FrameState, Pass, PassSetup, PassStats,
    PassTarget, SHADER_COMPOSITION_FRAG, SHADER_FULLSCREEN_VERT,
};

const SOURCE: &str = "prisma::CompositionPass";

pub const COMPOSITION_PASS_PRIORITY: i32 = 600;

bitflags! {
    /// Post effects that can be toggled on the composition pass
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PostEffects: u32 {
        const TONE_MAPPING = 1 << 0;
        const GAMMA = 1 << 1;
        const FXAA = 1 << 2;
        const SMAA = 1 << 3;
        const BLOOM = 1 << 4;
        const SSR = 1 << 5;
        const SSAO = 1 << 6;
        const DEPTH_OF_FIELD = 1 << 7;
    }
}

/// One stage of the resolved effect chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PostEffect {
    /// Tone mapping and gamma correction resolved together
    ToneMapGamma = 1,
    Fxaa = 2,
    Smaa = 3,
    Bloom = 4,
    Ssr = 5,
    Ssao = 6,
    DepthOfField = 7,
}

/// Longest possible chain
pub const MAX_EFFECT_STAGES: usize = 6;

/// Effect toggles and parameters
///
/// Parameters are independent of the toggles: they can be tuned while the
/// effect is off and take effect when it is enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositionSettings {
    pub effects: PostEffects,
    pub exposure: f32,
    pub gamma: f32,
    /// FXAA minimum edge threshold
    pub fxaa_edge_threshold_min: f32,
    /// FXAA relative edge threshold
    pub fxaa_edge_threshold: f32,
    pub ssao_radius: f32,
    pub ssao_bias: f32,
    pub ssao_power: f32,
    pub bloom_threshold: f32,
    pub bloom_intensity: f32,
    pub dof_focus_distance: f32,
    pub dof_focus_range: f32,
}

impl Default for CompositionSettings {
    fn default() -> Self {
        Self {
            effects: PostEffects::TONE_MAPPING | PostEffects::GAMMA,
            exposure: 1.0,
            gamma: 2.2,
            fxaa_edge_threshold_min: 0.0312,
            fxaa_edge_threshold: 0.125,
            ssao_radius: 0.5,
            ssao_bias: 0.025,
            ssao_power: 2.0,
            bloom_threshold: 1.0,
            bloom_intensity: 0.5,
            dof_focus_distance: 10.0,
            dof_focus_range: 5.0,
        }
    }
}

impl CompositionSettings {
    pub fn is_enabled(&self, effects: PostEffects) -> bool {
        self.effects.contains(effects)
    }

    pub fn enable(&mut self, effects: PostEffects) {
        self.effects.insert(effects);
    }

    pub fn disable(&mut self, effects: PostEffects) {
        self.effects.remove(effects);
    }

    /// Enabled effects in execution order. SMAA wins when both
    /// anti-aliasing modes are set.
    pub fn effect_chain(&self) -> Vec<PostEffect> {
        let e = self.effects;
        let mut chain = Vec::with_capacity(MAX_EFFECT_STAGES);
        if e.intersects(PostEffects::TONE_MAPPING | PostEffects::GAMMA) {
            chain.push(PostEffect::ToneMapGamma);
        }
        if e.contains(PostEffects::SMAA) {
            chain.push(PostEffect::Smaa);
        } else if e.contains(PostEffects::FXAA) {
            chain.push(PostEffect::Fxaa);
        }
        if e.contains(PostEffects::BLOOM) {
            chain.push(PostEffect::Bloom);
        }
        if e.contains(PostEffects::SSR) {
            chain.push(PostEffect::Ssr);
        }
        if e.contains(PostEffects::SSAO) {
            chain.push(PostEffect::Ssao);
        }
        if e.contains(PostEffects::DEPTH_OF_FIELD) {
            chain.push(PostEffect::DepthOfField);
        }
        chain
    }

    pub fn uniforms(&self) -> CompositionUniforms {
        let chain = self.effect_chain();
        let mut stages = [0u32; 8];
        for (slot, effect) in stages.iter_mut().zip(&chain) {
            *slot = *effect as u32;
        }
        // Tone mapping and gamma share a stage; the bits tell the shader which half runs
        let mut effects = self.effects;
        if effects.contains(PostEffects::SMAA) {
            effects.remove(PostEffects::FXAA);
        }
        CompositionUniforms {
            exposure_gamma_fxaa: [
                self.exposure,
                self.gamma,
                self.fxaa_edge_threshold_min,
                self.fxaa_edge_threshold,
            ],
            ssao_bloom: [self.ssao_radius, self.ssao_bias, self.ssao_power, self.bloom_threshold],
            bloom_dof: [self.bloom_intensity, self.dof_focus_distance, self.dof_focus_range, 0.0],
            effects: effects.bits(),
            stage_count: chain.len() as u32,
            _pad: [0; 2],
            stages,
        }
    }
}

/// "Composition" constant block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompositionUniforms {
    pub exposure_gamma_fxaa: [f32; 4],
    pub ssao_bloom: [f32; 4],
    pub bloom_dof: [f32; 4],
    pub effects: u32,
    pub stage_count: u32,
    pub _pad: [u32; 2],
    pub stages: [u32; 8],
}

struct CompositionState {
    pipeline: PipelineHandle,
    descriptor_set: DescriptorSetHandle,
}

pub struct CompositionPass {
    library: Arc<dyn ShaderLibrary>,
    priority: i32,
    settings: CompositionSettings,
    state: Option<CompositionState>,
    stats: PassStats,
}

/// Lit color at 0, G-Buffer position and normal at 1 and 2
fn composition_layout() -> DescriptorLayout {
    DescriptorLayout::new(
        (0..3)
            .map(|binding| DescriptorSlot {
                binding,
                kind: DescriptorKind::CombinedImageSampler,
                stages: ShaderStages::FRAGMENT,
            })
            .collect(),
    )
}

impl CompositionPass {
    pub fn new(library: Arc<dyn ShaderLibrary>) -> Self {
        Self::with_settings(library, CompositionSettings::default())
    }

    pub fn with_settings(library: Arc<dyn ShaderLibrary>, settings: CompositionSettings) -> Self {
        Self {
            library,
            priority: COMPOSITION_PASS_PRIORITY,
            settings,
            state: None,
            stats: PassStats::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn settings(&self) -> &CompositionSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut CompositionSettings {
        &mut self.settings
    }

    pub fn set_settings(&mut self, settings: CompositionSettings) {
        self.settings = settings;
    }

    pub fn effect_chain(&self) -> Vec<PostEffect> {
        self.settings.effect_chain()
    }

    fn create_state(
        &self,
        device: &mut dyn GraphicsDevice,
        setup: &PassSetup,
    ) -> Result<CompositionState> {
        let lit_color = setup.lit_color.ok_or_else(|| {
            Error::InitializationFailed("composition pass needs the lit color target".to_string())
        })?;
        let gbuffer = setup.gbuffer.ok_or_else(|| {
            Error::InitializationFailed("composition pass needs a G-Buffer".to_string())
        })?;
        let inputs: [TextureHandle; 3] = [
            lit_color,
            gbuffer.texture(GBufferSlot::Position),
            gbuffer.texture(GBufferSlot::Normal),
        ];
        let descriptor_set = device.create_descriptor_set(&DescriptorSetDesc {
            name: "composition_set".to_string(),
            layout: composition_layout(),
            bindings: inputs
                .iter()
                .enumerate()
                .map(|(i, &texture)| DescriptorBinding {
                    binding: i as u32,
                    resource: DescriptorResource::Texture {
                        texture,
                        sampler: SamplerKind::LinearClamp,
                    },
                })
                .collect(),
        })?;

        let pipeline = create_pipeline(
            device,
            self.library.as_ref(),
            SHADER_FULLSCREEN_VERT,
            SHADER_COMPOSITION_FRAG,
            |vs, fs| PipelineDesc {
                name: "composition".to_string(),
                vertex_shader: vs,
                fragment_shader: fs,
                vertex_layout: VertexLayout::empty(),
                topology: PrimitiveTopology::TriangleList,
                cull_mode: CullMode::None,
                depth: DepthState::disabled(),
                blend: BlendMode::Opaque,
                render_target_format: setup.format,
                descriptor_layouts: vec![composition_layout()],
                constants: vec![ConstantSlot::new(
                    "Composition",
                    0,
                    std::mem::size_of::<CompositionUniforms>() as u32,
                    ShaderStages::FRAGMENT,
                )],
            },
        );
        match pipeline {
            Ok(pipeline) => Ok(CompositionState { pipeline, descriptor_set }),
            Err(e) => {
                device.destroy_descriptor_set(descriptor_set);
                Err(e)
            }
        }
    }

    fn try_record(&mut self, cmd: &mut dyn CommandList, frame: &FrameState) -> Result<()> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        let uniforms = self.settings.uniforms();
        cmd.set_viewport(frame.viewport)?;
        cmd.set_scissor(frame.scissor)?;
        cmd.bind_pipeline(state.pipeline)?;
        cmd.bind_descriptor_set(0, state.descriptor_set)?;
        cmd.set_constant_buffer("Composition", bytemuck::bytes_of(&uniforms))?;
        cmd.draw(3, 0)?;
        self.stats.draw_calls = 1;
        self.stats.triangles = 1;
        Ok(())
    }
}

impl Pass for CompositionPass {
    fn name(&self) -> &str {
        "Composition"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn target(&self) -> PassTarget {
        PassTarget::Backbuffer
    }

    fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    fn initialize(&mut self, device: &mut dyn GraphicsDevice, setup: &PassSetup) -> Result<()> {
        self.cleanup(device);
        self.state = Some(self.create_state(device, setup)?);
        engine_debug!(SOURCE, "Initialized, chain {:?}", self.settings.effect_chain());
        Ok(())
    }

    fn record(&mut self, cmd: &mut dyn CommandList, frame: &FrameState) {
        self.stats = PassStats::default();
        if self.state.is_none() {
            log_not_initialized(SOURCE, "Composition");
            return;
        }
        let result = self.try_record(cmd, frame);
        report_record(SOURCE, "Composition", result);
    }

    fn cleanup(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(state) = self.state.take() {
            device.destroy_pipeline(state.pipeline);
            device.destroy_descriptor_set(state.descriptor_set);
        }
    }

    fn stats(&self) -> PassStats {
        self.stats
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "composition_tests.rs"]
mod tests;
