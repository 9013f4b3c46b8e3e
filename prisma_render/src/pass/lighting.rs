/// Deferred lighting pass
///
/// Samples the G-Buffer and resolves lighting into the lit color target
/// with one full-screen draw per light. The first draw writes ambient plus
/// the first light with opaque blending so it replaces the background where
/// geometry exists (the shader discards texels without geometry); later
/// lights accumulate additively. IBL maps are optional: without them the
/// image-based terms are skipped.

use std::any::Any;
use std::sync::Arc;

use glam::Vec3;

use crate::error::{Error, Result};
use crate::gbuffer::{GBuffer, GBufferSlot};
use crate::graphics_device::{
    BlendMode, CommandList, ConstantSlot, CullMode, DepthState, DescriptorBinding, DescriptorKind,
    DescriptorLayout, DescriptorResource, DescriptorSetDesc, DescriptorSetHandle, DescriptorSlot,
    GraphicsDevice, PipelineDesc, PipelineHandle, PrimitiveTopology, RenderTargetFormatHandle,
    SamplerKind, ShaderHandle, ShaderStages, TextureHandle, VertexLayout,
};
use crate::resource::ShaderLibrary;
use crate::scene::{Light, LightConstants};
use crate::{engine_debug, engine_warn};

use super::{
    create_pipeline, log_not_initialized, report_record, FrameState, Pass, PassSetup, PassStats,
    PassTarget, SceneContext, SHADER_FULLSCREEN_VERT, SHADER_LIGHTING_FRAG,
};

const SOURCE: &str = "prisma::LightingPass";

const LIGHT_CONSTANTS_SIZE: u32 = std::mem::size_of::<LightConstants>() as u32;

pub const LIGHTING_PASS_PRIORITY: i32 = 400;

/// Names of the image-based lighting inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IblMaps {
    /// Diffuse irradiance cubemap
    pub irradiance: String,
    /// Specular prefiltered cubemap
    pub prefilter: String,
    /// 2D split-sum BRDF lookup table
    pub brdf_lut: String,
}

struct IblInputs {
    descriptor_set: DescriptorSetHandle,
}

/// The two pipeline states sharing one shader pair
struct LightingPipelines {
    base: PipelineHandle,
    accumulate: PipelineHandle,
    gbuffer_set: DescriptorSetHandle,
}

pub struct LightingPass {
    library: Arc<dyn ShaderLibrary>,
    priority: i32,
    lights: Vec<Light>,
    scene_lights: Vec<Light>,
    ambient_color: Vec3,
    ambient_intensity: f32,
    ibl_maps: Option<IblMaps>,
    ibl: Option<IblInputs>,
    pipelines: Option<LightingPipelines>,
    lit_lights: u32,
    stats: PassStats,
}

fn gbuffer_layout() -> DescriptorLayout {
    DescriptorLayout::new(
        GBufferSlot::ALL
            .iter()
            .enumerate()
            .map(|(i, _)| DescriptorSlot {
                binding: i as u32,
                kind: DescriptorKind::CombinedImageSampler,
                stages: ShaderStages::FRAGMENT,
            })
            .collect(),
    )
}

fn ibl_layout() -> DescriptorLayout {
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

fn texture_bindings(textures: &[TextureHandle], sampler: SamplerKind) -> Vec<DescriptorBinding> {
    textures
        .iter()
        .enumerate()
        .map(|(i, &texture)| DescriptorBinding {
            binding: i as u32,
            resource: DescriptorResource::Texture { texture, sampler },
        })
        .collect()
}

impl LightingPass {
    pub fn new(library: Arc<dyn ShaderLibrary>) -> Self {
        Self {
            library,
            priority: LIGHTING_PASS_PRIORITY,
            lights: Vec::new(),
            scene_lights: Vec::new(),
            ambient_color: Vec3::ONE,
            ambient_intensity: 0.1,
            ibl_maps: None,
            ibl: None,
            pipelines: None,
            lit_lights: 0,
            stats: PassStats::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Request IBL inputs; resolved when the scene is built
    pub fn with_ibl(mut self, maps: IblMaps) -> Self {
        self.ibl_maps = Some(maps);
        self
    }

    // ===== LIGHTS =====

    /// Add a light that persists across frames, next to the scene's lights
    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn set_lights(&mut self, lights: Vec<Light>) {
        self.lights = lights;
    }

    pub fn clear_lights(&mut self) {
        self.lights.clear();
    }

    /// Scene lights of the current frame followed by the added ones
    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.scene_lights.iter().chain(self.lights.iter())
    }

    pub fn light_count(&self) -> usize {
        self.scene_lights.len() + self.lights.len()
    }

    pub fn set_ambient(&mut self, color: Vec3, intensity: f32) {
        self.ambient_color = color;
        self.ambient_intensity = intensity.max(0.0);
    }

    pub fn ambient(&self) -> (Vec3, f32) {
        (self.ambient_color, self.ambient_intensity)
    }

    pub fn has_ibl(&self) -> bool {
        self.ibl.is_some()
    }

    /// Lights drawn by the last `record()`
    pub fn lit_lights(&self) -> u32 {
        self.lit_lights
    }

    // ===== INTERNALS =====

    fn resolve_ibl(&mut self, device: &mut dyn GraphicsDevice, ctx: &mut SceneContext) {
        let Some(maps) = self.ibl_maps.clone() else {
            return;
        };
        let irradiance = ctx.resources.cubemap(device, &maps.irradiance);
        let prefilter = ctx.resources.cubemap(device, &maps.prefilter);
        let brdf_lut = ctx.resources.optional_texture(device, &maps.brdf_lut);
        let (Some(irradiance), Some(prefilter), Some(brdf_lut)) = (irradiance, prefilter, brdf_lut) else {
            engine_warn!(SOURCE, "IBL maps incomplete, image-based terms disabled");
            return;
        };

        let set = device.create_descriptor_set(&DescriptorSetDesc {
            name: "lighting_ibl_set".to_string(),
            layout: ibl_layout(),
            bindings: texture_bindings(&[irradiance, prefilter, brdf_lut], SamplerKind::LinearClamp),
        });
        match set {
            Ok(descriptor_set) => self.ibl = Some(IblInputs { descriptor_set }),
            Err(e) => engine_warn!(SOURCE, "IBL descriptor set unavailable ({}), image-based terms disabled", e),
        }
    }

    fn pipeline_desc(
        &self,
        name: &str,
        vs: ShaderHandle,
        fs: ShaderHandle,
        format: RenderTargetFormatHandle,
        blend: BlendMode,
    ) -> PipelineDesc {
        let mut descriptor_layouts = vec![gbuffer_layout()];
        if self.ibl.is_some() {
            descriptor_layouts.push(ibl_layout());
        }
        PipelineDesc {
            name: name.to_string(),
            vertex_shader: vs,
            fragment_shader: fs,
            vertex_layout: VertexLayout::empty(),
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            depth: DepthState::disabled(),
            blend,
            render_target_format: format,
            descriptor_layouts,
            constants: vec![
                ConstantSlot::new("Light", 0, LIGHT_CONSTANTS_SIZE, ShaderStages::FRAGMENT),
                ConstantSlot::new("Ambient", LIGHT_CONSTANTS_SIZE, 16, ShaderStages::FRAGMENT),
            ],
        }
    }

    fn create_pipelines(
        &self,
        device: &mut dyn GraphicsDevice,
        format: RenderTargetFormatHandle,
        gbuffer: &GBuffer,
    ) -> Result<LightingPipelines> {
        let textures: Vec<TextureHandle> = GBufferSlot::ALL.iter().map(|&slot| gbuffer.texture(slot)).collect();
        let gbuffer_set = device.create_descriptor_set(&DescriptorSetDesc {
            name: "lighting_gbuffer_set".to_string(),
            layout: gbuffer_layout(),
            bindings: texture_bindings(&textures, SamplerKind::NearestClamp),
        })?;

        let library = self.library.clone();
        let base = create_pipeline(device, library.as_ref(), SHADER_FULLSCREEN_VERT, SHADER_LIGHTING_FRAG, |vs, fs| {
            self.pipeline_desc("lighting_base", vs, fs, format, BlendMode::Opaque)
        });
        let base = match base {
            Ok(base) => base,
            Err(e) => {
                device.destroy_descriptor_set(gbuffer_set);
                return Err(e);
            }
        };
        let accumulate = create_pipeline(device, library.as_ref(), SHADER_FULLSCREEN_VERT, SHADER_LIGHTING_FRAG, |vs, fs| {
            self.pipeline_desc("lighting_accumulate", vs, fs, format, BlendMode::Additive)
        });
        match accumulate {
            Ok(accumulate) => Ok(LightingPipelines { base, accumulate, gbuffer_set }),
            Err(e) => {
                device.destroy_pipeline(base);
                device.destroy_descriptor_set(gbuffer_set);
                Err(e)
            }
        }
    }

    fn bind(&self, cmd: &mut dyn CommandList, pipeline: PipelineHandle, gbuffer_set: DescriptorSetHandle) -> Result<()> {
        cmd.bind_pipeline(pipeline)?;
        cmd.bind_descriptor_set(0, gbuffer_set)?;
        if let Some(ibl) = &self.ibl {
            cmd.bind_descriptor_set(1, ibl.descriptor_set)?;
        }
        Ok(())
    }

    fn try_record(&mut self, cmd: &mut dyn CommandList, frame: &FrameState) -> Result<()> {
        let Some(pipelines) = &self.pipelines else {
            return Ok(());
        };
        let (base, accumulate, gbuffer_set) = (pipelines.base, pipelines.accumulate, pipelines.gbuffer_set);

        cmd.set_viewport(frame.viewport)?;
        cmd.set_scissor(frame.scissor)?;
        self.bind(cmd, base, gbuffer_set)?;

        let ambient = self.ambient_color * self.ambient_intensity;
        let ibl_flag = if self.ibl.is_some() { 1.0 } else { 0.0 };
        let ambient_first: [f32; 4] = [ambient.x, ambient.y, ambient.z, ibl_flag];
        let ambient_none = [0.0f32; 4];

        let constants: Vec<LightConstants> = self.lights().map(Light::constants).collect();
        let mut draws = 0u32;
        if constants.is_empty() {
            // Ambient only
            let dark = Light { intensity: 0.0, ..Light::default() }.constants();
            cmd.set_constant_buffer("Light", bytemuck::bytes_of(&dark))?;
            cmd.set_constant_buffer("Ambient", bytemuck::bytes_of(&ambient_first))?;
            cmd.draw(3, 0)?;
            draws = 1;
        }
        for (i, light) in constants.iter().enumerate() {
            if i == 1 {
                self.bind(cmd, accumulate, gbuffer_set)?;
            }
            let ambient = if i == 0 { &ambient_first } else { &ambient_none };
            cmd.set_constant_buffer("Light", bytemuck::bytes_of(light))?;
            cmd.set_constant_buffer("Ambient", bytemuck::bytes_of(ambient))?;
            cmd.draw(3, 0)?;
            draws += 1;
            self.lit_lights += 1;
        }

        self.stats.draw_calls = draws;
        self.stats.triangles = draws;
        self.stats.objects = self.lit_lights;
        self.stats.lights = self.lit_lights;
        Ok(())
    }
}

impl Pass for LightingPass {
    fn name(&self) -> &str {
        "Lighting"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn target(&self) -> PassTarget {
        PassTarget::LitColor
    }

    fn is_initialized(&self) -> bool {
        self.pipelines.is_some()
    }

    fn build(&mut self, device: &mut dyn GraphicsDevice, ctx: &mut SceneContext) -> Result<()> {
        self.release(device);
        self.resolve_ibl(device, ctx);
        self.scene_lights = ctx.list.lights.clone();
        Ok(())
    }

    fn initialize(&mut self, device: &mut dyn GraphicsDevice, setup: &PassSetup) -> Result<()> {
        let gbuffer = setup
            .gbuffer
            .ok_or_else(|| Error::InitializationFailed("lighting pass needs a G-Buffer".to_string()))?;
        self.cleanup(device);
        self.pipelines = Some(self.create_pipelines(device, setup.format, gbuffer)?);
        engine_debug!(SOURCE, "Initialized ({} lights, IBL: {})", self.light_count(), self.has_ibl());
        Ok(())
    }

    fn sync_scene(&mut self, _device: &mut dyn GraphicsDevice, ctx: &mut SceneContext) {
        self.scene_lights.clear();
        self.scene_lights.extend_from_slice(&ctx.list.lights);
    }

    fn record(&mut self, cmd: &mut dyn CommandList, frame: &FrameState) {
        self.stats = PassStats::default();
        self.lit_lights = 0;
        if self.pipelines.is_none() {
            log_not_initialized(SOURCE, "Lighting");
            return;
        }
        let result = self.try_record(cmd, frame);
        report_record(SOURCE, "Lighting", result);
    }

    fn cleanup(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(pipelines) = self.pipelines.take() {
            device.destroy_pipeline(pipelines.accumulate);
            device.destroy_pipeline(pipelines.base);
            device.destroy_descriptor_set(pipelines.gbuffer_set);
        }
    }

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(ibl) = self.ibl.take() {
            device.destroy_descriptor_set(ibl.descriptor_set);
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
#[path = "lighting_tests.rs"]
mod tests;
