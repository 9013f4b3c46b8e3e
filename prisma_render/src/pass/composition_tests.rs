use super::*;
use crate::gbuffer::GBuffer;
use crate::graphics_device::mock::{MockGraphicsDevice, RecordedCommand};
use crate::graphics_device::ResourceKind;
use crate::lit_target::LitColorTarget;
use crate::pass::test_helpers::*;
use crate::test_support::shader_library;

#[test]
fn test_default_settings() {
    let settings = CompositionSettings::default();
    assert!(settings.is_enabled(PostEffects::TONE_MAPPING | PostEffects::GAMMA));
    assert!(!settings.is_enabled(PostEffects::FXAA));
    assert_eq!(settings.exposure, 1.0);
    assert_eq!(settings.gamma, 2.2);
    assert_eq!(settings.fxaa_edge_threshold_min, 0.0312);
    assert_eq!(settings.fxaa_edge_threshold, 0.125);
    assert_eq!(settings.ssao_radius, 0.5);
    assert_eq!(settings.ssao_bias, 0.025);
    assert_eq!(settings.ssao_power, 2.0);
    assert_eq!(settings.effect_chain(), vec![PostEffect::ToneMapGamma]);
}

#[test]
fn test_chain_order_is_fixed() {
    let mut settings = CompositionSettings::default();
    // Enabled in scrambled order
    settings.enable(PostEffects::DEPTH_OF_FIELD);
    settings.enable(PostEffects::SSAO);
    settings.enable(PostEffects::BLOOM);
    settings.enable(PostEffects::FXAA);
    settings.enable(PostEffects::SSR);

    assert_eq!(
        settings.effect_chain(),
        vec![
            PostEffect::ToneMapGamma,
            PostEffect::Fxaa,
            PostEffect::Bloom,
            PostEffect::Ssr,
            PostEffect::Ssao,
            PostEffect::DepthOfField,
        ]
    );
}

#[test]
fn test_smaa_wins_over_fxaa() {
    let mut settings = CompositionSettings::default();
    settings.enable(PostEffects::FXAA | PostEffects::SMAA);

    let chain = settings.effect_chain();
    assert!(chain.contains(&PostEffect::Smaa));
    assert!(!chain.contains(&PostEffect::Fxaa));
    assert_eq!(settings.uniforms().effects & PostEffects::FXAA.bits(), 0);
}

#[test]
fn test_parameters_independent_of_toggles() {
    let mut settings = CompositionSettings::default();
    settings.ssao_radius = 1.5;
    settings.disable(PostEffects::all());

    let uniforms = settings.uniforms();
    assert_eq!(uniforms.ssao_bloom[0], 1.5);
    assert_eq!(uniforms.stage_count, 0);
    assert!(settings.effect_chain().is_empty());
}

#[test]
fn test_uniform_stages_follow_chain() {
    let mut settings = CompositionSettings::default();
    settings.enable(PostEffects::BLOOM);

    let uniforms = settings.uniforms();
    assert_eq!(uniforms.stage_count, 2);
    assert_eq!(&uniforms.stages[..3], &[PostEffect::ToneMapGamma as u32, PostEffect::Bloom as u32, 0]);
}

#[test]
fn test_initialize_needs_lit_color() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let format = backbuffer_format(&mut device);
    let mut pass = CompositionPass::new(shader_library());

    assert!(pass.initialize(&mut device, &setup(format)).is_err());
    assert_eq!(inspector.live(ResourceKind::DescriptorSet), 0);
}

#[test]
fn test_records_one_resolve_draw() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let format = backbuffer_format(&mut device);
    let gbuffer = GBuffer::create(&mut device, EXTENT).unwrap();
    let lit = LitColorTarget::create(&mut device, EXTENT, Some(gbuffer.depth())).unwrap();
    let mut pass = CompositionPass::new(shader_library());
    let setup = PassSetup {
        format,
        extent: EXTENT,
        frames_in_flight: 2,
        gbuffer: Some(&gbuffer),
        lit_color: Some(lit.color()),
    };
    pass.initialize(&mut device, &setup).unwrap();

    let mut cmd = command_list(&mut device);
    pass.record(cmd.as_mut(), &frame(0));

    let commands = recorded(cmd.as_ref());
    assert_eq!(commands.iter().filter(|c| matches!(c, RecordedCommand::Draw { vertex_count: 3, .. })).count(), 1);
    assert!(commands.contains(&RecordedCommand::BindDescriptorSet {
        set_index: 0,
        set: composition_set(&pass),
    }));

    pass.cleanup(&mut device);
    assert_eq!(inspector.live(ResourceKind::Pipeline), 0);
    assert_eq!(inspector.live(ResourceKind::DescriptorSet), 0);
}

fn composition_set(pass: &CompositionPass) -> DescriptorSetHandle {
    pass.state.as_ref().map(|s| s.descriptor_set).unwrap()
}
