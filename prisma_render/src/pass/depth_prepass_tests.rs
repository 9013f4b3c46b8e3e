use super::*;
use crate::gbuffer::GBuffer;
use crate::graphics_device::mock::{MockGraphicsDevice, RecordedCommand};
use crate::graphics_device::ResourceKind;
use crate::pass::test_helpers::*;
use crate::pass::{GEOMETRY_PASS_PRIORITY, OPAQUE_PASS_PRIORITY};
use crate::test_support::{resources, shader_library};

#[test]
fn test_runs_before_the_passes_it_feeds() {
    let pass = DepthPrePass::new(shader_library());
    assert_eq!(pass.target(), PassTarget::Backbuffer);
    assert!(pass.priority() < GEOMETRY_PASS_PRIORITY);
    assert!(pass.priority() < OPAQUE_PASS_PRIORITY);

    let deferred = DepthPrePass::new(shader_library()).with_target(PassTarget::GBuffer);
    assert_eq!(deferred.target(), PassTarget::GBuffer);
}

#[test]
fn test_pipeline_writes_depth_only() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let format = backbuffer_format(&mut device);
    let mut pass = DepthPrePass::new(shader_library());

    pass.initialize(&mut device, &setup(format)).unwrap();

    let (depth, blend) = inspector.pipeline_state("depth_prepass").unwrap();
    assert_eq!(depth, DepthState::read_write());
    assert_eq!(blend, BlendMode::DepthOnly);
    assert_eq!(inspector.live(ResourceKind::Shader), 0);
}

#[test]
fn test_draws_opaque_items_only() {
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let mut resources = resources();
    let scene = scene_with(&mut resources, &[(5.0, 1.0), (8.0, 0.5), (12.0, 1.0)]);
    let list = scene.collect_build_list(&resources);
    let mut pass = DepthPrePass::new(shader_library());
    let mut ctx = SceneContext { list: &list, resources: &mut resources, frames_in_flight: 2 };
    pass.build(&mut device, &mut ctx).unwrap();
    pass.initialize(&mut device, &setup(format)).unwrap();

    let frame = frame(0);
    pass.update(&frame);
    let list = render_list(&scene, &resources);
    sync_frame(&mut pass, &mut device, &list, &mut resources);
    pass.prepare(&mut device, &frame).unwrap();
    let mut cmd = command_list(&mut device);
    pass.record(cmd.as_mut(), &frame);

    let commands = recorded(cmd.as_ref());
    assert!(matches!(commands[2], RecordedCommand::BindPipeline(p) if Some(p) == pass.pipeline()));
    let draws = commands.iter().filter(|c| matches!(c, RecordedCommand::Draw { .. })).count();
    assert_eq!(draws, 2);
    assert_eq!(pass.objects().len(), 2);
    assert_eq!(pass.stats().draw_calls, 2);
}

#[test]
fn test_shares_the_gbuffer_format_in_deferred() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let gbuffer = GBuffer::create(&mut device, EXTENT).unwrap();
    let setup = PassSetup {
        format: gbuffer.format(),
        extent: EXTENT,
        frames_in_flight: 2,
        gbuffer: Some(&gbuffer),
        lit_color: None,
    };
    let mut pass = DepthPrePass::new(shader_library()).with_target(PassTarget::GBuffer);

    pass.initialize(&mut device, &setup).unwrap();
    assert_eq!(inspector.live(ResourceKind::Pipeline), 1);

    pass.cleanup(&mut device);
    pass.cleanup(&mut device);
    assert_eq!(inspector.live(ResourceKind::Pipeline), 0);
    assert_eq!(inspector.invalid_destroys(), 0);
}
