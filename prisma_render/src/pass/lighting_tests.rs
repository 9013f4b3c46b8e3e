use std::sync::Arc;

use glam::Vec3;

use super::*;
use crate::gbuffer::GBuffer;
use crate::graphics_device::mock::{MockGraphicsDevice, RecordedCommand};
use crate::graphics_device::{Extent2D, ResourceKind};
use crate::pass::test_helpers::*;
use crate::resource::{InMemoryTextureLoader, ResourceManager, TextureData};
use crate::test_support::shader_library;

fn gbuffer_setup(gbuffer: &GBuffer, format: RenderTargetFormatHandle) -> PassSetup<'_> {
    PassSetup {
        format,
        extent: EXTENT,
        frames_in_flight: 2,
        gbuffer: Some(gbuffer),
        lit_color: None,
    }
}

fn ibl_resources(with_lut: bool) -> ResourceManager {
    let loader = InMemoryTextureLoader::new();
    loader.insert("irradiance", TextureData::solid_cube(2, [[30, 30, 30, 255]; 6]));
    loader.insert("prefilter", TextureData::solid_cube(2, [[60, 60, 60, 255]; 6]));
    if with_lut {
        loader.insert("brdf_lut", TextureData::solid(Extent2D::new(4, 4), [255, 0, 0, 255]));
    }
    ResourceManager::new(shader_library()).with_texture_loader(Arc::new(loader))
}

fn ibl_maps() -> IblMaps {
    IblMaps {
        irradiance: "irradiance".to_string(),
        prefilter: "prefilter".to_string(),
        brdf_lut: "brdf_lut".to_string(),
    }
}

fn initialized(device: &mut MockGraphicsDevice, pass: &mut LightingPass) -> GBuffer {
    let gbuffer = GBuffer::create(device, EXTENT).unwrap();
    let format = backbuffer_format(device);
    pass.initialize(device, &gbuffer_setup(&gbuffer, format)).unwrap();
    gbuffer
}

fn draws(commands: &[RecordedCommand]) -> usize {
    commands.iter().filter(|c| matches!(c, RecordedCommand::Draw { vertex_count: 3, .. })).count()
}

#[test]
fn test_light_list_management() {
    let mut pass = LightingPass::new(shader_library());
    pass.add_light(Light::point(Vec3::ZERO, Vec3::ONE, 1.0, 5.0));
    pass.add_light(Light::directional(Vec3::NEG_Y, Vec3::ONE, 0.5));
    assert_eq!(pass.light_count(), 2);

    pass.set_lights(vec![Light::default()]);
    assert_eq!(pass.light_count(), 1);

    pass.clear_lights();
    assert_eq!(pass.light_count(), 0);
}

#[test]
fn test_initialize_requires_gbuffer() {
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let mut pass = LightingPass::new(shader_library());

    assert!(pass.initialize(&mut device, &setup(format)).is_err());
}

#[test]
fn test_one_draw_per_light() {
    let mut device = MockGraphicsDevice::new();
    let mut pass = LightingPass::new(shader_library());
    let _gbuffer = initialized(&mut device, &mut pass);
    pass.add_light(Light::point(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE, 2.0, 8.0));
    pass.add_light(Light::directional(Vec3::NEG_Y, Vec3::ONE, 1.0));
    pass.add_light(Light::spot(Vec3::Y, Vec3::NEG_Y, 0.3, 0.5));

    let mut cmd = command_list(&mut device);
    pass.record(cmd.as_mut(), &frame(0));

    let commands = recorded(cmd.as_ref());
    assert_eq!(draws(&commands), 3);
    assert_eq!(pass.lit_lights(), 3);
    // Base pipeline first, accumulate pipeline once for the remaining lights
    let binds = commands.iter().filter(|c| matches!(c, RecordedCommand::BindPipeline(_))).count();
    assert_eq!(binds, 2);
    assert_eq!(pass.stats().lights, 3);
}

#[test]
fn test_ambient_only_without_lights() {
    let mut device = MockGraphicsDevice::new();
    let mut pass = LightingPass::new(shader_library());
    let _gbuffer = initialized(&mut device, &mut pass);
    pass.set_ambient(Vec3::new(0.2, 0.4, 0.6), 0.5);

    let mut cmd = command_list(&mut device);
    pass.record(cmd.as_mut(), &frame(0));

    let commands = recorded(cmd.as_ref());
    assert_eq!(draws(&commands), 1);
    assert_eq!(pass.lit_lights(), 0);
    let ambient: Vec<u8> = bytemuck::bytes_of(&[0.1f32, 0.2, 0.3, 0.0]).to_vec();
    let expected =
        RecordedCommand::SetConstantBuffer { name: "Ambient".to_string(), data: ambient };
    assert!(commands.contains(&expected));
}

#[test]
fn test_scene_lights_are_refreshed_each_frame() {
    let mut device = MockGraphicsDevice::new();
    let mut resources = crate::test_support::resources();
    let mut pass = LightingPass::new(shader_library());
    pass.add_light(Light::default());
    let mut list = crate::scene::RenderList::default();
    list.lights = vec![Light::directional(Vec3::NEG_Z, Vec3::ONE, 1.0); 2];

    sync_frame(&mut pass, &mut device, &list, &mut resources);
    assert_eq!(pass.light_count(), 3);

    list.lights.truncate(1);
    sync_frame(&mut pass, &mut device, &list, &mut resources);
    assert_eq!(pass.light_count(), 2);
}

#[test]
fn test_ibl_bound_when_complete() {
    let mut device = MockGraphicsDevice::new();
    let mut resources = ibl_resources(true);
    let list = crate::scene::RenderList::default();
    let mut pass = LightingPass::new(shader_library()).with_ibl(ibl_maps());
    let mut ctx = SceneContext { list: &list, resources: &mut resources, frames_in_flight: 2 };
    pass.build(&mut device, &mut ctx).unwrap();
    assert!(pass.has_ibl());

    let _gbuffer = initialized(&mut device, &mut pass);
    let mut cmd = command_list(&mut device);
    pass.record(cmd.as_mut(), &frame(0));

    let commands = recorded(cmd.as_ref());
    let ibl_bound = commands
        .iter()
        .any(|c| matches!(c, RecordedCommand::BindDescriptorSet { set_index: 1, .. }));
    assert!(ibl_bound);
}

#[test]
fn test_missing_ibl_map_is_not_an_error() {
    let mut device = MockGraphicsDevice::new();
    let mut resources = ibl_resources(false);
    let list = crate::scene::RenderList::default();
    let mut pass = LightingPass::new(shader_library()).with_ibl(ibl_maps());
    let mut ctx = SceneContext { list: &list, resources: &mut resources, frames_in_flight: 2 };

    pass.build(&mut device, &mut ctx).unwrap();
    assert!(!pass.has_ibl());

    let _gbuffer = initialized(&mut device, &mut pass);
    let mut cmd = command_list(&mut device);
    pass.record(cmd.as_mut(), &frame(0));
    let commands = recorded(cmd.as_ref());
    let ibl_bound = commands
        .iter()
        .any(|c| matches!(c, RecordedCommand::BindDescriptorSet { set_index: 1, .. }));
    assert!(!ibl_bound);
}

#[test]
fn test_cleanup_releases_pipelines_and_gbuffer_set() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut pass = LightingPass::new(shader_library());
    let _gbuffer = initialized(&mut device, &mut pass);
    assert_eq!(inspector.live(ResourceKind::Pipeline), 2);
    assert_eq!(inspector.live(ResourceKind::DescriptorSet), 1);

    pass.cleanup(&mut device);
    pass.cleanup(&mut device);

    assert_eq!(inspector.live(ResourceKind::Pipeline), 0);
    assert_eq!(inspector.live(ResourceKind::DescriptorSet), 0);
    assert_eq!(inspector.invalid_destroys(), 0);
}

#[test]
fn test_light_and_ambient_fit_the_push_constant_minimum() {
    let mut device = MockGraphicsDevice::new();
    let mut pass = LightingPass::new(shader_library());
    let _gbuffer = initialized(&mut device, &mut pass);
    let shadowed = Light::point(Vec3::ZERO, Vec3::ONE, 1.0, 5.0)
        .with_shadows(2, glam::Mat4::from_scale(Vec3::splat(3.0)));
    pass.add_light(shadowed);

    let mut cmd = command_list(&mut device);
    pass.record(cmd.as_mut(), &frame(0));

    // The shadow matrix stays on the CPU; only the map index reaches the shader
    let constants = shadowed.constants();
    assert_eq!(constants.cone_shadow[2..], [1.0, 2.0]);
    assert_eq!(constants, Light { shadow_matrix: glam::Mat4::IDENTITY, ..shadowed }.constants());
    let pushed = recorded(cmd.as_ref()).into_iter().find_map(|c| match c {
        RecordedCommand::SetConstantBuffer { name, data } if name == "Light" => Some(data),
        _ => None,
    });
    assert_eq!(pushed, Some(bytemuck::bytes_of(&constants).to_vec()));
    assert_eq!(LIGHT_CONSTANTS_SIZE, 64);
}
