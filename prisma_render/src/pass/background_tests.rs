use std::sync::Arc;

use serial_test::serial;

use super::*;
use crate::graphics_device::mock::{MockCommandList, MockGraphicsDevice, RecordedCommand};
use crate::graphics_device::ResourceKind;
use crate::log::LogSeverity;
use crate::pass::test_helpers::*;
use crate::resource::{InMemoryTextureLoader, ResourceManager, TextureData};
use crate::scene::{RenderList, Skybox};
use crate::test_support::{capture_logs, restore_logger, shader_library};

fn sky_resources() -> ResourceManager {
    let loader = InMemoryTextureLoader::new();
    loader.insert("sky", TextureData::solid_cube(4, [[40, 90, 200, 255]; 6]));
    ResourceManager::new(shader_library()).with_texture_loader(Arc::new(loader))
}

fn list_with_skybox(cubemap: &str) -> RenderList {
    RenderList { skybox: Some(Skybox::new(cubemap)), ..RenderList::default() }
}

fn is_skybox_bind(command: &RecordedCommand) -> bool {
    matches!(command, RecordedCommand::BindDescriptorSet { .. } | RecordedCommand::BindVertexBuffer(_))
}

#[test]
fn test_clear_path_without_texture() {
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let mut pass = BackgroundPass::new(shader_library());
    assert!(!pass.has_texture());
    pass.initialize(&mut device, &setup(format)).unwrap();

    let frame = frame(0);
    pass.update(&frame);
    let mut cmd = MockCommandList::new();
    pass.record(&mut cmd, &frame);

    let draws: Vec<_> = cmd.commands.iter().filter(|c| matches!(c, RecordedCommand::Draw { .. })).collect();
    assert_eq!(draws, vec![&RecordedCommand::Draw { vertex_count: 4, first_vertex: 0 }]);
    assert_eq!(cmd.count(is_skybox_bind), 0);
    assert_eq!(cmd.constant_names(), vec!["ClearColor".to_string()]);
}

#[test]
fn test_clear_color_comes_from_camera() {
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let mut pass = BackgroundPass::new(shader_library());
    pass.initialize(&mut device, &setup(format)).unwrap();

    let mut frame = frame(0);
    frame.camera.clear_color = [0.25, 0.5, 0.75, 1.0];
    pass.update(&frame);
    let mut cmd = MockCommandList::new();
    pass.record(&mut cmd, &frame);

    let expected: Vec<u8> = bytemuck::bytes_of(&[0.25f32, 0.5, 0.75, 1.0]).to_vec();
    assert!(cmd.commands.contains(&RecordedCommand::SetConstantBuffer { name: "ClearColor".to_string(), data: expected }));
}

#[test]
fn test_skybox_path_with_cubemap() {
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let mut resources = sky_resources();
    let list = list_with_skybox("sky");
    let mut pass = BackgroundPass::new(shader_library());

    let mut ctx = SceneContext { list: &list, resources: &mut resources, frames_in_flight: 2 };
    pass.build(&mut device, &mut ctx).unwrap();
    assert!(pass.has_texture());
    pass.initialize(&mut device, &setup(format)).unwrap();

    let frame = frame(1);
    pass.update(&frame);
    let mut cmd = command_list(&mut device);
    pass.record(cmd.as_mut(), &frame);

    let commands = recorded(cmd.as_ref());
    assert!(commands.contains(&RecordedCommand::Draw { vertex_count: 36, first_vertex: 0 }));
    assert_eq!(commands.iter().filter(|c| is_skybox_bind(c)).count(), 2);
    assert_eq!(pass.stats().triangles, 12);
}

#[test]
#[serial]
fn test_missing_cubemap_degrades_with_warning() {
    let capture = capture_logs();
    let mut device = MockGraphicsDevice::new();
    let mut resources = sky_resources();
    let list = list_with_skybox("missing_sky");
    let mut pass = BackgroundPass::new(shader_library());

    let mut ctx = SceneContext { list: &list, resources: &mut resources, frames_in_flight: 2 };
    pass.build(&mut device, &mut ctx).unwrap();

    assert!(!pass.has_texture());
    assert!(capture
        .from_source("prisma::BackgroundPass")
        .iter()
        .any(|e| e.severity == LogSeverity::Warn && e.message.contains("missing_sky")));
    restore_logger();
}

#[test]
fn test_missing_skybox_shader_falls_back_to_clear() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let format = backbuffer_format(&mut device);
    let mut resources = sky_resources();
    let list = list_with_skybox("sky");
    let mut pass = BackgroundPass::new(shader_library());
    let mut ctx = SceneContext { list: &list, resources: &mut resources, frames_in_flight: 2 };
    pass.build(&mut device, &mut ctx).unwrap();

    inspector.fail_shader(SHADER_SKYBOX_FRAG);
    pass.initialize(&mut device, &setup(format)).unwrap();

    assert!(pass.is_initialized());
    assert!(!pass.has_texture());
    assert_eq!(inspector.live_names(ResourceKind::Buffer), Vec::<String>::new());
}

#[test]
fn test_release_destroys_skybox_geometry() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut resources = sky_resources();
    let list = list_with_skybox("sky");
    let mut pass = BackgroundPass::new(shader_library());
    let mut ctx = SceneContext { list: &list, resources: &mut resources, frames_in_flight: 2 };
    pass.build(&mut device, &mut ctx).unwrap();
    assert_eq!(inspector.live(ResourceKind::DescriptorSet), 1);

    pass.release(&mut device);

    assert_eq!(inspector.live(ResourceKind::DescriptorSet), 0);
    assert_eq!(inspector.live(ResourceKind::Buffer), 0);
    assert!(!pass.has_texture());
}
