use std::sync::Arc;

use serial_test::serial;

use super::*;
use crate::graphics_device::mock::MockGraphicsDevice;
use crate::graphics_device::ResourceKind;
use crate::log::LogSeverity;
use crate::resource::InMemoryTextureLoader;
use crate::test_support::{capture_logs, restore_logger, resources, shader_library};

fn loader() -> Arc<InMemoryTextureLoader> {
    let loader = InMemoryTextureLoader::new();
    loader.insert("bricks", TextureData::solid(Extent2D::new(2, 2), [200, 80, 60, 255]));
    loader.insert("sky", TextureData::solid_cube(4, [[10, 20, 30, 255]; 6]));
    Arc::new(loader)
}

#[test]
fn test_texture_loaded_once_and_cached() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut manager = resources().with_texture_loader(loader());

    let first = manager.texture(&mut device, "bricks").unwrap();
    let second = manager.texture(&mut device, "bricks").unwrap();

    assert_eq!(first, second);
    assert_eq!(inspector.created(ResourceKind::Texture), 1);
    assert_eq!(manager.cached_texture_count(), 1);
}

#[test]
#[serial]
fn test_missing_texture_falls_back_with_warning() {
    let capture = capture_logs();
    let mut device = MockGraphicsDevice::new();
    let mut manager = resources().with_texture_loader(loader());

    let missing = manager.texture(&mut device, "does_not_exist").unwrap();
    let also_missing = manager.texture(&mut device, "nope").unwrap();
    let fallback = manager.fallback_texture(&mut device).unwrap();

    assert_eq!(missing, fallback);
    assert_eq!(also_missing, fallback);
    let warnings: Vec<_> = capture
        .from_source("prisma::ResourceManager")
        .into_iter()
        .filter(|e| e.severity == LogSeverity::Warn)
        .filter(|e| e.message.contains("does_not_exist") || e.message.contains("'nope'"))
        .collect();
    assert_eq!(warnings.len(), 2);
    restore_logger();
}

#[test]
fn test_no_loader_means_fallback() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut manager = resources();

    manager.texture(&mut device, "bricks").unwrap();
    assert_eq!(inspector.live_names(ResourceKind::Texture), vec![FALLBACK_TEXTURE_NAME.to_string()]);
}

#[test]
fn test_cubemap_lookup() {
    let mut device = MockGraphicsDevice::new();
    let mut manager = resources().with_texture_loader(loader());

    assert!(manager.cubemap(&mut device, "sky").is_some());
    assert!(manager.cubemap(&mut device, "missing_sky").is_none());
    // A 2D image is not a cubemap
    assert!(manager.cubemap(&mut device, "bricks").is_none());
}

#[test]
fn test_optional_texture_has_no_fallback() {
    let mut device = MockGraphicsDevice::new();
    let mut manager = resources().with_texture_loader(loader());

    assert!(manager.optional_texture(&mut device, "bricks").is_some());
    assert!(manager.optional_texture(&mut device, "brdf_lut").is_none());
    assert!(manager.optional_texture(&mut device, "sky").is_none());
    assert_eq!(manager.cached_texture_count(), 1);
}

#[test]
fn test_missing_shader_is_fatal() {
    let mut device = MockGraphicsDevice::new();
    let manager = ResourceManager::new(shader_library());

    let result = manager.load_shader(&mut device, "no_such_shader.vert", ShaderStage::Vertex);
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
    assert!(manager.load_shader(&mut device, "mesh.vert", ShaderStage::Vertex).is_ok());
}

#[test]
fn test_release_destroys_every_texture() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut manager = resources().with_texture_loader(loader());

    manager.texture(&mut device, "bricks").unwrap();
    manager.texture(&mut device, "missing").unwrap();
    manager.cubemap(&mut device, "sky").unwrap();
    assert_eq!(inspector.live(ResourceKind::Texture), 3);

    manager.release(&mut device);
    assert_eq!(inspector.live(ResourceKind::Texture), 0);
    assert_eq!(inspector.invalid_destroys(), 0);
}

#[test]
fn test_mesh_table() {
    let mut manager = resources();
    let id = manager.add_mesh(MeshData::triangle());

    assert_eq!(manager.mesh(id).map(|m| m.vertices.len()), Some(3));
    assert!(manager.remove_mesh(id).is_some());
    assert!(manager.mesh(id).is_none());
    assert_eq!(manager.mesh_count(), 0);
}
