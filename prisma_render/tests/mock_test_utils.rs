#![allow(dead_code)]
//! Mock test utilities - scenes and renderers over the recording mock device
//!
//! Integration tests only see the public API, so the fixtures the unit tests
//! share inside the crate are rebuilt here.

use std::sync::Arc;

use prisma_render::glam::{Quat, Vec3};
use prisma_render::prisma::camera::Camera;
use prisma_render::prisma::device::mock::{MockGraphicsDevice, MockInspector, RecordedCommand};
use prisma_render::prisma::render::BUILTIN_SHADERS;
use prisma_render::prisma::resource::{InMemoryShaderLibrary, MeshData, ResourceManager};
use prisma_render::prisma::scene::{Material, MeshRenderer, Scene, Transform};
use prisma_render::prisma::{Renderer, RendererConfig};

/// SPIR-V magic number; the mock device accepts any non-empty module
pub const FAKE_SPIRV: [u8; 4] = [0x03, 0x02, 0x23, 0x07];

pub fn shader_library() -> Arc<InMemoryShaderLibrary> {
    let library = InMemoryShaderLibrary::new();
    for name in BUILTIN_SHADERS {
        library.insert(*name, FAKE_SPIRV.to_vec());
    }
    Arc::new(library)
}

pub fn resources() -> ResourceManager {
    ResourceManager::new(shader_library())
}

/// Camera at the origin looking down +Z
pub fn camera() -> Camera {
    let mut camera = Camera::perspective(60f32.to_radians(), 800.0 / 600.0, 0.1, 100.0);
    camera.set_orientation(Quat::from_rotation_y(std::f32::consts::PI));
    camera
}

/// One triangle per (z, alpha) pair plus a main camera
pub fn scene_with(resources: &mut ResourceManager, objects: &[(f32, f32)]) -> Scene {
    let mesh = resources.add_mesh(MeshData::triangle());
    let mut scene = Scene::new("integration");
    for (i, &(z, alpha)) in objects.iter().enumerate() {
        let id = scene.create_game_object(format!("object{}", i));
        scene.add_component(id, Transform::from_position(Vec3::new(0.0, 0.0, z))).unwrap();
        let material = Material { alpha, ..Material::default() };
        scene.add_component(id, MeshRenderer::new(mesh).with_material(material)).unwrap();
    }
    let camera_id = scene.create_game_object("camera");
    scene.add_component(camera_id, camera()).unwrap();
    scene.set_main_camera(camera_id).unwrap();
    scene
}

pub fn renderer(config: RendererConfig) -> (Renderer, MockInspector) {
    let device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let renderer = Renderer::new(Box::new(device), config, resources()).unwrap();
    (renderer, inspector)
}

pub fn count(commands: &[RecordedCommand], predicate: impl Fn(&RecordedCommand) -> bool) -> usize {
    commands.iter().filter(|c| predicate(c)).count()
}
