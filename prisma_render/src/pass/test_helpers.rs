//! Fixtures shared by the pass unit tests

use glam::{Quat, Vec3};

use crate::camera::{Camera, CameraData};
use crate::graphics_device::mock::{MockCommandList, MockGraphicsDevice, RecordedCommand};
use crate::graphics_device::{
    AttachmentDesc, AttachmentUsage, CommandList, Extent2D, GraphicsDevice, LoadOp,
    RenderTargetFormatDesc, RenderTargetFormatHandle, TextureFormat,
};
use crate::resource::{MeshData, ResourceManager};
use crate::scene::{Material, MeshRenderer, RenderList, Scene, Transform};

use super::{FrameState, Pass, PassSetup, SceneContext};

pub(crate) const EXTENT: Extent2D = Extent2D::new(800, 600);

pub(crate) fn backbuffer_format(device: &mut dyn GraphicsDevice) -> RenderTargetFormatHandle {
    device
        .create_render_target_format(&RenderTargetFormatDesc {
            name: "test_backbuffer".to_string(),
            color: vec![AttachmentDesc::new(
                TextureFormat::B8G8R8A8_SRGB,
                LoadOp::Clear,
                AttachmentUsage::Present,
            )],
            depth: Some(AttachmentDesc::new(
                TextureFormat::D32_FLOAT,
                LoadOp::Clear,
                AttachmentUsage::Attachment,
            )),
        })
        .unwrap()
}

/// Camera at the origin looking down +Z
pub(crate) fn camera() -> Camera {
    let mut camera = Camera::perspective(60f32.to_radians(), EXTENT.aspect(), 0.1, 100.0);
    camera.set_orientation(Quat::from_rotation_y(std::f32::consts::PI));
    camera
}

pub(crate) fn frame(frame_index: usize) -> FrameState {
    FrameState::new(frame_index, EXTENT, camera().data())
}

pub(crate) fn camera_data() -> CameraData {
    camera().data()
}

/// Scene with one object per (z, alpha) pair, each a single triangle
pub(crate) fn scene_with(resources: &mut ResourceManager, objects: &[(f32, f32)]) -> Scene {
    let mesh = resources.add_mesh(MeshData::triangle());
    let mut scene = Scene::new("test");
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

pub(crate) fn render_list(scene: &Scene, resources: &ResourceManager) -> RenderList {
    scene.collect_render_list(resources, None)
}

/// Per-frame scene sync with two frames in flight, as the pipeline runs it
pub(crate) fn sync_frame(
    pass: &mut dyn Pass,
    device: &mut dyn GraphicsDevice,
    list: &RenderList,
    resources: &mut ResourceManager,
) {
    let mut ctx = SceneContext { list, resources, frames_in_flight: 2 };
    pass.sync_scene(device, &mut ctx);
}

/// Command list bound to the mock device's validation
pub(crate) fn command_list(device: &mut MockGraphicsDevice) -> Box<dyn CommandList> {
    device.create_command_list().unwrap()
}

pub(crate) fn recorded(cmd: &dyn CommandList) -> Vec<RecordedCommand> {
    cmd.as_any()
        .downcast_ref::<MockCommandList>()
        .map(|list| list.commands.clone())
        .unwrap_or_default()
}

pub(crate) fn setup(format: RenderTargetFormatHandle) -> PassSetup<'static> {
    PassSetup { format, extent: EXTENT, frames_in_flight: 2, gbuffer: None, lit_color: None }
}
