use bytemuck::Zeroable;
use glam::{Mat4, Vec3};

use super::*;
use crate::graphics_device::mock::{MockCommandList, MockGraphicsDevice, RecordedCommand};
use crate::graphics_device::{Extent2D, ResourceKind, TextureDesc, TextureFormat};
use crate::resource::Vertex;
use crate::test_support::resources;

fn texture(device: &mut MockGraphicsDevice) -> TextureHandle {
    device
        .create_texture(&TextureDesc::attachment("albedo", Extent2D::new(1, 1), TextureFormat::R8G8B8A8_UNORM))
        .unwrap()
}

fn mesh_with_indices(vertex_count: usize, indices: Vec<u32>) -> MeshData {
    MeshData::new(vec![Vertex::zeroed(); vertex_count], Some(indices))
}

fn create(device: &mut MockGraphicsDevice, mesh: &MeshData, frames: usize) -> Result<RenderObjectData> {
    let tex = texture(device);
    let mut manager = resources();
    let id = manager.add_mesh(mesh.clone());
    RenderObjectData::create(device, "obj", id, mesh, tex, frames, &RenderObjectData::descriptor_layout())
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn test_one_uniform_buffer_and_set_per_frame() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let object = create(&mut device, &MeshData::triangle(), 2).unwrap();

    assert_eq!(object.frame_count(), 2);
    assert!(object.descriptor_set(1).is_some());
    assert!(object.descriptor_set(2).is_none());
    assert_eq!(inspector.live(ResourceKind::DescriptorSet), 2);
    // Vertex buffer + two uniform buffers
    assert_eq!(inspector.live(ResourceKind::Buffer), 3);
    let names = inspector.live_names(ResourceKind::Buffer);
    assert!(names.contains(&"obj_ubo_frame0".to_string()));
    assert!(names.contains(&"obj_ubo_frame1".to_string()));
}

#[test]
fn test_layout_mismatch_fails_without_leaking() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let tex = texture(&mut device);
    let mut manager = resources();
    let mesh = MeshData::triangle();
    let id = manager.add_mesh(mesh.clone());
    let ubo_only = DescriptorLayout::new(vec![DescriptorSlot {
        binding: 0,
        kind: DescriptorKind::UniformBuffer,
        stages: ShaderStages::VERTEX,
    }]);

    let result = RenderObjectData::create(&mut device, "obj", id, &mesh, tex, 2, &ubo_only);

    assert!(result.is_err());
    assert_eq!(inspector.live(ResourceKind::Buffer), 0);
    assert_eq!(inspector.live(ResourceKind::DescriptorSet), 0);
    assert_eq!(inspector.invalid_destroys(), 0);
}

#[test]
fn test_empty_mesh_rejected() {
    let mut device = MockGraphicsDevice::new();
    let result = create(&mut device, &MeshData::new(Vec::new(), None), 2);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

// ============================================================================
// Index width
// ============================================================================

#[test]
fn test_index_width_16_bit_up_to_65535() {
    let mut device = MockGraphicsDevice::new();
    let indices = vec![0, 1, 65535];
    let object = create(&mut device, &mesh_with_indices(65536, indices.clone()), 1).unwrap();

    assert_eq!(object.index_format(), Some(IndexFormat::U16));
    assert_eq!(object.read_indices(&device).unwrap(), indices);
}

#[test]
fn test_index_width_32_bit_from_65536() {
    let mut device = MockGraphicsDevice::new();
    let indices = vec![0, 65536, 2];
    let object = create(&mut device, &mesh_with_indices(65537, indices.clone()), 1).unwrap();

    assert_eq!(object.index_format(), Some(IndexFormat::U32));
    assert_eq!(object.read_indices(&device).unwrap(), indices);
}

#[test]
fn test_non_indexed_mesh_has_no_index_buffer() {
    let mut device = MockGraphicsDevice::new();
    let object = create(&mut device, &MeshData::triangle(), 1).unwrap();
    assert!(object.index_buffer().is_none());
    assert!(object.read_indices(&device).unwrap().is_empty());
}

// ============================================================================
// Per-frame use
// ============================================================================

#[test]
fn test_update_uniforms_writes_only_that_frame() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut object = create(&mut device, &MeshData::triangle(), 2).unwrap();
    object.set_world(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));

    object.update_uniforms(&mut device, 1, &Mat4::IDENTITY, &Mat4::IDENTITY).unwrap();

    let frame1 = inspector.buffer_contents("obj_ubo_frame1").unwrap();
    let uniforms: ObjectUniforms = bytemuck::pod_read_unaligned(&frame1);
    assert_eq!(uniforms.model[3], [1.0, 2.0, 3.0, 1.0]);
    assert!(inspector.buffer_contents("obj_ubo_frame0").unwrap().iter().all(|b| *b == 0));

    assert!(matches!(
        object.update_uniforms(&mut device, 2, &Mat4::IDENTITY, &Mat4::IDENTITY),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn test_record_non_indexed_draw() {
    let mut device = MockGraphicsDevice::new();
    let object = create(&mut device, &MeshData::triangle(), 2).unwrap();
    let mut cmd = MockCommandList::new();

    object.record(&mut cmd, 1).unwrap();

    assert_eq!(
        cmd.commands,
        vec![
            RecordedCommand::BindDescriptorSet { set_index: 0, set: object.descriptor_set(1).unwrap() },
            RecordedCommand::BindVertexBuffer(object.vertex_buffer),
            RecordedCommand::Draw { vertex_count: 3, first_vertex: 0 },
        ]
    );
}

#[test]
fn test_record_indexed_draw() {
    let mut device = MockGraphicsDevice::new();
    let object = create(&mut device, &MeshData::cube(1.0), 1).unwrap();
    let mut cmd = MockCommandList::new();

    object.record(&mut cmd, 0).unwrap();

    assert_eq!(cmd.count(|c| matches!(c, RecordedCommand::BindIndexBuffer { format: IndexFormat::U16, .. })), 1);
    assert_eq!(cmd.count(|c| matches!(c, RecordedCommand::DrawIndexed { index_count: 36, .. })), 1);
}

#[test]
fn test_destroy_releases_everything_once() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut object = create(&mut device, &MeshData::cube(1.0), 2).unwrap();

    object.destroy(&mut device);
    object.destroy(&mut device);

    assert_eq!(inspector.live(ResourceKind::Buffer), 0);
    assert_eq!(inspector.live(ResourceKind::DescriptorSet), 0);
    assert_eq!(inspector.invalid_destroys(), 0);
}
