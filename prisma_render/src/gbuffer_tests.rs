use super::*;
use crate::graphics_device::mock::MockGraphicsDevice;
use crate::graphics_device::ResourceKind;

#[test]
fn test_create_allocates_all_slots() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let gbuffer = GBuffer::create(&mut device, Extent2D::new(800, 600)).unwrap();

    assert_eq!(gbuffer.extent(), Extent2D::new(800, 600));
    assert_eq!(inspector.live(ResourceKind::Texture), 5);
    assert_eq!(inspector.live(ResourceKind::Framebuffer), 1);
    assert_eq!(inspector.live(ResourceKind::RenderTargetFormat), 1);
    assert_ne!(gbuffer.texture(GBufferSlot::Position), gbuffer.texture(GBufferSlot::Normal));
}

#[test]
fn test_slot_formats() {
    assert_eq!(GBufferSlot::Position.format(), TextureFormat::R16G16B16A16_SFLOAT);
    assert_eq!(GBufferSlot::Albedo.format(), TextureFormat::R8G8B8A8_UNORM);
    assert_eq!(GBufferSlot::Emissive.format(), TextureFormat::B10G11R11_UFLOAT);

    let desc = GBuffer::format_desc();
    assert_eq!(desc.color.len(), 4);
    assert_eq!(desc.depth.map(|d| d.format), Some(GBUFFER_DEPTH_FORMAT));
    assert_eq!(GBuffer::clear_values().len(), 5);
}

#[test]
fn test_resize_replaces_every_target() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut gbuffer = GBuffer::create(&mut device, Extent2D::new(800, 600)).unwrap();
    let old_albedo = gbuffer.texture(GBufferSlot::Albedo);
    let old_depth = gbuffer.depth();
    let format = gbuffer.format();

    gbuffer.resize(&mut device, Extent2D::new(600, 800)).unwrap();

    assert_eq!(gbuffer.extent(), Extent2D::new(600, 800));
    assert_ne!(gbuffer.texture(GBufferSlot::Albedo), old_albedo);
    assert_ne!(gbuffer.depth(), old_depth);
    assert_eq!(gbuffer.format(), format);
    assert_eq!(inspector.live(ResourceKind::Texture), 5);
    assert_eq!(inspector.created(ResourceKind::Texture), 10);
    assert_eq!(inspector.invalid_destroys(), 0);
}

#[test]
fn test_resize_to_same_extent_is_noop() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut gbuffer = GBuffer::create(&mut device, Extent2D::new(800, 600)).unwrap();

    gbuffer.resize(&mut device, Extent2D::new(800, 600)).unwrap();
    assert_eq!(inspector.created(ResourceKind::Texture), 5);
}

#[test]
fn test_zero_extent_rejected_and_old_targets_kept() {
    let mut device = MockGraphicsDevice::new();
    let mut gbuffer = GBuffer::create(&mut device, Extent2D::new(800, 600)).unwrap();

    assert!(gbuffer.resize(&mut device, Extent2D::new(0, 600)).is_err());
    assert_eq!(gbuffer.extent(), Extent2D::new(800, 600));
    assert!(GBuffer::create(&mut device, Extent2D::new(0, 0)).is_err());
}

#[test]
fn test_destroy_releases_everything() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let gbuffer = GBuffer::create(&mut device, Extent2D::new(320, 240)).unwrap();

    gbuffer.destroy(&mut device);

    assert_eq!(inspector.live(ResourceKind::Texture), 0);
    assert_eq!(inspector.live(ResourceKind::Framebuffer), 0);
    assert_eq!(inspector.live(ResourceKind::RenderTargetFormat), 0);
    assert_eq!(inspector.invalid_destroys(), 0);
}
