use super::*;
use crate::gbuffer::GBuffer;
use crate::graphics_device::mock::MockGraphicsDevice;
use crate::graphics_device::ResourceKind;

#[test]
fn test_owned_depth_target() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let target = LitColorTarget::create(&mut device, Extent2D::new(640, 480), None).unwrap();

    assert_eq!(inspector.live(ResourceKind::Texture), 2);
    target.destroy(&mut device);
    assert_eq!(inspector.live(ResourceKind::Texture), 0);
    assert_eq!(inspector.live(ResourceKind::RenderTargetFormat), 0);
}

#[test]
fn test_shared_depth_is_not_destroyed() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let gbuffer = GBuffer::create(&mut device, Extent2D::new(640, 480)).unwrap();
    let target = LitColorTarget::create(&mut device, Extent2D::new(640, 480), Some(gbuffer.depth())).unwrap();
    assert_eq!(target.depth(), gbuffer.depth());

    target.destroy(&mut device);
    gbuffer.destroy(&mut device);
    assert_eq!(inspector.live(ResourceKind::Texture), 0);
    assert_eq!(inspector.invalid_destroys(), 0);
}

#[test]
fn test_resize_follows_gbuffer_depth() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut gbuffer = GBuffer::create(&mut device, Extent2D::new(640, 480)).unwrap();
    let mut target = LitColorTarget::create(&mut device, Extent2D::new(640, 480), Some(gbuffer.depth())).unwrap();
    let old_color = target.color();

    gbuffer.resize(&mut device, Extent2D::new(480, 640)).unwrap();
    target.resize(&mut device, Extent2D::new(480, 640), Some(gbuffer.depth())).unwrap();

    assert_eq!(target.extent(), Extent2D::new(480, 640));
    assert_eq!(target.depth(), gbuffer.depth());
    assert_ne!(target.color(), old_color);
    assert_eq!(inspector.live(ResourceKind::Framebuffer), 2);
    assert_eq!(inspector.invalid_destroys(), 0);
}
