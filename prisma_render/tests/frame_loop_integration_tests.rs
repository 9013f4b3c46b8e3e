//! Integration tests for frame-in-flight synchronization and swapchain loss
//!
//! The mock device models fences: a submitted fence only signals when it is
//! waited on, so any write into a slot whose GPU work is pending would show
//! up as a write between that slot's submit and its next wait.

mod mock_test_utils;

use prisma_render::prisma::device::mock::DeviceEvent;
use prisma_render::prisma::device::{AcquireOutcome, Extent2D, PresentOutcome, ResourceKind, SurfaceTransform};
use prisma_render::prisma::RendererConfig;
use mock_test_utils::{renderer, scene_with};

// ============================================================================
// FRAME-IN-FLIGHT ORDERING
// ============================================================================

#[test]
fn test_integration_uniform_writes_wait_for_slot_fence() {
    let (mut renderer, inspector) = renderer(RendererConfig::default());
    let scene = scene_with(renderer.resources_mut(), &[(5.0, 1.0)]);
    renderer.load_scene(&scene).unwrap();
    inspector.clear_events();

    for _ in 0..6 {
        renderer.render_frame(&scene).unwrap();
    }

    // Per slot: "pending" between a submit and the next wait on that fence
    let mut pending = [false; 2];
    let mut writes = 0;
    for event in inspector.events() {
        match event {
            DeviceEvent::Submit { fence: Some(name), .. } => {
                let slot = if name.ends_with('0') { 0 } else { 1 };
                pending[slot] = true;
            }
            DeviceEvent::WaitFence { name } => {
                let slot = if name.ends_with('0') { 0 } else { 1 };
                pending[slot] = false;
            }
            DeviceEvent::WriteBuffer { name, .. } if name.contains("_ubo_frame") => {
                let slot = if name.ends_with('0') { 0 } else { 1 };
                assert!(!pending[slot], "'{}' written while its slot was in flight", name);
                writes += 1;
            }
            _ => {}
        }
    }
    assert_eq!(writes, 6);
}

#[test]
fn test_integration_slots_alternate() {
    let (mut renderer, inspector) = renderer(RendererConfig::default());
    let scene = scene_with(renderer.resources_mut(), &[(5.0, 1.0)]);
    renderer.load_scene(&scene).unwrap();
    inspector.clear_events();

    for _ in 0..4 {
        renderer.render_frame(&scene).unwrap();
    }

    let fences: Vec<String> = inspector
        .events()
        .into_iter()
        .filter_map(|e| match e {
            DeviceEvent::Submit { fence: Some(name), .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(fences, vec!["in_flight_frame0", "in_flight_frame1", "in_flight_frame0", "in_flight_frame1"]);
}

// ============================================================================
// SWAPCHAIN LOSS
// ============================================================================

#[test]
fn test_integration_double_recreation_keeps_one_pso_per_pass() {
    let (mut renderer, inspector) = renderer(RendererConfig::default());
    let scene = scene_with(renderer.resources_mut(), &[(5.0, 1.0), (6.0, 0.5)]);
    renderer.load_scene(&scene).unwrap();
    let passes = renderer.pipeline().pass_count() as u32;

    inspector.queue_acquire(AcquireOutcome::OutOfDate);
    renderer.render_frame(&scene).unwrap();
    inspector.queue_present(PresentOutcome::OutOfDate);
    renderer.render_frame(&scene).unwrap();
    renderer.render_frame(&scene).unwrap();

    let stats = renderer.stats();
    assert_eq!(stats.recoveries, 2);
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(stats.frames_rendered, 2);
    assert_eq!(inspector.live(ResourceKind::Pipeline), passes);
    assert_eq!(inspector.live(ResourceKind::Swapchain), 1);
    assert_eq!(inspector.live(ResourceKind::Framebuffer), 3);
    assert_eq!(inspector.invalid_destroys(), 0);
}

#[test]
fn test_integration_rotation_leaves_scene_untouched() {
    let (mut renderer, inspector) = renderer(RendererConfig::default());
    let scene = scene_with(renderer.resources_mut(), &[(5.0, 1.0)]);
    renderer.load_scene(&scene).unwrap();
    let objects = scene.game_object_count();
    let buffers = inspector.live(ResourceKind::Buffer);

    inspector.set_surface_transform(SurfaceTransform::Rotate90);
    inspector.set_surface_extent(Extent2D::new(600, 800));
    assert!(renderer.on_config_changed().unwrap());
    renderer.render_frame(&scene).unwrap();

    assert_eq!(renderer.extent(), Extent2D::new(600, 800));
    assert_eq!(scene.game_object_count(), objects);
    // Per-drawable buffers survive recovery
    assert_eq!(inspector.live(ResourceKind::Buffer), buffers);
}

#[test]
fn test_integration_deferred_recovery_resizes_gbuffer() {
    let config = RendererConfig { pipeline: prisma_render::prisma::PipelineKind::Deferred, ..RendererConfig::default() };
    let (mut renderer, inspector) = renderer(config);
    let scene = scene_with(renderer.resources_mut(), &[(5.0, 1.0)]);
    renderer.load_scene(&scene).unwrap();

    inspector.set_surface_extent(Extent2D::new(1280, 720));
    renderer.resize(1280, 720);
    renderer.render_frame(&scene).unwrap();

    let gbuffer = renderer.pipeline().gbuffer().unwrap();
    assert_eq!(gbuffer.extent(), Extent2D::new(1280, 720));
    assert_eq!(renderer.pipeline().lit_target().unwrap().depth(), gbuffer.depth());
    assert_eq!(inspector.invalid_destroys(), 0);
}
