//! Integration tests for pipelines driven through the Renderer
//!
//! Every test runs the full frame loop against the recording mock device.

mod mock_test_utils;

use prisma_render::prisma::device::mock::{MockGraphicsDevice, RecordedCommand};
use prisma_render::prisma::render::{
    BackgroundPass, CompositionPass, OpaquePass, RenderPipeline, TransparentPass,
};
use prisma_render::prisma::scene::Skybox;
use prisma_render::prisma::{PipelineKind, Renderer, RendererConfig};
use mock_test_utils::{count, renderer, resources, scene_with, shader_library};

// ============================================================================
// END-TO-END
// ============================================================================

#[test]
fn test_integration_single_triangle_frame() {
    let device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let mut pipeline = RenderPipeline::new("opaque_only", 2);
    pipeline.add_pass(OpaquePass::new(shader_library())).unwrap();
    let mut res = resources();
    let scene = scene_with(&mut res, &[(5.0, 1.0)]);

    let mut renderer = Renderer::with_pipeline(Box::new(device), RendererConfig::default(), res, pipeline).unwrap();
    renderer.load_scene(&scene).unwrap();
    renderer.render_frame(&scene).unwrap();

    let submissions = inspector.submissions();
    assert_eq!(submissions.len(), 1);
    let commands = &submissions[0];
    assert_eq!(count(commands, |c| matches!(c, RecordedCommand::SetViewport(_))), 1);
    assert_eq!(
        count(commands, |c| matches!(c, RecordedCommand::SetConstantBuffer { name, .. } if name == "ViewProjection")),
        1
    );
    assert_eq!(count(commands, |c| *c == RecordedCommand::Draw { vertex_count: 3, first_vertex: 0 }), 1);
    assert_eq!(commands.first(), Some(&RecordedCommand::Begin));
    assert_eq!(commands.last(), Some(&RecordedCommand::End));
}

#[test]
fn test_integration_deferred_frame() {
    let config = RendererConfig { pipeline: PipelineKind::Deferred, ..RendererConfig::default() };
    let (mut renderer, inspector) = renderer(config);
    let scene = scene_with(renderer.resources_mut(), &[(5.0, 1.0), (7.0, 0.4)]);
    renderer.load_scene(&scene).unwrap();
    renderer.render_frame(&scene).unwrap();

    let commands = &inspector.submissions()[0];
    assert_eq!(count(commands, |c| matches!(c, RecordedCommand::BeginRenderPass { .. })), 3);
    assert_eq!(
        count(commands, |c| matches!(c, RecordedCommand::SetConstantBuffer { name, .. } if name == "Composition")),
        1
    );
    assert!(renderer.pipeline().pass::<CompositionPass>().is_some());
}

// ============================================================================
// ORDERING
// ============================================================================

#[test]
fn test_integration_auto_sorted_pipeline_records_by_priority() {
    let device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let library = shader_library();
    let mut pipeline = RenderPipeline::new("sorted", 2).with_auto_sort(true);
    pipeline.add_pass(TransparentPass::new(library.clone())).unwrap();
    pipeline.add_pass(OpaquePass::new(library.clone())).unwrap();
    pipeline.add_pass(BackgroundPass::new(library)).unwrap();
    assert_eq!(pipeline.pass_names(), vec!["Background", "Opaque", "Transparent"]);

    let mut res = resources();
    let scene = scene_with(&mut res, &[(5.0, 1.0)]);
    let mut renderer = Renderer::with_pipeline(Box::new(device), RendererConfig::default(), res, pipeline).unwrap();
    renderer.load_scene(&scene).unwrap();
    renderer.render_frame(&scene).unwrap();

    // Background's clear quad is recorded before the opaque triangle
    let commands = &inspector.submissions()[0];
    let clear = commands.iter().position(|c| *c == RecordedCommand::Draw { vertex_count: 4, first_vertex: 0 });
    let triangle = commands.iter().position(|c| *c == RecordedCommand::Draw { vertex_count: 3, first_vertex: 0 });
    assert!(clear.unwrap() < triangle.unwrap());
}

// ============================================================================
// BACKGROUND FALLBACK
// ============================================================================

#[test]
fn test_integration_missing_skybox_falls_back_to_clear() {
    let (mut renderer, inspector) = renderer(RendererConfig::default());
    let mut scene = scene_with(renderer.resources_mut(), &[]);
    let sky = scene.create_game_object("sky");
    scene.add_component(sky, Skybox::new("missing_cubemap")).unwrap();

    renderer.load_scene(&scene).unwrap();
    renderer.render_frame(&scene).unwrap();

    let background = renderer.pipeline().pass::<BackgroundPass>().unwrap();
    assert!(!background.has_texture());
    let commands = &inspector.submissions()[0];
    assert_eq!(count(commands, |c| *c == RecordedCommand::Draw { vertex_count: 4, first_vertex: 0 }), 1);
    assert_eq!(
        count(commands, |c| matches!(c, RecordedCommand::SetConstantBuffer { name, .. } if name == "ClearColor")),
        1
    );
}
