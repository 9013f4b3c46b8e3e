use std::any::Any;
use std::sync::{Arc, Mutex};

use super::*;
use crate::config::PipelineKind;
use crate::graphics_device::mock::{MockCommandList, MockGraphicsDevice, RecordedCommand};
use crate::graphics_device::{FramebufferDesc, ResourceKind, TextureDesc, TextureFormat};
use crate::pass::test_helpers::{backbuffer_format, frame, render_list, scene_with, EXTENT};
use crate::test_support::{resources, shader_library};

// ============================================================================
// Fixtures
// ============================================================================

type Journal = Arc<Mutex<Vec<String>>>;

/// Records every lifecycle call it receives
struct JournalPass {
    name: String,
    priority: i32,
    target: PassTarget,
    fail_initialize: bool,
    initialized: bool,
    journal: Journal,
}

impl JournalPass {
    fn new(name: &str, priority: i32, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            priority,
            target: PassTarget::Backbuffer,
            fail_initialize: false,
            initialized: false,
            journal: journal.clone(),
        }
    }

    fn targeting(mut self, target: PassTarget) -> Self {
        self.target = target;
        self
    }

    fn failing(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    fn log(&self, event: &str) {
        self.journal.lock().unwrap().push(format!("{}:{}", self.name, event));
    }
}

impl Pass for JournalPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn target(&self) -> PassTarget {
        self.target
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn initialize(&mut self, _device: &mut dyn GraphicsDevice, _setup: &PassSetup) -> Result<()> {
        self.log("initialize");
        if self.fail_initialize {
            return Err(Error::InitializationFailed(format!("{} refused", self.name)));
        }
        self.initialized = true;
        Ok(())
    }

    fn record(&mut self, cmd: &mut dyn CommandList, _frame: &FrameState) {
        self.log("record");
        cmd.draw(3, 0).unwrap();
    }

    fn cleanup(&mut self, _device: &mut dyn GraphicsDevice) {
        if self.initialized {
            self.log("cleanup");
        }
        self.initialized = false;
    }

    fn release(&mut self, _device: &mut dyn GraphicsDevice) {
        self.log("release");
    }

    fn stats(&self) -> PassStats {
        PassStats { draw_calls: 1, triangles: 1, ..PassStats::default() }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Journal, event: &str) -> Vec<String> {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.strip_suffix(&format!(":{}", event)).map(str::to_string))
        .collect()
}

fn backbuffer(
    device: &mut MockGraphicsDevice,
    format: RenderTargetFormatHandle,
) -> FramebufferHandle {
    let color_desc = TextureDesc::attachment("bb_color", EXTENT, TextureFormat::B8G8R8A8_SRGB);
    let color = device.create_texture(&color_desc).unwrap();
    let depth_desc = TextureDesc::attachment("bb_depth", EXTENT, TextureFormat::D32_FLOAT);
    let depth = device.create_texture(&depth_desc).unwrap();
    device
        .create_framebuffer(&FramebufferDesc {
            name: "bb".to_string(),
            format,
            color: vec![color],
            depth: Some(depth),
            extent: EXTENT,
        })
        .unwrap()
}

fn record(
    pipeline: &mut RenderPipeline,
    device: &mut MockGraphicsDevice,
    fb: FramebufferHandle,
) -> Vec<RecordedCommand> {
    let mut cmd = device.create_command_list().unwrap();
    pipeline.execute(cmd.as_mut(), &frame(0), fb).unwrap();
    cmd.as_any().downcast_ref::<MockCommandList>().unwrap().commands.clone()
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_insertion_order_without_auto_sort() {
    let journal = journal();
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("late", 500, &journal)).unwrap();
    pipeline.add_pass(JournalPass::new("early", 100, &journal)).unwrap();

    assert_eq!(pipeline.pass_names(), vec!["late", "early"]);
}

#[test]
fn test_auto_sort_is_stable() {
    let journal = journal();
    let mut pipeline = RenderPipeline::new("test", 2).with_auto_sort(true);
    pipeline.add_pass(JournalPass::new("c", 300, &journal)).unwrap();
    pipeline.add_pass(JournalPass::new("a1", 100, &journal)).unwrap();
    pipeline.add_pass(JournalPass::new("b", 200, &journal)).unwrap();
    pipeline.add_pass(JournalPass::new("a2", 100, &journal)).unwrap();

    assert_eq!(pipeline.pass_names(), vec!["a1", "a2", "b", "c"]);
}

#[test]
fn test_execute_records_in_order() {
    let journal = journal();
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let fb = backbuffer(&mut device, format);

    let mut pipeline = RenderPipeline::new("test", 2).with_auto_sort(true);
    pipeline.add_pass(JournalPass::new("second", 2, &journal)).unwrap();
    pipeline.add_pass(JournalPass::new("first", 1, &journal)).unwrap();
    pipeline.initialize(&mut device, format, EXTENT).unwrap();
    let commands = record(&mut pipeline, &mut device, fb);

    assert_eq!(entries(&journal, "record"), vec!["first", "second"]);
    assert!(matches!(commands.first(), Some(RecordedCommand::BeginRenderPass { framebuffer, .. }) if *framebuffer == fb));
    assert_eq!(commands.last(), Some(&RecordedCommand::EndRenderPass));
    assert_eq!(pipeline.state(), PipelineState::Executing);
}

// ============================================================================
// State machine
// ============================================================================

#[test]
fn test_add_pass_after_initialize_is_rejected() {
    let journal = journal();
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("a", 0, &journal)).unwrap();
    pipeline.initialize(&mut device, format, EXTENT).unwrap();

    let err = pipeline.add_pass(JournalPass::new("b", 0, &journal)).unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert_eq!(pipeline.pass_count(), 1);
}

#[test]
fn test_double_initialize_is_rejected() {
    let journal = journal();
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("a", 0, &journal)).unwrap();
    pipeline.initialize(&mut device, format, EXTENT).unwrap();

    assert!(matches!(pipeline.initialize(&mut device, format, EXTENT), Err(Error::InvalidState(_))));
}

#[test]
fn test_execute_before_initialize_is_rejected() {
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let fb = backbuffer(&mut device, format);
    let mut pipeline = RenderPipeline::new("test", 2);
    let mut cmd = device.create_command_list().unwrap();

    let err = pipeline.execute(cmd.as_mut(), &frame(0), fb).unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn test_cleanup_then_reinitialize() {
    let journal = journal();
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("a", 0, &journal)).unwrap();
    pipeline.add_pass(JournalPass::new("b", 0, &journal)).unwrap();

    pipeline.initialize(&mut device, format, EXTENT).unwrap();
    pipeline.cleanup(&mut device);
    assert_eq!(pipeline.state(), PipelineState::Cleaned);
    assert_eq!(entries(&journal, "cleanup"), vec!["b", "a"]);

    pipeline.initialize(&mut device, format, EXTENT).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Initialized);
    assert_eq!(entries(&journal, "initialize"), vec!["a", "b", "a", "b"]);
}

#[test]
fn test_failed_initialize_cleans_up_earlier_passes() {
    let journal = journal();
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("ok", 0, &journal)).unwrap();
    pipeline.add_pass(JournalPass::new("broken", 0, &journal).failing()).unwrap();
    pipeline.add_pass(JournalPass::new("never", 0, &journal)).unwrap();

    let err = pipeline.initialize(&mut device, format, EXTENT).unwrap_err();

    assert!(matches!(err, Error::InitializationFailed(_)));
    assert_eq!(entries(&journal, "initialize"), vec!["ok", "broken"]);
    assert_eq!(entries(&journal, "cleanup"), vec!["ok"]);
    assert!(!pipeline.is_initialized());
}

#[test]
fn test_split_target_run_is_rejected() {
    let journal = journal();
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("a", 0, &journal)).unwrap();
    pipeline.add_pass(JournalPass::new("g", 0, &journal).targeting(PassTarget::GBuffer)).unwrap();
    pipeline.add_pass(JournalPass::new("b", 0, &journal)).unwrap();

    let err = pipeline.initialize(&mut device, format, EXTENT).unwrap_err();
    assert!(matches!(err, Error::InitializationFailed(_)));
}

#[test]
fn test_shutdown_releases_everything() {
    let journal = journal();
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let format = backbuffer_format(&mut device);
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("g", 0, &journal).targeting(PassTarget::GBuffer)).unwrap();
    pipeline.add_pass(JournalPass::new("b", 0, &journal)).unwrap();
    pipeline.initialize(&mut device, format, EXTENT).unwrap();
    assert!(pipeline.gbuffer().is_some());

    pipeline.shutdown(&mut device);

    assert_eq!(entries(&journal, "release"), vec!["b", "g"]);
    assert!(pipeline.gbuffer().is_none());
    assert_eq!(inspector.live(ResourceKind::Texture), 0);
    assert_eq!(inspector.live(ResourceKind::Framebuffer), 0);
    assert_eq!(inspector.invalid_destroys(), 0);
}

// ============================================================================
// Targets
// ============================================================================

#[test]
fn test_one_render_pass_per_target_run() {
    let journal = journal();
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let fb = backbuffer(&mut device, format);
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("g1", 0, &journal).targeting(PassTarget::GBuffer)).unwrap();
    pipeline.add_pass(JournalPass::new("g2", 0, &journal).targeting(PassTarget::GBuffer)).unwrap();
    pipeline.add_pass(JournalPass::new("lit", 0, &journal).targeting(PassTarget::LitColor)).unwrap();
    pipeline.add_pass(JournalPass::new("final", 0, &journal)).unwrap();
    pipeline.initialize(&mut device, format, EXTENT).unwrap();

    let commands = record(&mut pipeline, &mut device, fb);
    let framebuffers: Vec<FramebufferHandle> = commands
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::BeginRenderPass { framebuffer, .. } => Some(*framebuffer),
            _ => None,
        })
        .collect();

    let gbuffer = pipeline.gbuffer().unwrap();
    let lit = pipeline.lit_target().unwrap();
    assert_eq!(framebuffers, vec![gbuffer.framebuffer(), lit.framebuffer(), fb]);
    assert_eq!(lit.depth(), gbuffer.depth());
    assert_eq!(commands.iter().filter(|c| **c == RecordedCommand::EndRenderPass).count(), 3);
}

#[test]
fn test_backbuffer_clear_uses_camera_color() {
    let journal = journal();
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let fb = backbuffer(&mut device, format);
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("a", 0, &journal)).unwrap();
    pipeline.initialize(&mut device, format, EXTENT).unwrap();

    let commands = record(&mut pipeline, &mut device, fb);
    let Some(RecordedCommand::BeginRenderPass { clear_values, .. }) = commands.first() else {
        panic!("expected a render pass first");
    };
    assert_eq!(clear_values[0], ClearValue::Color(frame(0).camera.clear_color));
    assert_eq!(clear_values[1], ClearValue::DepthStencil { depth: 1.0, stencil: 0 });
}

#[test]
fn test_reinitialize_resizes_targets() {
    let journal = journal();
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let format = backbuffer_format(&mut device);
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("g", 0, &journal).targeting(PassTarget::GBuffer)).unwrap();
    pipeline.add_pass(JournalPass::new("lit", 0, &journal).targeting(PassTarget::LitColor)).unwrap();
    pipeline.initialize(&mut device, format, EXTENT).unwrap();
    let textures = inspector.live(ResourceKind::Texture);

    pipeline.cleanup(&mut device);
    pipeline.initialize(&mut device, format, Extent2D::new(1024, 768)).unwrap();

    assert_eq!(pipeline.extent(), Extent2D::new(1024, 768));
    assert_eq!(pipeline.gbuffer().unwrap().extent(), Extent2D::new(1024, 768));
    assert_eq!(pipeline.lit_target().unwrap().depth(), pipeline.gbuffer().unwrap().depth());
    assert_eq!(inspector.live(ResourceKind::Texture), textures);
    assert_eq!(inspector.invalid_destroys(), 0);
}

#[test]
fn test_viewport_override_reaches_passes() {
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let fb = backbuffer(&mut device, format);
    let mut res = resources();
    let scene = scene_with(&mut res, &[(5.0, 1.0)]);
    let list = render_list(&scene, &res);

    let config = RendererConfig::default();
    let mut pipeline = RenderPipeline::forward(shader_library(), &config).unwrap();
    pipeline.build(&mut device, &list, &mut res).unwrap();
    pipeline.initialize(&mut device, format, EXTENT).unwrap();

    let half = Viewport { width: 400.0, ..Viewport::from_extent(EXTENT) };
    pipeline.set_viewport(half);
    let commands = record(&mut pipeline, &mut device, fb);
    assert!(commands.contains(&RecordedCommand::SetViewport(half)));

    pipeline.reset_viewport();
    let commands = record(&mut pipeline, &mut device, fb);
    assert!(!commands.contains(&RecordedCommand::SetViewport(half)));
}

// ============================================================================
// Built-in pipelines
// ============================================================================

#[test]
fn test_forward_pipeline_layout() {
    let pipeline = RenderPipeline::forward(shader_library(), &RendererConfig::default()).unwrap();
    assert_eq!(pipeline.pass_names(), vec!["Background", "Opaque", "Transparent"]);
    assert!(pipeline.pass::<OpaquePass>().is_some());
    assert!(pipeline.pass::<GeometryPass>().is_none());
}

#[test]
fn test_deferred_pipeline_runs_end_to_end() {
    let mut device = MockGraphicsDevice::new();
    let inspector = device.inspector();
    let format = backbuffer_format(&mut device);
    let fb = backbuffer(&mut device, format);
    let mut res = resources();
    let scene = scene_with(&mut res, &[(5.0, 1.0), (8.0, 0.5)]);
    let list = render_list(&scene, &res);

    let config = RendererConfig { pipeline: PipelineKind::Deferred, ..RendererConfig::default() };
    let mut pipeline = RenderPipeline::deferred(shader_library(), &config).unwrap();
    assert_eq!(
        pipeline.pass_names(),
        vec!["Geometry", "Background", "Lighting", "Transparent", "Composition"]
    );

    pipeline.build(&mut device, &list, &mut res).unwrap();
    pipeline.initialize(&mut device, format, EXTENT).unwrap();
    pipeline.update(&frame(0));
    pipeline.sync_scene(&mut device, &list, &mut res);
    pipeline.prepare(&mut device, &frame(0)).unwrap();
    let commands = record(&mut pipeline, &mut device, fb);

    let render_passes = commands
        .iter()
        .filter(|c| matches!(c, RecordedCommand::BeginRenderPass { .. }))
        .count();
    assert_eq!(render_passes, 3);
    assert!(pipeline.stats().draw_calls >= 4);

    pipeline.shutdown(&mut device);
    assert_eq!(inspector.live(ResourceKind::Pipeline), 0);
    assert_eq!(inspector.live(ResourceKind::DescriptorSet), 0);
    assert_eq!(inspector.invalid_destroys(), 0);
}

#[test]
fn test_pass_mut_reaches_concrete_pass() {
    let mut pipeline = RenderPipeline::forward(shader_library(), &RendererConfig::default()).unwrap();
    assert!(pipeline.pass_mut::<TransparentPass>().is_some());
    assert!(pipeline.find_pass_mut("Opaque").is_some());
    assert!(pipeline.find_pass("Lighting").is_none());
}

#[test]
fn test_stats_sum_every_pass() {
    let journal = journal();
    let mut pipeline = RenderPipeline::new("test", 2);
    pipeline.add_pass(JournalPass::new("a", 0, &journal)).unwrap();
    pipeline.add_pass(JournalPass::new("b", 0, &journal)).unwrap();

    assert_eq!(pipeline.stats().draw_calls, 2);
    assert_eq!(pipeline.stats().triangles, 2);
}

/// Pipeline binds and draws of one frame of a two-object opaque scene
fn recorded_frame(config: &RendererConfig) -> (Vec<String>, usize, usize) {
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let fb = backbuffer(&mut device, format);
    let mut res = resources();
    let scene = scene_with(&mut res, &[(5.0, 1.0), (8.0, 1.0)]);
    let list = render_list(&scene, &res);

    let mut pipeline = match config.pipeline {
        PipelineKind::Forward => RenderPipeline::forward(shader_library(), config),
        PipelineKind::Deferred => RenderPipeline::deferred(shader_library(), config),
    }
    .unwrap();
    pipeline.build(&mut device, &list, &mut res).unwrap();
    pipeline.initialize(&mut device, format, EXTENT).unwrap();
    pipeline.update(&frame(0));
    pipeline.sync_scene(&mut device, &list, &mut res);
    pipeline.prepare(&mut device, &frame(0)).unwrap();
    let commands = record(&mut pipeline, &mut device, fb);

    let names = pipeline.pass_names().into_iter().map(str::to_string).collect();
    let binds = commands.iter().filter(|c| matches!(c, RecordedCommand::BindPipeline(_))).count();
    let draws = commands
        .iter()
        .filter(|c| matches!(c, RecordedCommand::Draw { vertex_count: 3, first_vertex: 0 }))
        .count();
    (names, binds, draws)
}

#[test]
fn test_forward_depth_prepass_draws_depth_first() {
    let plain = RendererConfig::default();
    let prepass = RendererConfig { depth_prepass: true, ..RendererConfig::default() };

    let (names, binds, _) = recorded_frame(&plain);
    assert!(!names.iter().any(|n| n == "DepthPrePass"));
    let (prepass_names, prepass_binds, _) = recorded_frame(&prepass);

    let depth = prepass_names.iter().position(|n| *n == "DepthPrePass").unwrap();
    let opaque = prepass_names.iter().position(|n| *n == "Opaque").unwrap();
    assert!(depth < opaque);
    assert_eq!(prepass_binds, binds + 1);
}

#[test]
fn test_deferred_depth_prepass_runs_before_geometry() {
    let plain = RendererConfig { pipeline: PipelineKind::Deferred, ..RendererConfig::default() };
    let prepass = RendererConfig { depth_prepass: true, ..plain.clone() };

    let (_, binds, draws) = recorded_frame(&plain);
    let (names, prepass_binds, prepass_draws) = recorded_frame(&prepass);

    assert_eq!(&names[..2], ["DepthPrePass", "Geometry"]);
    assert_eq!(prepass_binds, binds + 1);
    // Both opaque objects are drawn once more, depth only
    assert_eq!(prepass_draws, draws + 2);
}

#[test]
fn test_pass_stats_carry_record_time() {
    let mut device = MockGraphicsDevice::new();
    let format = backbuffer_format(&mut device);
    let fb = backbuffer(&mut device, format);
    let journal = journal();
    let mut pipeline = RenderPipeline::new("timed", 2);
    pipeline.add_pass(JournalPass::new("a", 0, &journal)).unwrap();
    pipeline.add_pass(JournalPass::new("b", 1, &journal)).unwrap();

    assert!(pipeline.pass_stats().iter().all(|(_, s)| s.cpu_time.is_zero()));

    pipeline.initialize(&mut device, format, EXTENT).unwrap();
    record(&mut pipeline, &mut device, fb);

    let stats = pipeline.pass_stats();
    let names: Vec<&str> = stats.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["a", "b"]);
    let total: std::time::Duration = stats.iter().map(|(_, s)| s.cpu_time).sum();
    assert_eq!(pipeline.stats().cpu_time, total);
    assert_eq!(pipeline.stats().draw_calls, 2);
}
