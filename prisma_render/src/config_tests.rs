use super::*;

#[test]
fn test_default_config() {
    let config = RendererConfig::default();
    assert_eq!(config.frames_in_flight(), MAX_FRAMES_IN_FLIGHT);
    assert_eq!(config.pipeline, PipelineKind::Forward);
    assert!(!config.auto_sort_passes);
    assert!(config.frustum_culling);
}

#[test]
fn test_frames_in_flight_clamped() {
    let mut config = RendererConfig::default();

    config.frames_in_flight = 0;
    assert_eq!(config.frames_in_flight(), 1);

    config.frames_in_flight = 8;
    assert_eq!(config.frames_in_flight(), 3);
}
