use super::*;

fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        current_extent: vk::Extent2D { width: current.0, height: current.1 },
        min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
        max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
        ..Default::default()
    }
}

// ============================================================================
// EXTENT
// ============================================================================

#[test]
fn test_surface_extent_is_used_when_fixed() {
    let extent = surface_extent(vk::Extent2D { width: 800, height: 600 }, Extent2D::new(1, 1));
    assert_eq!(extent, Extent2D::new(800, 600));
}

#[test]
fn test_undefined_surface_extent_uses_fallback() {
    let extent = surface_extent(vk::Extent2D { width: u32::MAX, height: u32::MAX }, Extent2D::new(1280, 720));
    assert_eq!(extent, Extent2D::new(1280, 720));
}

#[test]
fn test_minimized_surface_reports_zero() {
    let extent = surface_extent(vk::Extent2D { width: 0, height: 0 }, Extent2D::new(1280, 720));
    assert!(extent.is_zero());
}

#[test]
fn test_choose_extent_follows_surface() {
    let caps = caps((1080, 1920), (1, 1), (4096, 4096));
    let extent = choose_extent(&caps, Extent2D::new(640, 480));
    assert_eq!((extent.width, extent.height), (1080, 1920));
}

#[test]
fn test_choose_extent_clamps_preferred() {
    let caps = caps((u32::MAX, u32::MAX), (64, 64), (1024, 1024));
    let extent = choose_extent(&caps, Extent2D::new(4000, 10));
    assert_eq!((extent.width, extent.height), (1024, 64));
}

// ============================================================================
// IMAGE COUNT / PRESENT MODE / FORMAT
// ============================================================================

#[test]
fn test_image_count() {
    assert_eq!(choose_image_count(2, 3), 3);
    assert_eq!(choose_image_count(3, 3), 3);
    assert_eq!(choose_image_count(2, 0), 3);
}

#[test]
fn test_vsync_always_uses_fifo() {
    let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_no_vsync_prefers_mailbox_then_immediate() {
    let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);

    let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::IMMEDIATE);

    let modes = [vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_surface_format_prefers_srgb() {
    let formats = [
        vk::SurfaceFormatKHR { format: vk::Format::B8G8R8A8_UNORM, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
        vk::SurfaceFormatKHR { format: vk::Format::B8G8R8A8_SRGB, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
    ];
    let (_, format) = choose_surface_format(&formats).unwrap();
    assert_eq!(format, TextureFormat::B8G8R8A8_SRGB);
}

#[test]
fn test_surface_format_falls_back_to_first_known() {
    let formats = [
        vk::SurfaceFormatKHR { format: vk::Format::A2B10G10R10_UNORM_PACK32, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
        vk::SurfaceFormatKHR { format: vk::Format::R8G8B8A8_UNORM, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
    ];
    let (_, format) = choose_surface_format(&formats).unwrap();
    assert_eq!(format, TextureFormat::R8G8B8A8_UNORM);
}

#[test]
fn test_surface_without_known_format() {
    let formats = [vk::SurfaceFormatKHR {
        format: vk::Format::A2B10G10R10_UNORM_PACK32,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }];
    assert!(choose_surface_format(&formats).is_none());
}

// ============================================================================
// ACQUIRE / PRESENT OUTCOMES
// ============================================================================

#[test]
fn test_acquire_outcomes() {
    assert_eq!(acquire_outcome(Ok((1, false))).unwrap(), AcquireOutcome::Image(1));
    assert_eq!(acquire_outcome(Ok((2, true))).unwrap(), AcquireOutcome::Suboptimal(2));
    assert_eq!(acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(), AcquireOutcome::OutOfDate);
    assert!(acquire_outcome(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
}

#[test]
fn test_present_outcomes() {
    assert_eq!(present_outcome(Ok(false)).unwrap(), PresentOutcome::Presented);
    assert_eq!(present_outcome(Ok(true)).unwrap(), PresentOutcome::Suboptimal);
    assert_eq!(present_outcome(Err(vk::Result::SUBOPTIMAL_KHR)).unwrap(), PresentOutcome::Suboptimal);
    assert_eq!(present_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(), PresentOutcome::OutOfDate);
    assert!(present_outcome(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
}
