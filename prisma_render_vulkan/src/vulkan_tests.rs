use super::*;

// ============================================================================
// QUEUE FAMILY SELECTION
// ============================================================================

#[test]
fn test_single_family_preferred_when_it_does_both() {
    let graphics = [true, true, false];
    let present = [false, true, true];
    let families = select_queue_families(&graphics, &present).unwrap();
    assert_eq!(families, QueueFamilies { graphics: 1, present: 1 });
}

#[test]
fn test_split_families() {
    let graphics = [true, false];
    let present = [false, true];
    let families = select_queue_families(&graphics, &present).unwrap();
    assert_eq!(families, QueueFamilies { graphics: 0, present: 1 });
}

#[test]
fn test_no_present_support() {
    assert!(select_queue_families(&[true, true], &[false, false]).is_none());
}

#[test]
fn test_no_graphics_support() {
    assert!(select_queue_families(&[false], &[true]).is_none());
}

// ============================================================================
// DEVICE RANKING
// ============================================================================

#[test]
fn test_discrete_gpu_ranks_first() {
    let discrete = device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU);
    let integrated = device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU);
    let cpu = device_type_score(vk::PhysicalDeviceType::CPU);
    assert!(discrete > integrated);
    assert!(integrated > cpu);
}
