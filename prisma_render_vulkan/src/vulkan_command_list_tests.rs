use super::*;
use prisma_render::prisma::device::ShaderStages;

fn slots() -> Vec<ConstantSlot> {
    vec![
        ConstantSlot::new("ViewProjection", 0, 64, ShaderStages::VERTEX),
        ConstantSlot::new("Params", 64, 16, ShaderStages::FRAGMENT),
    ]
}

#[test]
fn test_constant_offset_of_named_slot() {
    assert_eq!(constant_offset("pso", &slots(), "ViewProjection", 64).unwrap(), 0);
    assert_eq!(constant_offset("pso", &slots(), "Params", 16).unwrap(), 64);
}

#[test]
fn test_partial_slot_write_is_allowed() {
    assert_eq!(constant_offset("pso", &slots(), "Params", 8).unwrap(), 64);
}

#[test]
fn test_unknown_slot_is_rejected() {
    let err = constant_offset("pso", &slots(), "Model", 64).unwrap_err();
    assert!(matches!(err, Error::InvalidResource(_)));
}

#[test]
fn test_oversized_write_is_rejected() {
    assert!(constant_offset("pso", &slots(), "Params", 32).is_err());
}

#[test]
fn test_unaligned_or_empty_write_is_rejected() {
    assert!(constant_offset("pso", &slots(), "Params", 6).is_err());
    assert!(constant_offset("pso", &slots(), "Params", 0).is_err());
}
