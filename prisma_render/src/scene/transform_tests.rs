use glam::{Mat4, Quat, Vec3};
use super::*;

#[test]
fn test_identity_matrix() {
    assert_eq!(Transform::default().matrix(), Mat4::IDENTITY);
}

#[test]
fn test_scale_then_rotate_then_translate() {
    let transform = Transform::from_position(Vec3::new(10.0, 0.0, 0.0))
        .with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2))
        .with_scale(Vec3::splat(2.0));

    // (1,0,0) → scaled (2,0,0) → rotated (0,2,0) → translated (10,2,0)
    let p = transform.matrix().transform_point3(Vec3::X);
    assert!((p - Vec3::new(10.0, 2.0, 0.0)).length() < 1e-5);
}
