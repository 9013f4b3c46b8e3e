/// Camera with a tagged projection.
///
/// One concrete type covers perspective and orthographic cameras; the
/// projection variant is chosen at construction and can be swapped later.
/// Right-handed, looking down -Z in view space, depth range 0..1.

use glam::{Mat3, Mat4, Quat, Vec3};
use super::frustum::Frustum;

/// Projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective { fov_y: f32, aspect: f32, near: f32, far: f32 },
    Orthographic { left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32 },
}

impl Projection {
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective { fov_y, aspect, near, far } => {
                Mat4::perspective_rh(fov_y, aspect, near, far)
            }
            Projection::Orthographic { left, right, bottom, top, near, far } => {
                Mat4::orthographic_rh(left, right, bottom, top, near, far)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Vec3,
    orientation: Quat,
    projection: Projection,
    clear_color: [f32; 4],
}

impl Camera {
    pub fn new(projection: Projection) -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            projection,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective { fov_y, aspect, near, far })
    }

    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Orthographic { left, right, bottom, top, near, far })
    }

    // ===== GETTERS =====

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// World-space viewing direction
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    /// Inverse of the camera's world transform
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// projection * view
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    // ===== SETTERS =====

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation.normalize();
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Update the aspect ratio of a perspective projection (no-op for orthographic)
    pub fn set_aspect(&mut self, new_aspect: f32) {
        if let Projection::Perspective { aspect, .. } = &mut self.projection {
            *aspect = new_aspect;
        }
    }

    /// Orient the camera toward `target`.
    ///
    /// Does nothing when `target` coincides with the camera position. When
    /// `up` is parallel to the viewing direction another up axis is picked.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        if forward == Vec3::ZERO {
            return;
        }
        let up = if forward.cross(up).length_squared() < 1e-8 {
            if forward.y.abs() < 0.99 { Vec3::Y } else { Vec3::Z }
        } else {
            up
        };
        let right = forward.cross(up).normalize();
        let true_up = right.cross(forward);
        // Columns: camera X, Y and Z (Z points backward)
        self.orientation = Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward)).normalize();
    }

    /// Snapshot consumed by the render passes
    pub fn data(&self) -> CameraData {
        CameraData {
            view: self.view_matrix(),
            projection: self.projection_matrix(),
            position: self.position,
            clear_color: self.clear_color,
        }
    }
}

/// Per-frame camera snapshot handed to passes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub clear_color: [f32; 4],
}

impl CameraData {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
