/// Light value type consumed by the lighting pass

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightType {
    Directional,
    #[default]
    Point,
    Spot,
}

impl LightType {
    fn shader_index(self) -> f32 {
        match self {
            LightType::Directional => 0.0,
            LightType::Point => 1.0,
            LightType::Spot => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub light_type: LightType,
    pub position: Vec3,
    /// Unit direction the light travels (directional and spot)
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Attenuation radius (point and spot)
    pub range: f32,
    /// Inner and outer cone half-angles in radians (spot)
    pub inner_cone: f32,
    pub outer_cone: f32,
    pub cast_shadows: bool,
    pub shadow_map_index: u32,
    /// Light-space view projection for shadow map rendering. Kept on the CPU:
    /// `LightConstants` carries only the shadow map index, which keeps a light
    /// and the ambient term inside the 128-byte push constant minimum.
    pub shadow_matrix: Mat4,
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            light_type: LightType::Directional,
            direction: direction.normalize_or_zero(),
            color,
            intensity,
            ..Self::default()
        }
    }

    pub fn point(position: Vec3, color: Vec3, intensity: f32, range: f32) -> Self {
        Self { light_type: LightType::Point, position, color, intensity, range, ..Self::default() }
    }

    pub fn spot(position: Vec3, direction: Vec3, inner_cone: f32, outer_cone: f32) -> Self {
        Self {
            light_type: LightType::Spot,
            position,
            direction: direction.normalize_or_zero(),
            inner_cone,
            outer_cone: outer_cone.max(inner_cone),
            ..Self::default()
        }
    }

    pub fn with_shadows(mut self, shadow_map_index: u32, shadow_matrix: Mat4) -> Self {
        self.cast_shadows = true;
        self.shadow_map_index = shadow_map_index;
        self.shadow_matrix = shadow_matrix;
        self
    }

    /// Packed form pushed as the lighting pass "Light" constant
    pub fn constants(&self) -> LightConstants {
        LightConstants {
            position_range: [self.position.x, self.position.y, self.position.z, self.range],
            direction_type: [
                self.direction.x,
                self.direction.y,
                self.direction.z,
                self.light_type.shader_index(),
            ],
            color_intensity: [self.color.x, self.color.y, self.color.z, self.intensity],
            cone_shadow: [
                self.inner_cone.cos(),
                self.outer_cone.cos(),
                if self.cast_shadows { 1.0 } else { 0.0 },
                if self.cast_shadows { self.shadow_map_index as f32 } else { -1.0 },
            ],
        }
    }
}

impl Default for Light {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            inner_cone: 0.5,
            outer_cone: 1.0,
            cast_shadows: false,
            shadow_map_index: u32::MAX,
            shadow_matrix: Mat4::IDENTITY,
        }
    }
}

/// GPU layout of one light (64 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightConstants {
    pub position_range: [f32; 4],
    pub direction_type: [f32; 4],
    pub color_intensity: [f32; 4],
    /// cos(inner), cos(outer), shadows on, shadow map index
    pub cone_shadow: [f32; 4],
}
