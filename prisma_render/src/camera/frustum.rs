/// Frustum: six clipping planes for visibility culling.
///
/// Each plane is a Vec4 (A, B, C, D) where (A, B, C) is the inward-pointing
/// unit normal. A point P is inside when dot(plane, (P, 1)) >= 0 for all six.
///
/// The tests are free functions over `[Vec4; 6]` so hierarchical structures
/// can run them on plane sets they store themselves; `Frustum` wraps the same
/// functions and `FrustumCuller` adds tested/visible counters.

use glam::{Mat4, Vec3, Vec4};
use super::bounds::{AABB, BoundingSphere};

/// Result of a 3-way frustum/AABB classification.
///
/// - `Outside` → skip the entire subtree
/// - `Inside` → accept all children without further testing
/// - `Partial` → test children individually
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumTest {
    Outside,
    Inside,
    Partial,
}

/// Frustum plane indices
pub const PLANE_LEFT: usize = 0;
pub const PLANE_RIGHT: usize = 1;
pub const PLANE_BOTTOM: usize = 2;
pub const PLANE_TOP: usize = 3;
pub const PLANE_NEAR: usize = 4;
pub const PLANE_FAR: usize = 5;

fn signed_distance(plane: &Vec4, point: Vec3) -> f32 {
    plane.truncate().dot(point) + plane.w
}

/// Corner of the box furthest along `normal`
fn positive_vertex(aabb: &AABB, normal: Vec3) -> Vec3 {
    Vec3::new(
        if normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
        if normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
        if normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
    )
}

/// Corner of the box furthest against `normal`
fn negative_vertex(aabb: &AABB, normal: Vec3) -> Vec3 {
    Vec3::new(
        if normal.x >= 0.0 { aabb.min.x } else { aabb.max.x },
        if normal.y >= 0.0 { aabb.min.y } else { aabb.max.y },
        if normal.z >= 0.0 { aabb.min.z } else { aabb.max.z },
    )
}

/// True when `point` is on the inner side of all six planes
pub fn contains_point(planes: &[Vec4; 6], point: Vec3) -> bool {
    planes.iter().all(|plane| signed_distance(plane, point) >= 0.0)
}

/// True when the sphere is at least partially inside
pub fn intersects_sphere(planes: &[Vec4; 6], center: Vec3, radius: f32) -> bool {
    planes.iter().all(|plane| signed_distance(plane, center) >= -radius)
}

/// Classify a sphere as fully inside, straddling or fully outside
pub fn classify_sphere(planes: &[Vec4; 6], center: Vec3, radius: f32) -> FrustumTest {
    let mut all_inside = true;
    for plane in planes {
        let distance = signed_distance(plane, center);
        if distance < -radius {
            return FrustumTest::Outside;
        }
        if distance < radius {
            all_inside = false;
        }
    }
    if all_inside { FrustumTest::Inside } else { FrustumTest::Partial }
}

/// Oriented box test. `rotation` supplies the box axes as its first three
/// columns; translation is ignored. Conservative like `intersects_aabb`.
pub fn intersects_obb(
    planes: &[Vec4; 6],
    center: Vec3,
    half_extents: Vec3,
    rotation: &Mat4,
) -> bool {
    let axes = [
        rotation.x_axis.truncate() * half_extents.x,
        rotation.y_axis.truncate() * half_extents.y,
        rotation.z_axis.truncate() * half_extents.z,
    ];
    planes.iter().all(|plane| {
        let normal = plane.truncate();
        // Box extent projected onto the plane normal
        let radius: f32 = axes.iter().map(|axis| normal.dot(*axis).abs()).sum();
        signed_distance(plane, center) >= -radius
    })
}

/// Conservative box test: may accept boxes just outside a frustum corner,
/// never rejects a visible one.
pub fn intersects_aabb(planes: &[Vec4; 6], aabb: &AABB) -> bool {
    planes.iter().all(|plane| {
        let p_vertex = positive_vertex(aabb, plane.truncate());
        signed_distance(plane, p_vertex) >= 0.0
    })
}

/// Classify a box as fully inside, straddling or fully outside
pub fn classify_aabb(planes: &[Vec4; 6], aabb: &AABB) -> FrustumTest {
    let mut all_inside = true;

    for plane in planes {
        let normal = plane.truncate();

        // If the p-vertex is outside → entire AABB is outside
        if signed_distance(plane, positive_vertex(aabb, normal)) < 0.0 {
            return FrustumTest::Outside;
        }

        // If the n-vertex is outside → AABB straddles this plane
        if signed_distance(plane, negative_vertex(aabb, normal)) < 0.0 {
            all_inside = false;
        }
    }

    if all_inside { FrustumTest::Inside } else { FrustumTest::Partial }
}

/// Six frustum planes: left, right, bottom, top, near, far
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix.
    ///
    /// Gribb & Hartmann: each plane is row3 ± row{0,1,2} of the matrix,
    /// normalized. The near plane uses row3 + row2, which for a 0..1 depth
    /// range sits slightly behind the true near plane and therefore only
    /// ever accepts more, never less.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let row0 = vp.row(0);
        let row1 = vp.row(1);
        let row2 = vp.row(2);
        let row3 = vp.row(3);

        let mut planes = [
            row3 + row0, // Left
            row3 - row0, // Right
            row3 + row1, // Bottom
            row3 - row1, // Top
            row3 + row2, // Near
            row3 - row2, // Far
        ];

        for plane in &mut planes {
            let normal_len = plane.truncate().length();
            if normal_len > 0.0 {
                *plane /= normal_len;
            }
        }

        Self { planes }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        contains_point(&self.planes, point)
    }

    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        intersects_sphere(&self.planes, sphere.center, sphere.radius)
    }

    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        intersects_aabb(&self.planes, aabb)
    }

    pub fn classify_aabb(&self, aabb: &AABB) -> FrustumTest {
        classify_aabb(&self.planes, aabb)
    }

    pub fn classify_sphere(&self, sphere: &BoundingSphere) -> FrustumTest {
        classify_sphere(&self.planes, sphere.center, sphere.radius)
    }

    pub fn intersects_obb(&self, center: Vec3, half_extents: Vec3, rotation: &Mat4) -> bool {
        intersects_obb(&self.planes, center, half_extents, rotation)
    }

    /// Corners where three planes meet: near then far, each
    /// bottom-left, bottom-right, top-left, top-right
    pub fn corners(&self) -> [Vec3; 8] {
        let p = &self.planes;
        let mut corners = [Vec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let x = if i & 1 == 0 { PLANE_LEFT } else { PLANE_RIGHT };
            let y = if i & 2 == 0 { PLANE_BOTTOM } else { PLANE_TOP };
            let z = if i & 4 == 0 { PLANE_NEAR } else { PLANE_FAR };
            *corner = intersect_planes(&p[x], &p[y], &p[z]);
        }
        corners
    }

    /// Mean of the eight corners
    pub fn center(&self) -> Vec3 {
        self.corners().iter().copied().sum::<Vec3>() / 8.0
    }

    /// Radius of a sphere around `center()` enclosing every corner, for
    /// coarse rejection before the plane tests
    pub fn bounding_radius(&self) -> f32 {
        let center = self.center();
        self.corners().iter().map(|c| c.distance(center)).fold(0.0, f32::max)
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.center(), self.bounding_radius())
    }
}

/// Point shared by three planes; the origin when two of them are parallel
fn intersect_planes(a: &Vec4, b: &Vec4, c: &Vec4) -> Vec3 {
    let (na, nb, nc) = (a.truncate(), b.truncate(), c.truncate());
    let denominator = na.dot(nb.cross(nc));
    if denominator.abs() < f32::EPSILON {
        return Vec3::ZERO;
    }
    (nb.cross(nc) * -a.w + nc.cross(na) * -b.w + na.cross(nb) * -c.w) / denominator
}

/// Anything with a world-space bounding sphere, for batch culling
pub trait Bounded {
    fn bounding_sphere(&self) -> BoundingSphere;
}

impl Bounded for BoundingSphere {
    fn bounding_sphere(&self) -> BoundingSphere {
        *self
    }
}

impl Bounded for AABB {
    fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.center(), self.half_extents().length())
    }
}

/// Culling counters for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullingStats {
    pub tested: u32,
    pub visible: u32,
}

impl CullingStats {
    pub fn culled(&self) -> u32 {
        self.tested - self.visible
    }
}

/// Frustum tests with profiling counters
#[derive(Debug, Clone)]
pub struct FrustumCuller {
    frustum: Frustum,
    stats: CullingStats,
}

impl FrustumCuller {
    pub fn new(frustum: Frustum) -> Self {
        Self { frustum, stats: CullingStats::default() }
    }

    /// Replace the planes and clear the counters (once per frame)
    pub fn reset(&mut self, frustum: Frustum) {
        self.frustum = frustum;
        self.stats = CullingStats::default();
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn test_sphere(&mut self, sphere: &BoundingSphere) -> bool {
        let visible = self.frustum.intersects_sphere(sphere);
        self.record(visible)
    }

    pub fn test_aabb(&mut self, aabb: &AABB) -> bool {
        let visible = self.frustum.intersects_aabb(aabb);
        self.record(visible)
    }

    /// Sphere-test every object, replacing `visible` with the survivors in
    /// input order. Counters accumulate like single tests.
    pub fn cull<'a, T: Bounded>(&mut self, objects: &'a [T], visible: &mut Vec<&'a T>) {
        visible.clear();
        visible.reserve(objects.len());
        for object in objects {
            if self.test_sphere(&object.bounding_sphere()) {
                visible.push(object);
            }
        }
    }

    pub fn stats(&self) -> CullingStats {
        self.stats
    }

    fn record(&mut self, visible: bool) -> bool {
        self.stats.tested += 1;
        if visible {
            self.stats.visible += 1;
        }
        visible
    }
}

#[cfg(test)]
#[path = "frustum_tests.rs"]
mod tests;
