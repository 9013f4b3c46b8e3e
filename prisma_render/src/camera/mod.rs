//! Camera module: tagged-projection camera, bounding volumes and frustum culling.
//!
//! The Scene owns cameras. Passes only ever see a `CameraData` snapshot taken
//! when the render list is collected.

mod bounds;
mod camera;
mod frustum;

pub use bounds::{AABB, BoundingSphere};
pub use camera::{Camera, CameraData, Projection};
pub use frustum::{
    Bounded, Frustum, FrustumCuller, FrustumTest, CullingStats,
    contains_point, intersects_sphere, intersects_aabb, intersects_obb, classify_aabb,
    classify_sphere,
    PLANE_LEFT, PLANE_RIGHT, PLANE_BOTTOM, PLANE_TOP, PLANE_NEAR, PLANE_FAR,
};
