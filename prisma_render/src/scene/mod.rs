//! Scene module
//!
//! The scene is the owner of game objects and their components. The render
//! side only sees the `RenderList` it produces each frame: drawables split
//! into opaque and transparent buckets, lights, the skybox and a camera
//! snapshot.

mod component;
mod light;
mod render_list;
mod scene;
mod transform;

pub use component::{
    Component, ComponentArena, ComponentKind, Material, MeshRenderer, Skybox,
    TRANSPARENCY_CUTOFF,
};
pub use light::{Light, LightConstants, LightType};
pub use render_list::{RenderItem, RenderList};
pub use scene::{GameObject, GameObjectId, Scene};
pub use transform::Transform;
