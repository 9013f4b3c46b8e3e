//! Resource module - explicitly constructed asset services
//!
//! Nothing here is global: the application builds a `ResourceManager` and
//! hands it (or the `Arc<dyn ShaderLibrary>` it holds) to whatever needs it.

mod mesh;
mod shader_library;
mod texture_loader;
mod resource_manager;

pub use mesh::{MeshData, MeshId, Vertex};
pub use shader_library::{ShaderLibrary, InMemoryShaderLibrary, DirectoryShaderLibrary};
pub use texture_loader::{TextureLoader, TextureData, InMemoryTextureLoader};
pub use resource_manager::{ResourceManager, FALLBACK_TEXTURE_NAME};
pub(crate) use resource_manager::load_shader;
