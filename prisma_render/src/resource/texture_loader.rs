/// Texture sources
///
/// Image decoding lives outside the renderer; a `TextureLoader` returns
/// already decoded texels or fails, and the ResourceManager decides what a
/// failure means (fallback texture for materials, no skybox for cubemaps).

use std::sync::RwLock;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::graphics_device::{Extent2D, TextureFormat, TextureKind};

/// Decoded texels ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub extent: Extent2D,
    pub format: TextureFormat,
    pub kind: TextureKind,
    /// Tightly packed, every layer in order
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// 2D RGBA8 texture filled with one color
    pub fn solid(extent: Extent2D, rgba: [u8; 4]) -> Self {
        let count = (extent.width * extent.height) as usize;
        Self {
            extent,
            format: TextureFormat::R8G8B8A8_UNORM,
            kind: TextureKind::Texture2D,
            pixels: rgba.repeat(count),
        }
    }

    /// Cubemap with one solid color per face (+X -X +Y -Y +Z -Z)
    pub fn solid_cube(size: u32, faces: [[u8; 4]; 6]) -> Self {
        let texels = (size * size) as usize;
        let pixels = faces.iter().flat_map(|rgba| rgba.repeat(texels)).collect();
        Self {
            extent: Extent2D::new(size, size),
            format: TextureFormat::R8G8B8A8_UNORM,
            kind: TextureKind::Cube,
            pixels,
        }
    }
}

/// Source of decoded textures
pub trait TextureLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<TextureData>;
}

/// Texture loader backed by a map
#[derive(Default)]
pub struct InMemoryTextureLoader {
    textures: RwLock<FxHashMap<String, TextureData>>,
}

impl InMemoryTextureLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, data: TextureData) {
        let mut textures = self.textures.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        textures.insert(name.into(), data);
    }
}

impl TextureLoader for InMemoryTextureLoader {
    fn load(&self, name: &str) -> Result<TextureData> {
        let textures = self
            .textures
            .read()
            .map_err(|_| Error::BackendError("texture loader lock poisoned".to_string()))?;
        textures
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidResource(format!("texture '{}' not found", name)))
    }
}
