/// ResourceManager - explicitly constructed asset service
///
/// Owns the shader library, the optional texture loader, the mesh table and
/// the GPU textures created from loaded images. The white 1x1 fallback
/// texture is created on first use and shared by every material whose
/// texture could not be loaded.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, ShaderDesc, ShaderHandle, ShaderStage, TextureDesc, TextureHandle,
    TextureKind, TextureUsage, Extent2D,
};
use crate::{engine_debug, engine_warn};
use super::mesh::{MeshData, MeshId};
use super::shader_library::ShaderLibrary;
use super::texture_loader::{TextureData, TextureLoader};

const SOURCE: &str = "prisma::ResourceManager";

/// Name of the white 1x1 texture used when a material texture fails to load
pub const FALLBACK_TEXTURE_NAME: &str = "__fallback_white";

pub struct ResourceManager {
    shaders: Arc<dyn ShaderLibrary>,
    textures: Option<Arc<dyn TextureLoader>>,
    meshes: SlotMap<MeshId, MeshData>,
    texture_cache: FxHashMap<String, TextureHandle>,
    fallback: Option<TextureHandle>,
}

impl ResourceManager {
    pub fn new(shaders: Arc<dyn ShaderLibrary>) -> Self {
        Self {
            shaders,
            textures: None,
            meshes: SlotMap::with_key(),
            texture_cache: FxHashMap::default(),
            fallback: None,
        }
    }

    pub fn with_texture_loader(mut self, loader: Arc<dyn TextureLoader>) -> Self {
        self.textures = Some(loader);
        self
    }

    // ===== SHADERS =====

    pub fn shader_library(&self) -> Arc<dyn ShaderLibrary> {
        Arc::clone(&self.shaders)
    }

    /// Load bytecode and create a shader module; missing shaders are fatal
    pub fn load_shader(
        &self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        stage: ShaderStage,
    ) -> Result<ShaderHandle> {
        load_shader(self.shaders.as_ref(), device, name, stage)
    }

    // ===== MESHES =====

    pub fn add_mesh(&mut self, mesh: MeshData) -> MeshId {
        self.meshes.insert(mesh)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshData> {
        self.meshes.get(id)
    }

    pub fn remove_mesh(&mut self, id: MeshId) -> Option<MeshData> {
        self.meshes.remove(id)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    // ===== TEXTURES =====

    /// GPU texture for a material.
    ///
    /// Loading failures are not errors: the fallback texture is returned and
    /// a warning logged. Only a failure to create the fallback itself
    /// propagates.
    pub fn texture(&mut self, device: &mut dyn GraphicsDevice, name: &str) -> Result<TextureHandle> {
        if let Some(handle) = self.texture_cache.get(name) {
            return Ok(*handle);
        }

        match self.load_texture(device, name, TextureKind::Texture2D) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                engine_warn!(SOURCE, "Texture '{}' unavailable ({}), using fallback", name, e);
                self.fallback_texture(device)
            }
        }
    }

    /// GPU cubemap, `None` when it cannot be loaded
    pub fn cubemap(&mut self, device: &mut dyn GraphicsDevice, name: &str) -> Option<TextureHandle> {
        if let Some(handle) = self.texture_cache.get(name) {
            return Some(*handle);
        }

        match self.load_texture(device, name, TextureKind::Cube) {
            Ok(handle) => Some(handle),
            Err(e) => {
                engine_warn!(SOURCE, "Cubemap '{}' unavailable: {}", name, e);
                None
            }
        }
    }

    /// GPU 2D texture for an optional input, `None` instead of the fallback
    pub fn optional_texture(&mut self, device: &mut dyn GraphicsDevice, name: &str) -> Option<TextureHandle> {
        if let Some(handle) = self.texture_cache.get(name) {
            return Some(*handle);
        }

        match self.load_texture(device, name, TextureKind::Texture2D) {
            Ok(handle) => Some(handle),
            Err(e) => {
                engine_warn!(SOURCE, "Optional texture '{}' unavailable: {}", name, e);
                None
            }
        }
    }

    /// White 1x1 texture, created on first use
    pub fn fallback_texture(&mut self, device: &mut dyn GraphicsDevice) -> Result<TextureHandle> {
        if let Some(handle) = self.fallback {
            return Ok(handle);
        }
        let data = TextureData::solid(Extent2D::new(1, 1), [255, 255, 255, 255]);
        let handle = device.create_texture(&texture_desc(FALLBACK_TEXTURE_NAME, data))?;
        self.fallback = Some(handle);
        Ok(handle)
    }

    pub fn cached_texture_count(&self) -> usize {
        self.texture_cache.len()
    }

    /// Destroy every GPU texture this manager created
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for (name, handle) in self.texture_cache.drain() {
            engine_debug!(SOURCE, "Destroying texture '{}'", name);
            device.destroy_texture(handle);
        }
        if let Some(handle) = self.fallback.take() {
            device.destroy_texture(handle);
        }
    }

    fn load_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        kind: TextureKind,
    ) -> Result<TextureHandle> {
        let loader = self
            .textures
            .as_ref()
            .ok_or_else(|| Error::InvalidResource("no texture loader configured".to_string()))?;
        let data = loader.load(name)?;
        if data.kind != kind {
            return Err(Error::InvalidResource(format!(
                "texture '{}' is {:?}, expected {:?}", name, data.kind, kind
            )));
        }
        let handle = device.create_texture(&texture_desc(name, data))?;
        self.texture_cache.insert(name.to_string(), handle);
        Ok(handle)
    }
}

/// Shared by passes holding only the shader library
pub(crate) fn load_shader(
    library: &dyn ShaderLibrary,
    device: &mut dyn GraphicsDevice,
    name: &str,
    stage: ShaderStage,
) -> Result<ShaderHandle> {
    let code = library
        .load(name)
        .map_err(|e| Error::InitializationFailed(format!("shader '{}': {}", name, e)))?;
    device.create_shader(&ShaderDesc {
        name: name.to_string(),
        stage,
        code,
        entry_point: "main".to_string(),
    })
}

fn texture_desc(name: &str, data: TextureData) -> TextureDesc {
    TextureDesc {
        name: name.to_string(),
        extent: data.extent,
        format: data.format,
        usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
        kind: data.kind,
        data: Some(data.pixels),
    }
}

#[cfg(test)]
#[path = "resource_manager_tests.rs"]
mod tests;
