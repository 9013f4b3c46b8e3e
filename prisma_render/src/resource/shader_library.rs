/// Shader bytecode sources
///
/// Passes ask a `ShaderLibrary` for SPIR-V by name when they build their
/// pipeline state. Compilation toolchains are out of scope: the library only
/// hands back bytes that were produced elsewhere.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// Source of SPIR-V bytecode
pub trait ShaderLibrary: Send + Sync {
    /// Bytecode for `name`, `Error::InvalidResource` when unknown
    fn load(&self, name: &str) -> Result<Vec<u8>>;

    fn contains(&self, name: &str) -> bool {
        self.load(name).is_ok()
    }
}

/// Shader library backed by a map (embedded shaders, tests)
#[derive(Default)]
pub struct InMemoryShaderLibrary {
    shaders: RwLock<FxHashMap<String, Vec<u8>>>,
}

impl InMemoryShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, code: Vec<u8>) {
        let mut shaders = self.shaders.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        shaders.insert(name.into(), code);
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut shaders = self.shaders.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        shaders.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.shaders.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ShaderLibrary for InMemoryShaderLibrary {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let shaders = self
            .shaders
            .read()
            .map_err(|_| Error::BackendError("shader library lock poisoned".to_string()))?;
        shaders
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidResource(format!("shader '{}' not found", name)))
    }

    fn contains(&self, name: &str) -> bool {
        self.shaders.read().map(|s| s.contains_key(name)).unwrap_or(false)
    }
}

/// Shader library reading `<root>/<name>.spv`
pub struct DirectoryShaderLibrary {
    root: PathBuf,
}

impl DirectoryShaderLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.spv", name))
    }
}

impl ShaderLibrary for DirectoryShaderLibrary {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name);
        let code = std::fs::read(&path).map_err(|e| {
            Error::InvalidResource(format!("shader '{}' ({}): {}", name, path.display(), e))
        })?;
        // SPIR-V is a stream of 32-bit words
        if code.is_empty() || code.len() % 4 != 0 {
            return Err(Error::InvalidResource(format!(
                "shader '{}' is not SPIR-V ({} bytes)", name, code.len()
            )));
        }
        Ok(code)
    }

    fn contains(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }
}

#[cfg(test)]
#[path = "shader_library_tests.rs"]
mod tests;
