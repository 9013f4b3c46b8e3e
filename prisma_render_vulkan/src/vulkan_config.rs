//! Vulkan-specific device options

/// Which validation messages reach the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationSeverity {
    ErrorsOnly,
    #[default]
    ErrorsAndWarnings,
    /// Errors, warnings, info and verbose
    All,
}

/// Options consumed by `VulkanGraphicsDevice::new`
///
/// Whether validation is requested at all is decided by
/// `RendererConfig::enable_validation` or the `vulkan-validation` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanConfig {
    pub validation_severity: ValidationSeverity,
    /// Abort the process on the first validation error
    pub break_on_validation_error: bool,
}

impl VulkanConfig {
    /// Validation is on when the renderer asks for it or the crate feature forces it
    pub fn validation_enabled(renderer_requested: bool) -> bool {
        renderer_requested || cfg!(feature = "vulkan-validation")
    }
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            validation_severity: ValidationSeverity::default(),
            break_on_validation_error: false,
        }
    }
}

#[cfg(test)]
#[path = "vulkan_config_tests.rs"]
mod tests;
