//! Error types for the Prisma renderer
//!
//! One error enum is shared by the device layer, the passes, the pipeline
//! orchestrator and the frame loop.

use std::fmt;

/// Result type for Prisma renderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Prisma renderer errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock device, ...)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (stale handle, unknown buffer, missing asset)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, pass pipeline state)
    InitializationFailed(String),

    /// Operation not allowed in the current lifecycle state
    InvalidState(String),
}

impl Error {
    /// True for errors raised while building GPU objects
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InitializationFailed(_) | Error::OutOfMemory)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
