//! Unit tests for error.rs

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("queue submit failed".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("queue submit failed"));
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");
}

#[test]
fn test_invalid_resource_display() {
    let err = Error::InvalidResource("stale buffer handle".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid resource"));
    assert!(display.contains("stale buffer handle"));
}

#[test]
fn test_initialization_failed_display() {
    let err = Error::InitializationFailed("shader 'opaque.vert' not found".to_string());
    assert!(format!("{}", err).starts_with("Initialization failed"));
}

#[test]
fn test_invalid_state_display() {
    let err = Error::InvalidState("add_pass after initialize".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid state"));
    assert!(display.contains("add_pass"));
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[test]
fn test_fatal_errors() {
    assert!(Error::InitializationFailed("x".into()).is_fatal());
    assert!(Error::OutOfMemory.is_fatal());
    assert!(!Error::InvalidResource("x".into()).is_fatal());
    assert!(!Error::InvalidState("x".into()).is_fatal());
    assert!(!Error::BackendError("x".into()).is_fatal());
}

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_result_propagation() {
    fn inner() -> Result<u32> {
        Err(Error::InvalidResource("missing".to_string()))
    }
    fn outer() -> Result<u32> {
        let value = inner()?;
        Ok(value + 1)
    }
    assert_eq!(outer(), Err(Error::InvalidResource("missing".to_string())));
}
