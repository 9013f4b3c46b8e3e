//! Shared helpers for unit tests

use std::sync::{Arc, Mutex};

use crate::log::{self, LogEntry, LogSeverity, Logger};
use crate::pass::BUILTIN_SHADERS;
use crate::resource::{InMemoryShaderLibrary, ResourceManager};

/// SPIR-V magic number, enough for the mock device
pub(crate) const FAKE_SPIRV: [u8; 4] = [0x03, 0x02, 0x23, 0x07];

/// Shader library holding every shader the built-in passes ask for
pub(crate) fn shader_library() -> Arc<InMemoryShaderLibrary> {
    let library = InMemoryShaderLibrary::new();
    for name in BUILTIN_SHADERS {
        library.insert(*name, FAKE_SPIRV.to_vec());
    }
    Arc::new(library)
}

pub(crate) fn resources() -> ResourceManager {
    ResourceManager::new(shader_library())
}

#[derive(Clone, Default)]
pub(crate) struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CaptureLogger {
    pub(crate) fn from_source(&self, source: &str) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect()
    }

    pub(crate) fn count(&self, source: &str, severity: LogSeverity) -> usize {
        self.from_source(source).iter().filter(|e| e.severity == severity).count()
    }
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// Install a capturing logger; pair with `restore_logger()` under #[serial]
pub(crate) fn capture_logs() -> CaptureLogger {
    let capture = CaptureLogger::default();
    log::set_logger(capture.clone());
    log::set_min_severity(LogSeverity::Trace);
    capture
}

pub(crate) fn restore_logger() {
    log::set_min_severity(LogSeverity::Debug);
    log::reset_logger();
}
