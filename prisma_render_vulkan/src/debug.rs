/// Validation layer messenger - routes Vulkan debug messages into the Prisma log
///
/// The callback runs on whatever thread the driver picks, so its settings and
/// counters live in process-wide atomics rather than behind a lock.

use ash::vk;
use colored::*;
use prisma_render::log::{self, LogSeverity};
use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::vulkan_config::{ValidationSeverity, VulkanConfig};

const SOURCE: &str = "prisma::vulkan::validation";

/// Callback settings (0 = disabled)
static SEVERITY: AtomicU8 = AtomicU8::new(0);
static BREAK_ON_ERROR: AtomicBool = AtomicBool::new(false);

static STATS: StatsTracker = StatsTracker::new();

/// Counters of validation messages seen since the device was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

struct StatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl StatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn snapshot(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

fn severity_code(severity: ValidationSeverity) -> u8 {
    match severity {
        ValidationSeverity::ErrorsOnly => 1,
        ValidationSeverity::ErrorsAndWarnings => 2,
        ValidationSeverity::All => 3,
    }
}

/// Severity bits the messenger should be created with
pub(crate) fn severity_flags(severity: ValidationSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match severity {
        ValidationSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        ValidationSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        ValidationSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

/// Map a Vulkan message severity onto the log severity it is reported at
pub(crate) fn log_severity(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogSeverity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        LogSeverity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        LogSeverity::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        LogSeverity::Debug
    } else {
        LogSeverity::Trace
    }
}

/// Arm the callback and reset the counters
pub(crate) fn init_debug_config(config: &VulkanConfig) {
    STATS.reset();
    BREAK_ON_ERROR.store(config.break_on_validation_error, Ordering::Relaxed);
    SEVERITY.store(severity_code(config.validation_severity), Ordering::Relaxed);
}

/// Disarm the callback before the messenger is destroyed
pub(crate) fn cleanup_debug_config() {
    SEVERITY.store(0, Ordering::Relaxed);
    BREAK_ON_ERROR.store(false, Ordering::Relaxed);
}

/// Validation message counters
pub fn validation_stats() -> ValidationStats {
    STATS.snapshot()
}

/// Print a colored summary of the validation counters to stderr
pub fn print_validation_stats_report() {
    let stats = validation_stats();

    if stats.total() == 0 {
        eprintln!("\n{}", "No validation messages".green().bold());
        return;
    }

    eprintln!("\n{}", "=== Validation Statistics ===".bright_blue().bold());
    if stats.errors > 0 {
        eprintln!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        eprintln!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        eprintln!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        eprintln!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    eprintln!("  {} {}", "Total:".white().bold(), stats.total());
}

fn message_type_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

/// Vulkan debug messenger callback
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if SEVERITY.load(Ordering::Relaxed) == 0 || p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = *p_callback_data;
    let message_id = if callback_data.p_message_id_name.is_null() {
        "Unknown"
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_str().unwrap_or("Invalid UTF-8")
    };
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message).to_str().unwrap_or("Invalid UTF-8")
    };

    let severity = log_severity(message_severity);
    match severity {
        LogSeverity::Error => STATS.errors.fetch_add(1, Ordering::Relaxed),
        LogSeverity::Warn => STATS.warnings.fetch_add(1, Ordering::Relaxed),
        LogSeverity::Debug => STATS.info.fetch_add(1, Ordering::Relaxed),
        _ => STATS.verbose.fetch_add(1, Ordering::Relaxed),
    };

    let text = format!("[{}] {}: {}", message_type_name(message_type), message_id, message);
    if severity == LogSeverity::Error {
        log::dispatch_detailed(severity, SOURCE, text, file!(), line!());
    } else {
        log::dispatch(severity, SOURCE, text);
    }

    if severity == LogSeverity::Error && BREAK_ON_ERROR.load(Ordering::Relaxed) {
        eprintln!(
            "\n{}\n  {} [{}]\n",
            "BREAK ON VALIDATION ERROR - aborting".red().bold(),
            message_id.yellow(),
            message_type_name(message_type).cyan()
        );
        std::process::abort();
    }

    vk::FALSE
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
