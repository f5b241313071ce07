//! System Metadata Collection
//!
//! Collects host information for report metadata:
//!
//! - **OS**: family and kernel release
//! - **CPU**: model name and available core count
//! - **Timestamp**: UTC time of report generation
//!
//! Linux-specific data (CPU model, kernel release) degrades to "Unknown" or
//! the target architecture on other platforms.

use chrono::Utc;
use lockstep_core::available_cores;
use lockstep_report::{REPORT_SCHEMA, ReportConfig, ReportMeta, SystemInfo};

/// Current report schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Build report metadata for a run under `config`
pub fn build_report_meta(config: ReportConfig) -> ReportMeta {
    let system = SystemInfo {
        os: std::env::consts::OS.to_string(),
        os_version: get_os_release().unwrap_or_else(|| std::env::consts::ARCH.to_string()),
        cpu: get_cpu_model().unwrap_or_else(|| "Unknown".to_string()),
        cpu_cores: available_cores() as u32,
    };

    ReportMeta {
        schema: REPORT_SCHEMA.to_string(),
        schema_version: SCHEMA_VERSION,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        system,
        config,
    }
}

/// Get CPU model name from /proc/cpuinfo (Linux only)
fn get_cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Kernel release (Linux only)
fn get_os_release() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
