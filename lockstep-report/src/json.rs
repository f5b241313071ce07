//! JSON Output

use crate::report::Report;

/// Identifier written into `meta.schema`
pub const REPORT_SCHEMA: &str = "lockstep-report";

/// Generate a prettified JSON report.
pub fn generate_json_report(report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
