//! CSV Output
//!
//! One row per scenario and core.

use crate::report::Report;
use std::fmt::Write;

const HEADER: &str = "id,group,status,rounds_agreed,attempts,disagreements,faults,last_value,core,samples,mean_ns,median_ns,p99_ns,min_ns,max_ns";

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Generate a CSV report. Scenarios without timing get one row with empty core columns.
pub fn generate_csv_report(report: &Report) -> String {
    let mut output = String::new();
    output.push_str(HEADER);
    output.push('\n');

    for result in &report.results {
        let prefix = format!(
            "{},{},{},{},{},{},{},{}",
            escape(&result.id),
            escape(&result.group),
            result.status.as_str(),
            result.rounds_agreed,
            result.attempts,
            result.disagreements,
            result.faults,
            escape(result.last_value.as_deref().unwrap_or("")),
        );

        if result.timing.is_empty() {
            let _ = writeln!(output, "{prefix},,,,,,,");
            continue;
        }
        for timing in &result.timing {
            let s = &timing.summary;
            let _ = writeln!(
                output,
                "{prefix},{},{},{:.1},{:.1},{:.1},{:.1},{:.1}",
                timing.core, s.samples, s.mean_ns, s.median_ns, s.p99_ns, s.min_ns, s.max_ns
            );
        }
    }

    output
}
