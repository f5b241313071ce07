//! Output Formatting
//!
//! Human-readable output for run reports:
//! - Scenarios grouped, each with a status icon (✓ agreed, ⚠ faulted, ↻ abandoned, ✗ failed)
//! - Round, attempt and disagreement counts with the last agreed value
//! - Per-core step timing and cross-core skew
//! - Warnings and failure messages

use lockstep_report::{Report, ScenarioReport, ScenarioStatus};
use std::collections::BTreeMap;

/// Format a report for human-readable terminal display
pub fn format_human_output(report: &Report) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("Lockstep Results\n");
    output.push_str(&"=".repeat(60));
    output.push('\n');
    let config = &report.meta.config;
    output.push_str(&format!(
        "  {} cores  priority {}>{}  {} rounds  {}\n\n",
        config.cores,
        config.controller_priority,
        config.worker_priority,
        config.rounds,
        match config.max_attempts {
            Some(n) => format!("max {n} attempts"),
            None => "unbounded retry".to_string(),
        }
    ));

    let mut groups: BTreeMap<&str, Vec<&ScenarioReport>> = BTreeMap::new();
    for result in &report.results {
        groups.entry(&result.group).or_default().push(result);
    }

    for (group, results) in groups {
        output.push_str(&format!("Group: {}\n", group));
        output.push_str(&"-".repeat(60));
        output.push('\n');

        for result in results {
            format_scenario(&mut output, result);
            output.push('\n');
        }
    }

    output.push_str("Summary\n");
    output.push_str(&"-".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "  Total: {}  Agreed: {}  Faulted: {}  Abandoned: {}  Failed: {}\n",
        report.summary.total_scenarios,
        report.summary.agreed,
        report.summary.faulted,
        report.summary.abandoned,
        report.summary.failed
    ));
    output.push_str(&format!(
        "  Attempts: {}  Disagreements: {}\n",
        report.summary.total_attempts, report.summary.total_disagreements
    ));
    output.push_str(&format!(
        "  Duration: {:.2} ms\n",
        report.summary.total_duration_ms
    ));

    output
}

fn status_icon(status: ScenarioStatus) -> &'static str {
    match status {
        ScenarioStatus::Agreed => "✓",
        ScenarioStatus::Faulted => "⚠",
        ScenarioStatus::Abandoned => "↻",
        ScenarioStatus::Failed => "✗",
    }
}

fn format_scenario(output: &mut String, result: &ScenarioReport) {
    output.push_str(&format!(
        "  {} {} ({})\n",
        status_icon(result.status),
        result.id,
        result.status.as_str()
    ));

    if result.failure.is_none() || result.attempts > 0 {
        output.push_str(&format!(
            "      rounds: {}  attempts: {}  disagreements: {}  faults: {}  comparator: {}\n",
            result.rounds_agreed,
            result.attempts,
            result.disagreements,
            result.faults,
            if result.comparator.is_empty() {
                "-"
            } else {
                &result.comparator
            }
        ));
    }
    if let Some(value) = &result.last_value {
        output.push_str(&format!("      value: {}\n", value));
    }

    for timing in &result.timing {
        let s = &timing.summary;
        output.push_str(&format!(
            "      core{}: mean {:.0} ns  median {:.0} ns  p99 {:.0} ns  ({} samples",
            timing.core, s.mean_ns, s.median_ns, s.p99_ns, s.samples
        ));
        if s.outliers > 0 {
            output.push_str(&format!(", {} outliers", s.outliers));
        }
        if s.mean_cycles > 0.0 {
            output.push_str(&format!(", {:.0} cycles", s.mean_cycles));
        }
        output.push_str(")\n");
    }
    if let Some(skew) = &result.skew {
        if skew.fastest != skew.slowest {
            output.push_str(&format!(
                "      skew: core{} is {:.2}x core{}\n",
                skew.slowest, skew.ratio, skew.fastest
            ));
        }
    }

    for warning in &result.warnings {
        output.push_str(&format!("      warning: {}\n", warning));
    }
    if let Some(failure) = &result.failure {
        output.push_str(&format!(
            "      error ({}): {}\n",
            failure.kind, failure.message
        ));
    }
}
