#![warn(missing_docs)]
//! Lockstep Report - Observers and Output
//!
//! - `Observer`: per-round events surfaced by the controller (informational only)
//! - `TracingObserver`: emits those events as log lines
//! - `RunRecorder`: keeps them for the report
//! - Report model with JSON and CSV renderers

mod csv;
mod json;
mod observer;
mod recorder;
mod report;

pub use csv::generate_csv_report;
pub use json::{REPORT_SCHEMA, generate_json_report};
pub use observer::{Observer, TracingObserver};
pub use recorder::{AttemptOutcome, AttemptRecord, CoreRecord, RunRecorder};
pub use report::{
    CoreTiming, FailureInfo, Report, ReportConfig, ReportMeta, ReportSummary, ScenarioReport,
    ScenarioStatus, SystemInfo,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// Pretty JSON with the full report
    Json,
    /// One row per scenario and core
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Human => "human",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Human));
        assert!("html".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Csv.to_string(), "csv");
    }
}
