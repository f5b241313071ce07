//! Report Data Structures

use chrono::{DateTime, Utc};
use lockstep_stats::{CoreSkew, TimingSummary};
use serde::{Deserialize, Serialize};

/// Complete run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Run metadata
    pub meta: ReportMeta,
    /// One entry per executed scenario, in execution order
    pub results: Vec<ScenarioReport>,
    /// Totals
    pub summary: ReportSummary,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Schema identifier
    pub schema: String,
    /// Schema version
    pub schema_version: u32,
    /// Harness version
    pub version: String,
    /// Run start
    pub timestamp: DateTime<Utc>,
    /// Host description
    pub system: SystemInfo,
    /// Effective configuration
    pub config: ReportConfig,
}

/// Pipeline configuration captured in report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Worker count
    pub cores: usize,
    /// Controller priority level
    pub controller_priority: i32,
    /// Worker priority level
    pub worker_priority: i32,
    /// Whether workers were pinned
    pub pin_workers: bool,
    /// Agreed rounds requested per scenario
    pub rounds: u64,
    /// Caller-level attempt cap per round
    pub max_attempts: Option<u32>,
    /// Per-core fault probability
    pub fault_probability: Vec<f64>,
    /// Largest injected fault term
    pub max_magnitude: u32,
    /// Tolerance for epsilon scenarios
    pub epsilon: f64,
}

/// Host description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system family
    pub os: String,
    /// Kernel or OS release
    pub os_version: String,
    /// CPU model
    pub cpu: String,
    /// Available CPUs
    pub cpu_cores: u32,
}

/// How a scenario ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    /// Every requested round agreed
    Agreed,
    /// Some round ended with every core faulting identically
    Faulted,
    /// The attempt cap was hit before a round agreed
    Abandoned,
    /// Setup or resource failure
    Failed,
}

impl ScenarioStatus {
    /// Lowercase name, as serialized
    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioStatus::Agreed => "agreed",
            ScenarioStatus::Faulted => "faulted",
            ScenarioStatus::Abandoned => "abandoned",
            ScenarioStatus::Failed => "failed",
        }
    }

    /// Whether this status should fail the process
    pub fn is_fatal(self) -> bool {
        matches!(self, ScenarioStatus::Failed)
    }
}

/// Timing for one core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreTiming {
    /// Core index
    pub core: usize,
    /// Step time summary
    #[serde(flatten)]
    pub summary: TimingSummary,
}

/// Failure information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Error category
    pub kind: String,
    /// Error message
    pub message: String,
}

/// One scenario's outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario id
    pub id: String,
    /// Scenario group
    pub group: String,
    /// Final status
    pub status: ScenarioStatus,
    /// Comparator used for consensus
    pub comparator: String,
    /// Rounds that reached agreement
    pub rounds_agreed: u64,
    /// Dispatches, retries included
    pub attempts: u64,
    /// Attempts that disagreed
    pub disagreements: u64,
    /// Core results carrying a fault
    pub faults: u64,
    /// Last agreed value (`Debug` rendering)
    pub last_value: Option<String>,
    /// Per-core step timing
    pub timing: Vec<CoreTiming>,
    /// Slowest/fastest core gap
    pub skew: Option<CoreSkew>,
    /// Scenario-specific warnings (lost updates and similar)
    pub warnings: Vec<String>,
    /// Set when status is `failed`
    pub failure: Option<FailureInfo>,
    /// Wall time of the scenario
    pub duration_ms: f64,
}

/// Report summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Scenarios executed
    pub total_scenarios: usize,
    /// Scenarios with status `agreed`
    pub agreed: usize,
    /// Scenarios with status `faulted`
    pub faulted: usize,
    /// Scenarios with status `abandoned`
    pub abandoned: usize,
    /// Scenarios with status `failed`
    pub failed: usize,
    /// Attempts across all scenarios
    pub total_attempts: u64,
    /// Disagreements across all scenarios
    pub total_disagreements: u64,
    /// Wall time of the run
    pub total_duration_ms: f64,
}

impl ReportSummary {
    /// Tally `results`
    pub fn from_results(results: &[ScenarioReport], total_duration_ms: f64) -> Self {
        let mut summary = ReportSummary {
            total_scenarios: results.len(),
            total_duration_ms,
            ..Default::default()
        };
        for result in results {
            match result.status {
                ScenarioStatus::Agreed => summary.agreed += 1,
                ScenarioStatus::Faulted => summary.faulted += 1,
                ScenarioStatus::Abandoned => summary.abandoned += 1,
                ScenarioStatus::Failed => summary.failed += 1,
            }
            summary.total_attempts += result.attempts;
            summary.total_disagreements += result.disagreements;
        }
        summary
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn scenario(id: &str, status: ScenarioStatus) -> ScenarioReport {
        ScenarioReport {
            id: id.to_string(),
            group: "ops".to_string(),
            status,
            comparator: "exact".to_string(),
            rounds_agreed: 2,
            attempts: 3,
            disagreements: 1,
            faults: 0,
            last_value: Some("13".to_string()),
            timing: vec![CoreTiming {
                core: 0,
                summary: TimingSummary {
                    samples: 3,
                    mean_ns: 120.0,
                    median_ns: 110.0,
                    ..Default::default()
                },
            }],
            skew: None,
            warnings: Vec::new(),
            failure: None,
            duration_ms: 1.0,
        }
    }

    pub(crate) fn report(results: Vec<ScenarioReport>) -> Report {
        let summary = ReportSummary::from_results(&results, 2.0);
        Report {
            meta: ReportMeta {
                schema: crate::REPORT_SCHEMA.to_string(),
                schema_version: 1,
                version: "0.1.0".to_string(),
                timestamp: Utc::now(),
                system: SystemInfo {
                    os: "linux".to_string(),
                    os_version: "6.0".to_string(),
                    cpu: "test".to_string(),
                    cpu_cores: 2,
                },
                config: ReportConfig {
                    cores: 2,
                    controller_priority: 2,
                    worker_priority: 1,
                    pin_workers: false,
                    rounds: 2,
                    max_attempts: None,
                    fault_probability: vec![0.0, 0.0],
                    max_magnitude: 4,
                    epsilon: 0.001,
                },
            },
            results,
            summary,
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = ReportSummary::from_results(
            &[
                scenario("ops/addition", ScenarioStatus::Agreed),
                scenario("ops/division", ScenarioStatus::Faulted),
                scenario("queue/temperature", ScenarioStatus::Failed),
            ],
            5.0,
        );
        assert_eq!(summary.total_scenarios, 3);
        assert_eq!(summary.agreed, 1);
        assert_eq!(summary.faulted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_attempts, 9);
        assert_eq!(summary.total_disagreements, 3);
    }

    #[test]
    fn test_json_roundtrip_keeps_status() {
        let report = report(vec![scenario("ops/addition", ScenarioStatus::Abandoned)]);
        let json = crate::generate_json_report(&report).unwrap();
        assert!(json.contains("\"status\": \"abandoned\""));
        assert!(json.contains("\"median_ns\": 110.0"));
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.results[0].status, ScenarioStatus::Abandoned);
        assert_eq!(parsed.summary, report.summary);
    }
}
