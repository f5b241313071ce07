//! Report Building
//!
//! Joins execution results with their timing statistics into a `Report`.
//!
//! ```text
//! ScenarioExecution + ScenarioTiming
//!              │
//!              ▼
//!   ┌─────────────────────┐
//!   │   ScenarioReport    │  status, counters, last value, timing, failure
//!   └──────────┬──────────┘
//!              │
//!              ▼
//!   ┌─────────────────────┐
//!   │       Report        │  Ready for human/JSON/CSV output
//!   └─────────────────────┘
//! ```

use super::execution::ScenarioExecution;
use super::metadata::build_report_meta;
use super::statistics::ScenarioTiming;
use lockstep_report::{FailureInfo, Report, ReportConfig, ReportSummary, ScenarioReport};

/// Build a complete Report from execution results
///
/// `timing` must be in the same order as `results`.
pub fn build_report(
    results: &[ScenarioExecution],
    timing: Vec<ScenarioTiming>,
    config: ReportConfig,
    total_duration_ms: f64,
) -> Report {
    let scenario_results: Vec<ScenarioReport> = results
        .iter()
        .zip(timing)
        .map(|(result, timing)| build_scenario_report(result, timing))
        .collect();

    let summary = ReportSummary::from_results(&scenario_results, total_duration_ms);

    Report {
        meta: build_report_meta(config),
        results: scenario_results,
        summary,
    }
}

fn build_scenario_report(result: &ScenarioExecution, timing: ScenarioTiming) -> ScenarioReport {
    let (comparator, stats, warnings, failure) = match &result.outcome {
        Ok(run) => (
            run.comparator.clone(),
            Some(run.summary.stats),
            run.warnings.clone(),
            None,
        ),
        Err(f) => (
            String::new(),
            result.recorder.shutdown_stats(),
            Vec::new(),
            Some(FailureInfo {
                kind: f.kind.clone(),
                message: f.message.clone(),
            }),
        ),
    };

    // A failed scenario may never reach shutdown; fall back to the attempt log.
    let attempts = result.recorder.attempts();
    let (rounds_agreed, attempt_count, disagreements, faults) = match stats {
        Some(s) => (s.rounds, s.attempts, s.disagreements, s.faults),
        None => (
            attempts.iter().filter(|a| !a.outcome.is_disagreed()).count() as u64,
            attempts.len() as u64,
            attempts.iter().filter(|a| a.outcome.is_disagreed()).count() as u64,
            attempts
                .iter()
                .flat_map(|a| &a.cores)
                .filter(|c| c.fault.is_some())
                .count() as u64,
        ),
    };

    ScenarioReport {
        id: result.id.clone(),
        group: result.group.clone(),
        status: result.status(),
        comparator,
        rounds_agreed,
        attempts: attempt_count,
        disagreements,
        faults,
        last_value: result.recorder.last_agreed(),
        timing: timing.cores,
        skew: timing.skew,
        warnings,
        failure,
        duration_ms: result.duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockstepConfig;
    use crate::executor::{ExecutionConfig, ExecutionFailure, compute_statistics};
    use lockstep_report::{RunRecorder, ScenarioStatus};

    #[test]
    fn test_failed_scenario_report() {
        let results = vec![ScenarioExecution {
            id: "queue/temperature".to_string(),
            group: "queue".to_string(),
            outcome: Err(ExecutionFailure {
                kind: "setup".to_string(),
                message: "queue unavailable".to_string(),
            }),
            recorder: RunRecorder::new(),
            duration_ms: 0.5,
        }];
        let timing = compute_statistics(&results);
        let report = build_report(
            &results,
            timing,
            LockstepConfig::default().report_config(),
            1.0,
        );

        assert_eq!(report.summary.failed, 1);
        let scenario = &report.results[0];
        assert_eq!(scenario.status, ScenarioStatus::Failed);
        assert_eq!(scenario.attempts, 0);
        assert!(scenario.timing.is_empty());
        let failure = scenario.failure.as_ref().unwrap();
        assert_eq!(failure.kind, "setup");
    }

    #[test]
    fn test_agreed_scenario_report() {
        let mut config = ExecutionConfig {
            rounds: 3,
            ..ExecutionConfig::default()
        };
        config.pipeline.pin_workers = false;
        let results = crate::executor::Executor::new(config)
            .execute(&[crate::scenarios::find("ops/division").unwrap()]);
        let timing = compute_statistics(&results);
        let report = build_report(
            &results,
            timing,
            LockstepConfig::default().report_config(),
            1.0,
        );

        let scenario = &report.results[0];
        assert_eq!(scenario.status, ScenarioStatus::Agreed);
        assert_eq!(scenario.rounds_agreed, 3);
        assert_eq!(scenario.attempts, 3);
        assert_eq!(scenario.last_value.as_deref(), Some("3"));
        assert_eq!(scenario.comparator, "exact");
        assert_eq!(scenario.timing.len(), 2);
        assert!(scenario.skew.is_some());
        assert_eq!(report.meta.schema, lockstep_report::REPORT_SCHEMA);
        assert_eq!(report.summary.agreed, 1);
    }
}
