//! Integration tests for Lockstep
//!
//! End-to-end runs of the pipeline through the public facade: real worker
//! threads, real channels, real shutdown.

use lockstep::{
    AttemptOutcome, ConsensusChecker, CoreId, Directive, Epsilon, ExitReason, FaultInjector,
    FnComparator, FnWorkload, Master, Pipeline, PipelineConfig, PipelineError, PipelineState,
    RoundOutcome, RunRecorder, StopHandle, Verdict, Workload,
};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

fn config(cores: usize) -> PipelineConfig {
    PipelineConfig {
        cores,
        pin_workers: false,
        ..PipelineConfig::default()
    }
}

/// Adds its operands, perturbed by the injector, and remembers every input it saw
struct RecordingAdder {
    faults: FaultInjector,
    seen: Mutex<Vec<(usize, (i32, i32))>>,
}

impl Workload for RecordingAdder {
    type Input = (i32, i32);
    type Output = i32;

    fn step(&self, core: CoreId, (a, b): (i32, i32)) -> i32 {
        self.seen
            .lock()
            .unwrap()
            .push((core.index(), (a, b)));
        self.faults.perturb(core, a + b)
    }
}

/// Two fault-free workers computing 10 + 3 agree on the first attempt
#[test]
fn test_fault_free_addition_agrees_first_round() {
    let workload = FnWorkload::new(|_core, (a, b): (i32, i32)| a + b);
    let mut pipeline = Pipeline::builder(workload, ConsensusChecker::exact())
        .config(config(2))
        .launch()
        .unwrap();

    let outcome = pipeline.run_round(&(10, 3)).unwrap();
    assert_eq!(
        outcome,
        RoundOutcome::Agreed {
            value: 13,
            attempts: 1
        }
    );
    assert_eq!(pipeline.stats().disagreements, 0);
    pipeline.stop().unwrap();
}

/// One always-faulty core forces retries with the identical input until the
/// drawn fault term happens to be zero
#[test]
fn test_faulty_core_retries_with_identical_input() {
    let workload = RecordingAdder {
        faults: FaultInjector::new(vec![1.0, 0.0], 4).unwrap(),
        seen: Mutex::new(Vec::new()),
    };
    let recorder = RunRecorder::new();
    let mut pipeline = Pipeline::builder(workload, ConsensusChecker::exact())
        .config(config(2))
        .observer(recorder.clone())
        .launch()
        .unwrap();

    let outcome = pipeline.run_round(&(10, 3)).unwrap();
    let summary = pipeline.stop().unwrap();

    match outcome {
        RoundOutcome::Agreed { value, attempts } => {
            assert_eq!(value, 13);
            assert_eq!(u64::from(attempts), summary.stats.attempts);
        }
        other => panic!("expected agreement, got {other:?}"),
    }

    let attempts = recorder.attempts();
    assert_eq!(attempts.len() as u64, summary.stats.attempts);
    let (last, retried) = attempts.split_last().unwrap();
    assert!(matches!(last.outcome, AttemptOutcome::Agreed { .. }));
    for (i, attempt) in retried.iter().enumerate() {
        assert_eq!(attempt.round, 0);
        assert_eq!(attempt.attempt as usize, i + 1);
        assert_eq!(
            attempt.outcome,
            AttemptOutcome::Disagreed { first_mismatch: 0 }
        );
        // Core 1 never faults
        assert_eq!(attempt.cores[1].value.as_deref(), Some("13"));
    }
    assert_eq!(summary.stats.disagreements, retried.len() as u64);
}

/// Every attempt, retries included, reaches every worker exactly once with the same input
#[test]
fn test_every_worker_sees_every_attempt() {
    let workload = Arc::new(RecordingAdder {
        faults: FaultInjector::new(vec![0.0, 0.7, 0.0], 2).unwrap(),
        seen: Mutex::new(Vec::new()),
    });

    struct Shared(Arc<RecordingAdder>);
    impl Workload for Shared {
        type Input = (i32, i32);
        type Output = i32;
        fn step(&self, core: CoreId, input: (i32, i32)) -> i32 {
            self.0.step(core, input)
        }
    }

    let mut pipeline = Pipeline::builder(Shared(Arc::clone(&workload)), ConsensusChecker::exact())
        .config(config(3))
        .launch()
        .unwrap();
    for _ in 0..3 {
        pipeline.run_round(&(10, 3)).unwrap();
    }
    let summary = pipeline.stop().unwrap();

    let seen = workload.seen.lock().unwrap();
    assert_eq!(seen.len() as u64, summary.stats.attempts * 3);
    assert!(seen.iter().all(|(_, input)| *input == (10, 3)));
    for core in 0..3 {
        let per_core = seen.iter().filter(|(c, _)| *c == core).count() as u64;
        assert_eq!(per_core, summary.stats.attempts);
    }
    for exit in &summary.workers {
        assert_eq!(exit.rounds_executed, summary.stats.attempts);
        assert_eq!(exit.reason, ExitReason::Stopped);
    }
}

/// Division by zero reports a sentinel instead of hanging the round
#[test]
fn test_division_by_zero_reports_sentinel() {
    let workload =
        FnWorkload::new(|_core, (a, b): (i32, i32)| a.checked_div(b).unwrap_or(i32::MIN));
    let mut pipeline = Pipeline::builder(workload, ConsensusChecker::exact())
        .config(config(2))
        .launch()
        .unwrap();

    let outcome = pipeline.run_round(&(10, 0)).unwrap();
    assert_eq!(
        outcome,
        RoundOutcome::Agreed {
            value: i32::MIN,
            attempts: 1
        }
    );
    pipeline.stop().unwrap();
}

/// A panicking step still completes the round, as an identical fault on every core
#[test]
fn test_panicking_division_faults_without_hanging() {
    let workload = FnWorkload::new(|_core, (a, b): (i32, i32)| a / b);
    let mut pipeline = Pipeline::builder(workload, ConsensusChecker::exact())
        .config(config(2))
        .launch()
        .unwrap();

    match pipeline.run_round(&(10, 0)).unwrap() {
        RoundOutcome::Faulted { fault, attempts } => {
            assert_eq!(attempts, 1);
            assert!(fault.message.contains("divide by zero"));
        }
        other => panic!("expected fault, got {other:?}"),
    }
    let summary = pipeline.stop().unwrap();
    assert_eq!(summary.stats.faults, 2);
}

fn drifting() -> FnWorkload<(), f64, impl Fn(CoreId, ()) -> f64 + Send + Sync + 'static> {
    FnWorkload::new(|core: CoreId, ()| 7.0001 + core.index() as f64 * 0.0001)
}

/// 7.0001 vs 7.0002 agree under epsilon 0.001 and disagree under exact equality
#[test]
fn test_comparator_override() {
    let checker = ConsensusChecker::new(Epsilon::new(0.001).unwrap());
    let mut pipeline = Pipeline::builder(drifting(), checker)
        .config(config(2))
        .launch()
        .unwrap();
    match pipeline.run_round(&()).unwrap() {
        RoundOutcome::Agreed { value, attempts } => {
            assert_eq!(attempts, 1);
            assert!((value - 7.0001).abs() < 1e-12);
        }
        other => panic!("expected agreement, got {other:?}"),
    }
    pipeline.stop().unwrap();

    let mut pipeline = Pipeline::builder(drifting(), ConsensusChecker::exact())
        .config(config(2))
        .launch()
        .unwrap();
    let verdict = pipeline
        .run_attempt(lockstep::RoundId::first(0), &())
        .unwrap();
    assert_eq!(
        verdict,
        Verdict::Disagreed {
            first_mismatch: CoreId(0)
        }
    );
    assert_eq!(pipeline.state(), PipelineState::Retrying);

    let outcome = pipeline.run_round_with(&(), |_| false).unwrap();
    assert_eq!(outcome, RoundOutcome::Abandoned { attempts: 1 });
    pipeline.stop().unwrap();
}

/// Consensus compares adjacent pairs only
#[test]
fn test_adjacent_pair_semantics() {
    let within_one = FnComparator::new("within-one", false, |a: &i64, b: &i64| (a - b).abs() <= 1);
    let workload = FnWorkload::new(|core: CoreId, ()| core.index() as i64);
    let mut pipeline = Pipeline::builder(workload, ConsensusChecker::new(within_one))
        .config(config(3))
        .launch()
        .unwrap();

    // 0~1 and 1~2 agree even though 0 and 2 do not
    assert_eq!(
        pipeline.run_round(&()).unwrap(),
        RoundOutcome::Agreed {
            value: 0,
            attempts: 1
        }
    );
    pipeline.stop().unwrap();
}

/// Step that rendezvouses with the test thread before and after computing
struct Gated {
    gate: Arc<Barrier>,
}

impl Workload for Gated {
    type Input = (i32, i32);
    type Output = i32;

    fn step(&self, _core: CoreId, (a, b): (i32, i32)) -> i32 {
        self.gate.wait();
        self.gate.wait();
        a + b
    }
}

struct Endless {
    outcomes: Arc<Mutex<Vec<RoundOutcome<i32>>>>,
}

impl Master for Endless {
    type Input = (i32, i32);
    type Output = i32;

    fn next_round(&mut self) -> Directive<(i32, i32)> {
        Directive::Run((10, 3))
    }

    fn on_outcome(&mut self, _round: u64, outcome: &RoundOutcome<i32>) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

/// A stop requested mid-round lets the in-flight round finish before workers exit
#[test]
fn test_stop_mid_round_completes_in_flight_round() {
    let gate = Arc::new(Barrier::new(3));
    let stop = StopHandle::default();
    let recorder = RunRecorder::new();
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let builder = Pipeline::builder(
        Gated {
            gate: Arc::clone(&gate),
        },
        ConsensusChecker::exact(),
    )
    .config(config(2))
    .observer(recorder.clone())
    .stop_handle(stop.clone());

    let mut master = Endless {
        outcomes: Arc::clone(&outcomes),
    };
    let controller = thread::spawn(move || builder.run(&mut master));

    // Both workers are inside their first step
    gate.wait();
    stop.request();
    // Let them finish it
    gate.wait();

    let summary = controller.join().unwrap().unwrap();
    assert_eq!(summary.stats.attempts, 1);
    assert_eq!(summary.stats.rounds, 1);
    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![
            RoundOutcome::Agreed {
                value: 13,
                attempts: 1
            },
            RoundOutcome::Interrupted { attempts: 0 },
        ]
    );

    let attempts = recorder.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].cores.len(), 2);
    assert!(attempts[0].cores.iter().all(|c| c.value.as_deref() == Some("13")));

    assert_eq!(summary.workers.len(), 2);
    assert!(
        summary
            .workers
            .iter()
            .all(|w| w.reason == ExitReason::Stopped && w.rounds_executed == 1)
    );
    assert_eq!(recorder.shutdown_stats(), Some(summary.stats));
}

/// After stop, the pipeline refuses rounds and stop stays idempotent
#[test]
fn test_stopped_pipeline_rejects_rounds() {
    let workload = FnWorkload::new(|_core, x: u32| x * 2);
    let mut pipeline = Pipeline::builder(workload, ConsensusChecker::exact())
        .config(config(2))
        .launch()
        .unwrap();
    pipeline.run_round(&21).unwrap();
    let first = pipeline.stop().unwrap();
    let second = pipeline.stop().unwrap();

    assert_eq!(first, second);
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(matches!(
        pipeline.run_round(&21),
        Err(PipelineError::NotAccepting(PipelineState::Stopped))
    ));
}

/// A controller priority not strictly above the workers is rejected before launch
#[test]
fn test_priority_inversion_rejected() {
    let workload = FnWorkload::new(|_core, x: u32| x);
    let result = Pipeline::builder(workload, ConsensusChecker::exact())
        .config(PipelineConfig {
            controller_priority: 1,
            worker_priority: 1,
            ..config(2)
        })
        .launch();
    assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
}
