//! Producer-fed scenario.
//!
//! A producer thread pushes Kelvin readings into a bounded queue. The master
//! takes one reading per round with a blocking receive and every worker
//! converts it to Celsius.

use super::{OutcomeLog, ScenarioContext, ScenarioError, ScenarioRun};
use crate::controller::{Directive, Master, RoundOutcome};
use crossbeam_channel::{Receiver, Sender, bounded};
use lockstep_core::{CoreId, FaultInjector, RoundId, SetupError, Workload};
use lockstep_logic::ConsensusChecker;
use rand::Rng;
use std::ops::RangeInclusive;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Readings the producer draws from
pub const KELVIN_RANGE: RangeInclusive<i32> = 283..=303;

/// Kelvin to Celsius offset
pub const ZERO_CELSIUS_KELVIN: i32 = 273;

/// Queue capacity
pub const QUEUE_DEPTH: usize = 16;

/// Interval between readings
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Kelvin → Celsius on every core
#[derive(Debug, Clone)]
pub struct KelvinToCelsius {
    faults: FaultInjector,
}

impl Workload for KelvinToCelsius {
    type Input = i32;
    type Output = i32;

    fn step(&self, core: CoreId, kelvin: i32) -> i32 {
        self.faults.perturb(core, kelvin - ZERO_CELSIUS_KELVIN)
    }
}

/// Master fed by a sensor thread
pub struct TemperatureMaster {
    rounds: u64,
    max_attempts: Option<u32>,
    interval: Duration,
    queue: Option<Receiver<i32>>,
    producer: Option<JoinHandle<u64>>,
    log: OutcomeLog,
}

impl TemperatureMaster {
    /// `rounds` readings, retry cap from `ctx`
    pub fn new(ctx: &ScenarioContext, interval: Duration) -> Self {
        Self {
            rounds: ctx.rounds,
            max_attempts: ctx.max_attempts,
            interval,
            queue: None,
            producer: None,
            log: OutcomeLog::default(),
        }
    }

    /// Outcomes so far
    pub fn log(&self) -> OutcomeLog {
        self.log
    }

    /// Close the queue and wait for the producer. Returns readings produced.
    pub fn finish(&mut self) -> u64 {
        self.queue = None;
        match self.producer.take().map(JoinHandle::join) {
            Some(Ok(produced)) => produced,
            Some(Err(_)) => {
                tracing::error!("Temperature producer panicked");
                0
            }
            None => 0,
        }
    }
}

fn produce(queue: Sender<i32>, interval: Duration) -> u64 {
    let mut rng = rand::thread_rng();
    let mut produced = 0;
    loop {
        let kelvin = rng.gen_range(KELVIN_RANGE);
        if queue.send(kelvin).is_err() {
            return produced;
        }
        produced += 1;
        thread::sleep(interval);
    }
}

impl Master for TemperatureMaster {
    type Input = i32;
    type Output = i32;

    fn setup(&mut self) -> Result<(), SetupError> {
        let (tx, rx) = bounded(QUEUE_DEPTH);
        let interval = self.interval;
        let producer = thread::Builder::new()
            .name("lockstep-sensor".to_string())
            .spawn(move || produce(tx, interval))
            .map_err(|e| SetupError::new(format!("failed to start temperature producer: {e}")))?;
        self.queue = Some(rx);
        self.producer = Some(producer);
        Ok(())
    }

    fn next_round(&mut self) -> Directive<i32> {
        if self.rounds == 0 {
            return Directive::Stop;
        }
        let Some(queue) = &self.queue else {
            return Directive::Stop;
        };
        match queue.recv() {
            Ok(kelvin) => {
                self.rounds -= 1;
                tracing::trace!(kelvin, "Reading taken");
                Directive::Run(kelvin)
            }
            Err(_) => {
                tracing::warn!("Temperature producer closed the queue");
                Directive::Stop
            }
        }
    }

    fn keep_retrying(&mut self, round: RoundId) -> bool {
        self.max_attempts.is_none_or(|max| round.attempt < max)
    }

    fn on_outcome(&mut self, _round: u64, outcome: &RoundOutcome<i32>) {
        self.log.record(outcome);
    }
}

impl Drop for TemperatureMaster {
    fn drop(&mut self) {
        self.finish();
    }
}

pub(super) fn temperature(ctx: &ScenarioContext) -> Result<ScenarioRun, ScenarioError> {
    let workload = KelvinToCelsius {
        faults: ctx.faults.clone(),
    };
    let checker = ConsensusChecker::exact();
    let comparator = checker.comparator_name().to_string();

    let mut master = TemperatureMaster::new(ctx, SAMPLE_INTERVAL);
    let summary = ctx
        .builder("queue/temperature", workload, checker)
        .run(&mut master)?;
    let produced = master.finish();
    tracing::debug!(produced, "Temperature producer stopped");

    let log = master.log();
    let mut warnings = Vec::new();
    if let Some(warning) = log.interruption(ctx.rounds) {
        warnings.push(warning);
    } else if log.completed() < ctx.rounds {
        warnings.push(format!(
            "queue closed after {} of {} rounds",
            log.completed(),
            ctx.rounds
        ));
    }

    Ok(ScenarioRun {
        status: log.status(),
        comparator,
        summary,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::tests::context;
    use lockstep_report::ScenarioStatus;

    #[test]
    fn test_conversion() {
        let workload = KelvinToCelsius {
            faults: FaultInjector::disabled(),
        };
        assert_eq!(workload.step(CoreId(0), 283), 10);
        assert_eq!(workload.step(CoreId(1), 303), 30);
    }

    #[test]
    fn test_master_reads_from_producer() {
        let ctx = context(3);
        let mut master = TemperatureMaster::new(&ctx, Duration::ZERO);
        master.setup().unwrap();
        for _ in 0..3 {
            match master.next_round() {
                Directive::Run(kelvin) => assert!(KELVIN_RANGE.contains(&kelvin)),
                Directive::Stop => panic!("stopped early"),
            }
        }
        assert_eq!(master.next_round(), Directive::Stop);
        assert!(master.finish() >= 3);
    }

    #[test]
    fn test_next_round_without_setup_stops() {
        let ctx = context(3);
        let mut master = TemperatureMaster::new(&ctx, Duration::ZERO);
        assert_eq!(master.next_round(), Directive::Stop);
    }

    #[test]
    fn test_temperature_scenario() {
        let ctx = context(4);
        let run = temperature(&ctx).unwrap();
        assert_eq!(run.status, ScenarioStatus::Agreed);
        assert_eq!(run.summary.stats.rounds, 4);
        assert!(run.warnings.is_empty());
        let celsius: i32 = ctx.recorder.last_agreed().unwrap().parse().unwrap();
        assert!((10..=30).contains(&celsius));
    }
}
