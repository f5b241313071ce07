//! Lockstep Example: checksums in lockstep
//!
//! Every core computes an FNV-1a checksum of its own copy of a buffer; the
//! master feeds a few buffers and prints each agreed checksum. Core 1 is
//! given a 30% chance of corrupting its result so the retry path shows up.
//!
//! Run with:
//!   cargo run --example checksum

use lockstep::prelude::*;
use lockstep::{FaultInjector, TracingObserver};

struct Checksum {
    faults: FaultInjector,
}

impl Workload for Checksum {
    type Input = Vec<u8>;
    type Output = u64;

    fn step(&self, core: CoreId, buffer: Vec<u8>) -> u64 {
        let hash = buffer.iter().fold(0xcbf2_9ce4_8422_2325_u64, |h, &b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
        hash.wrapping_add(self.faults.fault_term(core) as u64)
    }
}

struct Buffers {
    next: u8,
    count: u8,
}

impl Master for Buffers {
    type Input = Vec<u8>;
    type Output = u64;

    fn next_round(&mut self) -> Directive<Vec<u8>> {
        if self.next == self.count {
            return Directive::Stop;
        }
        self.next += 1;
        Directive::Run((0..=self.next).cycle().take(4096).collect())
    }

    fn on_outcome(&mut self, round: u64, outcome: &RoundOutcome<u64>) {
        match outcome {
            RoundOutcome::Agreed { value, attempts } => {
                println!("round {round}: {value:#018x} after {attempts} attempt(s)")
            }
            other => println!("round {round}: {other:?}"),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let workload = Checksum {
        faults: FaultInjector::new(vec![0.0, 0.3], 8)?,
    };
    let summary = Pipeline::builder(workload, ConsensusChecker::exact())
        .config(PipelineConfig {
            pin_workers: false,
            ..PipelineConfig::default()
        })
        .observer(TracingObserver::new("checksum"))
        .run(&mut Buffers { next: 0, count: 5 })?;

    println!(
        "{} rounds, {} attempts, {} disagreements",
        summary.stats.rounds, summary.stats.attempts, summary.stats.disagreements
    );
    Ok(())
}
