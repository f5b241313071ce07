//! Adjacent-pair consensus over one round of core results.

use crate::comparator::{Comparator, Exact};
use lockstep_core::{CoreId, CoreResult, StepFault};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of checking one round
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<T> {
    /// Every adjacent pair agreed; carries `result[0]`
    Agreed(T),
    /// Every core faulted with the same message
    Faulted(StepFault),
    /// Some adjacent pair disagreed. Not an error: the round is retried.
    Disagreed {
        /// First core whose result differs from its successor's
        first_mismatch: CoreId,
    },
}

impl<T> Verdict<T> {
    /// Whether the round reached consensus on a value
    pub fn is_agreed(&self) -> bool {
        matches!(self, Verdict::Agreed(_))
    }

    /// Whether the round should be redispatched
    pub fn is_disagreed(&self) -> bool {
        matches!(self, Verdict::Disagreed { .. })
    }

    /// Agreed value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Verdict::Agreed(value) => Some(value),
            _ => None,
        }
    }
}

/// Consensus evaluation failure
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ConsensusError {
    /// Nothing to compare
    #[error("no core results to compare")]
    NoResults,

    /// Results were not supplied in core order
    #[error("result at position {position} belongs to {core}")]
    OutOfOrder {
        /// Slice position
        position: usize,
        /// Core found there
        core: CoreId,
    },
}

/// Running counts of checker outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusTally {
    /// Rounds evaluated
    pub checks: u64,
    /// Rounds that agreed on a value
    pub agreed: u64,
    /// Rounds that disagreed
    pub disagreed: u64,
    /// Rounds where every core faulted identically
    pub faulted: u64,
}

/// Checks core results under a comparator
pub struct ConsensusChecker<T> {
    comparator: Box<dyn Comparator<T>>,
    tally: ConsensusTally,
    warned_non_transitive: bool,
}

impl<T: PartialEq + 'static> ConsensusChecker<T> {
    /// Checker using `PartialEq`
    pub fn exact() -> Self {
        Self::new(Exact)
    }
}

impl<T> ConsensusChecker<T> {
    /// Checker using `comparator`
    pub fn new(comparator: impl Comparator<T> + 'static) -> Self {
        Self {
            comparator: Box::new(comparator),
            tally: ConsensusTally::default(),
            warned_non_transitive: false,
        }
    }

    /// Name of the active comparator
    pub fn comparator_name(&self) -> &str {
        self.comparator.name()
    }

    /// Counts so far
    pub fn tally(&self) -> ConsensusTally {
        self.tally
    }

    /// Evaluate one round.
    ///
    /// `results` must hold one entry per core, in core order. Only adjacent
    /// pairs are compared. A fault agrees only with an identical fault, and
    /// never with a value.
    pub fn check(&mut self, results: &[CoreResult<T>]) -> Result<Verdict<T>, ConsensusError>
    where
        T: Clone,
    {
        if results.is_empty() {
            return Err(ConsensusError::NoResults);
        }
        if let Some((position, result)) = results
            .iter()
            .enumerate()
            .find(|(i, r)| r.core.index() != *i)
        {
            return Err(ConsensusError::OutOfOrder {
                position,
                core: result.core,
            });
        }

        if results.len() > 2 && !self.comparator.is_transitive() && !self.warned_non_transitive {
            self.warned_non_transitive = true;
            tracing::warn!(
                comparator = self.comparator.name(),
                cores = results.len(),
                "Comparator is not transitive; adjacent-pair agreement does not imply all cores agree"
            );
        }

        self.tally.checks += 1;

        let mismatch = results
            .windows(2)
            .find(|pair| !self.pair_agrees(&pair[0].value, &pair[1].value));

        let verdict = match (mismatch, &results[0].value) {
            (Some(pair), _) => {
                self.tally.disagreed += 1;
                Verdict::Disagreed {
                    first_mismatch: pair[0].core,
                }
            }
            (None, Ok(value)) => {
                self.tally.agreed += 1;
                Verdict::Agreed(value.clone())
            }
            (None, Err(fault)) => {
                self.tally.faulted += 1;
                Verdict::Faulted(fault.clone())
            }
        };
        Ok(verdict)
    }

    fn pair_agrees(&self, a: &Result<T, StepFault>, b: &Result<T, StepFault>) -> bool {
        match (a, b) {
            (Ok(a), Ok(b)) => self.comparator.agree(a, b),
            (Err(a), Err(b)) => a == b,
            _ => false,
        }
    }
}
