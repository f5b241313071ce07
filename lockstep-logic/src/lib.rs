#![warn(missing_docs)]
//! Lockstep Logic - Consensus Checking
//!
//! Decides whether every core computed the same result for a round.
//! Results are compared pairwise in core order (`result[i]` vs `result[i+1]`)
//! under a pluggable `Comparator`; on agreement the canonical value is
//! `result[0]`.

mod comparator;
mod consensus;

pub use comparator::{Comparator, ComparatorError, Epsilon, Exact, FnComparator};
pub use consensus::{ConsensusChecker, ConsensusError, ConsensusTally, Verdict};
