//! Deterministic-per-core fault injection for exercising the consensus path.
//!
//! Each core has a probability of perturbing its result. When it fires, the
//! perturbation is drawn uniformly from `0..=max_magnitude`, so a faulty core
//! can still happen to agree with a clean one.

use lockstep_ipc::CoreId;
use rand::Rng;
use thiserror::Error;

/// Invalid fault configuration
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FaultError {
    /// Probability outside [0, 1]
    #[error("fault probability for core{core} must be in [0, 1], got {value}")]
    InvalidProbability {
        /// Core index
        core: usize,
        /// Offending value
        value: f64,
    },
}

/// Per-core result perturbation
#[derive(Debug, Clone, PartialEq)]
pub struct FaultInjector {
    probabilities: Vec<f64>,
    max_magnitude: u32,
}

impl FaultInjector {
    /// Injector with one probability per core
    pub fn new(probabilities: Vec<f64>, max_magnitude: u32) -> Result<Self, FaultError> {
        if let Some((core, &value)) = probabilities
            .iter()
            .enumerate()
            .find(|(_, p)| !(0.0..=1.0).contains(*p))
        {
            return Err(FaultError::InvalidProbability { core, value });
        }
        Ok(Self {
            probabilities,
            max_magnitude,
        })
    }

    /// Injector that never fires
    pub fn disabled() -> Self {
        Self {
            probabilities: Vec::new(),
            max_magnitude: 0,
        }
    }

    /// Whether any core can be perturbed
    pub fn is_enabled(&self) -> bool {
        self.max_magnitude > 0 && self.probabilities.iter().any(|&p| p > 0.0)
    }

    /// Probability for `core` (0 when not configured)
    pub fn probability(&self, core: CoreId) -> f64 {
        self.probabilities.get(core.index()).copied().unwrap_or(0.0)
    }

    /// Draw the perturbation for `core` from `rng`
    pub fn fault_term_with<R: Rng>(&self, core: CoreId, rng: &mut R) -> i64 {
        let p = self.probability(core);
        if p <= 0.0 || self.max_magnitude == 0 || !rng.gen_bool(p) {
            return 0;
        }
        i64::from(rng.gen_range(0..=self.max_magnitude))
    }

    /// Draw the perturbation for `core` from the thread-local generator
    pub fn fault_term(&self, core: CoreId) -> i64 {
        self.fault_term_with(core, &mut rand::thread_rng())
    }

    /// Apply the perturbation for `core` to an integer result
    pub fn perturb(&self, core: CoreId, value: i32) -> i32 {
        let term = self.fault_term(core);
        value.wrapping_add(term as i32)
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::disabled()
    }
}
