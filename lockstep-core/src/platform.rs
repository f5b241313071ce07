//! Platform bring-up.
//!
//! The controller calls `Platform::start` once before launching workers. On a
//! host OS this checks the CPU budget and waits out a settle period so the
//! first timed rounds are not skewed by process startup.

use crate::measure::available_cores;
use std::time::Duration;
use thiserror::Error;

/// What the platform reported at start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    /// CPUs available to the process
    pub available_cores: usize,
    /// Cores the pipeline was asked to run on
    pub requested_cores: usize,
}

impl PlatformInfo {
    /// Whether every worker can have a CPU to itself
    pub fn is_oversubscribed(&self) -> bool {
        self.requested_cores > self.available_cores
    }
}

/// Platform start failure
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Zero cores requested
    #[error("pipeline needs at least one core")]
    NoCores,
}

/// Hook run once before workers launch
pub trait Platform: Send {
    /// Bring the platform up for `cores` workers
    fn start(&mut self, cores: usize) -> Result<PlatformInfo, PlatformError>;
}

/// Host operating system platform
#[derive(Debug, Clone)]
pub struct HostPlatform {
    settle_time: Duration,
}

impl HostPlatform {
    /// Platform that sleeps `settle_time` after start
    pub fn new(settle_time: Duration) -> Self {
        Self { settle_time }
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Platform for HostPlatform {
    fn start(&mut self, cores: usize) -> Result<PlatformInfo, PlatformError> {
        if cores == 0 {
            return Err(PlatformError::NoCores);
        }

        let info = PlatformInfo {
            available_cores: available_cores(),
            requested_cores: cores,
        };

        if info.is_oversubscribed() {
            tracing::warn!(
                requested = cores,
                available = info.available_cores,
                "More workers than CPUs; cores will time-share"
            );
        }

        if !self.settle_time.is_zero() {
            tracing::debug!(settle = ?self.settle_time, "Waiting for platform to settle");
            std::thread::sleep(self.settle_time);
        }

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_start() {
        let mut platform = HostPlatform::default();
        let info = platform.start(2).unwrap();
        assert_eq!(info.requested_cores, 2);
        assert!(info.available_cores >= 1);
    }

    #[test]
    fn test_zero_cores_rejected() {
        let mut platform = HostPlatform::default();
        assert!(matches!(platform.start(0), Err(PlatformError::NoCores)));
    }

    #[test]
    fn test_settle_time_is_waited() {
        let mut platform = HostPlatform::new(Duration::from_millis(20));
        let start = std::time::Instant::now();
        platform.start(1).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
