//! Configuration loading from lockstep.toml
//!
//! Lockstep configuration can be specified in a `lockstep.toml` file in the project root.
//! The configuration is automatically discovered by walking up from the current directory.

use crate::controller::PipelineConfig;
use lockstep_core::{FaultError, FaultInjector};
use lockstep_report::{OutputFormat, ReportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the file `discover` looks for
pub const CONFIG_FILE: &str = "lockstep.toml";

/// File name of the saved JSON report inside `[output] directory`
pub const REPORT_FILE: &str = "report.json";

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid duration {0:?}")]
    Duration(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Fault(#[from] FaultError),
}

/// Lockstep configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LockstepConfig {
    /// Core count, priorities, stacks, pinning
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Platform bring-up
    #[serde(default)]
    pub platform: PlatformSection,
    /// Round counts and retry cap
    #[serde(default)]
    pub run: RunSection,
    /// Fault injection
    #[serde(default)]
    pub faults: FaultSection,
    /// Comparator parameters
    #[serde(default)]
    pub consensus: ConsensusSection,
    /// Report output
    #[serde(default)]
    pub output: OutputSection,
}

/// `[pipeline]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Number of workers, one per core
    #[serde(default = "default_cores")]
    pub cores: usize,
    /// Controller priority level
    #[serde(default = "default_controller_priority")]
    pub controller_priority: i32,
    /// Worker priority level; must be below the controller's
    #[serde(default = "default_worker_priority")]
    pub worker_priority: i32,
    /// Worker stack size in bytes
    #[serde(default = "default_stack_size")]
    pub worker_stack_size: usize,
    /// Pin each worker to its own CPU
    #[serde(default = "default_true")]
    pub pin_workers: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            cores: default_cores(),
            controller_priority: default_controller_priority(),
            worker_priority: default_worker_priority(),
            worker_stack_size: default_stack_size(),
            pin_workers: true,
        }
    }
}

fn default_cores() -> usize {
    2
}
fn default_controller_priority() -> i32 {
    2
}
fn default_worker_priority() -> i32 {
    1
}
fn default_stack_size() -> usize {
    64 * 1024
}
fn default_true() -> bool {
    true
}

/// `[platform]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSection {
    /// Wait after bring-up before launching workers (e.g. "5s")
    #[serde(default = "default_settle_time")]
    pub settle_time: String,
}

impl Default for PlatformSection {
    fn default() -> Self {
        Self {
            settle_time: default_settle_time(),
        }
    }
}

fn default_settle_time() -> String {
    "0ms".to_string()
}

/// `[run]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    /// Agreed rounds per scenario
    #[serde(default = "default_rounds")]
    pub rounds: u64,
    /// Attempts allowed per round before it is abandoned (absent = retry forever)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            max_attempts: None,
        }
    }
}

fn default_rounds() -> u64 {
    10
}

/// `[faults]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultSection {
    /// Per-core probability of perturbing a result
    #[serde(default = "default_probability")]
    pub probability: Vec<f64>,
    /// Largest perturbation; drawn uniformly from 0..=max_magnitude
    #[serde(default = "default_max_magnitude")]
    pub max_magnitude: u32,
}

impl Default for FaultSection {
    fn default() -> Self {
        Self {
            probability: default_probability(),
            max_magnitude: default_max_magnitude(),
        }
    }
}

fn default_probability() -> Vec<f64> {
    vec![0.0, 0.0]
}
fn default_max_magnitude() -> u32 {
    4
}

/// `[consensus]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusSection {
    /// Tolerance for epsilon comparators
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
        }
    }
}

fn default_epsilon() -> f64 {
    0.001
}

/// `[output]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    /// Default output format: human, json, csv
    #[serde(default)]
    pub format: OutputFormat,
    /// Directory for report files
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Save a JSON report into `directory` after each run
    #[serde(default)]
    pub save_report: bool,
}

impl OutputSection {
    /// Where a saved JSON report goes
    pub fn report_path(&self) -> PathBuf {
        Path::new(&self.directory).join(REPORT_FILE)
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            directory: default_output_dir(),
            save_report: false,
        }
    }
}

fn default_output_dir() -> String {
    "target/lockstep".to_string()
}

impl LockstepConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find `lockstep.toml` by walking up from the current directory
    pub fn discover_path() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Discover and load configuration. A file that exists but fails to load is an error.
    pub fn discover() -> Result<Option<Self>, ConfigError> {
        Self::discover_path().map(Self::load).transpose()
    }

    /// Check every static constraint
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.run.rounds == 0 {
            return Err(ConfigError::Invalid("run.rounds must be at least 1".to_string()));
        }
        if self.run.max_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "run.max_attempts must be at least 1 when set".to_string(),
            ));
        }
        if self.consensus.epsilon.is_nan() || self.consensus.epsilon < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "consensus.epsilon must be non-negative, got {}",
                self.consensus.epsilon
            )));
        }
        if self.faults.probability.len() > self.pipeline.cores {
            tracing::warn!(
                configured = self.faults.probability.len(),
                cores = self.pipeline.cores,
                "More fault probabilities than cores; extras are ignored"
            );
        }
        self.fault_injector()?;
        Self::parse_duration(&self.platform.settle_time)?;
        Ok(())
    }

    /// Pipeline settings for the controller
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            cores: self.pipeline.cores,
            controller_priority: self.pipeline.controller_priority,
            worker_priority: self.pipeline.worker_priority,
            worker_stack_size: self.pipeline.worker_stack_size,
            pin_workers: self.pipeline.pin_workers,
        }
    }

    /// Fault injector from `[faults]`
    pub fn fault_injector(&self) -> Result<FaultInjector, ConfigError> {
        Ok(FaultInjector::new(
            self.faults.probability.clone(),
            self.faults.max_magnitude,
        )?)
    }

    /// Platform settle time
    pub fn settle_time(&self) -> Result<Duration, ConfigError> {
        Self::parse_duration(&self.platform.settle_time)
    }

    /// Configuration snapshot for report metadata
    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            cores: self.pipeline.cores,
            controller_priority: self.pipeline.controller_priority,
            worker_priority: self.pipeline.worker_priority,
            pin_workers: self.pipeline.pin_workers,
            rounds: self.run.rounds,
            max_attempts: self.run.max_attempts,
            fault_probability: self.faults.probability.clone(),
            max_magnitude: self.faults.max_magnitude,
            epsilon: self.consensus.epsilon,
        }
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# Lockstep Configuration

[pipeline]
# Workers, one per core
cores = 2
# The controller must run strictly above the workers
controller_priority = 2
worker_priority = 1
# Worker thread stack size in bytes
worker_stack_size = 65536
# Pin each worker to its own CPU
pin_workers = true

[platform]
# Wait after bring-up before launching workers
settle_time = "0ms"

[run]
# Agreed rounds per scenario
rounds = 10
# Attempts per round before giving up (uncomment to enable; default retries forever)
# max_attempts = 100

[faults]
# Per-core probability of perturbing a result
probability = [0.0, 0.0]
# Perturbation is drawn from 0..=max_magnitude
max_magnitude = 4

[consensus]
# Tolerance for epsilon comparators
epsilon = 0.001

[output]
# Output format: human, json, csv
format = "human"
# Output directory for reports
directory = "target/lockstep"
# Save a JSON report into the output directory after each run
save_report = false
"#
        .to_string()
    }

    /// Parse duration string (e.g., "5s", "500ms", "2m")
    pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::Duration(s.to_string()));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| ConfigError::Duration(s.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Duration(s.to_string()));
        }

        let nanos_per_unit: f64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" | "min" => 60e9,
            _ => return Err(ConfigError::Duration(s.to_string())),
        };

        Ok(Duration::from_nanos((value * nanos_per_unit) as u64))
    }
}
