#![warn(missing_docs)]
//! Lockstep CLI Library
//!
//! The pipeline controller plus the command-line harness around it: the
//! built-in scenarios, the planner that selects them, the executor that
//! runs them, and report output.
//!
//! Embedding the controller directly:
//!
//! ```ignore
//! use lockstep_cli::{Pipeline, PipelineConfig};
//! use lockstep_core::FnWorkload;
//! use lockstep_logic::ConsensusChecker;
//!
//! let workload = FnWorkload::new(|_core, (a, b): (i32, i32)| a + b);
//! let mut pipeline = Pipeline::builder(workload, ConsensusChecker::exact())
//!     .config(PipelineConfig::default())
//!     .launch()?;
//! let outcome = pipeline.run_round(&(10, 3))?;
//! pipeline.stop()?;
//! ```

mod config;
mod controller;
mod executor;
mod planner;
mod scenarios;

pub use config::*;
pub use controller::{
    Directive, Master, Pipeline, PipelineBuilder, PipelineConfig, PipelineError, RoundOutcome,
    RunSummary, StopHandle,
};
pub use executor::{
    ExecutionConfig, ExecutionFailure, Executor, ProgressObserver, ScenarioExecution,
    ScenarioTiming, build_report, compute_statistics, format_human_output,
};
pub use planner::{ExecutionPlan, PlanFilter, build_plan};
pub use scenarios::{
    OutcomeLog, RepeatMaster, SCENARIOS, ScenarioContext, ScenarioDef, ScenarioError,
    ScenarioRun, ScenarioRunner,
};

use clap::{Parser, Subcommand};
use lockstep_report::{
    OutputFormat, Report, generate_csv_report, generate_json_report,
};
use rayon::ThreadPoolBuilder;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Lockstep CLI arguments
#[derive(Parser, Debug)]
#[command(name = "lockstep")]
#[command(
    author,
    version,
    about = "Lockstep - run the same work on every core and accept a result only when all agree"
)]
pub struct Cli {
    /// Optional subcommand (List, Run, Init); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Filter scenarios by regex pattern
    #[arg(default_value = ".*")]
    pub filter: String,

    /// Configuration file (default: discover lockstep.toml upwards)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of workers, one per core
    #[arg(long)]
    pub cores: Option<usize>,

    /// Agreed rounds per scenario
    #[arg(long)]
    pub rounds: Option<u64>,

    /// Attempts per round before it is abandoned
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Per-core fault probability, comma separated (e.g. 0.5,0)
    #[arg(long, value_delimiter = ',')]
    pub fault_probability: Option<Vec<f64>>,

    /// Largest injected fault term
    #[arg(long)]
    pub max_magnitude: Option<u32>,

    /// Tolerance for epsilon comparators
    #[arg(long)]
    pub epsilon: Option<f64>,

    /// Do not pin workers to CPUs
    #[arg(long)]
    pub no_pin: bool,

    /// Output format: human, json, csv
    #[arg(long)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also save a JSON report into the configured output directory
    #[arg(long)]
    pub save_report: bool,

    /// Run scenarios for this group only
    #[arg(long)]
    pub group: Option<String>,

    /// Filter by tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Skip scenarios with this tag
    #[arg(long)]
    pub skip_tag: Option<String>,

    /// Number of threads for parallel statistics computation
    /// 0 = use all available cores (default), 1 = single-threaded
    #[arg(long, short = 'j', default_value = "0")]
    pub threads: usize,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the planned scenarios
    List,
    /// Run scenarios (default)
    Run,
    /// Write a default lockstep.toml
    Init {
        /// Where to write it
        #[arg(default_value = CONFIG_FILE)]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the Lockstep CLI with process arguments.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the Lockstep CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    if let Some(Commands::Init { path, force }) = &cli.command {
        return write_default_config(path, *force);
    }

    let mut config = match &cli.config {
        Some(path) => LockstepConfig::load(path)?,
        None => LockstepConfig::discover()?.unwrap_or_default(),
    };
    apply_overrides(&cli, &mut config);
    config.validate()?;

    let format: OutputFormat = match &cli.format {
        Some(f) => f.parse().map_err(anyhow::Error::msg)?,
        None => config.output.format,
    };

    match cli.command {
        Some(Commands::List) => list_scenarios(&cli)?,
        Some(Commands::Run) | None => {
            let report = run_scenarios(&cli, &config, format)?;
            if report.results.iter().any(|r| r.status.is_fatal()) {
                eprintln!("\n{} scenario(s) failed", report.summary.failed);
                std::process::exit(1);
            }
        }
        Some(Commands::Init { .. }) => {}
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "lockstep=debug" } else { "lockstep=info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// CLI flags override the configuration file
fn apply_overrides(cli: &Cli, config: &mut LockstepConfig) {
    if let Some(cores) = cli.cores {
        config.pipeline.cores = cores;
    }
    if cli.no_pin {
        config.pipeline.pin_workers = false;
    }
    if let Some(rounds) = cli.rounds {
        config.run.rounds = rounds;
    }
    if let Some(max) = cli.max_attempts {
        config.run.max_attempts = Some(max);
    }
    if let Some(p) = &cli.fault_probability {
        config.faults.probability = p.clone();
    }
    if let Some(m) = cli.max_magnitude {
        config.faults.max_magnitude = m;
    }
    if let Some(e) = cli.epsilon {
        config.consensus.epsilon = e;
    }
}

fn write_default_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    std::fs::write(path, LockstepConfig::default_toml())?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Filter scenarios based on CLI options using the planner module.
///
/// Returns scenarios sorted alphabetically by ID for deterministic execution.
fn filter_scenarios(cli: &Cli) -> anyhow::Result<Vec<&'static ScenarioDef>> {
    let pattern = Regex::new(&cli.filter)?;
    let filter = PlanFilter {
        pattern: Some(&pattern),
        group: cli.group.as_deref(),
        tag: cli.tag.as_deref(),
        skip_tag: cli.skip_tag.as_deref(),
    };
    Ok(build_plan(SCENARIOS, &filter).scenarios)
}

fn list_scenarios(cli: &Cli) -> anyhow::Result<()> {
    println!("Lockstep Plan:");

    let scenarios = filter_scenarios(cli)?;
    let mut groups: BTreeMap<&str, Vec<&ScenarioDef>> = BTreeMap::new();
    for scenario in &scenarios {
        groups.entry(scenario.group).or_default().push(scenario);
    }

    for (group, defs) in &groups {
        println!("├── group: {}", group);
        for def in defs {
            let tags = if def.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", def.tags.join(", "))
            };
            println!("│   ├── {}{} - {}", def.id, tags, def.description);
        }
    }
    println!("{} scenarios found.", scenarios.len());

    // All tags across the table, not just the filtered plan
    let mut tag_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for def in SCENARIOS {
        for tag in def.tags {
            *tag_counts.entry(tag).or_default() += 1;
        }
    }
    let tags_display: Vec<String> = tag_counts
        .iter()
        .map(|(tag, count)| format!("{} ({})", tag, count))
        .collect();
    println!("Tags: {}", tags_display.join(", "));

    Ok(())
}

fn run_scenarios(
    cli: &Cli,
    config: &LockstepConfig,
    format: OutputFormat,
) -> anyhow::Result<Report> {
    if cli.threads > 0 {
        ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .ok();
    }

    let scenarios = filter_scenarios(cli)?;
    if scenarios.is_empty() {
        println!("No scenarios found.");
        return Ok(build_report(&[], Vec::new(), config.report_config(), 0.0));
    }

    let mut exec_config = ExecutionConfig::from_config(config)?;
    exec_config.show_progress =
        format == OutputFormat::Human && cli.output.is_none() && std::io::stderr().is_terminal();

    if format == OutputFormat::Human {
        println!(
            "Running {} scenarios on {} cores, {} rounds each...\n",
            scenarios.len(),
            exec_config.pipeline.cores,
            exec_config.rounds
        );
    }

    let start_time = Instant::now();
    let results = Executor::new(exec_config).execute(&scenarios);
    let timing = compute_statistics(&results);
    let total_duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    let report = build_report(&results, timing, config.report_config(), total_duration_ms);

    let output = match format {
        OutputFormat::Json => generate_json_report(&report)?,
        OutputFormat::Csv => generate_csv_report(&report),
        OutputFormat::Human => format_human_output(&report),
    };

    if let Some(ref path) = cli.output {
        write_output(path, &output)?;
        println!("Report written to: {}", path.display());
    } else {
        print!("{}", output);
    }

    save_report_if_needed(cli, config, &report)?;

    Ok(report)
}

/// Save the report as JSON under `[output] directory` if requested.
fn save_report_if_needed(
    cli: &Cli,
    config: &LockstepConfig,
    report: &Report,
) -> anyhow::Result<Option<PathBuf>> {
    if !(cli.save_report || config.output.save_report) {
        return Ok(None);
    }
    let path = config.output.report_path();
    write_output(&path, &generate_json_report(report)?)?;
    tracing::info!(path = %path.display(), "Report saved");
    Ok(Some(path))
}

fn write_output(path: &Path, output: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(output.as_bytes())?;
    Ok(())
}
