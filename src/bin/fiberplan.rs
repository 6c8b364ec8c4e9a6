//! Fiber planning CLI.
//!
//! Plan a built-in scenario exposure by exposure, optionally over a round range with a
//! checkpoint in between, and compare the multiplier policy with the greedy baseline.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fiberplan::{
    PlanReport, PlanSnapshot, Planner, PlannerConfig, Policy, Scenario, TracingObserver,
};

#[derive(Parser)]
#[command(name = "fiberplan")]
#[command(about = "Exposure-by-exposure fiber allocation for all-or-nothing targets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (solver diagnostics)
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a scenario, or a range of its exposures.
    Run {
        /// Scenario: edge1, edge2, power_law
        #[arg(default_value = "edge1")]
        scenario: String,
        /// First exposure to plan (1-indexed); defaults to the next unplanned one
        #[arg(long)]
        start: Option<usize>,
        /// Last exposure to plan (1-indexed, inclusive); defaults to the horizon
        #[arg(long)]
        stop: Option<usize>,
        /// Selection policy
        #[arg(short, long, value_enum, default_value_t = PolicyArg::Dual)]
        policy: PolicyArg,
        /// Random seed (power_law only)
        #[arg(long, default_value = "0")]
        seed: u64,
        /// Resume from a checkpoint instead of building the scenario
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Write a checkpoint after the last planned exposure
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Output file for the report (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Plan a scenario with both policies and print the sharp utility side by side.
    Compare {
        /// Scenario: edge1, edge2, power_law
        #[arg(default_value = "edge1")]
        scenario: String,
        /// Random seed (power_law only)
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Dual,
    Greedy,
}

impl From<PolicyArg> for Policy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Dual => Policy::Dual,
            PolicyArg::Greedy => Policy::Greedy,
        }
    }
}

fn config(policy: Policy) -> PlannerConfig {
    PlannerConfig {
        policy,
        ..PlannerConfig::default()
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn print_summary(report: &PlanReport) {
    println!("\n=== Plan ===");
    for (l, u) in report.sharp_utility.iter().enumerate() {
        println!("Exposure {:>3}: sharp utility {:.2}", l + 1, u);
    }
    println!("Final sharp utility: {:.2}", report.final_sharp_utility);
    println!("Total waste: {:.2}", report.total_waste);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            scenario,
            start,
            stop,
            policy,
            seed,
            resume,
            checkpoint,
            output,
        } => {
            let cfg = config(policy.into());
            let planner = match resume {
                Some(path) => {
                    let raw = fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    let snapshot: PlanSnapshot = serde_json::from_str(&raw)
                        .with_context(|| format!("parsing {}", path.display()))?;
                    info!(path = %path.display(), next_round = snapshot.next_round + 1, "resuming");
                    Planner::from_snapshot(snapshot, cfg)?
                }
                None => Planner::new(Scenario::named(&scenario, seed)?, cfg)?,
            };
            let mut planner = planner.with_observer(TracingObserver);

            let horizon = planner.scenario().l;
            let start = start.map_or(planner.next_round(), |s| s.saturating_sub(1));
            let stop = stop.unwrap_or(horizon);
            if stop > horizon || start >= stop {
                bail!("invalid exposure range {}..={stop} for a horizon of {horizon}", start + 1);
            }
            if start != planner.next_round() {
                bail!(
                    "the plan resumes at exposure {}, not {}",
                    planner.next_round() + 1,
                    start + 1
                );
            }

            let report = if stop == horizon {
                planner.run()?
            } else {
                planner.run_range(start, stop)?;
                planner.report()
            };
            print_summary(&report);

            if let Some(path) = checkpoint {
                write_json(&path, &planner.snapshot())?;
                println!("Checkpoint written to {}", path.display());
            }
            if let Some(path) = output {
                write_json(&path, &report)?;
                println!("Report written to {}", path.display());
            }
        }

        Commands::Compare { scenario, seed } => {
            let scenario = Scenario::named(&scenario, seed)?;
            let dual = Planner::new(scenario.clone(), config(Policy::Dual))?.run()?;
            let greedy = Planner::new(scenario, config(Policy::Greedy))?.run()?;

            println!("\n{:>8} {:>12} {:>12}", "exposure", "dual", "greedy");
            for (l, (d, g)) in dual.sharp_utility.iter().zip(&greedy.sharp_utility).enumerate() {
                println!("{:>8} {:>12.2} {:>12.2}", l + 1, d, g);
            }
            println!(
                "{:>8} {:>12.2} {:>12.2}",
                "waste", dual.total_waste, greedy.total_waste
            );
        }
    }

    Ok(())
}
