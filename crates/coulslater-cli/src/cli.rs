use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "coulslater - Evaluate Slater-damped long-range Coulomb interactions for particle systems on an accelerator.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for the host share of each step.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate forces and energies of a system over one or more timesteps.
    Run(RunArgs),
    /// Print the device memory needed per atom for each precision build.
    Memory(MemoryArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override the particle system file named in the config file.
    #[arg(short = 'i', long, value_name = "PATH")]
    pub system: Option<PathBuf>,

    /// Write per-atom forces and energies of the last step as CSV.
    #[arg(short = 'o', long, value_name = "PATH")]
    pub forces_out: Option<PathBuf>,

    // --- Run Overrides ---
    /// Override the number of timesteps.
    #[arg(short = 'n', long, value_name = "INT")]
    pub steps: Option<usize>,

    /// Override the precision build (single, mixed or double).
    #[arg(short, long, value_name = "MODE")]
    pub precision: Option<String>,

    /// Override the fraction of local particles left to the host.
    #[arg(long, value_name = "FLOAT")]
    pub split: Option<f64>,

    /// Print the device banner and the timing summary.
    #[arg(long)]
    pub diagnostics: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S pair.g-ewald=0.25
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `memory` subcommand.
#[derive(Args, Debug)]
pub struct MemoryArgs {
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override the particle system file named in the config file.
    #[arg(short = 'i', long, value_name = "PATH")]
    pub system: Option<PathBuf>,

    /// Neighbor-row counts to tabulate. Defaults to the configured value.
    #[arg(short = 'm', long = "max-neighbors", value_name = "INT", num_args(1..))]
    pub max_neighbors: Vec<usize>,
}
