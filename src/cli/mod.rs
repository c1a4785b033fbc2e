//! Command-line interface.
//!
//! Results go to stdout (table or `--json`), logs and progress to stderr.
//! Exit codes: 0 threshold met, 1 below threshold, 2 fatal or configuration
//! error.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

/// Exit code for fatal and configuration errors.
pub const EXIT_FATAL: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "covsynth")]
#[command(about = "Coverage-driven unit test synthesis", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .covsynth/config.yaml + local.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate tests until the coverage threshold is met
    Run(commands::run::RunArgs),

    /// List the source units a run would target
    Detect(commands::detect::DetectArgs),

    /// Measure (or parse) coverage of the accepted suite
    Coverage(commands::coverage::CoverageArgs),

    /// Show or validate the effective configuration
    Config(commands::config::ConfigArgs),
}

/// Load configuration from `path`, or from the project directory.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Print an error the way the selected output mode expects and exit.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": chain.get(1..).unwrap_or_default(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(EXIT_FATAL);
}
