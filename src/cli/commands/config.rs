//! `covsynth config`: inspect and scaffold configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::{ConfigLoader, CONFIG_DIR};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration after all overrides
    Show,
    /// Check the effective configuration and exit
    Validate,
    /// Write a default .covsynth/config.yaml
    Init {
        /// Overwrite an existing config file
        #[arg(long, short)]
        force: bool,

        /// Project directory (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("Failed to render configuration: {e}"))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigStatusOutput {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl CommandOutput for ConfigStatusOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: ConfigArgs, config: Config, json: bool) -> Result<i32> {
    match args.command {
        ConfigCommands::Show => {
            output(&ConfigShowOutput { config }, json);
            Ok(0)
        }
        ConfigCommands::Validate => {
            ConfigLoader::validate(&config).context("Configuration is invalid")?;
            output(
                &ConfigStatusOutput {
                    success: true,
                    message: format!(
                        "Configuration is valid (threshold {:.1}%, {} granularity, {:?} reports)",
                        config.threshold, config.toolchain.granularity, config.toolchain.report_format
                    ),
                    path: None,
                },
                json,
            );
            Ok(0)
        }
        ConfigCommands::Init { force, path } => {
            let written = write_default(&path, force).await?;
            output(
                &ConfigStatusOutput {
                    success: true,
                    message: format!("Wrote default configuration to {}", written.display()),
                    path: Some(written),
                },
                json,
            );
            Ok(0)
        }
    }
}

/// Write the default configuration under `project`, returning the file path.
async fn write_default(project: &std::path::Path, force: bool) -> Result<PathBuf> {
    let dir = project.join(CONFIG_DIR);
    let file = dir.join("config.yaml");
    if !force && tokio::fs::try_exists(&file).await.unwrap_or(false) {
        anyhow::bail!(
            "{} already exists; use --force to overwrite",
            file.display()
        );
    }

    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let yaml = serde_yaml::to_string(&Config::default())
        .context("Failed to serialize the default configuration")?;
    tokio::fs::write(&file, yaml)
        .await
        .with_context(|| format!("Failed to write {}", file.display()))?;
    tracing::info!(path = %file.display(), "Default configuration written");
    Ok(file)
}
