//! `covsynth detect`: list the source units a run would target.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::adapters::GitChangeDetector;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, DetectionMode, SourceUnit};
use crate::domain::ports::ChangeDetector;

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Scan the whole source root instead of the change range
    #[arg(long)]
    pub all: bool,

    /// Base commit of the change range
    #[arg(long)]
    pub base: Option<String>,

    /// Head commit of the change range
    #[arg(long)]
    pub head: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetectOutput {
    pub mode: DetectionMode,
    pub units: Vec<SourceUnit>,
}

impl CommandOutput for DetectOutput {
    fn to_human(&self) -> String {
        if self.units.is_empty() {
            return "No source units in scope.".to_string();
        }
        format!(
            "{} unit(s) in scope:\n{}",
            self.units.len(),
            TableFormatter::new().format_units(&self.units)
        )
    }

    fn to_json(&self) -> serde_json::Value {
        let units: Vec<_> = self
            .units
            .iter()
            .map(|unit| {
                serde_json::json!({
                    "id": unit.id,
                    "path": unit.path,
                    "qualified_name": unit.qualified_name,
                    "dependencies": unit.dependencies,
                    "source_hash": unit.source_hash,
                })
            })
            .collect();
        serde_json::json!({ "mode": self.mode, "units": units })
    }
}

pub async fn execute(args: DetectArgs, mut config: Config, json: bool) -> Result<i32> {
    if args.all {
        config.detection.mode = DetectionMode::All;
    }
    if let Some(base) = args.base {
        config.detection.base_sha = Some(base);
    }
    if let Some(head) = args.head {
        config.detection.head_sha = Some(head);
    }

    let units = GitChangeDetector::from_config(&config)
        .detect()
        .await
        .context("Change detection failed")?;
    tracing::debug!(units = units.len(), mode = ?config.detection.mode, "Detection finished");

    output(
        &DetectOutput {
            mode: config.detection.mode,
            units,
        },
        json,
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::domain::models::UnitId;

    #[test]
    fn test_json_omits_source_text() {
        let out = DetectOutput {
            mode: DetectionMode::All,
            units: vec![SourceUnit::new(
                UnitId::new("com/shop/Cart.java"),
                PathBuf::from("src/main/java/com/shop/Cart.java"),
                "com.shop.Cart",
                "package com.shop; class Cart {}",
                vec!["com.shop.Item".into()],
            )],
        };
        let value = out.to_json();
        assert_eq!(value["mode"], "all");
        assert_eq!(value["units"][0]["qualified_name"], "com.shop.Cart");
        assert!(value["units"][0].get("source_text").is_none());
    }

    #[test]
    fn test_empty_human_output() {
        let out = DetectOutput {
            mode: DetectionMode::Changed,
            units: vec![],
        };
        assert_eq!(out.to_human(), "No source units in scope.");
    }
}
