//! Change detection over a git working tree.
//!
//! In `changed` mode the units are the files touched by `base..head`
//! (falling back to `HEAD~1..HEAD` when the range cannot be diffed, e.g. in a
//! shallow clone). In `all` mode every file under the source root is a unit.
//! Only files with the configured extension under the source root count;
//! deleted files are skipped.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::adapters::toolchain::command::{run_command, CommandOutcome};
use crate::domain::errors::DetectionError;
use crate::domain::models::{Config, DetectionMode, SourceUnit, UnitId};
use crate::domain::ports::ChangeDetector;
use crate::services::context_extractor;

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variables consulted, in order, for the commit range.
const BASE_SHA_VARS: &[&str] = &["BASE_SHA", "GITHUB_BASE_SHA", "GITHUB_EVENT_BEFORE"];
const HEAD_SHA_VARS: &[&str] = &["HEAD_SHA", "GITHUB_SHA"];

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty() && !value.chars().all(|c| c == '0'))
}

/// Detects source units from a git diff or a full scan.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    working_dir: PathBuf,
    /// Relative to `working_dir`
    source_root: PathBuf,
    extension: String,
    mode: DetectionMode,
    base_sha: Option<String>,
    head_sha: Option<String>,
}

impl GitChangeDetector {
    /// Build from configuration; unset SHAs are taken from the CI environment.
    pub fn from_config(config: &Config) -> Self {
        Self {
            working_dir: config.toolchain.working_dir.clone(),
            source_root: config.layout.source_root.clone(),
            extension: config.layout.extension.trim_start_matches('.').to_string(),
            mode: config.detection.mode,
            base_sha: config
                .detection
                .base_sha
                .clone()
                .or_else(|| first_env(BASE_SHA_VARS)),
            head_sha: config
                .detection
                .head_sha
                .clone()
                .or_else(|| first_env(HEAD_SHA_VARS)),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: DetectionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_range(mut self, base: impl Into<String>, head: impl Into<String>) -> Self {
        self.base_sha = Some(base.into());
        self.head_sha = Some(head.into());
        self
    }

    fn absolute_source_root(&self) -> PathBuf {
        self.working_dir.join(&self.source_root)
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str())
    }

    async fn git_diff(&self, range: &[&str]) -> Result<String, String> {
        let mut argv = vec![
            "git".to_string(),
            "diff".to_string(),
            "--name-only".to_string(),
            "--relative".to_string(),
        ];
        argv.extend(range.iter().map(ToString::to_string));
        match run_command(&argv, &self.working_dir, GIT_TIMEOUT).await {
            CommandOutcome::Finished {
                success: true,
                output,
                ..
            } => Ok(output),
            CommandOutcome::Finished { output, .. } => Err(output.trim().to_string()),
            CommandOutcome::TimedOut => Err("git diff timed out".to_string()),
            CommandOutcome::SpawnFailed(e) => Err(format!("failed to run git: {e}")),
        }
    }

    /// Paths (relative to the working dir) touched by the configured range.
    async fn changed_paths(&self) -> Result<Vec<PathBuf>, DetectionError> {
        let (Some(base), Some(head)) = (&self.base_sha, &self.head_sha) else {
            return Err(DetectionError::MissingRange);
        };

        let range = format!("{base}..{head}");
        let output = match self.git_diff(&[&range]).await {
            Ok(output) => output,
            Err(primary) => {
                tracing::warn!(range = %range, error = %primary, "git diff failed; trying HEAD~1..HEAD");
                self.git_diff(&["HEAD~1", "HEAD"])
                    .await
                    .map_err(|fallback| {
                        DetectionError::Git(format!("{range}: {primary}; HEAD~1..HEAD: {fallback}"))
                    })?
            }
        };

        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// Every matching file under the source root, relative to the working dir.
    fn all_paths(&self) -> Result<Vec<PathBuf>, DetectionError> {
        let root = self.absolute_source_root();
        if !root.is_dir() {
            return Err(DetectionError::MissingSourceRoot(root));
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.map_err(|e| DetectionError::Read {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone()),
                source: e.into_io_error().unwrap_or_else(|| io::Error::other("walk failed")),
            })?;
            if entry.file_type().is_file() && self.has_extension(entry.path()) {
                if let Ok(relative) = entry.path().strip_prefix(&self.working_dir) {
                    paths.push(relative.to_path_buf());
                }
            }
        }
        Ok(paths)
    }

    /// Load one unit; `None` if the path is out of scope or was deleted.
    async fn load_unit(&self, relative: &Path) -> Result<Option<SourceUnit>, DetectionError> {
        if !self.has_extension(relative) {
            return Ok(None);
        }
        let Ok(within_root) = relative.strip_prefix(&self.source_root) else {
            return Ok(None);
        };

        let path = self.working_dir.join(relative);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Skipping deleted file");
                return Ok(None);
            }
            Err(source) => return Err(DetectionError::Read { path, source }),
        };

        let id = UnitId::from_path(within_root);
        let context = context_extractor::extract(&text);
        let fallback = id.as_str().trim_end_matches(&format!(".{}", self.extension)).replace('/', ".");
        Ok(Some(SourceUnit::new(
            id,
            path,
            context.qualified_name(&fallback),
            text,
            context.dependencies,
        )))
    }
}

#[async_trait]
impl ChangeDetector for GitChangeDetector {
    async fn detect(&self) -> Result<Vec<SourceUnit>, DetectionError> {
        let paths = match self.mode {
            DetectionMode::Changed => self.changed_paths().await?,
            DetectionMode::All => self.all_paths()?,
        };

        let mut seen = BTreeSet::new();
        let mut units = Vec::new();
        for path in paths {
            if !seen.insert(path.clone()) {
                continue;
            }
            if let Some(unit) = self.load_unit(&path).await? {
                units.push(unit);
            }
        }
        units.sort_by(|a, b| a.id.cmp(&b.id));

        tracing::info!(mode = ?self.mode, units = units.len(), "Source units detected");
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CART: &str = "package com.shop;\n\npublic class Cart {\n    @Autowired\n    private PriceRepository prices;\n\n    public int total() { return 0; }\n}\n";

    fn detector(dir: &Path, mode: DetectionMode) -> GitChangeDetector {
        let mut config = Config::default();
        config.toolchain.working_dir = dir.to_path_buf();
        config.detection.mode = mode;
        GitChangeDetector {
            base_sha: None,
            head_sha: None,
            ..GitChangeDetector::from_config(&config)
        }
    }

    fn write(dir: &Path, relative: &str, contents: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_scan_all_builds_units() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main/java/com/shop/Cart.java", CART);
        write(dir.path(), "src/main/java/com/shop/README.md", "docs");
        write(dir.path(), "src/test/java/com/shop/CartTest.java", "class CartTest {}");

        let units = detector(dir.path(), DetectionMode::All).detect().await.unwrap();
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert_eq!(unit.id.as_str(), "com/shop/Cart.java");
        assert_eq!(unit.qualified_name, "com.shop.Cart");
        assert_eq!(unit.dependencies, vec!["PriceRepository"]);
        assert_eq!(unit.source_hash, SourceUnit::hash_source(CART));
    }

    #[tokio::test]
    async fn test_missing_source_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = detector(dir.path(), DetectionMode::All).detect().await.unwrap_err();
        assert!(matches!(err, DetectionError::MissingSourceRoot(_)));
    }

    #[tokio::test]
    async fn test_changed_mode_requires_range() {
        let dir = tempfile::tempdir().unwrap();
        let err = detector(dir.path(), DetectionMode::Changed).detect().await.unwrap_err();
        assert!(matches!(err, DetectionError::MissingRange));
    }

    #[tokio::test]
    async fn test_load_unit_filters_scope() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main/java/com/shop/Cart.java", CART);
        let detector = detector(dir.path(), DetectionMode::Changed);

        assert!(detector
            .load_unit(Path::new("src/main/java/com/shop/Cart.java"))
            .await
            .unwrap()
            .is_some());
        // deleted in the diff
        assert!(detector
            .load_unit(Path::new("src/main/java/com/shop/Gone.java"))
            .await
            .unwrap()
            .is_none());
        // outside the source root
        assert!(detector
            .load_unit(Path::new("scripts/Tool.java"))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_env_range_ignores_zero_sha() {
        temp_env::with_vars(
            [
                ("BASE_SHA", None),
                ("GITHUB_BASE_SHA", Some("0000000000")),
                ("GITHUB_EVENT_BEFORE", Some("abc123")),
            ],
            || {
                assert_eq!(first_env(BASE_SHA_VARS).as_deref(), Some("abc123"));
            },
        );
    }
}
