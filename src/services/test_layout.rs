//! Where generated tests land in the test tree.
//!
//! A unit `com/shop/Cart.java` gets `com/shop/CartTest.java` first, then
//! `CartTest2.java`, `CartTest3.java`, ... for later accepted artifacts. The
//! class name always equals the file stem.

use std::path::{Path, PathBuf};

use crate::domain::models::{LayoutConfig, TestTarget, UnitId};
use crate::domain::ports::ArtifactWorkspace;

/// Upper bound on ordinals probed for a free file name.
const MAX_ORDINAL: u32 = 10_000;

/// Test path derivation rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestLayout {
    suffix: String,
    extension: String,
}

impl TestLayout {
    pub fn new(suffix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn from_config(config: &LayoutConfig) -> Self {
        Self::new(config.test_suffix.clone(), config.extension.clone())
    }

    /// Target for the `ordinal`-th test of a unit (1-based).
    pub fn target_for(&self, unit: &UnitId, ordinal: u32) -> TestTarget {
        let class_name = if ordinal <= 1 {
            format!("{}{}", unit.stem(), self.suffix)
        } else {
            format!("{}{}{ordinal}", unit.stem(), self.suffix)
        };
        let file_name = format!("{class_name}.{}", self.extension);
        let relative_path = match unit.parent() {
            "" => PathBuf::from(file_name),
            parent => Path::new(parent).join(file_name),
        };
        TestTarget {
            relative_path,
            class_name,
        }
    }

    /// First target whose file does not exist yet in the workspace.
    ///
    /// Hand-written tests that already occupy a name are skipped, never
    /// overwritten.
    pub async fn next_free_target(
        &self,
        unit: &UnitId,
        workspace: &dyn ArtifactWorkspace,
    ) -> std::io::Result<TestTarget> {
        for ordinal in 1..=MAX_ORDINAL {
            let target = self.target_for(unit, ordinal);
            if workspace.read(&target.relative_path).await?.is_none() {
                return Ok(target);
            }
        }
        Err(std::io::Error::other(format!(
            "no free test file name left for {unit}"
        )))
    }

    /// Fully qualified class name of a target, e.g. `com.shop.CartTest`.
    pub fn qualified_class(target: &TestTarget) -> String {
        let package = target
            .relative_path
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .unwrap_or_default();
        if package.is_empty() {
            target.class_name.clone()
        } else {
            format!("{package}.{}", target.class_name)
        }
    }
}

impl Default for TestLayout {
    fn default() -> Self {
        Self::from_config(&LayoutConfig::default())
    }
}
