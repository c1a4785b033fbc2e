//! Source unit domain model.
//!
//! A source unit is one file/class-equivalent targeted for coverage. Its
//! identity is the path relative to the configured source root, which is also
//! the key coverage reports are matched against.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identity of a source unit: its path relative to the source root,
/// always with forward slashes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(relative_path: impl AsRef<str>) -> Self {
        Self(relative_path.as_ref().replace('\\', "/").trim_start_matches("./").to_string())
    }

    pub fn from_path(relative_path: &Path) -> Self {
        Self::new(relative_path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name component, e.g. `Cart.java`.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// File name without its extension, e.g. `Cart`.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        name.rsplit_once('.').map_or(name, |(stem, _)| stem)
    }

    /// Directory part of the relative path, empty for top-level units.
    pub fn parent(&self) -> &str {
        self.0.rsplit_once('/').map_or("", |(parent, _)| parent)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One code unit targeted for coverage.
///
/// Immutable for the duration of an iteration cycle; a changed file produces
/// a new `SourceUnit` with a different [`source_hash`](Self::source_hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Path relative to the source root
    pub id: UnitId,
    /// Qualified name (package + class) when it can be extracted
    pub qualified_name: String,
    /// Location on disk
    pub path: PathBuf,
    /// Hex SHA-256 of `source_text`
    pub source_hash: String,
    /// Full source text
    pub source_text: String,
    /// Dependency interfaces that a test has to mock
    pub dependencies: Vec<String>,
}

impl SourceUnit {
    pub fn new(
        id: UnitId,
        path: impl Into<PathBuf>,
        qualified_name: impl Into<String>,
        source_text: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Self {
        let source_text = source_text.into();
        Self {
            source_hash: Self::hash_source(&source_text),
            id,
            qualified_name: qualified_name.into(),
            path: path.into(),
            source_text,
            dependencies,
        }
    }

    /// Hex-encoded SHA-256 of a source text.
    pub fn hash_source(text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }

    pub fn has_source(&self) -> bool {
        !self.source_text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_id_normalizes_separators() {
        let id = UnitId::new("./com\\shop\\Cart.java");
        assert_eq!(id.as_str(), "com/shop/Cart.java");
        assert_eq!(id.file_name(), "Cart.java");
        assert_eq!(id.stem(), "Cart");
        assert_eq!(id.parent(), "com/shop");
    }

    #[test]
    fn unit_id_top_level() {
        let id = UnitId::new("Main.java");
        assert_eq!(id.parent(), "");
        assert_eq!(id.stem(), "Main");
    }

    #[test]
    fn hash_changes_with_source() {
        let a = SourceUnit::new(UnitId::new("A.java"), "A.java", "A", "class A {}", vec![]);
        let b = SourceUnit::new(UnitId::new("A.java"), "A.java", "A", "class A { int x; }", vec![]);
        assert_ne!(a.source_hash, b.source_hash);
        assert_eq!(a.source_hash.len(), 64);
        assert_eq!(a.source_hash, SourceUnit::hash_source("class A {}"));
    }

    #[test]
    fn blank_source_has_no_source() {
        let unit = SourceUnit::new(UnitId::new("A.java"), "A.java", "A", "  \n", vec![]);
        assert!(!unit.has_source());
    }
}
