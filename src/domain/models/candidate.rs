//! Candidate and accepted test artifacts.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::source_unit::{SourceUnit, UnitId};

/// Where a generated artifact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Backend name (e.g. `anthropic`, `mock`)
    pub backend: String,
    /// Model identifier reported or requested
    pub model: String,
    /// Revision of the prompt template used
    pub prompt_revision: String,
}

/// Where a test artifact lands, relative to the test root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestTarget {
    /// Path relative to the test root
    pub relative_path: PathBuf,
    /// Test class name (equals the file stem)
    pub class_name: String,
}

/// A proposed, unvalidated test artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTest {
    pub id: Uuid,
    pub unit_id: UnitId,
    /// Generation attempt number for the unit, starting at 1
    pub attempt: u32,
    pub target: TestTarget,
    /// Generated test file text
    pub content: String,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

impl CandidateTest {
    pub fn new(
        unit_id: UnitId,
        attempt: u32,
        target: TestTarget,
        content: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            unit_id,
            attempt,
            target,
            content: content.into(),
            provenance,
            created_at: Utc::now(),
        }
    }

    /// Number of lines that are neither blank nor comments.
    ///
    /// Recognizes `//`, `#`, and block comment lines (`/*`, `*`, `*/`).
    pub fn code_line_count(&self) -> usize {
        let mut in_block = false;
        self.content
            .lines()
            .map(str::trim)
            .filter(|line| {
                if line.is_empty() {
                    return false;
                }
                if in_block {
                    if line.contains("*/") {
                        in_block = false;
                    }
                    return false;
                }
                if line.starts_with("/*") {
                    in_block = !line.contains("*/");
                    return false;
                }
                !(line.starts_with("//") || line.starts_with('#') || line.starts_with('*'))
            })
            .count()
    }
}

/// A validated artifact counted toward coverage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedTest {
    pub candidate_id: Uuid,
    pub unit_id: UnitId,
    pub attempt: u32,
    pub target: TestTarget,
    pub content: String,
    /// Hex SHA-256 of `content`
    #[serde(default)]
    pub content_sha256: String,
    pub provenance: Provenance,
    pub accepted_at: DateTime<Utc>,
}

impl AcceptedTest {
    /// Whether `on_disk` still matches the content that was accepted.
    pub fn matches(&self, on_disk: &str) -> bool {
        self.content_sha256.is_empty() || self.content_sha256 == SourceUnit::hash_source(on_disk)
    }
}

impl From<CandidateTest> for AcceptedTest {
    fn from(candidate: CandidateTest) -> Self {
        Self {
            candidate_id: candidate.id,
            unit_id: candidate.unit_id,
            attempt: candidate.attempt,
            target: candidate.target,
            content_sha256: SourceUnit::hash_source(&candidate.content),
            content: candidate.content,
            provenance: candidate.provenance,
            accepted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(content: &str) -> CandidateTest {
        CandidateTest::new(
            UnitId::new("Cart.java"),
            1,
            TestTarget {
                relative_path: PathBuf::from("CartTest.java"),
                class_name: "CartTest".into(),
            },
            content,
            Provenance {
                backend: "mock".into(),
                model: "m".into(),
                prompt_revision: "r1".into(),
            },
        )
    }

    #[test]
    fn comments_only_has_no_code_lines() {
        let c = candidate("// nothing\n/* block\n * still\n */\n\n# hash");
        assert_eq!(c.code_line_count(), 0);
    }

    #[test]
    fn code_lines_are_counted() {
        let c = candidate("package shop;\n// note\nclass CartTest {\n}\n");
        assert_eq!(c.code_line_count(), 3);
    }

    #[test]
    fn promotion_keeps_identity() {
        let c = candidate("class CartTest {}");
        let id = c.id;
        let accepted = AcceptedTest::from(c);
        assert_eq!(accepted.candidate_id, id);
        assert_eq!(accepted.target.class_name, "CartTest");
    }

    #[test]
    fn accepted_digest_tracks_content() {
        let accepted = AcceptedTest::from(candidate("class CartTest {}"));
        assert_eq!(accepted.content_sha256.len(), 64);
        assert!(accepted.matches("class CartTest {}"));
        assert!(!accepted.matches("class CartTest { /* edited */ }"));
    }
}
