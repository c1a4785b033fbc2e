//! Disallowed-effect checks for candidate tests.
//!
//! Generated tests must not reach the network, write to the real
//! filesystem, or sleep on wall-clock time. The policy scans the artifact
//! text before it runs and the execution output after it ran. This is a
//! best-effort filter, not a security boundary.

use serde::{Deserialize, Serialize};

use crate::domain::models::SandboxConfig;

/// Kind of effect a pattern guards against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Network,
    FilesystemWrite,
    Sleep,
}

impl EffectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network access",
            Self::FilesystemWrite => "filesystem write",
            Self::Sleep => "real-time sleep",
        }
    }
}

/// A disallowed pattern found in an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    pub kind: EffectKind,
    pub pattern: String,
    /// 1-based line number
    pub line: usize,
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: {} via `{}` is not allowed in tests",
            self.line,
            self.kind.as_str(),
            self.pattern
        )
    }
}

/// Static and dynamic disallowed-effect checks.
#[derive(Debug, Clone, Default)]
pub struct SandboxPolicy {
    enabled: bool,
    rules: Vec<(EffectKind, String)>,
    output_markers: Vec<String>,
}

impl SandboxPolicy {
    pub fn from_config(config: &SandboxConfig) -> Self {
        let rules = config
            .network_patterns
            .iter()
            .map(|p| (EffectKind::Network, p.clone()))
            .chain(
                config
                    .filesystem_patterns
                    .iter()
                    .map(|p| (EffectKind::FilesystemWrite, p.clone())),
            )
            .chain(config.sleep_patterns.iter().map(|p| (EffectKind::Sleep, p.clone())))
            .filter(|(_, pattern)| !pattern.is_empty())
            .collect();
        Self {
            enabled: config.enabled,
            rules,
            output_markers: config.output_markers.clone(),
        }
    }

    /// Policy that allows everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Violations in the artifact text. Comment lines are ignored.
    pub fn scan_source(&self, content: &str) -> Vec<PolicyViolation> {
        if !self.enabled {
            return Vec::new();
        }
        let mut violations = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*") {
                continue;
            }
            for (kind, pattern) in &self.rules {
                if line.contains(pattern.as_str()) {
                    violations.push(PolicyViolation {
                        kind: *kind,
                        pattern: pattern.clone(),
                        line: index + 1,
                    });
                }
            }
        }
        violations
    }

    /// First configured marker present in execution output.
    pub fn scan_output(&self, output: &str) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.output_markers
            .iter()
            .map(String::as_str)
            .find(|marker| !marker.is_empty() && output.contains(marker))
    }

    /// Diagnostics text for a set of violations.
    pub fn describe(violations: &[PolicyViolation]) -> String {
        let mut out = String::from("Sandbox policy rejected the candidate:\n");
        for violation in violations {
            out.push_str("  ");
            out.push_str(&violation.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_scan_finds_patterns() {
        let policy = SandboxPolicy::from_config(&SandboxConfig::default());
        let content = "class T {\n  // Thread.sleep is fine in a comment\n  void t() throws Exception {\n    Thread.sleep(100);\n    new java.net.URL(\"http://x\").openStream();\n  }\n}";
        let violations = policy.scan_source(content);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].kind, EffectKind::Sleep);
        assert_eq!(violations[0].line, 4);
        assert_eq!(violations[1].kind, EffectKind::Network);
        assert!(SandboxPolicy::describe(&violations).contains("line 5: network access"));
    }

    #[test]
    fn test_output_markers() {
        let policy = SandboxPolicy::from_config(&SandboxConfig::default());
        assert_eq!(
            policy.scan_output("Caused by: java.net.ConnectException: refused"),
            Some("java.net.ConnectException")
        );
        assert_eq!(policy.scan_output("Tests run: 3, Failures: 0"), None);
    }

    #[test]
    fn test_disabled_policy_allows_everything() {
        let config = SandboxConfig {
            enabled: false,
            ..SandboxConfig::default()
        };
        let policy = SandboxPolicy::from_config(&config);
        assert!(policy.scan_source("Thread.sleep(1);").is_empty());
        assert!(policy.scan_output("java.net.ConnectException").is_none());
        assert!(SandboxPolicy::disabled().scan_source("Thread.sleep(1);").is_empty());
    }
}
