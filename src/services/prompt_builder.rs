//! Prompt construction for generation backends.
//!
//! The system prompt comes from an optional operator guide (its "System
//! Prompt" section, or the whole file when it has none) and falls back to a
//! built-in prompt. The user prompt carries the unit source, the extracted
//! structural context, output rules, and on retries the filtered
//! diagnostics of the last rejected candidate plus uncovered-target hints.

use std::path::Path;

use crate::domain::models::GenerationConfig;
use crate::domain::ports::GenerationRequest;

use super::context_extractor::SourceContext;

/// Diagnostics beyond this many characters are cut before prompting.
const MAX_DIAGNOSTIC_CHARS: usize = 6_000;

/// Uncovered-target hints beyond this count are summarized.
const MAX_UNCOVERED_HINTS: usize = 40;

/// Builds system and user prompts for one backend configuration.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    language: String,
    framework: String,
    revision: String,
}

impl PromptBuilder {
    pub fn new(
        language: impl Into<String>,
        framework: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        let language = language.into();
        let framework = framework.into();
        Self {
            system_prompt: default_system_prompt(&language, &framework),
            language,
            framework,
            revision: revision.into(),
        }
    }

    /// Builder configured from settings, reading the guide file if one is set.
    pub fn from_config(config: &GenerationConfig) -> std::io::Result<Self> {
        let builder = Self::new(
            config.language.clone(),
            config.framework.clone(),
            config.prompt_revision.clone(),
        );
        match &config.guide_path {
            Some(path) => Ok(builder.with_guide(&read_guide(path)?)),
            None => Ok(builder),
        }
    }

    /// Replace the system prompt with an operator guide.
    #[must_use]
    pub fn with_guide(mut self, guide: &str) -> Self {
        let prompt = extract_system_section(guide).unwrap_or_else(|| guide.trim().to_string());
        if !prompt.is_empty() {
            self.system_prompt = prompt;
        }
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// User prompt for one generation request.
    pub fn user_prompt(&self, request: &GenerationRequest, context: &SourceContext) -> String {
        let unit = &request.unit;
        let mut prompt = format!(
            "Generate a {framework} test class for the {language} source below.\n\n\
             SOURCE FILE: {path}\n\
             QUALIFIED NAME: {qualified}\n\
             TEST CLASS NAME: {class}\n\
             TEST FILE: {test_path}\n\n",
            framework = self.framework,
            language = self.language,
            path = unit.id,
            qualified = unit.qualified_name,
            class = request.target.class_name,
            test_path = request.target.relative_path.display(),
        );

        let rendered = context.render();
        if !rendered.is_empty() {
            prompt.push_str("ENHANCED CONTEXT:\n");
            prompt.push_str(&rendered);
            prompt.push('\n');
        }

        prompt.push_str("SOURCE CODE:\n");
        prompt.push_str(&unit.source_text);
        if !unit.source_text.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push('\n');

        if let Some(diagnostics) = &request.prior_diagnostics {
            let file_names = [unit.id.file_name(), request.target.class_name.as_str()];
            prompt.push_str(&format!(
                "PREVIOUS ATTEMPT {} FAILED. Fix these problems without changing the source under test:\n",
                request.attempt.saturating_sub(1)
            ));
            prompt.push_str(&relevant_diagnostics(diagnostics, &file_names));
            prompt.push_str("\n\n");
        }

        if !request.uncovered_targets.is_empty() {
            prompt.push_str("STILL UNCOVERED (focus new tests here):\n");
            let shown = request.uncovered_targets.len().min(MAX_UNCOVERED_HINTS);
            prompt.push_str(&request.uncovered_targets[..shown].join(", "));
            if request.uncovered_targets.len() > shown {
                prompt.push_str(&format!(
                    " and {} more",
                    request.uncovered_targets.len() - shown
                ));
            }
            prompt.push_str("\n\n");
        }

        prompt.push_str(&format!(
            "OUTPUT RULES:\n\
             - Reply with the complete test file only, no explanations.\n\
             - The public test class must be named {class} and live in the same package as the source.\n\
             - Mock every collaborator; no real network, filesystem writes, or sleeps.\n\
             - Only reference symbols that exist in the source or its imports.\n",
            class = request.target.class_name
        ));
        prompt
    }
}

fn read_guide(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
}

fn default_system_prompt(language: &str, framework: &str) -> String {
    format!(
        "You are a senior {language} engineer writing unit tests with {framework}.\n\
         Write deterministic, self-contained tests that compile against the given source as-is.\n\
         Cover normal paths, edge cases, and error handling. Prefer many small focused test methods.\n\
         Never modify production code and never invent APIs that the source does not declare."
    )
}

/// Body of the guide's "System Prompt" section, if it has one.
///
/// The section ends at the next markdown heading, the "User Prompt" section,
/// or a `⸻` separator line.
pub fn extract_system_section(guide: &str) -> Option<String> {
    let mut lines = guide.lines();
    lines.find(|line| line.to_ascii_lowercase().contains("system prompt"))?;
    let body: Vec<&str> = lines
        .take_while(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with('#')
                || trimmed.starts_with('⸻')
                || trimmed.to_ascii_lowercase().contains("user prompt"))
        })
        .collect();
    let body = body.join("\n").trim().to_string();
    (!body.is_empty()).then_some(body)
}

/// Lines of `diagnostics` that mention one of `file_names`, or everything if
/// none do, cut to a bounded length.
pub fn relevant_diagnostics(diagnostics: &str, file_names: &[&str]) -> String {
    let matching: Vec<&str> = diagnostics
        .lines()
        .filter(|line| file_names.iter().any(|name| !name.is_empty() && line.contains(name)))
        .collect();
    let selected = if matching.is_empty() {
        diagnostics.trim().to_string()
    } else {
        matching.join("\n")
    };
    truncate_chars(&selected, MAX_DIAGNOSTIC_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}\n... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

/// Remove a markdown code fence wrapping the artifact, if present.
///
/// Text before the first fence and after the closing fence is dropped; an
/// unterminated fence keeps everything after the opening line.
pub fn strip_code_fences(text: &str) -> String {
    let Some(start) = text.find("```") else {
        return text.trim().to_string();
    };
    let after_open = &text[start + 3..];
    let body = after_open
        .find('\n')
        .map_or("", |newline| &after_open[newline + 1..]);
    let body = body.find("```").map_or(body, |end| &body[..end]);
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::domain::models::{SourceUnit, TestTarget, UnitId};
    use crate::services::context_extractor;

    fn request(prior: Option<&str>, uncovered: &[&str]) -> GenerationRequest {
        let source = "package shop;\npublic class Cart {\n  public int size() { return 0; }\n}\n";
        GenerationRequest {
            unit: Arc::new(SourceUnit::new(
                UnitId::new("shop/Cart.java"),
                "src/main/java/shop/Cart.java",
                "shop.Cart",
                source,
                vec![],
            )),
            attempt: if prior.is_some() { 2 } else { 1 },
            target: TestTarget {
                relative_path: PathBuf::from("shop/CartTest.java"),
                class_name: "CartTest".into(),
            },
            prior_diagnostics: prior.map(ToString::to_string),
            uncovered_targets: uncovered.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_first_attempt_prompt() {
        let builder = PromptBuilder::new("Java", "JUnit 5", "v1");
        let req = request(None, &[]);
        let prompt = builder.user_prompt(&req, &context_extractor::extract(&req.unit.source_text));
        assert!(prompt.contains("TEST CLASS NAME: CartTest"));
        assert!(prompt.contains("PACKAGE: shop"));
        assert!(prompt.contains("public int size()"));
        assert!(!prompt.contains("PREVIOUS ATTEMPT"));
        assert!(!prompt.contains("STILL UNCOVERED"));
    }

    #[test]
    fn test_retry_prompt_carries_diagnostics_and_hints() {
        let builder = PromptBuilder::new("Java", "JUnit 5", "v1");
        let req = request(
            Some("[INFO] scanning\nCartTest.java:12: error: cannot find symbol\n[INFO] done"),
            &["L3", "L7"],
        );
        let prompt = builder.user_prompt(&req, &SourceContext::default());
        assert!(prompt.contains("PREVIOUS ATTEMPT 1 FAILED"));
        assert!(prompt.contains("CartTest.java:12: error: cannot find symbol"));
        assert!(!prompt.contains("[INFO] scanning"));
        assert!(prompt.contains("STILL UNCOVERED (focus new tests here):\nL3, L7"));
    }

    #[test]
    fn test_guide_system_section() {
        let guide = "# Guide\n\n## System Prompt\nYou write great tests.\nAlways use Mockito.\n\n## User Prompt Template\nignored";
        assert_eq!(
            extract_system_section(guide).as_deref(),
            Some("You write great tests.\nAlways use Mockito.")
        );
        let builder = PromptBuilder::new("Java", "JUnit 5", "v1").with_guide(guide);
        assert_eq!(builder.system_prompt(), "You write great tests.\nAlways use Mockito.");

        let plain = PromptBuilder::new("Java", "JUnit 5", "v1").with_guide("Be terse.");
        assert_eq!(plain.system_prompt(), "Be terse.");
    }

    #[test]
    fn test_diagnostics_fallback_to_everything() {
        let text = "BUILD FAILURE\nsomething odd";
        assert_eq!(relevant_diagnostics(text, &["Cart.java"]), text);
    }

    #[test]
    fn test_long_diagnostics_are_truncated() {
        let long = "x".repeat(MAX_DIAGNOSTIC_CHARS + 10);
        let cut = relevant_diagnostics(&long, &[]);
        assert!(cut.ends_with("(truncated)"));
        assert!(cut.len() < long.len() + 20);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```java\nclass A {}\n```\nThanks!"), "class A {}");
        assert_eq!(strip_code_fences("Here:\n```\nclass B {}\n```"), "class B {}");
        assert_eq!(strip_code_fences("class C {}\n"), "class C {}");
        assert_eq!(strip_code_fences("```java\nclass D {}"), "class D {}");
    }
}
