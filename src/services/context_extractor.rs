//! Lightweight structural extraction from a source file.
//!
//! Pulls the package, imports, declared class, constructors, methods, fields
//! and the dependency types a test will have to mock out of Java-like
//! source text. Regex-based on purpose: the result only guides prompts and
//! never has to be a faithful parse.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// Field annotations that mark an injected dependency.
const INJECTION_ANNOTATIONS: &[&str] = &["Autowired", "Inject", "Resource", "MockBean"];

/// Type-name suffixes that usually denote a collaborator worth mocking.
const COLLABORATOR_SUFFIXES: &[&str] = &[
    "Repository",
    "Service",
    "Dao",
    "Client",
    "Gateway",
    "Mapper",
    "Publisher",
    "Provider",
];

/// Tokens a regex can mistake for a type in statement position.
const NOT_A_TYPE: &[&str] = &[
    "return", "throw", "new", "else", "package", "import", "case", "yield", "assert",
];

const CONTROL_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "catch", "synchronized", "try"];

/// A constructor or method signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Return type; empty for constructors
    pub returns: String,
    pub name: String,
    pub parameters: Vec<Parameter>,
}

impl Signature {
    pub fn render(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.type_name, p.name))
            .collect::<Vec<_>>()
            .join(", ");
        if self.returns.is_empty() {
            format!("{}({params})", self.name)
        } else {
            format!("{} {}({params})", self.returns, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub type_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub type_name: String,
    pub name: String,
    pub annotations: Vec<String>,
}

/// Structural summary of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceContext {
    pub package: Option<String>,
    pub imports: Vec<String>,
    pub class_name: Option<String>,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub constructors: Vec<Signature>,
    pub methods: Vec<Signature>,
    pub fields: Vec<Field>,
    /// Collaborator types a test needs to mock, sorted and deduplicated
    pub dependencies: Vec<String>,
}

impl SourceContext {
    /// `package.Class`, falling back to `fallback` when no class was found.
    pub fn qualified_name(&self, fallback: &str) -> String {
        match (&self.package, &self.class_name) {
            (Some(package), Some(class)) => format!("{package}.{class}"),
            (None, Some(class)) => class.clone(),
            _ => fallback.to_string(),
        }
    }

    /// Plain-text block handed to the generation backend.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(package) = &self.package {
            out.push_str(&format!("PACKAGE: {package}\n"));
        }
        if let Some(class) = &self.class_name {
            out.push_str(&format!("CLASS: {class}"));
            if let Some(parent) = &self.extends {
                out.push_str(&format!(" extends {parent}"));
            }
            if !self.implements.is_empty() {
                out.push_str(&format!(" implements {}", self.implements.join(", ")));
            }
            out.push('\n');
        }
        push_section(&mut out, "IMPORTS", self.imports.iter().cloned());
        push_section(
            &mut out,
            "CONSTRUCTORS",
            self.constructors.iter().map(Signature::render),
        );
        push_section(
            &mut out,
            "FIELDS",
            self.fields
                .iter()
                .map(|field| format!("{} {}", field.type_name, field.name)),
        );
        push_section(&mut out, "METHODS", self.methods.iter().map(Signature::render));
        push_section(&mut out, "DEPENDENCIES TO MOCK", self.dependencies.iter().cloned());
        out
    }
}

fn push_section(out: &mut String, title: &str, items: impl Iterator<Item = String>) {
    let items: Vec<String> = items.collect();
    if items.is_empty() {
        return;
    }
    out.push_str(title);
    out.push_str(":\n");
    for item in items {
        out.push_str("- ");
        out.push_str(&item);
        out.push('\n');
    }
}

// ============================================================================
// Patterns
// ============================================================================

static PACKAGE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static IMPORT_RE: OnceLock<Option<Regex>> = OnceLock::new();
static CLASS_RE: OnceLock<Option<Regex>> = OnceLock::new();
static FIELD_RE: OnceLock<Option<Regex>> = OnceLock::new();
static METHOD_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn package_re() -> Option<&'static Regex> {
    cached(&PACKAGE_RE, r"(?m)^\s*package\s+([\w.]+)\s*;")
}

fn import_re() -> Option<&'static Regex> {
    cached(&IMPORT_RE, r"(?m)^\s*import\s+(?:static\s+)?([\w.*]+)\s*;")
}

fn class_re() -> Option<&'static Regex> {
    cached(
        &CLASS_RE,
        r"\b(?:class|interface|enum|record)\s+(\w+)(?:<[^>{]*>)?(?:\s+extends\s+([\w.]+)(?:<[^>{]*>)?)?(?:\s+implements\s+([^{]+))?\s*\{",
    )
}

fn field_re() -> Option<&'static Regex> {
    cached(
        &FIELD_RE,
        r"(?m)^\s*((?:@\w+(?:\([^)]*\))?\s+)*)(?:(?:public|private|protected|static|final|volatile|transient)\s+)*([\w.]+(?:<[^;=()]*>)?(?:\[\])?)\s+(\w+)\s*(?:=[^;]*)?;",
    )
}

fn method_re() -> Option<&'static Regex> {
    cached(
        &METHOD_RE,
        r"(?m)^\s*(?:@\w+(?:\([^)]*\))?\s+)*(?:(?:public|private|protected|static|final|synchronized|abstract|default)\s+)*(?:<[^>]+>\s+)?([\w.]+(?:<[^>()]*>)?(?:\[\])?)\s+(\w+)\s*\(([^)]*)\)\s*(?:throws\s+[\w.,\s]+)?\{",
    )
}

// ============================================================================
// Extraction
// ============================================================================

/// Extract a [`SourceContext`] from source text.
pub fn extract(source: &str) -> SourceContext {
    let mut context = SourceContext {
        package: package_re()
            .and_then(|re| re.captures(source))
            .map(|caps| caps[1].to_string()),
        imports: import_re()
            .map(|re| re.captures_iter(source).map(|caps| caps[1].to_string()).collect())
            .unwrap_or_default(),
        ..SourceContext::default()
    };

    if let Some(caps) = class_re().and_then(|re| re.captures(source)) {
        context.class_name = Some(caps[1].to_string());
        context.extends = caps.get(2).map(|m| m.as_str().to_string());
        context.implements = caps
            .get(3)
            .map(|m| split_type_list(m.as_str()))
            .unwrap_or_default();
    }

    if let Some(class) = context.class_name.clone() {
        context.constructors = extract_constructors(source, &class);
    }
    context.methods = extract_methods(source, context.class_name.as_deref());
    context.fields = extract_fields(source);
    context.dependencies = collect_dependencies(&context);
    context
}

fn extract_constructors(source: &str, class: &str) -> Vec<Signature> {
    let pattern = format!(
        r"(?m)^\s*(?:@\w+\s+)*(?:public|protected|private)?\s*{}\s*\(([^)]*)\)\s*(?:throws\s+[\w.,\s]+)?\{{",
        regex::escape(class)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(source)
        .map(|caps| Signature {
            returns: String::new(),
            name: class.to_string(),
            parameters: parse_parameters(&caps[1]),
        })
        .collect()
}

fn extract_methods(source: &str, class: Option<&str>) -> Vec<Signature> {
    let Some(re) = method_re() else {
        return Vec::new();
    };
    re.captures_iter(source)
        .filter_map(|caps| {
            let returns = caps[1].to_string();
            let name = caps[2].to_string();
            if NOT_A_TYPE.contains(&returns.as_str())
                || CONTROL_KEYWORDS.contains(&name.as_str())
                || Some(name.as_str()) == class
            {
                return None;
            }
            Some(Signature {
                returns,
                name,
                parameters: parse_parameters(&caps[3]),
            })
        })
        .collect()
}

fn extract_fields(source: &str) -> Vec<Field> {
    let Some(re) = field_re() else {
        return Vec::new();
    };
    re.captures_iter(source)
        .filter_map(|caps| {
            let type_name = caps[2].to_string();
            if NOT_A_TYPE.contains(&type_name.as_str()) {
                return None;
            }
            let annotations = caps[1]
                .split_whitespace()
                .filter_map(|token| token.strip_prefix('@'))
                .map(|token| token.split('(').next().unwrap_or(token).to_string())
                .collect();
            Some(Field {
                type_name,
                name: caps[3].to_string(),
                annotations,
            })
        })
        .collect()
}

fn parse_parameters(raw: &str) -> Vec<Parameter> {
    split_type_list(raw)
        .into_iter()
        .filter_map(|param| {
            let tokens: Vec<&str> = param
                .split_whitespace()
                .filter(|token| !token.starts_with('@') && *token != "final")
                .collect();
            match tokens.as_slice() {
                [] | [_] => None,
                [types @ .., name] => Some(Parameter {
                    type_name: types.join(" "),
                    name: (*name).to_string(),
                }),
            }
        })
        .collect()
}

/// Split on commas that are not nested inside generics.
fn split_type_list(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0_i32;
    let mut current = String::new();
    for ch in raw.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn base_type(type_name: &str) -> &str {
    let raw = type_name.split('<').next().unwrap_or(type_name);
    raw.rsplit('.').next().unwrap_or(raw).trim_end_matches("[]")
}

fn is_collaborator(type_name: &str) -> bool {
    let base = base_type(type_name);
    COLLABORATOR_SUFFIXES.iter().any(|suffix| base.ends_with(suffix))
}

fn collect_dependencies(context: &SourceContext) -> Vec<String> {
    let mut deps = BTreeSet::new();
    for field in &context.fields {
        let injected = field
            .annotations
            .iter()
            .any(|a| INJECTION_ANNOTATIONS.contains(&a.as_str()));
        if injected || is_collaborator(&field.type_name) {
            deps.insert(base_type(&field.type_name).to_string());
        }
    }
    for ctor in &context.constructors {
        for param in &ctor.parameters {
            if is_collaborator(&param.type_name) {
                deps.insert(base_type(&param.type_name).to_string());
            }
        }
    }
    deps.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r"
package com.shop.cart;

import java.util.List;
import java.math.BigDecimal;
import static java.util.Objects.requireNonNull;

@Service
public class CartService extends BaseService implements Auditable, Comparable<CartService> {

    private final CartRepository repository;
    @Autowired
    private PriceCalculator calculator;
    private int maxItems = 50;

    public CartService(CartRepository repository, PricingClient pricing) {
        this.repository = requireNonNull(repository);
    }

    public BigDecimal total(List<Item> items, boolean withTax) {
        if (items.isEmpty()) {
            return BigDecimal.ZERO;
        }
        return calculator.sum(items);
    }

    protected static Map<String, Integer> counts() throws IOException {
        return Map.of();
    }
}
";

    #[test]
    fn test_extracts_package_imports_and_class() {
        let ctx = extract(SOURCE);
        assert_eq!(ctx.package.as_deref(), Some("com.shop.cart"));
        assert_eq!(
            ctx.imports,
            vec!["java.util.List", "java.math.BigDecimal", "java.util.Objects.requireNonNull"]
        );
        assert_eq!(ctx.class_name.as_deref(), Some("CartService"));
        assert_eq!(ctx.extends.as_deref(), Some("BaseService"));
        assert_eq!(ctx.implements, vec!["Auditable", "Comparable<CartService>"]);
        assert_eq!(ctx.qualified_name("x"), "com.shop.cart.CartService");
    }

    #[test]
    fn test_extracts_members() {
        let ctx = extract(SOURCE);
        assert_eq!(ctx.constructors.len(), 1);
        assert_eq!(
            ctx.constructors[0].render(),
            "CartService(CartRepository repository, PricingClient pricing)"
        );
        let names: Vec<_> = ctx.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["total", "counts"]);
        assert_eq!(
            ctx.methods[0].render(),
            "BigDecimal total(List<Item> items, boolean withTax)"
        );
        let fields: Vec<_> = ctx.fields.iter().map(|f| f.name.as_str()).collect();
        assert!(fields.contains(&"repository"));
        assert!(fields.contains(&"calculator"));
        assert!(fields.contains(&"maxItems"));
    }

    #[test]
    fn test_dependencies_from_fields_and_constructor() {
        let ctx = extract(SOURCE);
        assert_eq!(
            ctx.dependencies,
            vec!["CartRepository", "PriceCalculator", "PricingClient"]
        );
    }

    #[test]
    fn test_render_contains_sections() {
        let rendered = extract(SOURCE).render();
        assert!(rendered.contains("PACKAGE: com.shop.cart"));
        assert!(rendered.contains("CLASS: CartService extends BaseService"));
        assert!(rendered.contains("DEPENDENCIES TO MOCK:\n- CartRepository"));
    }

    #[test]
    fn test_empty_source() {
        let ctx = extract("");
        assert_eq!(ctx, SourceContext::default());
        assert_eq!(ctx.qualified_name("Cart.java"), "Cart.java");
        assert!(ctx.render().is_empty());
    }
}
