//! JaCoCo XML report parser.
//!
//! Only `<package>`, `<sourcefile>`, `<line>` and `<counter>` elements are
//! read. Per-file numbers come from the file's own `LINE`/`BRANCH` counter
//! and fall back to summing its `<line>` elements when the counter is absent.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::{branch_target, line_target, ReportError};
use crate::domain::models::{CoverageCounts, CoverageGranularity, CoverageReport, UnitCoverage};

static TAG_RE: OnceLock<Option<Regex>> = OnceLock::new();
static ATTR_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn malformed(reason: impl Into<String>) -> ReportError {
    ReportError::Malformed {
        format: "JaCoCo",
        reason: reason.into(),
    }
}

#[derive(Default)]
struct FileAccumulator {
    key: String,
    counter: Option<CoverageCounts>,
    from_lines: CoverageCounts,
    uncovered: Vec<String>,
}

impl FileAccumulator {
    fn finish(self) -> (String, UnitCoverage) {
        (
            self.key,
            UnitCoverage {
                counts: self.counter.unwrap_or(self.from_lines),
                uncovered: self.uncovered,
            },
        )
    }
}

fn attributes(raw: &str, attr_re: &Regex) -> BTreeMap<String, String> {
    attr_re
        .captures_iter(raw)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

fn number(attrs: &BTreeMap<String, String>, name: &str) -> u64 {
    attrs.get(name).and_then(|v| v.parse().ok()).unwrap_or(0)
}

pub fn parse(xml: &str, granularity: CoverageGranularity) -> Result<CoverageReport, ReportError> {
    if !xml.contains("<report") {
        return Err(malformed("missing <report> root element"));
    }
    let (Some(tag_re), Some(attr_re)) = (
        cached(&TAG_RE, r"<(/?)(package|sourcefile|line|counter)\b([^>]*)>"),
        cached(&ATTR_RE, r#"(\w+)="([^"]*)""#),
    ) else {
        return Err(malformed("internal pattern failed to compile"));
    };
    let counter_type = match granularity {
        CoverageGranularity::Line => "LINE",
        CoverageGranularity::Branch => "BRANCH",
    };

    let mut units = BTreeMap::new();
    let mut package = String::new();
    let mut current: Option<FileAccumulator> = None;

    for cap in tag_re.captures_iter(xml) {
        let closing = &cap[1] == "/";
        let element = &cap[2];
        let raw = &cap[3];

        match (element, closing) {
            ("package", false) => {
                package = attributes(raw, attr_re).remove("name").unwrap_or_default();
            }
            ("package", true) => package.clear(),
            ("sourcefile", false) => {
                let name = attributes(raw, attr_re).remove("name").unwrap_or_default();
                let key = if package.is_empty() {
                    name
                } else {
                    format!("{}/{name}", package.trim_end_matches('/'))
                };
                current = Some(FileAccumulator {
                    key,
                    ..FileAccumulator::default()
                });
            }
            ("sourcefile", true) => {
                if let Some(file) = current.take() {
                    let (key, coverage) = file.finish();
                    units.insert(key, coverage);
                }
            }
            ("line", false) => {
                let Some(file) = current.as_mut() else { continue };
                let attrs = attributes(raw, attr_re);
                let nr = number(&attrs, "nr");
                let (mi, ci) = (number(&attrs, "mi"), number(&attrs, "ci"));
                let (mb, cb) = (number(&attrs, "mb"), number(&attrs, "cb"));
                match granularity {
                    CoverageGranularity::Line => {
                        if mi + ci > 0 {
                            file.from_lines.total += 1;
                            if ci > 0 {
                                file.from_lines.covered += 1;
                            } else {
                                file.uncovered.push(line_target(nr));
                            }
                        }
                    }
                    CoverageGranularity::Branch => {
                        file.from_lines.add(CoverageCounts::new(cb, mb + cb));
                        file.uncovered
                            .extend((1..=mb).map(|ordinal| branch_target(nr, ordinal)));
                    }
                }
            }
            ("counter", false) => {
                let Some(file) = current.as_mut() else { continue };
                let attrs = attributes(raw, attr_re);
                if attrs.get("type").map(String::as_str) == Some(counter_type) {
                    let covered = number(&attrs, "covered");
                    let missed = number(&attrs, "missed");
                    file.counter = Some(CoverageCounts::new(covered, covered + missed));
                }
            }
            _ => {}
        }
    }

    if current.is_some() {
        return Err(malformed("unterminated <sourcefile> element"));
    }

    Ok(CoverageReport::from_units(granularity, units))
}
