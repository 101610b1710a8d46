//! Report-check and benchmark entities: severity, detection, remediation,
//! and the tree of checks/collections/benchmarks a benchmark evaluation
//! walks.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity, totally ordered by declaration order (most severe last) so
/// that derived `Ord` gives the priority table for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn priority(self) -> u8 {
        self as u8
    }

    /// `includes_severity(threshold, s) := prio(threshold) <= prio(s)`.
    pub fn includes_severity(threshold: Severity, s: Severity) -> bool {
        threshold.priority() <= s.priority()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remediation {
    pub text: String,
    pub url: String,
}

/// Exactly one of `resoto` (a graph-query search string), `resoto_cmd` (a
/// CLI command string), or `manual` (no automated detection) is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Detect {
    Resoto(String),
    ResotoCmd(String),
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCheck {
    pub id: String,
    pub provider: String,
    pub service: String,
    pub categories: BTreeSet<String>,
    pub result_kinds: Vec<String>,
    pub severity: Severity,
    pub risk: String,
    pub remediation: Remediation,
    pub detect: Detect,
    pub default_values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCollection {
    pub title: String,
    pub description: String,
    pub documentation: Option<String>,
    pub checks: Vec<String>,
    pub children: Vec<CheckCollection>,
}

impl CheckCollection {
    /// Flattens the set of check ids referenced anywhere in this subtree.
    pub fn nested_checks(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_checks(&mut out);
        out
    }

    fn collect_checks(&self, out: &mut BTreeSet<String>) {
        out.extend(self.checks.iter().cloned());
        for child in &self.children {
            child.collect_checks(out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Benchmark {
    pub id: String,
    pub framework: String,
    pub version: String,
    pub clouds: Vec<String>,
    pub collection: CheckCollection,
}

impl Benchmark {
    pub fn nested_checks(&self) -> BTreeSet<String> {
        self.collection.nested_checks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Critical);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_includes_severity() {
        assert!(Severity::includes_severity(Severity::Medium, Severity::High));
        assert!(Severity::includes_severity(Severity::Medium, Severity::Medium));
        assert!(!Severity::includes_severity(Severity::Medium, Severity::Low));
    }

    #[test]
    fn test_nested_checks_flattens_tree() {
        let tree = CheckCollection {
            title: "root".into(),
            description: String::new(),
            documentation: None,
            checks: vec!["a".into()],
            children: vec![CheckCollection {
                title: "child".into(),
                description: String::new(),
                documentation: None,
                checks: vec!["b".into(), "c".into()],
                children: vec![],
            }],
        };
        let checks = tree.nested_checks();
        assert_eq!(checks.len(), 3);
        assert!(checks.contains("a") && checks.contains("b") && checks.contains("c"));
    }
}
