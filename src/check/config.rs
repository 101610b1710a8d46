//! Parsing of checks/benchmarks from nested mapping documents, and the
//! configuration override layer (`ignore_checks`, per-check default-value
//! overrides) that `CheckContext` consults.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::check::model::{Benchmark, ReportCheck};

/// A document keyed by a top-level root name, holding a set of checks —
/// mirrors how these documents may be split across several files on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckConfigRoot {
    #[serde(default)]
    pub report_check: BTreeMap<String, ReportCheck>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkConfigRoot {
    #[serde(default)]
    pub report_benchmark: BTreeMap<String, Benchmark>,
}

/// Per-check default-variable overrides, keyed by check id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOverride {
    #[serde(default)]
    pub default_values: BTreeMap<String, String>,
}

/// The report-wide override document: which checks to skip entirely, and
/// per-check variable overrides applied over a check's own `default_values`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfigRoot {
    #[serde(default)]
    pub ignore_checks: BTreeSet<String>,
    #[serde(default)]
    pub checks: BTreeMap<String, CheckOverride>,
}

impl ReportConfigRoot {
    /// The merged variable environment for `check`: its own
    /// `default_values`, overridden key-by-key by any report-level override.
    pub fn environment(&self, check: &ReportCheck) -> BTreeMap<String, String> {
        let mut env = check.default_values.clone();
        if let Some(over) = self.checks.get(&check.id) {
            env.extend(over.default_values.clone());
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::model::{Detect, Remediation, Severity};

    fn check(id: &str) -> ReportCheck {
        ReportCheck {
            id: id.into(),
            provider: "aws".into(),
            service: "ec2".into(),
            categories: Default::default(),
            result_kinds: vec!["aws_instance".into()],
            severity: Severity::High,
            risk: "risk".into(),
            remediation: Remediation {
                text: "fix it".into(),
                url: "https://example.com".into(),
            },
            detect: Detect::Manual,
            default_values: BTreeMap::from([("region".into(), "us-east-1".into())]),
        }
    }

    #[test]
    fn test_environment_merges_with_override_precedence() {
        let mut report = ReportConfigRoot::default();
        report.checks.insert(
            "c1".into(),
            CheckOverride {
                default_values: BTreeMap::from([("region".into(), "eu-west-1".into())]),
            },
        );
        let env = report.environment(&check("c1"));
        assert_eq!(env.get("region"), Some(&"eu-west-1".to_string()));
    }

    #[test]
    fn test_environment_falls_back_to_check_defaults() {
        let report = ReportConfigRoot::default();
        let env = report.environment(&check("c1"));
        assert_eq!(env.get("region"), Some(&"us-east-1".to_string()));
    }
}
