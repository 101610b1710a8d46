//! Structural validation for user-supplied benchmarks and checks. Every
//! violation is collected; validators never short-circuit on the first
//! problem found.

use std::collections::BTreeSet;

use crate::check::model::{Benchmark, Detect, ReportCheck};
use crate::error::{InspectorError, Result};

/// Validates `check`, using `parse_resoto`/`parse_cmd` to confirm a
/// `resoto`/`resoto_cmd` detection string actually parses (the template
/// expander and CLI command parser are external collaborators, so the
/// caller supplies the parse check as a closure rather than this module
/// depending on them directly).
pub fn validate_check(
    check: &ReportCheck,
    parse_resoto: impl Fn(&str) -> std::result::Result<(), String>,
    parse_cmd: impl Fn(&str) -> std::result::Result<(), String>,
) -> Vec<String> {
    let mut issues = Vec::new();

    if check.id.trim().is_empty() {
        issues.push("check id must not be empty".to_string());
    }
    if check.risk.trim().is_empty() {
        issues.push(format!("check {:?}: risk must not be empty", check.id));
    }
    if check.remediation.text.trim().is_empty() {
        issues.push(format!("check {:?}: remediation.text must not be empty", check.id));
    }
    if check.remediation.url.trim().is_empty() {
        issues.push(format!("check {:?}: remediation.url must not be empty", check.id));
    }
    if check.result_kinds.is_empty() {
        issues.push(format!("check {:?}: result_kinds must not be empty", check.id));
    }

    let detection_text = match &check.detect {
        Detect::Resoto(s) => {
            if let Err(e) = parse_resoto(s) {
                issues.push(format!("check {:?}: resoto detection does not parse: {e}", check.id));
            }
            Some(s.clone())
        }
        Detect::ResotoCmd(s) => {
            if let Err(e) = parse_cmd(s) {
                issues.push(format!("check {:?}: resoto_cmd detection does not parse: {e}", check.id));
            }
            Some(s.clone())
        }
        Detect::Manual => None,
    };

    if let Some(text) = detection_text {
        for kind in &check.result_kinds {
            if !text.contains(kind.as_str()) {
                issues.push(format!(
                    "check {:?}: result kind {kind:?} does not appear in its detection string",
                    check.id
                ));
            }
        }
    }

    issues
}

/// Validates `benchmark`, which was loaded under configuration id
/// `config_id` (dot-delimited; the trailing segment must equal the
/// benchmark's own id). `known_checks` is the set of every check id the
/// config store currently resolves.
pub fn validate_benchmark(benchmark: &Benchmark, config_id: &str, known_checks: &BTreeSet<String>) -> Vec<String> {
    let mut issues = Vec::new();

    let trailing = config_id.rsplit('.').next().unwrap_or(config_id);
    if trailing != benchmark.id {
        issues.push(format!(
            "benchmark id {:?} does not match trailing segment of configuration id {config_id:?}",
            benchmark.id
        ));
    }

    for check_id in benchmark.nested_checks() {
        if !known_checks.contains(&check_id) {
            issues.push(format!(
                "benchmark {:?} references unknown check {check_id:?}",
                benchmark.id
            ));
        }
    }

    issues
}

/// Runs [`validate_check`] and converts any violations into a single
/// [`InspectorError::Validation`].
pub fn validate_check_or_err(
    check: &ReportCheck,
    parse_resoto: impl Fn(&str) -> std::result::Result<(), String>,
    parse_cmd: impl Fn(&str) -> std::result::Result<(), String>,
) -> Result<()> {
    let issues = validate_check(check, parse_resoto, parse_cmd);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(InspectorError::Validation(issues))
    }
}
