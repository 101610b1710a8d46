//! Per-run evaluation context for the inspector scheduler.

use crate::check::model::Severity;

/// Scopes and bounds one `perform_benchmarks`/`load_benchmarks` call.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub accounts: Option<Vec<String>>,
    pub severity: Option<Severity>,
    pub only_failed: bool,
    pub parallel_checks: usize,
}

impl Default for CheckContext {
    fn default() -> Self {
        Self {
            accounts: None,
            severity: None,
            only_failed: false,
            parallel_checks: 10,
        }
    }
}

impl CheckContext {
    pub fn includes(&self, severity: Severity) -> bool {
        match self.severity {
            Some(threshold) => Severity::includes_severity(threshold, severity),
            None => true,
        }
    }
}
