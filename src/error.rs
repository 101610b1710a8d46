//! Error types for the inspector.
//!
//! All errors that can occur while building queries, validating benchmarks,
//! or running the inspector scheduler are represented by [`InspectorError`].
//! Errors are propagated via `Result<T, InspectorError>` throughout the
//! crate.
//!
//! # Error Classification
//!
//! Errors are classified into five categories via [`InspectorError::kind`]:
//! - **User** — malformed query text, malformed ancestor/descendant names.
//!   Never retried.
//! - **Validation** — benchmark/check invariant violations, collected and
//!   returned together rather than raised mid-stream.
//! - **NotFound** — unknown check or benchmark id.
//! - **Denied** — an attempt to delete or mutate a predefined benchmark.
//! - **PerCheck** — failures scoped to a single check's evaluation (query
//!   parse, cursor error). The only kind ever demoted to an empty result;
//!   see [`InspectorError::demotes_to_empty_result`].
//! - **Internal** — bugs. Surfaced immediately, never demoted.

use std::fmt;

/// Primary error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum InspectorError {
    // ── User errors — fail, don't retry ──────────────────────────────────
    /// A tagged-record term or query document could not be parsed.
    #[error("query parse error: {0}")]
    QueryParse(String),

    /// An `ancestors.*` / `descendants.*` predicate name did not have the
    /// expected `{ancestors|descendants}.{kind}.{property...}` shape.
    #[error("malformed ancestor/descendant name {0:?}: expected at least 3 dot-separated segments")]
    MalformedAncestorName(String),

    /// A combinator was asked to set a second aggregate on a query that
    /// already carries one.
    #[error("query already has an aggregate: {0}")]
    DuplicateAggregate(String),

    /// `combine()` found two parts with clashing tags or with-clauses.
    #[error("cannot combine queries: {0}")]
    Incombinable(String),

    // ── Not-found errors ──────────────────────────────────────────────────
    /// The referenced check id does not resolve to a known check.
    #[error("unknown check: {0}")]
    UnknownCheck(String),

    /// The referenced benchmark id does not resolve to a known benchmark.
    #[error("unknown benchmark: {0}")]
    UnknownBenchmark(String),

    // ── Denied operations ──────────────────────────────────────────────────
    /// An attempt was made to delete or update a predefined (built-in)
    /// benchmark or check.
    #[error("predefined entry is immutable: {0}")]
    PredefinedImmutable(String),

    // ── Validation errors — collected, never raised mid-stream ────────────
    /// One or more structural invariants of a benchmark or check were
    /// violated. Carries every violation found, not just the first.
    #[error("validation failed with {} issue(s): {}", .0.len(), .0.join("; "))]
    Validation(Vec<String>),

    // ── Per-check evaluation errors — demoted to an empty result ──────────
    /// The template expander could not parse a check's detection string.
    #[error("template expansion failed: {0}")]
    TemplateExpand(String),

    /// The external CLI command evaluator rejected a `resoto_cmd` detection.
    #[error("CLI command evaluation failed: {0}")]
    CliEvaluation(String),

    /// Opening or reading from a graph-db cursor failed.
    #[error("graph cursor error: {0}")]
    GraphCursor(String),

    // ── Internal errors — should not happen ────────────────────────────────
    /// An unexpected internal error. Indicates a bug (e.g. the
    /// ancestor/descendant rewriter reached its "unreachable" branch).
    #[error("internal error: {0}")]
    Internal(String),
}

impl InspectorError {
    /// Whether this error, if raised while evaluating a single check inside
    /// [`crate::inspector::perform_benchmarks`], should be logged and
    /// demoted to an empty result rather than aborting the whole batch.
    ///
    /// Only [`InspectorErrorKind::PerCheck`] errors demote; every other
    /// kind propagates out of the scheduler.
    pub fn demotes_to_empty_result(&self) -> bool {
        matches!(self.kind(), InspectorErrorKind::PerCheck)
    }

    /// Classify the error for logging and control flow.
    pub fn kind(&self) -> InspectorErrorKind {
        match self {
            InspectorError::QueryParse(_)
            | InspectorError::MalformedAncestorName(_)
            | InspectorError::DuplicateAggregate(_)
            | InspectorError::Incombinable(_) => InspectorErrorKind::User,

            InspectorError::UnknownCheck(_) | InspectorError::UnknownBenchmark(_) => {
                InspectorErrorKind::NotFound
            }

            InspectorError::PredefinedImmutable(_) => InspectorErrorKind::Denied,

            InspectorError::Validation(_) => InspectorErrorKind::Validation,

            InspectorError::TemplateExpand(_)
            | InspectorError::CliEvaluation(_)
            | InspectorError::GraphCursor(_) => InspectorErrorKind::PerCheck,

            InspectorError::Internal(_) => InspectorErrorKind::Internal,
        }
    }
}

/// Classification of error kind, used to decide propagation vs. demotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectorErrorKind {
    User,
    NotFound,
    Denied,
    Validation,
    PerCheck,
    Internal,
}

impl fmt::Display for InspectorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectorErrorKind::User => write!(f, "USER"),
            InspectorErrorKind::NotFound => write!(f, "NOT_FOUND"),
            InspectorErrorKind::Denied => write!(f, "DENIED"),
            InspectorErrorKind::Validation => write!(f, "VALIDATION"),
            InspectorErrorKind::PerCheck => write!(f, "PER_CHECK"),
            InspectorErrorKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

pub type Result<T> = std::result::Result<T, InspectorError>;
