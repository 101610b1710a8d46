//! The check/benchmark entity model, configuration documents, and
//! structural validation.

pub mod config;
pub mod model;
pub mod registry;
pub mod validation;

pub use config::{BenchmarkConfigRoot, CheckConfigRoot, CheckOverride, ReportConfigRoot};
pub use model::{Benchmark, CheckCollection, Detect, Remediation, ReportCheck, Severity};
pub use registry::{delete_benchmark, resolve_benchmark, resolve_check, update_benchmark};
