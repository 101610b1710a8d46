//! The inspector scheduler: evaluates checks against a graph, assembles
//! benchmark results, and optionally materialises findings back onto the
//! graph.

pub mod context;
pub mod projection;
pub mod scheduler;

pub use context::CheckContext;
pub use projection::{project_row, ResourceProjection};
pub use scheduler::{list_failing_resources, load_benchmarks, perform_benchmarks};
