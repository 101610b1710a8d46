//! The result assembler: turns flat check evaluation output into the
//! benchmark/collection/check tree and the queries run over it.

pub mod assembler;

pub use assembler::{
    build_benchmark_result, export_graph, filter_result, passing_failing_checks_for_account, BenchmarkResult,
    CheckCollectionResult, CheckResult, FailureMap, GraphEdge, GraphNode,
};
