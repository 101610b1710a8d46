//! Builds the per-benchmark result tree from a flat `check_id -> account ->
//! projections` map, and the queries downstream code runs over that tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::check::model::{Benchmark, CheckCollection, ReportCheck};
use crate::inspector::projection::ResourceProjection;

/// `check_id -> account_id -> failing resources`, the scheduler's raw
/// evaluation output.
pub type FailureMap = BTreeMap<String, BTreeMap<String, Vec<ResourceProjection>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: ReportCheck,
    pub count_by_account: BTreeMap<String, usize>,
    pub resources_failing_by_account: BTreeMap<String, Vec<ResourceProjection>>,
}

impl CheckResult {
    fn total_failures(&self) -> usize {
        self.count_by_account.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckCollectionResult {
    pub title: String,
    pub description: String,
    pub documentation: Option<String>,
    pub checks: Vec<CheckResult>,
    pub children: Vec<CheckCollectionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub id: String,
    pub framework: String,
    pub version: String,
    pub clouds: Vec<String>,
    pub collection: CheckCollectionResult,
}

/// Builds the full (unfiltered) result tree for `benchmark`, pulling each
/// leaf check's failures from `failures` and its metadata from `checks`.
pub fn build_benchmark_result(
    benchmark: &Benchmark,
    checks: &BTreeMap<String, ReportCheck>,
    failures: &FailureMap,
) -> BenchmarkResult {
    BenchmarkResult {
        id: benchmark.id.clone(),
        framework: benchmark.framework.clone(),
        version: benchmark.version.clone(),
        clouds: benchmark.clouds.clone(),
        collection: build_collection_result(&benchmark.collection, checks, failures),
    }
}

fn build_collection_result(
    collection: &CheckCollection,
    checks: &BTreeMap<String, ReportCheck>,
    failures: &FailureMap,
) -> CheckCollectionResult {
    let checks_result = collection
        .checks
        .iter()
        .filter_map(|id| {
            let check = checks.get(id)?.clone();
            let by_account = failures.get(id).cloned().unwrap_or_default();
            let count_by_account = by_account.iter().map(|(acc, rows)| (acc.clone(), rows.len())).collect();
            Some(CheckResult {
                check,
                count_by_account,
                resources_failing_by_account: by_account,
            })
        })
        .collect();

    CheckCollectionResult {
        title: collection.title.clone(),
        description: collection.description.clone(),
        documentation: collection.documentation.clone(),
        checks: checks_result,
        children: collection
            .children
            .iter()
            .map(|c| build_collection_result(c, checks, failures))
            .collect(),
    }
}

/// Keeps only checks with at least one failure, and collections that
/// directly own a surviving check or have a surviving descendant.
/// A no-op when `only_failed` is false.
pub fn filter_result(result: BenchmarkResult, only_failed: bool) -> BenchmarkResult {
    if !only_failed {
        return result;
    }
    BenchmarkResult {
        collection: filter_collection(result.collection),
        ..result
    }
}

fn filter_collection(collection: CheckCollectionResult) -> CheckCollectionResult {
    let checks: Vec<CheckResult> = collection.checks.into_iter().filter(|c| c.total_failures() > 0).collect();
    let children: Vec<CheckCollectionResult> = collection
        .children
        .into_iter()
        .map(filter_collection)
        .filter(|c| !c.checks.is_empty() || !c.children.is_empty())
        .collect();
    CheckCollectionResult {
        checks,
        children,
        ..collection
    }
}

/// Partitions every check reachable in `result` into passing vs. failing
/// for `account`: passing means `count_by_account.get(account)` is absent
/// or zero.
pub fn passing_failing_checks_for_account(result: &BenchmarkResult, account: &str) -> (Vec<String>, Vec<String>) {
    let mut passing = Vec::new();
    let mut failing = Vec::new();
    walk_collection(&result.collection, account, &mut passing, &mut failing);
    (passing, failing)
}

fn walk_collection(collection: &CheckCollectionResult, account: &str, passing: &mut Vec<String>, failing: &mut Vec<String>) {
    for check in &collection.checks {
        let count = check.count_by_account.get(account).copied().unwrap_or(0);
        if count == 0 {
            passing.push(check.check.id.clone());
        } else {
            failing.push(check.check.id.clone());
        }
    }
    for child in &collection.children {
        walk_collection(child, account, passing, failing);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

/// Flattens a benchmark result into nodes/edges for downstream
/// visualisation: the benchmark, each non-leaf collection, and each check
/// is a node; edges connect parents to children.
pub fn export_graph(result: &BenchmarkResult) -> (Vec<GraphNode>, Vec<GraphEdge>) {
    let mut nodes = vec![GraphNode {
        id: format!("benchmark:{}", result.id),
        kind: "benchmark".into(),
        label: result.id.clone(),
    }];
    let mut edges = Vec::new();
    export_collection(&result.collection, &format!("benchmark:{}", result.id), &mut nodes, &mut edges);
    (nodes, edges)
}

fn export_collection(collection: &CheckCollectionResult, parent_id: &str, nodes: &mut Vec<GraphNode>, edges: &mut Vec<GraphEdge>) {
    let collection_id = format!("{parent_id}/{}", collection.title);
    nodes.push(GraphNode {
        id: collection_id.clone(),
        kind: "collection".into(),
        label: collection.title.clone(),
    });
    edges.push(GraphEdge {
        from: parent_id.to_string(),
        to: collection_id.clone(),
    });
    for check in &collection.checks {
        let check_id = format!("check:{}", check.check.id);
        nodes.push(GraphNode {
            id: check_id.clone(),
            kind: "check".into(),
            label: check.check.id.clone(),
        });
        edges.push(GraphEdge {
            from: collection_id.clone(),
            to: check_id,
        });
    }
    for child in &collection.children {
        export_collection(child, &collection_id, nodes, edges);
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
            default_values: Default::default(),
        }
    }

    fn resource(id: &str) -> ResourceProjection {
        ResourceProjection {
            node_id: id.into(),
            id: id.into(),
            name: id.into(),
            kind: "aws_instance".into(),
            tags: serde_json::Value::Null,
            ctime: None,
            atime: None,
            mtime: None,
            cloud: None,
            account: Some("sub_root".into()),
            region: None,
            zone: None,
        }
    }

    fn sample_benchmark_and_checks() -> (Benchmark, BTreeMap<String, ReportCheck>) {
        let benchmark = Benchmark {
            id: "test".into(),
            framework: "cis".into(),
            version: "1.0".into(),
            clouds: vec!["aws".into()],
            collection: CheckCollection {
                title: "root".into(),
                description: String::new(),
                documentation: None,
                checks: vec!["check_a".into(), "check_b".into()],
                children: vec![],
            },
        };
        let mut checks = BTreeMap::new();
        checks.insert("check_a".into(), check("check_a"));
        checks.insert("check_b".into(), check("check_b"));
        (benchmark, checks)
    }

    #[test]
    fn test_s4_two_failing_checks_same_account() {
        let (benchmark, checks) = sample_benchmark_and_checks();
        let mut failures: FailureMap = BTreeMap::new();
        let ten: Vec<ResourceProjection> = (0..10).map(|i| resource(&format!("r{i}"))).collect();
        failures.insert("check_a".into(), BTreeMap::from([("sub_root".to_string(), ten.clone())]));
        failures.insert("check_b".into(), BTreeMap::from([("sub_root".to_string(), ten)]));

        let result = build_benchmark_result(&benchmark, &checks, &failures);
        let (passing, failing) = passing_failing_checks_for_account(&result, "sub_root");
        assert_eq!(passing.len(), 0);
        assert_eq!(failing.len(), 2);

        let (passing_unknown, failing_unknown) = passing_failing_checks_for_account(&result, "unknown");
        assert_eq!(passing_unknown.len(), 2);
        assert_eq!(failing_unknown.len(), 0);
    }

    #[test]
    fn test_filter_result_drops_passing_checks() {
        let (benchmark, checks) = sample_benchmark_and_checks();
        let mut failures: FailureMap = BTreeMap::new();
        failures.insert(
            "check_a".into(),
            BTreeMap::from([("sub_root".to_string(), vec![resource("r0")])]),
        );
        let result = build_benchmark_result(&benchmark, &checks, &failures);
        let filtered = filter_result(result, true);
        assert_eq!(filtered.collection.checks.len(), 1);
        assert_eq!(filtered.collection.checks[0].check.id, "check_a");
    }

    #[test]
    fn test_filter_result_noop_when_not_only_failed() {
        let (benchmark, checks) = sample_benchmark_and_checks();
        let result = build_benchmark_result(&benchmark, &checks, &FailureMap::new());
        let filtered = filter_result(result.clone(), false);
        assert_eq!(filtered, result);
    }

    #[test]
    fn test_export_graph_shape() {
        let (benchmark, checks) = sample_benchmark_and_checks();
        let result = build_benchmark_result(&benchmark, &checks, &FailureMap::new());
        let (nodes, edges) = export_graph(&result);
        assert_eq!(nodes.iter().filter(|n| n.kind == "check").count(), 2);
        assert_eq!(edges.len(), 3);
    }
}
