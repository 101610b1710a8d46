//! The two scheduler entry points: `perform_benchmarks` evaluates checks
//! from scratch and optionally materialises the result; `load_benchmarks`
//! rebuilds the result tree from previously materialised `security`
//! sections without re-running any detection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use crate::check::config::ReportConfigRoot;
use crate::check::model::{Detect, ReportCheck, Severity};
use crate::check::registry;
use crate::cli_eval::CliCommandEvaluator;
use crate::config_store::ConfigStore;
use crate::error::Result;
use crate::graph::{GraphDatabase, Row, SecurityIssue};
use crate::inspector::context::CheckContext;
use crate::inspector::projection::{project_row, ResourceProjection};
use crate::query::query::Query;
use crate::query::term::{PredicateOp, Term, Value};
use crate::result::{build_benchmark_result, BenchmarkResult, FailureMap};
use crate::template::TemplateExpander;

const MODEL: &str = "reported";

/// Scoped-acquisition guard over a graph cursor: logs open/close at
/// `debug!`, with `Drop` guaranteeing the close log fires on every exit
/// path (normal completion, `?`-propagated error, or future cancellation).
struct ScopedCursor {
    check_id: String,
}

impl ScopedCursor {
    fn open(check_id: &str) -> Self {
        tracing::debug!(check_id, "opening graph cursor");
        Self {
            check_id: check_id.to_string(),
        }
    }
}

impl Drop for ScopedCursor {
    fn drop(&mut self) {
        tracing::debug!(check_id = %self.check_id, "closing graph cursor");
    }
}

fn accounts_in_term(path: &str, accounts: &[String]) -> Term {
    Term::predicate(
        path,
        PredicateOp::In,
        Value::List(accounts.iter().cloned().map(Value::Str).collect()),
    )
}

fn render_account_list(accounts: &[String]) -> String {
    format!(
        "[{}]",
        accounts.iter().map(|a| format!("{a:?}")).collect::<Vec<_>>().join(", ")
    )
}

/// Builds the detection query/command for `check` and streams back its
/// matching rows, grouped by `ancestors.account.reported.id`.
async fn evaluate_check_inner(
    graph: &dyn GraphDatabase,
    expander: &dyn TemplateExpander,
    cli: &dyn CliCommandEvaluator,
    check: &ReportCheck,
    env: &BTreeMap<String, String>,
    ctx: &CheckContext,
) -> Result<BTreeMap<String, Vec<ResourceProjection>>> {
    let _cursor = ScopedCursor::open(&check.id);

    let mut rows = match &check.detect {
        Detect::Manual => return Ok(BTreeMap::new()),
        Detect::Resoto(source) => {
            let mut query = expander.parse_query(source, Some("reported"), env).await?;
            if let Some(accounts) = &ctx.accounts {
                query = query.filter(accounts_in_term("ancestors.account.reported.id", accounts));
            }
            let search = graph.search_list(&query, MODEL, false).await?;
            search.rows
        }
        Detect::ResotoCmd(source) => {
            let command = match &ctx.accounts {
                Some(accounts) => format!(
                    "search /ancestors.account.reported.id in {} | {source}",
                    render_account_list(accounts)
                ),
                None => source.clone(),
            };
            cli.evaluate(&command).await?
        }
    };

    let mut by_account: BTreeMap<String, Vec<ResourceProjection>> = BTreeMap::new();
    while let Some(row) = rows.next().await {
        let row = row?;
        let projection = project_row(&row);
        let account = projection.account.clone().unwrap_or_default();
        by_account.entry(account).or_default().push(projection);
    }
    Ok(by_account)
}

/// Evaluates one check, demoting a [`InspectorError::demotes_to_empty_result`]
/// error to an empty map (logged at `warn!`) and propagating everything
/// else so the caller can abort the whole batch.
async fn evaluate_check(
    graph: &dyn GraphDatabase,
    expander: &dyn TemplateExpander,
    cli: &dyn CliCommandEvaluator,
    check: ReportCheck,
    env: BTreeMap<String, String>,
    ctx: CheckContext,
) -> Result<(String, BTreeMap<String, Vec<ResourceProjection>>)> {
    match evaluate_check_inner(graph, expander, cli, &check, &env, &ctx).await {
        Ok(by_account) => Ok((check.id, by_account)),
        Err(e) if e.demotes_to_empty_result() => {
            tracing::warn!(check_id = %check.id, error = %e, "check evaluation failed, demoting to empty result");
            Ok((check.id, BTreeMap::new()))
        }
        Err(e) => Err(e),
    }
}

/// Resolves `benchmark_names`, flattens to the set of distinct, non-ignored,
/// severity-eligible checks, and returns `(benchmarks, checks)`.
async fn resolve_benchmarks_and_checks(
    store: &dyn ConfigStore,
    benchmark_names: &[String],
    report_config: &ReportConfigRoot,
    ctx: &CheckContext,
) -> Result<(Vec<crate::check::model::Benchmark>, BTreeMap<String, ReportCheck>)> {
    let mut benchmarks = Vec::new();
    for name in benchmark_names {
        benchmarks.push(registry::resolve_benchmark(name, store).await?);
    }

    let mut check_ids: BTreeSet<String> = BTreeSet::new();
    for benchmark in &benchmarks {
        check_ids.extend(benchmark.nested_checks());
    }
    check_ids.retain(|id| !report_config.ignore_checks.contains(id));

    let mut checks = BTreeMap::new();
    for id in check_ids {
        let check = registry::resolve_check(&id, store).await?;
        if ctx.includes(check.severity) {
            checks.insert(id, check);
        }
    }
    Ok((benchmarks, checks))
}

/// Runs every eligible check concurrently, bounded at `ctx.parallel_checks`
/// in-flight evaluations, and folds the unordered completions into a flat
/// `check_id -> account -> projections` map. A non-demotable error from any
/// check aborts the whole batch; dropping the `FuturesUnordered` then
/// cancels every still-running evaluation.
async fn evaluate_all_checks(
    graph: &dyn GraphDatabase,
    expander: &dyn TemplateExpander,
    cli: &dyn CliCommandEvaluator,
    checks: &BTreeMap<String, ReportCheck>,
    report_config: &ReportConfigRoot,
    ctx: &CheckContext,
) -> Result<FailureMap> {
    let semaphore = Arc::new(Semaphore::new(ctx.parallel_checks.max(1)));
    let mut in_flight = FuturesUnordered::new();

    for check in checks.values() {
        let env = report_config.environment(check);
        let permit = semaphore.clone();
        let check = check.clone();
        let ctx = ctx.clone();
        in_flight.push(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore is never closed");
            evaluate_check(graph, expander, cli, check, env, ctx).await
        });
    }

    let mut failures: FailureMap = BTreeMap::new();
    while let Some(outcome) = in_flight.next().await {
        let (check_id, by_account) = outcome?;
        failures.insert(check_id, by_account);
    }
    Ok(failures)
}

/// Collects, per failing node, the set of `(benchmark_id, check_id,
/// severity)` findings, in preparation for a materialisation pass.
fn collect_security_updates(
    benchmarks: &[crate::check::model::Benchmark],
    checks: &BTreeMap<String, ReportCheck>,
    failures: &FailureMap,
) -> Vec<(String, Vec<SecurityIssue>)> {
    let mut by_node: BTreeMap<String, BTreeMap<String, SecurityIssue>> = BTreeMap::new();

    for benchmark in benchmarks {
        for check_id in benchmark.nested_checks() {
            let Some(check) = checks.get(&check_id) else { continue };
            let Some(by_account) = failures.get(&check_id) else { continue };
            for projections in by_account.values() {
                for projection in projections {
                    let issue = by_node
                        .entry(projection.node_id.clone())
                        .or_default()
                        .entry(check_id.clone())
                        .or_insert_with(|| SecurityIssue {
                            check: check_id.clone(),
                            severity: check.severity,
                            benchmarks: BTreeSet::new(),
                        });
                    issue.benchmarks.insert(benchmark.id.clone());
                }
            }
        }
    }

    by_node
        .into_iter()
        .map(|(node_id, issues)| (node_id, issues.into_values().collect()))
        .collect()
}

/// Evaluates `benchmark_names` from scratch. If `sync_security_section` is
/// set, writes the materialised findings back to the graph under
/// `run_id` (defaulting to a fresh uuid).
pub async fn perform_benchmarks(
    graph: &dyn GraphDatabase,
    store: &dyn ConfigStore,
    expander: &dyn TemplateExpander,
    cli: &dyn CliCommandEvaluator,
    benchmark_names: &[String],
    report_config: &ReportConfigRoot,
    ctx: CheckContext,
    sync_security_section: bool,
    report_run_id: Option<String>,
) -> Result<Vec<BenchmarkResult>> {
    let (benchmarks, checks) = resolve_benchmarks_and_checks(store, benchmark_names, report_config, &ctx).await?;
    let failures = evaluate_all_checks(graph, expander, cli, &checks, report_config, &ctx).await?;

    if sync_security_section {
        let run_id = report_run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let updates = collect_security_updates(&benchmarks, &checks, &failures);
        graph
            .update_security_section(&run_id, updates, MODEL, ctx.accounts.as_deref())
            .await?;
    }

    Ok(benchmarks
        .iter()
        .map(|b| crate::result::filter_result(build_benchmark_result(b, &checks, &failures), ctx.only_failed))
        .collect())
}

/// Rebuilds the result tree for `benchmark_names` directly from previously
/// materialised `security` sections, without re-running any detection.
pub async fn load_benchmarks(
    graph: &dyn GraphDatabase,
    store: &dyn ConfigStore,
    benchmark_names: &[String],
    report_config: &ReportConfigRoot,
    ctx: CheckContext,
) -> Result<Vec<BenchmarkResult>> {
    let (benchmarks, checks) = resolve_benchmarks_and_checks(store, benchmark_names, report_config, &ctx).await?;
    let names: BTreeSet<String> = benchmarks.iter().map(|b| b.id.clone()).collect();

    let mut query = Query::all().filter(Term::predicate("security.has_issues", PredicateOp::Eq, Value::Bool(true)));
    if let Some(accounts) = &ctx.accounts {
        query = query.filter(accounts_in_term("ancestors.account.reported.id", accounts));
    }

    let mut search = graph.search_list(&query, MODEL, false).await?;
    let mut failures: FailureMap = BTreeMap::new();
    while let Some(row) = search.rows.next().await {
        let row = row?;
        let projection = project_row(&row);
        for (check_id, severity_included) in matching_issue_checks(&row, &names, ctx.severity) {
            if !checks.contains_key(&check_id) || !severity_included {
                continue;
            }
            let account = projection.account.clone().unwrap_or_default();
            failures
                .entry(check_id)
                .or_default()
                .entry(account)
                .or_default()
                .push(projection.clone());
        }
    }

    Ok(benchmarks
        .iter()
        .map(|b| crate::result::filter_result(build_benchmark_result(b, &checks, &failures), ctx.only_failed))
        .collect())
}

/// For a materialised row, every `(check_id, severity_meets_threshold)` pair
/// among its `security.issues` whose `benchmarks` intersects `names`.
fn matching_issue_checks(row: &Row, names: &BTreeSet<String>, threshold: Option<Severity>) -> Vec<(String, bool)> {
    let Some(issues) = row.get("security").and_then(|s| s.get("issues")).and_then(|i| i.as_array()) else {
        return Vec::new();
    };
    issues
        .iter()
        .filter_map(|issue| {
            let issue: SecurityIssue = serde_json::from_value(issue.clone()).ok()?;
            if issue.benchmarks.iter().any(|b| names.contains(b)) {
                let ok = threshold.is_none_or(|t| Severity::includes_severity(t, issue.severity));
                Some((issue.check, ok))
            } else {
                None
            }
        })
        .collect()
}

/// Evaluates a single check's detection and returns the raw row stream
/// (no projection), per the "list failing resources" operation.
pub async fn list_failing_resources(
    graph: &dyn GraphDatabase,
    store: &dyn ConfigStore,
    expander: &dyn TemplateExpander,
    cli: &dyn CliCommandEvaluator,
    check_id: &str,
    ctx: CheckContext,
) -> Result<Vec<Row>> {
    let check = registry::resolve_check(check_id, store).await?;
    let env = check.default_values.clone();
    let _cursor = ScopedCursor::open(check_id);

    let mut rows = match &check.detect {
        Detect::Manual => return Ok(Vec::new()),
        Detect::Resoto(source) => {
            let mut query = expander.parse_query(source, Some("reported"), &env).await?;
            if let Some(accounts) = &ctx.accounts {
                query = query.filter(accounts_in_term("ancestors.account.reported.id", accounts));
            }
            graph.search_list(&query, MODEL, false).await?.rows
        }
        Detect::ResotoCmd(source) => {
            let command = match &ctx.accounts {
                Some(accounts) => format!(
                    "search /ancestors.account.reported.id in {} | {source}",
                    render_account_list(accounts)
                ),
                None => source.clone(),
            };
            cli.evaluate(&command).await?
        }
    };

    let mut out = Vec::new();
    while let Some(row) = rows.next().await {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::model::{Benchmark, CheckCollection, Remediation};
    use crate::config_store::InMemoryConfigStore;
    use crate::graph::demo::{DemoGraph, Node};
    use async_trait::async_trait;
    use futures_util::stream;
    use serde_json::json;

    struct FixedExpander;

    #[async_trait]
    impl TemplateExpander for FixedExpander {
        async fn parse_query(&self, source: &str, _on_section: Option<&str>, _env: &BTreeMap<String, String>) -> Result<Query> {
            // The demo harness only ever detects via `is(kind)`.
            let kind = source.trim_start_matches("is(").trim_end_matches(')');
            Ok(Query::by(kind)?)
        }
    }

    struct NoCli;

    #[async_trait]
    impl CliCommandEvaluator for NoCli {
        async fn evaluate(&self, _command: &str) -> Result<futures_util::stream::BoxStream<'static, Result<Row>>> {
            Ok(Box::pin(stream::iter(Vec::<Result<Row>>::new())))
        }
    }

    fn test_benchmark() -> Benchmark {
        Benchmark {
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
        }
    }

    fn test_check(id: &str) -> ReportCheck {
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
            detect: Detect::Resoto("is(aws_instance)".into()),
            default_values: Default::default(),
        }
    }

    async fn seeded_store_and_graph() -> (InMemoryConfigStore, DemoGraph) {
        let store = InMemoryConfigStore::new();
        store
            .update("benchmarks.test", serde_json::to_value(test_benchmark()).unwrap())
            .await
            .unwrap();
        store
            .update("checks.check_a", serde_json::to_value(test_check("check_a")).unwrap())
            .await
            .unwrap();
        store
            .update("checks.check_b", serde_json::to_value(test_check("check_b")).unwrap())
            .await
            .unwrap();

        let graph = DemoGraph::new();
        graph.add_node(Node {
            id: "sub_root".into(),
            kind: "account".into(),
            doc: json!({"reported": {"id": "sub_root", "name": "sub_root"}}),
        });
        for i in 0..10 {
            let id = format!("i-{i}");
            graph.add_node(Node {
                id: id.clone(),
                kind: "aws_instance".into(),
                doc: json!({"reported": {"id": id, "name": id}}),
            });
            graph.add_edge("sub_root", id);
        }
        (store, graph)
    }

    #[tokio::test]
    async fn test_s4_perform_benchmarks_materialises_and_reloads() {
        let (store, graph) = seeded_store_and_graph().await;
        let report_config = ReportConfigRoot::default();

        let results = perform_benchmarks(
            &graph,
            &store,
            &FixedExpander,
            &NoCli,
            &["test".to_string()],
            &report_config,
            CheckContext::default(),
            true,
            Some("run-1".into()),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 1);
        let (passing, failing) = crate::result::passing_failing_checks_for_account(&results[0], "sub_root");
        assert_eq!(passing.len(), 0);
        assert_eq!(failing.len(), 2);

        let (passing_unknown, failing_unknown) = crate::result::passing_failing_checks_for_account(&results[0], "n/a");
        assert_eq!(passing_unknown.len(), 2);
        assert_eq!(failing_unknown.len(), 0);

        let loaded = load_benchmarks(&graph, &store, &["test".to_string()], &report_config, CheckContext::default())
            .await
            .unwrap();
        let (loaded_passing, loaded_failing) = crate::result::passing_failing_checks_for_account(&loaded[0], "sub_root");
        assert_eq!(loaded_passing.len(), 0);
        assert_eq!(loaded_failing.len(), 2);
    }

    #[tokio::test]
    async fn test_s5_list_failing_resources() {
        let (store, graph) = seeded_store_and_graph().await;
        let ctx = CheckContext::default();
        let rows = list_failing_resources(&graph, &store, &FixedExpander, &NoCli, "check_a", ctx.clone())
            .await
            .unwrap();
        assert_eq!(rows.len(), 10);

        let scoped_ctx = CheckContext {
            accounts: Some(vec!["n/a".to_string()]),
            ..ctx
        };
        let rows = list_failing_resources(&graph, &store, &FixedExpander, &NoCli, "check_a", scoped_ctx)
            .await
            .unwrap();
        assert_eq!(rows.len(), 0);
    }

    #[tokio::test]
    async fn test_s6_deleting_predefined_benchmark_is_denied() {
        let store = InMemoryConfigStore::new();
        let result = registry::delete_benchmark("aws-foundations", &store).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_s6_deleting_user_benchmark_removes_it() {
        let (store, _graph) = seeded_store_and_graph().await;
        registry::delete_benchmark("test", &store).await.unwrap();
        let listed = store.list("benchmarks.").await.unwrap();
        assert!(!listed.contains(&"benchmarks.test".to_string()));
    }
}
