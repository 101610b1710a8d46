//! Concrete scenario tests (S1, S5, S6) exercised through the crate's
//! public API rather than inline unit tests — S4 (the full
//! `perform_benchmarks`/`load_benchmarks` round trip) lives next to the
//! scheduler it tests; these cover the surrounding surface.

use std::collections::BTreeMap;

use cloudsec_inspector::check::registry::{delete_benchmark, resolve_benchmark, update_benchmark};
use cloudsec_inspector::check::{Benchmark, CheckCollection};
use cloudsec_inspector::cli_eval::EmptyCliCommandEvaluator;
use cloudsec_inspector::config_store::{ConfigStore, InMemoryConfigStore};
use cloudsec_inspector::error::InspectorError;
use cloudsec_inspector::graph::demo::{DemoGraph, Node};
use cloudsec_inspector::inspector::{list_failing_resources, CheckContext};
use cloudsec_inspector::query::{PredicateOp, Term, Value};
use cloudsec_inspector::template::{DemoTemplateExpander, TemplateExpander};

/// S1: `P("a") > 1 & P("b") == "x"` renders `(a > 1 and b == "x")`.
#[test]
fn s1_combined_predicate_renders_expected_text() {
    let term = Term::predicate("a", PredicateOp::Gt, Value::Number(1.0)).and(Term::predicate(
        "b",
        PredicateOp::Eq,
        Value::Str("x".to_string()),
    ));
    assert_eq!(term.to_string(), "(a > 1 and b == \"x\")");
}

#[tokio::test]
async fn demo_template_expander_parses_check_detection_string() {
    let expander = DemoTemplateExpander;
    let query = expander
        .parse_query("is(aws_instance) and reported.public_ip_address != null", None, &BTreeMap::new())
        .await
        .unwrap();
    assert!(query.to_string().contains("is(aws_instance)"));
    assert!(query.to_string().contains("reported.public_ip_address"));
}

fn seeded_graph() -> DemoGraph {
    let graph = DemoGraph::new();
    graph.add_node(Node {
        id: "root".into(),
        kind: "account".into(),
        doc: serde_json::json!({ "reported": { "id": "root" } }),
    });
    for i in 0..10 {
        let id = format!("r{i}");
        graph.add_node(Node {
            id: id.clone(),
            kind: "aws_instance".into(),
            doc: serde_json::json!({ "reported": { "id": id, "public_ip_address": "1.2.3.4" } }),
        });
        graph.add_edge("root", id);
    }
    graph
}

/// S5: a check matching all 10 seeded resources returns 10 rows unscoped,
/// and 0 rows once scoped to an account that owns none of them.
#[tokio::test]
async fn s5_list_failing_resources_respects_account_scope() {
    let graph = seeded_graph();
    let store = InMemoryConfigStore::new();
    let expander = DemoTemplateExpander;
    let cli = EmptyCliCommandEvaluator;

    store
        .update(
            "checks.open_instance",
            serde_json::json!({
                "id": "open_instance",
                "provider": "aws",
                "service": "ec2",
                "categories": [],
                "result_kinds": ["aws_instance"],
                "severity": "high",
                "risk": "exposed",
                "remediation": { "text": "fix", "url": "https://example.com" },
                "detect": { "Resoto": "is(aws_instance)" },
                "default_values": {},
            }),
        )
        .await
        .unwrap();

    let rows = list_failing_resources(&graph, &store, &expander, &cli, "open_instance", CheckContext::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 10);

    let scoped_ctx = CheckContext {
        accounts: Some(vec!["n/a".to_string()]),
        ..CheckContext::default()
    };
    let rows = list_failing_resources(&graph, &store, &expander, &cli, "open_instance", scoped_ctx)
        .await
        .unwrap();
    assert_eq!(rows.len(), 0);
}

fn user_benchmark() -> Benchmark {
    Benchmark {
        id: "custom".into(),
        framework: "custom".into(),
        version: "1.0".into(),
        clouds: vec!["aws".into()],
        collection: CheckCollection {
            title: "Custom".into(),
            description: String::new(),
            documentation: None,
            checks: vec![],
            children: vec![],
        },
    }
}

/// S6: a predefined benchmark cannot be deleted or updated; a user-defined
/// one can be stored and then removed.
#[tokio::test]
async fn s6_predefined_benchmark_is_immutable_user_benchmark_is_not() {
    let store = InMemoryConfigStore::new();

    let denied = delete_benchmark("aws-foundations", &store).await;
    assert!(matches!(denied, Err(InspectorError::PredefinedImmutable(_))));

    let mut predefined = resolve_benchmark("aws-foundations", &store).await.unwrap();
    predefined.version = "99.0".into();
    let denied = update_benchmark("aws-foundations", &predefined, &store).await;
    assert!(matches!(denied, Err(InspectorError::PredefinedImmutable(_))));

    update_benchmark("custom", &user_benchmark(), &store).await.unwrap();
    assert!(resolve_benchmark("custom", &store).await.is_ok());
    delete_benchmark("custom", &store).await.unwrap();
    assert!(resolve_benchmark("custom", &store).await.is_err());
}
