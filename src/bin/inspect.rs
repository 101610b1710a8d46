//! CLI front-end for the inspector: seeds an in-memory demo graph, then
//! runs benchmark evaluation, cached-result loading, or single-check
//! resource listing against it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;

use cloudsec_inspector::check::ReportConfigRoot;
use cloudsec_inspector::cli_eval::EmptyCliCommandEvaluator;
use cloudsec_inspector::config::InspectorConfig;
use cloudsec_inspector::config_store::InMemoryConfigStore;
use cloudsec_inspector::graph::demo::{DemoGraph, Node};
use cloudsec_inspector::inspector::{list_failing_resources, load_benchmarks, perform_benchmarks, CheckContext};
use cloudsec_inspector::template::DemoTemplateExpander;

#[derive(Parser)]
#[command(name = "inspect", about = "Cloud security posture inspector")]
struct Cli {
    /// Path to an optional `inspector.toml`.
    #[arg(long, default_value = "inspector.toml")]
    config: PathBuf,

    /// Restrict evaluation to these account ids.
    #[arg(long)]
    account: Vec<String>,

    /// Minimum severity to report (info, low, medium, high, critical).
    #[arg(long)]
    severity: Option<String>,

    /// Only print checks/collections with at least one failing resource.
    #[arg(long)]
    only_failed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run detections now and print the benchmark result tree.
    Perform {
        benchmarks: Vec<String>,
        /// Write findings back onto the graph's `security` section.
        #[arg(long)]
        sync_security_section: bool,
    },
    /// Reconstruct results from previously materialised `security` sections.
    Load { benchmarks: Vec<String> },
    /// List the raw resources a single check currently matches.
    ListFailing { check_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = InspectorConfig::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .init();

    let severity = match &cli.severity {
        Some(s) => Some(parse_severity(s)?),
        None => config.default_severity,
    };

    let graph = seed_demo_graph();
    let store = InMemoryConfigStore::new();
    let expander = DemoTemplateExpander;
    let cli_evaluator = EmptyCliCommandEvaluator;
    let report_config = ReportConfigRoot::default();

    let ctx = CheckContext {
        accounts: if cli.account.is_empty() { None } else { Some(cli.account.clone()) },
        severity,
        only_failed: cli.only_failed,
        parallel_checks: config.parallel_checks,
    };

    match cli.command {
        Command::Perform {
            benchmarks,
            sync_security_section,
        } => {
            let results = perform_benchmarks(
                &graph,
                &store,
                &expander,
                &cli_evaluator,
                &benchmarks,
                &report_config,
                ctx,
                sync_security_section,
                None,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Load { benchmarks } => {
            let results = load_benchmarks(&graph, &store, &benchmarks, &report_config, ctx).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::ListFailing { check_id } => {
            let rows = list_failing_resources(&graph, &store, &expander, &cli_evaluator, &check_id, ctx).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}

fn parse_severity(s: &str) -> cloudsec_inspector::error::Result<cloudsec_inspector::check::Severity> {
    use cloudsec_inspector::check::Severity::*;
    use cloudsec_inspector::error::InspectorError;
    Ok(match s.to_ascii_lowercase().as_str() {
        "info" => Info,
        "low" => Low,
        "medium" => Medium,
        "high" => High,
        "critical" => Critical,
        other => return Err(InspectorError::QueryParse(format!("unknown severity {other:?}"))),
    })
}

/// One account with a handful of EC2 instances, half of them publicly
/// reachable, enough to exercise the bundled `aws_ec2_public_ip` check.
fn seed_demo_graph() -> DemoGraph {
    let graph = DemoGraph::new();
    graph.add_node(Node {
        id: "account-1".into(),
        kind: "account".into(),
        doc: json!({ "reported": { "id": "account-1", "name": "prod" } }),
    });
    for i in 0..6 {
        let id = format!("i-{i:04}");
        let public_ip = if i % 2 == 0 { json!(format!("203.0.113.{i}")) } else { json!(null) };
        graph.add_node(Node {
            id: id.clone(),
            kind: "aws_instance".into(),
            doc: json!({
                "reported": {
                    "id": id.clone(),
                    "name": format!("web-{i}"),
                    "public_ip_address": public_ip,
                }
            }),
        });
        graph.add_edge("account-1", id);
    }
    graph
}
