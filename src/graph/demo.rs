//! An in-memory [`GraphDatabase`] backed by a flat `Vec<Node>` with simple
//! linear-scan predicate evaluation and an explicit ancestor/descendant
//! edge table. A test/demo fixture, not a product backend — exercises the
//! full `perform_benchmarks` round trip without a real graph database.

use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;
use serde_json::{json, Value as Json};

use crate::error::{InspectorError, Result};
use crate::graph::{GraphDatabase, Row, SearchResult, SecurityIssue};
use crate::query::navigation::{Direction, Navigation};
use crate::query::part::Part;
use crate::query::query::Query;
use crate::query::term::{CombineOp, PredicateOp, Term, Value};

/// A single graph node: an id, a kind, and a JSON document holding its
/// sections (`reported`, `security`, ...).
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub kind: String,
    pub doc: Json,
}

/// A directed parent→child edge (`parent` is the ancestor of `child`).
#[derive(Debug, Clone)]
pub struct Edge {
    pub parent: String,
    pub child: String,
}

/// The in-memory demo backend. Interior mutability (a `Mutex`) because
/// `GraphDatabase` methods take `&self` — the scheduler holds one shared
/// handle across all concurrently-evaluating checks.
#[derive(Debug, Default)]
pub struct DemoGraph {
    state: Mutex<DemoGraphState>,
}

#[derive(Debug, Default)]
struct DemoGraphState {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl DemoGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, node: Node) {
        self.state.lock().unwrap().nodes.push(node);
    }

    pub fn add_edge(&self, parent: impl Into<String>, child: impl Into<String>) {
        self.state.lock().unwrap().edges.push(Edge {
            parent: parent.into(),
            child: child.into(),
        });
    }

    fn ancestors_of<'a>(state: &'a DemoGraphState, node_id: &str) -> Vec<&'a Node> {
        state
            .edges
            .iter()
            .filter(|e| e.child == node_id)
            .filter_map(|e| state.nodes.iter().find(|n| n.id == e.parent))
            .collect()
    }

    fn descendants_of<'a>(state: &'a DemoGraphState, node_id: &str) -> Vec<&'a Node> {
        state
            .edges
            .iter()
            .filter(|e| e.parent == node_id)
            .filter_map(|e| state.nodes.iter().find(|n| n.id == e.child))
            .collect()
    }

    /// Nodes reachable from `node_id` within `[nav.start, nav.until]` hops
    /// (inclusive), following the direction `nav` specifies. `until ==
    /// NAV_MAX` is capped to a sane BFS depth.
    fn traverse<'a>(state: &'a DemoGraphState, node_id: &str, nav: &Navigation) -> Vec<&'a Node> {
        const MAX_DEPTH: u32 = 64;
        let until = nav.until.min(MAX_DEPTH);
        let mut frontier = vec![node_id.to_string()];
        let mut reached = Vec::new();
        for hop in 1..=until {
            let mut next = Vec::new();
            for id in &frontier {
                let neighbours: Vec<&Node> = match nav.direction {
                    Direction::Outbound => Self::descendants_of(state, id),
                    Direction::Inbound => Self::ancestors_of(state, id),
                    Direction::Any => {
                        let mut both = Self::descendants_of(state, id);
                        both.extend(Self::ancestors_of(state, id));
                        both
                    }
                };
                for n in neighbours {
                    if hop >= nav.start {
                        reached.push(n.id.clone());
                    }
                    next.push(n.id.clone());
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        reached
            .into_iter()
            .filter_map(|id| state.nodes.iter().find(|n| n.id == id))
            .collect()
    }

    /// Materialises `{kind: {reported: {...}}}` for every ancestor of
    /// `node_id`, the shape the resource projection and ancestor-predicate
    /// rewrite both expect a row's `ancestors` section to have. Later
    /// ancestors of the same kind overwrite earlier ones.
    fn ancestors_section(state: &DemoGraphState, node_id: &str) -> Json {
        let mut by_kind = serde_json::Map::new();
        for ancestor in Self::ancestors_of(state, node_id) {
            let reported = ancestor.doc.get("reported").cloned().unwrap_or(Json::Null);
            by_kind.insert(ancestor.kind.clone(), json!({ "reported": reported }));
        }
        Json::Object(by_kind)
    }

    fn matches<'a>(state: &'a DemoGraphState, query: &Query) -> Vec<&'a Node> {
        let mut current: Vec<&Node> = state.nodes.iter().collect();
        for part in query.parts.iter().rev() {
            current.retain(|n| Self::eval_term(state, &part.term, n));
            if let Some(nav) = &part.navigation {
                let mut next = Vec::new();
                for n in &current {
                    next.extend(Self::traverse(state, &n.id, nav));
                }
                next.sort_by(|a, b| a.id.cmp(&b.id));
                next.dedup_by(|a, b| a.id == b.id);
                current = next;
            }
        }
        current
    }

    fn eval_term(state: &DemoGraphState, term: &Term, node: &Node) -> bool {
        match term {
            Term::AllTerm => true,
            Term::NotTerm(inner) => !Self::eval_term(state, inner, node),
            Term::IsTerm(kinds) => kinds.contains(&node.kind),
            Term::IdTerm(id) => &node.id == id,
            Term::FunctionTerm { .. } => true,
            Term::CombinedTerm { left, op, right } => match op {
                CombineOp::And => Self::eval_term(state, left, node) && Self::eval_term(state, right, node),
                CombineOp::Or => Self::eval_term(state, left, node) || Self::eval_term(state, right, node),
            },
            Term::MergeTerm {
                pre_filter,
                post_filter,
                ..
            } => {
                Self::eval_term(state, pre_filter, node)
                    && post_filter
                        .as_ref()
                        .is_none_or(|pf| Self::eval_term(state, pf, node))
            }
            Term::Predicate {
                name, op, value, array_filter, ..
            } => {
                if let Some(kind_result) = term.ancestor_descendant_kind() {
                    let Ok((is_ancestor, kind)) = kind_result else {
                        return false;
                    };
                    let related = if is_ancestor {
                        Self::ancestors_of(state, &node.id)
                    } else {
                        Self::descendants_of(state, &node.id)
                    };
                    let rest = name.splitn(3, '.').nth(2).unwrap_or("");
                    return related
                        .iter()
                        .filter(|n| n.kind == kind)
                        .any(|n| eval_predicate_leaf(&n.doc, rest, *op, value, *array_filter));
                }
                eval_predicate_leaf(&node.doc, name, *op, value, *array_filter)
            }
        }
    }
}

fn get_path<'a>(doc: &'a Json, path: &str) -> Option<&'a Json> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn compare(op: PredicateOp, actual: &Json, expected: &Value) -> bool {
    let actual_value = crate::query::parse::json_to_value(actual);
    match op {
        PredicateOp::Eq => actual_value == *expected,
        PredicateOp::Ne => actual_value != *expected,
        PredicateOp::Lt => actual_value < *expected,
        PredicateOp::Lte => actual_value <= *expected,
        PredicateOp::Gt => actual_value > *expected,
        PredicateOp::Gte => actual_value >= *expected,
        PredicateOp::In => matches!(expected, Value::List(items) if items.contains(&actual_value)),
        PredicateOp::NotIn => !matches!(expected, Value::List(items) if items.contains(&actual_value)),
        PredicateOp::Regex | PredicateOp::NotRegex => {
            let is_match = match (&actual_value, expected) {
                (Value::Str(s), Value::Str(pat)) => s.contains(pat.trim_start_matches('^').trim_end_matches('$')),
                _ => false,
            };
            if op == PredicateOp::Regex {
                is_match
            } else {
                !is_match
            }
        }
    }
}

fn eval_predicate_leaf(
    doc: &Json,
    path: &str,
    op: PredicateOp,
    expected: &Value,
    array_filter: Option<crate::query::term::ArrayFilter>,
) -> bool {
    use crate::query::term::ArrayFilter;

    let Some(actual) = get_path(doc, path) else {
        return matches!(expected, Value::Null) && op == PredicateOp::Eq;
    };

    if let (Some(filter), Json::Array(items)) = (array_filter, actual) {
        let results = items.iter().map(|item| compare(op, item, expected));
        return match filter {
            ArrayFilter::Any => results.into_iter().any(|r| r),
            ArrayFilter::All => !items.is_empty() && results.into_iter().all(|r| r),
            ArrayFilter::None => results.into_iter().all(|r| !r),
        };
    }

    compare(op, actual, expected)
}

#[async_trait]
impl GraphDatabase for DemoGraph {
    async fn search_list(&self, query: &Query, _model: &str, with_count: bool) -> Result<SearchResult> {
        tracing::debug!(query = %query, "opening demo-graph cursor");
        let state = self.state.lock().unwrap();
        let matched = Self::matches(&state, query);
        let total = if with_count { Some(matched.len() as u64) } else { None };
        let rows: Vec<Result<Row>> = matched
            .into_iter()
            .map(|n| {
                let mut row = n.doc.clone();
                if let Json::Object(obj) = &mut row {
                    obj.insert("id".to_string(), json!(n.id));
                    obj.insert("ancestors".to_string(), Self::ancestors_section(&state, &n.id));
                }
                Ok(row)
            })
            .collect();
        tracing::debug!(rows = rows.len(), "closing demo-graph cursor");
        Ok(SearchResult {
            rows: Box::pin(stream::iter(rows)),
            total,
        })
    }

    async fn update_security_section(
        &self,
        run_id: &str,
        updates: Vec<(String, Vec<SecurityIssue>)>,
        _model: &str,
        accounts: Option<&[String]>,
    ) -> Result<()> {
        tracing::debug!(run_id, updates = updates.len(), "writing security section");
        let mut state = self.state.lock().unwrap();
        for (node_id, issues) in updates {
            if let Some(accounts) = accounts {
                let owning_account = Self::ancestors_of(&state, &node_id)
                    .into_iter()
                    .find(|n| n.kind == "account")
                    .map(|n| n.id.clone());
                if owning_account.is_none_or(|acc| !accounts.contains(&acc)) {
                    continue;
                }
            }
            let Some(node) = state.nodes.iter_mut().find(|n| n.id == node_id) else {
                return Err(InspectorError::GraphCursor(format!("no such node {node_id:?}")));
            };
            let Json::Object(obj) = &mut node.doc else {
                return Err(InspectorError::Internal("node document is not an object".into()));
            };
            obj.insert(
                "security".to_string(),
                json!({
                    "has_issues": !issues.is_empty(),
                    "issues": issues,
                    "run_id": run_id,
                }),
            );
        }
        Ok(())
    }
}

/// Convenience: `is(kind) <-[0:Max]- all` / `is(kind) -[0:Max]-> all`, the
/// shape the ancestor/descendant rewriter synthesises.
pub fn nearest_of_kind(kind: impl Into<String>, direction: Direction) -> Result<Query> {
    let nav = Navigation::new(0, crate::query::navigation::NAV_MAX, crate::query::navigation::EdgeType::Default, direction);
    Ok(Query {
        parts: vec![Part::new(Term::AllTerm), Part::new(Term::is_term([kind.into()])?).with_navigation(nav)],
        preamble: Default::default(),
        aggregate: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::term::{PredicateOp, Value};

    fn sample_graph() -> DemoGraph {
        let graph = DemoGraph::new();
        graph.add_node(Node {
            id: "acct-1".into(),
            kind: "account".into(),
            doc: json!({"reported": {"id": "acct-1", "name": "prod"}}),
        });
        graph.add_node(Node {
            id: "i-1".into(),
            kind: "aws_instance".into(),
            doc: json!({"reported": {"id": "i-1", "name": "web-1", "public_ip_address": "1.2.3.4"}}),
        });
        graph.add_node(Node {
            id: "i-2".into(),
            kind: "aws_instance".into(),
            doc: json!({"reported": {"id": "i-2", "name": "web-2", "public_ip_address": null}}),
        });
        graph.add_edge("acct-1", "i-1");
        graph.add_edge("acct-1", "i-2");
        graph
    }

    #[tokio::test]
    async fn test_simple_kind_filter() {
        let graph = sample_graph();
        let query = Query::by("aws_instance").unwrap();
        let result = graph.search_list(&query, "model", false).await.unwrap();
        let rows: Vec<_> = futures_util::StreamExt::collect::<Vec<_>>(result.rows).await;
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_predicate_filter() {
        let graph = sample_graph();
        let query = Query::by("aws_instance")
            .unwrap()
            .filter(Term::predicate("reported.public_ip_address", PredicateOp::Ne, Value::Null));
        let result = graph.search_list(&query, "model", true).await.unwrap();
        assert_eq!(result.total, Some(1));
    }

    #[tokio::test]
    async fn test_ancestor_predicate() {
        let graph = sample_graph();
        let query = Query::by("aws_instance").unwrap().filter(Term::predicate(
            "ancestors.account.reported.name",
            PredicateOp::Eq,
            Value::Str("prod".into()),
        ));
        let result = graph.search_list(&query, "model", true).await.unwrap();
        assert_eq!(result.total, Some(2));
    }

    #[tokio::test]
    async fn test_update_security_section_then_load() {
        let graph = sample_graph();
        graph
            .update_security_section(
                "run-1",
                vec![(
                    "i-1".into(),
                    vec![SecurityIssue {
                        check: "aws_ec2_public_ip".into(),
                        severity: crate::check::model::Severity::High,
                        benchmarks: ["aws-foundations".to_string()].into_iter().collect(),
                    }],
                )],
                "model",
                None,
            )
            .await
            .unwrap();

        let query = Query::by("aws_instance")
            .unwrap()
            .filter(Term::predicate("security.has_issues", PredicateOp::Eq, Value::Bool(true)));
        let result = graph.search_list(&query, "model", true).await.unwrap();
        assert_eq!(result.total, Some(1));
    }

    #[tokio::test]
    async fn test_account_scoping_on_materialisation() {
        let graph = sample_graph();
        graph
            .update_security_section(
                "run-1",
                vec![("i-1".into(), vec![])],
                "model",
                Some(&["acct-other".to_string()]),
            )
            .await
            .unwrap();
        let state = graph.state.lock().unwrap();
        let node = state.nodes.iter().find(|n| n.id == "i-1").unwrap();
        assert!(get_path(&node.doc, "security").is_none());
    }
}
