//! The consumed graph-database contract: a streaming search over the
//! property graph, and the atomic write-back of materialised security
//! findings.

pub mod demo;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::check::model::Severity;
use crate::error::Result;
use crate::query::query::Query;

/// One resource document streamed back from a search: the full per-node
/// JSON record (`id`, `reported`, `ancestors`, `security`, ...).
pub type Row = serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub check: String,
    pub severity: Severity,
    pub benchmarks: std::collections::BTreeSet<String>,
}

/// The outcome of a [`GraphDatabase::search_list`] call: a row stream plus,
/// when requested, an approximate total independent of how many rows are
/// actually consumed.
pub struct SearchResult {
    pub rows: BoxStream<'static, Result<Row>>,
    pub total: Option<u64>,
}

/// Consumed contract for the graph-database handle. The query engine and
/// inspector scheduler depend only on this trait — never on a concrete
/// backend — so that [`demo::DemoGraph`] and a real store are
/// interchangeable.
#[async_trait]
pub trait GraphDatabase: Send + Sync {
    async fn search_list(&self, query: &Query, model: &str, with_count: bool) -> Result<SearchResult>;

    async fn update_security_section(
        &self,
        run_id: &str,
        updates: Vec<(String, Vec<SecurityIssue>)>,
        model: &str,
        accounts: Option<&[String]>,
    ) -> Result<()>;
}
