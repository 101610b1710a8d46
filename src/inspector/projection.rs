//! The fixed resource-data extractor applied to every row a check's
//! detection query returns.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::graph::Row;

/// One resource, projected to the fixed fields downstream consumers
/// (result assembly, the `security` write-back) actually need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceProjection {
    pub node_id: String,
    pub id: String,
    pub name: String,
    pub kind: String,
    pub tags: Json,
    pub ctime: Option<String>,
    pub atime: Option<String>,
    pub mtime: Option<String>,
    pub cloud: Option<String>,
    pub account: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
}

fn str_at(row: &Row, path: &[&str]) -> Option<String> {
    let mut current = row;
    for segment in path {
        current = current.as_object()?.get(*segment)?;
    }
    current.as_str().map(str::to_string)
}

fn ancestor_name(row: &Row, kind: &str) -> Option<String> {
    str_at(row, &["ancestors", kind, "reported", "name"])
}

/// Projects a single row per the fixed bender: `node_id <- id`,
/// `id/name/kind/tags/ctime/atime/mtime <- reported.*`,
/// `cloud/account/region/zone <- ancestors.<kind>.reported.name`.
pub fn project_row(row: &Row) -> ResourceProjection {
    ResourceProjection {
        node_id: str_at(row, &["id"]).unwrap_or_default(),
        id: str_at(row, &["reported", "id"]).unwrap_or_default(),
        name: str_at(row, &["reported", "name"]).unwrap_or_default(),
        kind: str_at(row, &["reported", "kind"]).unwrap_or_default(),
        tags: row
            .as_object()
            .and_then(|o| o.get("reported"))
            .and_then(|r| r.get("tags"))
            .cloned()
            .unwrap_or(Json::Null),
        ctime: str_at(row, &["reported", "ctime"]),
        atime: str_at(row, &["reported", "atime"]),
        mtime: str_at(row, &["reported", "mtime"]),
        cloud: ancestor_name(row, "cloud"),
        account: ancestor_name(row, "account"),
        region: ancestor_name(row, "region"),
        zone: ancestor_name(row, "zone"),
    }
}
