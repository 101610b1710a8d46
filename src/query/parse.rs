//! Construction of a [`Term`] from a neutral tagged-record JSON form — the
//! "reviver" mentioned in the module docs: it inspects discriminating
//! fields, in priority order, to pick a variant, and fails with a
//! structured parse error on an unrecognised shape.

use std::collections::BTreeMap;

use serde_json::{json, Value as Json};

use crate::error::{InspectorError, Result};
use crate::query::term::{ArrayFilter, CombineOp, MergeQuery, PredicateArgs, PredicateOp, Term, Value};

/// Renders `term` as a tagged JSON record — the inverse of [`term_from_record`].
pub fn term_to_record(term: &Term) -> Json {
    match term {
        Term::AllTerm => json!({}),
        Term::NotTerm(inner) => json!({ "not": term_to_record(inner) }),
        Term::Predicate {
            name,
            op,
            value,
            args,
            array_filter,
        } => {
            let mut record = json!({
                "name": name,
                "op": op.as_str(),
                "value": value_to_json(value),
            });
            if !args.is_empty() {
                record["args"] = json!(args);
            }
            if let Some(af) = array_filter {
                record["array_filter"] = json!(array_filter_str(*af));
            }
            record
        }
        Term::IsTerm(kinds) => json!({ "kind": kinds }),
        Term::IdTerm(id) => json!({ "id": id }),
        Term::FunctionTerm {
            function,
            property_path,
            args,
        } => json!({
            "fn": function,
            "property_path": property_path,
            "args": args.iter().map(value_to_json).collect::<Vec<_>>(),
        }),
        Term::CombinedTerm { left, op, right } => json!({
            "left": term_to_record(left),
            "op": match op { CombineOp::And => "and", CombineOp::Or => "or" },
            "right": term_to_record(right),
        }),
        Term::MergeTerm {
            pre_filter,
            merge,
            post_filter,
        } => {
            let mut record = json!({
                "pre_filter": term_to_record(pre_filter),
                "merge": merge.iter().map(|mq| json!({
                    "name": mq.name,
                    "only_first": mq.only_first,
                })).collect::<Vec<_>>(),
            });
            if let Some(pf) = post_filter {
                record["post_filter"] = term_to_record(pf);
            }
            record
        }
    }
}

fn value_to_json(v: &Value) -> Json {
    match v {
        Value::Null => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Number(n) => json!(n),
        Value::Str(s) => json!(s),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
    }
}

pub(crate) fn json_to_value(v: &Json) -> Value {
    match v {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        Json::Object(_) => Value::Null,
    }
}

fn array_filter_str(af: ArrayFilter) -> &'static str {
    match af {
        ArrayFilter::Any => "any",
        ArrayFilter::All => "all",
        ArrayFilter::None => "none",
    }
}

fn array_filter_from_str(s: &str) -> Result<ArrayFilter> {
    Ok(match s {
        "any" => ArrayFilter::Any,
        "all" => ArrayFilter::All,
        "none" => ArrayFilter::None,
        other => return Err(InspectorError::QueryParse(format!("unknown array_filter {other:?}"))),
    })
}

/// Parses a tagged JSON record into a [`Term`], discriminating by field
/// presence in priority order: `left`/`right`/`op`, `name`/`op`,
/// `fn`/`property_path`, `kind`, `id`, `not`, `merge`/`pre_filter`. An empty
/// object parses as `AllTerm`. Unrecognised shapes fail with
/// [`InspectorError::QueryParse`].
pub fn term_from_record(record: &Json) -> Result<Term> {
    let Json::Object(map) = record else {
        return Err(InspectorError::QueryParse(format!(
            "expected a JSON object, found {record}"
        )));
    };

    if map.contains_key("left") && map.contains_key("right") && map.contains_key("op") {
        let left = term_from_record(&map["left"])?;
        let right = term_from_record(&map["right"])?;
        let op = match map["op"].as_str() {
            Some("and") => CombineOp::And,
            Some("or") => CombineOp::Or,
            other => {
                return Err(InspectorError::QueryParse(format!(
                    "unknown combine op {other:?}"
                )))
            }
        };
        return Ok(match op {
            CombineOp::And => left.and(right),
            CombineOp::Or => left.or(right),
        });
    }

    if map.contains_key("name") && map.contains_key("op") {
        let name = map["name"]
            .as_str()
            .ok_or_else(|| InspectorError::QueryParse("predicate.name must be a string".into()))?
            .to_string();
        let op_str = map["op"]
            .as_str()
            .ok_or_else(|| InspectorError::QueryParse("predicate.op must be a string".into()))?;
        let op = PredicateOp::from_str(op_str)?;
        let value = map.get("value").map(json_to_value).unwrap_or(Value::Null);
        let mut args: PredicateArgs = BTreeMap::new();
        if let Some(Json::Object(raw_args)) = map.get("args") {
            for (k, v) in raw_args {
                if let Some(s) = v.as_str() {
                    args.insert(k.clone(), s.to_string());
                }
            }
        }
        let array_filter = match map.get("array_filter").and_then(Json::as_str) {
            Some(s) => Some(array_filter_from_str(s)?),
            None => None,
        };
        return Ok(Term::Predicate {
            name,
            op,
            value,
            args,
            array_filter,
        });
    }

    if map.contains_key("fn") && map.contains_key("property_path") {
        let function = map["fn"]
            .as_str()
            .ok_or_else(|| InspectorError::QueryParse("function.fn must be a string".into()))?
            .to_string();
        let property_path = map["property_path"]
            .as_str()
            .ok_or_else(|| InspectorError::QueryParse("function.property_path must be a string".into()))?
            .to_string();
        let args = match map.get("args") {
            Some(Json::Array(items)) => items.iter().map(json_to_value).collect(),
            _ => Vec::new(),
        };
        return Ok(Term::FunctionTerm {
            function,
            property_path,
            args,
        });
    }

    if let Some(kind) = map.get("kind") {
        let kinds: Vec<String> = match kind {
            Json::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| InspectorError::QueryParse("kind entries must be strings".into()))
                })
                .collect::<Result<_>>()?,
            Json::String(s) => vec![s.clone()],
            other => {
                return Err(InspectorError::QueryParse(format!(
                    "kind must be a string or array of strings, found {other}"
                )))
            }
        };
        return Term::is_term(kinds);
    }

    if let Some(id) = map.get("id") {
        let id = id
            .as_str()
            .ok_or_else(|| InspectorError::QueryParse("id must be a string".into()))?
            .to_string();
        return Ok(Term::IdTerm(id));
    }

    if let Some(not) = map.get("not") {
        return Ok(term_from_record(not)?.not());
    }

    if map.contains_key("merge") || map.contains_key("pre_filter") {
        let pre_filter = match map.get("pre_filter") {
            Some(pf) => term_from_record(pf)?,
            None => Term::AllTerm,
        };
        let merge = match map.get("merge") {
            Some(Json::Array(items)) => items
                .iter()
                .map(merge_query_from_record)
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };
        let post_filter = match map.get("post_filter") {
            Some(pf) => Some(Box::new(term_from_record(pf)?)),
            None => None,
        };
        return Ok(Term::MergeTerm {
            pre_filter: Box::new(pre_filter),
            merge,
            post_filter,
        });
    }

    if map.is_empty() {
        return Ok(Term::AllTerm);
    }

    Err(InspectorError::QueryParse(format!(
        "unrecognised term record shape: {record}"
    )))
}

/// A merge record only ever appears nested under `merge`, produced by the
/// ancestor/descendant lift — so its embedded query is a synthetic
/// traversal rather than a user-authored one; we reconstruct just enough
/// (`name`, `only_first`) to round-trip that shape, parsing the query back
/// as the canonical `is(kind) <-/-> all` traversal it always is.
fn merge_query_from_record(record: &Json) -> Result<MergeQuery> {
    use crate::query::navigation::{Direction, EdgeType, Navigation, NAV_MAX};
    use crate::query::part::Part;
    use crate::query::query::Query;
    use std::collections::BTreeMap as Map;

    let Json::Object(map) = record else {
        return Err(InspectorError::QueryParse("merge entry must be an object".into()));
    };
    let name = map
        .get("name")
        .and_then(Json::as_str)
        .ok_or_else(|| InspectorError::QueryParse("merge entry missing name".into()))?
        .to_string();
    let only_first = map.get("only_first").and_then(Json::as_bool).unwrap_or(false);

    let (is_ancestor, kind) = crate::query::term::split_anc_desc_name(&format!("{name}.reported.x"))?;
    let direction = if is_ancestor { Direction::Inbound } else { Direction::Outbound };
    let nav = Navigation::new(0, NAV_MAX, EdgeType::Default, direction);
    let query = Query {
        parts: vec![
            Part::new(Term::AllTerm),
            Part::new(Term::is_term([kind])?).with_navigation(nav),
        ],
        preamble: Map::new(),
        aggregate: None,
    };
    Ok(MergeQuery::new(name, query, only_first))
}
