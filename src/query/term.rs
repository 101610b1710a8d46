//! The term algebra: an immutable, structurally-hashable, totally-ordered
//! sum type over filters, traversals, merges, and predicates.
//!
//! # Prior Art
//!
//! The closed-sum-type-with-exhaustive-dispatch shape mirrors the `OpTree`
//! operator tree used to represent differentiable query plans elsewhere in
//! this codebase: a tagged variant enumeration with owning children, no
//! back-edges, rewriter passes implemented as total pattern matches rather
//! than virtual dispatch.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InspectorError, Result};
use crate::query::query::Query;

/// Comparison / membership operator for a [`Term::Predicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PredicateOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Regex,
    NotRegex,
    In,
    NotIn,
}

impl PredicateOp {
    pub fn as_str(self) -> &'static str {
        match self {
            PredicateOp::Eq => "==",
            PredicateOp::Ne => "!=",
            PredicateOp::Lt => "<",
            PredicateOp::Lte => "<=",
            PredicateOp::Gt => ">",
            PredicateOp::Gte => ">=",
            PredicateOp::Regex => "=~",
            PredicateOp::NotRegex => "!~",
            PredicateOp::In => "in",
            PredicateOp::NotIn => "not in",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "==" => PredicateOp::Eq,
            "!=" => PredicateOp::Ne,
            "<" => PredicateOp::Lt,
            "<=" => PredicateOp::Lte,
            ">" => PredicateOp::Gt,
            ">=" => PredicateOp::Gte,
            "=~" => PredicateOp::Regex,
            "!~" => PredicateOp::NotRegex,
            "in" => PredicateOp::In,
            "not in" => PredicateOp::NotIn,
            other => return Err(InspectorError::QueryParse(format!("unknown predicate op {other:?}"))),
        })
    }
}

/// Array-quantifier carried in a [`Predicate`]'s `args` when the predicate
/// targets an array-valued property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ArrayFilter {
    Any,
    All,
    None,
}

/// A scalar value a [`Term::Predicate`] compares against.
///
/// Ordered and hashed structurally (floats are compared via their bit
/// pattern so that `Value` as a whole can be `Ord`/`Hash`, which plain
/// `f64` is not).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}
impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical_key().cmp(&other.canonical_key())
    }
}
impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical_key().hash(state);
    }
}

impl Value {
    /// A totally-ordered, hashable stand-in for this value: its rendered
    /// text. Cheap enough for the small values a predicate carries and
    /// sidesteps `f64`'s lack of `Eq`/`Ord`/`Hash`.
    fn canonical_key(&self) -> String {
        render_value(self)
    }
}

fn render_value(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        Value::Str(s) => format!("{s:?}"),
        Value::List(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render_value(self))
    }
}

/// Extra keyword arguments attached to a [`Term::Predicate`].
///
/// A small ordered map keeps rendering deterministic; `BTreeMap` gives us
/// `Ord`/`Hash` for free.
pub type PredicateArgs = BTreeMap<String, String>;

/// A sub-query merged in by name, embedded inside a [`Term::MergeTerm`].
///
/// `name` is dot-delimited, e.g. `ancestors.account`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MergeQuery {
    pub name: String,
    pub query: Box<Query>,
    pub only_first: bool,
}

impl MergeQuery {
    pub fn new(name: impl Into<String>, query: Query, only_first: bool) -> Self {
        Self {
            name: name.into(),
            query: Box::new(query),
            only_first,
        }
    }
}

impl fmt::Display for MergeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.query)
    }
}

/// The term algebra. A closed sum type; every variant is immutable once
/// constructed and every traversal is a total pattern match.
///
/// `AllTerm` is the identity element for `and` and absorbing for `or`;
/// [`Term::and`] / [`Term::or`] enforce this simplification at construction
/// time so it never needs to be re-derived downstream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    AllTerm,
    NotTerm(Box<Term>),
    Predicate {
        name: String,
        op: PredicateOp,
        value: Value,
        args: PredicateArgs,
        array_filter: Option<ArrayFilter>,
    },
    IsTerm(Vec<String>),
    IdTerm(String),
    FunctionTerm {
        function: String,
        property_path: String,
        args: Vec<Value>,
    },
    CombinedTerm {
        left: Box<Term>,
        op: CombineOp,
        right: Box<Term>,
    },
    MergeTerm {
        pre_filter: Box<Term>,
        merge: Vec<MergeQuery>,
        post_filter: Option<Box<Term>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CombineOp {
    And,
    Or,
}

impl Term {
    pub fn predicate(name: impl Into<String>, op: PredicateOp, value: Value) -> Term {
        Term::Predicate {
            name: name.into(),
            op,
            value,
            args: PredicateArgs::new(),
            array_filter: None,
        }
    }

    pub fn is_term<I, S>(kinds: I) -> Result<Term>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kinds: Vec<String> = kinds.into_iter().map(Into::into).collect();
        if kinds.is_empty() {
            return Err(InspectorError::QueryParse(
                "IsTerm requires at least one kind".into(),
            ));
        }
        Ok(Term::IsTerm(kinds))
    }

    pub fn not(self) -> Term {
        match self {
            Term::NotTerm(inner) => *inner,
            other => Term::NotTerm(Box::new(other)),
        }
    }

    /// Logical AND with `AllTerm`-absorption: `AllTerm and x = x and AllTerm = x`.
    pub fn and(self, other: Term) -> Term {
        match (self, other) {
            (Term::AllTerm, x) | (x, Term::AllTerm) => x,
            (l, r) => Term::CombinedTerm {
                left: Box::new(l),
                op: CombineOp::And,
                right: Box::new(r),
            },
        }
    }

    /// Logical OR with `AllTerm`-absorption: `AllTerm or x = x or AllTerm = AllTerm`.
    pub fn or(self, other: Term) -> Term {
        match (self, other) {
            (Term::AllTerm, _) | (_, Term::AllTerm) => Term::AllTerm,
            (l, r) => Term::CombinedTerm {
                left: Box::new(l),
                op: CombineOp::Or,
                right: Box::new(r),
            },
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Term::AllTerm)
    }

    /// Walks the term, replacing every `Predicate.name`, `FunctionTerm.property_path`
    /// with `f(name)`. Merge sub-queries rewrite recursively via
    /// [`Query::change_variable`].
    pub fn change_variable(&self, f: &impl Fn(&str) -> String) -> Term {
        match self {
            Term::AllTerm => Term::AllTerm,
            Term::NotTerm(inner) => Term::NotTerm(Box::new(inner.change_variable(f))),
            Term::Predicate {
                name,
                op,
                value,
                args,
                array_filter,
            } => Term::Predicate {
                name: f(name),
                op: *op,
                value: value.clone(),
                args: args.clone(),
                array_filter: *array_filter,
            },
            Term::IsTerm(kinds) => Term::IsTerm(kinds.clone()),
            Term::IdTerm(id) => Term::IdTerm(id.clone()),
            Term::FunctionTerm {
                function,
                property_path,
                args,
            } => Term::FunctionTerm {
                function: function.clone(),
                property_path: f(property_path),
                args: args.clone(),
            },
            Term::CombinedTerm { left, op, right } => Term::CombinedTerm {
                left: Box::new(left.change_variable(f)),
                op: *op,
                right: Box::new(right.change_variable(f)),
            },
            Term::MergeTerm {
                pre_filter,
                merge,
                post_filter,
            } => Term::MergeTerm {
                pre_filter: Box::new(pre_filter.change_variable(f)),
                merge: merge
                    .iter()
                    .map(|mq| MergeQuery {
                        name: mq.name.clone(),
                        query: Box::new(mq.query.change_variable(f)),
                        only_first: mq.only_first,
                    })
                    .collect(),
                post_filter: post_filter
                    .as_ref()
                    .map(|t| Box::new(t.change_variable(f))),
            },
        }
    }

    /// True if `name` (or, for `FunctionTerm`, `property_path`) begins with
    /// `ancestors.` or `descendants.` — i.e. this leaf is shorthand for a
    /// merge-and-filter rather than a directly resolvable property.
    pub fn is_ancestor_descendant_predicate(&self) -> bool {
        matches!(self, Term::Predicate { name, .. } if starts_with_anc_desc(name))
    }

    /// For an ancestor/descendant predicate, returns `(is_ancestor, kind)`.
    pub fn ancestor_descendant_kind(&self) -> Option<Result<(bool, String)>> {
        let Term::Predicate { name, .. } = self else {
            return None;
        };
        if !starts_with_anc_desc(name) {
            return None;
        }
        Some(split_anc_desc_name(name))
    }
}

fn starts_with_anc_desc(name: &str) -> bool {
    name.starts_with("ancestors.") || name.starts_with("descendants.")
}

/// Split `ancestors.account.reported.name` into `(true, "account")`.
/// Requires at least 3 dot-separated segments (`{ancestors|descendants}.{kind}.{prop...}`).
pub fn split_anc_desc_name(name: &str) -> Result<(bool, String)> {
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() < 3 {
        return Err(InspectorError::MalformedAncestorName(name.to_string()));
    }
    let is_ancestor = match segments[0] {
        "ancestors" => true,
        "descendants" => false,
        _ => return Err(InspectorError::MalformedAncestorName(name.to_string())),
    };
    Ok((is_ancestor, segments[1].to_string()))
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::AllTerm => write!(f, "all"),
            Term::NotTerm(inner) => write!(f, "not ({inner})"),
            Term::Predicate {
                name,
                op,
                value,
                args,
                array_filter,
            } => {
                if let Some(af) = array_filter {
                    let af_str = match af {
                        ArrayFilter::Any => "any",
                        ArrayFilter::All => "all",
                        ArrayFilter::None => "none",
                    };
                    write!(f, "{name}[{af_str}] {} {value}", op.as_str())?;
                } else {
                    write!(f, "{name} {} {value}", op.as_str())?;
                }
                if !args.is_empty() {
                    let rendered: Vec<String> =
                        args.iter().map(|(k, v)| format!("{k}={v}")).collect();
                    write!(f, " ({})", rendered.join(", "))?;
                }
                Ok(())
            }
            Term::IsTerm(kinds) => write!(f, "is({})", kinds.join(", ")),
            Term::IdTerm(id) => write!(f, "id({id})"),
            Term::FunctionTerm {
                function,
                property_path,
                args,
            } => {
                let rendered: Vec<String> = args.iter().map(|v| v.to_string()).collect();
                write!(f, "{function}({property_path}, {})", rendered.join(", "))
            }
            Term::CombinedTerm { left, op, right } => {
                let op_str = match op {
                    CombineOp::And => "and",
                    CombineOp::Or => "or",
                };
                write!(f, "({left} {op_str} {right})")
            }
            Term::MergeTerm {
                pre_filter,
                merge,
                post_filter,
            } => {
                let merges: Vec<String> = merge.iter().map(|m| m.to_string()).collect();
                write!(f, "{{{pre_filter} merge({}) ", merges.join(", "))?;
                match post_filter {
                    Some(pf) => write!(f, "{pf}}}"),
                    None => write!(f, "}}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str, op: PredicateOp, n: f64) -> Term {
        Term::predicate(name, op, Value::Number(n))
    }

    #[test]
    fn test_all_and_identity() {
        let t = p("a", PredicateOp::Gt, 1.0);
        assert_eq!(Term::AllTerm.and(t.clone()), t);
        assert_eq!(t.clone().and(Term::AllTerm), t);
    }

    #[test]
    fn test_all_or_absorbing() {
        let t = p("a", PredicateOp::Gt, 1.0);
        assert_eq!(Term::AllTerm.or(t.clone()), Term::AllTerm);
        assert_eq!(t.or(Term::AllTerm), Term::AllTerm);
    }

    #[test]
    fn test_double_not_unwraps() {
        let t = p("a", PredicateOp::Gt, 1.0);
        assert_eq!(t.clone().not().not(), t);
    }

    #[test]
    fn test_change_variable_identity() {
        let t = p("a", PredicateOp::Gt, 1.0).and(p("b", PredicateOp::Lt, 2.0));
        let rewritten = t.change_variable(&|n| n.to_string());
        assert_eq!(t, rewritten);
    }

    #[test]
    fn test_change_variable_composition() {
        let t = p("a", PredicateOp::Gt, 1.0);
        let f = |n: &str| format!("f.{n}");
        let g = |n: &str| format!("g.{n}");
        let fg = |n: &str| f(&g(n));

        let lhs = t.change_variable(&fg);
        let rhs = t.change_variable(&g).change_variable(&f);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_split_anc_desc_name_ok() {
        let (is_anc, kind) = split_anc_desc_name("ancestors.account.reported.name").unwrap();
        assert!(is_anc);
        assert_eq!(kind, "account");
    }

    #[test]
    fn test_split_anc_desc_name_malformed() {
        assert!(split_anc_desc_name("ancestors.account").is_err());
        assert!(split_anc_desc_name("foo.account.reported").is_err());
    }

    #[test]
    fn test_s1_render() {
        let t = Term::predicate("a", PredicateOp::Gt, Value::Number(1.0))
            .and(Term::predicate("b", PredicateOp::Eq, Value::Str("x".into())));
        assert_eq!(format!("{t}"), "(a > 1 and b == \"x\")");
    }
}
