//! The fluent, copy-on-write query builder, `Query::on_section` /
//! `relative_to_section` variable sectioning, and canonical rendering.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InspectorError, Result};
use crate::query::aggregate::Aggregate;
use crate::query::navigation::{EdgeType, Direction, Navigation, Sort, SortOrder, WithClause};
use crate::query::part::Part;
use crate::query::term::{MergeQuery, Term, Value};

/// An immutable, composable query: a non-empty ordered sequence of [`Part`]s
/// stored in **reverse execution order** — `parts[0]` is the part currently
/// being built (the last one to execute); rendering walks the vector
/// back-to-front to recover execution order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Query {
    pub parts: Vec<Part>,
    pub preamble: BTreeMap<String, Value>,
    pub aggregate: Option<Aggregate>,
}

impl Query {
    /// A query matching every node, no navigation, no aggregate.
    pub fn all() -> Self {
        Self {
            parts: vec![Part::new(Term::AllTerm)],
            preamble: BTreeMap::new(),
            aggregate: None,
        }
    }

    /// `Query.by(kind)` — a query matching nodes of the given kind.
    pub fn by(kind: impl Into<String>) -> Result<Self> {
        let term = Term::is_term([kind.into()])?;
        Ok(Self {
            parts: vec![Part::new(term)],
            preamble: BTreeMap::new(),
            aggregate: None,
        })
    }

    fn current(&self) -> &Part {
        &self.parts[0]
    }

    /// `filter(term)`: AND into the current part if it has no outgoing
    /// navigation yet; otherwise a fresh part leads.
    pub fn filter(&self, term: Term) -> Self {
        let mut parts = self.parts.clone();
        if parts[0].navigation.is_none() {
            let existing = std::mem::replace(&mut parts[0].term, Term::AllTerm);
            parts[0].term = existing.and(term);
        } else {
            parts.insert(0, Part::new(term));
        }
        Self {
            parts,
            preamble: self.preamble.clone(),
            aggregate: self.aggregate.clone(),
        }
    }

    /// `traverse(start, until, edge_type, direction)`: composes additively
    /// into the current part's navigation if it already carries one of the
    /// same edge-type/direction; otherwise attaches a fresh navigation to
    /// the current part directly (incompatible existing navigation forces a
    /// new leading `AllTerm` part to carry it instead).
    pub fn traverse(&self, start: u32, until: u32, edge_type: EdgeType, direction: Direction) -> Self {
        let nav = Navigation::new(start, until, edge_type, direction);
        let mut parts = self.parts.clone();
        match parts[0].navigation {
            Some(existing) if existing.edge_type == edge_type && existing.direction == direction => {
                parts[0].navigation = existing.compose(&nav);
            }
            None => {
                parts[0].navigation = Some(nav);
            }
            Some(_) => {
                parts.insert(0, Part::new(Term::AllTerm).with_navigation(nav));
            }
        }
        Self {
            parts,
            preamble: self.preamble.clone(),
            aggregate: self.aggregate.clone(),
        }
    }

    pub fn traverse_out(&self, start: u32, until: u32) -> Self {
        self.traverse(start, until, EdgeType::Default, Direction::Outbound)
    }

    pub fn traverse_in(&self, start: u32, until: u32) -> Self {
        self.traverse(start, until, EdgeType::Default, Direction::Inbound)
    }

    /// `group_by(vars, funcs)`: sets the aggregate. Use [`Query::combine`]
    /// to detect a clash between two already-aggregated queries.
    pub fn group_by(&self, aggregate: Aggregate) -> Self {
        Self {
            parts: self.parts.clone(),
            preamble: self.preamble.clone(),
            aggregate: Some(aggregate),
        }
    }

    /// `add_sort`: appends to the current part's sort list; a fresh empty
    /// part is spawned first if the current part already has a navigation.
    pub fn add_sort(&self, sort: Sort) -> Self {
        let mut parts = self.parts.clone();
        if parts[0].navigation.is_some() {
            parts.insert(0, Part::new(Term::AllTerm));
        }
        parts[0].sort.push(sort);
        Self {
            parts,
            preamble: self.preamble.clone(),
            aggregate: self.aggregate.clone(),
        }
    }

    pub fn sort_by(&self, name: impl Into<String>, order: SortOrder) -> Self {
        self.add_sort(Sort::new(name, order))
    }

    /// `with_limit`: same fresh-part rule as `add_sort`.
    pub fn with_limit(&self, limit: u64) -> Self {
        let mut parts = self.parts.clone();
        if parts[0].navigation.is_some() {
            parts.insert(0, Part::new(Term::AllTerm));
        }
        parts[0].limit = Some(limit);
        Self {
            parts,
            preamble: self.preamble.clone(),
            aggregate: self.aggregate.clone(),
        }
    }

    /// `tag`: same fresh-part rule as `add_sort`/`with_limit`.
    pub fn tag(&self, name: impl Into<String>) -> Self {
        let mut parts = self.parts.clone();
        if parts[0].navigation.is_some() {
            parts.insert(0, Part::new(Term::AllTerm));
        }
        parts[0].tag = Some(name.into());
        Self {
            parts,
            preamble: self.preamble.clone(),
            aggregate: self.aggregate.clone(),
        }
    }

    /// `filter_with`: replaces the *first* part's (execution-first, i.e.
    /// last in storage order) with-clause.
    pub fn filter_with(&self, clause: WithClause) -> Self {
        let mut parts = self.parts.clone();
        let last = parts.len() - 1;
        parts[last].with_clause = Some(clause);
        Self {
            parts,
            preamble: self.preamble.clone(),
            aggregate: self.aggregate.clone(),
        }
    }

    /// `merge_preamble`: shallow-merge with overwrite.
    pub fn merge_preamble(&self, extra: BTreeMap<String, Value>) -> Self {
        let mut preamble = self.preamble.clone();
        preamble.extend(extra);
        Self {
            parts: self.parts.clone(),
            preamble,
            aggregate: self.aggregate.clone(),
        }
    }

    /// `combine(other)`: composes two queries, `other` executing before
    /// `self`. See the ancestor/descendant-lift note in `rewrite.rs` for why
    /// this directionality matters for downstream consumers.
    pub fn combine(&self, other: &Query) -> Result<Query> {
        let aggregate = match (&self.aggregate, &other.aggregate) {
            (Some(_), Some(_)) => {
                return Err(InspectorError::DuplicateAggregate(
                    "both queries define an aggregate".into(),
                ));
            }
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };

        let mut preamble = other.preamble.clone();
        preamble.extend(self.preamble.clone());

        let self_first_idx = self.parts.len() - 1;
        let parts = if self.parts[self_first_idx].navigation.is_some() {
            // self leads with its own navigation: cannot fuse, concatenate.
            let mut parts = self.parts.clone();
            parts.extend(other.parts.clone());
            parts
        } else {
            let self_first = self.parts[self_first_idx].clone();
            let other_current = other.parts[0].clone();

            if self_first.tag.is_some() && other_current.tag.is_some() {
                return Err(InspectorError::Incombinable(
                    "clashing tags at the combine boundary".into(),
                ));
            }
            if self_first.with_clause.is_some() && other_current.with_clause.is_some() {
                return Err(InspectorError::Incombinable(
                    "clashing with-clauses at the combine boundary".into(),
                ));
            }

            let mut sort = other_current.sort.clone();
            sort.extend(self_first.sort.clone());

            let limit = match (self_first.limit, other_current.limit) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            };

            let fused = Part {
                term: other_current.term.and(self_first.term),
                tag: self_first.tag.or(other_current.tag),
                with_clause: self_first.with_clause.or(other_current.with_clause),
                sort,
                limit,
                navigation: self_first.navigation,
            };

            let mut parts = self.parts[..self_first_idx].to_vec();
            parts.push(fused);
            parts.extend(other.parts[1..].to_vec());
            parts
        };

        Ok(Query {
            parts,
            preamble,
            aggregate,
        })
    }

    /// Walks every part (term, sort names, tag-unrelated aggregate names)
    /// replacing variable references via `f`.
    pub fn change_variable(&self, f: &impl Fn(&str) -> String) -> Query {
        let parts = self
            .parts
            .iter()
            .map(|part| Part {
                term: part.term.change_variable(f),
                tag: part.tag.clone(),
                with_clause: part.with_clause.clone(),
                sort: part
                    .sort
                    .iter()
                    .map(|s| Sort::new(f(&s.name), s.order))
                    .collect(),
                limit: part.limit,
                navigation: part.navigation,
            })
            .collect();

        Query {
            parts,
            preamble: self.preamble.clone(),
            aggregate: self.aggregate.clone(),
        }
    }

    /// Rebind every variable reference to be absolute with respect to
    /// `section` (a leading `/` means "already absolute", stripped).
    pub fn on_section(&self, section: &str) -> Query {
        self.change_variable(&|name| variable_to_absolute(Some(section), name))
    }

    /// Inverse of [`Query::on_section`]: rebind absolute variable names to
    /// be relative to `section`, anchoring anything outside the section
    /// with a leading `/`.
    pub fn relative_to_section(&self, section: &str) -> Query {
        self.change_variable(&|name| variable_to_relative(Some(section), name))
    }

    /// Names of every `MergeQuery` reachable from any part's term.
    pub fn merge_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for part in &self.parts {
            collect_merge_names(&part.term, &mut names);
        }
        names.sort();
        names.dedup();
        names
    }

    /// The merge sub-query registered under `name`, if any.
    pub fn merge_query_by_name(&self, name: &str) -> Option<MergeQuery> {
        for part in &self.parts {
            if let Some(mq) = find_merge_query(&part.term, name) {
                return Some(mq);
            }
        }
        None
    }
}

fn collect_merge_names(term: &Term, out: &mut Vec<String>) {
    match term {
        Term::MergeTerm {
            pre_filter,
            merge,
            post_filter,
        } => {
            for mq in merge {
                out.push(mq.name.clone());
            }
            collect_merge_names(pre_filter, out);
            if let Some(pf) = post_filter {
                collect_merge_names(pf, out);
            }
        }
        Term::NotTerm(inner) => collect_merge_names(inner, out),
        Term::CombinedTerm { left, right, .. } => {
            collect_merge_names(left, out);
            collect_merge_names(right, out);
        }
        _ => {}
    }
}

fn find_merge_query(term: &Term, name: &str) -> Option<MergeQuery> {
    match term {
        Term::MergeTerm {
            pre_filter,
            merge,
            post_filter,
        } => {
            if let Some(mq) = merge.iter().find(|mq| mq.name == name) {
                return Some(mq.clone());
            }
            if let Some(found) = find_merge_query(pre_filter, name) {
                return Some(found);
            }
            post_filter.as_ref().and_then(|pf| find_merge_query(pf, name))
        }
        Term::NotTerm(inner) => find_merge_query(inner, name),
        Term::CombinedTerm { left, right, .. } => {
            find_merge_query(left, name).or_else(|| find_merge_query(right, name))
        }
        _ => None,
    }
}

/// `variable_to_absolute(section, name)`: a leading `/` anchors to the root
/// (stripped); otherwise, inside an active section, `section.` is
/// prepended.
pub fn variable_to_absolute(section: Option<&str>, name: &str) -> String {
    if let Some(rest) = name.strip_prefix('/') {
        rest.to_string()
    } else {
        match section {
            Some(s) if !s.is_empty() => format!("{s}.{name}"),
            _ => name.to_string(),
        }
    }
}

/// `variable_to_relative(section, name)`: the inverse of
/// [`variable_to_absolute`], preserving leading-slash semantics for names
/// that don't belong to `section`.
pub fn variable_to_relative(section: Option<&str>, name: &str) -> String {
    match section {
        Some(s) if !s.is_empty() => {
            let prefix = format!("{s}.");
            match name.strip_prefix(&prefix) {
                Some(rest) => rest.to_string(),
                None => format!("/{name}"),
            }
        }
        _ => name.to_string(),
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.preamble.is_empty() {
            let rendered: Vec<String> = self
                .preamble
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, "({})", rendered.join(", "))?;
        }
        let rendered: Vec<String> = self.parts.iter().rev().map(|p| p.to_string()).collect();
        write!(f, "{}", rendered.join(" "))?;
        if let Some(agg) = &self.aggregate {
            write!(f, " {agg}")?;
        }
        Ok(())
    }
}
