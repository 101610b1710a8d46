//! The ancestor/descendant predicate-lifting rewrite: turns a predicate like
//! `ancestors.account.reported.name == "prod"` into an explicit merge join
//! against the nearest ancestor of that kind.

use std::collections::BTreeMap;
use std::collections::HashSet;

use crate::error::Result;
use crate::query::navigation::{Direction, EdgeType, Navigation, NAV_MAX};
use crate::query::part::Part;
use crate::query::query::Query;
use crate::query::term::{CombineOp, MergeQuery, Term};

/// Rewrites a single part's term, lifting every `ancestors.*`/`descendants.*`
/// predicate into an explicit [`Term::MergeTerm`]. A no-op if the term
/// contains no such predicate — including when applied a second time to an
/// already-lifted part (idempotent).
pub fn lift_ancestor_descendant(part: &Part) -> Result<Part> {
    let (source, existing_merges) = unpack(&part.term);

    if !contains_anc_desc(&source) {
        return Ok(part.clone());
    }

    // `existing_merges` only covers a `MergeTerm` sitting at the very top of
    // `part.term`. A `MergeTerm` reachable through `Term::and`/`Term::or` —
    // e.g. `already_lifted.and(Term::predicate(...))` — is still nested
    // inside `source`; walk it down so its merges aren't clobbered by a
    // freshly synthesized one under the same name below.
    let mut merges = existing_merges;
    collect_nested_merges(&source, &mut merges);
    let mut seen_names: HashSet<String> = HashSet::new();
    merges.retain(|m| seen_names.insert(m.name.clone()));

    let (before, after) = split_if_contains(source);

    let mut predicates = Vec::new();
    collect_anc_desc_predicates(&after, &mut predicates);

    let mut groups: BTreeMap<(bool, String), ()> = BTreeMap::new();
    for p in &predicates {
        if let Some(kind) = p.ancestor_descendant_kind() {
            let (is_ancestor, kind) = kind?;
            groups.insert((is_ancestor, kind), ());
        }
    }

    for (is_ancestor, kind) in groups.keys() {
        let name = format!("{}.{kind}", if *is_ancestor { "ancestors" } else { "descendants" });
        if seen_names.contains(&name) {
            continue;
        }
        seen_names.insert(name.clone());
        let direction = if *is_ancestor { Direction::Inbound } else { Direction::Outbound };
        let nav = Navigation::new(0, NAV_MAX, EdgeType::Default, direction);
        let sub_query = Query {
            parts: vec![
                Part::new(Term::AllTerm),
                Part::new(Term::is_term([kind.clone()])?).with_navigation(nav),
            ],
            preamble: BTreeMap::new(),
            aggregate: None,
        };
        merges.push(MergeQuery::new(name, sub_query, false));
    }

    let term = Term::MergeTerm {
        pre_filter: Box::new(before),
        merge: merges,
        post_filter: if after.is_all() { None } else { Some(Box::new(after)) },
    };

    Ok(Part {
        term,
        ..part.clone()
    })
}

/// Unwraps a (possibly already-lifted) term into `(source_term,
/// existing_merges)`, treating an existing `MergeTerm`'s pre- and
/// post-filter as `and`-ed together, per the rewrite's idempotence rule.
fn unpack(term: &Term) -> (Term, Vec<MergeQuery>) {
    match term {
        Term::MergeTerm {
            pre_filter,
            merge,
            post_filter,
        } => {
            let source = match post_filter {
                Some(pf) => (**pre_filter).clone().and((**pf).clone()),
                None => (**pre_filter).clone(),
            };
            (source, merge.clone())
        }
        other => (other.clone(), Vec::new()),
    }
}

fn split_if_contains(term: Term) -> (Term, Term) {
    if contains_anc_desc(&term) {
        split(term)
    } else {
        (term, Term::AllTerm)
    }
}

/// Splits `term` into `(before_merge, after_merge)`.
fn split(term: Term) -> (Term, Term) {
    match term {
        Term::CombinedTerm {
            left,
            op: CombineOp::And,
            right,
        } => {
            let (lb, la) = split_if_contains(*left);
            let (rb, ra) = split_if_contains(*right);
            (lb.and(rb), la.and(ra))
        }
        Term::CombinedTerm { op: CombineOp::Or, .. } => (Term::AllTerm, term),
        Term::MergeTerm { .. } => {
            // Its merges were already folded into the caller's accumulator
            // by `collect_nested_merges` before `split` was ever called.
            let (source, _) = unpack(&term);
            split_if_contains(source)
        }
        Term::NotTerm(ref inner) => {
            if contains_anc_desc(inner) {
                (Term::AllTerm, term)
            } else {
                (term, Term::AllTerm)
            }
        }
        other => {
            if contains_anc_desc(&other) {
                (Term::AllTerm, other)
            } else {
                (other, Term::AllTerm)
            }
        }
    }
}

/// Collects every [`MergeQuery`] embedded in a `MergeTerm` anywhere inside
/// `term`, however deeply nested under `and`/`or`/`not` — not just one
/// sitting at the term's top level.
fn collect_nested_merges(term: &Term, out: &mut Vec<MergeQuery>) {
    match term {
        Term::MergeTerm {
            pre_filter,
            merge,
            post_filter,
        } => {
            out.extend(merge.iter().cloned());
            collect_nested_merges(pre_filter, out);
            if let Some(pf) = post_filter {
                collect_nested_merges(pf, out);
            }
        }
        Term::NotTerm(inner) => collect_nested_merges(inner, out),
        Term::CombinedTerm { left, right, .. } => {
            collect_nested_merges(left, out);
            collect_nested_merges(right, out);
        }
        _ => {}
    }
}

fn contains_anc_desc(term: &Term) -> bool {
    match term {
        Term::Predicate { .. } => term.is_ancestor_descendant_predicate(),
        Term::NotTerm(inner) => contains_anc_desc(inner),
        Term::CombinedTerm { left, right, .. } => contains_anc_desc(left) || contains_anc_desc(right),
        Term::MergeTerm {
            pre_filter,
            post_filter,
            ..
        } => {
            contains_anc_desc(pre_filter)
                || post_filter.as_ref().is_some_and(|pf| contains_anc_desc(pf))
        }
        _ => false,
    }
}

fn collect_anc_desc_predicates(term: &Term, out: &mut Vec<Term>) {
    match term {
        Term::Predicate { .. } => {
            if term.is_ancestor_descendant_predicate() {
                out.push(term.clone());
            }
        }
        Term::NotTerm(inner) => collect_anc_desc_predicates(inner, out),
        Term::CombinedTerm { left, right, .. } => {
            collect_anc_desc_predicates(left, out);
            collect_anc_desc_predicates(right, out);
        }
        Term::MergeTerm {
            pre_filter,
            post_filter,
            ..
        } => {
            collect_anc_desc_predicates(pre_filter, out);
            if let Some(pf) = post_filter {
                collect_anc_desc_predicates(pf, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::term::{PredicateOp, Value};

    fn anc_name(kind: &str, prop: &str) -> String {
        format!("ancestors.{kind}.reported.{prop}")
    }

    #[test]
    fn test_no_anc_desc_is_unchanged() {
        let part = Part::new(Term::predicate("k", PredicateOp::Eq, Value::Number(1.0)));
        let lifted = lift_ancestor_descendant(&part).unwrap();
        assert_eq!(lifted, part);
    }

    #[test]
    fn test_s3_ancestor_lift() {
        let term = Term::predicate(anc_name("account", "name"), PredicateOp::Eq, Value::Str("prod".into()))
            .and(Term::predicate("k", PredicateOp::Eq, Value::Number(1.0)));
        let part = Part::new(term);
        let lifted = lift_ancestor_descendant(&part).unwrap();

        let Term::MergeTerm {
            pre_filter,
            merge,
            post_filter,
        } = &lifted.term
        else {
            panic!("expected MergeTerm");
        };
        assert_eq!(**pre_filter, Term::predicate("k", PredicateOp::Eq, Value::Number(1.0)));
        assert_eq!(merge.len(), 1);
        assert_eq!(merge[0].name, "ancestors.account");
        let expected_post = Term::predicate(anc_name("account", "name"), PredicateOp::Eq, Value::Str("prod".into()));
        assert_eq!(post_filter.as_deref(), Some(&expected_post));
    }

    #[test]
    fn test_lift_is_idempotent() {
        let term = Term::predicate(anc_name("account", "name"), PredicateOp::Eq, Value::Str("prod".into()));
        let part = Part::new(term);
        let once = lift_ancestor_descendant(&part).unwrap();
        let twice = lift_ancestor_descendant(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_or_is_conservative() {
        let term = Term::predicate(anc_name("account", "name"), PredicateOp::Eq, Value::Str("prod".into()))
            .or(Term::predicate("k", PredicateOp::Eq, Value::Number(1.0)));
        let part = Part::new(term.clone());
        let lifted = lift_ancestor_descendant(&part).unwrap();
        let Term::MergeTerm {
            pre_filter,
            post_filter,
            ..
        } = &lifted.term
        else {
            panic!("expected MergeTerm");
        };
        assert!(pre_filter.is_all());
        assert_eq!(post_filter.as_deref(), Some(&term));
    }

    #[test]
    fn test_malformed_ancestor_name_errors() {
        let part = Part::new(Term::predicate("ancestors.account", PredicateOp::Eq, Value::Number(1.0)));
        assert!(lift_ancestor_descendant(&part).is_err());
    }

    #[test]
    fn test_existing_merge_wins_on_name_collision() {
        let custom_query = Query::by("account").unwrap();
        let existing = MergeQuery::new("ancestors.account", custom_query.clone(), true);
        let term = Term::MergeTerm {
            pre_filter: Box::new(Term::AllTerm),
            merge: vec![existing.clone()],
            post_filter: Some(Box::new(Term::predicate(
                anc_name("account", "name"),
                PredicateOp::Eq,
                Value::Str("prod".into()),
            ))),
        };
        let part = Part::new(term);
        let lifted = lift_ancestor_descendant(&part).unwrap();
        let Term::MergeTerm { merge, .. } = &lifted.term else {
            panic!("expected MergeTerm");
        };
        assert_eq!(merge.len(), 1);
        assert_eq!(merge[0], existing);
    }

    /// Same collision-priority rule as `test_existing_merge_wins_on_name_collision`,
    /// but for a `MergeTerm` reached only through `Term::and` — not sitting at
    /// the part's top level. Regression test for a bug where the nested
    /// merge was silently discarded and re-synthesized under the same name.
    #[test]
    fn test_existing_merge_wins_when_nested_under_and() {
        let custom_query = Query::by("account").unwrap();
        let existing = MergeQuery::new("ancestors.account", custom_query, true);
        let already_lifted = Term::MergeTerm {
            pre_filter: Box::new(Term::AllTerm),
            merge: vec![existing.clone()],
            post_filter: Some(Box::new(Term::predicate(
                anc_name("account", "name"),
                PredicateOp::Eq,
                Value::Str("prod".into()),
            ))),
        };
        let term = already_lifted.and(Term::predicate(
            "descendants.region.reported.name",
            PredicateOp::Eq,
            Value::Str("us-east-1".into()),
        ));
        let part = Part::new(term);
        let lifted = lift_ancestor_descendant(&part).unwrap();

        let Term::MergeTerm { merge, .. } = &lifted.term else {
            panic!("expected MergeTerm");
        };
        assert_eq!(merge.len(), 2);
        assert!(merge.contains(&existing));
        assert!(merge.iter().any(|m| m.name == "descendants.region" && m != &existing));
    }
}
