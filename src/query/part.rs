//! A single stage of a [`crate::query::Query`] pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::navigation::{Navigation, Sort, WithClause};
use crate::query::term::Term;

/// One stage of a query pipeline: a filter term plus optional tag,
/// with-clause, sort, limit, and the navigation that connects this part to
/// the *next* part in execution order (i.e. the part stored before it, at
/// the next-lower index, in [`crate::query::Query::parts`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Part {
    pub term: Term,
    pub tag: Option<String>,
    pub with_clause: Option<WithClause>,
    pub sort: Vec<Sort>,
    pub limit: Option<u64>,
    pub navigation: Option<Navigation>,
}

impl Part {
    pub fn new(term: Term) -> Self {
        Self {
            term,
            tag: None,
            with_clause: None,
            sort: Vec::new(),
            limit: None,
            navigation: None,
        }
    }

    pub fn with_navigation(mut self, nav: Navigation) -> Self {
        self.navigation = Some(nav);
        self
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.term)?;
        if let Some(tag) = &self.tag {
            write!(f, "#{tag}")?;
        }
        if let Some(wc) = &self.with_clause {
            write!(f, " {wc}")?;
        }
        if !self.sort.is_empty() {
            let sorts: Vec<String> = self.sort.iter().map(|s| s.to_string()).collect();
            write!(f, " sort({})", sorts.join(", "))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit({limit})")?;
        }
        if let Some(nav) = &self.navigation {
            write!(f, " {nav}")?;
        }
        Ok(())
    }
}
