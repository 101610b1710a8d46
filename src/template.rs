//! The consumed template-expander contract: turns a detection string (and
//! the section it is written relative to) into a [`Query`]. The real
//! grammar (the full `resoto` search language) lives outside this crate;
//! [`DemoTemplateExpander`] implements just enough of it — `is(kind)`,
//! `path OP value`, `and`/`or` — to drive the bundled CLI demo.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::{InspectorError, Result};
use crate::query::query::Query;
use crate::query::term::{PredicateOp, Term, Value};

/// Consumed contract for parsing a `resoto` detection string into a
/// [`Query`]. `env` supplies the check's merged variable environment
/// (`check.environment(overrides)`); `on_section` anchors relative property
/// names the way [`Query::on_section`] does.
#[async_trait]
pub trait TemplateExpander: Send + Sync {
    async fn parse_query(&self, source: &str, on_section: Option<&str>, env: &BTreeMap<String, String>) -> Result<Query>;
}

/// A minimal recursive-descent parser for the detection-string subset the
/// bundled checks actually use: `is(kind)`, `path OP literal`, combined
/// with `and`/`or` and optional parentheses. `${var}` tokens are expanded
/// from `env` before parsing, the same substitution a full template
/// expander would do first.
pub struct DemoTemplateExpander;

#[async_trait]
impl TemplateExpander for DemoTemplateExpander {
    async fn parse_query(&self, source: &str, on_section: Option<&str>, env: &BTreeMap<String, String>) -> Result<Query> {
        let substituted = substitute_vars(source, env);
        let mut parser = Parser::new(&substituted);
        let term = parser.parse_or()?;
        parser.expect_end()?;
        let query = term_to_query(term)?;
        Ok(match on_section {
            Some(section) => query.on_section(section),
            None => query,
        })
    }
}

fn substitute_vars(source: &str, env: &BTreeMap<String, String>) -> String {
    let mut out = source.to_string();
    for (key, value) in env {
        out = out.replace(&format!("${{{key}}}"), value);
    }
    out
}

/// Folds a bare predicate/is-term into a one-part [`Query`]; combined terms
/// (`and`/`or`) stay as a single filtered part too — the demo grammar has
/// no traversal syntax.
fn term_to_query(term: Term) -> Result<Query> {
    Ok(match term {
        Term::IsTerm(kinds) => Query::by(kinds.into_iter().next().ok_or_else(|| InspectorError::TemplateExpand("empty is()".into()))?)?,
        other => Query::all().filter(other),
    })
}

struct Parser<'a> {
    remaining: &'a str,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self { remaining: source.trim() }
    }

    fn skip_ws(&mut self) {
        self.remaining = self.remaining.trim_start();
    }

    fn expect_end(&mut self) -> Result<()> {
        self.skip_ws();
        if self.remaining.is_empty() {
            Ok(())
        } else {
            Err(InspectorError::TemplateExpand(format!("unexpected trailing input: {:?}", self.remaining)))
        }
    }

    fn consume_keyword(&mut self, kw: &str) -> bool {
        self.skip_ws();
        if let Some(rest) = self.remaining.strip_prefix(kw) {
            if rest.is_empty() || !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
                self.remaining = rest;
                return true;
            }
        }
        false
    }

    fn parse_or(&mut self) -> Result<Term> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.consume_keyword("or") {
                let right = self.parse_and()?;
                left = left.or(right);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Term> {
        let mut left = self.parse_atom()?;
        loop {
            self.skip_ws();
            if self.consume_keyword("and") {
                let right = self.parse_atom()?;
                left = left.and(right);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_atom(&mut self) -> Result<Term> {
        self.skip_ws();
        if let Some(rest) = self.remaining.strip_prefix('(') {
            self.remaining = rest;
            let inner = self.parse_or()?;
            self.skip_ws();
            self.remaining = self
                .remaining
                .strip_prefix(')')
                .ok_or_else(|| InspectorError::TemplateExpand("expected closing paren".into()))?;
            return Ok(inner);
        }
        if let Some(rest) = self.remaining.strip_prefix("is(") {
            let end = rest.find(')').ok_or_else(|| InspectorError::TemplateExpand("unterminated is(...)".into()))?;
            let kind = rest[..end].trim().to_string();
            self.remaining = &rest[end + 1..];
            return Term::is_term([kind]);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Term> {
        self.skip_ws();
        let name_end = self
            .remaining
            .find([' ', '\t'])
            .ok_or_else(|| InspectorError::TemplateExpand(format!("expected a predicate, found {:?}", self.remaining)))?;
        let name = self.remaining[..name_end].to_string();
        self.remaining = self.remaining[name_end..].trim_start();

        const OPS: &[(&str, PredicateOp)] = &[
            ("==", PredicateOp::Eq),
            ("!=", PredicateOp::Ne),
            (">=", PredicateOp::Gte),
            ("<=", PredicateOp::Lte),
            (">", PredicateOp::Gt),
            ("<", PredicateOp::Lt),
        ];
        let (op_str, op) = OPS
            .iter()
            .find(|(s, _)| self.remaining.starts_with(s))
            .ok_or_else(|| InspectorError::TemplateExpand(format!("expected a comparison operator in {:?}", self.remaining)))?;
        self.remaining = self.remaining[op_str.len()..].trim_start();

        let value_end = self
            .remaining
            .find(|c: char| c.is_whitespace() || c == ')')
            .unwrap_or(self.remaining.len());
        let value_str = self.remaining[..value_end].trim();
        self.remaining = &self.remaining[value_end..];

        Ok(Term::predicate(name, *op, parse_literal(value_str)))
    }
}

fn parse_literal(s: &str) -> Value {
    if s == "null" {
        Value::Null
    } else if s == "true" {
        Value::Bool(true)
    } else if s == "false" {
        Value::Bool(false)
    } else if let Ok(n) = s.parse::<f64>() {
        Value::Number(n)
    } else {
        Value::Str(s.trim_matches('"').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parses_is_term() {
        let expander = DemoTemplateExpander;
        let query = expander.parse_query("is(aws_instance)", None, &BTreeMap::new()).await.unwrap();
        assert_eq!(query.to_string(), "is(aws_instance)");
    }

    #[tokio::test]
    async fn test_parses_combined_predicate() {
        let expander = DemoTemplateExpander;
        let query = expander
            .parse_query("is(aws_instance) and reported.public_ip_address != null", None, &BTreeMap::new())
            .await
            .unwrap();
        assert!(query.to_string().contains("public_ip_address"));
    }

    #[tokio::test]
    async fn test_substitutes_env_vars() {
        let expander = DemoTemplateExpander;
        let env = BTreeMap::from([("region".to_string(), "us-east-1".to_string())]);
        let query = expander.parse_query("region == ${region}", None, &env).await.unwrap();
        assert!(query.to_string().contains("us-east-1"));
    }
}
