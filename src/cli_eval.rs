//! The consumed CLI-command-evaluator contract: runs a `resoto_cmd`
//! detection string (already prefixed with any account-scoping search) and
//! streams back the matching rows.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};

use crate::error::Result;
use crate::graph::Row;

/// Consumed contract for evaluating a `resoto_cmd` detection. Kept separate
/// from [`crate::template::TemplateExpander`] because a CLI command is
/// opaque shell-pipeline text, not a parseable [`crate::query::Query`].
#[async_trait]
pub trait CliCommandEvaluator: Send + Sync {
    async fn evaluate(&self, command: &str) -> Result<BoxStream<'static, Result<Row>>>;
}

/// `resoto_cmd` checks pipe through a full shell-like command language
/// (`search ... | format ...`); the bundled demo graph has no such
/// pipeline runner, so this evaluator always reports zero matching rows.
/// `ResotoCmd` detections therefore never fail, they just never find
/// anything — the scheduler does not special-case this evaluator.
pub struct EmptyCliCommandEvaluator;

#[async_trait]
impl CliCommandEvaluator for EmptyCliCommandEvaluator {
    async fn evaluate(&self, _command: &str) -> Result<BoxStream<'static, Result<Row>>> {
        Ok(Box::pin(stream::iter(Vec::<Result<Row>>::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_empty_evaluator_yields_no_rows() {
        let mut rows = EmptyCliCommandEvaluator.evaluate("search is(aws_instance)").await.unwrap();
        assert!(rows.next().await.is_none());
    }
}
