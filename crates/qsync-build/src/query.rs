use crate::{context::InvocationContext, error::BuildError, invoker::BuildInvoker};
use qsync_core::QuerySummary;

/// Answers `bazel query` expressions.
pub trait QueryRunner: Send + Sync {
    fn query(&self, ctx: &InvocationContext, expression: &str)
        -> Result<QuerySummary, BuildError>;
}

pub struct BazelQueryRunner {
    invoker: BuildInvoker,
}

impl BazelQueryRunner {
    pub fn new(invoker: BuildInvoker) -> Self {
        Self { invoker }
    }
}

impl QueryRunner for BazelQueryRunner {
    fn query(
        &self,
        ctx: &InvocationContext,
        expression: &str,
    ) -> Result<QuerySummary, BuildError> {
        self.invoker.query(ctx, expression)
    }
}
