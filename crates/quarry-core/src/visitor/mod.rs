//! Expression visitors.
//!
//! A query travels through the passes in this module before it reaches the
//! compiler:
//!
//! 1. [`ParameterizingVisitor`] lifts captured values into synthetic
//!    parameters.
//! 2. [`InliningVisitor`] splices composed queryables and folds
//!    literal-only sub-expressions.
//! 3. [`StructuralHasher`] keys the plan cache.
//! 4. On a miss, the rewriting, composing and optimizing sets of a
//!    [`VisitorPipeline`] normalize the tree for translation.

pub mod compose;
mod hash;
mod inline;
pub mod optimize;
mod parameterize;
pub mod rewrite;

use tracing::trace;

use quarry_expr::Expr;

use crate::context::QueryProcessingContext;
use crate::error::Result;

pub use hash::{structural_hash, structurally_equal, StructuralHasher};
pub use inline::InliningVisitor;
pub use parameterize::ParameterizingVisitor;

/// A single tree-to-tree pass.
///
/// Visitors hold no per-query state, so one instance serves concurrent
/// compilations; everything a pass needs to remember lives in the
/// [`QueryProcessingContext`].
pub trait ExpressionVisitor: Send + Sync {
    /// Pass name, used in trace output.
    fn name(&self) -> &'static str;

    /// Rewrite `expr`.
    fn visit(&self, expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr>;
}

/// Upper bound on optimizer sweeps per stage.
const MAX_OPTIMIZE_ROUNDS: usize = 8;

/// The ordered visitor sets applied to a cache miss.
pub struct VisitorPipeline {
    rewriting: Vec<Box<dyn ExpressionVisitor>>,
    composing: Vec<Box<dyn ExpressionVisitor>>,
    optimizing: Vec<Box<dyn ExpressionVisitor>>,
}

impl Default for VisitorPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VisitorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |visitors: &[Box<dyn ExpressionVisitor>]| {
            visitors.iter().map(|v| v.name()).collect::<Vec<_>>()
        };
        f.debug_struct("VisitorPipeline")
            .field("rewriting", &names(&self.rewriting))
            .field("composing", &names(&self.composing))
            .field("optimizing", &names(&self.optimizing))
            .finish()
    }
}

impl VisitorPipeline {
    /// The standard pipeline.
    pub fn new() -> Self {
        Self {
            rewriting: rewrite::standard(),
            composing: compose::standard(),
            optimizing: optimize::standard(),
        }
    }

    /// Replace the composing list.
    pub fn with_composing(mut self, composing: Vec<Box<dyn ExpressionVisitor>>) -> Self {
        self.composing = composing;
        self
    }

    /// Replace the optimizing set.
    pub fn with_optimizing(mut self, optimizing: Vec<Box<dyn ExpressionVisitor>>) -> Self {
        self.optimizing = optimizing;
        self
    }

    /// Apply every rewriting visitor once, in order.
    pub fn rewrite(&self, expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr> {
        run(&self.rewriting, expr, context)
    }

    /// Run the optimizing set until the tree stops changing.
    pub fn optimize(&self, mut expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr> {
        for _ in 0..MAX_OPTIMIZE_ROUNDS {
            let next = run(&self.optimizing, expr.clone(), context)?;
            if next == expr {
                return Ok(next);
            }
            expr = next;
        }
        Ok(expr)
    }

    /// Apply each composing visitor exactly once, optimizing before each
    /// one and once more at the end.
    pub fn compose(&self, expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr> {
        let mut expr = expr;
        for visitor in &self.composing {
            expr = self.optimize(expr, context)?;
            trace!(visitor = visitor.name(), "composing");
            expr = visitor.visit(expr, context)?;
        }
        self.optimize(expr, context)
    }
}

fn run(
    visitors: &[Box<dyn ExpressionVisitor>],
    expr: Expr,
    context: &mut QueryProcessingContext,
) -> Result<Expr> {
    visitors.iter().try_fold(expr, |expr, visitor| {
        trace!(visitor = visitor.name(), "visiting");
        visitor.visit(expr, context)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::testing::blog_context;
    use quarry_expr::{Query, QueryMethod};

    fn compose_twice(expr: Expr) -> (Expr, Expr) {
        let pipeline = VisitorPipeline::new();
        let mut context = blog_context(QueryOptions::default());
        let rewritten = pipeline.rewrite(expr, &mut context).unwrap();
        let once = pipeline.compose(rewritten, &mut context).unwrap();
        let twice = pipeline.compose(once.clone(), &mut context).unwrap();
        (once, twice)
    }

    #[test]
    fn test_composing_a_composed_tree_changes_nothing() {
        let queries = vec![
            Query::from("Post")
                .filter(|p| p.member("author").member("name").eq(Expr::literal("ann")))
                .into_expr(),
            Query::from("Post")
                .select(|p| p.member("author").member("name"))
                .into_expr(),
            Query::from("Post").include("comments").into_expr(),
            Query::from("User")
                .select(|u| Expr::query_call(QueryMethod::Count, vec![u.member("posts")]))
                .into_expr(),
        ];
        for query in queries {
            let (once, twice) = compose_twice(query);
            assert!(structurally_equal(&once, &twice), "{once:?} became {twice:?}");
        }
    }
}
