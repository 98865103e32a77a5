//! Constant parameterization.

use quarry_expr::{Constant, Expr, ParameterValue, QueryRoot, Type};

use super::ExpressionVisitor;
use crate::context::QueryProcessingContext;
use crate::error::Result;

/// Replaces captured values and in-memory sequences with synthetic
/// parameters.
///
/// Scalar literals stay in the tree: they are part of the query shape and
/// so of the cache key. Entity-set and expression roots are left for
/// inlining.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterizingVisitor;

impl ExpressionVisitor for ParameterizingVisitor {
    fn name(&self) -> &'static str {
        "parameterize"
    }

    fn visit(&self, expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr> {
        Ok(parameterize(expr, context))
    }
}

/// Parameterize `expr`, recording values in first-seen order.
pub(crate) fn parameterize(expr: Expr, context: &mut QueryProcessingContext) -> Expr {
    match expr {
        Expr::Constant(Constant::Captured { value, ty }) => {
            context.add_parameter(ty, value).to_expr()
        }
        Expr::Constant(Constant::Query(QueryRoot::Opaque {
            element, values, ..
        })) => context
            .add_parameter(
                Type::sequence(Type::Scalar(element)),
                ParameterValue::List(values),
            )
            .to_expr(),
        other => other.map_children(|child| parameterize(child, context)),
    }
}
