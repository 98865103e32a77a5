//! Queryable inlining and partial evaluation.

use std::sync::Arc;

use quarry_expr::{Constant, Expr, Method, QueryRoot};

use super::parameterize::parameterize;
use super::ExpressionVisitor;
use crate::config::DEFAULT_MAX_DEPTH;
use crate::context::QueryProcessingContext;
use crate::error::{Error, Result};
use crate::eval::{evaluate, Env};
use crate::object::Object;

/// Splices composed queryables into the outer tree and folds literal-only
/// sub-expressions.
///
/// A spliced expression is parameterized against the same context before
/// it is inlined in turn, so its captured values get slots after the
/// outer query's. Nesting deeper than `max_depth` fails with
/// [`Error::DepthExceeded`].
#[derive(Debug, Clone, Copy)]
pub struct InliningVisitor {
    max_depth: usize,
}

impl Default for InliningVisitor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl InliningVisitor {
    /// Create an inliner with a nesting bound.
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    fn inline(
        &self,
        expr: Expr,
        context: &mut QueryProcessingContext,
        depth: usize,
    ) -> Result<Expr> {
        expr.try_transform_up(&mut |node| match node {
            Expr::Constant(Constant::Query(QueryRoot::Expression(inner))) => {
                if depth >= self.max_depth {
                    return Err(Error::DepthExceeded(self.max_depth));
                }
                let inner = parameterize(Arc::unwrap_or_clone(inner), context);
                self.inline(inner, context, depth + 1)
            }
            node => Ok(fold(node)),
        })
    }
}

impl ExpressionVisitor for InliningVisitor {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn visit(&self, expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr> {
        self.inline(expr, context, 0)
    }
}

/// Check if a node can be evaluated once its children are literals.
fn is_foldable(expr: &Expr) -> bool {
    match expr {
        Expr::Binary { .. } | Expr::Unary { .. } | Expr::Conditional { .. } => true,
        Expr::Call { method, .. } => !matches!(
            method,
            Method::Query(_) | Method::Custom(_) | Method::Contains
        ),
        _ => false,
    }
}

/// Replace a node whose operands are all literals with its value.
///
/// Evaluation failures (division by zero, invalid conversions) leave the
/// node for the backend to report.
fn fold(expr: Expr) -> Expr {
    if !is_foldable(&expr) || !expr.children().iter().all(|c| c.as_literal().is_some()) {
        return expr;
    }
    match evaluate(&expr, &Env::new(&[])) {
        Ok(Object::Value(value)) => Expr::literal(value),
        Ok(Object::Null) => Expr::null(),
        _ => expr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::descriptor::DescriptorSet;
    use quarry_expr::{Query, QueryMethod, Value};

    fn context() -> QueryProcessingContext {
        QueryProcessingContext::new(Arc::new(DescriptorSet::new()), QueryOptions::default())
    }

    #[test]
    fn test_splices_composed_queryable() {
        let active = Query::from("User")
            .filter(|u| u.member("active").eq(Expr::captured(true)))
            .into_queryable();
        let outer = Query::from_expr(active)
            .filter(|u| u.member("id").eq(Expr::captured(3i32)))
            .into_expr();

        let mut context = context();
        let outer = parameterize(outer, &mut context);
        let inlined = InliningVisitor::default().visit(outer, &mut context).unwrap();

        assert!(!inlined.any(&|e| matches!(
            e,
            Expr::Constant(Constant::Query(QueryRoot::Expression(_)))
        )));
        // Outer capture first, then the spliced one.
        assert_eq!(context.parameters().len(), 2);
        assert_eq!(
            context.parameters()[1].1.as_scalar(),
            Some(&Value::Bool(true))
        );

        let (method, args) = inlined.as_query_call().unwrap();
        assert_eq!(method, QueryMethod::Where);
        assert_eq!(args[0].as_query_call().map(|(m, _)| m), Some(QueryMethod::Where));
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut expr = Expr::entity_set("User");
        for _ in 0..5 {
            expr = Expr::queryable(expr);
        }
        let err = InliningVisitor::new(3)
            .visit(expr, &mut context())
            .unwrap_err();
        assert!(matches!(err, Error::DepthExceeded(3)));
    }

    #[test]
    fn test_folds_literal_arithmetic() {
        let expr = Expr::literal(2i32).add(Expr::literal(3i32)).eq(Expr::literal(5i32));
        let out = InliningVisitor::default().visit(expr, &mut context()).unwrap();
        assert_eq!(out, Expr::literal(true));
    }

    #[test]
    fn test_leaves_failing_evaluation_in_place() {
        let expr = Expr::binary(
            quarry_expr::BinaryOp::Divide,
            Expr::literal(1i32),
            Expr::literal(0i32),
        );
        let out = InliningVisitor::default()
            .visit(expr.clone(), &mut context())
            .unwrap();
        assert_eq!(out, expr);
    }
}
