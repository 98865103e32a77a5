//! Query filter composition.

use quarry_expr::{Constant, Expr, QueryMethod, QueryRoot};

use super::freshen;
use crate::context::QueryProcessingContext;
use crate::error::Result;
use crate::visitor::ExpressionVisitor;

/// Wraps every unfiltered entity-set root in its entity's query filter.
///
/// The descriptor set already drops soft-delete predicates when filters
/// are ignored, so only type restrictions of derived entities remain in
/// that case. Roots are marked filtered either way, which makes the pass
/// idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryFilterComposingVisitor;

impl ExpressionVisitor for QueryFilterComposingVisitor {
    fn name(&self) -> &'static str {
        "query_filter"
    }

    fn visit(&self, expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr> {
        let descriptors = context.descriptors();
        Ok(expr.transform_up(&mut |node| {
            let unfiltered = node
                .as_entity_set()
                .filter(|(_, filtered)| !filtered)
                .map(|(entity, _)| entity.to_string());
            let Some(entity) = unfiltered else {
                return node;
            };
            let root = Expr::Constant(Constant::Query(QueryRoot::EntitySet {
                entity: entity.clone(),
                filtered: true,
            }));
            match descriptors.query_filter(&entity) {
                Some(filter) => Expr::query_call(
                    QueryMethod::Where,
                    vec![root, Expr::Lambda(freshen(filter))],
                ),
                None => root,
            }
        }))
    }
}
