//! Collection `Contains` rewriting.

use quarry_expr::{Expr, Method};

use super::translatability::TranslatabilityAnalyzer;
use crate::context::QueryProcessingContext;
use crate::error::Result;
use crate::visitor::ExpressionVisitor;

/// Rewrites `collection.Contains(item)` into an IN predicate when the
/// collection is translatable. Other calls are left for client-side
/// evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainsRewritingVisitor;

impl ExpressionVisitor for ContainsRewritingVisitor {
    fn name(&self) -> &'static str {
        "contains_rewriting"
    }

    fn visit(&self, expr: Expr, _context: &mut QueryProcessingContext) -> Result<Expr> {
        Ok(expr.transform_up(&mut rewrite))
    }
}

fn rewrite(expr: Expr) -> Expr {
    let analyzer = TranslatabilityAnalyzer;
    match expr {
        Expr::Call {
            method: Method::Contains,
            target,
            args,
            ty,
        } => {
            // Instance form `c.Contains(x)` or static form `Contains(c, x)`.
            let mut args = args;
            let pair = match (target, args.len()) {
                (Some(collection), 1) => args.pop().map(|item| (*collection, item)),
                (None, 2) => {
                    let item = args.pop();
                    args.pop().zip(item)
                }
                (target, _) => {
                    return Expr::Call {
                        method: Method::Contains,
                        target,
                        args,
                        ty,
                    }
                }
            };
            let Some((collection, item)) = pair else {
                return Expr::Call {
                    method: Method::Contains,
                    target: None,
                    args,
                    ty,
                };
            };
            if analyzer.is_translatable_collection(&collection) {
                Expr::In {
                    item: Box::new(item),
                    set: Box::new(collection),
                }
            } else {
                Expr::Call {
                    method: Method::Contains,
                    target: Some(Box::new(collection)),
                    args: vec![item],
                    ty,
                }
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::testing::blog_context;
    use quarry_expr::{Parameter, Query, Type};

    fn run(expr: Expr) -> Expr {
        let mut context = blog_context(QueryOptions::default());
        ContainsRewritingVisitor.visit(expr, &mut context).unwrap()
    }

    #[test]
    fn test_list_parameter_becomes_in() {
        let ids = Parameter::synthetic(0, Type::sequence(Type::int64()));
        let id = Expr::param("u", Type::entity("User")).member_typed("id", Type::int64());
        let out = run(ids.to_expr().call(Method::Contains, vec![id.clone()], Type::bool()));
        assert_eq!(
            out,
            Expr::In {
                item: Box::new(id),
                set: Box::new(ids.to_expr()),
            }
        );
    }

    #[test]
    fn test_static_form_becomes_in() {
        let authors = Query::from("User")
            .select(|u| u.member_typed("id", Type::int64()))
            .into_expr();
        let author_id = Expr::param("p", Type::entity("Post"))
            .member_typed("author_id", Type::Nullable(quarry_expr::ScalarType::Int64));
        let call = Expr::Call {
            method: Method::Contains,
            target: None,
            args: vec![authors, author_id],
            ty: Type::bool(),
        };
        assert!(matches!(run(call), Expr::In { .. }));
    }

    #[test]
    fn test_untranslatable_collection_left_alone() {
        let local = Expr::param("xs", Type::sequence(Type::int64()));
        let call = local.call(Method::Contains, vec![Expr::literal(1i64)], Type::bool());
        assert_eq!(run(call.clone()), call);
    }
}
