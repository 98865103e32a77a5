//! Composing visitors.
//!
//! These passes splice model knowledge into the tree: query filters over
//! entity-set roots, eager loading, key comparisons and navigation
//! expansion. They run in a fixed order, each exactly once, with the
//! optimizing set in between (see [`VisitorPipeline::compose`]).
//!
//! [`VisitorPipeline::compose`]: super::VisitorPipeline::compose

mod include;
mod key_equality;
mod navigation;
mod query_filter;

use quarry_expr::{fresh_parameter, Expr, Lambda};

use super::ExpressionVisitor;

pub use include::IncludeComposingVisitor;
pub use key_equality::KeyEqualityRewritingVisitor;
pub use navigation::NavigationComposingVisitor;
pub use query_filter::QueryFilterComposingVisitor;

/// The standard composing list, in application order.
pub fn standard() -> Vec<Box<dyn ExpressionVisitor>> {
    vec![
        Box::new(QueryFilterComposingVisitor),
        Box::new(IncludeComposingVisitor),
        Box::new(KeyEqualityRewritingVisitor),
        Box::new(NavigationComposingVisitor),
    ]
}

/// Rename every lambda binder in `expr` to a fresh parameter.
///
/// Descriptor lambdas are spliced into queries many times over; renaming
/// keeps two copies from capturing each other's parameters.
pub(crate) fn freshen_expr(expr: Expr) -> Expr {
    match expr {
        Expr::Lambda(Lambda { params, body }) => {
            let mut body = freshen_expr(*body);
            let params = params
                .into_iter()
                .map(|param| {
                    let fresh = fresh_parameter(param.ty.clone());
                    body = body.clone().substitute(&param.name, &fresh.to_expr());
                    fresh
                })
                .collect();
            Expr::lambda(params, body)
        }
        other => other.map_children(freshen_expr),
    }
}

/// [`freshen_expr`] for a lambda.
pub(crate) fn freshen(lambda: &Lambda) -> Lambda {
    match freshen_expr(Expr::Lambda(lambda.clone())) {
        Expr::Lambda(fresh) => fresh,
        _ => lambda.clone(),
    }
}

/// Replace every occurrence of `from` in `expr` with `to`.
pub(crate) fn replace(expr: Expr, from: &Expr, to: &Expr) -> Expr {
    if expr == *from {
        to.clone()
    } else {
        expr.map_children(|child| replace(child, from, to))
    }
}

/// Split a composite key into its parts: the members of a `new { .. }`
/// body, or the single expression otherwise.
pub(crate) fn key_parts(key: Expr) -> Vec<Expr> {
    match key {
        Expr::New { members } => members.into_iter().map(|(_, value)| value).collect(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_expr::{Parameter, Type};

    #[test]
    fn test_freshen_renames_nested_binders() {
        let a = Parameter::new("a", Type::entity("User"));
        let b = Parameter::new("b", Type::entity("Post"));
        let inner = Expr::lambda(vec![b.clone()], b.to_expr().member("id").eq(a.to_expr().member("id")));
        let outer = Lambda::new(vec![a.clone()], inner);

        let fresh = freshen(&outer);
        assert_ne!(fresh.params[0].name, "a");
        assert!(!fresh.body.references_parameter("a"));
        let Expr::Lambda(inner) = &*fresh.body else {
            panic!("expected nested lambda");
        };
        assert_ne!(inner.params[0].name, "b");
        assert!(inner.body.references_parameter(&fresh.params[0].name));
        assert!(crate::visitor::structurally_equal(
            &Expr::Lambda(outer),
            &Expr::Lambda(fresh)
        ));
    }

    #[test]
    fn test_key_parts() {
        let k = Expr::param("k", Type::entity("Line"));
        let composite = Expr::new_record(vec![
            ("a".into(), k.clone().member("a")),
            ("b".into(), k.clone().member("b")),
        ]);
        assert_eq!(key_parts(composite).len(), 2);
        assert_eq!(key_parts(k.clone().member("a")), vec![k.member("a")]);
    }
}
