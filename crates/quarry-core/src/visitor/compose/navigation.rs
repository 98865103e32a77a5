//! Navigation expansion.
//!
//! Collection navigations become their expansion template with the
//! accessed object substituted: a correlated sequence the compiler turns
//! into a sub-query.
//!
//! Reference navigations reached from the parameter of a query operator's
//! lambda become joins on the operator's source. The joined element is a
//! transparent `new { outer, inner }` record; the lambda is rewritten over
//! it, and element-preserving operators get a `Select` restoring the
//! original element:
//!
//! ```text
//! posts.Where(p => p.author.name == "ann")
//!   => posts.LeftJoin(users, o => o.author_id, i => i.id, (o, i) => new { outer = o, inner = i })
//!           .Where(t => t.inner.name == "ann")
//!           .Select(t => t.outer)
//! ```
//!
//! Reference navigations reached any other way expand to their template
//! as a correlated single-row sub-query.

use std::sync::Arc;

use quarry_expr::{fresh_parameter, Expr, Lambda, Parameter, QueryMethod, Type};

use super::{freshen, freshen_expr, replace};
use crate::context::QueryProcessingContext;
use crate::descriptor::{DescriptorSet, NavigationDescriptor};
use crate::error::Result;
use crate::visitor::ExpressionVisitor;

/// Expands navigation members into joins and sub-queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigationComposingVisitor;

impl ExpressionVisitor for NavigationComposingVisitor {
    fn name(&self) -> &'static str {
        "navigation"
    }

    fn visit(&self, expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr> {
        let descriptors = context.descriptors();
        let expr = expr.transform_up(&mut |node| expand_collection(node, descriptors));
        let expr = expr.transform_up(&mut |node| compose_query(node, descriptors));
        Ok(expr.transform_up(&mut |node| expand_reference(node, descriptors)))
    }
}

/// The navigation behind a member access, if any.
fn navigation_of<'a>(
    target: &Expr,
    member: &str,
    descriptors: &'a DescriptorSet,
) -> Option<&'a Arc<NavigationDescriptor>> {
    let ty = target.ty();
    let entity = ty.entity_name()?;
    descriptors.navigation(entity, member)
}

fn expand_collection(node: Expr, descriptors: &DescriptorSet) -> Expr {
    match node {
        Expr::Member { target, name, ty } => match navigation_of(&target, &name, descriptors) {
            Some(navigation) if navigation.is_collection => {
                freshen(&navigation.expansion_template).apply(&[*target])
            }
            _ => Expr::Member { target, name, ty },
        },
        other => other,
    }
}

fn expand_reference(node: Expr, descriptors: &DescriptorSet) -> Expr {
    match node {
        Expr::Member { target, name, ty } => match navigation_of(&target, &name, descriptors) {
            Some(navigation) if !navigation.is_collection => {
                freshen(&navigation.expansion_template).apply(&[*target])
            }
            _ => Expr::Member { target, name, ty },
        },
        other => other,
    }
}

/// Operators whose lambda argument is expanded into joins.
fn expands_lambda(method: QueryMethod) -> bool {
    matches!(
        method,
        QueryMethod::Where
            | QueryMethod::Select
            | QueryMethod::OrderBy
            | QueryMethod::OrderByDescending
            | QueryMethod::ThenBy
            | QueryMethod::ThenByDescending
            | QueryMethod::Sum
            | QueryMethod::Min
            | QueryMethod::Max
            | QueryMethod::Average
            | QueryMethod::All
    )
}

/// Operators whose result elements are the source elements.
fn preserves_element(method: QueryMethod) -> bool {
    matches!(
        method,
        QueryMethod::Where
            | QueryMethod::OrderBy
            | QueryMethod::OrderByDescending
            | QueryMethod::ThenBy
            | QueryMethod::ThenByDescending
    )
}

fn compose_query(node: Expr, descriptors: &DescriptorSet) -> Expr {
    let (method, args) = match node.as_query_call() {
        Some((method, args)) => (method, args.to_vec()),
        None => return node,
    };
    if method.takes_predicate() && args.len() == 2 {
        // `First(src, pred)` => `First(Where(src, pred))`
        let filtered = compose_query(Expr::query_call(QueryMethod::Where, args), descriptors);
        return Expr::query_call(method, vec![filtered]);
    }
    if !expands_lambda(method) {
        return node;
    }
    join_navigations(method, args, descriptors).unwrap_or(node)
}

/// Check if `expr` is `param` followed by record member reads only.
fn is_plain_path(expr: &Expr, param: &str) -> bool {
    match expr {
        Expr::Parameter(p) => p.slot.is_none() && p.name == param,
        Expr::Member { target, .. } => {
            matches!(target.ty(), Type::Record(_)) && is_plain_path(target, param)
        }
        _ => false,
    }
}

/// The first reference navigation read from a plain path of `param`.
fn find_reference(
    expr: &Expr,
    param: &str,
    descriptors: &DescriptorSet,
) -> Option<(Expr, Arc<NavigationDescriptor>)> {
    match expr {
        Expr::Lambda(lambda) if lambda.params.iter().any(|p| p.name == param) => None,
        Expr::Member { target, name, .. } if is_plain_path(target, param) => {
            match navigation_of(target, name, descriptors) {
                Some(navigation) if !navigation.is_collection => {
                    Some((expr.clone(), navigation.clone()))
                }
                _ => None,
            }
        }
        _ => expr
            .children()
            .into_iter()
            .find_map(|child| find_reference(child, param, descriptors)),
    }
}

/// Join every reference navigation read from the lambda parameter of
/// `method(args[0], args[1], ..)`. `None` if there is nothing to expand.
fn join_navigations(
    method: QueryMethod,
    mut args: Vec<Expr>,
    descriptors: &DescriptorSet,
) -> Option<Expr> {
    let lambda = args.get(1).and_then(Expr::as_lambda)?;
    let mut param: Parameter = lambda.param()?.clone();
    let mut body = (*lambda.body).clone();
    let mut source = args[0].clone();
    let mut root_image = param.to_expr();
    // Paths that may be null because they come out of a left join.
    let mut nullable: Vec<Expr> = Vec::new();
    let mut expanded = false;

    while let Some((access, navigation)) = find_reference(&body, &param.name, descriptors) {
        let Expr::Member { target: path, .. } = &access else {
            break;
        };
        let path = (**path).clone();
        let element = param.ty.clone();
        let target = Type::entity(&navigation.target);
        let left = navigation.is_nullable || nullable.contains(&path);

        let o = fresh_parameter(element.clone());
        let i = fresh_parameter(target.clone());
        let outer_key = Lambda::new(
            vec![o.clone()],
            navigation
                .outer_key_selector
                .apply(&[path.clone().substitute(&param.name, &o.to_expr())]),
        );
        source = Expr::query_call(
            if left {
                QueryMethod::LeftJoin
            } else {
                QueryMethod::Join
            },
            vec![
                source,
                freshen_expr(navigation.target_source.clone()),
                Expr::Lambda(outer_key),
                Expr::Lambda(freshen(&navigation.inner_key_selector)),
                Expr::lambda(
                    vec![o.clone(), i.clone()],
                    Expr::new_record(vec![
                        ("outer".into(), o.to_expr()),
                        ("inner".into(), i.to_expr()),
                    ]),
                ),
            ],
        );

        let t = fresh_parameter(Type::Record(vec![
            ("outer".into(), element.clone()),
            ("inner".into(), target.clone()),
        ]));
        let outer = t.to_expr().member_typed("outer", element);
        let inner = t.to_expr().member_typed("inner", target);

        body = replace(body, &access, &inner).substitute(&param.name, &outer);
        root_image = root_image.substitute(&param.name, &outer);
        nullable = nullable
            .into_iter()
            .map(|p| p.substitute(&param.name, &outer))
            .collect();
        if left {
            nullable.push(inner);
        }
        param = t;
        expanded = true;
    }

    if !expanded {
        return None;
    }
    args[0] = source;
    args[1] = Expr::lambda(vec![param.clone()], body);
    let composed = Expr::query_call(method, args);
    if preserves_element(method) {
        Some(Expr::query_call(
            QueryMethod::Select,
            vec![composed, Expr::lambda(vec![param], root_image)],
        ))
    } else {
        Some(composed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::testing::blog_context;
    use crate::visitor::rewrite::MemberBindingVisitor;
    use crate::visitor::structurally_equal;
    use quarry_expr::Query;

    fn compose(expr: Expr) -> Expr {
        let mut context = blog_context(QueryOptions::default());
        let bound = MemberBindingVisitor.visit(expr, &mut context).unwrap();
        NavigationComposingVisitor.visit(bound, &mut context).unwrap()
    }

    fn contains_method(expr: &Expr, method: QueryMethod) -> bool {
        expr.any(&|e| matches!(e.as_query_call(), Some((m, _)) if m == method))
    }

    #[test]
    fn test_reference_navigation_in_filter_becomes_join() {
        let out = compose(
            Query::from("Post")
                .filter(|p| p.member("author").member("name").eq(Expr::literal("ann")))
                .into_expr(),
        );
        let (method, args) = out.as_query_call().unwrap();
        assert_eq!(method, QueryMethod::Select);
        let (inner, inner_args) = args[0].as_query_call().unwrap();
        assert_eq!(inner, QueryMethod::Where);
        let (join, _) = inner_args[0].as_query_call().unwrap();
        assert_eq!(join, QueryMethod::LeftJoin);
        assert_eq!(out.ty(), Type::sequence(Type::entity("Post")));
    }

    #[test]
    fn test_required_navigation_uses_inner_join() {
        let out = compose(
            Query::from("Comment")
                .select(|c| c.member("post").member("title"))
                .into_expr(),
        );
        let (method, args) = out.as_query_call().unwrap();
        assert_eq!(method, QueryMethod::Select);
        let (join, _) = args[0].as_query_call().unwrap();
        assert_eq!(join, QueryMethod::Join);
        assert_eq!(out.ty(), Type::sequence(Type::string()));
    }

    #[test]
    fn test_chained_navigation_left_joins_after_optional_hop() {
        let out = compose(
            Query::from("Comment")
                .select(|c| c.member("post").member("author").member("name"))
                .into_expr(),
        );
        let (_, args) = out.as_query_call().unwrap();
        let (second, second_args) = args[0].as_query_call().unwrap();
        assert_eq!(second, QueryMethod::LeftJoin);
        let (first, _) = second_args[0].as_query_call().unwrap();
        assert_eq!(first, QueryMethod::Join);
    }

    #[test]
    fn test_collection_navigation_becomes_subquery() {
        let out = compose(
            Query::from("User")
                .select(|u| {
                    Expr::query_call(QueryMethod::Count, vec![u.member("posts")])
                })
                .into_expr(),
        );
        assert!(!contains_method(&out, QueryMethod::Join));
        assert!(!contains_method(&out, QueryMethod::LeftJoin));
        assert!(contains_method(&out, QueryMethod::Count));
        assert!(contains_method(&out, QueryMethod::Where));
    }

    #[test]
    fn test_predicate_terminals_are_split() {
        let out = compose(Query::from("Post").any_where(|p| p.member("views").gt(Expr::literal(5i32))));
        let (method, args) = out.as_query_call().unwrap();
        assert_eq!(method, QueryMethod::Any);
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].as_query_call().unwrap().0, QueryMethod::Where);
    }

    #[test]
    fn test_idempotent() {
        let once = compose(
            Query::from("Post")
                .filter(|p| p.member("author").member("name").eq(Expr::literal("ann")))
                .order_by(|p| p.member("title"))
                .into_expr(),
        );
        let mut context = blog_context(QueryOptions::default());
        let twice = NavigationComposingVisitor
            .visit(once.clone(), &mut context)
            .unwrap();
        assert!(structurally_equal(&once, &twice));
    }
}
