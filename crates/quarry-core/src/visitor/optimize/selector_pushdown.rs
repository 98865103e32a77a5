//! Selector push-down.

use quarry_expr::{fresh_parameter, Expr, Lambda, Method, QueryMethod, Type};

use crate::context::QueryProcessingContext;
use crate::error::Result;
use crate::visitor::ExpressionVisitor;

/// Floats projections towards the top of a query and folds member reads
/// of records built in the same tree.
///
/// - `Select(Select(s, f), g)` becomes `Select(s, g∘f)`.
/// - `Where`, `OrderBy*` and `ThenBy*` over `Select(s, f)` move below it.
/// - Aggregates and joins over `Select(s, f)` absorb `f`.
/// - `new { m = x }.m` becomes `x`; a member read through an include node
///   reads the included entity or value.
/// - `First(s).m` becomes `First(Select(s, x => x.m))`.
/// - Identity selects disappear.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorPushdownVisitor;

impl ExpressionVisitor for SelectorPushdownVisitor {
    fn name(&self) -> &'static str {
        "selector_pushdown"
    }

    fn visit(&self, expr: Expr, _context: &mut QueryProcessingContext) -> Result<Expr> {
        Ok(expr.transform_up(&mut push))
    }
}

fn push(node: Expr) -> Expr {
    match node {
        Expr::Member { target, name, ty } => fold_member(*target, name, ty),
        Expr::Call {
            method: Method::Query(method),
            target: None,
            args,
            ty,
        } => match push_query(method, &args) {
            Some(pushed) => pushed,
            None => Expr::Call {
                method: Method::Query(method),
                target: None,
                args,
                ty,
            },
        },
        other => other,
    }
}

fn fold_member(target: Expr, name: String, ty: Type) -> Expr {
    match target {
        Expr::New { members } => match members.iter().position(|(n, _)| *n == name) {
            Some(index) => members.into_iter().nth(index).map(|(_, v)| v).unwrap_or_else(Expr::null),
            None => Expr::New { members }.member_typed(name, ty),
        },
        Expr::Include {
            entity,
            member,
            value,
        } => {
            if member == name {
                *value
            } else {
                entity.member_typed(name, ty)
            }
        }
        Expr::Call {
            method: Method::Query(method),
            target: None,
            args,
            ty: element,
        } if method.returns_element() && args.len() == 1 && is_structured(&element) => {
            let x = fresh_parameter(element);
            let ty = match method {
                QueryMethod::FirstOrDefault | QueryMethod::SingleOrDefault => ty.to_nullable(),
                _ => ty,
            };
            let selector = Expr::lambda(vec![x.clone()], x.to_expr().member_typed(name, ty));
            let mut args = args;
            let selected = Expr::query_call(QueryMethod::Select, vec![args.remove(0), selector]);
            Expr::query_call(method, vec![selected])
        }
        target => target.member_typed(name, ty),
    }
}

fn is_structured(ty: &Type) -> bool {
    matches!(ty, Type::Entity(_) | Type::Record(_))
}

/// A single-parameter lambda.
fn unary_lambda(expr: &Expr) -> Option<&Lambda> {
    expr.as_lambda().filter(|l| l.params.len() == 1)
}

/// `(source, selector)` of `Select(source, selector)`.
fn as_select(expr: &Expr) -> Option<(&Expr, &Lambda)> {
    match expr.as_query_call()? {
        (QueryMethod::Select, [source, selector]) => Some((source, unary_lambda(selector)?)),
        _ => None,
    }
}

fn is_identity(lambda: &Lambda) -> bool {
    match (lambda.param(), &*lambda.body) {
        (Some(p), Expr::Parameter(body)) => p == body,
        _ => false,
    }
}

fn call(method: QueryMethod, args: Vec<Expr>) -> Expr {
    Expr::query_call(method, args)
}

fn push_query(method: QueryMethod, args: &[Expr]) -> Option<Expr> {
    use QueryMethod::*;

    match (method, args) {
        (Select, [source, selector]) => {
            let g = unary_lambda(selector)?;
            if is_identity(g) {
                return Some(source.clone());
            }
            let (s, f) = as_select(source)?;
            Some(call(Select, vec![s.clone(), Expr::Lambda(g.compose(f))]))
        }
        (Where | OrderBy | OrderByDescending | ThenBy | ThenByDescending, [source, lambda]) => {
            let p = unary_lambda(lambda)?;
            let (s, f) = as_select(source)?;
            let moved = call(method, vec![s.clone(), Expr::Lambda(p.compose(f))]);
            Some(call(Select, vec![moved, Expr::Lambda(f.clone())]))
        }
        (Count | Any, [source]) => {
            let (s, _) = as_select(source)?;
            Some(call(method, vec![s.clone()]))
        }
        (Sum | Min | Max | Average, [source]) => {
            let (s, f) = as_select(source)?;
            Some(call(method, vec![s.clone(), Expr::Lambda(f.clone())]))
        }
        (Sum | Min | Max | Average | All, [source, lambda]) => {
            let g = unary_lambda(lambda)?;
            let (s, f) = as_select(source)?;
            Some(call(method, vec![s.clone(), Expr::Lambda(g.compose(f))]))
        }
        (Join | LeftJoin, [outer, inner, outer_key, inner_key, result]) => {
            let outer_key = unary_lambda(outer_key)?;
            let inner_key = unary_lambda(inner_key)?;
            let result = result.as_lambda().filter(|l| l.params.len() == 2)?;
            if let Some((s, f)) = as_select(outer) {
                let i = &result.params[1];
                let merged = Lambda::new(
                    vec![f.params[0].clone(), i.clone()],
                    result.apply(&[(*f.body).clone(), i.to_expr()]),
                );
                return Some(call(
                    method,
                    vec![
                        s.clone(),
                        inner.clone(),
                        Expr::Lambda(outer_key.compose(f)),
                        Expr::Lambda(inner_key.clone()),
                        Expr::Lambda(merged),
                    ],
                ));
            }
            // A left join may pair an outer element with no inner element,
            // which a projection of the inner element cannot represent.
            if method == LeftJoin {
                return None;
            }
            let (s, g) = as_select(inner)?;
            let o = &result.params[0];
            let merged = Lambda::new(
                vec![o.clone(), g.params[0].clone()],
                result.apply(&[o.to_expr(), (*g.body).clone()]),
            );
            Some(call(
                method,
                vec![
                    outer.clone(),
                    s.clone(),
                    Expr::Lambda(outer_key.clone()),
                    Expr::Lambda(inner_key.compose(g)),
                    Expr::Lambda(merged),
                ],
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::testing::blog_context;
    use crate::visitor::structurally_equal;
    use quarry_expr::{Parameter, Query};

    fn optimize(expr: Expr) -> Expr {
        let mut context = blog_context(QueryOptions::default());
        let mut expr = expr;
        loop {
            let next = SelectorPushdownVisitor.visit(expr.clone(), &mut context).unwrap();
            if next == expr {
                return next;
            }
            expr = next;
        }
    }

    fn post() -> Parameter {
        Parameter::new("p", Type::entity("Post"))
    }

    #[test]
    fn test_select_select_merges() {
        let expr = Query::from("Post")
            .select(|p| {
                Expr::new_record(vec![("t".into(), p.member_typed("title", Type::string()))])
            })
            .select(|r| r.member_typed("t", Type::string()))
            .into_expr();
        let out = optimize(expr);

        let p = post();
        let expected = Expr::query_call(
            QueryMethod::Select,
            vec![
                Expr::entity_set("Post"),
                Expr::lambda(vec![p.clone()], p.to_expr().member_typed("title", Type::string())),
            ],
        );
        assert!(structurally_equal(&out, &expected));
    }

    #[test]
    fn test_where_moves_below_select() {
        let expr = Query::from("Post")
            .select(|p| p.member_typed("views", Type::int32()))
            .filter(|v| v.gt(Expr::literal(10i32)))
            .into_expr();
        let out = optimize(expr);
        let (method, args) = out.as_query_call().unwrap();
        assert_eq!(method, QueryMethod::Select);
        assert_eq!(args[0].as_query_call().unwrap().0, QueryMethod::Where);
    }

    #[test]
    fn test_identity_select_removed() {
        let expr = Query::from("Post").select(|p| p).into_expr();
        assert_eq!(optimize(expr), Expr::entity_set("Post"));
    }

    #[test]
    fn test_include_member_reads_through() {
        let p = post().to_expr();
        let author = Expr::param("a", Type::entity("User"));
        let include = Expr::Include {
            entity: Box::new(p.clone()),
            member: "author".into(),
            value: Box::new(author.clone()),
        };
        assert_eq!(
            optimize(include.clone().member_typed("title", Type::string())),
            p.member_typed("title", Type::string())
        );
        assert_eq!(
            optimize(include.member_typed("author", Type::entity("User"))),
            author
        );
    }

    #[test]
    fn test_count_ignores_projection() {
        let expr = Query::from("Post")
            .select(|p| p.member_typed("title", Type::string()))
            .count();
        assert_eq!(
            optimize(expr),
            Expr::query_call(QueryMethod::Count, vec![Expr::entity_set("Post")])
        );
    }

    #[test]
    fn test_member_of_first_becomes_scalar_subquery() {
        let first = Query::from("User").first_or_default();
        let out = optimize(first.member_typed("name", Type::string()));
        let (method, args) = out.as_query_call().unwrap();
        assert_eq!(method, QueryMethod::FirstOrDefault);
        assert_eq!(args[0].as_query_call().unwrap().0, QueryMethod::Select);
        assert_eq!(out.ty(), Type::Nullable(quarry_expr::ScalarType::String));
    }
}
