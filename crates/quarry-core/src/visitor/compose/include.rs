//! Eager-load composition.

use quarry_expr::{fresh_parameter, Expr, Lambda, QueryMethod, Type};

use super::{freshen, freshen_expr};
use crate::context::QueryProcessingContext;
use crate::descriptor::{DescriptorSet, NavigationDescriptor};
use crate::error::{Error, Result};
use crate::visitor::ExpressionVisitor;

/// Expands `Include(source, e => e.Navigation)`.
///
/// A reference navigation joins the target (left join when the navigation
/// is optional) and attaches the joined entity with an [`Expr::Include`]
/// node. A collection navigation attaches the expansion template, which
/// the compiler loads through a grouped left join.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeComposingVisitor;

impl ExpressionVisitor for IncludeComposingVisitor {
    fn name(&self) -> &'static str {
        "include"
    }

    fn visit(&self, expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr> {
        let descriptors = context.descriptors();
        expr.try_transform_up(&mut |node| {
            if matches!(node.as_query_call(), Some((QueryMethod::Include, _))) {
                expand(node, descriptors)
            } else {
                Ok(node)
            }
        })
    }
}

fn expand(node: Expr, descriptors: &DescriptorSet) -> Result<Expr> {
    let Expr::Call { mut args, .. } = node else {
        return Ok(node);
    };
    let (Some(selector), Some(source)) = (args.pop(), args.pop()) else {
        return Err(Error::Compile("Include expects a source and a selector".into()));
    };
    let element = source.ty().element().cloned().unwrap_or(Type::Unknown);
    let entity = element
        .entity_name()
        .ok_or_else(|| Error::untranslatable("Include over a non-entity sequence"))?
        .to_string();
    let member = match selector.as_lambda().map(|l| &*l.body) {
        Some(Expr::Member { name, .. }) => name.clone(),
        _ => {
            return Err(Error::untranslatable(
                "Include selector must be a navigation access",
            ))
        }
    };
    let navigation = descriptors
        .navigation(&entity, &member)
        .ok_or_else(|| Error::UnknownMember {
            entity: entity.clone(),
            member: member.clone(),
        })?;

    if navigation.is_collection {
        Ok(include_collection(source, element, navigation))
    } else {
        Ok(include_reference(source, element, navigation))
    }
}

fn include_reference(source: Expr, element: Type, navigation: &NavigationDescriptor) -> Expr {
    let target = Type::entity(&navigation.target);
    let o = fresh_parameter(element.clone());
    let i = fresh_parameter(target.clone());
    let method = if navigation.is_nullable {
        QueryMethod::LeftJoin
    } else {
        QueryMethod::Join
    };
    let joined = Expr::query_call(
        method,
        vec![
            source,
            freshen_expr(navigation.target_source.clone()),
            Expr::Lambda(freshen(&navigation.outer_key_selector)),
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
    let attach = Expr::Include {
        entity: Box::new(t.to_expr().member_typed("outer", element)),
        member: navigation.member.clone(),
        value: Box::new(t.to_expr().member_typed("inner", target)),
    };
    Expr::query_call(QueryMethod::Select, vec![joined, Expr::lambda(vec![t], attach)])
}

fn include_collection(source: Expr, element: Type, navigation: &NavigationDescriptor) -> Expr {
    let e = fresh_parameter(element);
    let template: Lambda = freshen(&navigation.expansion_template);
    let attach = Expr::Include {
        entity: Box::new(e.to_expr()),
        member: navigation.member.clone(),
        value: Box::new(template.apply(&[e.to_expr()])),
    };
    Expr::query_call(QueryMethod::Select, vec![source, Expr::lambda(vec![e], attach)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::testing::blog_context;
    use quarry_expr::Query;

    fn compose(expr: Expr) -> Result<Expr> {
        let mut context = blog_context(QueryOptions::default());
        IncludeComposingVisitor.visit(expr, &mut context)
    }

    #[test]
    fn test_reference_include_left_joins_optional_navigation() {
        let out = compose(Query::from("Post").include("author").into_expr()).unwrap();
        let (method, args) = out.as_query_call().unwrap();
        assert_eq!(method, QueryMethod::Select);
        let (join, _) = args[0].as_query_call().unwrap();
        assert_eq!(join, QueryMethod::LeftJoin);

        let body = &*args[1].as_lambda().unwrap().body;
        assert!(matches!(body, Expr::Include { member, .. } if member == "author"));
        assert_eq!(out.ty(), Type::sequence(Type::entity("Post")));
    }

    #[test]
    fn test_required_reference_uses_inner_join() {
        let out = compose(Query::from("Comment").include("post").into_expr()).unwrap();
        let (_, args) = out.as_query_call().unwrap();
        let (join, _) = args[0].as_query_call().unwrap();
        assert_eq!(join, QueryMethod::Join);
    }

    #[test]
    fn test_collection_include_attaches_template() {
        let out = compose(Query::from("Post").include("comments").into_expr()).unwrap();
        let (method, args) = out.as_query_call().unwrap();
        assert_eq!(method, QueryMethod::Select);
        let Expr::Include { value, .. } = &*args[1].as_lambda().unwrap().body else {
            panic!("expected an include node");
        };
        assert_eq!(value.ty(), Type::sequence(Type::entity("Comment")));
    }

    #[test]
    fn test_unknown_navigation() {
        let err = compose(Query::from("Post").include("editor").into_expr()).unwrap_err();
        assert!(matches!(err, Error::UnknownMember { .. }));
    }
}
