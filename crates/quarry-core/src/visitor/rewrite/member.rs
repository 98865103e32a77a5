//! Date and string member translation.

use quarry_expr::{DatePart, Expr, Method, ScalarType};

use crate::context::QueryProcessingContext;
use crate::error::Result;
use crate::visitor::ExpressionVisitor;

/// Canonicalizes `s.Length`, `d.Year` (and the other date parts) and
/// string `Contains` into the method calls the compiler translates.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberTranslationVisitor;

impl ExpressionVisitor for MemberTranslationVisitor {
    fn name(&self) -> &'static str {
        "member_translation"
    }

    fn visit(&self, expr: Expr, _context: &mut QueryProcessingContext) -> Result<Expr> {
        Ok(expr.transform_up(&mut rewrite))
    }
}

fn rewrite(expr: Expr) -> Expr {
    match expr {
        Expr::Member { target, name, ty } => {
            let method = match target.ty().scalar() {
                Some(ScalarType::String) if name == "Length" => Some(Method::StringLength),
                Some(ScalarType::Timestamp) => DatePart::from_member(&name).map(Method::DatePart),
                _ => None,
            };
            match method {
                Some(method) => (*target).call(method, Vec::new(), ty),
                None => Expr::Member { target, name, ty },
            }
        }
        Expr::Call {
            method: Method::Contains,
            target: Some(target),
            args,
            ty,
        } if target.ty().scalar() == Some(ScalarType::String) => Expr::Call {
            method: Method::StringContains,
            target: Some(target),
            args,
            ty,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::testing::blog_context;
    use quarry_expr::Type;

    fn post() -> Expr {
        Expr::param("p", Type::entity("Post"))
    }

    fn translate(expr: Expr) -> Expr {
        let mut context = blog_context(QueryOptions::default());
        MemberTranslationVisitor.visit(expr, &mut context).unwrap()
    }

    #[test]
    fn test_string_length() {
        let title = post().member_typed("title", Type::string());
        let out = translate(title.clone().member_typed("Length", Type::int32()));
        assert_eq!(out, title.call(Method::StringLength, vec![], Type::int32()));
    }

    #[test]
    fn test_date_parts() {
        let published = post().member_typed(
            "published",
            Type::Nullable(ScalarType::Timestamp),
        );
        let out = translate(
            published
                .clone()
                .member_typed("Month", Type::Nullable(ScalarType::Int32)),
        );
        assert!(matches!(
            out,
            Expr::Call { method: Method::DatePart(DatePart::Month), .. }
        ));
        assert_eq!(out.ty(), Type::Nullable(ScalarType::Int32));
    }

    #[test]
    fn test_string_contains() {
        let title = post().member_typed("title", Type::string());
        let out = translate(title.call(Method::Contains, vec![Expr::literal("rust")], Type::bool()));
        assert!(matches!(out, Expr::Call { method: Method::StringContains, .. }));
    }

    #[test]
    fn test_other_members_untouched() {
        let expr = post().member_typed("views", Type::int32());
        assert_eq!(translate(expr.clone()), expr);
    }
}
