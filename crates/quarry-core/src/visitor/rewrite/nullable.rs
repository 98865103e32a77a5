//! Nullable member rewriting.

use quarry_expr::{BinaryOp, Expr, Method, Type, UnaryOp};

use crate::context::QueryProcessingContext;
use crate::error::Result;
use crate::eval::default_value;
use crate::visitor::ExpressionVisitor;

/// Rewrites `x.HasValue`, `x.Value` and `x.GetValueOrDefault(..)` on
/// nullable scalars into null tests, conversions and coalescing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableMemberVisitor;

impl ExpressionVisitor for NullableMemberVisitor {
    fn name(&self) -> &'static str {
        "nullable_member"
    }

    fn visit(&self, expr: Expr, _context: &mut QueryProcessingContext) -> Result<Expr> {
        Ok(expr.transform_up(&mut rewrite))
    }
}

fn rewrite(expr: Expr) -> Expr {
    match expr {
        Expr::Member { target, name, ty } => {
            let target_ty = target.ty();
            if name == "HasValue" && target_ty.scalar().is_some() {
                return (*target).ne(Expr::null());
            }
            if name == "Value" {
                match target_ty {
                    Type::Nullable(scalar) => {
                        return Expr::unary(UnaryOp::Convert(scalar), *target)
                    }
                    Type::Scalar(_) => return *target,
                    _ => {}
                }
            }
            Expr::Member { target, name, ty }
        }
        Expr::Call {
            method: Method::GetValueOrDefault,
            target: Some(target),
            mut args,
            ty,
        } => {
            let fallback = match (args.pop(), target.ty().scalar()) {
                (Some(fallback), _) => fallback,
                (None, Some(scalar)) => Expr::literal(default_value(scalar)),
                (None, None) => {
                    return Expr::Call {
                        method: Method::GetValueOrDefault,
                        target: Some(target),
                        args,
                        ty,
                    }
                }
            };
            Expr::binary(BinaryOp::Coalesce, *target, fallback)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::testing::blog_context;
    use quarry_expr::{ScalarType, Value};

    fn age() -> Expr {
        Expr::param("u", Type::entity("User"))
            .member_typed("age", Type::Nullable(ScalarType::Int32))
    }

    fn rewrite_one(expr: Expr) -> Expr {
        let mut context = blog_context(QueryOptions::default());
        NullableMemberVisitor.visit(expr, &mut context).unwrap()
    }

    #[test]
    fn test_has_value_becomes_null_test() {
        let out = rewrite_one(age().member_typed("HasValue", Type::bool()));
        assert_eq!(out, age().ne(Expr::null()));
    }

    #[test]
    fn test_value_unwraps_type() {
        let out = rewrite_one(age().member_typed("Value", Type::int32()));
        assert_eq!(out.ty(), Type::int32());
        assert!(matches!(out, Expr::Unary { op: UnaryOp::Convert(ScalarType::Int32), .. }));
    }

    #[test]
    fn test_get_value_or_default_coalesces() {
        let call = age().call(Method::GetValueOrDefault, vec![], Type::int32());
        let out = rewrite_one(call);
        assert_eq!(
            out,
            Expr::binary(BinaryOp::Coalesce, age(), Expr::literal(Value::Int32(0)))
        );
        assert_eq!(out.ty(), Type::int32());
    }
}
