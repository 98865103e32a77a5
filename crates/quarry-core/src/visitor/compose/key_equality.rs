//! Entity comparison rewriting.

use quarry_expr::{BinaryOp, Expr, Type};

use super::key_parts;
use crate::context::QueryProcessingContext;
use crate::descriptor::DescriptorSet;
use crate::error::{Error, Result};
use crate::visitor::ExpressionVisitor;

/// Rewrites `==` and `!=` between entity operands into key comparisons.
///
/// A reference navigation compares through its foreign key, so
/// `p.author == null` never needs a join. Any other entity operand
/// compares through its primary key. Composite keys pair up by position.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyEqualityRewritingVisitor;

impl ExpressionVisitor for KeyEqualityRewritingVisitor {
    fn name(&self) -> &'static str {
        "key_equality"
    }

    fn visit(&self, expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr> {
        let descriptors = context.descriptors();
        expr.try_transform_up(&mut |node| match node {
            Expr::Binary {
                op: op @ (BinaryOp::Equal | BinaryOp::NotEqual),
                left,
                right,
            } if is_entity(&left) || is_entity(&right) => {
                rewrite(op, *left, *right, descriptors)
            }
            other => Ok(other),
        })
    }
}

fn is_entity(expr: &Expr) -> bool {
    matches!(expr.ty(), Type::Entity(_))
}

fn rewrite(op: BinaryOp, left: Expr, right: Expr, descriptors: &DescriptorSet) -> Result<Expr> {
    let (combine, pair): (fn(Expr, Expr) -> Expr, fn(Expr, Expr) -> Expr) = match op {
        BinaryOp::Equal => (Expr::and, Expr::eq),
        _ => (Expr::or, Expr::ne),
    };

    if left.is_null_literal() || right.is_null_literal() {
        let operand = if left.is_null_literal() { right } else { left };
        // Absent as soon as one key part is null.
        let (combine, pair): (fn(Expr, Expr) -> Expr, fn(Expr, Expr) -> Expr) = match op {
            BinaryOp::Equal => (Expr::or, Expr::eq),
            _ => (Expr::and, Expr::ne),
        };
        return Ok(key(operand, descriptors)?
            .into_iter()
            .map(|part| pair(part, Expr::null()))
            .reduce(combine)
            .unwrap_or_else(|| Expr::literal(op == BinaryOp::NotEqual)));
    }

    if !(is_entity(&left) && is_entity(&right)) {
        return Ok(Expr::binary(op, left, right));
    }
    let left = key(left, descriptors)?;
    let right = key(right, descriptors)?;
    if left.len() != right.len() {
        return Err(Error::Compile(format!(
            "cannot compare keys of {} and {} parts",
            left.len(),
            right.len()
        )));
    }
    Ok(left
        .into_iter()
        .zip(right)
        .map(|(l, r)| pair(l, r))
        .reduce(combine)
        .unwrap_or_else(|| Expr::literal(op == BinaryOp::Equal)))
}

/// The key parts identifying an entity operand.
fn key(operand: Expr, descriptors: &DescriptorSet) -> Result<Vec<Expr>> {
    if let Expr::Member { target, name, .. } = &operand {
        let navigation = target
            .ty()
            .entity_name()
            .and_then(|entity| descriptors.navigation(entity, name))
            .filter(|navigation| !navigation.is_collection);
        if let Some(navigation) = navigation {
            return Ok(key_parts(
                navigation.outer_key_selector.apply(&[(**target).clone()]),
            ));
        }
    }
    let entity = match operand.ty() {
        Type::Entity(entity) => entity,
        _ => return Ok(vec![operand]),
    };
    let primary_key = descriptors.primary_key(&entity)?;
    Ok(key_parts(primary_key.key_selector.apply(&[operand])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::testing::blog_context;

    fn rewrite_one(expr: Expr) -> Expr {
        let mut context = blog_context(QueryOptions::default());
        KeyEqualityRewritingVisitor.visit(expr, &mut context).unwrap()
    }

    fn post() -> Expr {
        Expr::param("p", Type::entity("Post"))
    }

    fn author() -> Expr {
        post().member_typed("author", Type::entity("User"))
    }

    #[test]
    fn test_navigation_against_null_uses_foreign_key() {
        let out = rewrite_one(author().eq(Expr::null()));
        let expected = post()
            .member_typed("author_id", Type::Nullable(quarry_expr::ScalarType::Int64))
            .eq(Expr::null());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_entity_against_entity_uses_keys() {
        let u = Expr::param("u", Type::entity("User"));
        let out = rewrite_one(author().ne(u.clone()));
        let expected = post()
            .member_typed("author_id", Type::Nullable(quarry_expr::ScalarType::Int64))
            .ne(u.member_typed("id", Type::int64()));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_scalars_untouched() {
        let expr = post()
            .member_typed("views", Type::int32())
            .eq(Expr::literal(3i32));
        assert_eq!(rewrite_one(expr.clone()), expr);
    }
}
