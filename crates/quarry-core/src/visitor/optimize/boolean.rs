//! Boolean simplification.

use quarry_expr::{BinaryOp, Expr, UnaryOp};

use crate::context::QueryProcessingContext;
use crate::error::Result;
use crate::visitor::ExpressionVisitor;

/// Simplifies predicates without changing their value under three-valued
/// logic.
///
/// Folds boolean literals out of `&&`, `||`, `!` and conditionals, pushes
/// negation down to comparisons (De Morgan), drops comparisons against
/// `true`/`false`, collapses duplicated operands and puts the cheaper
/// operand of `&&`/`||` first.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanOptimizingVisitor;

impl ExpressionVisitor for BooleanOptimizingVisitor {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn visit(&self, expr: Expr, _context: &mut QueryProcessingContext) -> Result<Expr> {
        Ok(expr.transform_up(&mut simplify))
    }
}

fn simplify(node: Expr) -> Expr {
    match node {
        Expr::Binary {
            op: BinaryOp::AndAlso,
            left,
            right,
        } => and(*left, *right),
        Expr::Binary {
            op: BinaryOp::OrElse,
            left,
            right,
        } => or(*left, *right),
        Expr::Binary {
            op: op @ (BinaryOp::Equal | BinaryOp::NotEqual),
            left,
            right,
        } => against_literal(op, *left, *right),
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => not(*operand),
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => {
            if test.as_bool_literal() == Some(true) {
                *if_true
            } else if test.as_bool_literal() == Some(false) || test.is_null_literal() {
                *if_false
            } else if if_true == if_false {
                *if_true
            } else {
                Expr::Conditional {
                    test,
                    if_true,
                    if_false,
                }
            }
        }
        other => other,
    }
}

fn and(left: Expr, right: Expr) -> Expr {
    match (left.as_bool_literal(), right.as_bool_literal()) {
        (Some(true), _) => right,
        (_, Some(true)) => left,
        (Some(false), _) | (_, Some(false)) => Expr::literal(false),
        _ if left == right => left,
        _ if right.node_count() < left.node_count() => right.and(left),
        _ => left.and(right),
    }
}

fn or(left: Expr, right: Expr) -> Expr {
    match (left.as_bool_literal(), right.as_bool_literal()) {
        (Some(false), _) => right,
        (_, Some(false)) => left,
        (Some(true), _) | (_, Some(true)) => Expr::literal(true),
        _ if left == right => left,
        _ if right.node_count() < left.node_count() => right.or(left),
        _ => left.or(right),
    }
}

fn not(operand: Expr) -> Expr {
    if let Some(b) = operand.as_bool_literal() {
        return Expr::literal(!b);
    }
    match operand {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: inner,
        } if inner.ty().is_bool() => *inner,
        Expr::Binary {
            op: BinaryOp::AndAlso,
            left,
            right,
        } => or(not(*left), not(*right)),
        Expr::Binary {
            op: BinaryOp::OrElse,
            left,
            right,
        } => and(not(*left), not(*right)),
        Expr::Binary { op, left, right } => match op.negate_comparison() {
            Some(negated) => Expr::binary(negated, *left, *right),
            None => Expr::binary(op, *left, *right).not(),
        },
        other => other.not(),
    }
}

/// `x == true` is `x`, `x == false` is `!x`, and so on for bool `x`.
fn against_literal(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let literal_first = left.as_bool_literal().is_some();
    let (literal, operand) = match (left.as_bool_literal(), right.as_bool_literal()) {
        (Some(b), None) => (b, right),
        (None, Some(b)) => (b, left),
        _ => return Expr::binary(op, left, right),
    };
    if !operand.ty().is_bool() {
        let literal = Expr::literal(literal);
        return if literal_first {
            Expr::binary(op, literal, operand)
        } else {
            Expr::binary(op, operand, literal)
        };
    }
    if literal == (op == BinaryOp::Equal) {
        operand
    } else {
        not(operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_expr::{ScalarType, Type};

    fn run(expr: Expr) -> Expr {
        let mut expr = expr;
        loop {
            let next = expr.clone().transform_up(&mut simplify);
            if next == expr {
                return next;
            }
            expr = next;
        }
    }

    fn flag(name: &str) -> Expr {
        Expr::param(name, Type::Nullable(ScalarType::Bool))
    }

    fn views() -> Expr {
        Expr::param("v", Type::int32())
    }

    #[test]
    fn test_literals_fold() {
        assert_eq!(run(flag("a").and(Expr::literal(true))), flag("a"));
        assert_eq!(run(flag("a").and(Expr::literal(false))), Expr::literal(false));
        assert_eq!(run(Expr::literal(false).or(flag("a"))), flag("a"));
        assert_eq!(run(flag("a").or(Expr::literal(true))), Expr::literal(true));
        assert_eq!(run(Expr::literal(true).not()), Expr::literal(false));
    }

    #[test]
    fn test_negation_reaches_comparisons() {
        let expr = views()
            .gt(Expr::literal(3i32))
            .and(views().eq(Expr::null()))
            .not();
        let expected = views()
            .le(Expr::literal(3i32))
            .or(views().ne(Expr::null()));
        assert_eq!(run(expr), expected);
    }

    #[test]
    fn test_double_negation() {
        assert_eq!(run(flag("a").not().not()), flag("a"));
    }

    #[test]
    fn test_comparison_against_bool_literal() {
        assert_eq!(run(flag("a").eq(Expr::literal(true))), flag("a"));
        assert_eq!(run(flag("a").eq(Expr::literal(false))), flag("a").not());
        assert_eq!(run(Expr::literal(true).ne(flag("a"))), flag("a").not());
    }

    #[test]
    fn test_cheaper_operand_first() {
        let heavy = views().add(Expr::literal(1i32)).gt(Expr::literal(3i32));
        let light = flag("a");
        assert_eq!(run(heavy.clone().and(light.clone())), light.and(heavy));
    }

    #[test]
    fn test_constant_conditional() {
        let expr = Expr::conditional(Expr::null(), Expr::literal(1i32), Expr::literal(2i32));
        assert_eq!(run(expr), Expr::literal(2i32));
    }
}
