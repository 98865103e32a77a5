//! Optimizing visitors.
//!
//! The optimizing set runs to a fixed point between composing passes, so
//! every rule here must strictly simplify the tree.

mod boolean;
mod selector_pushdown;

use super::ExpressionVisitor;

pub use boolean::BooleanOptimizingVisitor;
pub use selector_pushdown::SelectorPushdownVisitor;

/// The standard optimizing set.
pub fn standard() -> Vec<Box<dyn ExpressionVisitor>> {
    vec![
        Box::new(SelectorPushdownVisitor),
        Box::new(BooleanOptimizingVisitor),
    ]
}
