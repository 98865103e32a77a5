//! Rewriting visitors, applied once in order before composition.

mod binding;
mod contains;
mod member;
mod nullable;
mod translatability;

pub use binding::MemberBindingVisitor;
pub use contains::ContainsRewritingVisitor;
pub use member::MemberTranslationVisitor;
pub use nullable::NullableMemberVisitor;
pub use translatability::TranslatabilityAnalyzer;

pub(crate) use binding::bind_descriptor_set;

use super::ExpressionVisitor;

/// The rewriting visitors in application order.
pub fn standard() -> Vec<Box<dyn ExpressionVisitor>> {
    vec![
        Box::new(MemberBindingVisitor),
        Box::new(NullableMemberVisitor),
        Box::new(MemberTranslationVisitor),
        Box::new(ContainsRewritingVisitor),
    ]
}
