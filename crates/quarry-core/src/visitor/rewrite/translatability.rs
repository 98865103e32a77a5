//! Translatability analysis.

use quarry_expr::{Expr, Method, Type};

/// Decides whether a sub-expression has a backend form.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslatabilityAnalyzer;

impl TranslatabilityAnalyzer {
    /// Check if `collection` can be the right-hand side of an IN predicate:
    /// a list parameter, or a scalar-valued query over an entity set.
    pub fn is_translatable_collection(&self, collection: &Expr) -> bool {
        match collection {
            Expr::Parameter(p) if p.is_synthetic() => {
                matches!(p.ty.element(), Some(Type::Scalar(_) | Type::Nullable(_)))
            }
            Expr::Call { .. } => {
                let scalar_element = matches!(
                    collection.ty().element(),
                    Some(Type::Scalar(_) | Type::Nullable(_))
                );
                scalar_element && self.is_rooted_at_entity_set(collection)
            }
            _ => false,
        }
    }

    /// Check if a sequence query bottoms out at an entity set.
    pub fn is_rooted_at_entity_set(&self, query: &Expr) -> bool {
        match query.as_query_call() {
            Some((method, args)) if method.returns_sequence() => {
                args.first().is_some_and(|source| self.is_rooted_at_entity_set(source))
            }
            Some(_) => false,
            None => query.as_entity_set().is_some(),
        }
    }

    /// Check if `expr` contains a call with no translation at all.
    pub fn has_opaque_call(&self, expr: &Expr) -> bool {
        expr.any(&|e| {
            matches!(
                e,
                Expr::Call {
                    method: Method::Custom(_),
                    ..
                }
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_expr::{Parameter, Query, ScalarType, Value};

    #[test]
    fn test_list_parameter_is_translatable() {
        let p = Parameter::synthetic(0, Type::sequence(Type::int64()));
        assert!(TranslatabilityAnalyzer.is_translatable_collection(&p.to_expr()));

        let scalar = Parameter::synthetic(1, Type::int64());
        assert!(!TranslatabilityAnalyzer.is_translatable_collection(&scalar.to_expr()));
    }

    #[test]
    fn test_scalar_subquery_is_translatable() {
        let ids = Query::from("User")
            .select(|u| u.member_typed("id", Type::int64()))
            .into_expr();
        assert!(TranslatabilityAnalyzer.is_translatable_collection(&ids));

        let users = Query::from("User").into_expr();
        assert!(!TranslatabilityAnalyzer.is_translatable_collection(&users));
    }

    #[test]
    fn test_opaque_sequence_is_not_translatable() {
        let opaque = Expr::opaque("ids", ScalarType::Int64, vec![Value::Int64(1)]);
        assert!(!TranslatabilityAnalyzer.is_translatable_collection(&opaque));
    }

    #[test]
    fn test_custom_calls_are_opaque() {
        let expr = Expr::literal("a").call(
            Method::Custom("Soundex".into()),
            vec![],
            Type::string(),
        );
        assert!(TranslatabilityAnalyzer.has_opaque_call(&expr));
    }
}
