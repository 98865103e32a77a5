//! Static types carried by expression nodes.

use serde::{Deserialize, Serialize};

use crate::value::ScalarType;

/// The static type of an expression node.
///
/// Flat except for `Sequence`, which wraps the element type of a queryable
/// or a captured collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// A non-nullable scalar.
    Scalar(ScalarType),
    /// A nullable scalar.
    Nullable(ScalarType),
    /// An entity of the named type.
    Entity(String),
    /// A sequence of elements (queryable or in-memory collection).
    Sequence(Box<Type>),
    /// An anonymous record produced by `new { .. }`, with its member types.
    Record(Vec<(String, Type)>),
    /// Not yet resolved. Member binding fills these in from descriptors.
    Unknown,
}

impl Type {
    /// Shorthand for `Type::Scalar(ScalarType::Bool)`.
    pub fn bool() -> Self {
        Type::Scalar(ScalarType::Bool)
    }

    /// Shorthand for `Type::Scalar(ScalarType::Int32)`.
    pub fn int32() -> Self {
        Type::Scalar(ScalarType::Int32)
    }

    /// Shorthand for `Type::Scalar(ScalarType::Int64)`.
    pub fn int64() -> Self {
        Type::Scalar(ScalarType::Int64)
    }

    /// Shorthand for `Type::Scalar(ScalarType::Float64)`.
    pub fn float64() -> Self {
        Type::Scalar(ScalarType::Float64)
    }

    /// Shorthand for `Type::Scalar(ScalarType::String)`.
    pub fn string() -> Self {
        Type::Scalar(ScalarType::String)
    }

    /// An entity type.
    pub fn entity(name: impl Into<String>) -> Self {
        Type::Entity(name.into())
    }

    /// A sequence of `element`.
    pub fn sequence(element: Type) -> Self {
        Type::Sequence(Box::new(element))
    }

    /// The scalar type, nullable or not.
    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            Type::Scalar(s) | Type::Nullable(s) => Some(*s),
            _ => None,
        }
    }

    /// Check if values of this type may be null.
    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_) | Type::Entity(_) | Type::Unknown)
    }

    /// The nullable form of a scalar type; other types are returned as is.
    pub fn to_nullable(&self) -> Type {
        match self {
            Type::Scalar(s) => Type::Nullable(*s),
            other => other.clone(),
        }
    }

    /// The non-nullable form of a nullable scalar type.
    pub fn unwrap_nullable(&self) -> Type {
        match self {
            Type::Nullable(s) => Type::Scalar(*s),
            other => other.clone(),
        }
    }

    /// The entity name, if this is an entity type.
    pub fn entity_name(&self) -> Option<&str> {
        match self {
            Type::Entity(name) => Some(name),
            _ => None,
        }
    }

    /// The element type of a sequence.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Sequence(element) => Some(element),
            _ => None,
        }
    }

    /// Check if this is a sequence type.
    pub fn is_sequence(&self) -> bool {
        matches!(self, Type::Sequence(_))
    }

    /// The type of a record member.
    pub fn record_field(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, t)| t),
            _ => None,
        }
    }

    /// Check if this is a boolean type (nullable or not).
    pub fn is_bool(&self) -> bool {
        self.scalar() == Some(ScalarType::Bool)
    }
}

impl From<ScalarType> for Type {
    fn from(scalar: ScalarType) -> Self {
        Type::Scalar(scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_roundtrip() {
        let t = Type::int32();
        assert!(!t.is_nullable());
        assert_eq!(t.to_nullable(), Type::Nullable(ScalarType::Int32));
        assert_eq!(t.to_nullable().unwrap_nullable(), t);
    }

    #[test]
    fn test_sequence_element() {
        let t = Type::sequence(Type::entity("User"));
        assert!(t.is_sequence());
        assert_eq!(t.element().and_then(Type::entity_name), Some("User"));
    }

    #[test]
    fn test_record_field() {
        let t = Type::Record(vec![("id".into(), Type::int32())]);
        assert_eq!(t.record_field("id"), Some(&Type::int32()));
        assert_eq!(t.record_field("name"), None);
    }
}
