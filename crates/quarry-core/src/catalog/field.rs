//! Field definitions for entities.

use quarry_expr::{ScalarType, Type};
use serde::{Deserialize, Serialize};

/// A scalar field of an entity, mapped to one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Member name used in query expressions.
    pub name: String,
    /// Column name in the table.
    pub column: String,
    /// Scalar type of the column.
    pub scalar: ScalarType,
    /// Whether the column is non-nullable.
    pub required: bool,
}

impl FieldDef {
    /// Create a required field whose column has the same name.
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            scalar,
            required: true,
        }
    }

    /// Create a nullable field.
    pub fn optional(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            required: false,
            ..Self::new(name, scalar)
        }
    }

    /// Map the field to a differently named column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Static type of the member.
    pub fn ty(&self) -> Type {
        if self.required {
            Type::Scalar(self.scalar)
        } else {
            Type::Nullable(self.scalar)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_def_builder() {
        let field = FieldDef::new("author_id", ScalarType::Int64).with_column("author");
        assert_eq!(field.name, "author_id");
        assert_eq!(field.column, "author");
        assert_eq!(field.ty(), Type::int64());
    }

    #[test]
    fn test_optional_field() {
        let field = FieldDef::optional("bio", ScalarType::String);
        assert!(!field.required);
        assert_eq!(field.ty(), Type::Nullable(ScalarType::String));
    }
}
