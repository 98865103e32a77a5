//! Entity definitions.

use quarry_expr::{ScalarType, Value};
use serde::{Deserialize, Serialize};

use super::field::FieldDef;

/// Name of the flag column added by [`EntityDef::with_soft_delete`].
pub const SOFT_DELETE_FIELD: &str = "deleted";

/// An entity definition (table mapping).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within the model).
    pub name: String,
    /// Table name. Derived entities share their root's table.
    pub table: String,
    /// Names of the identity fields (more than one for composite keys).
    pub key: Vec<String>,
    /// Field definitions declared on this entity.
    pub fields: Vec<FieldDef>,
    /// Lifecycle rules.
    pub lifecycle: LifecycleRules,
    /// Table-per-hierarchy mapping, if this entity takes part in one.
    pub hierarchy: Option<Hierarchy>,
}

/// Lifecycle rules for an entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LifecycleRules {
    /// Deleted rows are kept with a flag and hidden by a query filter.
    pub soft_delete: bool,
}

/// Table-per-hierarchy mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hierarchy {
    /// Root of a hierarchy: owns the table and the discriminator column.
    Root {
        /// Discriminator field name.
        discriminator: String,
        /// Discriminator value of rows of the root type itself, `None` if the
        /// root is abstract.
        value: Option<Value>,
    },
    /// A derived type stored in its base's table.
    Derived {
        /// Base entity name.
        base: String,
        /// Discriminator value of rows of this type.
        value: Value,
    },
}

impl EntityDef {
    /// Create a new entity definition with a single identity field.
    ///
    /// The table name defaults to the lowercased entity name.
    pub fn new(name: impl Into<String>, identity_field: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: name.to_lowercase(),
            name,
            key: vec![identity_field.into()],
            fields: Vec::new(),
            lifecycle: LifecycleRules::default(),
            hierarchy: None,
        }
    }

    /// Map the entity to a table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Use a composite key.
    pub fn with_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Enable soft delete, adding the flag column if it is not declared.
    pub fn with_soft_delete(mut self) -> Self {
        self.lifecycle.soft_delete = true;
        if self.get_field(SOFT_DELETE_FIELD).is_none() {
            self.fields
                .push(FieldDef::new(SOFT_DELETE_FIELD, ScalarType::Bool));
        }
        self
    }

    /// Make this entity the root of a hierarchy discriminated by `field`.
    pub fn with_discriminator(mut self, field: impl Into<String>, value: Option<Value>) -> Self {
        self.hierarchy = Some(Hierarchy::Root {
            discriminator: field.into(),
            value,
        });
        self
    }

    /// Make this entity a derived type of `base`, stored in its table.
    pub fn derived_from(mut self, base: impl Into<String>, value: impl Into<Value>) -> Self {
        self.hierarchy = Some(Hierarchy::Derived {
            base: base.into(),
            value: value.into(),
        });
        self
    }

    /// Get a field declared on this entity by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Base entity name, for derived types.
    pub fn base(&self) -> Option<&str> {
        match &self.hierarchy {
            Some(Hierarchy::Derived { base, .. }) => Some(base),
            _ => None,
        }
    }

    /// Discriminator value of rows of exactly this type.
    pub fn discriminator_value(&self) -> Option<&Value> {
        match &self.hierarchy {
            Some(Hierarchy::Root { value, .. }) => value.as_ref(),
            Some(Hierarchy::Derived { value, .. }) => Some(value),
            None => None,
        }
    }

    /// Check if this entity has soft delete enabled.
    pub fn has_soft_delete(&self) -> bool {
        self.lifecycle.soft_delete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_builder() {
        let entity = EntityDef::new("User", "id")
            .with_table("users")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::new("name", ScalarType::String))
            .with_field(FieldDef::optional("email", ScalarType::String))
            .with_soft_delete();

        assert_eq!(entity.name, "User");
        assert_eq!(entity.table, "users");
        assert_eq!(entity.key, vec!["id".to_string()]);
        assert_eq!(entity.fields.len(), 4);
        assert!(entity.has_soft_delete());
        assert!(entity.get_field(SOFT_DELETE_FIELD).is_some());
    }

    #[test]
    fn test_soft_delete_keeps_declared_flag() {
        let entity = EntityDef::new("Post", "id")
            .with_field(FieldDef::new(SOFT_DELETE_FIELD, ScalarType::Bool))
            .with_soft_delete();
        assert_eq!(entity.fields.len(), 1);
    }

    #[test]
    fn test_hierarchy() {
        let root = EntityDef::new("Account", "id").with_discriminator("kind", None);
        let derived = EntityDef::new("Admin", "id").derived_from("Account", "admin");

        assert_eq!(root.base(), None);
        assert_eq!(root.discriminator_value(), None);
        assert_eq!(derived.base(), Some("Account"));
        assert_eq!(
            derived.discriminator_value(),
            Some(&Value::String("admin".into()))
        );
    }
}
