//! Relation definitions between entities.

use serde::{Deserialize, Serialize};

/// Cardinality of a relation, seen from the referenced (`to`) side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// One-to-one relation (unique foreign key).
    OneToOne,
    /// One-to-many relation (foreign key on the many side).
    OneToMany,
}

/// A foreign-key relation between two entities.
///
/// `from_entity.from_fields` references `to_entity.to_fields`. The
/// navigation member lives on the `from` side and is a reference; the
/// inverse member lives on the `to` side and is a collection for
/// one-to-many relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation name (unique within the model).
    pub name: String,
    /// Entity holding the foreign key.
    pub from_entity: String,
    /// Foreign key fields.
    pub from_fields: Vec<String>,
    /// Referenced entity.
    pub to_entity: String,
    /// Referenced fields (usually the identity).
    pub to_fields: Vec<String>,
    /// Relation cardinality.
    pub cardinality: Cardinality,
    /// Reference navigation member on `from_entity`.
    pub navigation: Option<String>,
    /// Inverse navigation member on `to_entity`.
    pub inverse: Option<String>,
}

impl RelationDef {
    fn new(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            from_entity: from_entity.into(),
            from_fields: vec![from_field.into()],
            to_entity: to_entity.into(),
            to_fields: vec![to_field.into()],
            cardinality,
            navigation: None,
            inverse: None,
        }
    }

    /// Create a one-to-one relation.
    pub fn one_to_one(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            from_entity,
            from_field,
            to_entity,
            to_field,
            Cardinality::OneToOne,
        )
    }

    /// Create a one-to-many relation.
    pub fn one_to_many(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            from_entity,
            from_field,
            to_entity,
            to_field,
            Cardinality::OneToMany,
        )
    }

    /// Use a composite foreign key.
    pub fn with_composite_key<I, S>(mut self, from_fields: I, to_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.from_fields = from_fields.into_iter().map(Into::into).collect();
        self.to_fields = to_fields.into_iter().map(Into::into).collect();
        self
    }

    /// Name the reference navigation on the `from` side.
    pub fn with_navigation(mut self, member: impl Into<String>) -> Self {
        self.navigation = Some(member.into());
        self
    }

    /// Name the inverse navigation on the `to` side.
    pub fn with_inverse(mut self, member: impl Into<String>) -> Self {
        self.inverse = Some(member.into());
        self
    }

    /// Check if the inverse navigation is a collection.
    pub fn inverse_is_collection(&self) -> bool {
        self.cardinality == Cardinality::OneToMany
    }
}
