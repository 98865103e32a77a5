//! Model - the complete entity mapping a query executor compiles against.

use serde::{Deserialize, Serialize};

use super::{EntityDef, FieldDef, Hierarchy, RelationDef};
use crate::error::{Error, Result};

/// Identity of a model. Part of descriptor-set and plan cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(pub String);

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, versioned set of entities and relations.
///
/// Entities keep declaration order: polymorphic type tests are tried in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model name.
    pub name: String,
    /// Model version (monotonically increasing).
    pub version: u64,
    /// Entity definitions in declaration order.
    pub entities: Vec<EntityDef>,
    /// Relation definitions.
    pub relations: Vec<RelationDef>,
}

impl Model {
    /// Create an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            entities: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Set the model version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Add an entity to the model.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Add a relation to the model.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Identity of this model, including its version.
    pub fn id(&self) -> ModelId {
        ModelId(format!("{}@{}", self.name, self.version))
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Get an entity by name or fail.
    pub fn entity(&self, name: &str) -> Result<&EntityDef> {
        self.get_entity(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// The hierarchy root of an entity (itself if it is not derived).
    pub fn root_of<'a>(&'a self, entity: &'a EntityDef) -> Result<&'a EntityDef> {
        let mut current = entity;
        let mut hops = 0;
        while let Some(base) = current.base() {
            current = self.entity(base)?;
            hops += 1;
            if hops > self.entities.len() {
                return Err(Error::Compile(format!(
                    "inheritance cycle through {}",
                    entity.name
                )));
            }
        }
        Ok(current)
    }

    /// Check if `entity` is `ancestor` or derives from it.
    pub fn is_a(&self, entity: &EntityDef, ancestor: &str) -> bool {
        let mut current = Some(entity);
        let mut hops = 0;
        while let Some(e) = current {
            if e.name == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.entities.len() {
                return false;
            }
            current = e.base().and_then(|b| self.get_entity(b));
        }
        false
    }

    /// The entity itself followed by every type derived from it, in
    /// declaration order.
    pub fn subtree(&self, name: &str) -> Vec<&EntityDef> {
        let mut types: Vec<&EntityDef> = self.get_entity(name).into_iter().collect();
        types.extend(
            self.entities
                .iter()
                .filter(|e| e.name != name && self.is_a(e, name)),
        );
        types
    }

    /// Fields of an entity including those inherited from its bases, root
    /// fields first.
    pub fn fields_of(&self, entity: &EntityDef) -> Result<Vec<FieldDef>> {
        let mut chain = vec![entity];
        let mut current = entity;
        while let Some(base) = current.base() {
            current = self.entity(base)?;
            if chain.len() > self.entities.len() {
                return Err(Error::Compile(format!(
                    "inheritance cycle through {}",
                    entity.name
                )));
            }
            chain.push(current);
        }
        let mut fields: Vec<FieldDef> = Vec::new();
        for def in chain.into_iter().rev() {
            for field in &def.fields {
                if !fields.iter().any(|f| f.name == field.name) {
                    fields.push(field.clone());
                }
            }
        }
        Ok(fields)
    }

    /// Fields readable from rows of an entity's table when querying it: its
    /// own fields plus every field of its derived types. Fields of derived
    /// types are nullable at this level.
    pub fn subtree_fields(&self, name: &str) -> Result<Vec<FieldDef>> {
        let entity = self.entity(name)?;
        let mut fields = self.fields_of(entity)?;
        for derived in self.subtree(name).into_iter().skip(1) {
            for field in &derived.fields {
                if !fields.iter().any(|f| f.name == field.name) {
                    fields.push(FieldDef {
                        required: false,
                        ..field.clone()
                    });
                }
            }
        }
        Ok(fields)
    }

    /// Relations whose foreign key is on `entity`.
    pub fn relations_from(&self, entity: &str) -> Vec<&RelationDef> {
        self.relations
            .iter()
            .filter(|r| r.from_entity == entity)
            .collect()
    }

    /// Relations referencing `entity`.
    pub fn relations_to(&self, entity: &str) -> Vec<&RelationDef> {
        self.relations
            .iter()
            .filter(|r| r.to_entity == entity)
            .collect()
    }

    /// List all entity names.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }

    /// Check that every name the model refers to resolves.
    pub fn validate(&self) -> Result<()> {
        for entity in &self.entities {
            let root = self.root_of(entity)?;
            let fields = self.fields_of(entity)?;
            let has = |name: &str| fields.iter().any(|f| f.name == name);

            for key in &root.key {
                if !has(key) {
                    return Err(unknown_member(&entity.name, key));
                }
            }
            if let Some(Hierarchy::Root { discriminator, .. }) = &root.hierarchy {
                if !has(discriminator) {
                    return Err(unknown_member(&entity.name, discriminator));
                }
            }
            if entity.base().is_some() && root.hierarchy.is_none() {
                return Err(Error::Compile(format!(
                    "{} derives from {} which has no discriminator",
                    entity.name, root.name
                )));
            }
        }

        for relation in &self.relations {
            let from = self.entity(&relation.from_entity)?;
            let to = self.entity(&relation.to_entity)?;
            if relation.from_fields.len() != relation.to_fields.len() {
                return Err(Error::Compile(format!(
                    "relation {} has mismatched key lengths",
                    relation.name
                )));
            }
            let from_fields = self.fields_of(from)?;
            let to_fields = self.fields_of(to)?;
            for field in &relation.from_fields {
                if !from_fields.iter().any(|f| &f.name == field) {
                    return Err(unknown_member(&from.name, field));
                }
            }
            for field in &relation.to_fields {
                if !to_fields.iter().any(|f| &f.name == field) {
                    return Err(unknown_member(&to.name, field));
                }
            }
        }
        Ok(())
    }
}

fn unknown_member(entity: &str, member: &str) -> Error {
    Error::UnknownMember {
        entity: entity.to_string(),
        member: member.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;
    use quarry_expr::ScalarType;

    fn sample_model() -> Model {
        let account = EntityDef::new("Account", "id")
            .with_table("accounts")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::new("kind", ScalarType::String))
            .with_discriminator("kind", Some("user".into()));
        let admin = EntityDef::new("Admin", "id")
            .derived_from("Account", "admin")
            .with_field(FieldDef::new("level", ScalarType::Int32));
        let post = EntityDef::new("Post", "id")
            .with_field(FieldDef::new("id", ScalarType::Int64))
            .with_field(FieldDef::new("author_id", ScalarType::Int64));

        Model::new("blog")
            .with_entity(account)
            .with_entity(admin)
            .with_entity(post)
            .with_relation(
                RelationDef::one_to_many("account_posts", "Post", "author_id", "Account", "id")
                    .with_navigation("author")
                    .with_inverse("posts"),
            )
    }

    #[test]
    fn test_model_builder() {
        let model = sample_model();
        assert_eq!(model.entities.len(), 3);
        assert_eq!(model.relations.len(), 1);
        assert_eq!(model.id(), ModelId("blog@1".into()));
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_hierarchy_fields() {
        let model = sample_model();
        let admin = model.get_entity("Admin").unwrap();
        assert_eq!(model.root_of(admin).unwrap().name, "Account");

        let names: Vec<_> = model
            .fields_of(admin)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["id", "kind", "level"]);

        let subtree = model.subtree_fields("Account").unwrap();
        let level = subtree.iter().find(|f| f.name == "level").unwrap();
        assert!(!level.required);
    }

    #[test]
    fn test_subtree_order() {
        let model = sample_model();
        let names: Vec<_> = model
            .subtree("Account")
            .into_iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["Account", "Admin"]);
    }

    #[test]
    fn test_validate_unknown_relation_field() {
        let model = sample_model().with_relation(RelationDef::one_to_many(
            "broken", "Post", "missing", "Account", "id",
        ));
        assert!(matches!(
            model.validate(),
            Err(Error::UnknownMember { .. })
        ));
    }

    #[test]
    fn test_validate_unknown_entity() {
        let model = sample_model().with_relation(RelationDef::one_to_many(
            "broken", "Comment", "post_id", "Post", "id",
        ));
        assert!(matches!(model.validate(), Err(Error::UnknownEntity(_))));
    }
}
