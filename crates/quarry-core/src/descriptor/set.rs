//! Descriptor set types.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_expr::{Expr, Lambda, Type};

use crate::error::{Error, Result};

/// A member-to-column mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Member name in query expressions.
    pub member: String,
    /// Column name.
    pub column: String,
    /// Static type of the member.
    pub ty: Type,
}

/// Table mapping of an entity type, resolved once per model.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    /// Entity type name.
    pub name: String,
    /// Table name.
    pub table: String,
    /// Columns read when materializing the entity, in projection order.
    pub columns: Vec<ColumnDescriptor>,
}

impl EntityDescriptor {
    /// Position and mapping of a member's column.
    pub fn column(&self, member: &str) -> Option<(usize, &ColumnDescriptor)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.member == member)
    }
}

/// Identity of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKeyDescriptor {
    /// Entity type the key identifies.
    pub target_type: Type,
    /// `e => e.id`, or `e => new { a = e.a, b = e.b }` for composite keys.
    pub key_selector: Lambda,
}

impl PrimaryKeyDescriptor {
    /// Entity type name.
    pub fn entity(&self) -> &str {
        self.target_type.entity_name().unwrap_or_default()
    }
}

/// How a navigation member expands.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationDescriptor {
    /// Entity declaring the member.
    pub entity: String,
    /// Member name.
    pub member: String,
    /// Target entity type.
    pub target: String,
    /// Key on the declaring side.
    pub outer_key_selector: Lambda,
    /// Matching key on the target side.
    pub inner_key_selector: Lambda,
    /// A reference navigation that may have no target.
    pub is_nullable: bool,
    /// A collection navigation.
    pub is_collection: bool,
    /// Root of the target sequence, with query filters already applied.
    pub target_source: Expr,
    /// Single-parameter lambda expanding an access: the parameter stands for
    /// the accessed object.
    pub expansion_template: Lambda,
}

impl NavigationDescriptor {
    /// Static type of the member.
    pub fn member_type(&self) -> Type {
        if self.is_collection {
            Type::sequence(Type::entity(&self.target))
        } else {
            Type::entity(&self.target)
        }
    }
}

/// A concrete type of a hierarchy, chosen per row by its test predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct PolymorphicTypeDescriptor {
    /// The concrete entity type.
    pub ty: Type,
    /// Predicate over the root-typed entity read from the row.
    pub test_predicate: Lambda,
    /// Columns of the concrete type.
    pub materializer: Arc<EntityDescriptor>,
}

/// Immutable per-model descriptor tables.
///
/// Built once per (model, query options) pair and shared across concurrent
/// compilations.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    entities: HashMap<String, Arc<EntityDescriptor>>,
    primary_keys: HashMap<String, Arc<PrimaryKeyDescriptor>>,
    navigations: HashMap<(String, String), Arc<NavigationDescriptor>>,
    polymorphic: HashMap<String, Vec<PolymorphicTypeDescriptor>>,
    query_filters: HashMap<String, Lambda>,
}

impl DescriptorSet {
    /// Create an empty descriptor set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity descriptor.
    pub fn with_entity(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        self
    }

    /// Add a primary-key descriptor.
    pub fn with_primary_key(mut self, descriptor: PrimaryKeyDescriptor) -> Self {
        let name = descriptor.entity().to_string();
        self.primary_keys.insert(name, Arc::new(descriptor));
        self
    }

    /// Add a navigation descriptor.
    pub fn with_navigation(mut self, descriptor: NavigationDescriptor) -> Self {
        let key = (descriptor.entity.clone(), descriptor.member.clone());
        self.navigations.insert(key, Arc::new(descriptor));
        self
    }

    /// Set the polymorphic candidates of an entity type, in test order.
    pub fn with_polymorphic(
        mut self,
        entity: impl Into<String>,
        candidates: Vec<PolymorphicTypeDescriptor>,
    ) -> Self {
        self.polymorphic.insert(entity.into(), candidates);
        self
    }

    /// Set the query filter of an entity type.
    pub fn with_query_filter(mut self, entity: impl Into<String>, filter: Lambda) -> Self {
        self.query_filters.insert(entity.into(), filter);
        self
    }

    /// Get an entity descriptor.
    pub fn entity(&self, name: &str) -> Result<&Arc<EntityDescriptor>> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Get a primary-key descriptor.
    pub fn primary_key(&self, entity: &str) -> Result<&Arc<PrimaryKeyDescriptor>> {
        self.primary_keys
            .get(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }

    /// Get a navigation descriptor.
    pub fn navigation(&self, entity: &str, member: &str) -> Option<&Arc<NavigationDescriptor>> {
        self.navigations
            .get(&(entity.to_string(), member.to_string()))
    }

    /// Polymorphic candidates of an entity type, empty if it has no derived
    /// types.
    pub fn polymorphic(&self, entity: &str) -> &[PolymorphicTypeDescriptor] {
        self.polymorphic
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Query filter of an entity type.
    pub fn query_filter(&self, entity: &str) -> Option<&Lambda> {
        self.query_filters.get(entity)
    }

    /// Static type of `entity.member`: a column type or a navigation type.
    pub fn member_type(&self, entity: &str, member: &str) -> Result<Type> {
        let descriptor = self.entity(entity)?;
        if let Some((_, column)) = descriptor.column(member) {
            return Ok(column.ty.clone());
        }
        if let Some(navigation) = self.navigation(entity, member) {
            return Ok(navigation.member_type());
        }
        Err(Error::UnknownMember {
            entity: entity.to_string(),
            member: member.to_string(),
        })
    }

    /// Rewrite every stored expression and lambda with `f`.
    pub(crate) fn try_map_expressions(
        mut self,
        f: &mut impl FnMut(Expr) -> Result<Expr>,
    ) -> Result<Self> {
        let mut lambda = |l: Lambda| -> Result<Lambda> {
            match f(Expr::Lambda(l))? {
                Expr::Lambda(l) => Ok(l),
                other => Err(Error::Compile(format!(
                    "descriptor lambda rewritten to non-lambda: {other:?}"
                ))),
            }
        };

        for key in self.primary_keys.values_mut() {
            let mut descriptor = (**key).clone();
            descriptor.key_selector = lambda(descriptor.key_selector)?;
            *key = Arc::new(descriptor);
        }
        for candidates in self.polymorphic.values_mut() {
            for candidate in candidates.iter_mut() {
                candidate.test_predicate = lambda(candidate.test_predicate.clone())?;
            }
        }
        for filter in self.query_filters.values_mut() {
            *filter = lambda(filter.clone())?;
        }
        for navigation in self.navigations.values_mut() {
            let mut descriptor = (**navigation).clone();
            descriptor.outer_key_selector = lambda(descriptor.outer_key_selector)?;
            descriptor.inner_key_selector = lambda(descriptor.inner_key_selector)?;
            descriptor.expansion_template = lambda(descriptor.expansion_template)?;
            descriptor.target_source =
                *lambda(Lambda::new(Vec::new(), descriptor.target_source))?.body;
            *navigation = Arc::new(descriptor);
        }
        Ok(self)
    }

    /// Number of entity descriptors.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of navigation descriptors.
    pub fn navigation_count(&self) -> usize {
        self.navigations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_expr::{Parameter, ScalarType};

    fn user_descriptor() -> EntityDescriptor {
        EntityDescriptor {
            name: "User".into(),
            table: "users".into(),
            columns: vec![
                ColumnDescriptor {
                    member: "id".into(),
                    column: "id".into(),
                    ty: Type::int64(),
                },
                ColumnDescriptor {
                    member: "name".into(),
                    column: "user_name".into(),
                    ty: Type::Nullable(ScalarType::String),
                },
            ],
        }
    }

    #[test]
    fn test_column_lookup() {
        let d = user_descriptor();
        let (index, column) = d.column("name").unwrap();
        assert_eq!(index, 1);
        assert_eq!(column.column, "user_name");
        assert!(d.column("missing").is_none());
    }

    #[test]
    fn test_member_type() {
        let set = DescriptorSet::new().with_entity(user_descriptor());
        assert_eq!(set.member_type("User", "id").unwrap(), Type::int64());
        assert!(matches!(
            set.member_type("User", "missing"),
            Err(Error::UnknownMember { .. })
        ));
        assert!(matches!(
            set.member_type("Nope", "id"),
            Err(Error::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_primary_key_lookup() {
        let k = Parameter::new("k", Type::entity("User"));
        let set = DescriptorSet::new().with_primary_key(PrimaryKeyDescriptor {
            target_type: Type::entity("User"),
            key_selector: Lambda::new(vec![k.clone()], k.to_expr().member("id")),
        });
        assert_eq!(set.primary_key("User").unwrap().entity(), "User");
        assert!(set.polymorphic("User").is_empty());
    }
}
