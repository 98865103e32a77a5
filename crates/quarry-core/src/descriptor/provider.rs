//! Metadata providers.

use std::sync::Arc;

use quarry_expr::{Constant, Expr, Lambda, Parameter, QueryMethod, QueryRoot, Type};
use tracing::debug;

use super::set::{
    ColumnDescriptor, DescriptorSet, EntityDescriptor, NavigationDescriptor,
    PolymorphicTypeDescriptor, PrimaryKeyDescriptor,
};
use crate::catalog::{EntityDef, FieldDef, Hierarchy, Model, ModelId, RelationDef, SOFT_DELETE_FIELD};
use crate::config::QueryOptions;
use crate::error::Result;
use crate::visitor::rewrite::bind_descriptor_set;

/// Supplies descriptor sets for one model.
///
/// Consulted once per distinct query options value; the executor caches the
/// result.
pub trait MetadataProvider: Send + Sync {
    /// Identity of the model.
    fn model_id(&self) -> ModelId;

    /// Build the descriptor set for the given options.
    fn descriptors(&self, options: &QueryOptions) -> Result<DescriptorSet>;
}

/// A [`MetadataProvider`] over a catalog [`Model`].
#[derive(Debug, Clone)]
pub struct ModelProvider {
    model: Arc<Model>,
}

impl ModelProvider {
    /// Create a provider, validating the model.
    pub fn new(model: Model) -> Result<Self> {
        model.validate()?;
        Ok(Self {
            model: Arc::new(model),
        })
    }

    /// The model.
    pub fn model(&self) -> &Model {
        &self.model
    }
}

impl MetadataProvider for ModelProvider {
    fn model_id(&self) -> ModelId {
        self.model.id()
    }

    fn descriptors(&self, options: &QueryOptions) -> Result<DescriptorSet> {
        let builder = Builder {
            model: &self.model,
            options,
        };
        let set = builder.build()?;
        debug!(
            model = %self.model.id(),
            entities = set.entity_count(),
            navigations = set.navigation_count(),
            ignore_filters = options.ignore_filters,
            "built descriptor set"
        );
        Ok(set)
    }
}

struct Builder<'a> {
    model: &'a Model,
    options: &'a QueryOptions,
}

fn param(name: &str, entity: &str) -> Parameter {
    Parameter::new(name, Type::entity(entity))
}

fn column_descriptor(field: &FieldDef) -> ColumnDescriptor {
    ColumnDescriptor {
        member: field.name.clone(),
        column: field.column.clone(),
        ty: field.ty(),
    }
}

/// `p.f0 == q.g0 && p.f1 == q.g1 ...`
fn key_equality(left: &Expr, left_fields: &[String], right: &Expr, right_fields: &[String]) -> Expr {
    left_fields
        .iter()
        .zip(right_fields)
        .map(|(l, r)| left.clone().member(l).eq(right.clone().member(r)))
        .reduce(Expr::and)
        .unwrap_or_else(|| Expr::literal(true))
}

impl Builder<'_> {
    fn build(&self) -> Result<DescriptorSet> {
        let mut set = DescriptorSet::new();
        for entity in &self.model.entities {
            set = set
                .with_entity(self.entity_descriptor(entity)?)
                .with_primary_key(self.primary_key(entity)?);
            let candidates = self.polymorphic(entity)?;
            if !candidates.is_empty() {
                set = set.with_polymorphic(entity.name.clone(), candidates);
            }
            if let Some(filter) = self.query_filter(entity)? {
                set = set.with_query_filter(entity.name.clone(), filter);
            }
        }
        for relation in &self.model.relations {
            for navigation in self.navigations(relation)? {
                set = set.with_navigation(navigation);
            }
        }
        bind_descriptor_set(set)
    }

    fn entity_descriptor(&self, entity: &EntityDef) -> Result<EntityDescriptor> {
        let root = self.model.root_of(entity)?;
        Ok(EntityDescriptor {
            name: entity.name.clone(),
            table: root.table.clone(),
            columns: self
                .model
                .subtree_fields(&entity.name)?
                .iter()
                .map(column_descriptor)
                .collect(),
        })
    }

    fn primary_key(&self, entity: &EntityDef) -> Result<PrimaryKeyDescriptor> {
        let root = self.model.root_of(entity)?;
        let k = param("__k", &entity.name);
        let body = match root.key.as_slice() {
            [single] => k.to_expr().member(single),
            fields => Expr::new_record(
                fields
                    .iter()
                    .map(|f| (f.clone(), k.to_expr().member(f)))
                    .collect(),
            ),
        };
        Ok(PrimaryKeyDescriptor {
            target_type: Type::entity(&entity.name),
            key_selector: Lambda::new(vec![k], body),
        })
    }

    fn discriminator(&self, entity: &EntityDef) -> Result<Option<String>> {
        let root = self.model.root_of(entity)?;
        Ok(match &root.hierarchy {
            Some(Hierarchy::Root { discriminator, .. }) => Some(discriminator.clone()),
            _ => None,
        })
    }

    /// `x.disc == v0 || x.disc == v1 ...` over the concrete types of the
    /// entity's subtree.
    fn type_test(&self, x: &Expr, discriminator: &str, types: &[&EntityDef]) -> Option<Expr> {
        types
            .iter()
            .filter_map(|t| t.discriminator_value())
            .map(|v| x.clone().member(discriminator).eq(Expr::literal(v.clone())))
            .reduce(Expr::or)
    }

    fn polymorphic(&self, entity: &EntityDef) -> Result<Vec<PolymorphicTypeDescriptor>> {
        let subtree = self.model.subtree(&entity.name);
        let Some(discriminator) = self.discriminator(entity)? else {
            return Ok(Vec::new());
        };
        if subtree.len() < 2 {
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for concrete in subtree {
            let Some(value) = concrete.discriminator_value() else {
                continue;
            };
            let d = param("__d", &entity.name);
            let test = d
                .to_expr()
                .member(discriminator.as_str())
                .eq(Expr::literal(value.clone()));
            let materializer = EntityDescriptor {
                name: concrete.name.clone(),
                table: self.model.root_of(concrete)?.table.clone(),
                columns: self
                    .model
                    .fields_of(concrete)?
                    .iter()
                    .map(column_descriptor)
                    .collect(),
            };
            candidates.push(PolymorphicTypeDescriptor {
                ty: Type::entity(&concrete.name),
                test_predicate: Lambda::new(vec![d], test),
                materializer: Arc::new(materializer),
            });
        }
        Ok(candidates)
    }

    fn query_filter(&self, entity: &EntityDef) -> Result<Option<Lambda>> {
        let f = param("__f", &entity.name);
        let mut predicates = Vec::new();

        let root = self.model.root_of(entity)?;
        if root.has_soft_delete() && !self.options.ignore_filters {
            predicates.push(
                f.to_expr()
                    .member(SOFT_DELETE_FIELD)
                    .eq(Expr::literal(false)),
            );
        }
        if entity.base().is_some() {
            if let Some(discriminator) = self.discriminator(entity)? {
                let subtree = self.model.subtree(&entity.name);
                if let Some(test) = self.type_test(&f.to_expr(), &discriminator, &subtree) {
                    predicates.push(test);
                }
            }
        }

        Ok(predicates
            .into_iter()
            .reduce(Expr::and)
            .map(|body| Lambda::new(vec![f], body)))
    }

    /// The filtered root of an entity set, as composed by the query filter
    /// pass.
    fn target_source(&self, entity: &str) -> Result<Expr> {
        let root = Expr::Constant(Constant::Query(QueryRoot::EntitySet {
            entity: entity.to_string(),
            filtered: true,
        }));
        let def = self.model.entity(entity)?;
        Ok(match self.query_filter(def)? {
            Some(filter) => Expr::query_call(QueryMethod::Where, vec![root, Expr::Lambda(filter)]),
            None => root,
        })
    }

    fn navigations(&self, relation: &RelationDef) -> Result<Vec<NavigationDescriptor>> {
        let mut navigations = Vec::new();
        let from = self.model.entity(&relation.from_entity)?;

        if let Some(member) = &relation.navigation {
            let from_fields = self.model.fields_of(from)?;
            let is_nullable = relation.from_fields.iter().any(|name| {
                from_fields
                    .iter()
                    .any(|f| &f.name == name && !f.required)
            });
            for declaring in self.model.subtree(&relation.from_entity) {
                navigations.push(self.navigation(
                    &declaring.name,
                    member,
                    &relation.to_entity,
                    &relation.from_fields,
                    &relation.to_fields,
                    is_nullable,
                    false,
                )?);
            }
        }

        if let Some(member) = &relation.inverse {
            let is_collection = relation.inverse_is_collection();
            for declaring in self.model.subtree(&relation.to_entity) {
                navigations.push(self.navigation(
                    &declaring.name,
                    member,
                    &relation.from_entity,
                    &relation.to_fields,
                    &relation.from_fields,
                    !is_collection,
                    is_collection,
                )?);
            }
        }
        Ok(navigations)
    }

    #[allow(clippy::too_many_arguments)]
    fn navigation(
        &self,
        entity: &str,
        member: &str,
        target: &str,
        outer_fields: &[String],
        inner_fields: &[String],
        is_nullable: bool,
        is_collection: bool,
    ) -> Result<NavigationDescriptor> {
        let key_selector = |name: &str, of: &str, fields: &[String]| {
            let p = param(name, of);
            let body = match fields {
                [single] => p.to_expr().member(single),
                fields => Expr::new_record(
                    fields
                        .iter()
                        .enumerate()
                        .map(|(i, f)| (format!("k{i}"), p.to_expr().member(f)))
                        .collect(),
                ),
            };
            Lambda::new(vec![p], body)
        };

        let target_source = self.target_source(target)?;
        let n = param("__n", entity);
        let t = param("__t", target);
        let correlated = Expr::query_call(
            QueryMethod::Where,
            vec![
                target_source.clone(),
                Expr::lambda(
                    vec![t.clone()],
                    key_equality(&t.to_expr(), inner_fields, &n.to_expr(), outer_fields),
                ),
            ],
        );
        let body = if is_collection {
            correlated
        } else {
            Expr::query_call(QueryMethod::FirstOrDefault, vec![correlated])
        };

        Ok(NavigationDescriptor {
            entity: entity.to_string(),
            member: member.to_string(),
            target: target.to_string(),
            outer_key_selector: key_selector("__o", entity, outer_fields),
            inner_key_selector: key_selector("__i", target, inner_fields),
            is_nullable,
            is_collection,
            target_source,
            expansion_template: Lambda::new(vec![n], body),
        })
    }
}
