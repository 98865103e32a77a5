//! Row materializers.
//!
//! A materializer is built once per compiled plan from the element
//! projection and turns each result row into an [`Object`]. Column
//! positions are fixed at build time; reading a row never looks at names.

use std::sync::Arc;

use quarry_expr::{Expr, ParameterValue, Type, Value};

use super::projection::{EntityProjection, IncludeProjection, Projection};
use super::translate::key_members;
use crate::descriptor::{DescriptorSet, EntityDescriptor, PolymorphicTypeDescriptor, PrimaryKeyDescriptor};
use crate::error::{Error, Result};
use crate::eval::{self, Env};
use crate::exec::Row;
use crate::identity::{IdentityResolver, TrackingState};
use crate::object::{Entity, Object, Record};
use crate::sql::{SelectItem, SqlExpr};

/// Per-execution inputs of materialization.
#[derive(Clone, Copy)]
pub struct MaterializeContext<'a> {
    pub parameters: &'a [ParameterValue],
    pub resolver: &'a dyn IdentityResolver,
    pub tracking: TrackingState,
}

/// Builds one element from one row.
#[derive(Debug, Clone)]
pub enum Materializer {
    /// A scalar column.
    Column { index: usize, ty: Type },
    Entity(EntityMaterializer),
    Record(Vec<(String, Materializer)>),
    /// A client-evaluated body over materialized inputs.
    Client {
        body: Expr,
        inputs: Vec<(String, Materializer)>,
    },
}

impl Materializer {
    pub fn materialize(&self, row: &Row, cx: &MaterializeContext<'_>) -> Result<Object> {
        match self {
            Materializer::Column { index, ty } => read(row, *index, ty).map(Object::from_value),
            Materializer::Entity(entity) => entity.materialize(row, cx),
            Materializer::Record(fields) => {
                let fields = fields
                    .iter()
                    .map(|(name, field)| Ok((name.clone(), field.materialize(row, cx)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Object::Record(Record::new(fields)))
            }
            Materializer::Client { body, inputs } => {
                let mut env = Env::new(cx.parameters);
                for (name, input) in inputs {
                    env = env.bind(name.clone(), input.materialize(row, cx)?);
                }
                eval::evaluate(body, &env)
            }
        }
    }
}

/// Builds an entity from a contiguous run of columns.
#[derive(Debug, Clone)]
pub struct EntityMaterializer {
    descriptor: Arc<EntityDescriptor>,
    key_descriptor: Arc<PrimaryKeyDescriptor>,
    /// Row position of the first descriptor column.
    offset: usize,
    /// Row positions of the key columns, in key order.
    key: Vec<usize>,
    polymorphic: Vec<PolymorphicTypeDescriptor>,
    references: Vec<(String, EntityMaterializer)>,
}

impl EntityMaterializer {
    pub fn entity(&self) -> &str {
        &self.descriptor.name
    }

    /// The row's key values, or `None` when every key column is null (no
    /// entity on this row).
    pub fn key(&self, row: &Row) -> Result<Option<Vec<Value>>> {
        let mut values = Vec::with_capacity(self.key.len());
        for &index in &self.key {
            let ty = &self.descriptor.columns[index - self.offset].ty;
            values.push(read(row, index, ty)?);
        }
        if values.iter().all(Value::is_null) {
            Ok(None)
        } else {
            Ok(Some(values))
        }
    }

    pub fn materialize(&self, row: &Row, cx: &MaterializeContext<'_>) -> Result<Object> {
        let Some(key) = self.key(row)? else {
            return Ok(Object::Null);
        };
        let fields = self
            .descriptor
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| Ok((column.member.clone(), read(row, self.offset + i, &column.ty)?)))
            .collect::<Result<Vec<_>>>()?;
        let candidate = self.concrete(fields, cx.parameters)?;
        let entity = cx
            .resolver
            .resolve(&self.key_descriptor, &key, candidate, cx.tracking);
        for (member, reference) in &self.references {
            entity.set_navigation(member.clone(), reference.materialize(row, cx)?);
        }
        Ok(Object::Entity(entity))
    }

    /// Pick the concrete type of a hierarchy row.
    fn concrete(&self, fields: Vec<(String, Value)>, parameters: &[ParameterValue]) -> Result<Entity> {
        if self.polymorphic.is_empty() {
            return Ok(Entity::new(self.descriptor.name.clone(), fields));
        }
        let probe = Object::Entity(Arc::new(Entity::new(self.descriptor.name.clone(), fields.clone())));
        for candidate in &self.polymorphic {
            let matched = eval::apply(&candidate.test_predicate, vec![probe.clone()], parameters)?;
            if matched == Object::Value(Value::Bool(true)) {
                let concrete = &candidate.materializer;
                let fields = fields
                    .into_iter()
                    .filter(|(member, _)| concrete.column(member).is_some())
                    .collect();
                return Ok(Entity::new(concrete.name.clone(), fields));
            }
        }
        Err(Error::NoPolymorphicMatch {
            entity: self.descriptor.name.clone(),
        })
    }
}

/// Groups adjacent rows of one parent into its collection includes.
#[derive(Debug, Clone)]
pub struct GroupingMaterializer {
    parent: EntityMaterializer,
    collections: Vec<(String, EntityMaterializer)>,
}

struct Group {
    key: Vec<Value>,
    parent: Object,
    children: Vec<Children>,
}

#[derive(Default)]
struct Children {
    seen: Vec<Vec<Value>>,
    items: Vec<Object>,
}

impl GroupingMaterializer {
    /// Materialize every parent in `rows`, each with its collections filled.
    pub fn materialize_all<I>(&self, rows: I, cx: &MaterializeContext<'_>) -> Result<Vec<Object>>
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        let mut parents = Vec::new();
        let mut current: Option<Group> = None;
        for row in rows {
            let row = row?;
            let Some(key) = self.parent.key(&row)? else {
                continue;
            };
            let group = match current.take() {
                Some(group) if group.key == key => group,
                previous => {
                    if let Some(previous) = previous {
                        parents.push(self.close(previous));
                    }
                    Group {
                        key,
                        parent: self.parent.materialize(&row, cx)?,
                        children: self.collections.iter().map(|_| Children::default()).collect(),
                    }
                }
            };
            let mut group = group;
            for ((_, materializer), children) in self.collections.iter().zip(&mut group.children) {
                let Some(child_key) = materializer.key(&row)? else {
                    continue;
                };
                if !children.seen.contains(&child_key) {
                    children.items.push(materializer.materialize(&row, cx)?);
                    children.seen.push(child_key);
                }
            }
            current = Some(group);
        }
        if let Some(last) = current {
            parents.push(self.close(last));
        }
        Ok(parents)
    }

    fn close(&self, group: Group) -> Object {
        if let Object::Entity(entity) = &group.parent {
            for ((member, _), children) in self.collections.iter().zip(group.children) {
                entity.set_navigation(member.clone(), Object::List(children.items));
            }
        }
        group.parent
    }
}

/// Lays projections out as select items and records where each lands.
pub(crate) struct MaterializerBuilder<'a> {
    descriptors: &'a DescriptorSet,
    items: Vec<SelectItem>,
}

impl<'a> MaterializerBuilder<'a> {
    pub fn new(descriptors: &'a DescriptorSet) -> Self {
        Self {
            descriptors,
            items: Vec::new(),
        }
    }

    fn column(&mut self, expr: SqlExpr) -> usize {
        self.items.push(SelectItem::new(expr));
        self.items.len() - 1
    }

    pub fn build(&mut self, projection: Projection) -> Result<Materializer> {
        match projection {
            Projection::Scalar { expr, ty } => Ok(Materializer::Column {
                index: self.column(expr),
                ty,
            }),
            Projection::Entity(entity) => self.entity(entity).map(Materializer::Entity),
            Projection::Record(fields) => fields
                .into_iter()
                .map(|(name, field)| Ok((name, self.build(field)?)))
                .collect::<Result<Vec<_>>>()
                .map(Materializer::Record),
            Projection::Client { body, inputs } => {
                let inputs = inputs
                    .into_iter()
                    .map(|(name, input)| Ok((name, self.build(input)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Materializer::Client { body, inputs })
            }
        }
    }

    pub fn entity(&mut self, projection: EntityProjection) -> Result<EntityMaterializer> {
        let EntityProjection {
            descriptor,
            columns,
            includes,
            ..
        } = projection;
        let key_descriptor = self.descriptors.primary_key(&descriptor.name)?.clone();
        let offset = self.items.len();
        for expr in columns {
            self.column(expr);
        }
        let key = key_members(&key_descriptor)?
            .into_iter()
            .map(|member| {
                descriptor
                    .column(&member)
                    .map(|(index, _)| offset + index)
                    .ok_or_else(|| Error::UnknownMember {
                        entity: descriptor.name.clone(),
                        member,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let polymorphic = self.descriptors.polymorphic(&descriptor.name).to_vec();

        let mut references = Vec::new();
        for include in includes {
            match include {
                IncludeProjection::Reference { member, projection } => {
                    references.push((member, self.entity(projection)?));
                }
                IncludeProjection::Collection { member, .. } => {
                    return Err(Error::untranslatable(format!(
                        "collection include {member} outside a grouped query"
                    )))
                }
            }
        }
        Ok(EntityMaterializer {
            descriptor,
            key_descriptor,
            offset,
            key,
            polymorphic,
            references,
        })
    }

    pub fn grouping(
        &mut self,
        parent: EntityProjection,
        collections: Vec<(String, EntityProjection)>,
    ) -> Result<GroupingMaterializer> {
        let parent = self.entity(parent)?;
        let collections = collections
            .into_iter()
            .map(|(member, child)| Ok((member, self.entity(child)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(GroupingMaterializer {
            parent,
            collections,
        })
    }

    pub fn finish(self) -> Vec<SelectItem> {
        self.items
    }
}

/// Read a column, converting it to the declared scalar type. Null is
/// accepted for every type.
fn read(row: &Row, index: usize, ty: &Type) -> Result<Value> {
    let value = row.get(index).cloned().ok_or_else(|| {
        Error::InvalidData(format!(
            "row has {} columns, column {index} was requested",
            row.len()
        ))
    })?;
    match ty.scalar() {
        Some(scalar) => value.clone().coerce(scalar).ok_or_else(|| {
            Error::InvalidData(format!("cannot read {value:?} as {}", scalar.name()))
        }),
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::identity::{IdentityMap, NoIdentityResolution};
    use crate::testing::blog_context;

    fn users(builder: &mut MaterializerBuilder<'_>) -> EntityMaterializer {
        let descriptor = builder.descriptors.entity("User").unwrap().clone();
        builder
            .entity(EntityProjection::from_table(descriptor, "t0"))
            .unwrap()
    }

    fn user_row(id: i64, name: &str) -> Row {
        Row::new(vec![
            Value::Int64(id),
            Value::String(name.into()),
            Value::Null,
            Value::Int64(30),
            Value::Bool(false),
        ])
    }

    #[test]
    fn test_entity_reads_and_coerces_columns() {
        let context = blog_context(QueryOptions::default());
        let mut builder = MaterializerBuilder::new(context.descriptors());
        let users = users(&mut builder);
        let cx = MaterializeContext {
            parameters: &[],
            resolver: &NoIdentityResolution,
            tracking: TrackingState::NoTracking,
        };
        let Object::Entity(user) = users.materialize(&user_row(7, "ann"), &cx).unwrap() else {
            panic!("expected an entity");
        };
        assert_eq!(user.entity_type(), "User");
        assert_eq!(user.get("name"), Some(&Value::String("ann".into())));
        // age is declared Int32; the backend handed back Int64
        assert_eq!(user.get("age"), Some(&Value::Int32(30)));
    }

    #[test]
    fn test_null_key_is_no_entity() {
        let context = blog_context(QueryOptions::default());
        let mut builder = MaterializerBuilder::new(context.descriptors());
        let users = users(&mut builder);
        let cx = MaterializeContext {
            parameters: &[],
            resolver: &NoIdentityResolution,
            tracking: TrackingState::NoTracking,
        };
        let row = Row::new(vec![Value::Null; 5]);
        assert!(users.materialize(&row, &cx).unwrap().is_null());
    }

    #[test]
    fn test_grouping_collects_adjacent_children() {
        let context = blog_context(QueryOptions::default());
        let descriptors = context.descriptors();
        let mut builder = MaterializerBuilder::new(descriptors);
        let post = EntityProjection::from_table(descriptors.entity("Post").unwrap().clone(), "t0");
        let comment =
            EntityProjection::from_table(descriptors.entity("Comment").unwrap().clone(), "t1");
        let grouping = builder
            .grouping(post, vec![("comments".into(), comment)])
            .unwrap();

        let row = |post: i64, comment: Option<i64>| {
            let mut values = vec![
                Value::Int64(post),
                Value::Null,
                Value::String(format!("post {post}")),
                Value::Int32(0),
                Value::Null,
            ];
            match comment {
                Some(id) => values.extend([Value::Int64(id), Value::Int64(post), "hi".into()]),
                None => values.extend([Value::Null, Value::Null, Value::Null]),
            }
            Ok(Row::new(values))
        };
        let identity = IdentityMap::new();
        let cx = MaterializeContext {
            parameters: &[],
            resolver: &identity,
            tracking: TrackingState::Tracked,
        };
        let posts = grouping
            .materialize_all(vec![row(1, Some(10)), row(1, Some(11)), row(2, None)], &cx)
            .unwrap();

        assert_eq!(posts.len(), 2);
        let first = posts[0].as_entity().unwrap();
        assert_eq!(first.navigation("comments").unwrap().as_list().unwrap().len(), 2);
        let second = posts[1].as_entity().unwrap();
        assert_eq!(second.navigation("comments"), Some(Object::List(vec![])));
    }
}
