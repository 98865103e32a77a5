//! Translation-time element projections.

use std::sync::Arc;

use quarry_expr::{Expr, Lambda, Type};

use crate::descriptor::EntityDescriptor;
use crate::sql::{OrderItem, SelectItem, SelectStatement, SqlExpr, TableSource};

/// How the element of a query under translation maps onto SQL.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    Scalar { expr: SqlExpr, ty: Type },
    Entity(EntityProjection),
    Record(Vec<(String, Projection)>),
    /// Evaluated client-side over the materialized `inputs`, bound by name.
    Client {
        body: Expr,
        inputs: Vec<(String, Projection)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EntityProjection {
    pub descriptor: Arc<EntityDescriptor>,
    /// One expression per descriptor column, in descriptor order.
    pub columns: Vec<SqlExpr>,
    /// Whether the entity may be absent (the inner side of a left join).
    pub nullable: bool,
    pub includes: Vec<IncludeProjection>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IncludeProjection {
    Reference {
        member: String,
        projection: EntityProjection,
    },
    /// The correlated child sequence as a function of the parent entity.
    Collection { member: String, template: Lambda },
}

impl EntityProjection {
    /// Every column of `descriptor` read from the table aliased `alias`.
    pub fn from_table(descriptor: Arc<EntityDescriptor>, alias: &str) -> Self {
        let columns = descriptor
            .columns
            .iter()
            .map(|c| SqlExpr::column(alias, &c.column))
            .collect();
        Self {
            descriptor,
            columns,
            nullable: false,
            includes: Vec::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.descriptor.name
    }

    /// The projection of a column member, typed nullable when the entity
    /// may be absent.
    pub fn column(&self, member: &str) -> Option<Projection> {
        let (index, column) = self.descriptor.column(member)?;
        let ty = if self.nullable {
            column.ty.to_nullable()
        } else {
            column.ty.clone()
        };
        Some(Projection::Scalar {
            expr: self.columns[index].clone(),
            ty,
        })
    }

    /// The projection of an included reference navigation.
    pub fn reference(&self, member: &str) -> Option<Projection> {
        self.includes.iter().find_map(|include| match include {
            IncludeProjection::Reference {
                member: m,
                projection,
            } if m == member => Some(Projection::Entity(projection.clone())),
            _ => None,
        })
    }

    /// The entity with its collection includes split off.
    pub fn split_collections(mut self) -> (Self, Vec<(String, Lambda)>) {
        let mut collections = Vec::new();
        self.includes.retain(|include| match include {
            IncludeProjection::Collection { member, template } => {
                collections.push((member.clone(), template.clone()));
                false
            }
            IncludeProjection::Reference { .. } => true,
        });
        (self, collections)
    }

    fn for_each_expr_mut(&mut self, f: &mut impl FnMut(&mut SqlExpr)) {
        self.columns.iter_mut().for_each(&mut *f);
        for include in &mut self.includes {
            if let IncludeProjection::Reference { projection, .. } = include {
                projection.for_each_expr_mut(f);
            }
        }
    }

    fn into_nullable(mut self) -> Self {
        self.nullable = true;
        for include in &mut self.includes {
            if let IncludeProjection::Reference { projection, .. } = include {
                *projection = projection.clone().into_nullable();
            }
        }
        self
    }

    pub(crate) fn has_collection(&self) -> bool {
        self.includes.iter().any(|include| match include {
            IncludeProjection::Collection { .. } => true,
            IncludeProjection::Reference { projection, .. } => projection.has_collection(),
        })
    }
}

impl Projection {
    pub fn for_each_expr_mut(&mut self, f: &mut impl FnMut(&mut SqlExpr)) {
        match self {
            Projection::Scalar { expr, .. } => f(expr),
            Projection::Entity(entity) => entity.for_each_expr_mut(f),
            Projection::Record(fields) => {
                for (_, field) in fields {
                    field.for_each_expr_mut(f);
                }
            }
            Projection::Client { inputs, .. } => {
                for (_, input) in inputs {
                    input.for_each_expr_mut(f);
                }
            }
        }
    }

    /// The projection as seen through the inner side of a left join.
    pub fn into_nullable(self) -> Self {
        match self {
            Projection::Scalar { expr, ty } => Projection::Scalar {
                expr,
                ty: ty.to_nullable(),
            },
            Projection::Entity(entity) => Projection::Entity(entity.into_nullable()),
            Projection::Record(fields) => Projection::Record(
                fields
                    .into_iter()
                    .map(|(name, field)| (name, field.into_nullable()))
                    .collect(),
            ),
            Projection::Client { body, inputs } => Projection::Client {
                body,
                inputs: inputs
                    .into_iter()
                    .map(|(name, input)| (name, input.into_nullable()))
                    .collect(),
            },
        }
    }

    /// Check if a collection include appears anywhere in the projection.
    pub fn has_collection(&self) -> bool {
        match self {
            Projection::Scalar { .. } => false,
            Projection::Entity(entity) => entity.has_collection(),
            Projection::Record(fields) => fields.iter().any(|(_, f)| f.has_collection()),
            Projection::Client { inputs, .. } => inputs.iter().any(|(_, i)| i.has_collection()),
        }
    }
}

/// A query under translation: a statement plus the projection of its
/// element over the statement's sources.
#[derive(Debug, Clone)]
pub(crate) struct QueryModel {
    pub statement: SelectStatement,
    pub element: Projection,
}

impl QueryModel {
    /// Check if `LIMIT` or `OFFSET` constrain the rows.
    pub fn has_row_limit(&self) -> bool {
        self.statement.limit.is_some() || self.statement.offset.is_some()
    }

    /// Check if the statement is a plain filtered table scan.
    pub fn is_simple(&self) -> bool {
        let s = &self.statement;
        matches!(s.from, Some(TableSource::Table { .. }))
            && s.joins.is_empty()
            && s.order_by.is_empty()
            && !s.is_limited()
    }

    /// Turn the statement into a derived table aliased `alias`.
    ///
    /// Every expression of the element projection becomes a column `cN`
    /// of the derived table and the projection is rewritten to read those
    /// columns. The ordering is returned over the derived columns for the
    /// enclosing statement; the derived table keeps its own `ORDER BY` only
    /// when a `LIMIT` or `OFFSET` depends on it.
    pub fn derive(self, alias: &str) -> (TableSource, Projection, Vec<OrderItem>) {
        let QueryModel {
            mut statement,
            mut element,
        } = self;
        let mut columns: Vec<SqlExpr> = Vec::new();
        let mut lift = |expr: &mut SqlExpr| {
            let index = match columns.iter().position(|c| c == expr) {
                Some(index) => index,
                None => {
                    columns.push(expr.clone());
                    columns.len() - 1
                }
            };
            *expr = SqlExpr::column(alias, format!("c{index}"));
        };

        element.for_each_expr_mut(&mut lift);
        let order = if statement.distinct {
            Vec::new()
        } else {
            statement
                .order_by
                .iter()
                .map(|item| {
                    let mut expr = item.expr.clone();
                    lift(&mut expr);
                    OrderItem {
                        expr,
                        descending: item.descending,
                    }
                })
                .collect()
        };
        if statement.limit.is_none() && statement.offset.is_none() {
            statement.order_by.clear();
        }
        statement.projection = columns
            .into_iter()
            .enumerate()
            .map(|(i, expr)| SelectItem::aliased(expr, format!("c{i}")))
            .collect();

        let source = TableSource::Derived {
            query: Box::new(statement),
            alias: alias.to_string(),
        };
        (source, element, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ColumnDescriptor;
    use quarry_expr::Value;

    fn users() -> Arc<EntityDescriptor> {
        Arc::new(EntityDescriptor {
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
                    ty: Type::string(),
                },
            ],
        })
    }

    fn model() -> QueryModel {
        let mut statement = SelectStatement::from_source(TableSource::Table {
            name: "users".into(),
            alias: "t0".into(),
        });
        statement.order_by.push(OrderItem {
            expr: SqlExpr::column("t0", "age"),
            descending: false,
        });
        QueryModel {
            statement,
            element: Projection::Entity(EntityProjection::from_table(users(), "t0")),
        }
    }

    #[test]
    fn test_column_reads_are_typed_by_nullability() {
        let entity = EntityProjection::from_table(users(), "t0");
        assert_eq!(
            entity.column("name"),
            Some(Projection::Scalar {
                expr: SqlExpr::column("t0", "user_name"),
                ty: Type::string(),
            })
        );
        let Some(Projection::Scalar { ty, .. }) = entity.into_nullable().column("id") else {
            panic!("expected a scalar");
        };
        assert!(ty.is_nullable());
    }

    #[test]
    fn test_derive_without_limit_moves_ordering_out() {
        let (source, element, order) = model().derive("d0");
        let TableSource::Derived { query, alias } = source else {
            panic!("expected a derived table");
        };
        assert_eq!(alias, "d0");
        assert!(query.order_by.is_empty());
        // id, name, then the order key
        assert_eq!(query.projection.len(), 3);
        assert_eq!(order[0].expr, SqlExpr::column("d0", "c2"));

        let Projection::Entity(entity) = element else {
            panic!("expected an entity");
        };
        assert_eq!(entity.columns[1], SqlExpr::column("d0", "c1"));
    }

    #[test]
    fn test_derive_with_limit_keeps_inner_ordering() {
        let mut limited = model();
        limited.statement.limit = Some(SqlExpr::Literal(Value::Int32(3)));
        let (TableSource::Derived { query, .. }, _, order) = limited.derive("d1") else {
            panic!("expected a derived table");
        };
        assert_eq!(query.order_by.len(), 1);
        assert_eq!(order.len(), 1);
    }
}
