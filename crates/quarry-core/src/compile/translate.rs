//! Expression to statement translation.
//!
//! Walks a composed and optimized query tree and builds a
//! [`SelectStatement`] together with the [`Projection`] of its element.
//! Query operators stack onto one statement as long as SQL evaluation
//! order allows; an operator that would observe the wrong rows (a filter
//! after a `LIMIT`, a limit after a limit) pushes the statement so far down
//! into a derived table first.

use quarry_expr::{
    fresh_parameter, BinaryOp, Constant, Expr, Lambda, Method, Parameter, QueryMethod, QueryRoot,
    ScalarType, Type, UnaryOp, Value,
};

use super::projection::{EntityProjection, IncludeProjection, Projection, QueryModel};
use super::shape::SingleKind;
use crate::descriptor::{DescriptorSet, PrimaryKeyDescriptor};
use crate::error::{Error, Result};
use crate::eval::default_value;
use crate::sql::{
    Join, JoinKind, OrderItem, SelectItem, SelectStatement, SqlExpr, SqlFunction, SqlOp,
    TableSource,
};
use crate::visitor::compose::{key_parts, replace};
use crate::visitor::rewrite::TranslatabilityAnalyzer;

/// Lambda parameters in scope, innermost last.
pub(crate) type Scope = Vec<(String, Projection)>;

/// The translated form of a whole query.
#[derive(Debug)]
pub(crate) enum Translation {
    /// One element per row.
    Rows {
        statement: SelectStatement,
        element: Projection,
        kind: Option<SingleKind>,
    },
    /// A single value in the first column of the first row.
    Scalar { statement: SelectStatement, ty: Type },
    /// Parent rows left-joined to their collection includes, ordered so
    /// that each parent's rows are adjacent.
    Grouped {
        statement: SelectStatement,
        parent: EntityProjection,
        collections: Vec<(String, EntityProjection)>,
        kind: Option<SingleKind>,
    },
}

pub(crate) struct Translator<'a> {
    descriptors: &'a DescriptorSet,
    analyzer: TranslatabilityAnalyzer,
    tables: usize,
    derived: usize,
}

impl<'a> Translator<'a> {
    pub fn new(descriptors: &'a DescriptorSet) -> Self {
        Self {
            descriptors,
            analyzer: TranslatabilityAnalyzer,
            tables: 0,
            derived: 0,
        }
    }

    /// Translate a top-level query.
    pub fn translate(&mut self, expr: &Expr) -> Result<Translation> {
        let scope = Scope::new();
        match expr.as_query_call() {
            Some((method, args)) if method.returns_element() && args.len() == 2 => {
                let filtered = Expr::query_call(QueryMethod::Where, args.to_vec());
                self.translate(&Expr::query_call(method, vec![filtered]))
            }
            Some((method, _)) if method.returns_sequence() => {
                let model = self.query(expr, &scope)?;
                self.rows(model, None)
            }
            Some((method, [source])) if method.returns_element() => {
                let kind = SingleKind::from_method(method)
                    .ok_or_else(|| Error::Compile(format!("{} is not an element operator", method.name())))?;
                let model = self.query(source, &scope)?;
                self.rows(model, Some(kind))
            }
            None if matches!(expr, Expr::Constant(Constant::Query(_))) => {
                let model = self.query(expr, &scope)?;
                self.rows(model, None)
            }
            _ => match self.value(expr, &scope)? {
                Projection::Scalar { expr, ty } => {
                    let statement = match expr {
                        SqlExpr::Subquery(statement) => *statement,
                        other => SelectStatement {
                            projection: vec![SelectItem::new(other)],
                            ..Default::default()
                        },
                    };
                    Ok(Translation::Scalar { statement, ty })
                }
                _ => Err(Error::untranslatable("a top-level value that is not a scalar")),
            },
        }
    }

    fn rows(&mut self, mut model: QueryModel, kind: Option<SingleKind>) -> Result<Translation> {
        if let Some(kind) = kind {
            if model.statement.limit.is_some() {
                model = self.push_down(model);
            }
            model.statement.limit = Some(SqlExpr::Literal(Value::Int32(kind.row_limit())));
        }
        if !model.element.has_collection() {
            return Ok(Translation::Rows {
                statement: model.statement,
                element: model.element,
                kind,
            });
        }

        if !matches!(model.element, Projection::Entity(_)) {
            return Err(Error::untranslatable(
                "collection include below the top-level entity",
            ));
        }
        if model.has_row_limit() || model.statement.distinct {
            model = self.push_down(model);
        }
        let QueryModel {
            mut statement,
            element,
        } = model;
        let Projection::Entity(entity) = element else {
            return Err(Error::Compile("include parent lost its entity projection".into()));
        };
        let (parent, collections) = entity.split_collections();
        if parent.has_collection() {
            return Err(Error::untranslatable("collection include inside a reference include"));
        }

        let mut children = Vec::with_capacity(collections.len());
        for (member, template) in collections {
            let param = template
                .param()
                .ok_or_else(|| Error::Compile(format!("include template for {member} is not unary")))?;
            let scope = vec![(param.name.clone(), Projection::Entity(parent.clone()))];
            let child = self.query(&template.body, &scope)?;
            if !child.is_simple() {
                return Err(Error::untranslatable(format!(
                    "collection include {member} over a composed sequence"
                )));
            }
            let QueryModel {
                statement: child_statement,
                element: child_element,
            } = child;
            let Projection::Entity(child_entity) = child_element else {
                return Err(Error::untranslatable(format!(
                    "collection include {member} of non-entity elements"
                )));
            };
            if child_entity.has_collection() {
                return Err(Error::untranslatable("nested collection include"));
            }
            let source = child_statement
                .from
                .ok_or_else(|| Error::Compile(format!("include {member} has no source")))?;
            statement.joins.push(Join {
                kind: JoinKind::Left,
                source,
                on: child_statement
                    .filter
                    .unwrap_or(SqlExpr::Literal(Value::Bool(true))),
            });
            children.push((member, child_entity));
        }

        let parent_key = self.key_columns(&parent)?;
        statement.order_by.extend(parent_key.into_iter().map(ascending));
        for (_, child) in &children {
            let child_key = self.key_columns(child)?;
            statement.order_by.extend(child_key.into_iter().map(ascending));
        }
        Ok(Translation::Grouped {
            statement,
            parent,
            collections: children,
            kind,
        })
    }

    fn table_alias(&mut self) -> String {
        let alias = format!("t{}", self.tables);
        self.tables += 1;
        alias
    }

    fn derived_alias(&mut self) -> String {
        let alias = format!("d{}", self.derived);
        self.derived += 1;
        alias
    }

    fn push_down(&mut self, model: QueryModel) -> QueryModel {
        let alias = self.derived_alias();
        let (source, element, order_by) = model.derive(&alias);
        let mut statement = SelectStatement::from_source(source);
        statement.order_by = order_by;
        QueryModel { statement, element }
    }

    fn key_columns(&self, entity: &EntityProjection) -> Result<Vec<SqlExpr>> {
        let key = self.descriptors.primary_key(entity.entity())?;
        key_members(key)?
            .iter()
            .map(|member| {
                entity
                    .descriptor
                    .column(member)
                    .map(|(index, _)| entity.columns[index].clone())
                    .ok_or_else(|| Error::UnknownMember {
                        entity: entity.entity().to_string(),
                        member: member.clone(),
                    })
            })
            .collect()
    }

    /// Translate a sequence-valued expression.
    pub fn query(&mut self, expr: &Expr, scope: &Scope) -> Result<QueryModel> {
        match expr {
            Expr::Constant(Constant::Query(QueryRoot::EntitySet { entity, .. })) => {
                let descriptor = self.descriptors.entity(entity)?.clone();
                let alias = self.table_alias();
                let source = TableSource::Table {
                    name: descriptor.table.clone(),
                    alias: alias.clone(),
                };
                Ok(QueryModel {
                    statement: SelectStatement::from_source(source),
                    element: Projection::Entity(EntityProjection::from_table(descriptor, &alias)),
                })
            }
            Expr::Constant(Constant::Query(QueryRoot::Expression(inner))) => self.query(inner, scope),
            Expr::Constant(Constant::Query(QueryRoot::Opaque { name, .. })) => Err(
                Error::untranslatable(format!("in-memory sequence {name} as a query source")),
            ),
            _ => {
                let (method, args) = expr.as_query_call().ok_or_else(|| {
                    Error::untranslatable(format!("{} as a query source", describe(expr)))
                })?;
                self.query_call(method, args, scope)
            }
        }
    }

    fn query_call(&mut self, method: QueryMethod, args: &[Expr], scope: &Scope) -> Result<QueryModel> {
        match (method, args) {
            (QueryMethod::Where, [source, predicate]) => {
                let mut model = self.query(source, scope)?;
                if model.has_row_limit() {
                    model = self.push_down(model);
                }
                let filter = self.apply_scalar(predicate, vec![model.element.clone()], scope)?;
                model.statement.and_filter(filter);
                Ok(model)
            }
            (QueryMethod::Select, [source, selector]) => {
                let mut model = self.query(source, scope)?;
                if model.statement.distinct {
                    model = self.push_down(model);
                }
                model.element = self.apply_selection(selector, vec![model.element.clone()], scope)?;
                Ok(model)
            }
            (
                QueryMethod::OrderBy
                | QueryMethod::OrderByDescending
                | QueryMethod::ThenBy
                | QueryMethod::ThenByDescending,
                [source, key],
            ) => {
                let mut model = self.query(source, scope)?;
                if model.has_row_limit() {
                    model = self.push_down(model);
                }
                let keys = scalars(self.apply_value(key, vec![model.element.clone()], scope)?)?;
                let descending = matches!(
                    method,
                    QueryMethod::OrderByDescending | QueryMethod::ThenByDescending
                );
                if matches!(method, QueryMethod::OrderBy | QueryMethod::OrderByDescending) {
                    model.statement.order_by.clear();
                }
                model
                    .statement
                    .order_by
                    .extend(keys.into_iter().map(|expr| OrderItem { expr, descending }));
                Ok(model)
            }
            (QueryMethod::Take, [source, count]) => {
                let mut model = self.query(source, scope)?;
                if model.statement.limit.is_some() {
                    model = self.push_down(model);
                }
                model.statement.limit = Some(self.scalar(count, scope)?);
                Ok(model)
            }
            (QueryMethod::Skip, [source, count]) => {
                let mut model = self.query(source, scope)?;
                if model.has_row_limit() {
                    model = self.push_down(model);
                }
                model.statement.offset = Some(self.scalar(count, scope)?);
                Ok(model)
            }
            (QueryMethod::Distinct, [source]) => {
                let mut model = self.query(source, scope)?;
                if model.has_row_limit() {
                    model = self.push_down(model);
                }
                model.statement.distinct = true;
                Ok(model)
            }
            (QueryMethod::Join | QueryMethod::LeftJoin, [outer, inner, outer_key, inner_key, result]) => {
                let mut model = self.query(outer, scope)?;
                if model.statement.is_limited() {
                    model = self.push_down(model);
                }
                let inner_model = self.query(inner, scope)?;
                let (source, inner_element, inner_filter) = if inner_model.is_simple() {
                    let QueryModel { statement, element } = inner_model;
                    let source = statement
                        .from
                        .ok_or_else(|| Error::Compile("join source has no table".into()))?;
                    (source, element, statement.filter)
                } else {
                    let alias = self.derived_alias();
                    let (source, element, _) = inner_model.derive(&alias);
                    (source, element, None)
                };

                let outer_keys =
                    scalars(self.apply_value(outer_key, vec![model.element.clone()], scope)?)?;
                let inner_keys =
                    scalars(self.apply_value(inner_key, vec![inner_element.clone()], scope)?)?;
                if outer_keys.len() != inner_keys.len() {
                    return Err(Error::Compile(format!(
                        "join keys differ in arity: {} and {}",
                        outer_keys.len(),
                        inner_keys.len()
                    )));
                }
                let on = outer_keys
                    .into_iter()
                    .zip(inner_keys)
                    .map(|(o, i)| o.eq(i))
                    .chain(inner_filter)
                    .reduce(SqlExpr::and)
                    .unwrap_or(SqlExpr::Literal(Value::Bool(true)));

                let (kind, inner_element) = if method == QueryMethod::LeftJoin {
                    (JoinKind::Left, inner_element.into_nullable())
                } else {
                    (JoinKind::Inner, inner_element)
                };
                model.statement.joins.push(Join { kind, source, on });
                model.element =
                    self.apply_selection(result, vec![model.element.clone(), inner_element], scope)?;
                Ok(model)
            }
            (method, _) => Err(Error::untranslatable(format!(
                "{} as a query source",
                method.name()
            ))),
        }
    }

    fn apply_value(&mut self, lambda: &Expr, args: Vec<Projection>, scope: &Scope) -> Result<Projection> {
        let (lambda, scope) = bind(lambda, args, scope)?;
        self.value(&lambda.body, &scope)
    }

    fn apply_scalar(&mut self, lambda: &Expr, args: Vec<Projection>, scope: &Scope) -> Result<SqlExpr> {
        scalar_of(self.apply_value(lambda, args, scope)?)
    }

    fn apply_selection(
        &mut self,
        lambda: &Expr,
        args: Vec<Projection>,
        scope: &Scope,
    ) -> Result<Projection> {
        let (lambda, scope) = bind(lambda, args, scope)?;
        self.selection(&lambda.body, &scope)
    }

    /// Translate a projection body, evaluating untranslatable parts on the
    /// client over translated inputs.
    fn selection(&mut self, body: &Expr, scope: &Scope) -> Result<Projection> {
        match self.value(body, scope) {
            Err(Error::Untranslatable(reason)) => {
                if self.analyzer.has_opaque_call(body) {
                    return Err(Error::Untranslatable(reason));
                }
                let mut inputs = Vec::new();
                let body = self.lift(body.clone(), scope, &mut inputs)?;
                Ok(Projection::Client { body, inputs })
            }
            other => other,
        }
    }

    /// Replace each maximal translatable subtree with a named input.
    fn lift(&mut self, expr: Expr, scope: &Scope, inputs: &mut Vec<(String, Projection)>) -> Result<Expr> {
        if matches!(expr, Expr::Lambda(_)) {
            return Err(Error::untranslatable("a lambda in a client-evaluated projection"));
        }
        if matches!(expr, Expr::Constant(_)) {
            return Ok(expr);
        }
        match self.value(&expr, scope) {
            Ok(projection) => {
                let input = Parameter::new(format!("__c{}", inputs.len()), expr.ty());
                inputs.push((input.name.clone(), projection));
                Ok(input.to_expr())
            }
            Err(Error::Untranslatable(_)) => {
                expr.try_map_children(&mut |child| self.lift(child, scope, inputs))
            }
            Err(e) => Err(e),
        }
    }

    fn scalar(&mut self, expr: &Expr, scope: &Scope) -> Result<SqlExpr> {
        scalar_of(self.value(expr, scope)?)
    }

    /// Translate a value-position expression.
    pub fn value(&mut self, expr: &Expr, scope: &Scope) -> Result<Projection> {
        match expr {
            Expr::Constant(Constant::Literal(value)) => {
                Ok(scalar(SqlExpr::Literal(value.clone()), expr.ty()))
            }
            Expr::Constant(Constant::Captured { .. }) => Err(Error::Compile(
                "captured value reached translation unparameterized".into(),
            )),
            Expr::Constant(Constant::Query(_)) => {
                Err(Error::untranslatable("a sequence where a value is expected"))
            }
            Expr::Parameter(p) => self.parameter(p, scope),
            Expr::Member { target, name, .. } => self.member(target, name, scope),
            Expr::Call {
                method,
                target,
                args,
                ty,
            } => self.call(method, target.as_deref(), args, ty, scope),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                let when = self.scalar(test, scope)?;
                let then = self.scalar(if_true, scope)?;
                let otherwise = self.scalar(if_false, scope)?;
                Ok(scalar(
                    SqlExpr::Case {
                        when: Box::new(when),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                    expr.ty(),
                ))
            }
            Expr::Lambda(_) => Err(Error::untranslatable("a lambda where a value is expected")),
            Expr::Binary { op, left, right } => {
                let translated = self.binary(*op, left, right, scope)?;
                Ok(scalar(translated, expr.ty()))
            }
            Expr::Unary { op, operand } => {
                let inner = self.scalar(operand, scope)?;
                let translated = match op {
                    UnaryOp::Not => inner.not(),
                    UnaryOp::Negate => SqlExpr::Negate(Box::new(inner)),
                    UnaryOp::Convert(target) if operand.ty().scalar() == Some(*target) => inner,
                    UnaryOp::Convert(target) => SqlExpr::Cast {
                        expr: Box::new(inner),
                        ty: *target,
                    },
                };
                Ok(scalar(translated, expr.ty()))
            }
            Expr::New { members } => {
                let mut fields = Vec::with_capacity(members.len());
                for (name, member) in members {
                    fields.push((name.clone(), self.value(member, scope)?));
                }
                Ok(Projection::Record(fields))
            }
            Expr::In { item, set } => {
                let translated = self.in_set(item, set, scope)?;
                Ok(scalar(translated, Type::bool()))
            }
            Expr::Include {
                entity,
                member,
                value,
            } => self.include(entity, member, value, scope),
        }
    }

    fn parameter(&mut self, p: &Parameter, scope: &Scope) -> Result<Projection> {
        if let Some(slot) = p.slot {
            if p.ty.is_sequence() {
                return Err(Error::untranslatable(format!(
                    "list parameter {} outside an IN predicate",
                    p.name
                )));
            }
            return Ok(scalar(SqlExpr::Parameter(slot), p.ty.clone()));
        }
        scope
            .iter()
            .rev()
            .find(|(name, _)| *name == p.name)
            .map(|(_, projection)| projection.clone())
            .ok_or_else(|| Error::untranslatable(format!("unbound parameter {}", p.name)))
    }

    fn member(&mut self, target: &Expr, name: &str, scope: &Scope) -> Result<Projection> {
        match self.value(target, scope)? {
            Projection::Entity(entity) => entity
                .column(name)
                .or_else(|| entity.reference(name))
                .ok_or_else(|| {
                    Error::untranslatable(format!("{}.{name} is not a mapped column", entity.entity()))
                }),
            Projection::Record(fields) => fields
                .into_iter()
                .find(|(field, _)| field == name)
                .map(|(_, projection)| projection)
                .ok_or_else(|| Error::UnknownMember {
                    entity: "record".into(),
                    member: name.to_string(),
                }),
            _ => Err(Error::untranslatable(format!("member {name} of a scalar"))),
        }
    }

    fn call(
        &mut self,
        method: &Method,
        target: Option<&Expr>,
        args: &[Expr],
        ty: &Type,
        scope: &Scope,
    ) -> Result<Projection> {
        let function = match method {
            Method::Query(q) => return self.subquery(*q, args, ty, scope),
            Method::StringContains => SqlFunction::Contains,
            Method::StartsWith => SqlFunction::StartsWith,
            Method::EndsWith => SqlFunction::EndsWith,
            Method::ToUpper => SqlFunction::Upper,
            Method::ToLower => SqlFunction::Lower,
            Method::Trim => SqlFunction::Trim,
            Method::StringLength => SqlFunction::Length,
            Method::DatePart(part) => SqlFunction::DatePart(*part),
            Method::GetValueOrDefault => {
                let Some(target) = target else {
                    return Err(Error::Compile("GetValueOrDefault without a target".into()));
                };
                let value = self.scalar(target, scope)?;
                let fallback = match args.first() {
                    Some(fallback) => self.scalar(fallback, scope)?,
                    None => {
                        let scalar_type = target.ty().scalar().ok_or_else(|| {
                            Error::untranslatable("GetValueOrDefault on a non-scalar")
                        })?;
                        SqlExpr::Literal(default_value(scalar_type))
                    }
                };
                return Ok(scalar(
                    SqlExpr::function(SqlFunction::Coalesce, vec![value, fallback]),
                    ty.clone(),
                ));
            }
            Method::Contains => {
                return Err(Error::untranslatable("Contains over an in-memory collection"))
            }
            Method::Custom(name) => {
                return Err(Error::untranslatable(format!("method {name} has no translation")))
            }
        };
        let mut operands = Vec::with_capacity(args.len() + 1);
        for operand in target.into_iter().chain(args) {
            operands.push(self.scalar(operand, scope)?);
        }
        Ok(scalar(SqlExpr::function(function, operands), ty.clone()))
    }

    /// A query operator in value position: a correlated sub-query.
    fn subquery(&mut self, method: QueryMethod, args: &[Expr], ty: &Type, scope: &Scope) -> Result<Projection> {
        if method.takes_predicate() && args.len() == 2 {
            let filtered = Expr::query_call(QueryMethod::Where, args.to_vec());
            return self.value(&Expr::query_call(method, vec![filtered]), scope);
        }
        match (method, args) {
            (QueryMethod::Count, [source]) => {
                let mut model = self.aggregate_source(source, scope)?;
                model.statement.projection = vec![SelectItem::new(SqlExpr::CountStar)];
                model.statement.order_by.clear();
                Ok(scalar(SqlExpr::Subquery(Box::new(model.statement)), Type::int32()))
            }
            (
                QueryMethod::Sum | QueryMethod::Min | QueryMethod::Max | QueryMethod::Average,
                [source, rest @ ..],
            ) => {
                let mut model = self.aggregate_source(source, scope)?;
                let value = match rest {
                    [] => scalar_of(model.element.clone())?,
                    [selector] => self.apply_scalar(selector, vec![model.element.clone()], scope)?,
                    _ => {
                        return Err(Error::Compile(format!(
                            "{} takes at most a selector",
                            method.name()
                        )))
                    }
                };
                let function = match method {
                    QueryMethod::Sum => SqlFunction::Sum,
                    QueryMethod::Min => SqlFunction::Min,
                    QueryMethod::Max => SqlFunction::Max,
                    _ => SqlFunction::Avg,
                };
                let mut aggregate = SqlExpr::function(function, vec![value]);
                if method == QueryMethod::Sum {
                    if let Some(scalar_type) = ty.scalar() {
                        aggregate = SqlExpr::function(
                            SqlFunction::Coalesce,
                            vec![aggregate, SqlExpr::Literal(default_value(scalar_type))],
                        );
                    }
                }
                model.statement.projection = vec![SelectItem::new(aggregate)];
                model.statement.order_by.clear();
                Ok(scalar(SqlExpr::Subquery(Box::new(model.statement)), ty.clone()))
            }
            (QueryMethod::Any, [source]) => {
                let mut model = self.query(source, scope)?;
                model.statement.projection = Vec::new();
                if !model.has_row_limit() {
                    model.statement.order_by.clear();
                }
                Ok(scalar(SqlExpr::Exists(Box::new(model.statement)), Type::bool()))
            }
            (QueryMethod::All, [source, predicate]) => {
                let mut model = self.query(source, scope)?;
                if model.has_row_limit() {
                    model = self.push_down(model);
                }
                let holds = self.apply_scalar(predicate, vec![model.element.clone()], scope)?;
                let fails = SqlExpr::function(
                    SqlFunction::Coalesce,
                    vec![holds, SqlExpr::Literal(Value::Bool(false))],
                )
                .not();
                model.statement.and_filter(fails);
                model.statement.projection = Vec::new();
                model.statement.order_by.clear();
                Ok(scalar(
                    SqlExpr::Exists(Box::new(model.statement)).not(),
                    Type::bool(),
                ))
            }
            (
                QueryMethod::First
                | QueryMethod::FirstOrDefault
                | QueryMethod::Single
                | QueryMethod::SingleOrDefault,
                [source],
            ) => {
                let mut model = self.query(source, scope)?;
                if model.statement.limit.is_some() {
                    model = self.push_down(model);
                }
                let value = scalar_of(model.element)
                    .map_err(|_| Error::untranslatable(format!("{} of non-scalar elements in a value position", method.name())))?;
                model.statement.projection = vec![SelectItem::new(value)];
                model.statement.limit = Some(SqlExpr::Literal(Value::Int32(1)));
                Ok(scalar(SqlExpr::Subquery(Box::new(model.statement)), ty.to_nullable()))
            }
            (method, _) => Err(Error::untranslatable(format!(
                "{} in a value position",
                method.name()
            ))),
        }
    }

    /// The source of an aggregate, with row limits and `DISTINCT` applied
    /// before aggregation.
    fn aggregate_source(&mut self, source: &Expr, scope: &Scope) -> Result<QueryModel> {
        let model = self.query(source, scope)?;
        if model.statement.is_limited() {
            Ok(self.push_down(model))
        } else {
            Ok(model)
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, scope: &Scope) -> Result<SqlExpr> {
        if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual)
            && (left.is_null_literal() || right.is_null_literal())
        {
            let equal = op == BinaryOp::Equal;
            if left.is_null_literal() && right.is_null_literal() {
                return Ok(SqlExpr::Literal(Value::Bool(equal)));
            }
            let operand = if left.is_null_literal() { right } else { left };
            let tested = self.null_tested(operand, scope)?;
            return Ok(if equal {
                SqlExpr::IsNull(Box::new(tested))
            } else {
                SqlExpr::IsNotNull(Box::new(tested))
            });
        }

        let l = self.scalar(left, scope)?;
        let r = self.scalar(right, scope)?;
        let op = match op {
            BinaryOp::Equal => SqlOp::Eq,
            BinaryOp::NotEqual => SqlOp::Ne,
            BinaryOp::LessThan => SqlOp::Lt,
            BinaryOp::LessThanOrEqual => SqlOp::Le,
            BinaryOp::GreaterThan => SqlOp::Gt,
            BinaryOp::GreaterThanOrEqual => SqlOp::Ge,
            BinaryOp::AndAlso => SqlOp::And,
            BinaryOp::OrElse => SqlOp::Or,
            BinaryOp::Add if left.ty().scalar() == Some(ScalarType::String) => SqlOp::Concat,
            BinaryOp::Add => SqlOp::Add,
            BinaryOp::Subtract => SqlOp::Sub,
            BinaryOp::Multiply => SqlOp::Mul,
            BinaryOp::Divide => SqlOp::Div,
            BinaryOp::Modulo => SqlOp::Mod,
            BinaryOp::Coalesce => {
                return Ok(SqlExpr::function(SqlFunction::Coalesce, vec![l, r]));
            }
        };
        Ok(SqlExpr::binary(op, l, r))
    }

    /// The expression whose nullness stands for `expr` being null: the value
    /// itself, or the first key column of an entity.
    fn null_tested(&mut self, expr: &Expr, scope: &Scope) -> Result<SqlExpr> {
        match self.value(expr, scope)? {
            Projection::Scalar { expr, .. } => Ok(expr),
            Projection::Entity(entity) => self
                .key_columns(&entity)?
                .into_iter()
                .next()
                .ok_or_else(|| Error::Compile(format!("{} has an empty key", entity.entity()))),
            _ => Err(Error::untranslatable("null test on a record")),
        }
    }

    fn in_set(&mut self, item: &Expr, set: &Expr, scope: &Scope) -> Result<SqlExpr> {
        let item = Box::new(self.scalar(item, scope)?);
        if let Expr::Parameter(Parameter { slot: Some(slot), .. }) = set {
            return Ok(SqlExpr::InList { item, slot: *slot });
        }
        let mut model = self.query(set, scope)?;
        let limited = model.has_row_limit();
        let value = scalar_of(model.element)?;
        model.statement.projection = vec![SelectItem::new(value)];
        if !limited {
            model.statement.order_by.clear();
        }
        Ok(SqlExpr::InSubquery {
            item,
            query: Box::new(model.statement),
        })
    }

    fn include(&mut self, entity: &Expr, member: &str, value: &Expr, scope: &Scope) -> Result<Projection> {
        let Projection::Entity(mut parent) = self.value(entity, scope)? else {
            return Err(Error::untranslatable(format!("include {member} on a non-entity")));
        };
        if value.ty().is_sequence() {
            let param = fresh_parameter(entity.ty());
            let body = replace(value.clone(), entity, &param.to_expr());
            parent.includes.push(IncludeProjection::Collection {
                member: member.to_string(),
                template: Lambda::new(vec![param], body),
            });
        } else {
            let Projection::Entity(target) = self.value(value, scope)? else {
                return Err(Error::untranslatable(format!("include {member} of a non-entity")));
            };
            parent.includes.push(IncludeProjection::Reference {
                member: member.to_string(),
                projection: target,
            });
        }
        Ok(Projection::Entity(parent))
    }
}

/// Member names read by a primary key selector, in key order.
pub(crate) fn key_members(key: &PrimaryKeyDescriptor) -> Result<Vec<String>> {
    key_parts((*key.key_selector.body).clone())
        .into_iter()
        .map(|part| match part {
            Expr::Member { name, .. } => Ok(name),
            _ => Err(Error::Compile(format!(
                "key selector of {} must read members",
                key.entity()
            ))),
        })
        .collect()
}

fn bind<'e>(lambda: &'e Expr, args: Vec<Projection>, scope: &Scope) -> Result<(&'e Lambda, Scope)> {
    let lambda = match lambda.as_lambda() {
        Some(lambda) if lambda.params.len() == args.len() => lambda,
        _ => {
            return Err(Error::Compile(format!(
                "expected a lambda of {} parameter(s), found {}",
                args.len(),
                describe(lambda)
            )))
        }
    };
    let mut scope = scope.clone();
    scope.extend(lambda.params.iter().map(|p| p.name.clone()).zip(args));
    Ok((lambda, scope))
}

fn scalar(expr: SqlExpr, ty: Type) -> Projection {
    Projection::Scalar { expr, ty }
}

fn scalar_of(projection: Projection) -> Result<SqlExpr> {
    match projection {
        Projection::Scalar { expr, .. } => Ok(expr),
        _ => Err(Error::untranslatable("a composite value where a scalar is expected")),
    }
}

/// Flatten a key projection into its scalar parts.
fn scalars(projection: Projection) -> Result<Vec<SqlExpr>> {
    match projection {
        Projection::Scalar { expr, .. } => Ok(vec![expr]),
        Projection::Record(fields) => {
            let mut parts = Vec::new();
            for (_, field) in fields {
                parts.extend(scalars(field)?);
            }
            Ok(parts)
        }
        _ => Err(Error::untranslatable("an entity or client value used as a key")),
    }
}

fn ascending(expr: SqlExpr) -> OrderItem {
    OrderItem {
        expr,
        descending: false,
    }
}

fn describe(expr: &Expr) -> &'static str {
    match expr {
        Expr::Constant(_) => "constant",
        Expr::Parameter(_) => "parameter",
        Expr::Member { .. } => "member access",
        Expr::Call { .. } => "method call",
        Expr::Conditional { .. } => "conditional",
        Expr::Lambda(_) => "lambda",
        Expr::Binary { .. } => "binary expression",
        Expr::Unary { .. } => "unary expression",
        Expr::New { .. } => "record",
        Expr::In { .. } => "IN predicate",
        Expr::Include { .. } => "include",
    }
}
