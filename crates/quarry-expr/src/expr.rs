//! Expression tree nodes.
//!
//! The node vocabulary is closed: every visitor matches exhaustively on
//! [`Expr`], so adding a node kind is a compile error everywhere it is not
//! handled.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::method::{Method, QueryMethod};
use crate::types::Type;
use crate::value::{ParameterValue, ScalarType, Value};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Logical
    AndAlso,
    OrElse,
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// `left ?? right`.
    Coalesce,
}

impl BinaryOp {
    /// Check if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    /// Check if this is `&&` or `||`.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::AndAlso | BinaryOp::OrElse)
    }

    /// The comparison that holds exactly when this one is false (for
    /// non-null operands).
    pub fn negate_comparison(&self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Equal => Some(BinaryOp::NotEqual),
            BinaryOp::NotEqual => Some(BinaryOp::Equal),
            BinaryOp::LessThan => Some(BinaryOp::GreaterThanOrEqual),
            BinaryOp::LessThanOrEqual => Some(BinaryOp::GreaterThan),
            BinaryOp::GreaterThan => Some(BinaryOp::LessThanOrEqual),
            BinaryOp::GreaterThanOrEqual => Some(BinaryOp::LessThan),
            _ => None,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
    /// Conversion to a non-nullable scalar type.
    Convert(ScalarType),
}

/// A queryable source wrapped by a constant node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryRoot {
    /// The root set of an entity type (a table).
    EntitySet {
        /// Entity type name.
        entity: String,
        /// True once the entity's query filter has been composed over it.
        filtered: bool,
    },
    /// A composed queryable whose own expression is spliced in by inlining.
    Expression(Arc<Expr>),
    /// An in-memory sequence with no expression behind it.
    Opaque {
        /// Name used in diagnostics.
        name: String,
        /// Element type.
        element: ScalarType,
        /// Elements.
        values: Vec<Value>,
    },
}

/// Constant payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// Scalar literal. Part of the query shape.
    Literal(Value),
    /// Captured closure variable. Replaced by a synthetic parameter.
    Captured {
        /// Captured value.
        value: ParameterValue,
        /// Static type of the captured variable.
        ty: Type,
    },
    /// Queryable source.
    Query(QueryRoot),
}

/// A lambda or synthetic parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Static type.
    pub ty: Type,
    /// Slot in the parameter mapping for synthetic parameters, `None` for
    /// lambda parameters.
    pub slot: Option<usize>,
}

impl Parameter {
    /// Create a lambda parameter.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            slot: None,
        }
    }

    /// Create a synthetic parameter for mapping slot `slot`.
    pub fn synthetic(slot: usize, ty: Type) -> Self {
        Self {
            name: format!("__p{slot}"),
            ty,
            slot: Some(slot),
        }
    }

    /// Check if this is a synthetic parameter.
    pub fn is_synthetic(&self) -> bool {
        self.slot.is_some()
    }

    /// A reference to this parameter.
    pub fn to_expr(&self) -> Expr {
        Expr::Parameter(self.clone())
    }
}

/// A lambda expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    /// Parameters.
    pub params: Vec<Parameter>,
    /// Body.
    pub body: Box<Expr>,
}

impl Lambda {
    /// Create a lambda.
    pub fn new(params: Vec<Parameter>, body: Expr) -> Self {
        Self {
            params,
            body: Box::new(body),
        }
    }

    /// The single parameter of a one-argument lambda.
    pub fn param(&self) -> Option<&Parameter> {
        match self.params.as_slice() {
            [p] => Some(p),
            _ => None,
        }
    }
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Constant(Constant),
    Parameter(Parameter),
    Member {
        target: Box<Expr>,
        name: String,
        ty: Type,
    },
    Call {
        method: Method,
        target: Option<Box<Expr>>,
        args: Vec<Expr>,
        ty: Type,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Lambda(Lambda),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Record construction (`new { a = .., b = .. }`).
    New { members: Vec<(String, Expr)> },
    /// `item IN set`, produced by contains rewriting.
    In { item: Box<Expr>, set: Box<Expr> },
    /// An entity with an eager-loaded navigation attached.
    Include {
        entity: Box<Expr>,
        member: String,
        value: Box<Expr>,
    },
}

impl Expr {
    /// A scalar literal.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Constant(Constant::Literal(value.into()))
    }

    /// The null literal.
    pub fn null() -> Self {
        Expr::Constant(Constant::Literal(Value::Null))
    }

    /// A captured scalar variable, typed from its value.
    ///
    /// Use [`Expr::captured_typed`] for null or nullable captures.
    pub fn captured(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = value
            .scalar_type()
            .map(Type::Scalar)
            .unwrap_or(Type::Unknown);
        Self::captured_typed(ParameterValue::Scalar(value), ty)
    }

    /// A captured variable with an explicit static type.
    pub fn captured_typed(value: ParameterValue, ty: Type) -> Self {
        Expr::Constant(Constant::Captured { value, ty })
    }

    /// A captured collection of scalars.
    pub fn captured_list(values: Vec<Value>, element: ScalarType) -> Self {
        Self::captured_typed(
            ParameterValue::List(values),
            Type::sequence(Type::Scalar(element)),
        )
    }

    /// The root set of an entity type.
    pub fn entity_set(entity: impl Into<String>) -> Self {
        Expr::Constant(Constant::Query(QueryRoot::EntitySet {
            entity: entity.into(),
            filtered: false,
        }))
    }

    /// A composed queryable, spliced in by inlining.
    pub fn queryable(expr: Expr) -> Self {
        Expr::Constant(Constant::Query(QueryRoot::Expression(Arc::new(expr))))
    }

    /// An in-memory sequence.
    pub fn opaque(name: impl Into<String>, element: ScalarType, values: Vec<Value>) -> Self {
        Expr::Constant(Constant::Query(QueryRoot::Opaque {
            name: name.into(),
            element,
            values,
        }))
    }

    /// A lambda parameter reference.
    pub fn param(name: impl Into<String>, ty: Type) -> Self {
        Expr::Parameter(Parameter::new(name, ty))
    }

    /// A lambda.
    pub fn lambda(params: Vec<Parameter>, body: Expr) -> Self {
        Expr::Lambda(Lambda::new(params, body))
    }

    /// Member access with a type left for member binding to resolve.
    pub fn member(self, name: impl Into<String>) -> Self {
        self.member_typed(name, Type::Unknown)
    }

    /// Member access with a known type.
    pub fn member_typed(self, name: impl Into<String>, ty: Type) -> Self {
        Expr::Member {
            target: Box::new(self),
            name: name.into(),
            ty,
        }
    }

    /// An instance method call on `self`.
    pub fn call(self, method: Method, args: Vec<Expr>, ty: Type) -> Self {
        Expr::Call {
            method,
            target: Some(Box::new(self)),
            args,
            ty,
        }
    }

    /// A query operator call. The result type is derived from the operands.
    pub fn query_call(method: QueryMethod, args: Vec<Expr>) -> Self {
        let ty = query_result_type(method, &args);
        Expr::Call {
            method: Method::Query(method),
            target: None,
            args,
            ty,
        }
    }

    /// A record construction.
    pub fn new_record(members: Vec<(String, Expr)>) -> Self {
        Expr::New { members }
    }

    /// A conditional.
    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// A binary node.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// A unary node.
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// `self == other`.
    pub fn eq(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Equal, self, other)
    }

    /// `self != other`.
    pub fn ne(self, other: Expr) -> Self {
        Self::binary(BinaryOp::NotEqual, self, other)
    }

    /// `self < other`.
    pub fn lt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::LessThan, self, other)
    }

    /// `self <= other`.
    pub fn le(self, other: Expr) -> Self {
        Self::binary(BinaryOp::LessThanOrEqual, self, other)
    }

    /// `self > other`.
    pub fn gt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::GreaterThan, self, other)
    }

    /// `self >= other`.
    pub fn ge(self, other: Expr) -> Self {
        Self::binary(BinaryOp::GreaterThanOrEqual, self, other)
    }

    /// `self && other`.
    pub fn and(self, other: Expr) -> Self {
        Self::binary(BinaryOp::AndAlso, self, other)
    }

    /// `self || other`.
    pub fn or(self, other: Expr) -> Self {
        Self::binary(BinaryOp::OrElse, self, other)
    }

    /// `self + other`.
    pub fn add(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Add, self, other)
    }

    /// `!self`.
    pub fn not(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }

    /// The static type of this node.
    pub fn ty(&self) -> Type {
        match self {
            Expr::Constant(Constant::Literal(value)) => value
                .scalar_type()
                .map(Type::Scalar)
                .unwrap_or(Type::Unknown),
            Expr::Constant(Constant::Captured { ty, .. }) => ty.clone(),
            Expr::Constant(Constant::Query(root)) => match root {
                QueryRoot::EntitySet { entity, .. } => Type::sequence(Type::entity(entity)),
                QueryRoot::Expression(expr) => expr.ty(),
                QueryRoot::Opaque { element, .. } => Type::sequence(Type::Scalar(*element)),
            },
            Expr::Parameter(p) => p.ty.clone(),
            Expr::Member { ty, .. } | Expr::Call { ty, .. } => ty.clone(),
            Expr::Conditional {
                if_true, if_false, ..
            } => match if_true.ty() {
                Type::Unknown => if_false.ty(),
                ty => ty,
            },
            Expr::Lambda(lambda) => lambda.body.ty(),
            Expr::Binary { op, left, right } => match op {
                BinaryOp::AndAlso | BinaryOp::OrElse => {
                    if left.ty().is_nullable_bool() || right.ty().is_nullable_bool() {
                        Type::Nullable(ScalarType::Bool)
                    } else {
                        Type::bool()
                    }
                }
                op if op.is_comparison() => Type::bool(),
                BinaryOp::Coalesce => right.ty(),
                _ => match left.ty() {
                    Type::Unknown => right.ty(),
                    ty => ty,
                },
            },
            Expr::Unary { op, operand } => match op {
                UnaryOp::Convert(scalar) => Type::Scalar(*scalar),
                UnaryOp::Not | UnaryOp::Negate => operand.ty(),
            },
            Expr::New { members } => Type::Record(
                members
                    .iter()
                    .map(|(name, value)| (name.clone(), value.ty()))
                    .collect(),
            ),
            Expr::In { .. } => Type::bool(),
            Expr::Include { entity, .. } => entity.ty(),
        }
    }

    /// Check if this node is the null literal.
    pub fn is_null_literal(&self) -> bool {
        matches!(self, Expr::Constant(Constant::Literal(Value::Null)))
    }

    /// The literal value, if this is a literal.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expr::Constant(Constant::Literal(v)) => Some(v),
            _ => None,
        }
    }

    /// The boolean literal value, if this is one.
    pub fn as_bool_literal(&self) -> Option<bool> {
        self.as_literal().and_then(Value::as_bool)
    }

    /// The lambda, if this is one.
    pub fn as_lambda(&self) -> Option<&Lambda> {
        match self {
            Expr::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    /// The query operator and its arguments, if this is a query call.
    pub fn as_query_call(&self) -> Option<(QueryMethod, &[Expr])> {
        match self {
            Expr::Call {
                method: Method::Query(q),
                target: None,
                args,
                ..
            } => Some((*q, args)),
            _ => None,
        }
    }

    /// The entity-set root, if this is one.
    pub fn as_entity_set(&self) -> Option<(&str, bool)> {
        match self {
            Expr::Constant(Constant::Query(QueryRoot::EntitySet { entity, filtered })) => {
                Some((entity, *filtered))
            }
            _ => None,
        }
    }
}

impl Type {
    fn is_nullable_bool(&self) -> bool {
        matches!(self, Type::Nullable(ScalarType::Bool))
    }
}

/// Result type of a query operator applied to `args`.
fn query_result_type(method: QueryMethod, args: &[Expr]) -> Type {
    let source = args.first().map(Expr::ty).unwrap_or(Type::Unknown);
    let element = source.element().cloned().unwrap_or(Type::Unknown);
    let selector = |index: usize| {
        args.get(index)
            .and_then(Expr::as_lambda)
            .map(|lambda| lambda.body.ty())
    };
    match method {
        QueryMethod::Select => Type::sequence(selector(1).unwrap_or(Type::Unknown)),
        QueryMethod::Join | QueryMethod::LeftJoin => {
            Type::sequence(selector(4).unwrap_or(Type::Unknown))
        }
        m if m.returns_sequence() => source,
        m if m.returns_element() => element,
        QueryMethod::Any | QueryMethod::All => Type::bool(),
        QueryMethod::Count => Type::int32(),
        QueryMethod::Average => Type::Nullable(ScalarType::Float64),
        QueryMethod::Sum | QueryMethod::Min | QueryMethod::Max => selector(1).unwrap_or(element),
        _ => Type::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_type_from_value() {
        assert_eq!(Expr::captured(5i32).ty(), Type::int32());
        assert_eq!(Expr::captured(5i64).ty(), Type::int64());
        assert_eq!(
            Expr::captured_list(vec![Value::Int32(1)], ScalarType::Int32).ty(),
            Type::sequence(Type::int32())
        );
    }

    #[test]
    fn test_query_call_types() {
        let users = Expr::entity_set("User");
        let u = Parameter::new("u", Type::entity("User"));
        let filtered = Expr::query_call(
            QueryMethod::Where,
            vec![
                users.clone(),
                Expr::lambda(
                    vec![u.clone()],
                    u.to_expr().member_typed("active", Type::bool()),
                ),
            ],
        );
        assert_eq!(filtered.ty(), Type::sequence(Type::entity("User")));

        let names = Expr::query_call(
            QueryMethod::Select,
            vec![
                filtered.clone(),
                Expr::lambda(
                    vec![u.clone()],
                    u.to_expr().member_typed("name", Type::string()),
                ),
            ],
        );
        assert_eq!(names.ty(), Type::sequence(Type::string()));

        let first = Expr::query_call(QueryMethod::First, vec![filtered.clone()]);
        assert_eq!(first.ty(), Type::entity("User"));

        let count = Expr::query_call(QueryMethod::Count, vec![filtered]);
        assert_eq!(count.ty(), Type::int32());
    }

    #[test]
    fn test_logical_nullability() {
        let a = Expr::param("a", Type::Nullable(ScalarType::Bool));
        let b = Expr::param("b", Type::bool());
        assert_eq!(
            a.clone().and(b.clone()).ty(),
            Type::Nullable(ScalarType::Bool)
        );
        assert_eq!(b.clone().or(b).ty(), Type::bool());
    }

    #[test]
    fn test_negate_comparison() {
        assert_eq!(
            BinaryOp::LessThan.negate_comparison(),
            Some(BinaryOp::GreaterThanOrEqual)
        );
        assert_eq!(BinaryOp::Add.negate_comparison(), None);
    }
}
