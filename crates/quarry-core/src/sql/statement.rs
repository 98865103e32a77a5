//! SELECT statement model.

use quarry_expr::{DatePart, ScalarType, Value};

/// A `SELECT` statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    /// `None` renders a `SELECT` without a `FROM` clause.
    pub from: Option<TableSource>,
    pub joins: Vec<Join>,
    pub filter: Option<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<SqlExpr>,
    pub offset: Option<SqlExpr>,
}

impl SelectStatement {
    /// `SELECT * FROM source`, with an empty projection.
    pub fn from_source(source: TableSource) -> Self {
        Self {
            from: Some(source),
            ..Self::default()
        }
    }

    /// AND a predicate into the `WHERE` clause.
    pub fn and_filter(&mut self, predicate: SqlExpr) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }

    /// Check if a `LIMIT`, `OFFSET` or `DISTINCT` constrains the rows.
    pub fn is_limited(&self) -> bool {
        self.limit.is_some() || self.offset.is_some() || self.distinct
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: SqlExpr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: SqlExpr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// A `FROM` or `JOIN` source.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    Table { name: String, alias: String },
    Derived {
        query: Box<SelectStatement>,
        alias: String,
    },
}

impl TableSource {
    pub fn alias(&self) -> &str {
        match self {
            TableSource::Table { alias, .. } | TableSource::Derived { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub source: TableSource,
    pub on: SqlExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub descending: bool,
}

/// Binary SQL operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// String concatenation.
    Concat,
}

impl SqlOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlOp::Eq => "=",
            SqlOp::Ne => "<>",
            SqlOp::Lt => "<",
            SqlOp::Le => "<=",
            SqlOp::Gt => ">",
            SqlOp::Ge => ">=",
            SqlOp::And => "AND",
            SqlOp::Or => "OR",
            SqlOp::Add => "+",
            SqlOp::Sub => "-",
            SqlOp::Mul => "*",
            SqlOp::Div => "/",
            SqlOp::Mod => "%",
            SqlOp::Concat => "||",
        }
    }
}

/// Functions whose spelling differs between dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFunction {
    /// `haystack` contains `needle` (bool).
    Contains,
    StartsWith,
    EndsWith,
    Upper,
    Lower,
    Trim,
    Length,
    DatePart(DatePart),
    Coalesce,
    Sum,
    Min,
    Max,
    Avg,
}

/// A SQL scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// `alias.column`.
    Column { table: String, name: String },
    Literal(Value),
    /// A placeholder for the parameter in `slot`.
    Parameter(usize),
    /// `item IN (..)` over the list parameter in `slot`.
    InList { item: Box<SqlExpr>, slot: usize },
    InSubquery {
        item: Box<SqlExpr>,
        query: Box<SelectStatement>,
    },
    Exists(Box<SelectStatement>),
    /// A scalar sub-query.
    Subquery(Box<SelectStatement>),
    Binary {
        op: SqlOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Not(Box<SqlExpr>),
    Negate(Box<SqlExpr>),
    IsNull(Box<SqlExpr>),
    IsNotNull(Box<SqlExpr>),
    Function {
        function: SqlFunction,
        args: Vec<SqlExpr>,
    },
    Case {
        when: Box<SqlExpr>,
        then: Box<SqlExpr>,
        otherwise: Box<SqlExpr>,
    },
    Cast { expr: Box<SqlExpr>, ty: ScalarType },
    /// `COUNT(*)`.
    CountStar,
}

impl SqlExpr {
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn binary(op: SqlOp, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(self, other: SqlExpr) -> Self {
        Self::binary(SqlOp::And, self, other)
    }

    pub fn eq(self, other: SqlExpr) -> Self {
        Self::binary(SqlOp::Eq, self, other)
    }

    pub fn not(self) -> Self {
        SqlExpr::Not(Box::new(self))
    }

    pub fn function(function: SqlFunction, args: Vec<SqlExpr>) -> Self {
        SqlExpr::Function { function, args }
    }

    /// Check if this is the null literal.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlExpr::Literal(Value::Null))
    }
}
