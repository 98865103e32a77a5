//! Dialect-aware SQL serialization.

use std::fmt::Write;
use std::mem;

use quarry_expr::{DatePart, ScalarType, Value};

use super::command::{CommandTemplate, Segment};
use super::statement::{
    Join, JoinKind, OrderItem, SelectItem, SelectStatement, SqlExpr, SqlFunction, SqlOp,
    TableSource,
};
use crate::config::Flavor;
use crate::eval::format_timestamp;

macro_rules! fmt {
    ($f:expr, $( $fragments:expr )*) => {{
        $(
            $fragments.to_sql($f);
        )*
    }};
}

/// Serialize statements to command templates for one SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    flavor: Flavor,
}

impl Serializer {
    pub fn new(flavor: Flavor) -> Self {
        Self { flavor }
    }

    pub fn sqlite() -> Self {
        Self::new(Flavor::Sqlite)
    }

    pub fn postgresql() -> Self {
        Self::new(Flavor::Postgresql)
    }

    pub fn mysql() -> Self {
        Self::new(Flavor::Mysql)
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// Serialize a statement into a command template.
    pub fn serialize(&self, stmt: &SelectStatement) -> CommandTemplate {
        let mut f = Formatter::new(self);
        stmt.to_sql(&mut f);
        CommandTemplate::new(self.flavor, f.finish())
    }
}

struct Formatter<'a> {
    serializer: &'a Serializer,

    /// Text not yet flushed into `segments`.
    dst: String,

    segments: Vec<Segment>,
}

impl<'a> Formatter<'a> {
    fn new(serializer: &'a Serializer) -> Self {
        Self {
            serializer,
            dst: String::new(),
            segments: Vec::new(),
        }
    }

    fn flavor(&self) -> Flavor {
        self.serializer.flavor
    }

    fn flush(&mut self) {
        if !self.dst.is_empty() {
            self.segments.push(Segment::Text(mem::take(&mut self.dst)));
        }
    }

    fn finish(mut self) -> Vec<Segment> {
        self.flush();
        self.segments
    }

    fn push_segment(&mut self, segment: Segment) {
        self.flush();
        self.segments.push(segment);
    }
}

trait ToSql {
    fn to_sql(self, f: &mut Formatter<'_>);
}

impl ToSql for &str {
    fn to_sql(self, f: &mut Formatter<'_>) {
        f.dst.push_str(self);
    }
}

impl ToSql for &String {
    fn to_sql(self, f: &mut Formatter<'_>) {
        f.dst.push_str(self);
    }
}

/// A quoted identifier.
struct Ident<S>(S);

impl<S: AsRef<str>> ToSql for Ident<S> {
    fn to_sql(self, f: &mut Formatter<'_>) {
        let (open, close) = match f.flavor() {
            Flavor::Mysql => ('`', "``"),
            Flavor::Sqlite | Flavor::Postgresql => ('"', "\"\""),
        };
        f.dst.push(open);
        for c in self.0.as_ref().chars() {
            if c == open {
                f.dst.push_str(close);
            } else {
                f.dst.push(c);
            }
        }
        f.dst.push(open);
    }
}

/// Comma delimited
struct Comma<L>(L);

impl<L> ToSql for Comma<L>
where
    L: IntoIterator,
    L::Item: ToSql,
{
    fn to_sql(self, f: &mut Formatter<'_>) {
        let mut s = "";
        for i in self.0 {
            fmt!(f, s i);
            s = ", ";
        }
    }
}

impl ToSql for &SelectStatement {
    fn to_sql(self, f: &mut Formatter<'_>) {
        fmt!(f, "SELECT ");
        if self.distinct {
            fmt!(f, "DISTINCT ");
        }
        if self.projection.is_empty() {
            fmt!(f, "1");
        } else {
            fmt!(f, Comma(&self.projection));
        }
        if let Some(from) = &self.from {
            fmt!(f, " FROM " from);
        }
        for join in &self.joins {
            join.to_sql(f);
        }
        if let Some(filter) = &self.filter {
            fmt!(f, " WHERE " filter);
        }
        if !self.order_by.is_empty() {
            fmt!(f, " ORDER BY " Comma(&self.order_by));
        }
        match (&self.limit, &self.offset) {
            (Some(limit), offset) => {
                fmt!(f, " LIMIT " limit);
                if let Some(offset) = offset {
                    fmt!(f, " OFFSET " offset);
                }
            }
            (None, Some(offset)) => {
                // SQLite and MySQL accept OFFSET only after a LIMIT.
                match f.flavor() {
                    Flavor::Sqlite => fmt!(f, " LIMIT -1"),
                    Flavor::Mysql => fmt!(f, " LIMIT 18446744073709551615"),
                    Flavor::Postgresql => {}
                }
                fmt!(f, " OFFSET " offset);
            }
            (None, None) => {}
        }
    }
}

impl ToSql for &SelectItem {
    fn to_sql(self, f: &mut Formatter<'_>) {
        fmt!(f, &self.expr);
        if let Some(alias) = &self.alias {
            fmt!(f, " AS " Ident(alias));
        }
    }
}

impl ToSql for &TableSource {
    fn to_sql(self, f: &mut Formatter<'_>) {
        match self {
            TableSource::Table { name, alias } => fmt!(f, Ident(name) " AS " Ident(alias)),
            TableSource::Derived { query, alias } => {
                let query = &**query;
                fmt!(f, "(" query ") AS " Ident(alias));
            }
        }
    }
}

impl ToSql for &Join {
    fn to_sql(self, f: &mut Formatter<'_>) {
        let kind = match self.kind {
            JoinKind::Inner => " INNER JOIN ",
            JoinKind::Left => " LEFT JOIN ",
        };
        let (source, on) = (&self.source, &self.on);
        fmt!(f, kind source " ON " on);
    }
}

impl ToSql for &OrderItem {
    fn to_sql(self, f: &mut Formatter<'_>) {
        fmt!(f, &self.expr);
        if self.descending {
            fmt!(f, " DESC");
        }
    }
}

impl ToSql for &SqlExpr {
    fn to_sql(self, f: &mut Formatter<'_>) {
        match self {
            SqlExpr::Column { table, name } => fmt!(f, Ident(table) "." Ident(name)),
            SqlExpr::Literal(value) => value.to_sql(f),
            SqlExpr::Parameter(slot) => f.push_segment(Segment::Param(*slot)),
            SqlExpr::InList { item, slot } => {
                let mut nested = Formatter::new(f.serializer);
                item.as_ref().to_sql(&mut nested);
                let item = nested.finish();
                f.push_segment(Segment::InList { item, slot: *slot });
            }
            SqlExpr::InSubquery { item, query } => {
                let (item, query) = (&**item, &**query);
                fmt!(f, "(" item " IN (" query "))");
            }
            SqlExpr::Exists(query) => {
                let query = &**query;
                fmt!(f, "EXISTS (" query ")");
            }
            SqlExpr::Subquery(query) => {
                let query = &**query;
                fmt!(f, "(" query ")");
            }
            SqlExpr::Binary {
                op: SqlOp::Concat,
                left,
                right,
            } if f.flavor() == Flavor::Mysql => {
                let (left, right) = (&**left, &**right);
                fmt!(f, "CONCAT(" left ", " right ")");
            }
            SqlExpr::Binary { op, left, right } => {
                let (left, right) = (&**left, &**right);
                fmt!(f, "(" left " " op.as_str() " " right ")");
            }
            SqlExpr::Not(expr) => {
                let expr = &**expr;
                fmt!(f, "NOT (" expr ")");
            }
            SqlExpr::Negate(expr) => {
                let expr = &**expr;
                fmt!(f, "-(" expr ")");
            }
            SqlExpr::IsNull(expr) => {
                let expr = &**expr;
                fmt!(f, "(" expr " IS NULL)");
            }
            SqlExpr::IsNotNull(expr) => {
                let expr = &**expr;
                fmt!(f, "(" expr " IS NOT NULL)");
            }
            SqlExpr::Function { function, args } => function_to_sql(*function, args, f),
            SqlExpr::Case {
                when,
                then,
                otherwise,
            } => {
                let (when, then, otherwise) = (&**when, &**then, &**otherwise);
                fmt!(f, "CASE WHEN " when " THEN " then " ELSE " otherwise " END");
            }
            SqlExpr::Cast { expr, ty } => {
                let expr = &**expr;
                let ty = cast_type(f.flavor(), *ty);
                fmt!(f, "CAST(" expr " AS " ty ")");
            }
            SqlExpr::CountStar => fmt!(f, "COUNT(*)"),
        }
    }
}

fn function_to_sql(function: SqlFunction, args: &[SqlExpr], f: &mut Formatter<'_>) {
    static NULL: SqlExpr = SqlExpr::Literal(Value::Null);

    let flavor = f.flavor();
    let arg = |i: usize| args.get(i).unwrap_or(&NULL);
    let (a, b) = (arg(0), arg(1));

    match (function, flavor) {
        (SqlFunction::Contains, Flavor::Sqlite) => fmt!(f, "(instr(" a ", " b ") > 0)"),
        (SqlFunction::Contains, Flavor::Postgresql) => fmt!(f, "(strpos(" a ", " b ") > 0)"),
        (SqlFunction::Contains, Flavor::Mysql) => fmt!(f, "(LOCATE(" b ", " a ") > 0)"),
        (SqlFunction::StartsWith, Flavor::Sqlite) => {
            fmt!(f, "(substr(" a ", 1, length(" b ")) = " b ")")
        }
        (SqlFunction::StartsWith, Flavor::Postgresql) => {
            fmt!(f, "(left(" a ", length(" b ")) = " b ")")
        }
        (SqlFunction::StartsWith, Flavor::Mysql) => {
            fmt!(f, "(LEFT(" a ", CHAR_LENGTH(" b ")) = " b ")")
        }
        (SqlFunction::EndsWith, Flavor::Sqlite) => {
            fmt!(f, "(substr(" a ", length(" a ") - length(" b ") + 1) = " b ")")
        }
        (SqlFunction::EndsWith, Flavor::Postgresql) => {
            fmt!(f, "(right(" a ", length(" b ")) = " b ")")
        }
        (SqlFunction::EndsWith, Flavor::Mysql) => {
            fmt!(f, "(RIGHT(" a ", CHAR_LENGTH(" b ")) = " b ")")
        }
        (SqlFunction::Upper, _) => fmt!(f, "UPPER(" a ")"),
        (SqlFunction::Lower, _) => fmt!(f, "LOWER(" a ")"),
        (SqlFunction::Trim, _) => fmt!(f, "TRIM(" a ")"),
        (SqlFunction::Length, Flavor::Mysql) => fmt!(f, "CHAR_LENGTH(" a ")"),
        (SqlFunction::Length, _) => fmt!(f, "LENGTH(" a ")"),
        (SqlFunction::DatePart(part), Flavor::Sqlite) => {
            let format = match part {
                DatePart::Year => "'%Y'",
                DatePart::Month => "'%m'",
                DatePart::Day => "'%d'",
                DatePart::Hour => "'%H'",
                DatePart::Minute => "'%M'",
                DatePart::Second => "'%S'",
            };
            fmt!(f, "CAST(strftime(" format ", " a ") AS INTEGER)");
        }
        (SqlFunction::DatePart(part), _) => {
            let field = match part {
                DatePart::Year => "YEAR",
                DatePart::Month => "MONTH",
                DatePart::Day => "DAY",
                DatePart::Hour => "HOUR",
                DatePart::Minute => "MINUTE",
                DatePart::Second => "SECOND",
            };
            if flavor == Flavor::Postgresql {
                fmt!(f, "CAST(FLOOR(EXTRACT(" field " FROM " a ")) AS INTEGER)");
            } else {
                fmt!(f, "EXTRACT(" field " FROM " a ")");
            }
        }
        (SqlFunction::Coalesce, _) => fmt!(f, "COALESCE(" Comma(args) ")"),
        (SqlFunction::Sum, _) => fmt!(f, "SUM(" a ")"),
        (SqlFunction::Min, _) => fmt!(f, "MIN(" a ")"),
        (SqlFunction::Max, _) => fmt!(f, "MAX(" a ")"),
        (SqlFunction::Avg, _) => fmt!(f, "AVG(" a ")"),
    }
}

fn cast_type(flavor: Flavor, ty: ScalarType) -> &'static str {
    use ScalarType::*;

    match flavor {
        Flavor::Sqlite => match ty {
            Bool | Int32 | Int64 => "INTEGER",
            Float32 | Float64 => "REAL",
            String | Timestamp | Uuid => "TEXT",
            Bytes => "BLOB",
        },
        Flavor::Postgresql => match ty {
            Bool => "BOOLEAN",
            Int32 => "INTEGER",
            Int64 => "BIGINT",
            Float32 => "REAL",
            Float64 => "DOUBLE PRECISION",
            String => "TEXT",
            Bytes => "BYTEA",
            Timestamp => "TIMESTAMP",
            Uuid => "UUID",
        },
        Flavor::Mysql => match ty {
            Bool | Int32 | Int64 => "SIGNED",
            Float32 | Float64 => "DOUBLE",
            String | Uuid => "CHAR",
            Bytes => "BINARY",
            Timestamp => "DATETIME",
        },
    }
}

impl ToSql for &Value {
    fn to_sql(self, f: &mut Formatter<'_>) {
        let flavor = f.flavor();
        let dst = &mut f.dst;
        let _ = match self {
            Value::Null => write!(dst, "NULL"),
            Value::Bool(b) => match flavor {
                Flavor::Sqlite => write!(dst, "{}", i32::from(*b)),
                Flavor::Postgresql | Flavor::Mysql => {
                    write!(dst, "{}", if *b { "TRUE" } else { "FALSE" })
                }
            },
            Value::Int32(v) => write!(dst, "{v}"),
            Value::Int64(v) => write!(dst, "{v}"),
            Value::Float32(v) => write_float(dst, f64::from(*v)),
            Value::Float64(v) => write_float(dst, *v),
            Value::String(s) => {
                write_string(dst, s, flavor);
                Ok(())
            }
            Value::Bytes(bytes) => match flavor {
                Flavor::Postgresql => write!(dst, "'\\x{}'::bytea", hex::encode(bytes)),
                Flavor::Sqlite | Flavor::Mysql => write!(dst, "X'{}'", hex::encode(bytes)),
            },
            Value::Timestamp(micros) => {
                let text = format_timestamp(*micros);
                match flavor {
                    Flavor::Sqlite => write!(dst, "'{text}'"),
                    Flavor::Postgresql | Flavor::Mysql => write!(dst, "TIMESTAMP '{text}'"),
                }
            }
            Value::Uuid(bytes) => {
                let h = hex::encode(bytes);
                let text = format!(
                    "{}-{}-{}-{}-{}",
                    &h[0..8],
                    &h[8..12],
                    &h[12..16],
                    &h[16..20],
                    &h[20..32]
                );
                match flavor {
                    Flavor::Postgresql => write!(dst, "'{text}'::uuid"),
                    Flavor::Sqlite | Flavor::Mysql => write!(dst, "'{text}'"),
                }
            }
        };
    }
}

fn write_float(dst: &mut String, v: f64) -> std::fmt::Result {
    if v.is_finite() {
        write!(dst, "{v:?}")
    } else {
        write!(dst, "NULL")
    }
}

fn write_string(dst: &mut String, s: &str, flavor: Flavor) {
    dst.push('\'');
    for c in s.chars() {
        match c {
            '\'' => dst.push_str("''"),
            '\\' if flavor == Flavor::Mysql => dst.push_str("\\\\"),
            c => dst.push(c),
        }
    }
    dst.push('\'');
}
