//! Client-side expression evaluator.
//!
//! Evaluates scalar expressions under SQL three-valued logic: comparisons
//! with a null operand are null, `&&`/`||` follow Kleene's tables, and a
//! comparison against the null literal itself is an is-null test. Used for
//! partial evaluation, polymorphic type tests, key selectors and projection
//! parts that have no backend translation.

use std::cmp::Ordering;

use quarry_expr::{
    BinaryOp, Constant, DatePart, Expr, Lambda, Method, ParameterValue, QueryRoot, ScalarType,
    UnaryOp, Value,
};

use crate::error::{Error, Result};
use crate::object::{Object, Record};

/// Variable bindings for evaluation.
#[derive(Debug, Clone)]
pub struct Env<'a> {
    parameters: &'a [ParameterValue],
    bindings: Vec<(String, Object)>,
}

impl<'a> Env<'a> {
    /// An environment resolving synthetic parameters from `parameters`.
    pub fn new(parameters: &'a [ParameterValue]) -> Self {
        Self {
            parameters,
            bindings: Vec::new(),
        }
    }

    /// Bind a lambda parameter.
    pub fn bind(mut self, name: impl Into<String>, value: Object) -> Self {
        self.bindings.push((name.into(), value));
        self
    }

    fn lookup(&self, name: &str) -> Option<&Object> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// The value `GetValueOrDefault()` falls back to.
pub fn default_value(scalar: ScalarType) -> Value {
    match scalar {
        ScalarType::Bool => Value::Bool(false),
        ScalarType::Int32 => Value::Int32(0),
        ScalarType::Int64 => Value::Int64(0),
        ScalarType::Float32 => Value::Float32(0.0),
        ScalarType::Float64 => Value::Float64(0.0),
        ScalarType::String => Value::String(String::new()),
        ScalarType::Bytes => Value::Bytes(Vec::new()),
        ScalarType::Timestamp => Value::Timestamp(0),
        ScalarType::Uuid => Value::Uuid([0; 16]),
    }
}

/// Apply a lambda to arguments.
pub fn apply(lambda: &Lambda, args: Vec<Object>, parameters: &[ParameterValue]) -> Result<Object> {
    let env = lambda
        .params
        .iter()
        .zip(args)
        .fold(Env::new(parameters), |env, (p, arg)| env.bind(&p.name, arg));
    evaluate(&lambda.body, &env)
}

/// Evaluate an expression.
pub fn evaluate(expr: &Expr, env: &Env<'_>) -> Result<Object> {
    match expr {
        Expr::Constant(constant) => constant_value(constant),
        Expr::Parameter(p) => match p.slot {
            Some(slot) => match env.parameters.get(slot) {
                Some(ParameterValue::Scalar(v)) => Ok(Object::from_value(v.clone())),
                Some(ParameterValue::List(values)) => Ok(list(values)),
                None => Err(Error::Compile(format!("no value bound for {}", p.name))),
            },
            None => env
                .lookup(&p.name)
                .cloned()
                .ok_or_else(|| Error::Compile(format!("unbound parameter {}", p.name))),
        },
        Expr::Member { target, name, .. } => member(evaluate(target, env)?, name),
        Expr::Call {
            method,
            target,
            args,
            ..
        } => call(method, target.as_deref(), args, env),
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => match evaluate(test, env)? {
            Object::Value(Value::Bool(true)) => evaluate(if_true, env),
            _ => evaluate(if_false, env),
        },
        Expr::Lambda(_) => Err(Error::untranslatable(
            "a lambda cannot be evaluated as a value",
        )),
        Expr::Binary { op, left, right } => binary(*op, left, right, env),
        Expr::Unary { op, operand } => unary(*op, evaluate(operand, env)?),
        Expr::New { members } => {
            let fields = members
                .iter()
                .map(|(name, value)| Ok((name.clone(), evaluate(value, env)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Object::Record(Record::new(fields)))
        }
        Expr::In { item, set } => {
            let item = evaluate(item, env)?;
            let set = evaluate(set, env)?;
            in_list(&item, &set)
        }
        Expr::Include { entity, .. } => evaluate(entity, env),
    }
}

fn list(values: &[Value]) -> Object {
    Object::List(values.iter().cloned().map(Object::from_value).collect())
}

fn constant_value(constant: &Constant) -> Result<Object> {
    match constant {
        Constant::Literal(v) => Ok(Object::from_value(v.clone())),
        Constant::Captured { value, .. } => Ok(match value {
            ParameterValue::Scalar(v) => Object::from_value(v.clone()),
            ParameterValue::List(values) => list(values),
        }),
        Constant::Query(QueryRoot::Opaque { values, .. }) => Ok(list(values)),
        Constant::Query(_) => Err(Error::untranslatable(
            "a query source cannot be evaluated client-side",
        )),
    }
}

fn bool_obj(b: bool) -> Object {
    Object::Value(Value::Bool(b))
}

fn as_bool(obj: &Object) -> Result<Option<bool>> {
    match obj {
        Object::Null => Ok(None),
        Object::Value(Value::Bool(b)) => Ok(Some(*b)),
        other => Err(Error::InvalidData(format!("expected bool, found {other:?}"))),
    }
}

fn member(target: Object, name: &str) -> Result<Object> {
    match target {
        Object::Null => Ok(match name {
            "HasValue" => bool_obj(false),
            _ => Object::Null,
        }),
        Object::Entity(entity) => {
            if let Some(value) = entity.get(name) {
                return Ok(Object::from_value(value.clone()));
            }
            entity.navigation(name).ok_or_else(|| Error::UnknownMember {
                entity: entity.entity_type().to_string(),
                member: name.to_string(),
            })
        }
        Object::Record(record) => record.get(name).cloned().ok_or_else(|| Error::UnknownMember {
            entity: "record".to_string(),
            member: name.to_string(),
        }),
        Object::Value(value) => match name {
            "HasValue" => Ok(bool_obj(true)),
            "Value" => Ok(Object::Value(value)),
            _ => match (&value, DatePart::from_member(name)) {
                (Value::String(s), _) if name == "Length" => {
                    Ok(Object::Value(Value::Int32(s.chars().count() as i32)))
                }
                (Value::Timestamp(micros), Some(part)) => {
                    Ok(Object::Value(Value::Int32(date_part(*micros, part))))
                }
                _ => Err(unknown_scalar_member(&value, name)),
            },
        },
        Object::List(_) => Err(Error::untranslatable(format!(
            "member {name} of a list"
        ))),
    }
}

fn unknown_scalar_member(value: &Value, name: &str) -> Error {
    Error::UnknownMember {
        entity: value
            .scalar_type()
            .map(|s| s.name())
            .unwrap_or("null")
            .to_string(),
        member: name.to_string(),
    }
}

/// Civil date from days since the Unix epoch.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Extract a date part from microseconds since the Unix epoch (UTC).
pub fn date_part(micros: i64, part: DatePart) -> i32 {
    const MICROS_PER_DAY: i64 = 86_400_000_000;
    let days = micros.div_euclid(MICROS_PER_DAY);
    let seconds = micros.rem_euclid(MICROS_PER_DAY) / 1_000_000;
    let (year, month, day) = civil_from_days(days);
    match part {
        DatePart::Year => year as i32,
        DatePart::Month => month as i32,
        DatePart::Day => day as i32,
        DatePart::Hour => (seconds / 3600) as i32,
        DatePart::Minute => (seconds % 3600 / 60) as i32,
        DatePart::Second => (seconds % 60) as i32,
    }
}

/// ISO-8601 text of microseconds since the Unix epoch (UTC), e.g.
/// `2024-03-01 12:30:00.000000`.
pub fn format_timestamp(micros: i64) -> String {
    const MICROS_PER_DAY: i64 = 86_400_000_000;
    let days = micros.div_euclid(MICROS_PER_DAY);
    let rest = micros.rem_euclid(MICROS_PER_DAY);
    let (year, month, day) = civil_from_days(days);
    let seconds = rest / 1_000_000;
    format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}.{:06}",
        seconds / 3600,
        seconds % 3600 / 60,
        seconds % 60,
        rest % 1_000_000
    )
}

fn string_arg(obj: &Object) -> Result<Option<&str>> {
    match obj {
        Object::Null => Ok(None),
        Object::Value(Value::String(s)) => Ok(Some(s)),
        other => Err(Error::InvalidData(format!(
            "expected string, found {other:?}"
        ))),
    }
}

fn call(method: &Method, target: Option<&Expr>, args: &[Expr], env: &Env<'_>) -> Result<Object> {
    // Static `Contains(collection, item)` and instance `collection.Contains(item)`.
    let (receiver, args) = match (target, args) {
        (Some(t), args) => (Some(evaluate(t, env)?), args),
        (None, [first, rest @ ..]) if !matches!(method, Method::Query(_)) => {
            (Some(evaluate(first, env)?), rest)
        }
        _ => (None, args),
    };
    let args = args
        .iter()
        .map(|a| evaluate(a, env))
        .collect::<Result<Vec<_>>>()?;

    let receiver = match (method, receiver) {
        (Method::Query(q), _) => {
            return Err(Error::untranslatable(format!(
                "{} cannot be evaluated client-side",
                q.name()
            )))
        }
        (Method::Custom(name), _) => {
            return Err(Error::untranslatable(format!(
                "method {name} has no translation"
            )))
        }
        (_, Some(receiver)) => receiver,
        (_, None) => {
            return Err(Error::Compile(format!(
                "{} called without a receiver",
                method.name()
            )))
        }
    };

    match method {
        Method::Contains => match &receiver {
            Object::Null => Ok(Object::Null),
            Object::List(items) => {
                let item = args.first().cloned().unwrap_or(Object::Null);
                Ok(bool_obj(items.iter().any(|i| objects_equal(i, &item))))
            }
            other => Err(Error::InvalidData(format!(
                "Contains over a non-list: {other:?}"
            ))),
        },
        Method::StringContains | Method::StartsWith | Method::EndsWith => {
            let fragment = args.first().map(string_arg).transpose()?.flatten();
            match (string_arg(&receiver)?, fragment) {
                (Some(s), Some(f)) => Ok(bool_obj(match method {
                    Method::StringContains => s.contains(f),
                    Method::StartsWith => s.starts_with(f),
                    _ => s.ends_with(f),
                })),
                _ => Ok(Object::Null),
            }
        }
        Method::ToUpper | Method::ToLower | Method::Trim => match string_arg(&receiver)? {
            Some(s) => Ok(Object::Value(Value::String(match method {
                Method::ToUpper => s.to_uppercase(),
                Method::ToLower => s.to_lowercase(),
                _ => s.trim().to_string(),
            }))),
            None => Ok(Object::Null),
        },
        Method::StringLength => member(receiver, "Length"),
        Method::DatePart(part) => match receiver {
            Object::Null => Ok(Object::Null),
            Object::Value(Value::Timestamp(micros)) => {
                Ok(Object::Value(Value::Int32(date_part(micros, *part))))
            }
            other => Err(Error::InvalidData(format!(
                "date part of a non-timestamp: {other:?}"
            ))),
        },
        Method::GetValueOrDefault => match receiver {
            Object::Null => match args.into_iter().next() {
                Some(fallback) => Ok(fallback),
                None => {
                    let scalar = target
                        .and_then(|t| t.ty().scalar())
                        .ok_or_else(|| {
                            Error::Compile("GetValueOrDefault on a non-scalar".into())
                        })?;
                    Ok(Object::Value(default_value(scalar)))
                }
            },
            value => Ok(value),
        },
        Method::Query(_) | Method::Custom(_) => Err(Error::untranslatable(method.name())),
    }
}

fn objects_equal(a: &Object, b: &Object) -> bool {
    match (a, b) {
        (Object::Value(x), Object::Value(y)) => x.compare(y) == Some(Ordering::Equal) || x == y,
        _ => a == b,
    }
}

fn in_list(item: &Object, set: &Object) -> Result<Object> {
    let items = match set {
        Object::List(items) => items,
        Object::Null => return Ok(Object::Null),
        other => {
            return Err(Error::InvalidData(format!(
                "IN over a non-list: {other:?}"
            )))
        }
    };
    if item.is_null() {
        return Ok(if items.is_empty() {
            bool_obj(false)
        } else {
            Object::Null
        });
    }
    if items.iter().any(|i| objects_equal(i, item)) {
        Ok(bool_obj(true))
    } else if items.iter().any(Object::is_null) {
        Ok(Object::Null)
    } else {
        Ok(bool_obj(false))
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, env: &Env<'_>) -> Result<Object> {
    match op {
        BinaryOp::AndAlso => {
            let l = as_bool(&evaluate(left, env)?)?;
            if l == Some(false) {
                return Ok(bool_obj(false));
            }
            let r = as_bool(&evaluate(right, env)?)?;
            Ok(match (l, r) {
                (_, Some(false)) => bool_obj(false),
                (Some(true), Some(true)) => bool_obj(true),
                _ => Object::Null,
            })
        }
        BinaryOp::OrElse => {
            let l = as_bool(&evaluate(left, env)?)?;
            if l == Some(true) {
                return Ok(bool_obj(true));
            }
            let r = as_bool(&evaluate(right, env)?)?;
            Ok(match (l, r) {
                (_, Some(true)) => bool_obj(true),
                (Some(false), Some(false)) => bool_obj(false),
                _ => Object::Null,
            })
        }
        BinaryOp::Coalesce => match evaluate(left, env)? {
            Object::Null => evaluate(right, env),
            value => Ok(value),
        },
        op if op.is_comparison() => {
            // Comparison with the null literal is a null test.
            if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual)
                && (left.is_null_literal() || right.is_null_literal())
            {
                let other = if left.is_null_literal() { right } else { left };
                let is_null = evaluate(other, env)?.is_null();
                return Ok(bool_obj(is_null == (op == BinaryOp::Equal)));
            }
            let l = evaluate(left, env)?;
            let r = evaluate(right, env)?;
            compare(op, &l, &r)
        }
        op => arithmetic(op, evaluate(left, env)?, evaluate(right, env)?),
    }
}

fn compare(op: BinaryOp, l: &Object, r: &Object) -> Result<Object> {
    if l.is_null() || r.is_null() {
        return Ok(Object::Null);
    }
    let ordering = match (l, r) {
        (Object::Value(a), Object::Value(b)) => a.compare(b),
        (Object::Entity(_), Object::Entity(_)) => {
            if l == r {
                Some(Ordering::Equal)
            } else {
                None
            }
        }
        _ => None,
    };
    let result = match (op, ordering) {
        (BinaryOp::Equal, o) => o == Some(Ordering::Equal),
        (BinaryOp::NotEqual, o) => o != Some(Ordering::Equal),
        (_, None) => {
            return Err(Error::InvalidData(format!(
                "cannot order {l:?} and {r:?}"
            )))
        }
        (BinaryOp::LessThan, Some(o)) => o == Ordering::Less,
        (BinaryOp::LessThanOrEqual, Some(o)) => o != Ordering::Greater,
        (BinaryOp::GreaterThan, Some(o)) => o == Ordering::Greater,
        (BinaryOp::GreaterThanOrEqual, Some(o)) => o != Ordering::Less,
        (op, _) => return Err(Error::Compile(format!("{op:?} is not a comparison"))),
    };
    Ok(bool_obj(result))
}

fn arithmetic(op: BinaryOp, l: Object, r: Object) -> Result<Object> {
    let (a, b) = match (l, r) {
        (Object::Null, _) | (_, Object::Null) => return Ok(Object::Null),
        (Object::Value(a), Object::Value(b)) => (a, b),
        (l, r) => {
            return Err(Error::InvalidData(format!(
                "arithmetic on {l:?} and {r:?}"
            )))
        }
    };
    if let (BinaryOp::Add, Value::String(x), Value::String(y)) = (op, &a, &b) {
        return Ok(Object::Value(Value::String(format!("{x}{y}"))));
    }

    let overflow = || Error::InvalidData(format!("{op:?} overflow"));
    let int_result = |v: i64, wide: bool| -> Result<Object> {
        if wide {
            Ok(Object::Value(Value::Int64(v)))
        } else {
            i32::try_from(v)
                .map(|v| Object::Value(Value::Int32(v)))
                .map_err(|_| overflow())
        }
    };

    match (&a, &b) {
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            let wide = matches!(a, Value::Int64(_)) || matches!(b, Value::Int64(_));
            let (x, y) = (a.as_i64().unwrap_or_default(), b.as_i64().unwrap_or_default());
            let v = match op {
                BinaryOp::Add => x.checked_add(y),
                BinaryOp::Subtract => x.checked_sub(y),
                BinaryOp::Multiply => x.checked_mul(y),
                BinaryOp::Divide => x.checked_div(y),
                BinaryOp::Modulo => x.checked_rem(y),
                _ => None,
            }
            .ok_or_else(overflow)?;
            int_result(v, wide)
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => {
                let v = match op {
                    BinaryOp::Add => x + y,
                    BinaryOp::Subtract => x - y,
                    BinaryOp::Multiply => x * y,
                    BinaryOp::Divide => x / y,
                    BinaryOp::Modulo => x % y,
                    _ => return Err(Error::Compile(format!("{op:?} is not arithmetic"))),
                };
                Ok(Object::Value(Value::Float64(v)))
            }
            _ => Err(Error::InvalidData(format!(
                "arithmetic on {a:?} and {b:?}"
            ))),
        },
    }
}

fn unary(op: UnaryOp, operand: Object) -> Result<Object> {
    if operand.is_null() {
        return Ok(Object::Null);
    }
    match (op, operand) {
        (UnaryOp::Not, Object::Value(Value::Bool(b))) => Ok(bool_obj(!b)),
        (UnaryOp::Negate, Object::Value(Value::Int32(i))) => Ok(Object::Value(Value::Int32(-i))),
        (UnaryOp::Negate, Object::Value(Value::Int64(i))) => Ok(Object::Value(Value::Int64(-i))),
        (UnaryOp::Negate, Object::Value(Value::Float32(f))) => {
            Ok(Object::Value(Value::Float32(-f)))
        }
        (UnaryOp::Negate, Object::Value(Value::Float64(f))) => {
            Ok(Object::Value(Value::Float64(-f)))
        }
        (UnaryOp::Convert(scalar), Object::Value(v)) => {
            let shown = format!("{v}");
            v.coerce(scalar).map(Object::Value).ok_or_else(|| {
                Error::InvalidData(format!("cannot convert {shown} to {}", scalar.name()))
            })
        }
        (op, operand) => Err(Error::InvalidData(format!(
            "{op:?} on {operand:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Entity;
    use quarry_expr::{Parameter, Type};
    use std::sync::Arc;

    fn eval(expr: &Expr) -> Object {
        evaluate(expr, &Env::new(&[])).unwrap()
    }

    fn b(v: Option<bool>) -> Expr {
        match v {
            Some(v) => Expr::literal(v),
            None => Expr::Constant(Constant::Literal(Value::Null)),
        }
    }

    #[test]
    fn test_kleene_and_or() {
        let cases = [
            (Some(true), None, None, Some(true)),
            (Some(false), None, Some(false), None),
            (None, None, None, None),
            (Some(true), Some(false), Some(false), Some(true)),
        ];
        for (l, r, and, or) in cases {
            let to_obj = |v: Option<bool>| v.map(bool_obj).unwrap_or(Object::Null);
            // The null literal is typed as unknown, so wrap it in a parameter
            // binding to keep comparisons out of the is-null path.
            let env = Env::new(&[]).bind("l", to_obj(l)).bind("r", to_obj(r));
            let lp = Expr::param("l", Type::Nullable(ScalarType::Bool));
            let rp = Expr::param("r", Type::Nullable(ScalarType::Bool));
            assert_eq!(
                evaluate(&lp.clone().and(rp.clone()), &env).unwrap(),
                to_obj(and)
            );
            assert_eq!(evaluate(&lp.or(rp), &env).unwrap(), to_obj(or));
        }
        assert_eq!(eval(&b(Some(false)).and(b(None))), bool_obj(false));
    }

    #[test]
    fn test_null_literal_comparison_is_null_test() {
        assert_eq!(eval(&Expr::literal(1i32).eq(Expr::null())), bool_obj(false));
        assert_eq!(eval(&Expr::null().eq(Expr::null())), bool_obj(true));
        assert_eq!(eval(&Expr::literal(1i32).ne(Expr::null())), bool_obj(true));

        let env = Env::new(&[]).bind("x", Object::Null);
        let x = Expr::param("x", Type::Nullable(ScalarType::Int32));
        assert_eq!(
            evaluate(&x.clone().eq(Expr::literal(1i32)), &env).unwrap(),
            Object::Null
        );
        assert_eq!(evaluate(&x.eq(Expr::null()), &env).unwrap(), bool_obj(true));
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(
            eval(&Expr::literal(2i32).add(Expr::literal(3i64))),
            Object::Value(Value::Int64(5))
        );
        assert_eq!(
            eval(&Expr::literal("a").add(Expr::literal("b"))),
            Object::Value(Value::String("ab".into()))
        );
        let div = Expr::binary(BinaryOp::Divide, Expr::literal(1i32), Expr::literal(0i32));
        assert!(evaluate(&div, &Env::new(&[])).is_err());
    }

    #[test]
    fn test_in_list_three_valued() {
        let set = Expr::opaque(
            "ids",
            ScalarType::Int32,
            vec![Value::Int32(1), Value::Null],
        );
        let hit = Expr::In {
            item: Box::new(Expr::literal(1i32)),
            set: Box::new(set.clone()),
        };
        let miss = Expr::In {
            item: Box::new(Expr::literal(2i32)),
            set: Box::new(set),
        };
        assert_eq!(eval(&hit), bool_obj(true));
        assert_eq!(eval(&miss), Object::Null);
    }

    #[test]
    fn test_date_parts() {
        // 2024-02-29T13:45:30Z
        let micros = 1_709_214_330_000_000;
        assert_eq!(date_part(micros, DatePart::Year), 2024);
        assert_eq!(date_part(micros, DatePart::Month), 2);
        assert_eq!(date_part(micros, DatePart::Day), 29);
        assert_eq!(date_part(micros, DatePart::Hour), 13);
        assert_eq!(date_part(micros, DatePart::Minute), 45);
        assert_eq!(date_part(micros, DatePart::Second), 30);
        assert_eq!(date_part(-1, DatePart::Year), 1969);
        assert_eq!(format_timestamp(micros + 250), "2024-02-29 13:45:30.000250");
    }

    #[test]
    fn test_entity_member_and_lambda() {
        let entity = Arc::new(Entity::new(
            "User",
            vec![("id".into(), Value::Int64(7)), ("kind".into(), "admin".into())],
        ));
        let d = Parameter::new("d", Type::entity("User"));
        let test = Lambda::new(
            vec![d.clone()],
            d.to_expr().member("kind").eq(Expr::literal("admin")),
        );
        assert_eq!(
            apply(&test, vec![Object::Entity(entity.clone())], &[]).unwrap(),
            bool_obj(true)
        );

        let missing = Lambda::new(vec![d.clone()], d.to_expr().member("nope"));
        assert!(matches!(
            apply(&missing, vec![Object::Entity(entity)], &[]),
            Err(Error::UnknownMember { .. })
        ));
    }

    #[test]
    fn test_synthetic_parameters() {
        let p = Parameter::synthetic(0, Type::int32());
        let params = [ParameterValue::Scalar(Value::Int32(4))];
        let env = Env::new(&params);
        assert_eq!(
            evaluate(&p.to_expr().add(Expr::literal(1i32)), &env).unwrap(),
            Object::Value(Value::Int32(5))
        );
    }

    #[test]
    fn test_query_methods_are_not_evaluable() {
        let count = quarry_expr::Query::from("User").count();
        assert!(matches!(
            evaluate(&count, &Env::new(&[])),
            Err(Error::Untranslatable(_))
        ));
    }
}
