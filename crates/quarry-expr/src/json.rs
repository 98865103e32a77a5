//! JSON encoding of expression trees.

use crate::error::{Error, Result};
use crate::expr::{Constant, Expr, QueryRoot};
use crate::method::{Method, QueryMethod};

impl Expr {
    /// Parse and validate an expression tree from JSON.
    pub fn from_json(json: &str) -> Result<Expr> {
        let expr: Expr =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        expr.validate()?;
        Ok(expr)
    }

    /// Encode this expression tree as JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Check the structural rules the node types cannot express: operator
    /// arity, lambda positions and parameter counts.
    pub fn validate(&self) -> Result<()> {
        match self {
            Expr::Call {
                method: Method::Query(method),
                target,
                args,
                ..
            } => {
                if target.is_some() {
                    return Err(invalid(format!(
                        "{} must be called statically",
                        method.name()
                    )));
                }
                validate_query_args(*method, args)?;
            }
            Expr::Constant(Constant::Query(QueryRoot::Expression(inner))) => inner.validate()?,
            _ => {}
        }
        self.children().into_iter().try_for_each(Expr::validate)
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidExpression(message)
}

fn expect_lambda(method: QueryMethod, args: &[Expr], index: usize, arity: usize) -> Result<()> {
    match args.get(index).and_then(Expr::as_lambda) {
        Some(lambda) if lambda.params.len() == arity => Ok(()),
        Some(lambda) => Err(invalid(format!(
            "{} argument {} takes {} parameter(s), found {}",
            method.name(),
            index,
            arity,
            lambda.params.len()
        ))),
        None => Err(invalid(format!(
            "{} argument {} must be a lambda",
            method.name(),
            index
        ))),
    }
}

fn validate_query_args(method: QueryMethod, args: &[Expr]) -> Result<()> {
    let expected: &[usize] = match method {
        QueryMethod::Where
        | QueryMethod::Select
        | QueryMethod::OrderBy
        | QueryMethod::OrderByDescending
        | QueryMethod::ThenBy
        | QueryMethod::ThenByDescending
        | QueryMethod::Include
        | QueryMethod::All
        | QueryMethod::Take
        | QueryMethod::Skip => &[2],
        QueryMethod::Join | QueryMethod::LeftJoin => &[5],
        QueryMethod::Distinct => &[1],
        _ => &[1, 2],
    };
    if !expected.contains(&args.len()) {
        return Err(invalid(format!(
            "{} expects {:?} argument(s), found {}",
            method.name(),
            expected,
            args.len()
        )));
    }
    match method {
        QueryMethod::Take | QueryMethod::Skip | QueryMethod::Distinct => Ok(()),
        QueryMethod::Join | QueryMethod::LeftJoin => {
            expect_lambda(method, args, 2, 1)?;
            expect_lambda(method, args, 3, 1)?;
            expect_lambda(method, args, 4, 2)
        }
        _ if args.len() == 2 => expect_lambda(method, args, 1, 1),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;

    #[test]
    fn test_json_roundtrip() {
        let expr = Query::from("User")
            .filter(|u| u.member("id").eq(Expr::captured(7i32)))
            .select(|u| u.member("name"))
            .into_expr();
        let json = expr.to_json().unwrap();
        let back = Expr::from_json(&json).unwrap();
        assert_eq!(expr, back);
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = Expr::from_json("{\"Nope\": 1}").unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn test_rejects_where_without_lambda() {
        let expr = Expr::query_call(
            QueryMethod::Where,
            vec![Expr::entity_set("User"), Expr::literal(true)],
        );
        let json = expr.to_json().unwrap();
        let err = Expr::from_json(&json).unwrap_err();
        assert!(matches!(err, Error::InvalidExpression(_)));
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let expr = Expr::query_call(QueryMethod::Join, vec![Expr::entity_set("User")]);
        assert!(matches!(
            expr.validate(),
            Err(Error::InvalidExpression(_))
        ));
    }
}
