//! Fluent builder for query expressions.
//!
//! ```
//! use quarry_expr::{Expr, Query};
//!
//! let user_id = 42;
//! let query = Query::from("User")
//!     .filter(|u| u.member("id").eq(Expr::captured(user_id)))
//!     .select(|u| u.member("name"));
//! assert!(query.expr().as_query_call().is_some());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::expr::{Expr, Parameter};
use crate::method::QueryMethod;
use crate::types::Type;

static NEXT_PARAM: AtomicUsize = AtomicUsize::new(0);

/// A lambda parameter with a process-unique name.
///
/// Hashing and equality are alpha-equivalent, so the name only has to keep
/// nested lambdas from capturing each other's parameters.
pub fn fresh_parameter(ty: Type) -> Parameter {
    let n = NEXT_PARAM.fetch_add(1, Ordering::Relaxed);
    let prefix = match &ty {
        Type::Entity(name) => name
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('x'),
        _ => 'x',
    };
    Parameter::new(format!("{prefix}{n}"), ty)
}

/// A sequence-valued query under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    expr: Expr,
}

impl Query {
    /// Start from the root set of an entity type.
    pub fn from(entity: impl Into<String>) -> Self {
        Self {
            expr: Expr::entity_set(entity),
        }
    }

    /// Continue from an existing sequence expression.
    pub fn from_expr(expr: Expr) -> Self {
        Self { expr }
    }

    /// The expression built so far.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Consume the builder, returning the expression.
    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// Wrap this query as a composable source for another query.
    pub fn into_queryable(self) -> Expr {
        Expr::queryable(self.expr)
    }

    /// Element type of the sequence.
    pub fn element_type(&self) -> Type {
        self.expr.ty().element().cloned().unwrap_or(Type::Unknown)
    }

    fn lambda(&self, body: impl FnOnce(Expr) -> Expr) -> Expr {
        let param = fresh_parameter(self.element_type());
        let body = body(param.to_expr());
        Expr::lambda(vec![param], body)
    }

    fn chain(self, method: QueryMethod, mut rest: Vec<Expr>) -> Self {
        let mut args = vec![self.expr];
        args.append(&mut rest);
        Self {
            expr: Expr::query_call(method, args),
        }
    }

    /// `Where(predicate)`.
    pub fn filter(self, predicate: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.lambda(predicate);
        self.chain(QueryMethod::Where, vec![lambda])
    }

    /// `Select(selector)`.
    pub fn select(self, selector: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.lambda(selector);
        self.chain(QueryMethod::Select, vec![lambda])
    }

    /// `OrderBy(key)`.
    pub fn order_by(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.lambda(key);
        self.chain(QueryMethod::OrderBy, vec![lambda])
    }

    /// `OrderByDescending(key)`.
    pub fn order_by_desc(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.lambda(key);
        self.chain(QueryMethod::OrderByDescending, vec![lambda])
    }

    /// `ThenBy(key)`.
    pub fn then_by(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.lambda(key);
        self.chain(QueryMethod::ThenBy, vec![lambda])
    }

    /// `ThenByDescending(key)`.
    pub fn then_by_desc(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.lambda(key);
        self.chain(QueryMethod::ThenByDescending, vec![lambda])
    }

    /// `Take(count)`.
    pub fn take(self, count: Expr) -> Self {
        self.chain(QueryMethod::Take, vec![count])
    }

    /// `Skip(count)`.
    pub fn skip(self, count: Expr) -> Self {
        self.chain(QueryMethod::Skip, vec![count])
    }

    /// `Distinct()`.
    pub fn distinct(self) -> Self {
        self.chain(QueryMethod::Distinct, vec![])
    }

    /// `Include(e => e.member)`.
    pub fn include(self, member: &str) -> Self {
        let lambda = self.lambda(|e| e.member(member));
        self.chain(QueryMethod::Include, vec![lambda])
    }

    /// `Join(inner, outer_key, inner_key, result)`.
    pub fn join(
        self,
        inner: Query,
        outer_key: impl FnOnce(Expr) -> Expr,
        inner_key: impl FnOnce(Expr) -> Expr,
        result: impl FnOnce(Expr, Expr) -> Expr,
    ) -> Self {
        let outer_key = self.lambda(outer_key);
        let inner_key = inner.lambda(inner_key);
        let o = fresh_parameter(self.element_type());
        let i = fresh_parameter(inner.element_type());
        let body = result(o.to_expr(), i.to_expr());
        let result = Expr::lambda(vec![o, i], body);
        self.chain(
            QueryMethod::Join,
            vec![inner.expr, outer_key, inner_key, result],
        )
    }

    fn terminal(self, method: QueryMethod, rest: Vec<Expr>) -> Expr {
        self.chain(method, rest).expr
    }

    /// `First()`.
    pub fn first(self) -> Expr {
        self.terminal(QueryMethod::First, vec![])
    }

    /// `FirstOrDefault()`.
    pub fn first_or_default(self) -> Expr {
        self.terminal(QueryMethod::FirstOrDefault, vec![])
    }

    /// `Single()`.
    pub fn single(self) -> Expr {
        self.terminal(QueryMethod::Single, vec![])
    }

    /// `SingleOrDefault()`.
    pub fn single_or_default(self) -> Expr {
        self.terminal(QueryMethod::SingleOrDefault, vec![])
    }

    /// `Count()`.
    pub fn count(self) -> Expr {
        self.terminal(QueryMethod::Count, vec![])
    }

    /// `Any()`.
    pub fn any(self) -> Expr {
        self.terminal(QueryMethod::Any, vec![])
    }

    /// `Any(predicate)`.
    pub fn any_where(self, predicate: impl FnOnce(Expr) -> Expr) -> Expr {
        let lambda = self.lambda(predicate);
        self.terminal(QueryMethod::Any, vec![lambda])
    }

    /// `All(predicate)`.
    pub fn all(self, predicate: impl FnOnce(Expr) -> Expr) -> Expr {
        let lambda = self.lambda(predicate);
        self.terminal(QueryMethod::All, vec![lambda])
    }

    /// `Sum(selector)`.
    pub fn sum(self, selector: impl FnOnce(Expr) -> Expr) -> Expr {
        let lambda = self.lambda(selector);
        self.terminal(QueryMethod::Sum, vec![lambda])
    }

    /// `Min(selector)`.
    pub fn min(self, selector: impl FnOnce(Expr) -> Expr) -> Expr {
        let lambda = self.lambda(selector);
        self.terminal(QueryMethod::Min, vec![lambda])
    }

    /// `Max(selector)`.
    pub fn max(self, selector: impl FnOnce(Expr) -> Expr) -> Expr {
        let lambda = self.lambda(selector);
        self.terminal(QueryMethod::Max, vec![lambda])
    }

    /// `Average(selector)`.
    pub fn average(self, selector: impl FnOnce(Expr) -> Expr) -> Expr {
        let lambda = self.lambda(selector);
        self.terminal(QueryMethod::Average, vec![lambda])
    }

    /// `collection.Contains(item)` with this query as the collection.
    pub fn contains(self, item: Expr) -> Expr {
        self.expr
            .call(crate::method::Method::Contains, vec![item], Type::bool())
    }
}

impl From<Query> for Expr {
    fn from(query: Query) -> Self {
        query.expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builds_where_call() {
        let query = Query::from("User").filter(|u| u.member("active"));
        let (method, args) = query.expr().as_query_call().unwrap();
        assert_eq!(method, QueryMethod::Where);
        assert_eq!(args.len(), 2);
        let lambda = args[1].as_lambda().unwrap();
        assert_eq!(lambda.param().unwrap().ty, Type::entity("User"));
    }

    #[test]
    fn test_fresh_parameters_are_distinct() {
        let a = fresh_parameter(Type::entity("User"));
        let b = fresh_parameter(Type::entity("User"));
        assert_ne!(a.name, b.name);
        assert!(a.name.starts_with('u'));
    }

    #[test]
    fn test_terminal_operators() {
        let count = Query::from("Post").count();
        assert_eq!(count.ty(), Type::int32());

        let first = Query::from("Post").first_or_default();
        assert_eq!(first.ty(), Type::entity("Post"));
    }

    #[test]
    fn test_join_result_lambda_has_two_params() {
        let query = Query::from("Post").join(
            Query::from("User"),
            |p| p.member("author_id"),
            |u| u.member("id"),
            |p, u| Expr::new_record(vec![("post".into(), p), ("user".into(), u)]),
        );
        let (method, args) = query.expr().as_query_call().unwrap();
        assert_eq!(method, QueryMethod::Join);
        assert_eq!(args.len(), 5);
        assert_eq!(args[4].as_lambda().unwrap().params.len(), 2);
        assert!(query.element_type().record_field("post").is_some());
    }
}
