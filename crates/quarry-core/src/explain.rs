//! Query explanation.
//!
//! Shows what an executor would do with a query, without running it and
//! without touching the plan cache or its statistics.

use std::fmt::Write;
use std::sync::Arc;

use quarry_expr::{ParameterValue, Type};
use serde::Serialize;

use crate::compile::CompiledQuery;
use crate::config::QueryOptions;
use crate::error::Result;
use crate::executor::QueryExecutor;

/// One synthetic parameter in an explained command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainParameter {
    pub slot: usize,
    pub ty: String,
    pub value: String,
}

/// The result of explaining a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainResult {
    /// Plan-cache key, hex encoded.
    pub hash: String,
    /// Whether a plan for this shape is already cached.
    pub plan_cached: bool,
    /// Command text with parameter markers.
    pub command: String,
    pub parameters: Vec<ExplainParameter>,
    /// Result shape, e.g. `sequence` or `scalar(..)`.
    pub shape: String,
    /// Human-readable summary.
    pub explanation: String,
}

impl ExplainResult {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Service for explaining queries without executing them.
pub struct ExplainService<'a> {
    executor: &'a QueryExecutor,
}

impl<'a> ExplainService<'a> {
    /// Create a new explain service.
    pub fn new(executor: &'a QueryExecutor) -> Self {
        Self { executor }
    }

    /// Explain a query without executing it.
    ///
    /// A cached plan is reused; otherwise the query is compiled but the
    /// plan is not stored.
    pub fn explain(&self, expr: quarry_expr::Expr, options: QueryOptions) -> Result<ExplainResult> {
        let analyzed = self.executor.analyze(expr, options)?;
        let hash = hex::encode(analyzed.hash.to_be_bytes());

        let cached = self.executor.plan_cache().peek(analyzed.hash, &analyzed.shape);
        let plan_cached = cached.is_some();
        let mut context = analyzed.context;
        let plan = match cached {
            Some(plan) => plan,
            None => Arc::new(self.executor.compile(analyzed.shape, &mut context)?),
        };

        let parameters = context
            .parameters()
            .iter()
            .enumerate()
            .map(|(slot, (parameter, value))| ExplainParameter {
                slot,
                ty: type_name(&parameter.ty),
                value: value_text(value),
            })
            .collect::<Vec<_>>();

        let explanation = explanation(&plan, &hash, plan_cached, &parameters);
        Ok(ExplainResult {
            hash,
            plan_cached,
            command: plan.command.display_text(),
            parameters,
            shape: plan.shape.to_string(),
            explanation,
        })
    }
}

fn type_name(ty: &Type) -> String {
    match ty {
        Type::Scalar(scalar) => scalar.name().to_string(),
        Type::Nullable(scalar) => format!("{}?", scalar.name()),
        Type::Sequence(element) => format!("[{}]", type_name(element)),
        other => format!("{other:?}"),
    }
}

fn value_text(value: &ParameterValue) -> String {
    match value {
        ParameterValue::Scalar(value) => format!("{value:?}"),
        ParameterValue::List(values) => format!("{} values", values.len()),
    }
}

fn explanation(
    plan: &CompiledQuery,
    hash: &str,
    cached: bool,
    parameters: &[ExplainParameter],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Plan {hash} ({})", if cached { "cached" } else { "not cached" });
    let _ = writeln!(out, "  Shape: {}", plan.shape);
    let _ = writeln!(out, "  Command: {}", plan.command.display_text());
    for p in parameters {
        let _ = writeln!(out, "  Param {}: {} = {}", p.slot, p.ty, p.value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ModelProvider;
    use crate::error::Error;
    use crate::testing::blog_model;
    use quarry_expr::{Expr, Query};

    fn executor() -> QueryExecutor {
        QueryExecutor::new(Arc::new(ModelProvider::new(blog_model()).unwrap()))
    }

    fn query() -> Expr {
        Query::from("Post")
            .filter(|p| p.member("views").gt(Expr::captured(10i32)))
            .into_expr()
    }

    #[test]
    fn test_explain_simple_query() {
        let executor = executor();
        let result = ExplainService::new(&executor)
            .explain(query(), QueryOptions::default())
            .unwrap();

        assert!(!result.plan_cached);
        assert_eq!(result.hash.len(), 16);
        assert_eq!(result.shape, "sequence");
        assert_eq!(result.parameters.len(), 1);
        assert_eq!(result.parameters[0].ty, "i32");
        assert!(result.command.contains(r#"FROM "posts""#));
        assert!(result.explanation.contains("not cached"));
        assert!(executor.plan_cache().is_empty());
        assert_eq!(executor.stats().cache_misses, 0);
    }

    #[test]
    fn test_explain_reports_cached_plan() {
        let executor = executor();
        let prepared = executor.prepare(query(), QueryOptions::default()).unwrap();
        let result = ExplainService::new(&executor)
            .explain(query(), QueryOptions::default())
            .unwrap();

        assert!(result.plan_cached);
        assert_eq!(result.hash, hex::encode(prepared.hash.to_be_bytes()));
        assert!(result.to_json().contains("\"plan_cached\": true"));
    }

    #[test]
    fn test_explain_unknown_entity() {
        let executor = executor();
        let err = ExplainService::new(&executor)
            .explain(Query::from("Nope").into_expr(), QueryOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(_)));
    }
}
