//! Query executor.
//!
//! Ties the pipeline together for one model: parameterize and inline the
//! incoming tree, key the plan cache by its structural hash, compile on a
//! miss, then bind the invocation's parameter values and run the plan.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use quarry_expr::{Expr, ParameterValue};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::cache::PlanCache;
use crate::compile::{CompiledQuery, Compiler};
use crate::config::{CompilerConfig, QueryOptions};
use crate::context::QueryProcessingContext;
use crate::descriptor::{DescriptorSetCache, MetadataProvider};
use crate::error::Result;
use crate::exec::{self, ExecutionContext, QueryResult};
use crate::sql::Command;
use crate::visitor::{
    ExpressionVisitor, InliningVisitor, ParameterizingVisitor, StructuralHasher, VisitorPipeline,
};

/// A parameterized, inlined query and its cache key.
pub(crate) struct Analyzed {
    pub hash: u64,
    pub shape: Expr,
    pub context: QueryProcessingContext,
}

/// A plan bound to one invocation's parameter values.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    /// Plan-cache key.
    pub hash: u64,
    /// Whether the plan came from the cache.
    pub cached: bool,
    /// The shared compiled plan.
    pub plan: Arc<CompiledQuery>,
    /// The plan's command with this invocation's values bound.
    pub command: Command,
    /// Parameter values by slot.
    pub parameters: Vec<ParameterValue>,
}

/// Counters for an executor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ExecutorStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_collisions: u64,
    pub cached_plans: usize,
    pub compilations: u64,
    pub descriptor_builds: u64,
}

impl ExecutorStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total > 0 {
            self.cache_hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Compiles and runs queries against one model.
///
/// Shared across threads; all caches are internally synchronized.
pub struct QueryExecutor {
    provider: Arc<dyn MetadataProvider>,
    config: CompilerConfig,
    descriptors: DescriptorSetCache,
    plans: PlanCache,
    pipeline: VisitorPipeline,
    compiler: Compiler,
    compilations: AtomicU64,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("model", &self.provider.model_id())
            .field("config", &self.config)
            .field("plans", &self.plans.len())
            .finish()
    }
}

impl QueryExecutor {
    /// Create an executor with the default configuration.
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self::with_config(provider, CompilerConfig::default())
    }

    /// Create an executor with a custom configuration.
    pub fn with_config(provider: Arc<dyn MetadataProvider>, config: CompilerConfig) -> Self {
        Self {
            provider,
            compiler: Compiler::new(config.flavor),
            config,
            descriptors: DescriptorSetCache::new(),
            plans: PlanCache::new(),
            pipeline: VisitorPipeline::new(),
            compilations: AtomicU64::new(0),
        }
    }

    /// Replace the visitor pipeline.
    pub fn with_pipeline(mut self, pipeline: VisitorPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plans
    }

    /// Compile (or fetch) the plan for `expr` and run it.
    ///
    /// Failures at any stage propagate and leave the plan cache untouched.
    #[instrument(level = "debug", skip_all, fields(model = %self.provider.model_id()))]
    pub fn execute<'a>(&self, expr: Expr, context: &ExecutionContext<'a>) -> Result<QueryResult<'a>> {
        let prepared = self.prepare(expr, context.options)?;
        exec::run(prepared.plan, &prepared.command, prepared.parameters, context)
    }

    /// Compile (or fetch) the plan for `expr` and bind its parameters,
    /// without running it.
    pub fn prepare(&self, expr: Expr, options: QueryOptions) -> Result<PreparedQuery> {
        let analyzed = self.analyze(expr, options)?;
        let hash = analyzed.hash;

        let cached = if self.config.plan_cache {
            self.plans.try_get(hash, &analyzed.shape)
        } else {
            None
        };
        let (plan, cached, context) = match cached {
            Some(plan) => {
                debug!(hash = %format_args!("{hash:016x}"), "plan cache hit");
                (plan, true, analyzed.context)
            }
            None => {
                debug!(hash = %format_args!("{hash:016x}"), "plan cache miss");
                let Analyzed { shape, mut context, .. } = analyzed;
                let plan = Arc::new(self.compile(shape.clone(), &mut context)?);
                if self.config.plan_cache {
                    self.plans.add(hash, shape, plan.clone());
                }
                (plan, false, context)
            }
        };

        let parameters = context.parameter_values();
        let command = plan.command.bind(&parameters)?;
        Ok(PreparedQuery {
            hash,
            cached,
            plan,
            command,
            parameters,
        })
    }

    /// Snapshot of the executor's counters.
    pub fn stats(&self) -> ExecutorStats {
        let cache = self.plans.stats();
        ExecutorStats {
            cache_hits: cache.hits(),
            cache_misses: cache.misses(),
            cache_collisions: cache.collisions(),
            cached_plans: self.plans.len(),
            compilations: self.compilations.load(Ordering::Relaxed),
            descriptor_builds: self.descriptors.builds(),
        }
    }

    /// Parameterize, inline and hash.
    pub(crate) fn analyze(&self, expr: Expr, options: QueryOptions) -> Result<Analyzed> {
        let descriptors = self.descriptors.get_or_build(self.provider.as_ref(), options)?;
        let mut context = QueryProcessingContext::new(descriptors, options);

        let expr = ParameterizingVisitor.visit(expr, &mut context)?;
        let shape = InliningVisitor::new(self.config.max_depth).visit(expr, &mut context)?;

        let mut hasher = StructuralHasher::new();
        hasher.write(self.provider.model_id());
        hasher.write(options.ignore_filters);
        hasher.visit(&shape);
        Ok(Analyzed {
            hash: hasher.finish(),
            shape,
            context,
        })
    }

    /// Rewrite, compose, optimize and compile a parameterized shape.
    pub(crate) fn compile(
        &self,
        shape: Expr,
        context: &mut QueryProcessingContext,
    ) -> Result<CompiledQuery> {
        let expr = self.pipeline.rewrite(shape, context)?;
        let expr = self.pipeline.compose(expr, context)?;
        let plan = self.compiler.compile(&expr, context)?;
        self.compilations.fetch_add(1, Ordering::Relaxed);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ModelProvider;
    use crate::error::Error;
    use crate::testing::blog_model;
    use quarry_expr::{Query, Type, Value};

    fn executor() -> QueryExecutor {
        QueryExecutor::new(Arc::new(ModelProvider::new(blog_model()).unwrap()))
    }

    fn by_id(id: i64) -> Expr {
        Query::from("Post")
            .filter(|p| p.member("id").eq(Expr::captured(id)))
            .into_expr()
    }

    #[test]
    fn test_captured_values_share_a_plan() {
        let executor = executor();
        let first = executor.prepare(by_id(1), QueryOptions::default()).unwrap();
        let second = executor.prepare(by_id(2), QueryOptions::default()).unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.hash, second.hash);
        assert!(Arc::ptr_eq(&first.plan, &second.plan));
        assert_eq!(second.command.parameters, vec![Value::Int64(2)]);

        let stats = executor.stats();
        assert_eq!(stats.compilations, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cached_plans, 1);
    }

    #[test]
    fn test_parameter_type_is_part_of_the_key() {
        let executor = executor();
        let as_int = Query::from("Post")
            .filter(|p| p.member("views").eq(Expr::captured(3i32)))
            .into_expr();
        let as_long = Query::from("Post")
            .filter(|p| p.member("views").eq(Expr::captured(3i64)))
            .into_expr();
        let a = executor.prepare(as_int, QueryOptions::default()).unwrap();
        let b = executor.prepare(as_long, QueryOptions::default()).unwrap();
        assert_ne!(a.hash, b.hash);
        assert_eq!(executor.stats().compilations, 2);
    }

    #[test]
    fn test_ignore_filters_is_part_of_the_key() {
        let executor = executor();
        let users = || Query::from("User").into_expr();
        let filtered = executor.prepare(users(), QueryOptions::default()).unwrap();
        let all = executor
            .prepare(users(), QueryOptions::default().with_ignore_filters(true))
            .unwrap();
        assert_ne!(filtered.hash, all.hash);
        assert!(filtered.command.text.contains("WHERE"));
        assert!(!all.command.text.contains("WHERE"));
    }

    #[test]
    fn test_failed_compilation_is_not_cached() {
        let executor = executor();
        let query = Query::from("Post")
            .select(|p| {
                p.member("title").call(
                    quarry_expr::Method::Custom("Slugify".into()),
                    vec![],
                    Type::string(),
                )
            })
            .into_expr();
        for _ in 0..2 {
            let err = executor.prepare(query.clone(), QueryOptions::default()).unwrap_err();
            assert!(matches!(err, Error::Untranslatable(_)));
        }
        assert!(executor.plan_cache().is_empty());
        assert_eq!(executor.stats().cache_misses, 2);
    }

    #[test]
    fn test_disabled_cache_recompiles() {
        let executor = QueryExecutor::with_config(
            Arc::new(ModelProvider::new(blog_model()).unwrap()),
            CompilerConfig::new().with_plan_cache(false),
        );
        executor.prepare(by_id(1), QueryOptions::default()).unwrap();
        executor.prepare(by_id(1), QueryOptions::default()).unwrap();
        assert_eq!(executor.stats().compilations, 2);
        assert!(executor.plan_cache().is_empty());
    }
}
