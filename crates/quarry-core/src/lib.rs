//! Quarry Core - query compilation, plan caching and execution.
//!
//! Turns [`quarry_expr`] trees into parameterized SQL plans, caches them by
//! structural shape and runs them through a [`CommandExecutor`].

pub mod cache;
pub mod catalog;
pub mod compile;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod eval;
pub mod exec;
pub mod executor;
pub mod explain;
pub mod identity;
pub mod object;
pub mod sql;
pub mod visitor;

#[cfg(test)]
mod testing;

pub use cache::{CacheStats, CachedPlan, PlanCache};
pub use catalog::{EntityDef, FieldDef, Model, ModelId, RelationDef};
pub use compile::{CompiledQuery, Compiler, ResultShape, SingleKind};
pub use config::{CompilerConfig, Flavor, QueryOptions};
pub use context::QueryProcessingContext;
pub use descriptor::{DescriptorSet, DescriptorSetCache, MetadataProvider, ModelProvider};
pub use error::{Error, ExecutionError, Result};
pub use exec::{CommandExecutor, ExecutionContext, QueryResult, Row, RowReader, Rows};
pub use executor::{ExecutorStats, PreparedQuery, QueryExecutor};
pub use explain::{ExplainResult, ExplainService};
pub use identity::{IdentityMap, IdentityResolver, NoIdentityResolution, TrackingState};
pub use object::{Entity, Object, Record};
pub use sql::{Command, CommandTemplate};
pub use visitor::{ExpressionVisitor, VisitorPipeline};

/// Re-export the expression vocabulary.
pub use quarry_expr as expr;
