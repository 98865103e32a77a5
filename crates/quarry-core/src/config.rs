//! Compiler configuration and per-execution query options.

use serde::{Deserialize, Serialize};

/// Default maximum nesting depth for queryable inlining.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// SQL dialect of the generated command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// SQLite: `?n` placeholders, double-quoted identifiers.
    #[default]
    Sqlite,
    /// PostgreSQL: `$n` placeholders, double-quoted identifiers.
    Postgresql,
    /// MySQL: `?` placeholders, backtick-quoted identifiers.
    Mysql,
}

/// Configuration for a [`QueryExecutor`](crate::QueryExecutor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Dialect of generated commands.
    pub flavor: Flavor,

    /// Maximum nesting of composed queryables before inlining gives up.
    pub max_depth: usize,

    /// Whether compiled plans are cached. Disabling this recompiles every
    /// query, which is only useful for debugging the pipeline.
    pub plan_cache: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            flavor: Flavor::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            plan_cache: true,
        }
    }
}

impl CompilerConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SQL dialect.
    pub fn with_flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Set the maximum inlining depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Enable or disable the plan cache.
    pub fn with_plan_cache(mut self, enabled: bool) -> Self {
        self.plan_cache = enabled;
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::Error::Expr(quarry_expr::Error::Deserialization(e.to_string())))
    }
}

/// Per-execution flags.
///
/// Part of the descriptor-set cache key, and `ignore_filters` is part of the
/// plan-cache key since it changes the generated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Skip model-level query filters (soft delete).
    pub ignore_filters: bool,
    /// Ask the identity resolver to track materialized entities.
    pub use_tracking: bool,
}

impl QueryOptions {
    /// Options with tracking enabled and filters applied.
    pub fn tracking() -> Self {
        Self {
            ignore_filters: false,
            use_tracking: true,
        }
    }

    /// Set whether query filters are skipped.
    pub fn with_ignore_filters(mut self, ignore: bool) -> Self {
        self.ignore_filters = ignore;
        self
    }

    /// Set whether entities are tracked.
    pub fn with_tracking(mut self, tracking: bool) -> Self {
        self.use_tracking = tracking;
        self
    }
}
