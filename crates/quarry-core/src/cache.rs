//! Plan cache.
//!
//! Caches compiled plans keyed by the structural hash of the parameterized
//! expression, so queries differing only in captured values share a plan.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use dashmap::DashMap;
use quarry_expr::Expr;

use crate::compile::CompiledQuery;
use crate::visitor::structurally_equal;

/// Cached plan with metadata.
#[derive(Debug)]
pub struct CachedPlan {
    /// Structural hash the plan is stored under.
    pub hash: u64,
    /// The parameterized expression the plan was compiled from.
    pub shape: Expr,
    /// The compiled plan.
    pub plan: Arc<CompiledQuery>,
    /// Number of cache hits for this plan.
    pub hit_count: AtomicU64,
}

impl CachedPlan {
    /// Create a new cached plan.
    pub fn new(hash: u64, shape: Expr, plan: Arc<CompiledQuery>) -> Self {
        Self {
            hash,
            shape,
            plan,
            hit_count: AtomicU64::new(0),
        }
    }

    /// Increment the hit count and return the new value.
    pub fn record_hit(&self) -> u64 {
        self.hit_count.fetch_add(1, AtomicOrdering::Relaxed) + 1
    }

    /// Get the current hit count.
    pub fn hits(&self) -> u64 {
        self.hit_count.load(AtomicOrdering::Relaxed)
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    collisions: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    /// Get miss count, collisions included.
    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    /// Get insert count.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(AtomicOrdering::Relaxed)
    }

    /// Get the number of lookups whose hash matched a different shape.
    pub fn collisions(&self) -> u64 {
        self.collisions.load(AtomicOrdering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }

    fn reset(&self) {
        self.hits.store(0, AtomicOrdering::Relaxed);
        self.misses.store(0, AtomicOrdering::Relaxed);
        self.inserts.store(0, AtomicOrdering::Relaxed);
        self.collisions.store(0, AtomicOrdering::Relaxed);
    }
}

/// Concurrent plan cache.
///
/// No eviction: the number of distinct query shapes in a program is
/// bounded by its source. Racing first compilations of one shape both
/// insert and the last write wins.
#[derive(Debug, Default)]
pub struct PlanCache {
    entries: DashMap<u64, CachedPlan>,
    stats: CacheStats,
}

impl PlanCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the plan stored under `hash` if it was compiled from a shape
    /// structurally equal to `shape`.
    pub fn try_get(&self, hash: u64, shape: &Expr) -> Option<Arc<CompiledQuery>> {
        if let Some(cached) = self.entries.get(&hash) {
            if structurally_equal(&cached.shape, shape) {
                cached.record_hit();
                self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
                return Some(cached.plan.clone());
            }
            self.stats.collisions.fetch_add(1, AtomicOrdering::Relaxed);
        }
        self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
        None
    }

    /// Like [`try_get`](Self::try_get) but without counting the lookup.
    pub fn peek(&self, hash: u64, shape: &Expr) -> Option<Arc<CompiledQuery>> {
        self.entries
            .get(&hash)
            .filter(|cached| structurally_equal(&cached.shape, shape))
            .map(|cached| cached.plan.clone())
    }

    /// Store a plan, replacing any entry under the same hash.
    pub fn add(&self, hash: u64, shape: Expr, plan: Arc<CompiledQuery>) {
        self.entries.insert(hash, CachedPlan::new(hash, shape, plan));
        self.stats.inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Check if a plan is stored under `hash`, without touching statistics.
    pub fn contains(&self, hash: u64) -> bool {
        self.entries.contains_key(&hash)
    }

    /// Hit count of the entry under `hash`.
    pub fn hits_for(&self, hash: u64) -> Option<u64> {
        self.entries.get(&hash).map(|cached| cached.hits())
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the current number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all cached entries and reset statistics.
    pub fn clear(&self) {
        self.entries.clear();
        self.stats.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{CompiledQuery, Materializer, ResultMaterializer, ResultShape};
    use crate::config::Flavor;
    use crate::sql::{CommandTemplate, SelectStatement};
    use quarry_expr::{Parameter, Type};

    fn plan() -> Arc<CompiledQuery> {
        Arc::new(CompiledQuery {
            statement: SelectStatement::default(),
            command: CommandTemplate::new(Flavor::Sqlite, vec![]),
            shape: ResultShape::Scalar(Type::int32()),
            materializer: ResultMaterializer::Rows(Materializer::Column {
                index: 0,
                ty: Type::int32(),
            }),
        })
    }

    fn shape(ty: Type) -> Expr {
        Expr::Parameter(Parameter::synthetic(0, ty))
    }

    #[test]
    fn test_hit_after_add() {
        let cache = PlanCache::new();
        assert!(cache.try_get(1, &shape(Type::int32())).is_none());
        cache.add(1, shape(Type::int32()), plan());
        assert!(cache.try_get(1, &shape(Type::int32())).is_some());
        assert!(cache.try_get(1, &shape(Type::int32())).is_some());

        assert_eq!(cache.stats().hits(), 2);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().inserts(), 1);
        assert_eq!(cache.hits_for(1), Some(2));
        assert!((cache.stats().hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_collision_is_a_miss() {
        let cache = PlanCache::new();
        cache.add(7, shape(Type::int32()), plan());
        assert!(cache.try_get(7, &shape(Type::string())).is_none());
        assert_eq!(cache.stats().collisions(), 1);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn test_add_replaces_and_clear_empties() {
        let cache = PlanCache::new();
        cache.add(3, shape(Type::int32()), plan());
        cache.add(3, shape(Type::int32()), plan());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().inserts(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().inserts(), 0);
    }
}
