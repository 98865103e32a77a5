//! Descriptor-set cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::provider::MetadataProvider;
use super::set::DescriptorSet;
use crate::catalog::ModelId;
use crate::config::QueryOptions;
use crate::error::Result;

/// Caches descriptor sets per (model, query options).
///
/// Entries live as long as the cache. Two threads missing on the same key
/// may both build; the first insert wins and both get the same set.
#[derive(Debug, Default)]
pub struct DescriptorSetCache {
    sets: DashMap<(ModelId, QueryOptions), Arc<DescriptorSet>>,
    builds: AtomicU64,
}

impl DescriptorSetCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the descriptor set for `options`, building it on first use.
    pub fn get_or_build(
        &self,
        provider: &dyn MetadataProvider,
        options: QueryOptions,
    ) -> Result<Arc<DescriptorSet>> {
        let key = (provider.model_id(), options);
        if let Some(set) = self.sets.get(&key) {
            return Ok(set.clone());
        }

        let built = Arc::new(provider.descriptors(&options)?);
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(model = %key.0, ?options, "descriptor set cached");
        Ok(self.sets.entry(key).or_insert(built).clone())
    }

    /// Number of cached sets.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Number of times a provider was consulted.
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, Model};
    use crate::descriptor::ModelProvider;
    use quarry_expr::ScalarType;

    fn provider() -> ModelProvider {
        ModelProvider::new(
            Model::new("shop").with_entity(
                EntityDef::new("Item", "id")
                    .with_field(FieldDef::new("id", ScalarType::Int64))
                    .with_soft_delete(),
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_built_once_per_options() {
        let cache = DescriptorSetCache::new();
        let provider = provider();

        let a = cache
            .get_or_build(&provider, QueryOptions::default())
            .unwrap();
        let b = cache
            .get_or_build(&provider, QueryOptions::default())
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.builds(), 1);

        let c = cache
            .get_or_build(&provider, QueryOptions::default().with_ignore_filters(true))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.builds(), 2);
    }
}
