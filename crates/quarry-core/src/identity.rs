//! Identity resolution for materialized entities.

use std::sync::Arc;

use dashmap::DashMap;
use quarry_expr::Value;

use crate::descriptor::PrimaryKeyDescriptor;
use crate::object::Entity;

/// Whether materialized entities should be remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    Tracked,
    #[default]
    NoTracking,
}

impl TrackingState {
    pub fn from_flag(tracking: bool) -> Self {
        if tracking {
            TrackingState::Tracked
        } else {
            TrackingState::NoTracking
        }
    }
}

/// Returns the instance of record for an entity key.
///
/// The materializer builds a candidate instance per row and always uses
/// the instance this returns, which may be a previously materialized one.
pub trait IdentityResolver: Send + Sync {
    fn resolve(
        &self,
        descriptor: &PrimaryKeyDescriptor,
        key: &[Value],
        candidate: Entity,
        tracking: TrackingState,
    ) -> Arc<Entity>;
}

/// Every row yields a fresh instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentityResolution;

impl IdentityResolver for NoIdentityResolution {
    fn resolve(
        &self,
        _descriptor: &PrimaryKeyDescriptor,
        _key: &[Value],
        candidate: Entity,
        _tracking: TrackingState,
    ) -> Arc<Entity> {
        Arc::new(candidate)
    }
}

/// An identity map keyed by entity type and key values.
///
/// Tracked materializations of the same key return the first instance;
/// untracked ones bypass the map.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: DashMap<(String, Vec<Value>), Arc<Entity>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a tracked entity.
    pub fn get(&self, entity: &str, key: &[Value]) -> Option<Arc<Entity>> {
        self.entries
            .get(&(entity.to_string(), key.to_vec()))
            .map(|entry| entry.value().clone())
    }

    /// Forget every tracked entity.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl IdentityResolver for IdentityMap {
    fn resolve(
        &self,
        descriptor: &PrimaryKeyDescriptor,
        key: &[Value],
        candidate: Entity,
        tracking: TrackingState,
    ) -> Arc<Entity> {
        match tracking {
            TrackingState::NoTracking => Arc::new(candidate),
            TrackingState::Tracked => self
                .entries
                .entry((descriptor.entity().to_string(), key.to_vec()))
                .or_insert_with(|| Arc::new(candidate))
                .value()
                .clone(),
        }
    }
}
