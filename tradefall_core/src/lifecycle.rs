//! Expiry of particles that have fallen out of the scene.

use crate::config::LifecycleConfig;
use crate::entity::{Entity, EntityId};
use crate::pool::EntityPool;
use tracing::trace;

/// Removes entities that dropped below the floor threshold.
///
/// Expiry is purely positional: never by age, never by count. An entity must
/// have received at least one physics step before it can expire.
#[derive(Debug, Clone)]
pub struct LifecycleMonitor {
    floor_threshold: f64,
    total_expired: u64,
}

impl LifecycleMonitor {
    pub fn new(config: &LifecycleConfig) -> Self {
        Self {
            floor_threshold: config.floor_threshold,
            total_expired: 0,
        }
    }

    pub fn floor_threshold(&self) -> f64 {
        self.floor_threshold
    }

    /// Entities removed over the monitor's lifetime.
    pub fn total_expired(&self) -> u64 {
        self.total_expired
    }

    /// True if the entity should be removed.
    pub fn is_expired(&self, entity: &Entity) -> bool {
        let y = entity.position.y;
        entity.steps > 0 && (y.is_nan() || y < self.floor_threshold)
    }

    /// Removes every expired entity and returns their ids.
    pub fn sweep(&mut self, pool: &mut EntityPool) -> Vec<EntityId> {
        let expired: Vec<EntityId> = pool
            .entities()
            .filter(|e| self.is_expired(e))
            .map(|e| e.id)
            .collect();

        for id in &expired {
            pool.remove(*id);
            trace!(%id, "expired entity");
        }
        self.total_expired += expired.len() as u64;
        expired
    }
}

impl Default for LifecycleMonitor {
    fn default() -> Self {
        Self::new(&LifecycleConfig::default())
    }
}
