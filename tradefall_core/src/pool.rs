//! The live particle set.
//!
//! The pool owns every [`Entity`] from admission to expiry. Spawn placement
//! is random but reproducible: each entity's jitter is drawn from a ChaCha8
//! stream seeded by the pool seed and the entity id, so admitting the same
//! events in any order yields the same particles.

use crate::admission::Batch;
use crate::config::SpawnConfig;
use crate::entity::{Entity, EntityId, EntitySnapshot, TradeEvent};
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use tracing::trace;

/// Owns the live entity set.
#[derive(Debug)]
pub struct EntityPool {
    /// Spawn region, velocity and size settings
    config: SpawnConfig,

    /// Live entities keyed by id
    entities: HashMap<EntityId, Entity>,

    /// Entities admitted over the pool's lifetime
    total_admitted: u64,
}

impl EntityPool {
    /// Creates an empty pool.
    pub fn new(config: SpawnConfig) -> Self {
        Self {
            config,
            entities: HashMap::new(),
            total_admitted: 0,
        }
    }

    /// Spawns one entity per event in the batch. Returns the number admitted.
    ///
    /// # Panics
    /// If an event's id is already live. Ids come from a monotonic generator,
    /// so a collision means the pipeline is miswired.
    pub fn admit_batch(&mut self, batch: Batch) -> usize {
        let count = batch.len();
        for event in batch {
            self.admit(event);
        }
        count
    }

    fn admit(&mut self, event: TradeEvent) {
        let id = event.id();
        assert!(
            !self.entities.contains_key(&id),
            "internal invariant violated: entity {} admitted twice",
            id
        );

        let entity = self.spawn(&event);
        trace!(
            %id,
            side = %entity.side,
            notional = entity.notional_value,
            size = entity.visual_size,
            "admitted entity"
        );
        self.entities.insert(id, entity);
        self.total_admitted += 1;
    }

    fn spawn(&self, event: &TradeEvent) -> Entity {
        let cfg = &self.config;
        let mut rng = ChaCha8Rng::seed_from_u64(
            cfg.seed ^ event.id().as_u64().wrapping_mul(0x9e3779b97f4a7c15),
        );

        let position = Vector3::new(
            symmetric(&mut rng, cfg.spawn_half_extent),
            cfg.spawn_height,
            symmetric(&mut rng, cfg.spawn_half_extent),
        );
        let velocity = Vector3::new(
            symmetric(&mut rng, cfg.horizontal_jitter),
            -cfg.initial_fall_speed,
            symmetric(&mut rng, cfg.horizontal_jitter),
        );

        Entity {
            id: event.id(),
            position,
            velocity,
            visual_size: cfg.size.size_for(event.notional_value()),
            side: event.side(),
            notional_value: event.notional_value(),
            rotation_phase: 0.0,
            steps: 0,
        }
    }

    /// Removes an entity. Returns false if it was not live; calling twice is harmless.
    pub fn remove(&mut self, id: EntityId) -> bool {
        self.entities.remove(&id).is_some()
    }

    /// Returns a live entity by id.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Consistent copy of every live entity, ordered by id.
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        let mut out: Vec<EntitySnapshot> = self.entities.values().map(Entity::snapshot).collect();
        out.sort_by_key(|s| s.id);
        out
    }

    /// Ids of all live entities (unordered).
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities admitted over the pool's lifetime.
    pub fn total_admitted(&self) -> u64 {
        self.total_admitted
    }

    pub fn config(&self) -> &SpawnConfig {
        &self.config
    }

    pub(crate) fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub(crate) fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }
}

/// Uniform sample from [-half, half), or 0 for an empty range.
/// Scales a unit sample; sampling `-half..half` directly overflows once
/// `2 * half` is not representable.
fn symmetric(rng: &mut ChaCha8Rng, half: f64) -> f64 {
    if half > 0.0 && half.is_finite() {
        let unit: f64 = rng.gen();
        (2.0 * unit - 1.0) * half
    } else {
        0.0
    }
}
