//! Per-frame kinematics.

use crate::config::PhysicsConfig;
use crate::entity::Entity;
use crate::pool::EntityPool;
use std::f64::consts::TAU;
use tracing::debug;

/// Advances every live entity by one time step.
///
/// Semi-implicit Euler: gravity is applied to the velocity first, then the
/// position moves by the *updated* velocity. Holds no per-entity state.
#[derive(Debug, Clone)]
pub struct PhysicsStepper {
    gravity: f64,
    spin_rate: f64,
}

impl PhysicsStepper {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            gravity: config.gravity,
            spin_rate: config.spin_rate,
        }
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    /// Steps all entities by `delta_time` seconds.
    ///
    /// Zero is a no-op; negative or non-finite deltas are ignored.
    pub fn step_all(&self, pool: &mut EntityPool, delta_time: f64) {
        if delta_time == 0.0 {
            return;
        }
        if !delta_time.is_finite() || delta_time < 0.0 {
            debug!(delta_time, "ignoring unusable frame delta");
            return;
        }

        for entity in pool.entities_mut() {
            self.step_entity(entity, delta_time);
        }
    }

    fn step_entity(&self, entity: &mut Entity, dt: f64) {
        entity.velocity.y -= self.gravity * dt;
        entity.position += entity.velocity * dt;
        entity.rotation_phase = (entity.rotation_phase + self.spin_rate * dt).rem_euclid(TAU);
        entity.steps += 1;
    }
}

impl Default for PhysicsStepper {
    fn default() -> Self {
        Self::new(&PhysicsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpawnConfig;
    use crate::entity::{EntityId, Side, TradeEvent};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn pool_with(n: u64) -> EntityPool {
        let mut pool = EntityPool::new(SpawnConfig::default());
        pool.admit_batch(
            (1..=n)
                .map(|i| TradeEvent::new(EntityId(i), Side::Buy, 100.0 * i as f64, 1.0))
                .collect(),
        );
        pool
    }

    #[test]
    fn test_single_step_kinematics() {
        let mut pool = pool_with(1);
        let before = pool.get(EntityId(1)).unwrap().clone();
        let stepper = PhysicsStepper::default();

        stepper.step_all(&mut pool, 0.5);

        let after = pool.get(EntityId(1)).unwrap();
        // v.y: -3 - 3 * 0.5 = -4.5; y: 15 + (-4.5 * 0.5) = 12.75
        assert_relative_eq!(after.velocity().y, -4.5);
        assert_relative_eq!(after.position().y, 12.75);
        assert_relative_eq!(after.position().x, before.position().x + before.velocity().x * 0.5);
        assert_relative_eq!(after.position().z, before.position().z + before.velocity().z * 0.5);
        assert_relative_eq!(after.velocity().x, before.velocity().x);
        assert_relative_eq!(after.rotation_phase(), 0.15);
        assert_eq!(after.steps(), 1);
    }

    #[test]
    fn test_zero_delta_is_noop() {
        let mut pool = pool_with(3);
        let before = pool.snapshot();

        PhysicsStepper::default().step_all(&mut pool, 0.0);

        assert_eq!(pool.snapshot(), before);
        assert!(pool.entities().all(|e| e.steps() == 0));
    }

    #[test]
    fn test_negative_and_nan_delta_ignored() {
        let mut pool = pool_with(2);
        let before = pool.snapshot();
        let stepper = PhysicsStepper::default();

        stepper.step_all(&mut pool, -1.0);
        stepper.step_all(&mut pool, f64::NAN);
        stepper.step_all(&mut pool, f64::INFINITY);

        assert_eq!(pool.snapshot(), before);
    }

    #[test]
    fn test_large_delta_stays_finite() {
        let mut pool = pool_with(1);
        PhysicsStepper::default().step_all(&mut pool, 3_600.0);

        let e = pool.get(EntityId(1)).unwrap();
        assert!(e.position().iter().all(|c| c.is_finite()));
        assert!(e.position().y < -20.0);
    }

    #[test]
    fn test_rotation_phase_wraps() {
        let mut pool = pool_with(1);
        let stepper = PhysicsStepper::new(&PhysicsConfig {
            gravity: 0.0,
            spin_rate: 1.0,
        });

        for _ in 0..10 {
            stepper.step_all(&mut pool, 1.0);
        }

        let phase = pool.get(EntityId(1)).unwrap().rotation_phase();
        assert!((0.0..TAU).contains(&phase));
        assert_relative_eq!(phase, 10.0 - TAU, epsilon = 1e-12);
    }

    #[test]
    fn test_stepping_after_reordered_admission_matches() {
        let events: Vec<TradeEvent> = (1..=5)
            .map(|i| TradeEvent::new(EntityId(i), Side::Sell, 10.0 * i as f64, 2.0))
            .collect();
        let mut reversed = events.clone();
        reversed.reverse();

        let mut a = EntityPool::new(SpawnConfig::default());
        let mut b = EntityPool::new(SpawnConfig::default());
        a.admit_batch(events);
        b.admit_batch(reversed);

        let stepper = PhysicsStepper::default();
        for _ in 0..30 {
            stepper.step_all(&mut a, 1.0 / 60.0);
            stepper.step_all(&mut b, 1.0 / 60.0);
        }

        assert_eq!(a.snapshot(), b.snapshot());
    }

    proptest! {
        #[test]
        fn prop_vertical_update_exact(dt in 1e-4f64..5.0, gravity in 0.0f64..20.0) {
            let mut pool = pool_with(4);
            let before: Vec<_> = pool.entities().map(|e| (e.id(), e.position().y, e.velocity().y)).collect();
            let stepper = PhysicsStepper::new(&PhysicsConfig { gravity, spin_rate: 0.3 });

            stepper.step_all(&mut pool, dt);

            for (id, y0, vy0) in before {
                let e = pool.get(id).unwrap();
                let vy1 = vy0 - gravity * dt;
                prop_assert_eq!(e.velocity().y, vy1);
                prop_assert_eq!(e.position().y, y0 + vy1 * dt);
            }
        }
    }
}
