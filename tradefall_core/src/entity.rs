//! Data model: trade events, particles and their identifiers.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a trade event and the particle spawned from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Returns the raw counter value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "particle-{}", self.0)
    }
}

/// Hands out process-unique entity ids.
///
/// Injected into the decoder so tests can replay a fixed id sequence.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocates the next id. Never returns the same value twice.
    pub fn next_id(&self) -> EntityId {
        EntityId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the id the next call to `next_id` will produce.
    pub fn peek(&self) -> EntityId {
        EntityId(self.next.load(Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// A trade is a buy iff the buyer was not the maker.
    pub fn from_buyer_maker(is_buyer_maker: bool) -> Self {
        if is_buyer_maker {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    /// Display color of particles on this side.
    pub fn color_hex(&self) -> &'static str {
        match self {
            Side::Buy => "#00ff00",
            Side::Sell => "#ff0000",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// One decoded trade. Immutable once built; consumed by admission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeEvent {
    id: EntityId,
    side: Side,
    price: f64,
    quantity: f64,
    notional_value: f64,
}

impl TradeEvent {
    /// Builds an event; `notional_value` is `quantity * price`.
    pub fn new(id: EntityId, side: Side, price: f64, quantity: f64) -> Self {
        Self {
            id,
            side,
            price,
            quantity,
            notional_value: quantity * price,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    /// Trade value in quote currency.
    pub fn notional_value(&self) -> f64 {
        self.notional_value
    }
}

/// A live particle. Only [`crate::pool::EntityPool`] creates or destroys these.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) position: Vector3<f64>,
    pub(crate) velocity: Vector3<f64>,
    pub(crate) visual_size: f64,
    pub(crate) side: Side,
    pub(crate) notional_value: f64,
    pub(crate) rotation_phase: f64,
    pub(crate) steps: u64,
}

impl Entity {
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Position [x, y, z]; y is up
    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    pub fn visual_size(&self) -> f64 {
        self.visual_size
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn notional_value(&self) -> f64 {
        self.notional_value
    }

    /// Cosmetic rotation in radians, within [0, 2π)
    pub fn rotation_phase(&self) -> f64 {
        self.rotation_phase
    }

    /// Number of physics updates applied so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Copies the render-facing fields.
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            position: self.position,
            size: self.visual_size,
            side: self.side,
            rotation_phase: self.rotation_phase,
        }
    }
}

/// Point-in-time copy of a particle for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub position: Vector3<f64>,
    pub size: f64,
    pub side: Side,
    pub rotation_phase: f64,
}
