//! Tradefall Core - Market Trades as Falling Particles
//!
//! Turns a live trade feed into a simulated scene:
//! 1. **Decoding**: raw feed messages become validated `TradeEvent`s
//! 2. **Admission**: events buffer in a shared queue and enter the pool in batches
//! 3. **Physics & Expiry**: particles fall under gravity and are swept below the floor
//!
//! The feed listener and the simulation driver run as separate tasks and share
//! only the [`AdmissionQueue`]. Time and task spawning come from a
//! [`tradefall_env::TradefallContext`], so the whole pipeline runs under a
//! virtual clock in tests.

pub mod config;
pub mod error;
pub mod entity;
pub mod decoder;
pub mod admission;
pub mod pool;
pub mod physics;
pub mod lifecycle;
pub mod metrics;
pub mod shutdown;
pub mod simulation;
pub mod feed;

// Re-export key types for convenience
pub use admission::{AdmissionQueue, Batch};
pub use config::{
    ClockConfig, DecoderConfig, FeedConfig, LifecycleConfig, PhysicsConfig, SizeMapping,
    SpawnConfig, TradefallConfig,
};
pub use decoder::{Decoded, EventDecoder};
pub use entity::{Entity, EntityId, EntitySnapshot, IdGenerator, Side, TradeEvent};
pub use error::{ConfigError, DecodeError, FeedError, SimulationError};
pub use feed::{BackoffPolicy, FeedListener, Subscription};
pub use lifecycle::LifecycleMonitor;
pub use metrics::{FeedStats, FeedStatsSnapshot, SimulationStats};
pub use physics::PhysicsStepper;
pub use pool::EntityPool;
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use simulation::{
    ClockHandle, FrameSnapshot, PumpReport, Simulation, SimulationClock, SnapshotReceiver,
};
