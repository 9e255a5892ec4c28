//! Tradefall Deterministic Simulation Harness
//!
//! Runs the real Tradefall pipeline against a controlled environment so that
//! every run of a given seed is identical.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual clock that moves only when the harness steps it
//! - **Feed**: a scripted transport with injectable drops and refusals
//! - **Randomness**: trade flow derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (virtual clock)                           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                               │                     │
//! │  ┌────▼─────────┐   AdmissionQueue   ┌▼────────────────┐    │
//! │  │ FeedListener │ ─────────────────► │ SimulationClock │    │
//! │  └────▲─────────┘                    └────────┬────────┘    │
//! │       │ ScriptedTransport                     │ snapshots   │
//! │  ┌────┴──────────────┐               ┌────────▼────────┐    │
//! │  │  TradeGenerator   │               │   SimExport     │    │
//! │  └───────────────────┘               └─────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tradefall_sim::{ScenarioRunner, ScenarioId};
//!
//! let run = ScenarioRunner::new(42).with_duration(5.0).run(ScenarioId::FeedChaos)?;
//! assert!(run.result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod generator;
mod network;
mod runner;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{ParticleFrame, SimEvent, SimExport, SimFrame};
pub use generator::{GeneratedMessage, GeneratorConfig, MessageKind, TradeGenerator};
pub use network::{FeedController, ScriptedTransport};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRun, ScenarioRunner};
pub use scenarios::{ScenarioId, ScenarioPlan};
pub use world::{SimConfig, SimWorld, WorldOutcome};
