//! JSON exporter for rendered frames.
//!
//! Exports sampled simulation frames as JSON for an external renderer.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tradefall_core::FrameSnapshot;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Frame tick that produced this frame
    pub frame: u64,

    /// Live particles, ordered by id
    pub particles: Vec<ParticleFrame>,

    /// Events (disconnects, stalls, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

/// One particle as drawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleFrame {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub size: f64,
    pub color: String,
    pub rotation: f64,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimFrame {
    /// Converts a published snapshot into an export frame.
    pub fn from_snapshot(snapshot: &FrameSnapshot) -> Self {
        let particles = snapshot
            .entities
            .iter()
            .map(|e| ParticleFrame {
                id: e.id.to_string(),
                x: e.position.x,
                y: e.position.y,
                z: e.position.z,
                size: e.size,
                color: e.side.color_hex().to_string(),
                rotation: e.rotation_phase,
            })
            .collect();

        Self {
            time_sec: snapshot.time_secs,
            frame: snapshot.frame,
            particles,
            events: Vec::new(),
        }
    }

    /// Attaches an event to the frame.
    pub fn with_event(mut self, message: impl Into<String>, level: Option<&str>) -> Self {
        self.events.push(SimEvent {
            message: message.into(),
            level: level.map(str::to_string),
        });
        self
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name (or "live")
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
