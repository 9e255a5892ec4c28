//! Feed and clock scenarios for the deterministic harness.

use std::time::Duration;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Moderate, steady trade flow with a little noise
    SteadyStream,

    /// One second of very heavy flow, then a trickle
    Burst,

    /// A short flurry, then silence until every particle has fallen out
    Drought,

    /// Malformed messages, dropped connections and refused reconnects
    FeedChaos,

    /// The process freezes for seconds mid-run
    Stall,
}

/// Shape of a scenario's input.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPlan {
    /// Mean trades per second before `burst_until`
    pub burst_rate: f64,

    /// Window during which `burst_rate` applies
    pub burst_until: Duration,

    /// Mean trades per second afterwards
    pub base_rate: f64,

    pub noise_rate: f64,
    pub malformed_rate: f64,

    /// Drop the connection this often
    pub disconnect_every: Option<Duration>,

    /// Connect attempts refused after each drop
    pub refuse_after_drop: u32,

    /// Freeze the clock at this fraction of the run, for this long
    pub stall: Option<(f64, Duration)>,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyStream,
            ScenarioId::Burst,
            ScenarioId::Drought,
            ScenarioId::FeedChaos,
            ScenarioId::Stall,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyStream => "steady_stream",
            ScenarioId::Burst => "burst",
            ScenarioId::Drought => "drought",
            ScenarioId::FeedChaos => "feed_chaos",
            ScenarioId::Stall => "stall",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyStream => "20 trades/s with 2% skippable noise",
            ScenarioId::Burst => "2000 trades/s for one second, then 5 trades/s",
            ScenarioId::Drought => "50 trades/s for half a second, then nothing; pool must empty",
            ScenarioId::FeedChaos => "10% malformed, drop every 1.5 s, two refused reconnects per drop",
            ScenarioId::Stall => "steady flow with a 3 s clock freeze halfway through",
        }
    }

    /// Input plan for this scenario.
    pub fn plan(&self) -> ScenarioPlan {
        let steady = ScenarioPlan {
            burst_rate: 0.0,
            burst_until: Duration::ZERO,
            base_rate: 20.0,
            noise_rate: 0.02,
            malformed_rate: 0.0,
            disconnect_every: None,
            refuse_after_drop: 0,
            stall: None,
        };

        match self {
            ScenarioId::SteadyStream => steady,
            ScenarioId::Burst => ScenarioPlan {
                burst_rate: 2_000.0,
                burst_until: Duration::from_secs(1),
                base_rate: 5.0,
                ..steady
            },
            ScenarioId::Drought => ScenarioPlan {
                burst_rate: 50.0,
                burst_until: Duration::from_millis(500),
                base_rate: 0.0,
                noise_rate: 0.0,
                ..steady
            },
            ScenarioId::FeedChaos => ScenarioPlan {
                base_rate: 30.0,
                malformed_rate: 0.1,
                noise_rate: 0.05,
                disconnect_every: Some(Duration::from_millis(1_500)),
                refuse_after_drop: 2,
                ..steady
            },
            ScenarioId::Stall => ScenarioPlan {
                stall: Some((0.5, Duration::from_secs(3))),
                ..steady
            },
        }
    }

    /// Minimum run length for the scenario's checks to be meaningful.
    pub fn min_duration(&self) -> Duration {
        match self {
            // Particles need about four seconds to fall from 15 to -20
            ScenarioId::Drought => Duration::from_secs(6),
            ScenarioId::FeedChaos => Duration::from_secs(4),
            _ => Duration::from_secs(1),
        }
    }
}

impl ScenarioPlan {
    /// Mean trade rate at elapsed time `t`.
    pub fn rate_at(&self, t: Duration) -> f64 {
        if t < self.burst_until {
            self.burst_rate
        } else {
            self.base_rate
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_stream" | "steady" => Ok(ScenarioId::SteadyStream),
            "burst" => Ok(ScenarioId::Burst),
            "drought" => Ok(ScenarioId::Drought),
            "feed_chaos" | "chaos" => Ok(ScenarioId::FeedChaos),
            "stall" => Ok(ScenarioId::Stall),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
