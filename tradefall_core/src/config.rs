//! Tunable constants for the pipeline.
//!
//! Every knob lives in a plain struct with a `Default` matching the values the
//! visualisation was tuned with. Hosts may deserialize a [`TradefallConfig`]
//! from JSON; missing fields fall back to their defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for a Tradefall pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TradefallConfig {
    pub decoder: DecoderConfig,
    pub spawn: SpawnConfig,
    pub physics: PhysicsConfig,
    pub lifecycle: LifecycleConfig,
    pub clock: ClockConfig,
    pub feed: FeedConfig,
}

impl TradefallConfig {
    /// Parses a JSON document, filling unspecified fields with defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let size = &self.spawn.size;
        if !(size.min_size > 0.0) {
            return Err(ConfigError::invalid("spawn.size.min_size", "must be positive"));
        }
        if !(size.max_size >= size.min_size) {
            return Err(ConfigError::invalid("spawn.size.max_size", "must be >= min_size"));
        }
        if !(size.log_scale >= 0.0) || !size.base.is_finite() {
            return Err(ConfigError::invalid(
                "spawn.size.log_scale",
                "must be non-negative with a finite base",
            ));
        }
        // Sampling spans [-half, half), so the full width must stay finite
        let half_range = 0.0..=f64::MAX / 2.0;
        if !half_range.contains(&self.spawn.spawn_half_extent) {
            return Err(ConfigError::invalid(
                "spawn.spawn_half_extent",
                "must be non-negative and finite",
            ));
        }
        if !half_range.contains(&self.spawn.horizontal_jitter) {
            return Err(ConfigError::invalid(
                "spawn.horizontal_jitter",
                "must be non-negative and finite",
            ));
        }
        if !self.spawn.spawn_height.is_finite() || !self.spawn.initial_fall_speed.is_finite() {
            return Err(ConfigError::invalid(
                "spawn",
                "spawn_height and initial_fall_speed must be finite",
            ));
        }
        if !(self.spawn.spawn_height > self.lifecycle.floor_threshold) {
            return Err(ConfigError::invalid(
                "spawn.spawn_height",
                "must be above lifecycle.floor_threshold",
            ));
        }
        if !self.physics.gravity.is_finite() || !self.physics.spin_rate.is_finite() {
            return Err(ConfigError::invalid("physics", "gravity and spin_rate must be finite"));
        }
        if self.clock.admission_interval_ms == 0 {
            return Err(ConfigError::invalid("clock.admission_interval_ms", "must be positive"));
        }
        if self.clock.frame_rate_hz == 0 {
            return Err(ConfigError::invalid("clock.frame_rate_hz", "must be positive"));
        }
        if self.decoder.trade_tag.is_empty() {
            return Err(ConfigError::invalid("decoder.trade_tag", "must not be empty"));
        }
        if self.feed.symbol.is_empty() {
            return Err(ConfigError::invalid("feed.symbol", "must not be empty"));
        }
        if !(self.feed.backoff_multiplier >= 1.0) {
            return Err(ConfigError::invalid("feed.backoff_multiplier", "must be >= 1.0"));
        }
        if self.feed.initial_backoff_ms > self.feed.max_backoff_ms {
            return Err(ConfigError::invalid(
                "feed.initial_backoff_ms",
                "must not exceed max_backoff_ms",
            ));
        }
        Ok(())
    }
}

/// Event decoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Event-type tag that marks a trade message
    pub trade_tag: String,

    /// First id handed out by the decoder's id generator
    pub first_id: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            trade_tag: "trade".to_string(),
            first_id: 1,
        }
    }
}

/// Maps a trade's notional value onto a bounded visual size.
///
/// `size = clamp(min_size, max_size, base + log_scale * log10(notional))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeMapping {
    pub min_size: f64,
    pub max_size: f64,
    pub base: f64,
    pub log_scale: f64,
}

impl Default for SizeMapping {
    fn default() -> Self {
        Self {
            min_size: 0.1,
            max_size: 1.5,
            base: 0.1,
            log_scale: 0.2,
        }
    }
}

impl SizeMapping {
    /// Returns the visual size for a notional value.
    ///
    /// Zero, negative and NaN notionals map to `min_size`.
    pub fn size_for(&self, notional_value: f64) -> f64 {
        if !(notional_value > 0.0) {
            return self.min_size;
        }
        let raw = self.base + self.log_scale * notional_value.log10();
        if raw.is_nan() {
            return self.min_size;
        }
        raw.max(self.min_size).min(self.max_size)
    }
}

/// Where and how new particles appear.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Seed for spawn placement randomness
    pub seed: u64,

    /// Half-width of the square spawn region on the x/z plane
    pub spawn_half_extent: f64,

    /// Fixed spawn height (y)
    pub spawn_height: f64,

    /// Initial downward speed
    pub initial_fall_speed: f64,

    /// Max horizontal velocity jitter on x and z
    pub horizontal_jitter: f64,

    /// Notional value to size mapping
    pub size: SizeMapping,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            spawn_half_extent: 10.0,
            spawn_height: 15.0,
            initial_fall_speed: 3.0,
            horizontal_jitter: 1.0,
            size: SizeMapping::default(),
        }
    }
}

/// Integration constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Downward acceleration (units/s^2)
    pub gravity: f64,

    /// Cosmetic rotation rate (rad/s)
    pub spin_rate: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 3.0,
            spin_rate: 0.3,
        }
    }
}

/// Expiry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Entities below this height are removed
    pub floor_threshold: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            floor_threshold: -20.0,
        }
    }
}

/// Cadences of the simulation driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Batched admission period in milliseconds
    pub admission_interval_ms: u64,

    /// Physics frame rate in Hz
    pub frame_rate_hz: u32,

    /// Cap on a single frame delta after a stall (None = uncapped)
    pub max_frame_delta_ms: Option<u64>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            admission_interval_ms: 50,
            frame_rate_hz: 60,
            max_frame_delta_ms: Some(250),
        }
    }
}

impl ClockConfig {
    pub fn admission_interval(&self) -> Duration {
        Duration::from_millis(self.admission_interval_ms.max(1))
    }

    /// Nominal frame period, truncated to whole nanoseconds.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.frame_rate_hz.max(1)))
    }

    /// Offset of frame `index` from the clock origin.
    ///
    /// Derived from the index, never by summing the truncated `frame_interval`.
    pub fn frame_offset(&self, index: u64) -> Duration {
        let hz = u128::from(self.frame_rate_hz.max(1));
        let nanos = u128::from(index) * 1_000_000_000 / hz;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn max_frame_delta(&self) -> Option<Duration> {
        self.max_frame_delta_ms.map(Duration::from_millis)
    }
}

/// Feed connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// WebSocket endpoint of the trade feed
    pub endpoint: String,

    /// Instrument symbol, e.g. "btcusdt"
    pub symbol: String,

    /// Stream channel appended to the symbol, e.g. "trade"
    pub channel: String,

    /// First reconnect delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound on the reconnect delay in milliseconds
    pub max_backoff_ms: u64,

    /// Growth factor between consecutive reconnect delays
    pub backoff_multiplier: f64,

    /// Give up after this many consecutive failed connects (0 = never)
    pub max_consecutive_failures: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://stream.binance.com:9443/ws".to_string(),
            symbol: "btcusdt".to_string(),
            channel: "trade".to_string(),
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            max_consecutive_failures: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TradefallConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = TradefallConfig::from_json(
            r#"{ "physics": { "gravity": 9.81 }, "feed": { "symbol": "ethusdt" } }"#,
        )
        .unwrap();

        assert_relative_eq!(config.physics.gravity, 9.81);
        assert_relative_eq!(config.physics.spin_rate, 0.3);
        assert_eq!(config.feed.symbol, "ethusdt");
        assert_eq!(config.clock.admission_interval_ms, 50);
    }

    #[test]
    fn test_invalid_size_range_rejected() {
        let mut config = TradefallConfig::default();
        config.spawn.size.max_size = 0.05;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "spawn.size.max_size", .. })
        ));
    }

    #[test]
    fn test_unbounded_spawn_ranges_rejected() {
        for half in [f64::INFINITY, f64::NAN, 1e308, -1.0] {
            let mut config = TradefallConfig::default();
            config.spawn.spawn_half_extent = half;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid { field: "spawn.spawn_half_extent", .. })
            ), "half extent {}", half);

            let mut config = TradefallConfig::default();
            config.spawn.horizontal_jitter = half;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid { field: "spawn.horizontal_jitter", .. })
            ), "jitter {}", half);
        }

        let mut config = TradefallConfig::default();
        config.spawn.spawn_half_extent = f64::MAX / 2.0;
        config.spawn.horizontal_jitter = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_spawn_below_floor_rejected() {
        let mut config = TradefallConfig::default();
        config.spawn.spawn_height = -30.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clock_intervals() {
        let clock = ClockConfig::default();
        assert_eq!(clock.admission_interval(), Duration::from_millis(50));
        assert_eq!(clock.frame_interval(), Duration::from_nanos(16_666_666));
        assert_eq!(clock.max_frame_delta(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_frame_offsets_do_not_drift() {
        let clock = ClockConfig::default();
        assert_eq!(clock.frame_offset(0), Duration::ZERO);
        assert_eq!(clock.frame_offset(1), Duration::from_nanos(16_666_666));
        assert_eq!(clock.frame_offset(60), Duration::from_secs(1));
        assert_eq!(clock.frame_offset(60 * 3600), Duration::from_secs(3600));
    }

    #[test]
    fn test_size_mapping_reference_points() {
        let mapping = SizeMapping::default();

        // 0.1 + 0.2 * log10(30000) = 0.1 + 0.2 * 4.4771
        assert_relative_eq!(mapping.size_for(30_000.0), 0.995_424_250_943_932_5, epsilon = 1e-9);
        assert_relative_eq!(mapping.size_for(1.0), 0.1);
        assert_relative_eq!(mapping.size_for(1e12), 1.5);
        assert_relative_eq!(mapping.size_for(1e-6), 0.1);
    }

    #[test]
    fn test_size_mapping_degenerate_inputs() {
        let mapping = SizeMapping::default();

        assert_relative_eq!(mapping.size_for(0.0), 0.1);
        assert_relative_eq!(mapping.size_for(-5.0), 0.1);
        assert_relative_eq!(mapping.size_for(f64::NAN), 0.1);
        assert_relative_eq!(mapping.size_for(f64::INFINITY), 1.5);
    }
}
