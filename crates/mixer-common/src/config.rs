//! Configuration structures for the mixing simulation.
//!
//! Supports TOML deserialization with defaults that reproduce the
//! reference plant: 0.5 units/tick feed, 95/5/10 interlock thresholds,
//! and a five-entry alarm journal with a five-second dedup window.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Period at which the external driver invokes `tick()`.
    #[serde(with = "humantime_serde")]
    pub tick_period: Duration,

    /// Period of the runtime-display refresh task.
    #[serde(with = "humantime_serde")]
    pub runtime_refresh: Duration,

    /// Seed for the temperature noise source. `None` draws from entropy.
    pub seed: Option<u64>,

    /// Feed valve flow parameters.
    pub flow: FlowConfig,

    /// Temperature model parameters.
    pub temperature: TemperatureConfig,

    /// Interlock thresholds.
    pub interlock: InterlockConfig,

    /// Alarm journal sizing.
    pub alarms: AlarmConfig,

    /// Trend history sizing.
    pub history: HistoryConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(100),
            runtime_refresh: Duration::from_secs(1),
            seed: None,
            flow: FlowConfig::default(),
            temperature: TemperatureConfig::default(),
            interlock: InterlockConfig::default(),
            alarms: AlarmConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// Feed valve flow parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Level units moved per open valve per tick.
    pub rate_per_tick: f64,
    /// Multiplier applied to `rate_per_tick` for the flow-rate display value.
    pub display_factor: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            rate_per_tick: 0.5,
            display_factor: 10.0,
        }
    }
}

/// Temperature model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureConfig {
    /// Resting temperature the mixture decays towards, in °C.
    pub ambient: f64,
    /// Lower clamp in °C.
    pub min: f64,
    /// Upper clamp in °C.
    pub max: f64,
    /// Scale of the per-tick random walk while agitating.
    pub agitation_gain: f64,
    /// Noise offset; values below 0.5 bias the walk upwards.
    pub agitation_bias: f64,
    /// Fraction of the gap to ambient closed per idle tick.
    pub cooling_rate: f64,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            ambient: 22.5,
            min: 18.0,
            max: 35.0,
            agitation_gain: 0.3,
            agitation_bias: 0.4,
            cooling_rate: 0.01,
        }
    }
}

/// Interlock and precondition thresholds, in level units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterlockConfig {
    /// Mixer level at or above which both feed valves are forced closed.
    pub overflow_level: f64,
    /// Mixer level below which a running agitator is forced off.
    pub dry_run_level: f64,
    /// Minimum mixer level for an operator to start the agitator.
    pub agitator_start_level: f64,
    /// Source level at or below which an open valve raises an advisory.
    pub low_source_level: f64,
}

impl Default for InterlockConfig {
    fn default() -> Self {
        Self {
            overflow_level: 95.0,
            dry_run_level: 5.0,
            agitator_start_level: 10.0,
            low_source_level: 5.0,
        }
    }
}

/// Alarm journal sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Maximum retained alarms.
    pub capacity: usize,
    /// Identical messages inside this window are suppressed.
    #[serde(with = "humantime_serde")]
    pub dedup_window: Duration,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            capacity: crate::alarm::DEFAULT_ALARM_CAPACITY,
            dedup_window: crate::alarm::DEFAULT_DEDUP_WINDOW,
        }
    }
}

/// Trend history sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of samples kept for trend charts.
    pub max_points: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_points: 50 }
    }
}

impl SimulationConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check that the parameters describe a plant the interlocks can protect.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.tick_period.is_zero() {
            return invalid("tick_period must be non-zero");
        }
        if self.runtime_refresh.is_zero() {
            return invalid("runtime_refresh must be non-zero");
        }
        if !(self.flow.rate_per_tick > 0.0 && self.flow.rate_per_tick.is_finite()) {
            return invalid("flow.rate_per_tick must be positive");
        }
        let t = &self.temperature;
        if !(t.min < t.max) {
            return invalid("temperature.min must be below temperature.max");
        }
        if !(t.min..=t.max).contains(&t.ambient) {
            return invalid("temperature.ambient must lie within [min, max]");
        }
        if !(0.0..=1.0).contains(&t.cooling_rate) {
            return invalid("temperature.cooling_rate must lie within [0, 1]");
        }
        let i = &self.interlock;
        if !(i.dry_run_level < i.overflow_level) {
            return invalid("interlock.dry_run_level must be below interlock.overflow_level");
        }
        if self.alarms.capacity == 0 {
            return invalid("alarms.capacity must be at least 1");
        }
        if self.history.max_points == 0 {
            return invalid("history.max_points must be at least 1");
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Semantically invalid parameter.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
