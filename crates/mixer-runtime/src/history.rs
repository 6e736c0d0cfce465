//! Trend history for level and temperature charts.
//!
//! A bounded ring of per-tick samples. Presentation code renders it as
//! trend lines; the core only appends after each tick and clears on reset.

use crate::state::{ProcessState, TankId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of trend samples retained.
pub const DEFAULT_HISTORY_POINTS: usize = 50;

/// One trend sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSample {
    /// Wall time of the tick that produced the sample.
    pub timestamp: DateTime<Utc>,
    /// Tank A level.
    pub level_a: f64,
    /// Tank B level.
    pub level_b: f64,
    /// Mixer level.
    pub level_c: f64,
    /// Mixture temperature.
    pub temperature: f64,
    /// Flow-rate display value.
    pub flow_rate: f64,
}

impl TrendSample {
    /// Capture the current state.
    #[must_use]
    pub fn capture(state: &ProcessState, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            level_a: state.level(TankId::A),
            level_b: state.level(TankId::B),
            level_c: state.level(TankId::C),
            temperature: state.run().temperature(),
            flow_rate: state.run().flow_rate(),
        }
    }
}

/// Bounded trend buffer, oldest first.
#[derive(Debug, Clone)]
pub struct TrendHistory {
    samples: VecDeque<TrendSample>,
    max_points: usize,
}

impl Default for TrendHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_POINTS)
    }
}

impl TrendHistory {
    /// Create an empty buffer. A size of zero is raised to one.
    #[must_use]
    pub fn new(max_points: usize) -> Self {
        let max_points = max_points.max(1);
        Self {
            samples: VecDeque::with_capacity(max_points + 1),
            max_points,
        }
    }

    /// Append a sample, dropping the oldest when full.
    pub fn record(&mut self, sample: TrendSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.max_points {
            self.samples.pop_front();
        }
    }

    /// Remove every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of samples held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum samples held.
    #[must_use]
    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Most recent sample.
    #[must_use]
    pub fn latest(&self) -> Option<&TrendSample> {
        self.samples.back()
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TrendSample> {
        self.samples.iter()
    }

    /// Copy of the samples, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<TrendSample> {
        self.samples.iter().cloned().collect()
    }
}
