//! Read-only view of the plant for presentation collaborators.
//!
//! Snapshots are plain data: they own copies of everything they show and
//! serialize to JSON for any front end that wants it.

use crate::state::{ProcessState, TankId, TankRole, ValveId};
use chrono::{DateTime, Utc};
use mixer_common::alarm::{Alarm, AlarmStatus};
use mixer_common::time::elapsed_since;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime shown before the first Start.
pub const RUNTIME_ZERO: &str = "00:00:00";

/// Format an elapsed duration as `HH:MM:SS`. Hours keep counting past 99.
#[must_use]
pub fn format_runtime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Runtime display for a batch started at `started_at`, read at `now`.
#[must_use]
pub fn runtime_display(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match started_at {
        Some(start) => format_runtime(elapsed_since(start, now)),
        None => RUNTIME_ZERO.to_string(),
    }
}

/// One tank as displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankView {
    /// Identifier.
    pub id: TankId,
    /// Contents.
    pub role: TankRole,
    /// Current level.
    pub level: f64,
    /// Capacity.
    pub max_level: f64,
}

/// One valve as displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValveView {
    /// Identifier.
    pub id: ValveId,
    /// True when open.
    pub open: bool,
}

/// Settled post-tick or post-command state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    /// Tanks A, B, C.
    pub tanks: Vec<TankView>,
    /// Valves A, B.
    pub valves: Vec<ValveView>,
    /// Agitator motor state.
    pub agitator_running: bool,
    /// Batch running flag.
    pub running: bool,
    /// Time of the first Start since the last Reset.
    pub started_at: Option<DateTime<Utc>>,
    /// Elapsed runtime as `HH:MM:SS`.
    pub runtime: String,
    /// Mixture temperature in °C.
    pub temperature: f64,
    /// Flow-rate display value.
    pub flow_rate: f64,
    /// True when liquid moved on the last tick.
    pub flowing: bool,
    /// Alarm journal, newest first.
    pub alarms: Vec<Alarm>,
    /// Annunciator summary.
    pub alarm_status: AlarmStatus,
    /// Ticks since the last reset.
    pub tick_count: u64,
    /// Wall time the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

impl ProcessSnapshot {
    /// Capture `state`.
    #[must_use]
    pub fn capture(
        state: &ProcessState,
        flowing: bool,
        tick_count: u64,
        taken_at: DateTime<Utc>,
    ) -> Self {
        let run = state.run();
        Self {
            tanks: state
                .tanks()
                .iter()
                .map(|t| TankView {
                    id: t.id(),
                    role: t.role(),
                    level: t.level(),
                    max_level: t.max_level(),
                })
                .collect(),
            valves: state
                .valves()
                .iter()
                .map(|v| ValveView {
                    id: v.id(),
                    open: v.is_open(),
                })
                .collect(),
            agitator_running: state.agitator().is_running(),
            running: run.is_running(),
            started_at: run.started_at(),
            runtime: runtime_display(run.started_at(), taken_at),
            temperature: run.temperature(),
            flow_rate: run.flow_rate(),
            flowing,
            alarms: state.alarms().to_vec(),
            alarm_status: state.alarms().status(),
            tick_count,
            taken_at,
        }
    }

    /// Level of the named tank.
    #[must_use]
    pub fn level(&self, id: TankId) -> f64 {
        self.tanks
            .iter()
            .find(|t| t.id == id)
            .map_or(0.0, |t| t.level)
    }

    /// True when the named valve is open.
    #[must_use]
    pub fn valve_open(&self, id: ValveId) -> bool {
        self.valves.iter().any(|v| v.id == id && v.open)
    }
}
