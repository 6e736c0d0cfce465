//! Safety interlocks.
//!
//! The engine inspects the process state and forces it back inside the
//! safe envelope. Rules run in fixed priority order and later rules see
//! the corrections of earlier ones within the same pass:
//!
//! 1. Overflow protection: mixer at or above the overflow level with a
//!    feed valve open closes both valves.
//! 2. Dry-run protection: agitator running over a mixer below the dry-run
//!    level is stopped.
//! 3. Low-source advisories: an open valve draining a nearly empty feed
//!    tank raises a warning without changing state.
//!
//! Corrections are final for the pass. They are surfaced through the alarm
//! journal only and never returned as errors.

use crate::state::{ProcessState, TankId, ValveId};
use chrono::{DateTime, Utc};
use mixer_common::alarm::{Alarm, Severity};
use mixer_common::config::InterlockConfig;
use mixer_common::error::{MixerError, MixerResult};
use tracing::warn;

/// Alarm text for the overflow interlock.
pub const OVERFLOW_ALARM: &str = "INTERLOCK: Overflow protection - Valves closed";

/// Alarm text for the dry-run interlock.
pub const DRY_RUN_ALARM: &str = "INTERLOCK: Dry run protection - Agitator stopped";

/// Alarm text for a refused agitator start below `threshold` percent.
#[must_use]
pub fn agitator_start_refused_alarm(threshold: f64) -> String {
    format!("Cannot start agitator: Mixer level too low (<{threshold}%)")
}

/// Advisory text for feed `tank` drained to `threshold` percent.
#[must_use]
pub fn low_level_alarm(tank: TankId, threshold: f64) -> String {
    format!("Tank {tank} level critical (<{threshold}%)")
}

/// Corrective action taken by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterlockAction {
    /// Both feed valves forced closed.
    ValvesClosed,
    /// Agitator forced off.
    AgitatorStopped,
}

/// Interlock rule evaluator.
#[derive(Debug, Clone, Default)]
pub struct InterlockEngine {
    limits: InterlockConfig,
}

impl InterlockEngine {
    /// Create an engine with the given thresholds.
    #[must_use]
    pub fn new(limits: InterlockConfig) -> Self {
        Self { limits }
    }

    /// Thresholds in force.
    #[must_use]
    pub fn limits(&self) -> &InterlockConfig {
        &self.limits
    }

    /// Refused-start alarm text for the configured start level.
    #[must_use]
    pub fn start_refused_alarm(&self) -> String {
        agitator_start_refused_alarm(self.limits.agitator_start_level)
    }

    /// Low-source advisory text for `tank` at the configured level.
    #[must_use]
    pub fn low_source_alarm(&self, tank: TankId) -> String {
        low_level_alarm(tank, self.limits.low_source_level)
    }

    /// Run every rule once against `state`.
    ///
    /// Returns the alarms that were actually recorded in the journal
    /// (dedup-suppressed repeats are not returned). Calling this twice with
    /// no intervening change records nothing the second time.
    pub fn check(&self, state: &mut ProcessState, now: DateTime<Utc>) -> Vec<Alarm> {
        self.check_with_actions(state, now).1
    }

    /// Like [`check`](Self::check) but also reports the corrections applied.
    pub fn check_with_actions(
        &self,
        state: &mut ProcessState,
        now: DateTime<Utc>,
    ) -> (Vec<InterlockAction>, Vec<Alarm>) {
        let mut actions = Vec::new();
        let mut alarms = Vec::new();

        // 1. Overflow protection
        if state.mixer_level() >= self.limits.overflow_level && state.any_valve_open() {
            state.close_all_valves();
            actions.push(InterlockAction::ValvesClosed);
            warn!(
                mixer_level = state.mixer_level(),
                threshold = self.limits.overflow_level,
                "Overflow interlock closed feed valves"
            );
            alarms.extend(state.alarms_mut().add(OVERFLOW_ALARM, Severity::Warning, now));
        }

        // 2. Dry-run protection
        if state.mixer_level() < self.limits.dry_run_level && state.agitator().is_running() {
            state.set_agitator(false);
            actions.push(InterlockAction::AgitatorStopped);
            warn!(
                mixer_level = state.mixer_level(),
                threshold = self.limits.dry_run_level,
                "Dry-run interlock stopped agitator"
            );
            alarms.extend(state.alarms_mut().add(DRY_RUN_ALARM, Severity::Warning, now));
        }

        // 3. Low-source advisories
        for valve in ValveId::ALL {
            let source = valve.source();
            if state.valve(valve).is_open() && state.level(source) <= self.limits.low_source_level
            {
                alarms.extend(
                    state
                        .alarms_mut()
                        .add(self.low_source_alarm(source), Severity::Warning, now),
                );
            }
        }

        (actions, alarms)
    }

    /// Precondition for an operator starting the agitator.
    ///
    /// # Errors
    ///
    /// Returns [`MixerError::PreconditionViolation`] when the mixer holds
    /// less than the start threshold.
    pub fn permit_agitator_start(&self, state: &ProcessState) -> MixerResult<()> {
        if state.mixer_level() < self.limits.agitator_start_level {
            return Err(MixerError::PreconditionViolation(format!(
                "mixer level too low ({:.1} < {:.1})",
                state.mixer_level(),
                self.limits.agitator_start_level
            )));
        }
        Ok(())
    }
}
