//! Operator command handling.
//!
//! Every command is validated before it touches the state and is followed
//! by an interlock pass, so an unsafe operator request is corrected before
//! the call returns.

use crate::interlock::InterlockEngine;
use crate::state::{ProcessState, ValveId};
use chrono::{DateTime, Utc};
use mixer_common::alarm::{Alarm, Severity};
use mixer_common::error::MixerError;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Alarm text when a batch starts.
pub const BATCH_STARTED_ALARM: &str = "Batch process started";

/// Alarm text for the emergency stop.
pub const EMERGENCY_STOP_ALARM: &str = "EMERGENCY STOP activated!";

/// Operator commands accepted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open a feed valve.
    OpenValve(ValveId),
    /// Close a feed valve.
    CloseValve(ValveId),
    /// Flip a feed valve.
    ToggleValve(ValveId),
    /// Start or stop the agitator.
    ToggleAgitator,
    /// Start the batch.
    Start,
    /// Emergency stop.
    Stop,
    /// Restore initial conditions.
    Reset,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenValve(id) => write!(f, "OPEN_VALVE({id})"),
            Self::CloseValve(id) => write!(f, "CLOSE_VALVE({id})"),
            Self::ToggleValve(id) => write!(f, "TOGGLE_VALVE({id})"),
            Self::ToggleAgitator => write!(f, "TOGGLE_AGITATOR"),
            Self::Start => write!(f, "START"),
            Self::Stop => write!(f, "STOP"),
            Self::Reset => write!(f, "RESET"),
        }
    }
}

/// Successful command result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutcome {
    /// False when the command was an accepted no-op (e.g. a repeated Start).
    pub changed: bool,
    /// Alarms recorded while applying the command and its interlock pass.
    pub alarms: Vec<Alarm>,
}

/// Rejected command.
///
/// Carries the alarms recorded while rejecting, so the caller sees the
/// advisory without re-reading the journal.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{source}")]
pub struct CommandError {
    /// Why the command was refused.
    pub source: MixerError,
    /// Alarms recorded during rejection.
    pub alarms: Vec<Alarm>,
}

/// Result type for operator commands.
pub type CommandResult = Result<CommandOutcome, CommandError>;

/// Applies operator commands to [`ProcessState`].
#[derive(Debug, Clone, Default)]
pub struct CommandHandler {
    interlock: InterlockEngine,
}

impl CommandHandler {
    /// Create a handler that consults `interlock` for preconditions and
    /// post-command corrections.
    #[must_use]
    pub fn new(interlock: InterlockEngine) -> Self {
        Self { interlock }
    }

    /// Dispatch a [`Command`].
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] if the command's precondition fails.
    pub fn execute(
        &self,
        command: Command,
        state: &mut ProcessState,
        now: DateTime<Utc>,
    ) -> CommandResult {
        debug!(%command, "Dispatching operator command");
        match command {
            Command::OpenValve(id) => Ok(self.set_valve(state, id, true, now)),
            Command::CloseValve(id) => Ok(self.set_valve(state, id, false, now)),
            Command::ToggleValve(id) => {
                let open = !state.valve(id).is_open();
                Ok(self.set_valve(state, id, open, now))
            }
            Command::ToggleAgitator => self.toggle_agitator(state, now),
            Command::Start => Ok(self.start_process(state, now)),
            Command::Stop => Ok(self.stop_process(state, now)),
            Command::Reset => Ok(self.reset_process(state, now)),
        }
    }

    /// Open a feed valve. No precondition: an unsafe open is corrected by
    /// the interlock pass that follows.
    pub fn open_valve(
        &self,
        state: &mut ProcessState,
        id: ValveId,
        now: DateTime<Utc>,
    ) -> CommandOutcome {
        self.set_valve(state, id, true, now)
    }

    /// Close a feed valve.
    pub fn close_valve(
        &self,
        state: &mut ProcessState,
        id: ValveId,
        now: DateTime<Utc>,
    ) -> CommandOutcome {
        self.set_valve(state, id, false, now)
    }

    fn set_valve(
        &self,
        state: &mut ProcessState,
        id: ValveId,
        open: bool,
        now: DateTime<Utc>,
    ) -> CommandOutcome {
        let changed = state.valve(id).is_open() != open;
        state.set_valve(id, open);
        debug!(valve = %id, open, "Valve set by operator");
        self.settle(state, changed, Vec::new(), now)
    }

    /// Start or stop the agitator.
    ///
    /// Starting requires the mixer to hold at least the start threshold;
    /// otherwise a warning is journalled and the command is refused with
    /// the agitator left off. Stopping is unconditional.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] wrapping [`MixerError::PreconditionViolation`]
    /// when the mixer level is too low to start.
    pub fn toggle_agitator(&self, state: &mut ProcessState, now: DateTime<Utc>) -> CommandResult {
        let running = state.agitator().is_running();

        if !running {
            if let Err(source) = self.interlock.permit_agitator_start(state) {
                warn!(mixer_level = state.mixer_level(), "Agitator start refused");
                let alarms = state
                    .alarms_mut()
                    .add(self.interlock.start_refused_alarm(), Severity::Warning, now)
                    .into_iter()
                    .collect();
                return Err(CommandError { source, alarms });
            }
        }

        state.set_agitator(!running);
        info!(running = !running, "Agitator toggled");
        Ok(self.settle(state, true, Vec::new(), now))
    }

    /// Start the batch: record the start time and open both valves.
    /// A repeated Start while running is an accepted no-op.
    pub fn start_process(&self, state: &mut ProcessState, now: DateTime<Utc>) -> CommandOutcome {
        if state.run().is_running() {
            debug!("Start ignored, batch already running");
            return CommandOutcome::default();
        }

        let run = state.run_mut();
        run.set_running(true);
        run.set_started_at(Some(now));
        for id in ValveId::ALL {
            state.set_valve(id, true);
        }
        info!(started_at = %now, "Batch process started");

        let alarms = state
            .alarms_mut()
            .add(BATCH_STARTED_ALARM, Severity::Info, now)
            .into_iter()
            .collect();
        self.settle(state, true, alarms, now)
    }

    /// Emergency stop: close both valves, stop the agitator, end the batch.
    /// Always journalled as critical, even when already stopped.
    pub fn stop_process(&self, state: &mut ProcessState, now: DateTime<Utc>) -> CommandOutcome {
        let was_active = state.run().is_running()
            || state.any_valve_open()
            || state.agitator().is_running();

        state.close_all_valves();
        state.set_agitator(false);
        state.run_mut().set_running(false);
        warn!(was_active, "Emergency stop activated");

        let alarms = state
            .alarms_mut()
            .add(EMERGENCY_STOP_ALARM, Severity::Critical, now)
            .into_iter()
            .collect();
        self.settle(state, was_active, alarms, now)
    }

    /// Restore the reference initial condition and clear the journal.
    pub fn reset_process(&self, state: &mut ProcessState, now: DateTime<Utc>) -> CommandOutcome {
        state.reset();
        info!("Process reset to initial conditions");
        self.settle(state, true, Vec::new(), now)
    }

    /// Post-command interlock pass.
    fn settle(
        &self,
        state: &mut ProcessState,
        changed: bool,
        mut alarms: Vec<Alarm>,
        now: DateTime<Utc>,
    ) -> CommandOutcome {
        alarms.extend(self.interlock.check(state, now));
        CommandOutcome { changed, alarms }
    }
}
