//! Shared handle over the running plant.
//!
//! [`ProcessController`] serializes every tick and operator command on a
//! single mutex. Each operation runs to completion under the lock and
//! publishes a settled [`ProcessSnapshot`] before releasing it, so readers
//! never observe a half-applied step.

use crate::commands::{Command, CommandHandler, CommandOutcome, CommandResult};
use crate::history::{TrendHistory, TrendSample};
use crate::noise::{NoiseSource, SeededNoise};
use crate::scheduler::{PeriodicScheduler, TaskHandle};
use crate::snapshot::{runtime_display, ProcessSnapshot};
use crate::state::{ProcessState, ValveId};
use crate::stepper::{SimulationStepper, TickReport};
use mixer_common::alarm::AlarmLog;
use mixer_common::config::{ConfigError, SimulationConfig};
use mixer_common::error::MixerResult;
use mixer_common::time::{Clock, SystemClock};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Everything guarded by the controller lock.
struct Plant {
    config: SimulationConfig,
    state: ProcessState,
    stepper: SimulationStepper,
    commands: CommandHandler,
    history: TrendHistory,
    clock: Arc<dyn Clock>,
    tick_count: u64,
    flowing: bool,
    subscribers: Vec<Sender<ProcessSnapshot>>,
}

impl Plant {
    fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot::capture(&self.state, self.flowing, self.tick_count, self.clock.now())
    }

    /// Send the settled state to every live subscriber, dropping the rest.
    fn publish(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        let before = self.subscribers.len();
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        let pruned = before - self.subscribers.len();
        if pruned > 0 {
            debug!(pruned, "Pruned disconnected snapshot subscribers");
        }
    }

    fn after_command(&mut self, command: Command) {
        if command == Command::Reset {
            self.history.clear();
            self.tick_count = 0;
            self.flowing = false;
        }
        self.publish();
    }
}

/// Cloneable handle to a running plant.
#[derive(Clone)]
pub struct ProcessController {
    plant: Arc<Mutex<Plant>>,
}

impl std::fmt::Debug for ProcessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plant = self.lock();
        f.debug_struct("ProcessController")
            .field("tick_count", &plant.tick_count)
            .field("state", &plant.state)
            .finish_non_exhaustive()
    }
}

impl ProcessController {
    /// Start building a controller.
    #[must_use]
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::default()
    }

    fn lock(&self) -> MutexGuard<'_, Plant> {
        self.plant.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the plant by one tick and record a trend sample.
    pub fn tick(&self) -> TickReport {
        let mut guard = self.lock();
        let plant = &mut *guard;
        let now = plant.clock.now();

        let report = plant.stepper.tick(&mut plant.state, now);
        plant.tick_count += 1;
        plant.flowing = report.flow_occurred;
        plant.history.record(TrendSample::capture(&plant.state, now));
        plant.publish();

        report
    }

    /// Apply an operator command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`](crate::commands::CommandError) when the
    /// command's precondition fails.
    pub fn execute(&self, command: Command) -> CommandResult {
        let mut guard = self.lock();
        let plant = &mut *guard;
        let now = plant.clock.now();

        let result = plant.commands.execute(command, &mut plant.state, now);
        plant.after_command(command);
        result
    }

    fn infallible(&self, command: Command) -> CommandOutcome {
        // Only ToggleAgitator can be refused
        self.execute(command).unwrap_or_else(|e| CommandOutcome {
            changed: false,
            alarms: e.alarms,
        })
    }

    /// Open a feed valve.
    pub fn open_valve(&self, id: ValveId) -> CommandOutcome {
        self.infallible(Command::OpenValve(id))
    }

    /// Close a feed valve.
    pub fn close_valve(&self, id: ValveId) -> CommandOutcome {
        self.infallible(Command::CloseValve(id))
    }

    /// Flip a feed valve.
    pub fn toggle_valve(&self, id: ValveId) -> CommandOutcome {
        self.infallible(Command::ToggleValve(id))
    }

    /// Start or stop the agitator.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`](crate::commands::CommandError) when the
    /// mixer level is too low to start.
    pub fn toggle_agitator(&self) -> CommandResult {
        self.execute(Command::ToggleAgitator)
    }

    /// Start the batch.
    pub fn start_process(&self) -> CommandOutcome {
        self.infallible(Command::Start)
    }

    /// Emergency stop.
    pub fn stop_process(&self) -> CommandOutcome {
        self.infallible(Command::Stop)
    }

    /// Restore initial conditions and clear alarms, trend history and the
    /// tick counter.
    pub fn reset_process(&self) -> CommandOutcome {
        self.infallible(Command::Reset)
    }

    /// Settled view of the plant.
    #[must_use]
    pub fn snapshot(&self) -> ProcessSnapshot {
        self.lock().snapshot()
    }

    /// Read the state under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&ProcessState) -> R) -> R {
        f(&self.lock().state)
    }

    /// Trend samples, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<TrendSample> {
        self.lock().history.to_vec()
    }

    /// Ticks since the last reset.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.lock().tick_count
    }

    /// Configuration the controller was built with.
    #[must_use]
    pub fn config(&self) -> SimulationConfig {
        self.lock().config.clone()
    }

    /// Receive a snapshot after every tick and command.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<ProcessSnapshot> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Push a snapshot with the current runtime to subscribers and return
    /// the display. Driven by the runtime-refresh task.
    pub fn refresh_runtime(&self) -> String {
        let mut plant = self.lock();
        plant.publish();
        runtime_display(plant.state.run().started_at(), plant.clock.now())
    }

    /// Elapsed batch runtime as `HH:MM:SS`, read from the clock.
    #[must_use]
    pub fn runtime(&self) -> String {
        let plant = self.lock();
        runtime_display(plant.state.run().started_at(), plant.clock.now())
    }

    /// Check the level, temperature and journal bounds.
    ///
    /// # Errors
    ///
    /// Returns [`MixerError::Validation`](mixer_common::error::MixerError::Validation)
    /// describing the first violation.
    pub fn check_bounds(&self) -> MixerResult<()> {
        let plant = self.lock();
        let t = &plant.config.temperature;
        plant.state.check_bounds(t.min, t.max)
    }

    /// Register the tick and runtime-refresh tasks with `scheduler`.
    ///
    /// Returns the handles in that order.
    ///
    /// # Errors
    ///
    /// Returns the scheduler's error if either task cannot be registered.
    /// A tick task registered before the failure is cancelled.
    pub fn attach(&self, scheduler: &mut dyn PeriodicScheduler) -> MixerResult<[TaskHandle; 2]> {
        let config = self.config();

        let ticker = self.clone();
        let tick = scheduler.schedule_periodic(
            config.tick_period,
            Box::new(move || {
                ticker.tick();
            }),
        )?;

        let refresher = self.clone();
        let refresh = match scheduler.schedule_periodic(
            config.runtime_refresh,
            Box::new(move || {
                refresher.refresh_runtime();
            }),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                scheduler.cancel(tick);
                return Err(e);
            }
        };

        info!(
            tick_ms = config.tick_period.as_millis() as u64,
            refresh_ms = config.runtime_refresh.as_millis() as u64,
            "Controller attached to scheduler"
        );
        Ok([tick, refresh])
    }
}

/// Builder for [`ProcessController`].
#[derive(Default)]
pub struct ControllerBuilder {
    config: SimulationConfig,
    state: Option<ProcessState>,
    clock: Option<Arc<dyn Clock>>,
    noise: Option<Box<dyn NoiseSource>>,
}

impl ControllerBuilder {
    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Start from `state` instead of the reference initial condition.
    ///
    /// The configured ambient temperature and journal sizing replace the
    /// state's own. Its current temperature must lie within the configured
    /// band.
    #[must_use]
    pub fn state(mut self, state: ProcessState) -> Self {
        self.state = Some(state);
        self
    }

    /// Read wall time from `clock`. Defaults to [`SystemClock`].
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Draw temperature noise from `noise`. Defaults to a [`SeededNoise`]
    /// seeded from the config.
    #[must_use]
    pub fn noise(mut self, noise: Box<dyn NoiseSource>) -> Self {
        self.noise = Some(noise);
        self
    }

    /// Build the controller.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration fails validation
    /// or the starting state lies outside its bounds.
    pub fn build(self) -> Result<ProcessController, ConfigError> {
        let config = self.config;
        config.validate()?;

        let noise = self
            .noise
            .unwrap_or_else(|| Box::new(SeededNoise::from_option(config.seed)));
        let stepper = SimulationStepper::new(&config, noise);
        let commands = CommandHandler::new(stepper.interlock().clone());
        let state = match self.state {
            Some(mut state) => {
                state.configure(
                    config.temperature.ambient,
                    config.alarms.capacity,
                    config.alarms.dedup_window,
                );
                state
            }
            None => ProcessState::with_ambient(
                AlarmLog::new(config.alarms.capacity, config.alarms.dedup_window),
                config.temperature.ambient,
            ),
        };
        state
            .check_bounds(config.temperature.min, config.temperature.max)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        info!(
            tick_ms = config.tick_period.as_millis() as u64,
            seeded = config.seed.is_some(),
            "Process controller created"
        );

        let plant = Plant {
            history: TrendHistory::new(config.history.max_points),
            config,
            state,
            stepper,
            commands,
            clock,
            tick_count: 0,
            flowing: false,
            subscribers: Vec::new(),
        };

        Ok(ProcessController {
            plant: Arc::new(Mutex::new(plant)),
        })
    }
}
