//! Discrete-time process stepper.
//!
//! One call to [`SimulationStepper::tick`] advances the plant by one
//! quantum:
//! 1. Transfer feed through each open valve into the mixer
//! 2. Clamp the mixer to capacity
//! 3. Update the flow-rate display value
//! 4. Advance the temperature model
//! 5. Run the interlock engine
//!
//! The tick runs to completion on a borrowed `&mut ProcessState`, so no
//! observer can see a partially applied step.

use crate::interlock::{InterlockAction, InterlockEngine};
use crate::noise::NoiseSource;
use crate::state::{ProcessState, TankId, ValveId};
use chrono::{DateTime, Utc};
use mixer_common::alarm::Alarm;
use mixer_common::config::{FlowConfig, SimulationConfig, TemperatureConfig};
use tracing::trace;

/// Outcome of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Amount drained through valve A and valve B.
    pub transferred: [f64; 2],
    /// Whether any liquid moved this tick.
    pub flow_occurred: bool,
    /// Amount discarded by the mixer capacity clamp.
    pub overflow_clamped: f64,
    /// Interlock corrections applied after the physics step.
    pub interlock_actions: Vec<InterlockAction>,
    /// Alarms recorded during the tick.
    pub alarms: Vec<Alarm>,
}

impl TickReport {
    /// Total amount that left the feed tanks.
    #[must_use]
    pub fn total_transferred(&self) -> f64 {
        self.transferred.iter().sum()
    }
}

/// Advances [`ProcessState`] by one tick.
pub struct SimulationStepper {
    flow: FlowConfig,
    temperature: TemperatureConfig,
    interlock: InterlockEngine,
    noise: Box<dyn NoiseSource>,
}

impl std::fmt::Debug for SimulationStepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationStepper")
            .field("flow", &self.flow)
            .field("temperature", &self.temperature)
            .field("interlock", &self.interlock)
            .finish_non_exhaustive()
    }
}

impl SimulationStepper {
    /// Create a stepper from the simulation configuration and a noise source.
    pub fn new(config: &SimulationConfig, noise: Box<dyn NoiseSource>) -> Self {
        Self {
            flow: config.flow.clone(),
            temperature: config.temperature.clone(),
            interlock: InterlockEngine::new(config.interlock.clone()),
            noise,
        }
    }

    /// Interlock engine used after each tick.
    #[must_use]
    pub fn interlock(&self) -> &InterlockEngine {
        &self.interlock
    }

    /// Advance `state` by one tick at wall time `now`.
    pub fn tick(&mut self, state: &mut ProcessState, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        // 1. Feed transfer. Each valve reads only its own source and writes
        // only the mixer, so order does not matter.
        let mut inflow = 0.0;
        for (slot, valve) in ValveId::ALL.into_iter().enumerate() {
            let source = valve.source();
            let available = state.level(source);
            if state.valve(valve).is_open() && available > 0.0 {
                let amount = self.flow.rate_per_tick.min(available);
                state.tank_mut(source).set_level(available - amount);
                inflow += amount;
                report.transferred[slot] = amount;
                report.flow_occurred = true;
            }
        }

        // 2. Capacity clamp
        let mixer = state.tank(TankId::C);
        let target = mixer.level() + inflow;
        report.overflow_clamped = (target - mixer.max_level()).max(0.0);
        state.tank_mut(TankId::C).set_level(target);

        // 3. Flow display
        let flow_rate = if report.flow_occurred {
            self.flow.rate_per_tick * self.flow.display_factor
        } else {
            0.0
        };
        state.run_mut().set_flow_rate(flow_rate);

        // 4. Temperature
        let t = &self.temperature;
        let mut temperature = state.run().temperature();
        if state.agitator().is_running() {
            temperature += (self.noise.next_unit() - t.agitation_bias) * t.agitation_gain;
        } else {
            temperature += (t.ambient - temperature) * t.cooling_rate;
        }
        state
            .run_mut()
            .set_temperature(temperature.clamp(t.min, t.max));

        // 5. Interlocks
        let (actions, alarms) = self.interlock.check_with_actions(state, now);
        report.interlock_actions = actions;
        report.alarms = alarms;

        trace!(
            level_a = state.level(TankId::A),
            level_b = state.level(TankId::B),
            level_c = state.level(TankId::C),
            temperature = state.run().temperature(),
            flow_rate,
            "Tick complete"
        );

        report
    }
}
