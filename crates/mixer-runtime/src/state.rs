//! Authoritative process model for the mixing plant.
//!
//! Two feed tanks (A: pigment, B: base) drain through valves into the
//! mixing tank C. The aggregate is created once with reference defaults
//! and only ever mutated by the stepper, the interlock engine, and the
//! command handler; outside this crate it is read-only.

use chrono::{DateTime, Utc};
use mixer_common::alarm::AlarmLog;
use mixer_common::error::{MixerError, MixerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Capacity of every tank, in level units (percent).
pub const TANK_MAX_LEVEL: f64 = 100.0;

/// Initial level of each feed tank.
pub const FEED_INITIAL_LEVEL: f64 = 100.0;

/// Initial level of the mixing tank.
pub const MIXER_INITIAL_LEVEL: f64 = 0.0;

/// Default resting mixture temperature in °C.
pub const AMBIENT_TEMPERATURE: f64 = 22.5;

/// Tank identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TankId {
    /// Pigment feed tank.
    A,
    /// Base feed tank.
    B,
    /// Mixing tank.
    C,
}

impl TankId {
    /// All tanks in storage order.
    pub const ALL: [TankId; 3] = [TankId::A, TankId::B, TankId::C];

    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
        }
    }
}

impl fmt::Display for TankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}

impl FromStr for TankId {
    type Err = MixerError;

    fn from_str(s: &str) -> MixerResult<Self> {
        match s.trim() {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            "C" | "c" => Ok(Self::C),
            other => Err(MixerError::Validation(format!("unknown tank '{other}'"))),
        }
    }
}

/// Feed valve identifiers. Each valve drains the tank of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValveId {
    /// Valve between tank A and the mixer.
    A,
    /// Valve between tank B and the mixer.
    B,
}

impl ValveId {
    /// All valves in storage order.
    pub const ALL: [ValveId; 2] = [ValveId::A, ValveId::B];

    /// Tank this valve drains.
    #[must_use]
    pub fn source(self) -> TankId {
        match self {
            Self::A => TankId::A,
            Self::B => TankId::B,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl fmt::Display for ValveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

impl FromStr for ValveId {
    type Err = MixerError;

    fn from_str(s: &str) -> MixerResult<Self> {
        match s.trim() {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            other => Err(MixerError::Validation(format!("unknown valve '{other}'"))),
        }
    }
}

/// What a tank holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TankRole {
    /// Colour concentrate.
    Pigment,
    /// Carrier liquid.
    Base,
    /// Blended product.
    Mixed,
}

/// A vessel with a level in `[0, max_level]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tank {
    id: TankId,
    level: f64,
    max_level: f64,
    role: TankRole,
}

impl Tank {
    fn new(id: TankId, level: f64, role: TankRole) -> Self {
        Self {
            id,
            level,
            max_level: TANK_MAX_LEVEL,
            role,
        }
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> TankId {
        self.id
    }

    /// Current level.
    #[must_use]
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Capacity.
    #[must_use]
    pub fn max_level(&self) -> f64 {
        self.max_level
    }

    /// Contents.
    #[must_use]
    pub fn role(&self) -> TankRole {
        self.role
    }

    pub(crate) fn set_level(&mut self, level: f64) {
        self.level = level.clamp(0.0, self.max_level);
    }
}

/// Feed valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valve {
    id: ValveId,
    open: bool,
}

impl Valve {
    /// Identifier.
    #[must_use]
    pub fn id(&self) -> ValveId {
        self.id
    }

    /// True when liquid may pass.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// Mixer agitator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agitator {
    running: bool,
}

impl Agitator {
    /// True when the agitator motor is on.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Batch run bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRun {
    running: bool,
    started_at: Option<DateTime<Utc>>,
    temperature: f64,
    flow_rate: f64,
}

impl Default for ProcessRun {
    fn default() -> Self {
        Self {
            running: false,
            started_at: None,
            temperature: AMBIENT_TEMPERATURE,
            flow_rate: 0.0,
        }
    }
}

impl ProcessRun {
    /// True between Start and Stop/Reset.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Set by the first Start after a Reset, cleared only by Reset.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Mixture temperature in °C.
    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Flow-rate display value from the last tick.
    #[must_use]
    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }
}

/// Aggregate root: three tanks, two valves, the agitator, the run record,
/// and the alarm journal.
#[derive(Debug, Clone)]
pub struct ProcessState {
    tanks: [Tank; 3],
    valves: [Valve; 2],
    agitator: Agitator,
    run: ProcessRun,
    alarms: AlarmLog,
    /// Temperature restored on construction and reset.
    ambient: f64,
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new(AlarmLog::default())
    }
}

impl ProcessState {
    /// Create the plant in its reference initial condition with the given
    /// (emptied) alarm journal.
    #[must_use]
    pub fn new(alarms: AlarmLog) -> Self {
        Self::with_ambient(alarms, AMBIENT_TEMPERATURE)
    }

    /// Like [`new`](Self::new), but the mixture rests at `ambient` instead
    /// of [`AMBIENT_TEMPERATURE`], both now and after every reset.
    #[must_use]
    pub fn with_ambient(mut alarms: AlarmLog, ambient: f64) -> Self {
        alarms.clear();
        Self {
            tanks: [
                Tank::new(TankId::A, FEED_INITIAL_LEVEL, TankRole::Pigment),
                Tank::new(TankId::B, FEED_INITIAL_LEVEL, TankRole::Base),
                Tank::new(TankId::C, MIXER_INITIAL_LEVEL, TankRole::Mixed),
            ],
            valves: [
                Valve {
                    id: ValveId::A,
                    open: false,
                },
                Valve {
                    id: ValveId::B,
                    open: false,
                },
            ],
            agitator: Agitator::default(),
            run: ProcessRun {
                temperature: ambient,
                ..ProcessRun::default()
            },
            alarms,
            ambient,
        }
    }

    /// Start building a non-default initial condition.
    #[must_use]
    pub fn builder() -> ProcessStateBuilder {
        ProcessStateBuilder::default()
    }

    /// Tank by identifier.
    #[must_use]
    pub fn tank(&self, id: TankId) -> &Tank {
        &self.tanks[id.index()]
    }

    /// All tanks, A, B, C.
    #[must_use]
    pub fn tanks(&self) -> &[Tank; 3] {
        &self.tanks
    }

    /// Level of the named tank.
    #[must_use]
    pub fn level(&self, id: TankId) -> f64 {
        self.tank(id).level
    }

    /// Mixing tank level.
    #[must_use]
    pub fn mixer_level(&self) -> f64 {
        self.level(TankId::C)
    }

    /// Valve by identifier.
    #[must_use]
    pub fn valve(&self, id: ValveId) -> &Valve {
        &self.valves[id.index()]
    }

    /// Both valves, A, B.
    #[must_use]
    pub fn valves(&self) -> &[Valve; 2] {
        &self.valves
    }

    /// True when either feed valve is open.
    #[must_use]
    pub fn any_valve_open(&self) -> bool {
        self.valves.iter().any(|v| v.open)
    }

    /// Agitator.
    #[must_use]
    pub fn agitator(&self) -> &Agitator {
        &self.agitator
    }

    /// Run record.
    #[must_use]
    pub fn run(&self) -> &ProcessRun {
        &self.run
    }

    /// Alarm journal.
    #[must_use]
    pub fn alarms(&self) -> &AlarmLog {
        &self.alarms
    }

    /// Resting temperature restored by reset.
    #[must_use]
    pub fn ambient(&self) -> f64 {
        self.ambient
    }

    /// Check the structural invariants that hold after every tick and command:
    /// levels within capacity, temperature within `[t_min, t_max]`, alarm
    /// journal within its capacity.
    ///
    /// # Errors
    ///
    /// Returns [`MixerError::Validation`] describing the first violation.
    pub fn check_bounds(&self, t_min: f64, t_max: f64) -> MixerResult<()> {
        for tank in &self.tanks {
            if !(0.0..=tank.max_level).contains(&tank.level) {
                return Err(MixerError::Validation(format!(
                    "tank {} level {} outside [0, {}]",
                    tank.id, tank.level, tank.max_level
                )));
            }
        }
        if !(t_min..=t_max).contains(&self.run.temperature) {
            return Err(MixerError::Validation(format!(
                "temperature {} outside [{t_min}, {t_max}]",
                self.run.temperature
            )));
        }
        if self.alarms.len() > self.alarms.capacity() {
            return Err(MixerError::Validation(format!(
                "alarm journal holds {} entries, capacity {}",
                self.alarms.len(),
                self.alarms.capacity()
            )));
        }
        Ok(())
    }

    pub(crate) fn tank_mut(&mut self, id: TankId) -> &mut Tank {
        &mut self.tanks[id.index()]
    }

    pub(crate) fn set_valve(&mut self, id: ValveId, open: bool) {
        self.valves[id.index()].open = open;
    }

    pub(crate) fn close_all_valves(&mut self) {
        for valve in &mut self.valves {
            valve.open = false;
        }
    }

    pub(crate) fn set_agitator(&mut self, running: bool) {
        self.agitator.running = running;
    }

    pub(crate) fn run_mut(&mut self) -> &mut ProcessRun {
        &mut self.run
    }

    pub(crate) fn alarms_mut(&mut self) -> &mut AlarmLog {
        &mut self.alarms
    }

    /// Adopt the configured resting temperature and journal sizing. The
    /// current temperature and retained alarms are left alone.
    pub(crate) fn configure(&mut self, ambient: f64, capacity: usize, dedup_window: Duration) {
        self.ambient = ambient;
        self.alarms.resize(capacity, dedup_window);
    }

    /// Restore the initial condition, keeping the ambient and journal sizing.
    pub(crate) fn reset(&mut self) {
        let alarms = std::mem::take(&mut self.alarms);
        *self = Self::with_ambient(alarms, self.ambient);
    }
}

impl ProcessRun {
    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub(crate) fn set_started_at(&mut self, at: Option<DateTime<Utc>>) {
        self.started_at = at;
    }

    pub(crate) fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }

    pub(crate) fn set_flow_rate(&mut self, flow_rate: f64) {
        self.flow_rate = flow_rate;
    }
}

/// Builder for initial conditions other than the reference defaults.
///
/// Used to resume a plant mid-batch or to stage test scenarios. The result
/// may deliberately violate the interlock invariants (e.g. agitator running
/// over a near-empty mixer); the next tick or command corrects it.
#[derive(Debug, Clone, Default)]
pub struct ProcessStateBuilder {
    levels: [Option<f64>; 3],
    open_valves: [bool; 2],
    agitator_running: bool,
    running: bool,
    temperature: Option<f64>,
    ambient: Option<f64>,
    alarms: Option<AlarmLog>,
}

impl ProcessStateBuilder {
    /// Set a tank level.
    #[must_use]
    pub fn level(mut self, id: TankId, level: f64) -> Self {
        self.levels[id.index()] = Some(level);
        self
    }

    /// Open or close a valve.
    #[must_use]
    pub fn valve_open(mut self, id: ValveId, open: bool) -> Self {
        self.open_valves[id.index()] = open;
        self
    }

    /// Set the agitator state.
    #[must_use]
    pub fn agitator_running(mut self, running: bool) -> Self {
        self.agitator_running = running;
        self
    }

    /// Mark the batch as running (without a start timestamp).
    #[must_use]
    pub fn running(mut self, running: bool) -> Self {
        self.running = running;
        self
    }

    /// Set the mixture temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the resting temperature. Also the starting temperature unless
    /// [`temperature`](Self::temperature) is given.
    #[must_use]
    pub fn ambient(mut self, ambient: f64) -> Self {
        self.ambient = Some(ambient);
        self
    }

    /// Use a journal with non-default sizing.
    #[must_use]
    pub fn alarms(mut self, alarms: AlarmLog) -> Self {
        self.alarms = Some(alarms);
        self
    }

    /// Build the state.
    ///
    /// # Errors
    ///
    /// Returns [`MixerError::Validation`] if a level is outside
    /// `[0, TANK_MAX_LEVEL]` or a value is not finite.
    pub fn build(self) -> MixerResult<ProcessState> {
        let ambient = self.ambient.unwrap_or(AMBIENT_TEMPERATURE);
        if !ambient.is_finite() {
            return Err(MixerError::Validation(format!(
                "ambient temperature {ambient} is not finite"
            )));
        }
        let mut state = ProcessState::with_ambient(self.alarms.unwrap_or_default(), ambient);

        for id in TankId::ALL {
            if let Some(level) = self.levels[id.index()] {
                if !level.is_finite() || !(0.0..=TANK_MAX_LEVEL).contains(&level) {
                    return Err(MixerError::Validation(format!(
                        "tank {id} level {level} outside [0, {TANK_MAX_LEVEL}]"
                    )));
                }
                state.tank_mut(id).set_level(level);
            }
        }
        for id in ValveId::ALL {
            state.set_valve(id, self.open_valves[id.index()]);
        }
        state.set_agitator(self.agitator_running);
        state.run.running = self.running;
        if let Some(temperature) = self.temperature {
            if !temperature.is_finite() {
                return Err(MixerError::Validation(format!(
                    "temperature {temperature} is not finite"
                )));
            }
            state.run.temperature = temperature;
        }

        Ok(state)
    }
}
