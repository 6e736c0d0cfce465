//! Common utilities for integration tests.
//!
//! Provides helpers for:
//! - One-time tracing setup honouring `RUST_LOG`
//! - Building controllers on a manual clock with pinned noise
//! - Counting alarms in snapshots

#![allow(dead_code)]

use mixer_common::{Alarm, ManualClock, SimulationConfig};
use mixer_runtime::{ConstantNoise, ProcessController, ProcessState, SeededNoise};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

static TRACING: OnceLock<()> = OnceLock::new();

/// Install a test subscriber once per process. Defaults to `info`.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // Another harness may already own the global subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A controller and the clock that drives it.
pub struct Rig {
    pub controller: ProcessController,
    pub clock: ManualClock,
}

impl Rig {
    /// Tick once and move the clock forward by the configured period.
    pub fn tick(&self) -> mixer_runtime::TickReport {
        let report = self.controller.tick();
        self.clock.advance(self.controller.config().tick_period);
        report
    }

    /// Tick `n` times.
    pub fn ticks(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Move the clock without ticking.
    pub fn wait(&self, by: Duration) {
        self.clock.advance(by);
    }
}

/// Default plant on a manual clock with a noise source that biases the
/// walk upward, mirroring the reference noise offset.
pub fn rig() -> Rig {
    rig_from(ProcessState::default(), SimulationConfig::default())
}

/// Plant starting from `state`.
pub fn rig_with_state(state: ProcessState) -> Rig {
    rig_from(state, SimulationConfig::default())
}

/// Plant built from `state` and `config`.
pub fn rig_from(state: ProcessState, config: SimulationConfig) -> Rig {
    init_tracing();
    let clock = ManualClock::at_epoch();
    let controller = ProcessController::builder()
        .config(config)
        .state(state)
        .clock(Arc::new(clock.clone()))
        .noise(Box::new(ConstantNoise(0.5)))
        .build()
        .expect("valid default config");
    Rig { controller, clock }
}

/// Plant with seeded random noise.
pub fn seeded_rig(seed: u64) -> Rig {
    init_tracing();
    let clock = ManualClock::at_epoch();
    let controller = ProcessController::builder()
        .clock(Arc::new(clock.clone()))
        .noise(Box::new(SeededNoise::from_seed(seed)))
        .build()
        .expect("valid default config");
    Rig { controller, clock }
}

/// Number of alarms carrying `message`.
pub fn count(alarms: &[Alarm], message: &str) -> usize {
    alarms.iter().filter(|a| a.message() == message).count()
}
