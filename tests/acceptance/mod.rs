//! Integration tests for batch mixer acceptance testing.
//!
//! - Scenario tests: operator-visible behaviour of ticks, interlocks and commands
//! - Property tests: bounds and mass conservation over random sequences
//! - Scheduler tests: periodic driving in virtual and real time

mod common;
mod scenario_test;
mod scheduler_test;
