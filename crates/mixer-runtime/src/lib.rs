#![doc = "Process simulation core for the batch mixer."]

pub mod commands;
pub mod controller;
pub mod history;
pub mod interlock;
pub mod noise;
pub mod scheduler;
pub mod snapshot;
pub mod state;
pub mod stepper;

pub use commands::*;
pub use controller::*;
pub use history::*;
pub use interlock::*;
pub use noise::*;
pub use scheduler::*;
pub use snapshot::*;
pub use state::*;
pub use stepper::*;
