#![doc = "Common types shared across the batch mixer workspace."]

pub mod alarm;
pub mod config;
pub mod error;
pub mod time;

pub use alarm::*;
pub use config::*;
pub use error::*;
pub use time::*;
