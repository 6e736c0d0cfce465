use thiserror::Error;

/// Mixer error types covering rejected commands, bad identifiers, and scheduling failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MixerError {
    /// A command was rejected because the process is not in a state that permits it.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// Unknown identifier or out-of-range value supplied by a caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// Periodic task registration or execution failure.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl MixerError {
    /// Returns true for rejected commands that left the process untouched.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::PreconditionViolation(_))
    }
}

/// Convenience type alias for mixer operations.
pub type MixerResult<T> = Result<T, MixerError>;
