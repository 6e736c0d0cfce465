//! Bounded, de-duplicating alarm journal.
//!
//! The journal keeps the most recent alarms, newest first. A message that
//! is already present in the journal and was raised less than the dedup
//! window ago is suppressed, whatever its severity. Distinct messages all
//! coexist until capacity pushes the oldest out.

use crate::time::elapsed_since;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Default number of alarms retained.
pub const DEFAULT_ALARM_CAPACITY: usize = 5;

/// Default window during which an identical message is suppressed.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// Alarm severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational event, e.g. batch started.
    Info,
    /// Advisory or interlock action.
    Warning,
    /// Operator emergency action.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A single journal entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    message: String,
    severity: Severity,
    timestamp: DateTime<Utc>,
}

impl Alarm {
    /// Create an alarm raised at `timestamp`.
    pub fn new(message: impl Into<String>, severity: Severity, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            severity,
            timestamp,
        }
    }

    /// Alarm text. Also the dedup key.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Alarm severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Wall-clock time the alarm was raised.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S"),
            self.severity,
            self.message
        )
    }
}

/// Summary of the journal as shown on an annunciator panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlarmStatus {
    /// No alarms in the journal.
    Normal,
    /// The newest alarm, which decides the panel colour.
    Active {
        /// Severity of the newest alarm.
        severity: Severity,
        /// Message of the newest alarm.
        message: String,
    },
}

/// Bounded MRU-ordered alarm journal.
#[derive(Debug, Clone)]
pub struct AlarmLog {
    /// Entries, newest at the front.
    entries: VecDeque<Alarm>,
    /// Maximum number of entries retained.
    capacity: usize,
    /// Suppression window for identical messages.
    dedup_window: Duration,
}

impl Default for AlarmLog {
    fn default() -> Self {
        Self::new(DEFAULT_ALARM_CAPACITY, DEFAULT_DEDUP_WINDOW)
    }
}

impl AlarmLog {
    /// Create an empty journal. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize, dedup_window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
            dedup_window,
        }
    }

    /// Record `message` at time `now` unless it is a duplicate.
    ///
    /// Returns the accepted alarm, or `None` when suppressed. A duplicate is
    /// any retained entry with the same text raised less than the dedup
    /// window before `now`. If the clock stepped backwards past an entry's
    /// timestamp the entry still counts as recent, so skew can only delay
    /// expiry, never cause a double entry.
    pub fn add(
        &mut self,
        message: impl Into<String>,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Option<Alarm> {
        let message = message.into();

        if self.is_duplicate(&message, now) {
            debug!(%message, %severity, "Alarm suppressed by dedup window");
            return None;
        }

        let alarm = Alarm::new(message, severity, now);
        self.entries.push_front(alarm.clone());
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }

        Some(alarm)
    }

    fn is_duplicate(&self, message: &str, now: DateTime<Utc>) -> bool {
        self.entries.iter().any(|a| {
            a.message == message && elapsed_since(a.timestamp, now) < self.dedup_window
        })
    }

    /// Change the sizing in place. Entries beyond the new capacity are
    /// evicted oldest first.
    pub fn resize(&mut self, capacity: usize, dedup_window: Duration) {
        self.capacity = capacity.max(1);
        self.dedup_window = dedup_window;
        self.entries.truncate(self.capacity);
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no alarms are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries retained.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Suppression window for identical messages.
    #[must_use]
    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    /// Newest alarm, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&Alarm> {
        self.entries.front()
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Alarm> {
        self.entries.iter()
    }

    /// Copy of the entries, newest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Alarm> {
        self.entries.iter().cloned().collect()
    }

    /// Count of retained entries carrying `message`.
    #[must_use]
    pub fn count_of(&self, message: &str) -> usize {
        self.entries.iter().filter(|a| a.message == message).count()
    }

    /// Panel summary derived from the newest entry.
    #[must_use]
    pub fn status(&self) -> AlarmStatus {
        match self.latest() {
            None => AlarmStatus::Normal,
            Some(alarm) => AlarmStatus::Active {
                severity: alarm.severity,
                message: alarm.message.clone(),
            },
        }
    }
}
