//! Periodic task scheduling.
//!
//! The core owns no timers. A [`PeriodicScheduler`] drives the tick and the
//! runtime-display refresh from outside:
//!
//! - [`ThreadScheduler`]: one named worker thread per task, sleeping until
//!   each absolute deadline so the period does not drift with task cost.
//! - [`ManualScheduler`]: virtual time advanced explicitly, for tests and
//!   replay.

use mixer_common::error::{MixerError, MixerResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Work run on every period.
pub type PeriodicTask = Box<dyn FnMut() + Send + 'static>;

/// Identifies a scheduled task for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    /// Raw task id.
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Fixed-period task runner.
pub trait PeriodicScheduler {
    /// Run `task` every `interval`, first after one full interval.
    ///
    /// # Errors
    ///
    /// Returns [`MixerError::Scheduler`] for a zero interval or when the
    /// task cannot be registered.
    fn schedule_periodic(&mut self, interval: Duration, task: PeriodicTask)
        -> MixerResult<TaskHandle>;

    /// Stop a task. Returns false if the handle is unknown or already
    /// cancelled.
    fn cancel(&mut self, handle: TaskHandle) -> bool;
}

fn check_interval(interval: Duration) -> MixerResult<()> {
    if interval.is_zero() {
        return Err(MixerError::Scheduler(
            "periodic interval must be non-zero".into(),
        ));
    }
    Ok(())
}

struct Worker {
    handle: TaskHandle,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                warn!(task = self.handle.id(), "Periodic task panicked");
            }
        }
    }
}

/// Scheduler backed by one OS thread per task.
///
/// Dropping the scheduler cancels and joins every task.
pub struct ThreadScheduler {
    name: String,
    next_id: u64,
    workers: Vec<Worker>,
}

impl std::fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("name", &self.name)
            .field("tasks", &self.workers.len())
            .finish()
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new("mixer")
    }
}

impl ThreadScheduler {
    /// Create a scheduler whose worker threads are named `{name}-task-{id}`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: 0,
            workers: Vec::new(),
        }
    }

    /// Number of live tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.workers.len()
    }

    /// Cancel and join every task.
    pub fn shutdown(&mut self) {
        for mut worker in self.workers.drain(..) {
            worker.stop();
        }
    }
}

impl PeriodicScheduler for ThreadScheduler {
    fn schedule_periodic(
        &mut self,
        interval: Duration,
        mut task: PeriodicTask,
    ) -> MixerResult<TaskHandle> {
        check_interval(interval)?;

        let handle = TaskHandle(self.next_id);
        self.next_id += 1;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let thread_name = format!("{}-task-{}", self.name, handle.id());

        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                debug!(task = handle.id(), ?interval, "Periodic task started");
                let mut deadline = Instant::now() + interval;

                loop {
                    // Park until the deadline or until cancelled
                    loop {
                        if stop_flag.load(Ordering::Acquire) {
                            debug!(task = handle.id(), "Periodic task stopped");
                            return;
                        }
                        let now = Instant::now();
                        if now >= deadline {
                            break;
                        }
                        thread::park_timeout(deadline - now);
                    }

                    task();

                    deadline += interval;
                    let now = Instant::now();
                    if deadline <= now {
                        // Overran one or more periods; skip them rather than burst
                        deadline = now + interval;
                    }
                }
            })
            .map_err(|e| MixerError::Scheduler(format!("failed to spawn task thread: {e}")))?;

        info!(
            task = handle.id(),
            interval_ms = interval.as_millis() as u64,
            "Scheduled periodic task"
        );

        self.workers.push(Worker {
            handle,
            stop,
            thread: Some(thread),
        });
        Ok(handle)
    }

    fn cancel(&mut self, handle: TaskHandle) -> bool {
        let Some(pos) = self.workers.iter().position(|w| w.handle == handle) else {
            return false;
        };
        let mut worker = self.workers.swap_remove(pos);
        worker.stop();
        info!(task = handle.id(), "Cancelled periodic task");
        true
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ManualTask {
    handle: TaskHandle,
    interval: Duration,
    next_due: Duration,
    task: PeriodicTask,
}

/// Scheduler driven by virtual time.
///
/// Nothing runs until [`advance`](Self::advance) is called. Tasks due at
/// the same instant run in registration order.
#[derive(Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    tasks: Vec<ManualTask>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl ManualScheduler {
    /// Create an empty scheduler at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of live tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Advance virtual time by `by`, running every task that falls due in
    /// deadline order. Returns the number of task runs.
    pub fn advance(&mut self, by: Duration) -> usize {
        let target = self.now.saturating_add(by);
        let mut runs = 0;

        loop {
            let due = self
                .tasks
                .iter_mut()
                .filter(|t| t.next_due <= target)
                .min_by_key(|t| (t.next_due, t.handle.id()));
            let Some(task) = due else {
                break;
            };

            self.now = task.next_due;
            task.next_due = task.next_due.saturating_add(task.interval);
            (task.task)();
            runs += 1;
        }

        self.now = target;
        runs
    }
}

impl PeriodicScheduler for ManualScheduler {
    fn schedule_periodic(
        &mut self,
        interval: Duration,
        task: PeriodicTask,
    ) -> MixerResult<TaskHandle> {
        check_interval(interval)?;

        let handle = TaskHandle(self.next_id);
        self.next_id += 1;
        self.tasks.push(ManualTask {
            handle,
            interval,
            next_due: self.now.saturating_add(interval),
            task,
        });
        Ok(handle)
    }

    fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.handle != handle);
        self.tasks.len() != before
    }
}
