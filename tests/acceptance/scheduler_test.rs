//! Scheduler-driven acceptance tests.
//!
//! The plant is driven by the periodic tick and runtime-refresh tasks, the
//! way a deployed front end would run it. Virtual time keeps these exact;
//! one threaded test checks the real scheduler end to end.

use super::common::{init_tracing, rig, Rig};
use mixer_common::{MixerError, SimulationConfig, SystemClock};
use mixer_runtime::{
    ManualScheduler, PeriodicScheduler, ProcessController, TankId, ThreadScheduler, ValveId,
    OVERFLOW_ALARM,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Advance the scheduler and the wall clock together in tick-sized steps.
fn run_for(rig: &Rig, sched: &mut ManualScheduler, total: Duration) {
    let step = rig.controller.config().tick_period;
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        rig.clock.advance(step);
        sched.advance(step);
        elapsed += step;
    }
}

#[test]
fn test_scheduled_batch_reaches_overflow_interlock() {
    let rig = rig();
    let mut sched = ManualScheduler::new();
    rig.controller.attach(&mut sched).unwrap();
    assert_eq!(sched.task_count(), 2);

    rig.controller.start_process();
    run_for(&rig, &mut sched, Duration::from_secs(12));

    let snap = rig.controller.snapshot();
    assert_eq!(snap.tick_count, 120);
    assert_eq!(snap.level(TankId::C), 95.0);
    assert!(!snap.valve_open(ValveId::A));
    assert!(!snap.valve_open(ValveId::B));
    assert_eq!(
        snap.alarms.iter().filter(|a| a.message() == OVERFLOW_ALARM).count(),
        1
    );
    assert_eq!(rig.controller.runtime(), "00:00:12");
}

#[test]
fn test_runtime_refreshes_once_per_second() {
    let rig = rig();
    let mut sched = ManualScheduler::new();
    rig.controller.attach(&mut sched).unwrap();

    rig.controller.start_process();
    let rx = rig.controller.subscribe();
    run_for(&rig, &mut sched, Duration::from_millis(900));
    assert_eq!(rig.controller.runtime(), "00:00:00");
    assert_eq!(rx.try_iter().count(), 9);

    run_for(&rig, &mut sched, Duration::from_millis(100));
    // Tick 10 then the refresh push, both carrying the same display
    let pushed: Vec<_> = rx.try_iter().collect();
    assert_eq!(pushed.len(), 2);
    assert_eq!(pushed[0].tick_count, pushed[1].tick_count);
    assert!(pushed.iter().all(|s| s.runtime == "00:00:01"));
    assert_eq!(rig.controller.runtime(), "00:00:01");

    run_for(&rig, &mut sched, Duration::from_secs(61));
    assert_eq!(rig.controller.runtime(), "00:01:02");
    assert_eq!(rx.try_iter().last().unwrap().runtime, "00:01:02");
}

#[test]
fn test_cancelled_tasks_stop_driving() {
    let rig = rig();
    let mut sched = ManualScheduler::new();
    let [tick, refresh] = rig.controller.attach(&mut sched).unwrap();

    run_for(&rig, &mut sched, Duration::from_secs(1));
    assert_eq!(rig.controller.tick_count(), 10);

    assert!(sched.cancel(tick));
    assert!(sched.cancel(refresh));
    run_for(&rig, &mut sched, Duration::from_secs(1));
    assert_eq!(rig.controller.tick_count(), 10);
}

#[test]
fn test_subscriber_sees_every_scheduled_tick() {
    let rig = rig();
    let mut sched = ManualScheduler::new();
    rig.controller.attach(&mut sched).unwrap();
    let rx = rig.controller.subscribe();

    rig.controller.open_valve(ValveId::A);
    run_for(&rig, &mut sched, Duration::from_millis(500));

    let snapshots: Vec<_> = rx.try_iter().collect();
    assert_eq!(snapshots.len(), 6);
    assert!(snapshots[0].valve_open(ValveId::A));
    assert_eq!(snapshots[0].tick_count, 0);
    let ticks: Vec<u64> = snapshots[1..].iter().map(|s| s.tick_count).collect();
    assert_eq!(ticks, vec![1, 2, 3, 4, 5]);
    assert_eq!(snapshots[5].level(TankId::C), 2.5);
}

#[test]
fn test_zero_period_rejected() {
    let mut sched = ManualScheduler::new();
    let err = sched
        .schedule_periodic(Duration::ZERO, Box::new(|| {}))
        .unwrap_err();
    assert!(matches!(err, MixerError::Scheduler(_)));
}

#[test]
fn test_thread_scheduler_drives_controller() {
    init_tracing();
    let mut config = SimulationConfig::default();
    config.tick_period = Duration::from_millis(5);
    config.runtime_refresh = Duration::from_millis(20);
    let controller = ProcessController::builder()
        .config(config)
        .clock(Arc::new(SystemClock))
        .build()
        .unwrap();

    let mut sched = ThreadScheduler::new("accept");
    controller.attach(&mut sched).unwrap();
    controller.start_process();

    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.tick_count() < 20 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    // Commands interleave with scheduled ticks without tearing
    controller.stop_process();
    sched.shutdown();

    let ticks = controller.tick_count();
    assert!(ticks >= 20, "only {ticks} ticks in 5 s");
    assert!(controller.check_bounds().is_ok());

    let snap = controller.snapshot();
    let drained = 200.0 - snap.level(TankId::A) - snap.level(TankId::B);
    assert!((snap.level(TankId::C) - drained).abs() < 1e-9);
    assert!(!snap.running);

    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.tick_count(), ticks);
}
