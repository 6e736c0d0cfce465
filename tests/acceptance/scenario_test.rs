//! Operator scenario acceptance tests.
//!
//! Each test drives the controller the way a front end would: ticks from
//! the scheduler, commands from buttons, and reads of settled snapshots.

use super::common::{count, rig, rig_from, rig_with_state};
use mixer_common::{MixerError, Severity, SimulationConfig};
use mixer_runtime::{
    agitator_start_refused_alarm, low_level_alarm, Command, ProcessState, TankId, ValveId,
    BATCH_STARTED_ALARM, DRY_RUN_ALARM, EMERGENCY_STOP_ALARM, OVERFLOW_ALARM,
};
use std::time::Duration;

#[test]
fn test_closed_valves_hold_levels() {
    let rig = rig();

    rig.ticks(10);

    let snap = rig.controller.snapshot();
    assert_eq!(snap.level(TankId::A), 100.0);
    assert_eq!(snap.level(TankId::B), 100.0);
    assert_eq!(snap.level(TankId::C), 0.0);
    assert!(snap.alarms.is_empty());
    assert!(!snap.flowing);
    assert_eq!(snap.tick_count, 10);
}

#[test]
fn test_single_valve_tick() {
    let rig = rig();
    rig.controller.open_valve(ValveId::A);

    let report = rig.tick();

    let snap = rig.controller.snapshot();
    assert_eq!(snap.level(TankId::A), 99.5);
    assert_eq!(snap.level(TankId::B), 100.0);
    assert_eq!(snap.level(TankId::C), 0.5);
    assert_eq!(snap.flow_rate, 5.0);
    assert!(snap.flowing);
    assert!(snap.alarms.is_empty());
    assert!(report.alarms.is_empty());
}

#[test]
fn test_overflow_interlock_fires_once() {
    let rig = rig();
    rig.controller.open_valve(ValveId::A);
    rig.controller.open_valve(ValveId::B);

    let mut fired_at = None;
    for tick in 1..=200 {
        let report = rig.tick();
        if !report.alarms.is_empty() {
            fired_at = Some(tick);
            assert_eq!(report.alarms.len(), 1);
            assert_eq!(report.alarms[0].message(), OVERFLOW_ALARM);
            assert_eq!(report.alarms[0].severity(), Severity::Warning);
            break;
        }
    }

    // 1.0 per tick with both valves open reaches 95 on tick 95
    assert_eq!(fired_at, Some(95));
    let snap = rig.controller.snapshot();
    assert_eq!(snap.level(TankId::C), 95.0);
    assert!(!snap.valve_open(ValveId::A));
    assert!(!snap.valve_open(ValveId::B));

    rig.ticks(100);
    let snap = rig.controller.snapshot();
    assert_eq!(count(&snap.alarms, OVERFLOW_ALARM), 1);
    assert_eq!(snap.level(TankId::C), 95.0);
}

#[test]
fn test_reopen_on_full_mixer_is_refused_by_interlock() {
    let state = ProcessState::builder().level(TankId::C, 96.0).build().unwrap();
    let rig = rig_with_state(state);

    let outcome = rig.controller.open_valve(ValveId::B);

    assert_eq!(count(&outcome.alarms, OVERFLOW_ALARM), 1);
    assert!(!rig.controller.snapshot().valve_open(ValveId::B));

    // Within the dedup window a second attempt is corrected silently
    rig.wait(Duration::from_secs(1));
    let outcome = rig.controller.open_valve(ValveId::B);
    assert!(outcome.alarms.is_empty());
    assert!(!rig.controller.snapshot().valve_open(ValveId::B));
    assert_eq!(count(&rig.controller.snapshot().alarms, OVERFLOW_ALARM), 1);
}

#[test]
fn test_agitator_refused_on_low_mixer() {
    let state = ProcessState::builder().level(TankId::C, 3.0).build().unwrap();
    let rig = rig_with_state(state);

    let err = rig.controller.toggle_agitator().unwrap_err();

    assert!(matches!(err.source, MixerError::PreconditionViolation(_)));
    let snap = rig.controller.snapshot();
    assert!(!snap.agitator_running);
    assert_eq!(snap.alarms.len(), 1);
    assert_eq!(snap.alarms[0].message(), agitator_start_refused_alarm(10.0));
    assert_eq!(snap.alarms[0].severity(), Severity::Warning);
    assert_eq!(snap.level(TankId::C), 3.0);
}

#[test]
fn test_start_is_idempotent() {
    let rig = rig();

    rig.controller.start_process();
    let started_at = rig.controller.snapshot().started_at;
    rig.wait(Duration::from_secs(2));
    let second = rig.controller.start_process();

    assert!(!second.changed);
    let snap = rig.controller.snapshot();
    assert!(snap.running);
    assert_eq!(snap.started_at, started_at);
    assert_eq!(count(&snap.alarms, BATCH_STARTED_ALARM), 1);
    assert_eq!(
        snap.alarms
            .iter()
            .filter(|a| a.severity() == Severity::Info)
            .count(),
        1
    );
}

#[test]
fn test_dry_run_interlock_on_next_tick() {
    let state = ProcessState::builder()
        .level(TankId::C, 4.0)
        .agitator_running(true)
        .build()
        .unwrap();
    let rig = rig_with_state(state);

    let report = rig.tick();

    assert_eq!(report.alarms.len(), 1);
    assert_eq!(report.alarms[0].message(), DRY_RUN_ALARM);
    assert_eq!(report.alarms[0].severity(), Severity::Warning);
    let snap = rig.controller.snapshot();
    assert!(!snap.agitator_running);
    assert_eq!(count(&snap.alarms, DRY_RUN_ALARM), 1);
}

#[test]
fn test_full_batch_cycle() {
    let rig = rig();

    rig.controller.start_process();
    rig.ticks(20);
    rig.controller.toggle_agitator().unwrap();
    rig.ticks(10);

    let snap = rig.controller.snapshot();
    assert!(snap.agitator_running);
    assert_eq!(snap.level(TankId::C), 30.0);
    assert!(snap.temperature > 22.5);
    assert_eq!(snap.runtime, "00:00:03");

    rig.controller.stop_process();
    let snap = rig.controller.snapshot();
    assert!(!snap.running);
    assert!(!snap.agitator_running);
    assert!(!snap.valve_open(ValveId::A));
    assert_eq!(snap.alarms[0].message(), EMERGENCY_STOP_ALARM);
    assert_eq!(snap.alarms[0].severity(), Severity::Critical);
    // Runtime keeps counting from the first start until reset
    assert!(snap.started_at.is_some());

    rig.controller.reset_process();
    let snap = rig.controller.snapshot();
    assert_eq!(snap.level(TankId::A), 100.0);
    assert_eq!(snap.level(TankId::C), 0.0);
    assert_eq!(snap.temperature, 22.5);
    assert!(snap.alarms.is_empty());
    assert!(snap.started_at.is_none());
    assert_eq!(snap.runtime, "00:00:00");
    assert!(rig.controller.history().is_empty());
}

#[test]
fn test_low_source_advisory_is_deduplicated() {
    let state = ProcessState::builder()
        .level(TankId::A, 6.0)
        .level(TankId::C, 50.0)
        .build()
        .unwrap();
    let rig = rig_with_state(state);
    rig.controller.open_valve(ValveId::A);

    // 6.0 -> 5.0 after two ticks, then the advisory repeats every tick
    rig.ticks(2);
    let snap = rig.controller.snapshot();
    assert_eq!(count(&snap.alarms, &low_level_alarm(TankId::A, 5.0)), 1);

    // Ten more ticks span one second: still inside the window
    rig.ticks(10);
    assert_eq!(
        count(&rig.controller.snapshot().alarms, &low_level_alarm(TankId::A, 5.0)),
        1
    );
    // Valve stays open; advisories never correct
    assert!(rig.controller.snapshot().valve_open(ValveId::A));
}

#[test]
fn test_alarm_journal_keeps_five_newest() {
    let rig = rig();

    for _ in 0..4 {
        rig.controller.stop_process();
        rig.wait(Duration::from_secs(6));
    }
    rig.controller.start_process();
    rig.controller.stop_process();

    let snap = rig.controller.snapshot();
    assert_eq!(snap.alarms.len(), 5);
    assert_eq!(snap.alarms[0].message(), EMERGENCY_STOP_ALARM);
    assert_eq!(snap.alarms[1].message(), BATCH_STARTED_ALARM);
}

#[test]
fn test_emergency_stop_deduplicated_within_window() {
    let rig = rig();

    rig.controller.stop_process();
    rig.wait(Duration::from_millis(4999));
    rig.controller.stop_process();
    assert_eq!(count(&rig.controller.snapshot().alarms, EMERGENCY_STOP_ALARM), 1);

    rig.wait(Duration::from_millis(1));
    rig.controller.stop_process();
    assert_eq!(count(&rig.controller.snapshot().alarms, EMERGENCY_STOP_ALARM), 2);
}

#[test]
fn test_clock_skew_tolerated() {
    let rig = rig();
    rig.controller.start_process();
    rig.wait(Duration::from_secs(10));

    // Wall clock steps back past the start time
    rig.clock.set(chrono::DateTime::<chrono::Utc>::default() - chrono::Duration::seconds(30));
    rig.controller.stop_process();
    rig.controller.stop_process();

    let snap = rig.controller.snapshot();
    assert_eq!(snap.runtime, "00:00:00");
    assert_eq!(count(&snap.alarms, EMERGENCY_STOP_ALARM), 1);
}

#[test]
fn test_unknown_identifiers_rejected() {
    let err = "D".parse::<ValveId>().unwrap_err();
    assert!(matches!(err, MixerError::Validation(_)));
    assert!("tank".parse::<TankId>().is_err());

    // Parsed identifiers round-trip through the command path
    let rig = rig();
    let id: ValveId = "b".parse().unwrap();
    rig.controller.execute(Command::ToggleValve(id)).unwrap();
    assert!(rig.controller.snapshot().valve_open(ValveId::B));
}

#[test]
fn test_custom_thresholds() -> anyhow::Result<()> {
    let config = SimulationConfig::from_toml(
        r#"
        [flow]
        rate_per_tick = 2.0

        [interlock]
        overflow_level = 50.0
        "#,
    )?;
    let rig = rig_from(ProcessState::default(), config);
    rig.controller.open_valve(ValveId::A);

    rig.ticks(30);

    let snap = rig.controller.snapshot();
    assert_eq!(snap.level(TankId::C), 50.0);
    assert_eq!(snap.flow_rate, 0.0);
    assert_eq!(count(&snap.alarms, OVERFLOW_ALARM), 1);
    Ok(())
}

#[test]
fn test_configured_thresholds_and_ambient_reach_operator_view() -> anyhow::Result<()> {
    let config = SimulationConfig::from_toml(
        r#"
        [temperature]
        min = 24.0
        ambient = 25.0

        [interlock]
        agitator_start_level = 20.0
        low_source_level = 8.0
        "#,
    )?;
    let state = ProcessState::builder()
        .ambient(25.0)
        .level(TankId::A, 8.0)
        .level(TankId::C, 15.0)
        .build()?;
    let rig = rig_from(state, config);

    assert!(rig.controller.toggle_agitator().is_err());
    rig.controller.open_valve(ValveId::A);

    let snap = rig.controller.snapshot();
    assert_eq!(
        count(&snap.alarms, "Cannot start agitator: Mixer level too low (<20%)"),
        1
    );
    assert_eq!(count(&snap.alarms, "Tank A level critical (<8%)"), 1);

    rig.ticks(5);
    rig.controller.reset_process();
    assert!(rig.controller.check_bounds().is_ok());
    assert_eq!(rig.controller.snapshot().temperature, 25.0);
    Ok(())
}

#[test]
fn test_snapshot_serializes_for_presentation() -> anyhow::Result<()> {
    let rig = rig();
    rig.controller.start_process();
    rig.tick();

    let json = serde_json::to_value(rig.controller.snapshot())?;

    assert_eq!(json["running"], true);
    assert_eq!(json["tanks"][2]["level"], 1.0);
    assert_eq!(json["alarm_status"]["status"], "active");
    assert_eq!(json["alarm_status"]["severity"], "info");
    assert_eq!(json["alarms"][0]["message"], BATCH_STARTED_ALARM);
    Ok(())
}
