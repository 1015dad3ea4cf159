//! SensorController behaviour across print lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use filament_core::config::{DetectionMethod, EngineCfg, PauseAction};
use filament_core::error::BuildError;
use filament_core::mocks::{RecordingObserver, RecordingPrinter};
use filament_core::monitor::MonitorKind;
use filament_core::{PrinterEvent, SensorController, TestStatus};
use filament_hardware::{SimulatedAlarm, SimulatedSignal};
use filament_traits::TestClock;
use rstest::rstest;

const PIN: u8 = 24;

struct Rig {
    sim: SimulatedSignal,
    printer: RecordingPrinter,
    observer: RecordingObserver,
    clock: TestClock,
    ctl: SensorController,
}

fn timeout_cfg() -> EngineCfg {
    let mut cfg = EngineCfg::default();
    cfg.detection.idle_timeout = Duration::from_millis(30);
    cfg.connection_test_timeout = Duration::from_millis(30);
    cfg.poll_interval = Duration::from_millis(5);
    cfg
}

fn distance_cfg() -> EngineCfg {
    let mut cfg = timeout_cfg();
    cfg.detection.method = DetectionMethod::Distance;
    cfg
}

/// Distance tests drive time by hand; timeout tests need a real clock.
fn rig_with(cfg: EngineCfg, manual_clock: bool) -> Rig {
    let sim = SimulatedSignal::new();
    let printer = RecordingPrinter::new();
    let observer = RecordingObserver::new();
    let clock = TestClock::new();
    let mut builder = SensorController::builder()
        .with_config(cfg)
        .with_signal(sim.clone())
        .with_printer(printer.clone())
        .with_observer(Arc::new(observer.clone()));
    if manual_clock {
        builder = builder.with_clock(Arc::new(clock.clone()));
    }
    let ctl = builder.build().unwrap();
    Rig {
        sim,
        printer,
        observer,
        clock,
        ctl,
    }
}

fn wait() {
    std::thread::sleep(Duration::from_millis(150));
}

#[test]
fn build_requires_signal_and_printer() {
    let err = SensorController::builder()
        .with_printer(RecordingPrinter::new())
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingSignal)
    ));

    let err = SensorController::builder()
        .with_signal(SimulatedSignal::new())
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingPrinter)
    ));
}

#[rstest]
#[case::alert_without_alarm({ let mut c = EngineCfg::default(); c.pause = PauseAction::Alert; c })]
#[case::zero_distance({ let mut c = EngineCfg::default(); c.detection.distance_mm = 0.0; c })]
#[case::zero_timeout({ let mut c = EngineCfg::default(); c.detection.idle_timeout = Duration::ZERO; c })]
#[case::blank_command({ let mut c = EngineCfg::default(); c.pause = PauseAction::Command("  ".into()); c })]
fn build_rejects_invalid_config(#[case] cfg: EngineCfg) {
    let err = SensorController::builder()
        .with_config(cfg)
        .with_signal(SimulatedSignal::new())
        .with_printer(RecordingPrinter::new())
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[test]
fn configure_resets_state_and_binds_distance_pin() {
    let rig = rig_with(distance_cfg(), true);
    let snap = rig.ctl.snapshot();
    assert_eq!(snap.remaining_distance, 15.0);
    assert!(!snap.filament_moving);
    assert!(snap.absolute_extrusion);
    assert!(rig.sim.is_subscribed(PIN));
}

#[test]
fn timeout_mode_leaves_pin_alone_until_monitoring() {
    let rig = rig_with(timeout_cfg(), false);
    assert!(!rig.sim.is_subscribed(PIN));
    assert!(!rig.ctl.is_monitoring());
}

#[test]
fn absolute_mode_discards_first_reading_after_start() {
    let mut rig = rig_with(distance_cfg(), true);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    assert_eq!(rig.ctl.snapshot().remaining_distance, 22.0);

    rig.ctl.on_gcode_sent("G1 X10 E5.0");
    assert_eq!(rig.ctl.snapshot().remaining_distance, 22.0);
    rig.ctl.on_gcode_sent("G1 X20 E10.0");
    assert_eq!(rig.ctl.snapshot().remaining_distance, 17.0);
}

#[test]
fn relative_mode_decrements_by_reading() {
    let mut rig = rig_with(distance_cfg(), true);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    rig.ctl.on_gcode_sent("M83");
    assert!(!rig.ctl.snapshot().absolute_extrusion);
    rig.ctl.on_gcode_sent("G1 E3.2");
    assert!((rig.ctl.snapshot().remaining_distance - 18.8).abs() < 1e-9);
}

#[test]
fn exhausted_budget_pauses_once_after_grace() {
    let mut rig = rig_with(distance_cfg(), true);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    rig.ctl.on_gcode_sent("M83");
    rig.sim.pulse(PIN);

    rig.ctl.on_gcode_sent("G1 E14");
    rig.ctl.on_gcode_sent("G1 E14");
    assert!(rig.ctl.snapshot().remaining_distance <= 0.0);

    // Within the grace window nothing happens.
    rig.clock.advance(Duration::from_secs(5));
    rig.ctl.on_gcode_sent("G1 E1");
    assert!(rig.printer.sent().is_empty());

    rig.clock.advance(Duration::from_secs(6));
    rig.ctl.on_gcode_sent("G1 E1");
    rig.ctl.on_gcode_sent("G1 E1");
    rig.ctl.on_gcode_sent("G1 E1");
    assert_eq!(rig.printer.sent(), vec!["M600".to_string()]);
    assert!(rig.ctl.pause_pending());
    assert!(!rig.ctl.snapshot().filament_moving);
}

#[test]
fn pulse_rearms_pause_and_catches_up() {
    let mut rig = rig_with(distance_cfg(), true);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    rig.ctl.on_gcode_sent("M83");
    rig.ctl.on_gcode_sent("G1 E14");
    rig.ctl.on_gcode_sent("G1 E14");
    // No pulse ever seen counts as grace elapsed.
    rig.ctl.on_gcode_sent("G1 E1");
    assert_eq!(rig.printer.count(), 1);

    rig.sim.pulse(PIN);
    assert!(!rig.ctl.pause_pending());
    let snap = rig.ctl.snapshot();
    assert_eq!(snap.remaining_distance, 15.0);
    assert!(snap.filament_moving);

    rig.ctl.on_gcode_sent("G1 E14");
    rig.ctl.on_gcode_sent("G1 E14");
    rig.clock.advance(Duration::from_secs(11));
    rig.ctl.on_gcode_sent("G1 E1");
    assert_eq!(rig.printer.count(), 2);
}

#[test]
fn pulse_above_distance_keeps_budget() {
    let mut rig = rig_with(distance_cfg(), true);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    rig.sim.pulse(PIN);
    assert_eq!(rig.ctl.snapshot().remaining_distance, 22.0);
}

#[test]
fn resume_after_pause_restores_start_budget_and_reseeds_position() {
    let mut rig = rig_with(distance_cfg(), true);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    rig.ctl.on_gcode_sent("G1 E5");
    rig.ctl.on_gcode_sent("G1 E19");
    rig.ctl.on_gcode_sent("G1 E33");
    assert!(rig.ctl.snapshot().remaining_distance <= 0.0);
    rig.ctl.on_gcode_sent("G1 E34");
    assert_eq!(rig.printer.count(), 1);

    rig.ctl.handle_event(PrinterEvent::PrintResumed).unwrap();
    assert_eq!(rig.ctl.snapshot().remaining_distance, 22.0);
    assert!(!rig.ctl.pause_pending());

    // Position was forgotten at pause time; the first reading only seeds it.
    rig.ctl.on_gcode_sent("G1 E40");
    assert_eq!(rig.ctl.snapshot().remaining_distance, 22.0);
    rig.ctl.on_gcode_sent("G1 E43");
    assert_eq!(rig.ctl.snapshot().remaining_distance, 19.0);
}

#[test]
fn failed_pause_is_retried() {
    let mut rig = rig_with(distance_cfg(), true);
    rig.printer.fail_next(1);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    rig.ctl.on_gcode_sent("M83");
    rig.ctl.on_gcode_sent("G1 E14");
    rig.ctl.on_gcode_sent("G1 E14");
    rig.ctl.on_gcode_sent("G1 E1");
    assert!(rig.printer.sent().is_empty());
    assert!(!rig.ctl.pause_pending());

    rig.ctl.on_gcode_sent("G1 E1");
    assert_eq!(rig.printer.count(), 1);
}

#[test]
fn alert_keyword_sounds_alarm_instead_of_pausing() {
    let sim = SimulatedSignal::new();
    let printer = RecordingPrinter::new();
    let alarm = SimulatedAlarm::new();
    let mut cfg = distance_cfg();
    cfg.pause = PauseAction::Alert;
    let mut ctl = SensorController::builder()
        .with_config(cfg)
        .with_signal(sim)
        .with_printer(printer.clone())
        .with_alarm(alarm.clone())
        .with_clock(Arc::new(TestClock::new()))
        .build()
        .unwrap();
    ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    ctl.on_gcode_sent("M83");
    ctl.on_gcode_sent("G1 E15 E15");
    ctl.on_gcode_sent("G1 E1");
    ctl.on_gcode_sent("G1 E1");
    assert_eq!(alarm.times_sounded(), 1);
    assert!(printer.sent().is_empty());
}

#[test]
fn tap_returns_line_unchanged_and_ignores_timeout_mode() {
    let mut rig = rig_with(timeout_cfg(), false);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    let line = "G1 X1 E99 ; purge";
    assert_eq!(rig.ctl.on_gcode_sent(line), line);
    assert_eq!(rig.ctl.snapshot().remaining_distance, 15.0);
}

#[test]
fn layer_change_starts_timeout_monitor() {
    let mut rig = rig_with(timeout_cfg(), false);
    rig.ctl.handle_event(PrinterEvent::ZChange).unwrap();
    assert!(!rig.ctl.is_monitoring(), "no print running yet");

    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    rig.ctl.handle_event(PrinterEvent::ZChange).unwrap();
    assert!(rig.ctl.is_monitoring());
    assert!(!rig.ctl.print_started());
    assert!(rig.ctl.snapshot().filament_moving);

    rig.ctl.handle_event(PrinterEvent::PrintDone).unwrap();
    assert!(!rig.ctl.is_monitoring());
    assert!(!rig.sim.is_subscribed(PIN));
}

#[test]
fn layer_changes_before_start_are_counted() {
    let mut cfg = timeout_cfg();
    cfg.detection.z_events_before_start = 2;
    let mut rig = rig_with(cfg, false);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    rig.ctl.handle_event(PrinterEvent::ZChange).unwrap();
    rig.ctl.handle_event(PrinterEvent::ZChange).unwrap();
    assert!(!rig.ctl.is_monitoring());
    assert_eq!(rig.ctl.z_changes(), 2);
    rig.ctl.handle_event(PrinterEvent::ZChange).unwrap();
    assert!(rig.ctl.is_monitoring());

    // A new print waits the full count again.
    rig.ctl.handle_event(PrinterEvent::PrintCancelled).unwrap();
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    assert_eq!(rig.ctl.z_changes(), 0);
}

#[rstest]
#[case(PrinterEvent::PrintPaused)]
#[case(PrinterEvent::PrintFailed)]
#[case(PrinterEvent::PrintCancelled)]
#[case(PrinterEvent::Error)]
fn ending_events_stop_monitor(#[case] event: PrinterEvent) {
    let mut rig = rig_with(timeout_cfg(), false);
    rig.ctl.handle_event(PrinterEvent::PrintResumed).unwrap();
    assert!(rig.ctl.is_monitoring());
    rig.ctl.handle_event(event).unwrap();
    assert!(!rig.ctl.is_monitoring());
}

#[test]
fn timeout_stall_pauses_once_until_pulse() {
    let mut rig = rig_with(timeout_cfg(), false);
    rig.ctl.handle_event(PrinterEvent::PrintResumed).unwrap();
    wait();
    assert_eq!(rig.printer.sent(), vec!["M600".to_string()]);
    assert!(!rig.ctl.snapshot().filament_moving);

    rig.sim.pulse(PIN);
    assert!(rig.ctl.snapshot().filament_moving);
    wait();
    assert_eq!(rig.printer.count(), 2);
    rig.ctl.shutdown().unwrap();
}

#[test]
fn disabled_sensor_is_inert() {
    let mut cfg = timeout_cfg();
    cfg.sensor.enabled = false;
    let mut rig = rig_with(cfg, false);
    rig.ctl.handle_event(PrinterEvent::PrintResumed).unwrap();
    assert!(!rig.ctl.is_monitoring());
    assert!(!rig.ctl.snapshot().filament_moving);
    assert_eq!(
        rig.ctl.start_connection_test().unwrap(),
        TestStatus::SensorInactive
    );
}

#[test]
fn unset_pin_is_inert() {
    let mut cfg = distance_cfg();
    cfg.sensor.pin = None;
    let mut rig = rig_with(cfg, true);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    assert_eq!(rig.ctl.snapshot().remaining_distance, 22.0);
    rig.ctl.on_gcode_sent("G1 E10");
    rig.ctl.on_gcode_sent("G1 E20");
    assert_eq!(rig.ctl.snapshot().remaining_distance, 22.0);
    assert!(!rig.sim.is_subscribed(PIN));
}

#[test]
fn stopping_inactive_test_changes_nothing() {
    let mut rig = rig_with(timeout_cfg(), false);
    let before = rig.ctl.snapshot();
    let notified = rig.observer.count();
    assert_eq!(rig.ctl.stop_connection_test().unwrap(), TestStatus::NotRunning);
    assert_eq!(rig.ctl.snapshot(), before);
    assert_eq!(rig.observer.count(), notified);
}

#[test]
fn connection_test_reports_motion_and_never_pauses() {
    let mut rig = rig_with(timeout_cfg(), false);
    assert_eq!(rig.ctl.start_connection_test().unwrap(), TestStatus::Started);
    assert_eq!(rig.ctl.monitor_kind(), Some(MonitorKind::ConnectionTest));
    assert!(rig.ctl.snapshot().connection_test_active);
    assert_eq!(
        rig.ctl.start_connection_test().unwrap(),
        TestStatus::AlreadyRunning
    );

    rig.sim.pulse(PIN);
    assert!(rig.ctl.snapshot().filament_moving);
    wait();
    assert!(!rig.ctl.snapshot().filament_moving);
    assert!(rig.printer.sent().is_empty());

    assert_eq!(rig.ctl.stop_connection_test().unwrap(), TestStatus::Stopped);
    assert!(!rig.ctl.snapshot().connection_test_active);
    assert!(!rig.sim.is_subscribed(PIN));
}

#[test]
fn connection_test_refused_while_printing() {
    let mut rig = rig_with(timeout_cfg(), false);
    rig.ctl.handle_event(PrinterEvent::PrintResumed).unwrap();
    assert_eq!(rig.ctl.start_connection_test().unwrap(), TestStatus::MonitorBusy);
    rig.ctl.shutdown().unwrap();
}

#[test]
fn layer_change_during_connection_test_retries_monitoring() {
    let mut rig = rig_with(timeout_cfg(), false);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    assert_eq!(rig.ctl.start_connection_test().unwrap(), TestStatus::Started);

    rig.ctl.handle_event(PrinterEvent::ZChange).unwrap();
    assert_eq!(rig.ctl.monitor_kind(), Some(MonitorKind::ConnectionTest));
    assert!(rig.ctl.print_started());

    rig.ctl.stop_connection_test().unwrap();
    rig.ctl.handle_event(PrinterEvent::ZChange).unwrap();
    assert_eq!(rig.ctl.monitor_kind(), Some(MonitorKind::Production));
    assert!(!rig.ctl.print_started());

    wait();
    assert_eq!(rig.printer.sent(), vec!["M600".to_string()]);
    rig.ctl.shutdown().unwrap();
}

#[test]
fn print_start_ends_connection_test() {
    let mut rig = rig_with(timeout_cfg(), false);
    rig.ctl.start_connection_test().unwrap();
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    assert_eq!(rig.ctl.monitor_kind(), None);
    assert!(!rig.ctl.snapshot().connection_test_active);
}

#[test]
fn distance_binding_restored_after_connection_test() {
    let mut rig = rig_with(distance_cfg(), true);
    rig.ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
    rig.ctl.start_connection_test().unwrap();
    rig.ctl.stop_connection_test().unwrap();
    assert!(rig.sim.is_subscribed(PIN));

    rig.ctl.on_gcode_sent("M83");
    rig.ctl.on_gcode_sent("G1 E12");
    rig.sim.pulse(PIN);
    assert_eq!(rig.ctl.snapshot().remaining_distance, 15.0);
}

#[test]
fn session_resume_republishes_snapshot() {
    let mut rig = rig_with(timeout_cfg(), false);
    let before = rig.observer.count();
    rig.ctl.handle_event(PrinterEvent::UserSessionResumed).unwrap();
    assert_eq!(rig.observer.count(), before + 1);
    assert_eq!(rig.observer.last(), Some(rig.ctl.snapshot()));
}

#[test]
fn reconfigure_switches_method() {
    let mut rig = rig_with(timeout_cfg(), false);
    rig.ctl.handle_event(PrinterEvent::PrintResumed).unwrap();
    assert!(rig.ctl.is_monitoring());

    let mut cfg = distance_cfg();
    cfg.detection.distance_mm = 9.0;
    rig.ctl.configure(cfg).unwrap();
    assert!(!rig.ctl.is_monitoring());
    assert_eq!(rig.ctl.snapshot().remaining_distance, 9.0);
    assert!(rig.sim.is_subscribed(PIN));
}

#[test]
fn shutdown_releases_every_pin() {
    let mut rig = rig_with(distance_cfg(), true);
    rig.ctl.shutdown().unwrap();
    assert!(!rig.sim.is_subscribed(PIN));
}
