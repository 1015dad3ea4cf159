#![no_main]
use std::sync::OnceLock;
use std::sync::Mutex;

use filament_core::config::{DetectionMethod, EngineCfg};
use filament_core::mocks::RecordingPrinter;
use filament_core::{PrinterEvent, SensorController, parse_line};
use filament_hardware::SimulatedSignal;
use libfuzzer_sys::fuzz_target;

fn controller() -> &'static Mutex<SensorController> {
    static CTL: OnceLock<Mutex<SensorController>> = OnceLock::new();
    CTL.get_or_init(|| {
        let mut cfg = EngineCfg::default();
        cfg.detection.method = DetectionMethod::Distance;
        let mut ctl = SensorController::builder()
            .with_config(cfg)
            .with_signal(SimulatedSignal::new())
            .with_printer(RecordingPrinter::new())
            .build()
            .unwrap();
        ctl.handle_event(PrinterEvent::PrintStarted).unwrap();
        Mutex::new(ctl)
    })
}

fuzz_target!(|data: &str| {
    let _ = parse_line(data);
    let ctl = controller().lock().unwrap();
    for line in data.lines() {
        // The tap must hand every line back untouched.
        assert_eq!(ctl.on_gcode_sent(line), line);
    }
    let remaining = ctl.snapshot().remaining_distance;
    assert!(!remaining.is_nan());
});
