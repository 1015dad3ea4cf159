#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = filament_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A valid file must map to an engine config without panicking.
            let _ = filament_core::EngineCfg::from(&cfg);
        }
    }
});
