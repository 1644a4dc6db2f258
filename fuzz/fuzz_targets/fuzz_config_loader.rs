#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    let Ok(cfg) = runout_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        // a valid config must map cleanly into engine settings
        let engine = runout_core::EngineCfg::from(&cfg);
        assert!(engine.channels.len() <= 2);
        for ch in &engine.channels {
            assert!(ch.direction_gate.is_none() || ch.dir_pin.is_some());
        }
    }
});
