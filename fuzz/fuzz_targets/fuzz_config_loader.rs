#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = loadcell_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A validated config must convert into runtime settings.
            let _ = loadcell_core::FilterCfg::try_from(&cfg);
            let _ = loadcell_core::WizardCfg::from(&cfg);
        }
    }
});
