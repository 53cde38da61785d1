use helios::config::{Config, RelayBackend, ShutdownPolicy};
use helios::error::HeliosError;
use helios::modbus::RegisterType;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.inverter.host = "10.0.0.5".to_string();
    cfg.relay.backend = RelayBackend::DryRun;
    cfg.thresholds.max_on_seconds = None;
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.inverter.host, "10.0.0.5");
    assert_eq!(loaded.relay.backend, RelayBackend::DryRun);
    assert_eq!(loaded.thresholds, cfg.thresholds);
    assert_eq!(loaded.logging.file, cfg.logging.file);
}

#[test]
fn partial_yaml_fills_in_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        "inverter:\n  host: inverter.local\n  data_type: f32\nthresholds:\n  turn_on_watts: 2000\n  turn_off_watts: 1500\ncontrol:\n  shutdown_policy: hold\n",
    )
    .unwrap();

    let cfg = Config::from_file(tmp.path()).unwrap();
    assert_eq!(cfg.inverter.host, "inverter.local");
    assert_eq!(cfg.inverter.data_type, RegisterType::F32);
    assert_eq!(cfg.inverter.port, 502);
    assert!((cfg.thresholds.turn_on_watts - 2000.0).abs() < f64::EPSILON);
    assert_eq!(cfg.thresholds.min_on_seconds, 60);
    assert_eq!(cfg.control.shutdown_policy, ShutdownPolicy::Hold);
    assert!(cfg.validate().is_ok());
}

#[test]
fn load_prefers_explicit_path() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), "timezone: Europe/Berlin\n").unwrap();
    let cfg = Config::load(Some(tmp.path().to_str().unwrap())).unwrap();
    assert_eq!(cfg.timezone, "Europe/Berlin");
    assert_eq!(cfg.tz().unwrap(), chrono_tz::Europe::Berlin);
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();

    cfg.inverter.host.clear();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.inverter.port = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.inverter.scale = 0.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.control.backoff_max_ms = cfg.control.backoff_initial_ms - 1;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.logging.level = "LOUD".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn threshold_violations_are_typed() {
    let mut cfg = Config::default();
    cfg.thresholds.turn_on_watts = 500.0;
    cfg.thresholds.turn_off_watts = 800.0;
    assert!(matches!(
        cfg.validate(),
        Err(HeliosError::InvalidThresholds { .. })
    ));

    cfg = Config::default();
    cfg.thresholds.min_on_seconds = 600;
    cfg.thresholds.max_on_seconds = Some(300);
    assert!(matches!(
        cfg.validate(),
        Err(HeliosError::InvalidThresholds { .. })
    ));

    cfg = Config::default();
    cfg.thresholds.turn_on_watts = f64::NAN;
    assert!(matches!(
        cfg.validate(),
        Err(HeliosError::InvalidThresholds { .. })
    ));

    cfg = Config::default();
    cfg.thresholds.sample_interval_ms = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}
