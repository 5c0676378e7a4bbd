//! Integration-level unit tests for the SettingsEngine public API.
//!
//! These tests exercise the SettingsEngine through its public trait interface,
//! validating default loading, value persistence, and reset behavior.

use serval::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use serval::types::errors::SettingsError;
use serval::types::settings::{LauncherSettings, RestartPolicy, ServalSettings};
use tempfile::TempDir;

/// Helper: create a SettingsEngine backed by a temp directory that lives for the
/// duration of the test (the caller holds the `TempDir` handle).
fn engine_in_temp(dir: &TempDir) -> SettingsEngine {
    let path = dir
        .path()
        .join("settings.json")
        .to_string_lossy()
        .to_string();
    SettingsEngine::new(Some(path))
}

/// Defaults match the behavior of a coordinator with no configuration:
/// in-process units, no restarts, a ten-second command watchdog.
#[test]
fn test_defaults() {
    let defaults = ServalSettings::default();
    assert_eq!(defaults.coordinator.command_timeout_ms, Some(10_000));
    assert_eq!(defaults.coordinator.restart_policy, RestartPolicy::Never);
    assert_eq!(defaults.timing.title_delay_ms, 100);
    assert_eq!(defaults.timing.complete_delay_ms, 50);
    assert_eq!(defaults.launcher, LauncherSettings::InProcess);
    assert_eq!(defaults.bridge.endpoint, "ws://127.0.0.1:8080");
    assert_eq!(defaults.bridge.max_reconnect_attempts, 5);
    assert_eq!(defaults.rpc.max_requests_per_second, 200);
}

/// After `set_value`, a fresh engine reading the same file sees the change.
#[test]
fn test_set_value_persists_changes() {
    let dir = TempDir::new().unwrap();
    {
        let mut engine = engine_in_temp(&dir);
        engine.load().unwrap();
        engine
            .set_value("coordinator.command_timeout_ms", serde_json::json!(250))
            .unwrap();
    }

    let mut engine = engine_in_temp(&dir);
    let settings = engine.load().unwrap();
    assert_eq!(settings.coordinator.command_timeout_ms, Some(250));
}

/// A partial file fills every missing section with defaults.
#[test]
fn test_partial_file_uses_defaults_for_missing_sections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{"launcher": {"kind": "subprocess", "program": "/opt/serval-content"}}"#,
    )
    .unwrap();

    let mut engine = SettingsEngine::new(Some(path.to_string_lossy().to_string()));
    let settings = engine.load().unwrap();
    assert_eq!(
        settings.launcher,
        LauncherSettings::Subprocess {
            program: "/opt/serval-content".to_string(),
            args: Vec::new()
        }
    );
    assert_eq!(settings.timing, ServalSettings::default().timing);
}

/// A malformed file is an error, not a silent reset.
#[test]
fn test_malformed_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ nope").unwrap();

    let mut engine = SettingsEngine::new(Some(path.to_string_lossy().to_string()));
    assert!(matches!(
        engine.load(),
        Err(SettingsError::SerializationError(_))
    ));
}

#[test]
fn test_unknown_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();

    for key in ["", "coordinator.nope", "nope.value", "timing.title_delay_ms.deeper"] {
        let result = engine.set_value(key, serde_json::json!(1));
        assert!(
            matches!(result, Err(SettingsError::InvalidKey(_))),
            "key {:?} should be rejected",
            key
        );
    }
}

/// `reset` restores factory defaults and writes them out.
#[test]
fn test_reset_restores_defaults() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();
    engine
        .set_value("bridge.max_reconnect_attempts", serde_json::json!(9))
        .unwrap();

    engine.reset().unwrap();
    assert_eq!(*engine.get_settings(), ServalSettings::default());

    let mut reloaded = engine_in_temp(&dir);
    assert_eq!(reloaded.load().unwrap(), ServalSettings::default());
}
