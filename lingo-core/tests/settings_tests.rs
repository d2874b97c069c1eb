//! Settings store error-message, atomic-write-safety, and parsing tests.
//! Storage: ~/.lingo/settings.yaml

use assert_fs::prelude::*;
use lingo_core::{
    settings,
    types::{BackendKind, DeviceKind, ExecutionStrategy, DEFAULT_PORT},
    Settings, SettingsError,
};
use predicates::prelude::predicate;
use rstest::rstest;
use std::fs;

fn write_settings(home: &assert_fs::TempDir, body: &str) {
    home.child(".lingo/settings.yaml").write_str(body).expect("write settings");
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_settings(&home, ": : corrupt : yaml : !!!\n  - broken: [unclosed");

    let err = settings::load_at(home.path()).unwrap_err();
    assert!(matches!(err, SettingsError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("settings.yaml"), "must name the file, got: {err}");
}

#[test]
fn load_unknown_enum_value_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_settings(&home, "model:\n  backend: cloud-magic\n");

    let err = settings::load_at(home.path()).unwrap_err();
    assert!(matches!(err, SettingsError::Parse { .. }), "got: {err}");
}

#[test]
fn load_zero_port_is_rejected() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_settings(&home, "service:\n  port: 0\n");

    let err = settings::load_at(home.path()).unwrap_err();
    assert!(matches!(err, SettingsError::Invalid { field: "service.port", .. }), "got: {err}");
}

#[test]
fn partial_document_fills_remaining_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_settings(&home, "model:\n  execution_strategy: manual\n  manual_device: gpu\n");

    let loaded = settings::load_at(home.path()).expect("load");
    assert_eq!(loaded.model.execution_strategy, ExecutionStrategy::Manual);
    assert_eq!(loaded.model.manual_device, DeviceKind::Gpu);
    assert_eq!(loaded.model.backend, BackendKind::FoundryLocal);
    assert_eq!(loaded.service.port, DEFAULT_PORT);
}

#[rstest]
#[case("model:\n  backend: phi-silica\n", BackendKind::PhiSilica)]
#[case("model:\n  backend: foundry-local\n", BackendKind::FoundryLocal)]
#[case("general:\n  debug_log: true\n", BackendKind::FoundryLocal)]
fn backend_kind_parses_from_yaml(#[case] body: &str, #[case] expected: BackendKind) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_settings(&home, body);
    let loaded = settings::load_at(home.path()).expect("load");
    assert_eq!(loaded.backend_config().kind, expected);
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn save_cleans_up_tmp_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    settings::save_at(home.path(), &Settings::default()).expect("save");

    let path = settings::settings_path_at(home.path());
    let tmp = path.with_file_name("settings.yaml.tmp");
    assert!(!tmp.exists(), ".tmp must be removed after successful save");
    home.child(".lingo/settings.yaml").assert(predicate::path::exists());
}

#[test]
fn save_writes_kebab_case_values() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut doc = Settings::default();
    doc.model.execution_strategy = ExecutionStrategy::PowerSaving;
    settings::save_at(home.path(), &doc).expect("save");

    let text = fs::read_to_string(settings::settings_path_at(home.path())).expect("read");
    assert!(text.contains("execution_strategy: power-saving"), "got:\n{text}");
    assert!(text.contains("backend: foundry-local"), "got:\n{text}");
}

#[test]
fn save_rejects_empty_model_alias_without_touching_disk() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut doc = Settings::default();
    doc.model.model_alias = "   ".to_string();

    let err = settings::save_at(home.path(), &doc).unwrap_err();
    assert!(matches!(err, SettingsError::Invalid { .. }), "got: {err}");
    assert!(!settings::settings_path_at(home.path()).exists());
}
