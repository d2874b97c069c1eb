use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use lingo_core::{settings, BackendKind, DeviceKind, ExecutionStrategy};

fn lingo(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lingo").expect("lingo binary");
    cmd.env("HOME", home.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn about_prints_name_and_version() {
    let home = TempDir::new().unwrap();
    lingo(&home)
        .arg("about")
        .assert()
        .success()
        .stdout(predicate::str::contains("lingo"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn status_without_daemon_falls_back_to_standalone() {
    let home = TempDir::new().unwrap();
    settings::update_at(home.path(), |s| s.model.backend = BackendKind::PhiSilica).unwrap();

    lingo(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Daemon: not running"))
        .stdout(predicate::str::contains("Backend: phi-silica"))
        .stdout(predicate::str::contains("Ready: false"));
}

#[test]
fn status_json_reports_not_running() {
    let home = TempDir::new().unwrap();
    settings::update_at(home.path(), |s| s.model.backend = BackendKind::PhiSilica).unwrap();

    let output = lingo(&home).args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["running"], false);
    assert_eq!(value["backend"], "phi-silica");
    assert_eq!(value["ready"], false);
}

#[test]
fn control_commands_without_daemon_are_not_errors() {
    let home = TempDir::new().unwrap();
    for command in ["quit", "reload", "unload"] {
        lingo(&home)
            .arg(command)
            .assert()
            .success()
            .stdout(predicate::str::contains("not running"));
    }
}

#[test]
fn config_model_persists_and_show_reflects_it() {
    let home = TempDir::new().unwrap();
    lingo(&home)
        .args([
            "config", "model", "--backend", "phi-silica", "--strategy", "manual", "--device", "NPU",
            "--alias", "qwen2.5-0.5b",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved."));

    let saved = settings::load_at(home.path()).unwrap();
    assert_eq!(saved.model.backend, BackendKind::PhiSilica);
    assert_eq!(saved.model.execution_strategy, ExecutionStrategy::Manual);
    assert_eq!(saved.model.manual_device, DeviceKind::Npu);
    assert_eq!(saved.model.model_alias, "qwen2.5-0.5b");

    lingo(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("phi-silica"))
        .stdout(predicate::str::contains("qwen2.5-0.5b"));
}

#[test]
fn config_general_parses_yes_and_zero() {
    let home = TempDir::new().unwrap();
    lingo(&home).args(["config", "general", "--debug-logging", "yes"]).assert().success();
    assert!(settings::load_at(home.path()).unwrap().general.debug_log);

    lingo(&home).args(["config", "general", "--debug-logging", "0"]).assert().success();
    assert!(!settings::load_at(home.path()).unwrap().general.debug_log);
}

#[test]
fn config_without_flags_reports_no_changes() {
    let home = TempDir::new().unwrap();
    for section in ["general", "model", "service"] {
        lingo(&home)
            .args(["config", section])
            .assert()
            .failure()
            .stderr(predicate::str::starts_with("Error: No changes"));
    }
    assert!(!settings::settings_path_at(home.path()).exists());
}

#[test]
fn config_service_rejects_port_zero_and_masks_api_key() {
    let home = TempDir::new().unwrap();
    lingo(&home).args(["config", "service", "--port", "0"]).assert().failure();

    lingo(&home)
        .args(["config", "service", "--port", "8123", "--api-key", "hunter2"])
        .assert()
        .success();
    let saved = settings::load_at(home.path()).unwrap();
    assert_eq!(saved.service.port, 8123);
    assert_eq!(saved.service.api_key.as_deref(), Some("hunter2"));

    lingo(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(set)"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn corrupt_settings_surface_a_single_error_line() {
    let home = TempDir::new().unwrap();
    settings::ensure_root_at(home.path()).unwrap();
    std::fs::write(settings::settings_path_at(home.path()), "model: [oops").unwrap();

    lingo(&home)
        .args(["config", "show"])
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("Error: failed to load settings"));
}
