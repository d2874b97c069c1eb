//! YAML settings store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.lingo/
//!   settings.yaml      (mode 0600, written via tmp + rename)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! A missing settings file is not an error: [`load_at`] returns defaults so a
//! fresh install behaves exactly like an untouched configuration.

use std::path::{Path, PathBuf};

use crate::error::SettingsError;
use crate::types::Settings;

const SETTINGS_FILE: &str = "settings.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.lingo/`
pub fn lingo_root(home: &Path) -> PathBuf {
    home.join(".lingo")
}

/// `<home>/.lingo/settings.yaml`: pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    lingo_root(home).join(SETTINGS_FILE)
}

/// Creates `<home>/.lingo/` (mode `0700`) if it does not yet exist.
pub fn ensure_root_at(home: &Path) -> Result<PathBuf, SettingsError> {
    let dir = lingo_root(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load settings from `<home>/.lingo/settings.yaml`.
///
/// Returns defaults when the file is absent and `SettingsError::Parse` (with
/// the path) when it exists but is malformed.
pub fn load_at(home: &Path) -> Result<Settings, SettingsError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings =
        serde_yaml::from_str(&contents).map_err(|e| SettingsError::Parse { path, source: e })?;
    validate(&settings)?;
    Ok(settings)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, SettingsError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save
// ---------------------------------------------------------------------------

/// Atomically write `settings` to `<home>/.lingo/settings.yaml`.
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), SettingsError> {
    validate(settings)?;
    ensure_root_at(home)?;
    let path = settings_path_at(home);
    let tmp_path = path.with_file_name(format!("{SETTINGS_FILE}.tmp"));

    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<(), SettingsError> {
    save_at(&home()?, settings)
}

/// Load, apply `edit`, and save in one step. Returns the saved document.
pub fn update_at(
    home: &Path,
    edit: impl FnOnce(&mut Settings),
) -> Result<Settings, SettingsError> {
    let mut settings = load_at(home)?;
    edit(&mut settings);
    save_at(home, &settings)?;
    Ok(settings)
}

// ---------------------------------------------------------------------------
// 4. Validation
// ---------------------------------------------------------------------------

fn validate(settings: &Settings) -> Result<(), SettingsError> {
    if settings.service.port == 0 {
        return Err(SettingsError::Invalid {
            field: "service.port",
            reason: "port must be between 1 and 65535".to_string(),
        });
    }
    if settings.model.model_alias.trim().is_empty() {
        return Err(SettingsError::Invalid {
            field: "model.model_alias",
            reason: "model alias must not be empty".to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
