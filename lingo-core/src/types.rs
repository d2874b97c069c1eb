//! Settings types for the lingo daemon.
//!
//! All types are serializable/deserializable via serde + serde_yaml. Enum
//! values are written in kebab-case and parsed case-insensitively from CLI
//! strings through their `FromStr` impls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default HTTP port for the translate listener.
pub const DEFAULT_PORT: u16 = 52860;

/// Default model alias requested from the Foundry Local catalog.
pub const DEFAULT_MODEL_ALIAS: &str = "phi-3.5-mini";

/// Default base URL of the Foundry Local service.
pub const DEFAULT_FOUNDRY_ENDPOINT: &str = "http://127.0.0.1:5273";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which translation backend serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// On-device system language model (Phi Silica).
    PhiSilica,
    /// Models managed by a local Foundry service.
    #[default]
    FoundryLocal,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::PhiSilica => write!(f, "phi-silica"),
            BackendKind::FoundryLocal => write!(f, "foundry-local"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "phisilica" => Ok(Self::PhiSilica),
            "foundrylocal" | "foundry" => Ok(Self::FoundryLocal),
            _ => Err(format!(
                "unknown backend '{s}'; expected: phi-silica, foundry-local"
            )),
        }
    }
}

/// Hardware preference used when resolving a model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Prefer the lowest-power compute class.
    PowerSaving,
    /// Use the model's default variant as published.
    #[default]
    HighPerformance,
    /// Use the device named in `manual_device`.
    Manual,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::PowerSaving => write!(f, "power-saving"),
            ExecutionStrategy::HighPerformance => write!(f, "high-performance"),
            ExecutionStrategy::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "powersaving" => Ok(Self::PowerSaving),
            "highperformance" => Ok(Self::HighPerformance),
            "manual" => Ok(Self::Manual),
            _ => Err(format!(
                "unknown strategy '{s}'; expected: power-saving, high-performance, manual"
            )),
        }
    }
}

/// Compute class a model variant targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Gpu,
    Npu,
    WebGpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
            DeviceKind::Npu => write!(f, "npu"),
            DeviceKind::WebGpu => write!(f, "webgpu"),
        }
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            "npu" => Ok(Self::Npu),
            "webgpu" => Ok(Self::WebGpu),
            _ => Err(format!(
                "unknown device '{s}'; expected: cpu, gpu, npu, webgpu"
            )),
        }
    }
}

/// Lowercase and strip `-`/`_` so `High-Performance`, `high_performance` and
/// `highperformance` all parse the same way.
fn normalize_token(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

// ---------------------------------------------------------------------------
// Backend identity
// ---------------------------------------------------------------------------

/// Immutable snapshot of everything that decides which model gets loaded.
///
/// Two configs are the same load target only if all four fields match; any
/// difference forces an unload followed by a fresh load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub model_alias: String,
    pub strategy: ExecutionStrategy,
    pub manual_device: DeviceKind,
}

impl fmt::Display for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({}",
            self.kind, self.model_alias, self.strategy
        )?;
        if self.strategy == ExecutionStrategy::Manual {
            write!(f, ", {}", self.manual_device)?;
        }
        write!(f, ")")
    }
}

// ---------------------------------------------------------------------------
// Settings document
// ---------------------------------------------------------------------------

/// `general:` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GeneralSettings {
    /// Raise daemon log verbosity to `debug`.
    #[serde(default)]
    pub debug_log: bool,
}

/// `model:` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_model_alias")]
    pub model_alias: String,
    #[serde(default)]
    pub execution_strategy: ExecutionStrategy,
    #[serde(default)]
    pub manual_device: DeviceKind,
    #[serde(default = "default_foundry_endpoint")]
    pub foundry_endpoint: String,
    /// Overrides the built-in translation prompt (Tera syntax).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            model_alias: default_model_alias(),
            execution_strategy: ExecutionStrategy::default(),
            manual_device: DeviceKind::default(),
            foundry_endpoint: default_foundry_endpoint(),
            prompt_template: None,
        }
    }
}

/// `service:` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    /// When set, HTTP callers must present this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_key: None,
        }
    }
}

/// Root of `~/.lingo/settings.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub service: ServiceSettings,
}

impl Settings {
    /// The load identity derived from the `model:` section.
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            kind: self.model.backend,
            model_alias: self.model.model_alias.clone(),
            strategy: self.model.execution_strategy,
            manual_device: self.model.manual_device,
        }
    }
}

fn default_model_alias() -> String {
    DEFAULT_MODEL_ALIAS.to_string()
}

fn default_foundry_endpoint() -> String {
    DEFAULT_FOUNDRY_ENDPOINT.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
