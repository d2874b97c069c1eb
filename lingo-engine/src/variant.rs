//! Hardware variant selection.
//!
//! | strategy         | target device        |
//! |------------------|----------------------|
//! | high-performance | none (alias as-is)   |
//! | power-saving     | CPU                  |
//! | manual           | `manual_device`      |
//!
//! When no catalog entry matches both the alias and the target device the
//! alias itself is returned unresolved, and the provider picks its default
//! variant.

use lingo_core::{BackendConfig, DeviceKind, ExecutionStrategy};

use crate::backend::ModelVariant;

/// The device a strategy asks for, or `None` when the published default wins.
pub fn target_device(config: &BackendConfig) -> Option<DeviceKind> {
    match config.strategy {
        ExecutionStrategy::HighPerformance => None,
        ExecutionStrategy::PowerSaving => Some(DeviceKind::Cpu),
        ExecutionStrategy::Manual => Some(config.manual_device),
    }
}

/// Resolve `config.model_alias` to a concrete variant id.
pub fn resolve_model_id(variants: &[ModelVariant], config: &BackendConfig) -> String {
    let Some(device) = target_device(config) else {
        return config.model_alias.clone();
    };

    variants
        .iter()
        .filter(|v| v.alias.eq_ignore_ascii_case(&config.model_alias))
        .find(|v| v.device == Some(device) && !v.id.is_empty())
        .map(|v| v.id.clone())
        .unwrap_or_else(|| {
            tracing::debug!(
                alias = %config.model_alias,
                device = %device,
                "no catalog variant for device; using alias",
            );
            config.model_alias.clone()
        })
}
