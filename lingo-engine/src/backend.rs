//! Backend capability traits.
//!
//! A translation backend is anything with two operations: `translate` and
//! `status`. Stateful backends that load a heavyweight model are split one
//! level further into a [`ModelProvider`] (catalog, inspection, load) and the
//! [`LoadedModel`] it produces; `ModelLifecycle` glues the two together and
//! is itself a [`TranslationBackend`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use lingo_core::{BackendConfig, DeviceKind, ModelSettings, Settings};

use crate::error::EngineError;

/// Readiness report returned by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub ready: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BackendStatus {
    pub fn ready(message: impl Into<String>) -> Self {
        Self {
            ready: true,
            message: message.into(),
            detail: None,
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self {
            ready: false,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// The two-operation contract every backend satisfies.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, EngineError>;

    async fn status(&self) -> BackendStatus;

    /// Called after settings are reloaded.
    fn apply_settings(&self, _settings: &Settings) {}
}

/// One entry of a model catalog: a concrete build of a model for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVariant {
    /// Identifier accepted by [`ModelProvider::load`].
    pub id: String,
    /// User-facing alias shared by all variants of the same model.
    pub alias: String,
    /// Compute class the variant targets, if the catalog says.
    pub device: Option<DeviceKind>,
}

/// Source of loadable models.
#[async_trait]
pub trait ModelProvider: Send + Sync + 'static {
    /// All catalog entries, used to resolve an alias to a device variant.
    async fn variants(&self) -> Result<Vec<ModelVariant>, EngineError>;

    /// Download if necessary, then load `model_id`.
    async fn load(&self, model_id: &str) -> Result<Arc<dyn LoadedModel>, EngineError>;

    /// Readiness of `config` without loading anything.
    async fn inspect(&self, config: &BackendConfig) -> BackendStatus;

    /// Apply provider-level settings. Returns `true` when a model loaded under
    /// the previous settings can no longer be used.
    fn reconfigure(&self, _settings: &ModelSettings) -> bool {
        false
    }
}

/// A model resident in memory.
#[async_trait]
pub trait LoadedModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Run one prompt to completion.
    async fn complete(&self, prompt: &str) -> Result<String, EngineError>;

    async fn unload(&self) -> Result<(), EngineError>;
}
