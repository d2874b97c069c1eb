//! Backend selection.

use std::sync::{Arc, PoisonError, RwLock};

use lingo_core::{BackendKind, Settings};

use crate::backend::{BackendStatus, TranslationBackend};
use crate::error::EngineError;
use crate::lifecycle::ModelLifecycle;

/// Forwards `translate`/`status` to the backend the settings select.
pub struct BackendRouter {
    kind: RwLock<BackendKind>,
    phi_silica: Arc<dyn TranslationBackend>,
    foundry_local: Arc<ModelLifecycle>,
}

impl BackendRouter {
    pub fn new(
        kind: BackendKind,
        phi_silica: Arc<dyn TranslationBackend>,
        foundry_local: Arc<ModelLifecycle>,
    ) -> Self {
        Self {
            kind: RwLock::new(kind),
            phi_silica,
            foundry_local,
        }
    }

    pub fn kind(&self) -> BackendKind {
        *self.kind.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lifecycle(&self) -> &Arc<ModelLifecycle> {
        &self.foundry_local
    }

    /// Push reloaded settings to every backend. The Foundry Local model is
    /// invalidated when its configuration changed and reloads lazily on the
    /// next translation.
    pub fn apply_settings(&self, settings: &Settings) {
        let previous = {
            let mut kind = self.kind.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *kind, settings.model.backend)
        };
        if previous != settings.model.backend {
            tracing::info!(from = %previous, to = %settings.model.backend, "backend switched");
        }

        self.phi_silica.apply_settings(settings);
        if self.foundry_local.reconfigure(settings) {
            tracing::info!("foundry-local configuration changed; model will reload on demand");
        }
    }

    pub async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, EngineError> {
        self.active().translate(text, source_lang, target_lang).await
    }

    pub async fn status(&self) -> BackendStatus {
        self.active().status().await
    }

    /// Unload the Foundry Local model, if one is resident.
    pub async fn unload(&self) -> Result<bool, EngineError> {
        self.foundry_local.unload().await
    }

    fn active(&self) -> Arc<dyn TranslationBackend> {
        match self.kind() {
            BackendKind::PhiSilica => Arc::clone(&self.phi_silica),
            BackendKind::FoundryLocal => self.foundry_local.clone() as Arc<dyn TranslationBackend>,
        }
    }
}
