//! lingo-engine: translation backends and model lifecycle.
//!
//! - [`backend`]: the `TranslationBackend` / `ModelProvider` / `LoadedModel` traits
//! - [`lifecycle`]: lazy load, swap and unload of a provider's model
//! - [`router`]: selects the backend named in settings
//! - [`foundry`], [`phi_silica`]: concrete backends
//! - [`prompt`], [`variant`]: prompt rendering and hardware variant selection

pub mod backend;
pub mod error;
pub mod foundry;
pub mod lifecycle;
pub mod phi_silica;
pub mod prompt;
pub mod router;
pub mod variant;

pub use backend::{BackendStatus, LoadedModel, ModelProvider, ModelVariant, TranslationBackend};
pub use error::EngineError;
pub use foundry::FoundryLocalProvider;
pub use lifecycle::{LifecycleState, ModelHandle, ModelLifecycle};
pub use phi_silica::PhiSilicaBackend;
pub use prompt::Prompt;
pub use router::BackendRouter;

use std::sync::Arc;

use lingo_core::Settings;

/// Build the router with the production backends for `settings`.
pub fn router_from_settings(settings: &Settings) -> BackendRouter {
    let provider = Arc::new(FoundryLocalProvider::new(&settings.model.foundry_endpoint));
    let lifecycle = Arc::new(ModelLifecycle::from_settings(provider, settings));
    BackendRouter::new(settings.model.backend, Arc::new(PhiSilicaBackend::new()), lifecycle)
}
