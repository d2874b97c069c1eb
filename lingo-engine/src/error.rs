//! Error types for lingo-engine.

use thiserror::Error;

/// All errors that can arise from backend operations.
///
/// Every variant is `Clone` so a single failed load can be handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Loading failed, the model is missing, or the hardware/driver is absent.
    #[error("backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// The load finished after the configuration it was started for had been
    /// invalidated; the freshly loaded model was torn down.
    #[error("load of {target} was superseded by a configuration change")]
    Superseded { target: String },

    /// A loaded model failed while translating.
    #[error("translation failed: {0}")]
    Translation(String),

    /// The prompt template could not be rendered.
    #[error("prompt template error: {0}")]
    Prompt(String),
}

impl EngineError {
    /// Convenience constructor for [`EngineError::BackendUnavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        EngineError::BackendUnavailable {
            reason: reason.into(),
        }
    }
}

impl From<tera::Error> for EngineError {
    fn from(err: tera::Error) -> Self {
        use std::error::Error as _;

        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        EngineError::Prompt(message)
    }
}
