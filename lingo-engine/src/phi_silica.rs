//! Phi Silica backend.
//!
//! Phi Silica is the on-device language model shipped with the Windows AI
//! runtime on NPU-equipped machines. No such runtime exists on the platforms
//! this daemon targets, so the backend reports itself unavailable and fails
//! every translation with a reason the user can act on.

use async_trait::async_trait;

use crate::backend::{BackendStatus, TranslationBackend};
use crate::error::EngineError;

const UNAVAILABLE: &str = "Phi Silica is not available on this system";
const HINT: &str =
    "Requires the Windows AI runtime on an NPU-equipped PC; use `lingo config model --backend foundry-local`";

#[derive(Debug, Default)]
pub struct PhiSilicaBackend;

impl PhiSilicaBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TranslationBackend for PhiSilicaBackend {
    async fn translate(
        &self,
        _text: &str,
        _source_lang: &str,
        _target_lang: &str,
    ) -> Result<String, EngineError> {
        Err(EngineError::unavailable(UNAVAILABLE))
    }

    async fn status(&self) -> BackendStatus {
        BackendStatus::not_ready(UNAVAILABLE).with_detail(HINT)
    }
}
