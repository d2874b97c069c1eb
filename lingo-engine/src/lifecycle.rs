//! Model lifecycle management.
//!
//! [`ModelLifecycle`] owns at most one loaded model and moves it through
//! `Unloaded -> Loading -> Ready -> Unloading -> Unloaded`.
//!
//! # Concurrency
//!
//! - Every transition runs under a single async mutex (the load gate), so
//!   at most one load or unload is in flight and a new load only starts once
//!   the previous unload has finished.
//! - Gated work runs on a spawned task that owns the shared state; dropping
//!   a waiting caller does not cancel the load or unload it started.
//! - Callers that queue behind an in-flight load re-check the slot once they
//!   hold the gate: they reuse the model it produced, or receive the same
//!   error if it failed, instead of starting a second load.
//! - [`ModelLifecycle::invalidate`] bumps an epoch counter and returns
//!   immediately. A load that completes under an older epoch tears its model
//!   down and reports [`EngineError::Superseded`]; a `Ready` slot from an older
//!   epoch is never handed out or reported as ready. `translate` retries once
//!   and then reports the backend as unavailable.
//! - The slot snapshot lives behind a std lock that is never held across an
//!   `.await`.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use lingo_core::{BackendConfig, Settings};

use crate::backend::{BackendStatus, LoadedModel, ModelProvider, TranslationBackend};
use crate::error::EngineError;
use crate::prompt::Prompt;
use crate::variant;

/// Observable lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Unloaded,
    Loading { config: BackendConfig },
    Ready { config: BackendConfig, model_id: String },
    Unloading { config: BackendConfig },
}

/// A loaded model together with the configuration it was loaded for.
#[derive(Clone)]
pub struct ModelHandle {
    model: Arc<dyn LoadedModel>,
    config: BackendConfig,
}

impl ModelHandle {
    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// `true` when both handles refer to the same loaded instance.
    pub fn same_model(&self, other: &ModelHandle) -> bool {
        Arc::as_ptr(&self.model) as *const u8 == Arc::as_ptr(&other.model) as *const u8
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, EngineError> {
        self.model.complete(prompt).await
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_id", &self.model.model_id())
            .field("config", &self.config)
            .finish()
    }
}

struct LoadedSlot {
    model: Arc<dyn LoadedModel>,
    config: BackendConfig,
    epoch: u64,
}

enum Slot {
    Unloaded,
    Loading { config: BackendConfig },
    Ready(LoadedSlot),
    Unloading { config: BackendConfig },
}

impl Slot {
    fn snapshot(&self) -> LifecycleState {
        match self {
            Slot::Unloaded => LifecycleState::Unloaded,
            Slot::Loading { config } => LifecycleState::Loading {
                config: config.clone(),
            },
            Slot::Ready(loaded) => LifecycleState::Ready {
                config: loaded.config.clone(),
                model_id: loaded.model.model_id().to_string(),
            },
            Slot::Unloading { config } => LifecycleState::Unloading {
                config: config.clone(),
            },
        }
    }
}

/// Outcome of the most recent failed load, shared with callers that were
/// queued behind it.
struct LoadFailure {
    /// Value of the completion counter when the attempt finished.
    index: u64,
    config: BackendConfig,
    epoch: u64,
    error: EngineError,
}

#[derive(Clone)]
enum Target {
    /// Whatever configuration is desired when the gate is acquired.
    Current,
    Exactly(BackendConfig),
}

/// Lazily loads, swaps and unloads the model of a [`ModelProvider`].
///
/// Gated work (load, swap, unload) runs on its own Tokio task. A caller that
/// is dropped while waiting, such as an HTTP request whose client went away,
/// never leaves a transition half done.
pub struct ModelLifecycle {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn ModelProvider>,
    desired: RwLock<BackendConfig>,
    prompt: RwLock<Prompt>,
    slot: RwLock<Slot>,
    gate: tokio::sync::Mutex<()>,
    epoch: AtomicU64,
    /// Number of load attempts that have finished, successfully or not.
    finished: AtomicU64,
    last_failure: Mutex<Option<LoadFailure>>,
}

impl ModelLifecycle {
    pub fn new(provider: Arc<dyn ModelProvider>, config: BackendConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                desired: RwLock::new(config),
                prompt: RwLock::new(Prompt::default()),
                slot: RwLock::new(Slot::Unloaded),
                gate: tokio::sync::Mutex::new(()),
                epoch: AtomicU64::new(0),
                finished: AtomicU64::new(0),
                last_failure: Mutex::new(None),
            }),
        }
    }

    /// Build from a settings document: desired config plus prompt template.
    pub fn from_settings(provider: Arc<dyn ModelProvider>, settings: &Settings) -> Self {
        let lifecycle = Self::new(provider, settings.backend_config());
        *write(&lifecycle.inner.prompt) = Prompt::new(settings.model.prompt_template.as_deref());
        lifecycle
    }

    pub fn state(&self) -> LifecycleState {
        read(&self.inner.slot).snapshot()
    }

    pub fn desired_config(&self) -> BackendConfig {
        self.inner.desired_config()
    }

    /// Replace the desired configuration. Invalidates and returns `true` when
    /// it differs from the current one.
    pub fn set_desired(&self, config: BackendConfig) -> bool {
        let changed = {
            let mut desired = write(&self.inner.desired);
            if *desired == config {
                false
            } else {
                *desired = config;
                true
            }
        };
        if changed {
            self.invalidate();
        }
        changed
    }

    /// Apply reloaded settings: prompt, provider options and desired config.
    /// Returns `true` when the loaded model (if any) was invalidated.
    pub fn reconfigure(&self, settings: &Settings) -> bool {
        *write(&self.inner.prompt) = Prompt::new(settings.model.prompt_template.as_deref());
        let provider_changed = self.inner.provider.reconfigure(&settings.model);
        let config_changed = self.set_desired(settings.backend_config());
        if provider_changed && !config_changed {
            self.invalidate();
        }
        provider_changed || config_changed
    }

    /// Mark the current model stale and schedule its teardown.
    ///
    /// Never blocks. The returned handle resolves once the teardown task has
    /// run; it is `None` outside a Tokio runtime, in which case the stale
    /// model is torn down by the next transition instead.
    pub fn invalidate(&self) -> Option<JoinHandle<()>> {
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(epoch, "backend invalidated");

        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let inner = Arc::clone(&self.inner);
        Some(runtime.spawn(async move {
            let _gate = inner.gate.lock().await;
            let stale = matches!(&*read(&inner.slot), Slot::Ready(loaded) if loaded.epoch < epoch);
            if stale {
                if let Err(err) = inner.teardown().await {
                    tracing::warn!(error = %err, "unloading stale model failed");
                }
            }
        }))
    }

    /// Return a ready handle for `config`, loading it if needed.
    pub async fn ensure_loaded(&self, config: &BackendConfig) -> Result<ModelHandle, EngineError> {
        self.acquire(Target::Exactly(config.clone())).await
    }

    /// Return a ready handle for the desired configuration.
    pub async fn ensure_current(&self) -> Result<ModelHandle, EngineError> {
        self.acquire(Target::Current).await
    }

    /// Unload the current model and wait for the teardown to finish.
    /// Returns `true` when something was unloaded.
    pub async fn unload(&self) -> Result<bool, EngineError> {
        let inner = Arc::clone(&self.inner);
        detached(async move {
            let _gate = inner.gate.lock().await;
            *lock(&inner.last_failure) = None;
            inner.teardown().await
        })
        .await
    }

    async fn acquire(&self, target: Target) -> Result<ModelHandle, EngineError> {
        let seen = self.inner.finished.load(Ordering::SeqCst);
        if let Some(handle) = self.inner.ready_handle(&self.inner.resolve(&target)) {
            return Ok(handle);
        }

        let inner = Arc::clone(&self.inner);
        detached(async move { inner.acquire_gated(target, seen).await }).await
    }
}

/// Run gated work on its own task so it completes even if the caller is
/// dropped mid-await.
async fn detached<T, F>(work: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .unwrap_or_else(|err| Err(EngineError::unavailable(format!("model lifecycle task failed: {err}"))))
}

impl Inner {
    fn desired_config(&self) -> BackendConfig {
        read(&self.desired).clone()
    }

    async fn acquire_gated(&self, target: Target, seen: u64) -> Result<ModelHandle, EngineError> {
        let _gate = self.gate.lock().await;
        let config = self.resolve(&target);
        let epoch = self.epoch.load(Ordering::SeqCst);

        if let Some(handle) = self.ready_handle(&config) {
            return Ok(handle);
        }
        if let Some(err) = self.shared_failure(&config, seen, epoch) {
            return Err(err);
        }
        self.transition(config, epoch).await
    }

    fn resolve(&self, target: &Target) -> BackendConfig {
        match target {
            Target::Current => self.desired_config(),
            Target::Exactly(config) => config.clone(),
        }
    }

    fn ready_handle(&self, config: &BackendConfig) -> Option<ModelHandle> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        match &*read(&self.slot) {
            Slot::Ready(loaded) if loaded.config == *config && loaded.epoch == epoch => {
                Some(ModelHandle {
                    model: Arc::clone(&loaded.model),
                    config: loaded.config.clone(),
                })
            }
            _ => None,
        }
    }

    /// The error of a load that finished after this caller started waiting,
    /// for the same config and epoch.
    fn shared_failure(&self, config: &BackendConfig, seen: u64, epoch: u64) -> Option<EngineError> {
        match &*lock(&self.last_failure) {
            Some(failure)
                if failure.index >= seen && failure.epoch == epoch && failure.config == *config =>
            {
                Some(failure.error.clone())
            }
            _ => None,
        }
    }

    /// Must be called with the gate held.
    async fn transition(&self, config: BackendConfig, epoch: u64) -> Result<ModelHandle, EngineError> {
        if let Err(err) = self.teardown().await {
            tracing::warn!(error = %err, "unloading previous model failed");
        }

        tracing::info!(config = %config, "loading model");
        self.set_slot(Slot::Loading {
            config: config.clone(),
        });
        let outcome = self.load(&config).await;
        let index = self.finished.fetch_add(1, Ordering::SeqCst);

        match outcome {
            Ok(model) if self.epoch.load(Ordering::SeqCst) != epoch => {
                tracing::info!(config = %config, "configuration changed during load; discarding model");
                self.set_slot(Slot::Unloading {
                    config: config.clone(),
                });
                if let Err(err) = model.unload().await {
                    tracing::warn!(error = %err, "unloading superseded model failed");
                }
                self.set_slot(Slot::Unloaded);
                Err(EngineError::Superseded {
                    target: config.to_string(),
                })
            }
            Ok(model) => {
                tracing::info!(model_id = model.model_id(), "model ready");
                *lock(&self.last_failure) = None;
                self.set_slot(Slot::Ready(LoadedSlot {
                    model: Arc::clone(&model),
                    config: config.clone(),
                    epoch,
                }));
                Ok(ModelHandle { model, config })
            }
            Err(err) => {
                tracing::warn!(config = %config, error = %err, "model load failed");
                self.set_slot(Slot::Unloaded);
                *lock(&self.last_failure) = Some(LoadFailure {
                    index,
                    config,
                    epoch,
                    error: err.clone(),
                });
                Err(err)
            }
        }
    }

    async fn load(&self, config: &BackendConfig) -> Result<Arc<dyn LoadedModel>, EngineError> {
        let model_id = match variant::target_device(config) {
            None => config.model_alias.clone(),
            Some(_) => {
                let variants = self.provider.variants().await?;
                variant::resolve_model_id(&variants, config)
            }
        };
        tracing::debug!(model_id = %model_id, "resolved model variant");
        self.provider.load(&model_id).await
    }

    /// Must be called with the gate held.
    async fn teardown(&self) -> Result<bool, EngineError> {
        let loaded = {
            let mut slot = write(&self.slot);
            let previous = std::mem::replace(&mut *slot, Slot::Unloaded);
            match previous {
                Slot::Ready(loaded) => {
                    *slot = Slot::Unloading {
                        config: loaded.config.clone(),
                    };
                    Some(loaded)
                }
                other => {
                    *slot = other;
                    None
                }
            }
        };
        let Some(loaded) = loaded else {
            return Ok(false);
        };

        tracing::info!(model_id = loaded.model.model_id(), "unloading model");
        let result = loaded.model.unload().await;
        self.set_slot(Slot::Unloaded);
        result.map(|()| true)
    }

    fn set_slot(&self, slot: Slot) {
        *write(&self.slot) = slot;
    }

    fn local_status(&self) -> Option<BackendStatus> {
        let desired = self.desired_config();
        let epoch = self.epoch.load(Ordering::SeqCst);
        match &*read(&self.slot) {
            Slot::Ready(loaded) if loaded.config == desired && loaded.epoch == epoch => Some(
                BackendStatus::ready(format!("Model loaded: {}", loaded.model.model_id())),
            ),
            Slot::Loading { config } => Some(
                BackendStatus::not_ready(format!("Loading model {}", config.model_alias))
                    .with_detail("Translation requests wait for the load to finish"),
            ),
            Slot::Unloading { .. } => Some(BackendStatus::not_ready("Unloading previous model")),
            _ => None,
        }
    }
}

#[async_trait]
impl TranslationBackend for ModelLifecycle {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, EngineError> {
        let prompt = read(&self.inner.prompt).render(text, source_lang, target_lang)?;

        let mut retried = false;
        loop {
            match self.ensure_current().await {
                Ok(handle) => return handle.complete(&prompt).await,
                Err(EngineError::Superseded { .. }) if !retried => retried = true,
                Err(EngineError::Superseded { target }) => {
                    return Err(EngineError::unavailable(format!(
                        "configuration kept changing while loading {target}"
                    )))
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Ready only for the desired config under the current epoch; otherwise a
    /// provider inspection that never loads.
    async fn status(&self) -> BackendStatus {
        if let Some(status) = self.inner.local_status() {
            return status;
        }
        let desired = self.desired_config();
        self.inner.provider.inspect(&desired).await
    }
}

// ---------------------------------------------------------------------------
// Lock helpers: a poisoned lock still holds consistent data here since every
// write replaces the whole value.
// ---------------------------------------------------------------------------

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
