//! Concurrency properties of `ModelLifecycle` against an in-memory provider.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lingo_core::{BackendConfig, BackendKind, DeviceKind, ExecutionStrategy, Settings};
use lingo_engine::{
    BackendRouter, BackendStatus, EngineError, LifecycleState, LoadedModel, ModelLifecycle,
    ModelProvider, ModelVariant, PhiSilicaBackend, TranslationBackend,
};

// ---------------------------------------------------------------------------
// Fake provider
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeProvider {
    events: Arc<Mutex<Vec<String>>>,
    loads: AtomicUsize,
    fail_loads: AtomicBool,
    load_delay: Duration,
    unload_delay: Duration,
}

impl FakeProvider {
    fn with_delays(load: Duration, unload: Duration) -> Self {
        Self {
            load_delay: load,
            unload_delay: unload,
            ..Self::default()
        }
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for FakeProvider {
    async fn variants(&self) -> Result<Vec<ModelVariant>, EngineError> {
        Ok(vec![
            ModelVariant {
                id: "phi-cpu".into(),
                alias: "phi".into(),
                device: Some(DeviceKind::Cpu),
            },
            ModelVariant {
                id: "phi-npu".into(),
                alias: "phi".into(),
                device: Some(DeviceKind::Npu),
            },
        ])
    }

    async fn load(&self, model_id: &str) -> Result<Arc<dyn LoadedModel>, EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("load {model_id}"));
        tokio::time::sleep(self.load_delay).await;
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(EngineError::unavailable(format!("cannot load {model_id}")));
        }
        Ok(Arc::new(FakeModel {
            id: model_id.to_string(),
            events: Arc::clone(&self.events),
            unload_delay: self.unload_delay,
        }))
    }

    async fn inspect(&self, _config: &BackendConfig) -> BackendStatus {
        BackendStatus::not_ready("idle")
    }
}

struct FakeModel {
    id: String,
    events: Arc<Mutex<Vec<String>>>,
    unload_delay: Duration,
}

#[async_trait]
impl LoadedModel for FakeModel {
    fn model_id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, prompt: &str) -> Result<String, EngineError> {
        Ok(format!("{}|{prompt}", self.id))
    }

    async fn unload(&self) -> Result<(), EngineError> {
        tokio::time::sleep(self.unload_delay).await;
        self.events.lock().unwrap().push(format!("unload {}", self.id));
        Ok(())
    }
}

/// Loads on the blocking pool, like the Foundry Local REST client, and counts
/// how many loads overlap.
#[derive(Default)]
struct BlockingProvider {
    loads: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

#[async_trait]
impl ModelProvider for BlockingProvider {
    async fn variants(&self) -> Result<Vec<ModelVariant>, EngineError> {
        Ok(Vec::new())
    }

    async fn load(&self, model_id: &str) -> Result<Arc<dyn LoadedModel>, EngineError> {
        let (loads, active, max_active) = (
            Arc::clone(&self.loads),
            Arc::clone(&self.active),
            Arc::clone(&self.max_active),
        );
        tokio::task::spawn_blocking(move || {
            loads.fetch_add(1, Ordering::SeqCst);
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
            active.fetch_sub(1, Ordering::SeqCst);
        })
        .await
        .map_err(|e| EngineError::unavailable(e.to_string()))?;

        Ok(Arc::new(FakeModel {
            id: model_id.to_string(),
            events: Arc::default(),
            unload_delay: Duration::ZERO,
        }))
    }

    async fn inspect(&self, _config: &BackendConfig) -> BackendStatus {
        BackendStatus::not_ready("idle")
    }
}

fn config(alias: &str) -> BackendConfig {
    BackendConfig {
        kind: BackendKind::FoundryLocal,
        model_alias: alias.to_string(),
        strategy: ExecutionStrategy::HighPerformance,
        manual_device: DeviceKind::Cpu,
    }
}

fn lifecycle(provider: &Arc<FakeProvider>, alias: &str) -> Arc<ModelLifecycle> {
    Arc::new(ModelLifecycle::new(
        Arc::clone(provider) as Arc<dyn ModelProvider>,
        config(alias),
    ))
}

/// Records every distinct state until `done` is set.
fn spawn_state_recorder(
    lifecycle: Arc<ModelLifecycle>,
    done: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<Vec<LifecycleState>> {
    let first = lifecycle.state();
    tokio::spawn(async move {
        let mut seen: Vec<LifecycleState> = vec![first];
        while !done.load(Ordering::SeqCst) {
            let state = lifecycle.state();
            if seen.last() != Some(&state) {
                seen.push(state);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let last = lifecycle.state();
        if seen.last() != Some(&last) {
            seen.push(last);
        }
        seen
    })
}

// ---------------------------------------------------------------------------
// Load idempotence
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_load() {
    let provider = Arc::new(FakeProvider::with_delays(Duration::from_millis(100), Duration::ZERO));
    let lifecycle = lifecycle(&provider, "a");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.ensure_loaded(&config("a")).await })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().expect("load succeeds"));
    }

    assert_eq!(provider.loads.load(Ordering::SeqCst), 1);
    assert!(handles.windows(2).all(|w| w[0].same_model(&w[1])));
    assert_eq!(
        lifecycle.state(),
        LifecycleState::Ready {
            config: config("a"),
            model_id: "a".into()
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_failure() {
    let provider = Arc::new(FakeProvider::with_delays(Duration::from_millis(100), Duration::ZERO));
    provider.fail_loads.store(true, Ordering::SeqCst);
    let lifecycle = lifecycle(&provider, "a");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.ensure_loaded(&config("a")).await })
        })
        .collect();

    let mut errors = Vec::new();
    for task in tasks {
        errors.push(task.await.unwrap().expect_err("load fails"));
    }

    assert_eq!(provider.loads.load(Ordering::SeqCst), 1, "waiters must not retry");
    assert!(errors.iter().all(|e| *e == errors[0]));
    assert!(matches!(errors[0], EngineError::BackendUnavailable { .. }));
    assert_eq!(lifecycle.state(), LifecycleState::Unloaded);

    // A caller arriving after the failure retries.
    provider.fail_loads.store(false, Ordering::SeqCst);
    lifecycle.ensure_loaded(&config("a")).await.expect("retry succeeds");
    assert_eq!(provider.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unchanged_config_is_not_reloaded() {
    let provider = Arc::new(FakeProvider::default());
    let lifecycle = lifecycle(&provider, "a");

    let first = lifecycle.ensure_loaded(&config("a")).await.unwrap();
    let second = lifecycle.ensure_loaded(&config("a")).await.unwrap();

    assert!(first.same_model(&second));
    assert_eq!(provider.events(), vec!["load a"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_caller_does_not_abandon_its_load() {
    let provider = Arc::new(BlockingProvider::default());
    let lifecycle = Arc::new(ModelLifecycle::new(
        Arc::clone(&provider) as Arc<dyn ModelProvider>,
        config("a"),
    ));

    let gave_up = tokio::time::timeout(
        Duration::from_millis(50),
        lifecycle.translate("hi", "en", "de"),
    )
    .await;
    assert!(gave_up.is_err(), "load should still be running");
    assert!(matches!(lifecycle.state(), LifecycleState::Loading { .. }));

    let out = lifecycle.translate("hi", "en", "de").await.expect("second caller joins the load");
    assert!(out.starts_with("a|"), "{out}");

    assert_eq!(provider.loads.load(Ordering::SeqCst), 1);
    assert_eq!(provider.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(
        lifecycle.state(),
        LifecycleState::Ready {
            config: config("a"),
            model_id: "a".into()
        }
    );
    assert!(lifecycle.status().await.ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn load_finishes_after_its_only_caller_is_dropped() {
    let provider = Arc::new(BlockingProvider::default());
    let lifecycle = Arc::new(ModelLifecycle::new(
        Arc::clone(&provider) as Arc<dyn ModelProvider>,
        config("a"),
    ));

    let _ = tokio::time::timeout(Duration::from_millis(50), lifecycle.ensure_loaded(&config("a"))).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(matches!(lifecycle.state(), LifecycleState::Ready { .. }));
    assert_eq!(lifecycle.status().await.message, "Model loaded: a");
}

// ---------------------------------------------------------------------------
// Reload correctness
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn config_switch_unloads_old_before_new_is_ready() {
    let provider = Arc::new(FakeProvider::with_delays(
        Duration::from_millis(30),
        Duration::from_millis(30),
    ));
    let lifecycle = lifecycle(&provider, "a");
    lifecycle.ensure_loaded(&config("a")).await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let recorder = spawn_state_recorder(Arc::clone(&lifecycle), Arc::clone(&done));

    let handle = lifecycle.ensure_loaded(&config("b")).await.unwrap();
    assert_eq!(handle.model_id(), "b");
    done.store(true, Ordering::SeqCst);
    let states = recorder.await.unwrap();

    assert_eq!(provider.events(), vec!["load a", "unload a", "load b"]);

    let ready_a = |s: &LifecycleState| matches!(s, LifecycleState::Ready { model_id, .. } if model_id == "a");
    let ready_b = |s: &LifecycleState| matches!(s, LifecycleState::Ready { model_id, .. } if model_id == "b");
    let last_a = states.iter().rposition(ready_a).expect("started ready on a");
    let first_b = states.iter().position(ready_b).expect("ended ready on b");
    assert!(last_a < first_b);
    assert!(
        states[last_a + 1..first_b]
            .iter()
            .all(|s| !matches!(s, LifecycleState::Ready { .. })),
        "no ready state between the two models: {states:?}"
    );
}

#[tokio::test]
async fn status_never_reports_ready_for_stale_config() {
    let provider = Arc::new(FakeProvider::default());
    let lifecycle = lifecycle(&provider, "a");
    lifecycle.ensure_loaded(&config("a")).await.unwrap();

    let status = lifecycle.status().await;
    assert!(status.ready);
    assert_eq!(status.message, "Model loaded: a");

    assert!(lifecycle.set_desired(config("b")));
    let status = lifecycle.status().await;
    assert!(!status.ready, "stale model must not be reported: {status:?}");
    assert_eq!(status.message, "idle");
}

#[tokio::test]
async fn invalidate_tears_down_stale_model_in_background() {
    let provider = Arc::new(FakeProvider::default());
    let lifecycle = lifecycle(&provider, "a");
    lifecycle.ensure_loaded(&config("a")).await.unwrap();

    let teardown = lifecycle.invalidate().expect("inside a runtime");
    teardown.await.unwrap();

    assert_eq!(lifecycle.state(), LifecycleState::Unloaded);
    assert_eq!(provider.events(), vec!["load a", "unload a"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalidate_during_load_discards_the_new_model() {
    let provider = Arc::new(FakeProvider::with_delays(Duration::from_millis(150), Duration::ZERO));
    let lifecycle = lifecycle(&provider, "a");

    let loading = {
        let lifecycle = Arc::clone(&lifecycle);
        tokio::spawn(async move { lifecycle.ensure_loaded(&config("a")).await })
    };
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(matches!(lifecycle.state(), LifecycleState::Loading { .. }));

    let teardown = lifecycle.invalidate().expect("inside a runtime");
    let err = loading.await.unwrap().expect_err("superseded");
    assert!(matches!(err, EngineError::Superseded { .. }), "got {err:?}");
    teardown.await.unwrap();

    assert_eq!(lifecycle.state(), LifecycleState::Unloaded);
    assert_eq!(provider.events(), vec!["load a", "unload a"]);
}

// ---------------------------------------------------------------------------
// Unload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unload_then_reload() {
    let provider = Arc::new(FakeProvider::default());
    let lifecycle = lifecycle(&provider, "a");

    let first = lifecycle.ensure_loaded(&config("a")).await.unwrap();
    assert!(lifecycle.unload().await.unwrap());
    assert_eq!(lifecycle.state(), LifecycleState::Unloaded);
    assert!(!lifecycle.unload().await.unwrap(), "second unload is a no-op");

    let second = lifecycle.ensure_loaded(&config("a")).await.unwrap();
    assert!(!first.same_model(&second));
    assert_eq!(provider.events(), vec!["load a", "unload a", "load a"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unload_then_reload_shows_no_partial_state_to_status() {
    let provider = Arc::new(FakeProvider::with_delays(
        Duration::from_millis(40),
        Duration::from_millis(40),
    ));
    let lifecycle = lifecycle(&provider, "a");
    lifecycle.ensure_loaded(&config("a")).await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let recorder = spawn_state_recorder(Arc::clone(&lifecycle), Arc::clone(&done));
    let poller = {
        let lifecycle = Arc::clone(&lifecycle);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while !done.load(Ordering::SeqCst) {
                seen.push(lifecycle.status().await);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            seen
        })
    };

    assert!(lifecycle.unload().await.unwrap());
    let handle = lifecycle.ensure_loaded(&config("a")).await.unwrap();
    assert_eq!(handle.model_id(), "a");
    done.store(true, Ordering::SeqCst);
    let states = recorder.await.unwrap();
    let statuses = poller.await.unwrap();

    let ready_a = LifecycleState::Ready {
        config: config("a"),
        model_id: "a".into(),
    };
    let expected = [
        ready_a.clone(),
        LifecycleState::Unloading { config: config("a") },
        LifecycleState::Unloaded,
        LifecycleState::Loading { config: config("a") },
        ready_a.clone(),
    ];
    let mut rest = expected.iter();
    for state in &states {
        assert!(
            rest.any(|e| e == state),
            "unexpected state order: {states:?}"
        );
    }
    assert_eq!(states.first(), Some(&ready_a));
    assert_eq!(states.last(), Some(&ready_a));
    assert!(states.contains(&expected[1]), "{states:?}");
    assert!(states.contains(&expected[3]), "{states:?}");

    assert!(!statuses.is_empty());
    for status in &statuses {
        if status.ready {
            assert_eq!(status.message, "Model loaded: a");
        } else {
            assert!(
                ["Unloading previous model", "Loading model a", "idle"].contains(&status.message.as_str()),
                "unexpected status {status:?}"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Translation path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn translate_loads_lazily_with_rendered_prompt() {
    let provider = Arc::new(FakeProvider::default());
    let lifecycle = lifecycle(&provider, "a");
    assert_eq!(lifecycle.state(), LifecycleState::Unloaded);

    let out = lifecycle.translate("hola", "es", "en").await.unwrap();
    assert!(out.starts_with("a|Translate the following text from Spanish to English."));
    assert!(out.ends_with("\n\nhola"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn translate_reports_unavailable_when_config_keeps_changing() {
    let provider = Arc::new(FakeProvider::with_delays(Duration::from_millis(30), Duration::ZERO));
    let lifecycle = lifecycle(&provider, "a");

    let stop = Arc::new(AtomicBool::new(false));
    let churn = {
        let lifecycle = Arc::clone(&lifecycle);
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            while !stop.load(Ordering::SeqCst) {
                let _ = lifecycle.invalidate();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    let err = lifecycle.translate("hi", "en", "de").await.unwrap_err();
    stop.store(true, Ordering::SeqCst);
    churn.await.unwrap();

    assert!(matches!(err, EngineError::BackendUnavailable { .. }), "got {err:?}");
    assert_eq!(provider.loads.load(Ordering::SeqCst), 2, "one retry only");
}

#[tokio::test]
async fn power_saving_loads_cpu_variant() {
    let provider = Arc::new(FakeProvider::default());
    let lifecycle = lifecycle(&provider, "phi");
    let mut cfg = config("phi");
    cfg.strategy = ExecutionStrategy::PowerSaving;
    lifecycle.set_desired(cfg);

    lifecycle.translate("x", "en", "de").await.unwrap();
    assert!(provider.events().contains(&"load phi-cpu".to_string()));
}

#[tokio::test]
async fn router_switches_backend_on_settings() {
    let provider = Arc::new(FakeProvider::default());
    let mut settings = Settings::default();
    settings.model.model_alias = "a".into();
    let router = BackendRouter::new(
        BackendKind::FoundryLocal,
        Arc::new(PhiSilicaBackend::new()),
        Arc::new(ModelLifecycle::from_settings(
            Arc::clone(&provider) as Arc<dyn ModelProvider>,
            &settings,
        )),
    );

    assert!(router.translate("hi", "en", "fr").await.is_ok());

    settings.model.backend = BackendKind::PhiSilica;
    router.apply_settings(&settings);
    assert_eq!(router.kind(), BackendKind::PhiSilica);
    let err = router.translate("hi", "en", "fr").await.unwrap_err();
    assert!(matches!(err, EngineError::BackendUnavailable { .. }));
    assert!(!router.status().await.ready);

    // Switching away invalidated the foundry model; either path leaves it unloaded.
    router.unload().await.unwrap();
    assert_eq!(router.lifecycle().state(), LifecycleState::Unloaded);
}
