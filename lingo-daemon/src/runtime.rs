use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use lingo_core::{settings, Settings};
use lingo_engine::BackendRouter;

use crate::dispatcher::{CommandDispatcher, DaemonContext, HeadlessUi, UiSurface};
use crate::error::{io_err, DaemonError};
use crate::instance_lock::InstanceLock;
use crate::log_rotation::{self, RotationPolicy};
use crate::paths::{logs_dir, run_dir};
use crate::server::ControlServer;

/// How long shutdown waits for the model to unload.
pub const UNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the runtime may spend finishing tasks once `run` has returned.
/// Blocking backend calls still running after that are left behind so the
/// lock is released promptly.
pub const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Startup switches from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaemonOptions {
    /// Present the settings surface once the daemon is up.
    pub show_window: bool,
    /// Force debug-level logging regardless of settings.
    pub debug_log: bool,
}

/// Run the daemon on a fresh multi-threaded runtime and block until it
/// exits. `lock` is held for the daemon's whole life and released last.
pub fn start_blocking(home: &Path, lock: InstanceLock, options: DaemonOptions) -> Result<(), DaemonError> {
    let (settings, settings_error) = match settings::load_at(home) {
        Ok(settings) => (settings, None),
        Err(err) => (Settings::default(), Some(err)),
    };
    init_tracing(options.debug_log || settings.general.debug_log);
    if let Some(err) = settings_error {
        tracing::warn!(error = %err, "settings unreadable; starting with defaults");
    }
    tracing::debug!(lock = %lock.path().display(), "instance lock acquired");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    let router = Arc::new(lingo_engine::router_from_settings(&settings));
    let result = runtime.block_on(run(
        home.to_path_buf(),
        settings,
        router,
        Arc::new(HeadlessUi),
        options,
    ));

    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    drop(lock);
    result
}

/// Run the daemon until `quit` or ctrl-c, then shut down in order:
/// control server (drained) -> HTTP listener -> model.
pub async fn run(
    home: PathBuf,
    settings: Settings,
    router: Arc<BackendRouter>,
    ui: Arc<dyn UiSurface>,
    options: DaemonOptions,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let mut shutdown_rx = shutdown_tx.subscribe();

    let context = Arc::new(DaemonContext::new(
        home.clone(),
        settings,
        router,
        ui,
        shutdown_tx.clone(),
    ));
    context.restart_http().await;

    let server = match ControlServer::bind(&home, Arc::new(CommandDispatcher::new(Arc::clone(&context)))).await {
        Ok(server) => server,
        Err(err) => {
            context.http.stop().await;
            return Err(err);
        }
    };

    let rotation = tokio::spawn(log_rotation::run_rotation(
        home.clone(),
        RotationPolicy::default(),
        shutdown_tx.subscribe(),
    ));

    tracing::info!(backend = %context.router.kind(), "lingo daemon started");
    if options.show_window {
        context.ui.show();
    }

    tokio::select! {
        _ = shutdown_rx.recv() => {}
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => tracing::info!("received ctrl-c, shutting down daemon"),
            Err(err) => tracing::error!(error = %err, "ctrl-c handler failed; shutting down"),
        },
    }

    server.stop().await;
    context.http.stop().await;
    if tokio::time::timeout(UNLOAD_TIMEOUT, context.unload()).await.is_err() {
        tracing::warn!("model unload did not finish in time; exiting anyway");
    }
    context.request_shutdown();
    handle_join("log_rotation", rotation.await)?;

    tracing::info!("lingo daemon stopped");
    Ok(())
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    settings::ensure_root_at(home)?;
    for dir in [run_dir(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

fn handle_join(task: &str, result: Result<(), tokio::task::JoinError>) -> Result<(), DaemonError> {
    result.map_err(|err| DaemonError::Protocol(format!("{task} task join failure: {err}")))
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` when requested.
fn init_tracing(debug: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
