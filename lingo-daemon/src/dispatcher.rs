//! Command dispatch and the shared daemon context.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use lingo_core::{settings, Settings};
use lingo_engine::BackendRouter;

use crate::http::HttpListener;
use crate::protocol::{ControlCommand, StatusReport};
use crate::server::CommandHandler;

/// Whatever presents the settings surface to the user.
pub trait UiSurface: Send + Sync {
    fn show(&self);
}

/// Used when no desktop surface is attached: `gui` is acknowledged in the log.
#[derive(Debug, Default)]
pub struct HeadlessUi;

impl UiSurface for HeadlessUi {
    fn show(&self) {
        tracing::info!("settings surface requested; no desktop surface attached, use `lingo config`");
    }
}

/// Everything the control server, HTTP listener, and shutdown path share.
/// Built once per daemon and passed around behind an `Arc`.
pub struct DaemonContext {
    pub home: PathBuf,
    pub router: Arc<BackendRouter>,
    pub ui: Arc<dyn UiSurface>,
    pub http: HttpListener,
    shutdown: broadcast::Sender<()>,
    settings: RwLock<Settings>,
}

impl DaemonContext {
    pub fn new(
        home: PathBuf,
        settings: Settings,
        router: Arc<BackendRouter>,
        ui: Arc<dyn UiSurface>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            home,
            router,
            ui,
            http: HttpListener::new(),
            shutdown,
            settings: RwLock::new(settings),
        }
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Start (or restart) the HTTP listener from the current settings.
    pub async fn restart_http(&self) {
        let service = self.settings.read().await.service.clone();
        self.http.start(&service, Arc::clone(&self.router)).await;
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    pub async fn status_report(&self) -> StatusReport {
        StatusReport::new(self.router.kind(), self.router.status().await)
    }

    /// Re-read settings from disk and push them to the backends and the
    /// HTTP listener. A failed read keeps the current settings.
    pub async fn reload(&self) {
        let home = self.home.clone();
        let loaded = match tokio::task::spawn_blocking(move || settings::load_at(&home)).await {
            Ok(Ok(settings)) => settings,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "reload failed; keeping current settings");
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "settings reload task failed");
                return;
            }
        };

        self.router.apply_settings(&loaded);
        *self.settings.write().await = loaded;
        self.restart_http().await;
        tracing::info!("settings reloaded");
    }

    pub async fn unload(&self) {
        match self.router.unload().await {
            Ok(true) => tracing::info!("model unloaded"),
            Ok(false) => tracing::debug!("unload requested with no model resident"),
            Err(err) => tracing::warn!(error = %err, "model unload failed"),
        }
    }
}

/// Routes control commands to [`DaemonContext`] operations.
pub struct CommandDispatcher {
    context: Arc<DaemonContext>,
}

impl CommandDispatcher {
    pub fn new(context: Arc<DaemonContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl CommandHandler for CommandDispatcher {
    async fn handle(&self, command: ControlCommand) -> Option<String> {
        match command {
            ControlCommand::Gui => {
                self.context.ui.show();
                None
            }
            ControlCommand::Quit => {
                tracing::info!("quit requested over control channel");
                self.context.request_shutdown();
                None
            }
            ControlCommand::Reload => {
                self.context.reload().await;
                None
            }
            ControlCommand::Unload => {
                self.context.unload().await;
                None
            }
            ControlCommand::Status => Some(self.context.status_report().await.to_text()),
        }
    }
}
