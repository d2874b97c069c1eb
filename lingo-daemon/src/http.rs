//! Loopback HTTP listener.
//!
//! | route             | body                                            |
//! |-------------------|-------------------------------------------------|
//! | `GET  /status`    | `StatusReport` as JSON                          |
//! | `POST /translate` | `{text, source_lang?, target_lang}` -> `{text}` |
//!
//! When `service.api_key` is set, every request must carry it as
//! `Authorization: Bearer <key>` or `X-Api-Key: <key>`.
//!
//! Stopping waits at most [`SHUTDOWN_GRACE`] for in-flight requests; a
//! translation still waiting on a model download is cut off after that.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use lingo_core::ServiceSettings;
use lingo_engine::{BackendRouter, EngineError};

use crate::protocol::StatusReport;

#[derive(Clone)]
struct HttpState {
    router: Arc<BackendRouter>,
    api_key: Option<Arc<str>>,
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default)]
    pub source_lang: Option<String>,
    pub target_lang: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn routes(state: HttpState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/translate", post(translate))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

async fn status(State(state): State<HttpState>) -> Json<StatusReport> {
    Json(StatusReport::new(state.router.kind(), state.router.status().await))
}

async fn translate(State(state): State<HttpState>, Json(request): Json<TranslateRequest>) -> Response {
    if request.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text must not be empty");
    }
    let source = request.source_lang.as_deref().unwrap_or("auto");

    match state
        .router
        .translate(&request.text, source, &request.target_lang)
        .await
    {
        Ok(text) => Json(TranslateResponse { text }).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "http translation failed");
            let status = match err {
                EngineError::BackendUnavailable { .. } | EngineError::Superseded { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                EngineError::Translation(_) => StatusCode::BAD_GATEWAY,
                EngineError::Prompt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, err.to_string())
        }
    }
}

async fn require_api_key(State(state): State<HttpState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };
    match presented_key(request.headers()) {
        Some(key) if key == expected => next.run(request).await,
        _ => error_response(StatusCode::UNAUTHORIZED, "missing or invalid API key"),
    }
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);
    bearer.or_else(|| {
        headers
            .get("x-api-key")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
    })
}

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// How long a stop or restart waits for in-flight requests.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns the listener task so reloads can restart it on a new port or key.
pub struct HttpListener {
    running: Mutex<Option<Running>>,
    grace: Duration,
}

impl Default for HttpListener {
    fn default() -> Self {
        Self {
            running: Mutex::new(None),
            grace: SHUTDOWN_GRACE,
        }
    }
}

impl HttpListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// (Re)start on `127.0.0.1:<service.port>`. A bind failure is logged and
    /// leaves the listener stopped; the control channel is unaffected.
    pub async fn start(&self, service: &ServiceSettings, router: Arc<BackendRouter>) -> Option<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            shut_down(previous, self.grace).await;
        }

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, service.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::warn!(addr = %addr, error = %err, "http listener disabled: bind failed");
                return None;
            }
        };
        let addr = listener.local_addr().unwrap_or(addr);

        let state = HttpState {
            router,
            api_key: service
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(Arc::from),
        };
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, routes(state))
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = served {
                tracing::error!(error = %err, "http listener failed");
            }
        });

        tracing::info!(addr = %addr, "http listener started");
        *running = Some(Running {
            addr,
            shutdown,
            task,
        });
        Some(addr)
    }

    pub async fn stop(&self) {
        let running = self.running.lock().await.take();
        if let Some(running) = running {
            shut_down(running, self.grace).await;
        }
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.addr)
    }
}

async fn shut_down(running: Running, grace: Duration) {
    let Running {
        addr,
        shutdown,
        mut task,
    } = running;
    let _ = shutdown.send(());
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!(error = %err, "http listener task failed"),
        Err(_) => {
            tracing::warn!(addr = %addr, grace_ms = grace.as_millis() as u64, "in-flight http requests did not finish; aborting listener");
            task.abort();
        }
    }
    tracing::info!(addr = %addr, "http listener stopped");
}
