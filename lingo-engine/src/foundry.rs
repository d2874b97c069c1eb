//! Foundry Local provider.
//!
//! Talks to the Foundry Local service over its local REST API:
//!
//! | purpose          | request                          |
//! |------------------|----------------------------------|
//! | catalog          | `GET  /foundry/list`             |
//! | cached models    | `GET  /openai/models`            |
//! | download         | `POST /openai/download`          |
//! | load / unload    | `GET  /openai/load/{id}`, `GET /openai/unload/{id}` |
//! | completion       | `POST /v1/chat/completions`      |
//!
//! `ureq` is blocking, so every request runs on the blocking pool.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use lingo_core::{BackendConfig, DeviceKind, ModelSettings};

use crate::backend::{BackendStatus, LoadedModel, ModelProvider, ModelVariant};
use crate::error::EngineError;
use crate::variant;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(120);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    name: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    runtime: Option<CatalogRuntime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogRuntime {
    #[serde(default)]
    device_type: Option<String>,
}

impl From<CatalogEntry> for ModelVariant {
    fn from(entry: CatalogEntry) -> Self {
        let device = entry
            .runtime
            .and_then(|r| r.device_type)
            .and_then(|d| d.parse::<DeviceKind>().ok());
        ModelVariant {
            alias: entry.alias.unwrap_or_else(|| entry.name.clone()),
            id: entry.name,
            device,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking REST client bound to one endpoint.
#[derive(Clone)]
struct FoundryClient {
    agent: ureq::Agent,
    base: String,
}

impl FoundryClient {
    fn new(endpoint: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Self {
            agent,
            base: endpoint.trim().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn catalog(&self) -> Result<Vec<ModelVariant>, EngineError> {
        let url = self.url("/foundry/list");
        let entries: Vec<CatalogEntry> = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| request_error(&url, e))?
            .into_json()
            .map_err(|e| decode_error(&url, e))?;
        Ok(entries.into_iter().map(ModelVariant::from).collect())
    }

    fn cached(&self) -> Result<Vec<String>, EngineError> {
        let url = self.url("/openai/models");
        self.agent
            .get(&url)
            .call()
            .map_err(|e| request_error(&url, e))?
            .into_json()
            .map_err(|e| decode_error(&url, e))
    }

    fn download(&self, model_id: &str) -> Result<(), EngineError> {
        let url = self.url("/openai/download");
        self.agent
            .post(&url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send_json(json!({ "model": { "Name": model_id }, "ignorePipeReport": true }))
            .map_err(|e| request_error(&url, e))?;
        Ok(())
    }

    fn load(&self, model_id: &str) -> Result<(), EngineError> {
        let url = self.url(&format!("/openai/load/{model_id}"));
        self.agent.get(&url).call().map_err(|e| request_error(&url, e))?;
        Ok(())
    }

    fn unload(&self, model_id: &str) -> Result<(), EngineError> {
        let url = self.url(&format!("/openai/unload/{model_id}"));
        self.agent.get(&url).call().map_err(|e| request_error(&url, e))?;
        Ok(())
    }

    fn chat(&self, model_id: &str, prompt: &str) -> Result<String, EngineError> {
        let url = self.url("/v1/chat/completions");
        let body = json!({
            "model": model_id,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let response: ChatResponse = self
            .agent
            .post(&url)
            .send_json(body)
            .map_err(|e| EngineError::Translation(format!("{url}: {e}")))?
            .into_json()
            .map_err(|e| EngineError::Translation(format!("{url}: invalid response: {e}")))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.and_then(|m| m.content).unwrap_or_default().trim().to_string())
            .ok_or_else(|| EngineError::Translation("translation returned no choices".to_string()))
    }
}

/// Picks the catalog entry for `id`: exact name first, then the first entry
/// published under that alias.
fn find_entry<'a>(catalog: &'a [ModelVariant], id: &str) -> Option<&'a ModelVariant> {
    catalog
        .iter()
        .find(|v| v.id.eq_ignore_ascii_case(id))
        .or_else(|| catalog.iter().find(|v| v.alias.eq_ignore_ascii_case(id)))
}

/// [`ModelProvider`] backed by a Foundry Local service.
pub struct FoundryLocalProvider {
    client: RwLock<FoundryClient>,
}

impl FoundryLocalProvider {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: RwLock::new(FoundryClient::new(endpoint)),
        }
    }

    pub fn endpoint(&self) -> String {
        self.client().base
    }

    fn client(&self) -> FoundryClient {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn inspect_inner(&self, config: &BackendConfig) -> Result<BackendStatus, EngineError> {
        let client = self.client();
        let (catalog, cached) = blocking(move || Ok((client.catalog()?, client.cached()?))).await?;

        let alias = &config.model_alias;
        if find_entry(&catalog, alias).is_none() {
            return Ok(BackendStatus::not_ready(format!("Model '{alias}' not found"))
                .with_detail("Check the alias with `foundry model list`"));
        }

        let wanted = variant::resolve_model_id(&catalog, config);
        let name = find_entry(&catalog, &wanted).map_or(wanted.as_str(), |v| v.id.as_str());
        if cached.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            Ok(BackendStatus::ready("Ready (model cached)"))
        } else {
            Ok(BackendStatus::ready("Model needs download")
                .with_detail("It is downloaded automatically on the first translation"))
        }
    }
}

#[async_trait]
impl ModelProvider for FoundryLocalProvider {
    async fn variants(&self) -> Result<Vec<ModelVariant>, EngineError> {
        let client = self.client();
        blocking(move || client.catalog()).await
    }

    async fn load(&self, model_id: &str) -> Result<Arc<dyn LoadedModel>, EngineError> {
        let client = self.client();
        let requested = model_id.to_string();
        let name = blocking(move || {
            let catalog = client.catalog()?;
            let name = find_entry(&catalog, &requested)
                .map(|v| v.id.clone())
                .ok_or_else(|| EngineError::unavailable(format!("Model '{requested}' not found.")))?;

            if !client.cached()?.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
                tracing::info!(model_id = %name, "downloading model");
                client.download(&name)?;
            }
            client.load(&name)?;
            Ok(name)
        })
        .await?;

        Ok(Arc::new(FoundryModel {
            id: name,
            client: self.client(),
        }))
    }

    async fn inspect(&self, config: &BackendConfig) -> BackendStatus {
        self.inspect_inner(config).await.unwrap_or_else(|err| {
            BackendStatus::not_ready("Foundry Local is unavailable").with_detail(err.to_string())
        })
    }

    fn reconfigure(&self, settings: &ModelSettings) -> bool {
        let next = FoundryClient::new(&settings.foundry_endpoint);
        let mut client = self.client.write().unwrap_or_else(PoisonError::into_inner);
        if client.base == next.base {
            return false;
        }
        tracing::info!(endpoint = %next.base, "foundry endpoint changed");
        *client = next;
        true
    }
}

/// A model loaded into the Foundry Local service.
struct FoundryModel {
    id: String,
    client: FoundryClient,
}

#[async_trait]
impl LoadedModel for FoundryModel {
    fn model_id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, prompt: &str) -> Result<String, EngineError> {
        let client = self.client.clone();
        let id = self.id.clone();
        let prompt = prompt.to_string();
        blocking(move || client.chat(&id, &prompt)).await
    }

    async fn unload(&self) -> Result<(), EngineError> {
        let client = self.client.clone();
        let id = self.id.clone();
        blocking(move || client.unload(&id)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T, EngineError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EngineError::unavailable(format!("foundry request task failed: {e}")))?
}

fn request_error(url: &str, err: ureq::Error) -> EngineError {
    EngineError::unavailable(format!("{url}: {err}"))
}

fn decode_error(url: &str, err: std::io::Error) -> EngineError {
    EngineError::unavailable(format!("{url}: invalid response: {err}"))
}
