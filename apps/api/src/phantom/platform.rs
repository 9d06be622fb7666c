//! Remote job platform seam.
//!
//! `PhantomPlatform` is the only way the engine reaches the platform, so the
//! launch/poll/retrieve logic can run against a scripted fake in tests.
//! `PhantomBusterClient` is the production binding to the PhantomBuster v2 API.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::phantom::error::PlatformError;
use crate::phantom::job::{AgentMetadata, ContainerState};

const API_BASE_URL: &str = "https://api.phantombuster.com/api/v2";
const ARTIFACT_BASE_URL: &str = "https://phantombuster.s3.amazonaws.com";
const API_KEY_HEADER: &str = "X-Phantombuster-Key";
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[async_trait]
pub trait PhantomPlatform: Send + Sync {
    /// Submits a job and returns the new container id.
    async fn launch(
        &self,
        agent_id: &str,
        argument: &Map<String, Value>,
    ) -> Result<String, PlatformError>;

    async fn status(&self, container_id: &str) -> Result<ContainerState, PlatformError>;

    async fn fetch_agent(&self, agent_id: &str) -> Result<AgentMetadata, PlatformError>;

    async fn fetch_console(&self, container_id: &str) -> Result<String, PlatformError>;

    /// GETs a durable artifact by its full URL.
    async fn fetch_artifact(&self, url: &str) -> Result<Value, PlatformError>;
}

/// Builds the durable result artifact URL with a fresh cache-busting token.
pub fn artifact_url(org_folder: &str, agent_folder: &str) -> String {
    format!(
        "{ARTIFACT_BASE_URL}/{org_folder}/{agent_folder}/result.json?nocache={}",
        Uuid::new_v4().simple()
    )
}

#[derive(Clone)]
pub struct PhantomBusterClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PhantomBusterClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            base_url: API_BASE_URL.to_string(),
        }
    }

    async fn get_by_id(&self, path: &str, id: &str) -> Result<Value, PlatformError> {
        let url = format!("{}{path}", self.base_url);
        debug!("GET {url}?id={id}");
        let response = self
            .client
            .get(&url)
            .query(&[("id", id)])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        read_json(response).await
    }
}

/// Turns a response into JSON, mapping non-2xx into `PlatformError::Status`.
async fn read_json(response: Response) -> Result<Value, PlatformError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PlatformError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| PlatformError::Decode(format!("invalid JSON body: {e}")))
}

#[async_trait]
impl PhantomPlatform for PhantomBusterClient {
    async fn launch(
        &self,
        agent_id: &str,
        argument: &Map<String, Value>,
    ) -> Result<String, PlatformError> {
        let response = self
            .client
            .post(format!("{}/agents/launch", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({ "id": agent_id, "argument": argument }))
            .send()
            .await?;
        let body = read_json(response).await?;
        container_id_of(&body)
    }

    async fn status(&self, container_id: &str) -> Result<ContainerState, PlatformError> {
        let raw = self.get_by_id("/containers/fetch", container_id).await?;
        Ok(ContainerState::from_value(raw))
    }

    async fn fetch_agent(&self, agent_id: &str) -> Result<AgentMetadata, PlatformError> {
        let raw = self.get_by_id("/agents/fetch", agent_id).await?;
        Ok(AgentMetadata::from_value(&raw))
    }

    async fn fetch_console(&self, container_id: &str) -> Result<String, PlatformError> {
        let raw = self
            .get_by_id("/containers/fetch-console", container_id)
            .await?;
        Ok(raw
            .get("console")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn fetch_artifact(&self, url: &str) -> Result<Value, PlatformError> {
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }
}

/// The platform has returned the id both as a string and as a number.
fn container_id_of(body: &Value) -> Result<String, PlatformError> {
    match body.get("containerId") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(PlatformError::Decode(format!(
            "launch response has no containerId: {body}"
        ))),
    }
}
