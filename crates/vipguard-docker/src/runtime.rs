//! Container runtime access.
//!
//! `ContainerRuntime` is the seam the monitor talks through. `DockerClient`
//! implements it against the Docker Engine HTTP API, over the local unix
//! socket by default.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use vipguard_core::CONTAINER_RESTART_TIMEOUT;
use vipguard_core::http::{self, Endpoint, Response};

use crate::error::{ContainerError, ContainerResult};

/// One entry of the container listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "State", default)]
    pub state: String,
}

/// The parts of a container inspection the monitor cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: String,
    pub image: String,
    /// Docker health status string ("healthy", "unhealthy", "starting"),
    /// absent when the image defines no health check.
    pub health: Option<String>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// All containers, running or not.
    async fn list_containers(&self) -> ContainerResult<Vec<ContainerSummary>>;

    async fn inspect(&self, id: &str) -> ContainerResult<ContainerDetails>;

    async fn restart(&self, id: &str) -> ContainerResult<()>;
}

/// Docker Engine API client.
#[derive(Debug, Clone)]
pub struct DockerClient {
    endpoint: Endpoint,
    api_timeout: Duration,
    restart_timeout: Duration,
}

impl DockerClient {
    /// Create a client for `unix:///path`, `tcp://host:port`, or `http://host:port`.
    pub fn new(docker_uri: &str) -> ContainerResult<Self> {
        Ok(Self {
            endpoint: Endpoint::parse(docker_uri)?,
            api_timeout: Duration::from_secs(10),
            restart_timeout: CONTAINER_RESTART_TIMEOUT,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[derive(Deserialize)]
struct InspectResponse {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Config", default)]
    config: Option<InspectConfig>,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: Option<InspectState>,
}

#[derive(Deserialize)]
struct InspectConfig {
    #[serde(rename = "Image", default)]
    image: String,
}

#[derive(Deserialize)]
struct InspectState {
    #[serde(rename = "Health", default)]
    health: Option<InspectHealth>,
}

#[derive(Deserialize)]
struct InspectHealth {
    #[serde(rename = "Status", default)]
    status: String,
}

impl From<InspectResponse> for ContainerDetails {
    fn from(resp: InspectResponse) -> Self {
        let image = resp
            .config
            .map(|c| c.image)
            .filter(|image| !image.is_empty())
            .unwrap_or(resp.image);
        let health = resp
            .state
            .and_then(|s| s.health)
            .map(|h| h.status)
            .filter(|status| !status.is_empty());
        ContainerDetails {
            id: resp.id,
            image,
            health,
        }
    }
}

fn check(operation: &'static str, resp: &Response) -> ContainerResult<()> {
    if resp.is_success() {
        return Ok(());
    }
    Err(ContainerError::Api {
        operation,
        status: resp.status.as_u16(),
        message: error_message(resp),
    })
}

/// Docker error bodies look like `{"message": "..."}`.
fn error_message(resp: &Response) -> String {
    #[derive(Deserialize)]
    struct ApiMessage {
        message: String,
    }
    serde_json::from_slice::<ApiMessage>(&resp.body)
        .map(|m| m.message)
        .unwrap_or_else(|_| resp.text())
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn list_containers(&self) -> ContainerResult<Vec<ContainerSummary>> {
        let resp = http::get(&self.endpoint, "/containers/json?all=true", self.api_timeout).await?;
        check("list containers", &resp)?;
        let containers: Vec<ContainerSummary> = serde_json::from_slice(&resp.body)?;
        debug!(count = containers.len(), "listed containers");
        Ok(containers)
    }

    async fn inspect(&self, id: &str) -> ContainerResult<ContainerDetails> {
        let path = format!("/containers/{id}/json");
        let resp = http::get(&self.endpoint, &path, self.api_timeout).await?;
        if resp.status.as_u16() == 404 {
            return Err(ContainerError::NotFound(id.to_string()));
        }
        check("inspect container", &resp)?;
        let inspected: InspectResponse = serde_json::from_slice(&resp.body)?;
        Ok(inspected.into())
    }

    async fn restart(&self, id: &str) -> ContainerResult<()> {
        let path = format!("/containers/{id}/restart");
        let resp = http::post(&self.endpoint, &path, self.restart_timeout).await?;
        if resp.status.as_u16() == 404 {
            return Err(ContainerError::NotFound(id.to_string()));
        }
        check("restart container", &resp)?;
        debug!(container_id = %id, "restart accepted");
        Ok(())
    }
}
