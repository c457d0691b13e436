//! Remote publishing API: the three container operations the lifecycle
//! needs, and their HTTP implementation against the Instagram Graph API.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use crate::config::GraphApiConfig;
use crate::error::PublishError;
use crate::model::{ContainerStatus, PostRecord};

const CREATE_TIMEOUT: Duration = Duration::from_secs(60);
const STATUS_TIMEOUT: Duration = Duration::from_secs(30);
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(60);

/// Parameters of a reel container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRequest {
    pub video_url: String,
    pub caption: String,
    pub share_to_feed: bool,
    pub cover_url: Option<String>,
}

impl From<&PostRecord> for ContainerRequest {
    fn from(record: &PostRecord) -> Self {
        Self {
            video_url: record.video_url.clone(),
            caption: record.caption.clone(),
            share_to_feed: record.share_to_feed,
            cover_url: record.cover_url.clone(),
        }
    }
}

/// The platform operations consumed by the container lifecycle.
#[async_trait]
pub trait ReelsApi: Send + Sync {
    /// Create a container and return its id. Fails with [`PublishError::Create`].
    async fn create_container(&self, request: &ContainerRequest) -> Result<String, PublishError>;

    /// Current processing status. Fails with [`PublishError::Transport`].
    async fn container_status(&self, container_id: &str) -> Result<ContainerStatus, PublishError>;

    /// Publish a finished container and return the media id, which may be
    /// empty. Fails with [`PublishError::Publish`].
    async fn publish_container(&self, container_id: &str) -> Result<String, PublishError>;
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status_code: Option<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    message: String,
}

/// HTTP client for the Graph API.
pub struct GraphApiClient {
    client: Client,
    config: GraphApiConfig,
}

impl GraphApiClient {
    pub fn new(config: GraphApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("reel-scheduler/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, tail: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.version,
            tail
        )
    }
}

/// Describe a transport failure. URLs are stripped because status queries
/// carry the access token in the query string.
fn transport_message(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

/// Describe a non-2xx response, including the Graph API error message if
/// the body carries one.
async fn failure_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<GraphErrorEnvelope>(&body) {
        Ok(envelope) => format!("HTTP {}: {}", status, envelope.error.message),
        Err(_) => format!("HTTP {}", status),
    }
}

#[async_trait]
impl ReelsApi for GraphApiClient {
    async fn create_container(&self, request: &ContainerRequest) -> Result<String, PublishError> {
        let url = self.endpoint(&format!("{}/media", self.config.ig_user_id));
        let mut form = vec![
            ("media_type", "REELS"),
            ("video_url", request.video_url.as_str()),
            ("caption", request.caption.as_str()),
            ("share_to_feed", if request.share_to_feed { "true" } else { "false" }),
            ("access_token", self.config.access_token.as_str()),
        ];
        if let Some(cover) = request.cover_url.as_deref() {
            form.push(("cover_url", cover));
        }

        let response = self
            .client
            .post(&url)
            .form(&form)
            .timeout(CREATE_TIMEOUT)
            .send()
            .await
            .map_err(|e| PublishError::Create(transport_message(e)))?;

        if !response.status().is_success() {
            return Err(PublishError::Create(failure_message(response).await));
        }

        let body: IdResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Create(transport_message(e)))?;

        body.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PublishError::Create("response carried no container id".to_string()))
    }

    async fn container_status(&self, container_id: &str) -> Result<ContainerStatus, PublishError> {
        let transport = |message: String| PublishError::Transport {
            container_id: container_id.to_string(),
            message,
        };

        let response = self
            .client
            .get(self.endpoint(container_id))
            .query(&[
                ("fields", "status_code"),
                ("access_token", self.config.access_token.as_str()),
            ])
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport(transport_message(e)))?;

        if !response.status().is_success() {
            return Err(transport(failure_message(response).await));
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| transport(transport_message(e)))?;

        let status = body
            .status_code
            .unwrap_or_else(|| ContainerStatus::Other(String::new()));
        debug!(container_id, %status, "Container status");
        Ok(status)
    }

    async fn publish_container(&self, container_id: &str) -> Result<String, PublishError> {
        let publish_err = |message: String| PublishError::Publish {
            container_id: container_id.to_string(),
            message,
        };

        let url = self.endpoint(&format!("{}/media_publish", self.config.ig_user_id));
        let response = self
            .client
            .post(&url)
            .form(&[
                ("creation_id", container_id),
                ("access_token", self.config.access_token.as_str()),
            ])
            .timeout(PUBLISH_TIMEOUT)
            .send()
            .await
            .map_err(|e| publish_err(transport_message(e)))?;

        if !response.status().is_success() {
            return Err(publish_err(failure_message(response).await));
        }

        let body: IdResponse = response
            .json()
            .await
            .map_err(|e| publish_err(transport_message(e)))?;

        Ok(body.id.unwrap_or_default())
    }
}
