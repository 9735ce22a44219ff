//! reqwest-backed control plane client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::errors::{ControlPlaneError, ControlPlaneResult};
use crate::domain::models::{AgentConfig, ControlPlaneConfig, Job, JobEnvelope};
use crate::domain::ports::{ControlPlane, Endpoint};

/// Path of the job pull endpoint.
const JOBS_PATH: &str = "/process_life_cycle_events";

/// HTTP client for the control plane API.
///
/// Every request carries the agent token in the `token` header.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    http: Client,
    base_url: String,
    token: String,
    agent_name: String,
}

impl HttpControlPlane {
    /// Build a client from the loaded configuration.
    pub fn new(control_plane: &ControlPlaneConfig, agent: &AgentConfig) -> Result<Self> {
        Self::with_base_url(
            &control_plane.base_url,
            &agent.token,
            &agent.name,
            control_plane.request_timeout(),
        )
    }

    /// Build a client for an explicit base URL and identity.
    pub fn with_base_url(
        base_url: &str,
        token: &str,
        agent_name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            agent_name: agent_name.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn ensure_success(response: Response) -> ControlPlaneResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ControlPlaneError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    #[instrument(skip(self), fields(agent = %self.agent_name))]
    async fn fetch_jobs(&self, count: usize) -> ControlPlaneResult<Vec<Job>> {
        let response = self
            .http
            .get(self.url(JOBS_PATH))
            .query(&[("count", count.to_string()), ("agent", self.agent_name.clone())])
            .header("token", &self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let body = response.text().await?;
        let envelope: JobEnvelope =
            serde_json::from_str(&body).map_err(|e| ControlPlaneError::Decode(e.to_string()))?;
        debug!(jobs = envelope.data.len(), "pulled jobs");
        Ok(envelope.data)
    }

    #[instrument(skip(self, body), fields(endpoint = %endpoint))]
    async fn publish(&self, endpoint: Endpoint, body: Value) -> ControlPlaneResult<()> {
        let response = self
            .http
            .post(self.url(endpoint.path()))
            .header("token", &self.token)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}
