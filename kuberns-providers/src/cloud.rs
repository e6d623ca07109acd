use crate::{NetworkAddress, ProvisionError, ProvisionRequest, Provisioner, ProvisionerKind};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

/// Generic HTTP control-plane client.
///
/// `POST {base}/instances` creates the resource, then
/// `GET {base}/instances/{id}` is polled until a public address shows up.
pub struct HttpControlPlaneProvisioner {
    client: Client,
    base_url: String,
    token: Option<String>,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Debug, Deserialize)]
struct ControlPlaneInstance {
    id: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    public_ip: Option<String>,
}

impl HttpControlPlaneProvisioner {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        // Default reqwest client has no overall timeout; a stalled control plane would hang the job.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            poll_interval: Duration::from_secs(3),
            max_polls: 20,
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls;
        self
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn read_instance(
        &self,
        resp: reqwest::Response,
        action: &str,
    ) -> Result<ControlPlaneInstance, ProvisionError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, action, &body));
        }
        resp.json::<ControlPlaneInstance>()
            .await
            .map_err(|e| ProvisionError::terminal(format!("{} returned an unreadable body: {}", action, e)))
    }

    async fn create(&self, request: &ProvisionRequest) -> Result<ControlPlaneInstance, ProvisionError> {
        let url = format!("{}/instances", self.base_url);
        let body = json!({
            "instance_id": request.instance_id,
            "cpu": request.cpu,
            "ram": request.ram,
            "storage": request.storage,
            "region": request.region,
        });
        tracing::info!(%url, instance_id = %request.instance_id, "control plane: create instance");
        let resp = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(e, "create instance"))?;
        self.read_instance(resp, "create instance").await
    }

    async fn describe(&self, resource_id: &str) -> Result<ControlPlaneInstance, ProvisionError> {
        let url = format!("{}/instances/{}", self.base_url, resource_id);
        let resp = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| classify_transport(e, "describe instance"))?;
        self.read_instance(resp, "describe instance").await
    }
}

/// 429 and 5xx are worth retrying, any other rejection is final.
fn classify_status(status: StatusCode, action: &str, body: &str) -> ProvisionError {
    let reason = format!("{} failed: status={} body={}", action, status.as_u16(), body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProvisionError::retryable(reason)
    } else {
        ProvisionError::terminal(reason)
    }
}

fn classify_transport(e: reqwest::Error, action: &str) -> ProvisionError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ProvisionError::retryable(format!("{} transport error: {}", action, e))
    } else {
        ProvisionError::terminal(format!("{} error: {}", action, e))
    }
}

fn reachable_address(inst: &ControlPlaneInstance) -> Result<Option<NetworkAddress>, ProvisionError> {
    if let Some(state) = inst.state.as_deref() {
        if matches!(state.to_ascii_lowercase().as_str(), "error" | "failed") {
            return Err(ProvisionError::terminal(format!(
                "resource {} entered state '{}'",
                inst.id, state
            )));
        }
    }
    Ok(inst
        .public_ip
        .as_deref()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(NetworkAddress::new))
}

#[async_trait]
impl Provisioner for HttpControlPlaneProvisioner {
    fn kind(&self) -> ProvisionerKind {
        ProvisionerKind::Cloud
    }

    async fn provision(&self, request: &ProvisionRequest) -> Result<NetworkAddress, ProvisionError> {
        let created = self.create(request).await?;
        if let Some(addr) = reachable_address(&created)? {
            return Ok(addr);
        }

        for attempt in 1..=self.max_polls {
            sleep(self.poll_interval).await;
            let current = self.describe(&created.id).await?;
            if let Some(addr) = reachable_address(&current)? {
                tracing::info!(
                    instance_id = %request.instance_id,
                    resource_id = %created.id,
                    attempt,
                    "control plane: address assigned"
                );
                return Ok(addr);
            }
            tracing::debug!(
                instance_id = %request.instance_id,
                resource_id = %created.id,
                attempt,
                state = ?current.state,
                "control plane: not reachable yet"
            );
        }

        // Partial success: the resource exists but never got an address.
        Err(ProvisionError::retryable(format!(
            "resource {} created but not reachable after {} polls",
            created.id, self.max_polls
        )))
    }
}
