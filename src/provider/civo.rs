use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use super::config::{InstanceRequest, ProviderTimeouts, ResolvedRequest};
use super::error::{ProviderError, ProviderResult};
use super::{InstanceStatus, Provider, ProviderInstance};

const DEFAULT_API_BASE: &str = "https://api.civo.com/v2";
const PROVIDER_NAME: &str = "civo";

#[derive(Debug)]
pub struct CivoProvider {
    client: Client,
    api_key: String,
    region: String,
    base_url: String,
}

impl CivoProvider {
    pub fn new(api_key: &str, region: &str, timeouts: ProviderTimeouts) -> ProviderResult<Self> {
        Self::with_base_url(api_key, region, DEFAULT_API_BASE, timeouts)
    }

    pub fn with_base_url(
        api_key: &str,
        region: &str,
        base_url: &str,
        timeouts: ProviderTimeouts,
    ) -> ProviderResult<Self> {
        if api_key.is_empty() {
            return Err(ProviderError::auth(
                PROVIDER_NAME,
                "Civo API key is required. Set CIVO_TOKEN or pass --api-key",
            ));
        }

        if region.trim().is_empty() {
            return Err(ProviderError::invalid_config(
                "region",
                "a Civo region is required (e.g. LON1, NYC1, FRA1)",
            ));
        }

        let client = Client::builder().timeout(timeouts.http_request).build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            region: region.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn auth_header(&self) -> String {
        format!("bearer {}", self.api_key)
    }
}

#[derive(Debug, Serialize)]
struct CreateInstanceBody {
    count: u32,
    hostname: String,
    size: String,
    region: String,
    public_ip: &'static str,
    network_id: String,
    template_id: String,
    initial_user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssh_key_id: Option<String>,
    tags: String,
}

impl From<&ResolvedRequest> for CreateInstanceBody {
    fn from(resolved: &ResolvedRequest) -> Self {
        let request = &resolved.request;
        Self {
            count: 1,
            hostname: request.hostname.clone(),
            size: request.size.clone(),
            region: request.region.clone(),
            public_ip: "create",
            network_id: resolved.network_id.clone(),
            template_id: resolved.image_id.clone(),
            initial_user: request.initial_user.clone(),
            ssh_key_id: request.ssh_key_id.clone(),
            tags: request.tags.join(" "),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstanceData {
    id: String,
    #[serde(default)]
    hostname: String,
    status: String,
    #[serde(default)]
    public_ip: Option<String>,
    #[serde(default)]
    initial_user: Option<String>,
    #[serde(default)]
    initial_password: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NetworkData {
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    default: bool,
}

#[derive(Debug, Deserialize)]
struct DiskImageData {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    reason: Option<String>,
}

impl InstanceData {
    fn to_instance(&self) -> ProviderInstance {
        let created_at = self
            .created_at
            .as_deref()
            .and_then(|raw| match DateTime::parse_from_rfc3339(raw) {
                Ok(dt) => Some(dt.with_timezone(&Utc)),
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse instance created_at '{}': {}. Using current time.",
                        raw,
                        e
                    );
                    None
                }
            })
            .unwrap_or_else(Utc::now);

        ProviderInstance {
            id: self.id.clone(),
            hostname: self.hostname.clone(),
            status: InstanceStatus::parse(&self.status),
            public_ip: self.get_public_ip(),
            initial_user: self
                .initial_user
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| super::config::DEFAULT_INITIAL_USER.to_string()),
            initial_password: self.initial_password.clone().unwrap_or_default(),
            created_at,
        }
    }

    fn get_public_ip(&self) -> Option<IpAddr> {
        self.public_ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .and_then(|ip| ip.parse().ok())
    }
}

/// Map a non-success response into a `ProviderError`.
async fn error_from_response(response: Response, action: &str) -> ProviderError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.reason.or(b.code))
        .unwrap_or(body);

    match status.as_u16() {
        401 | 403 => ProviderError::auth(PROVIDER_NAME, message),
        429 => ProviderError::RateLimit { retry_after },
        code => ProviderError::api(code, format!("{}: {}", action, message)),
    }
}

#[async_trait]
impl Provider for CivoProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn resolve_request(&self, request: &InstanceRequest) -> ProviderResult<ResolvedRequest> {
        let network_id = self.default_network_id().await?;
        let image_id = self.disk_image_id(&request.disk_image).await?;

        Ok(ResolvedRequest {
            request: request.clone(),
            network_id,
            image_id,
        })
    }

    async fn create_instance(&self, request: &ResolvedRequest) -> ProviderResult<ProviderInstance> {
        let body = CreateInstanceBody::from(request);

        let response = self
            .client
            .post(format!("{}/instances", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Failed to create instance").await);
        }

        let data: InstanceData = response.json().await?;
        tracing::debug!("Civo accepted instance {} ({})", data.id, data.status);
        Ok(data.to_instance())
    }

    async fn get_instance(&self, id: &str) -> ProviderResult<Option<ProviderInstance>> {
        let response = self
            .client
            .get(format!("{}/instances/{}", self.base_url, id))
            .query(&[("region", &self.region)])
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(error_from_response(response, "Failed to get instance").await);
        }

        let data: InstanceData = response.json().await?;
        Ok(Some(data.to_instance()))
    }
}

impl CivoProvider {
    /// Find the account's default network in the configured region.
    async fn default_network_id(&self) -> ProviderResult<String> {
        let response = self
            .client
            .get(format!("{}/networks", self.base_url))
            .query(&[("region", &self.region)])
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Failed to list networks").await);
        }

        let networks: Vec<NetworkData> = response.json().await?;
        let network = networks
            .into_iter()
            .find(|n| n.default)
            .ok_or_else(|| ProviderError::not_found("default network", &self.region))?;

        tracing::debug!("Using network {} ({})", network.id, network.label);
        Ok(network.id)
    }

    /// Resolve a disk image name (e.g. `ubuntu-focal`) to its id.
    async fn disk_image_id(&self, name: &str) -> ProviderResult<String> {
        let response = self
            .client
            .get(format!("{}/disk_images", self.base_url))
            .query(&[("region", &self.region)])
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Failed to list disk images").await);
        }

        let images: Vec<DiskImageData> = response.json().await?;
        images
            .into_iter()
            .find(|image| image.name == name)
            .map(|image| image.id)
            .ok_or_else(|| ProviderError::not_found("disk image", name))
    }
}
