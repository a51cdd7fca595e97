//! Cloud provider abstraction layer.
//!
//! The `Provider` trait is the seam between the provisioning flow and a
//! concrete cloud API. Civo is the only implementation; tests drive the
//! provisioner through in-memory implementations of the same trait.
//!
//! # Flow
//!
//! ```text
//! InstanceRequest ──resolve_request──▶ ResolvedRequest
//!                                          │
//!                                   create_instance
//!                                          ▼
//!                                   ProviderInstance ◀──get_instance (poll)
//! ```

pub mod civo;
pub mod config;
pub mod error;

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use config::{InstanceRequest, ProviderTimeouts, ProviderType, ResolvedRequest};
pub use error::{ProviderError, ProviderResult};

use crate::config::AppConfig;
use crate::error::{DevOpsMateError, Result};

/// Instance returned by provider operations.
#[derive(Debug, Clone)]
pub struct ProviderInstance {
    /// Provider-specific instance ID
    pub id: String,

    pub hostname: String,

    /// Current instance status
    pub status: InstanceStatus,

    /// Public IP address, `None` until the provider assigns one
    pub public_ip: Option<IpAddr>,

    /// Login user created on first boot
    pub initial_user: String,

    /// Password generated by the provider for `initial_user`
    pub initial_password: String,

    /// When the instance was created
    pub created_at: DateTime<Utc>,
}

impl ProviderInstance {
    /// Active and reachable: the provider reports `ACTIVE` and a public IP is set.
    pub fn is_ready(&self) -> bool {
        self.status == InstanceStatus::Active && self.public_ip.is_some()
    }

    /// Whole seconds since the provider created the instance, zero if the
    /// provider clock is ahead of ours.
    pub fn age_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.created_at).num_seconds()).unwrap_or(0)
    }
}

/// Instance lifecycle status.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceStatus {
    /// Instance is being created
    Building,
    /// Instance is running and ready for remote commands
    Active,
    /// Instance is powered off
    ShutOff,
    /// Any other status reported by the provider
    Unknown(String),
}

impl InstanceStatus {
    /// Parse the provider's upper-case status string.
    pub fn parse(status: &str) -> Self {
        match status {
            "BUILDING" => Self::Building,
            "ACTIVE" => Self::Active,
            "SHUTOFF" => Self::ShutOff,
            s => Self::Unknown(s.to_string()),
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Building => write!(f, "BUILDING"),
            InstanceStatus::Active => write!(f, "ACTIVE"),
            InstanceStatus::ShutOff => write!(f, "SHUTOFF"),
            InstanceStatus::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Core trait that cloud providers implement.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Look up the provider-side ids (network, disk image) a request needs.
    async fn resolve_request(&self, request: &InstanceRequest) -> ProviderResult<ResolvedRequest>;

    /// Create a new instance.
    ///
    /// Returns as soon as the provider accepts the request; the instance is
    /// usually still building.
    async fn create_instance(&self, request: &ResolvedRequest) -> ProviderResult<ProviderInstance>;

    /// Get instance details by ID.
    ///
    /// Returns `None` if the instance doesn't exist.
    async fn get_instance(&self, id: &str) -> ProviderResult<Option<ProviderInstance>>;
}

/// Create the configured provider client.
///
/// Any failure here is a client initialisation error: unknown provider name,
/// missing API key, or an HTTP client that can't be built.
pub fn create_provider(config: &AppConfig) -> Result<Arc<dyn Provider>> {
    let provider_type = ProviderType::from_name(&config.provider).ok_or_else(|| {
        DevOpsMateError::ClientInit(ProviderError::UnknownProvider {
            name: config.provider.clone(),
            supported: ProviderType::supported_names(),
        })
    })?;
    let timeouts = config.provider_timeouts()?;

    let provider: Arc<dyn Provider> = match provider_type {
        ProviderType::Civo => Arc::new(
            civo::CivoProvider::new(&config.api_key, &config.region, timeouts)
                .map_err(DevOpsMateError::ClientInit)?,
        ),
    };

    Ok(provider)
}
