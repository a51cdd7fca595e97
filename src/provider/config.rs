//! Provider configuration types.
//!
//! This module contains configuration structures that are provider-agnostic.
//! Providers resolve an [`InstanceRequest`] into a [`ResolvedRequest`] (network
//! and disk image ids looked up in the account) before creating anything.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for creating a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRequest {
    /// Instance hostname
    pub hostname: String,

    /// Region/datacenter location
    pub region: String,

    /// Instance size identifier (e.g. `g3.medium`)
    pub size: String,

    /// Disk image name, resolved to an image id by the provider
    pub disk_image: String,

    /// User created on first boot
    pub initial_user: String,

    /// Provider-side SSH key id to install for `initial_user`
    pub ssh_key_id: Option<String>,

    /// Tags for the instance
    pub tags: Vec<String>,
}

impl InstanceRequest {
    /// Create a new instance request with required fields
    pub fn new(
        hostname: impl Into<String>,
        region: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            region: region.into(),
            size: size.into(),
            disk_image: DEFAULT_DISK_IMAGE.to_string(),
            initial_user: DEFAULT_INITIAL_USER.to_string(),
            ssh_key_id: None,
            tags: Vec::new(),
        }
    }

    /// Set the disk image name
    pub fn with_disk_image(mut self, disk_image: impl Into<String>) -> Self {
        self.disk_image = disk_image.into();
        self
    }

    /// Set the provider SSH key id
    pub fn with_ssh_key_id(mut self, ssh_key_id: Option<String>) -> Self {
        self.ssh_key_id = ssh_key_id;
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Disk image used when none is configured.
pub const DEFAULT_DISK_IMAGE: &str = "ubuntu-focal";

/// Login user created on new instances.
pub const DEFAULT_INITIAL_USER: &str = "civo";

/// An [`InstanceRequest`] with provider-side ids filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub request: InstanceRequest,
    pub network_id: String,
    pub image_id: String,
}

/// Timeout configuration for provider operations.
#[derive(Debug, Clone)]
pub struct ProviderTimeouts {
    /// How long to wait for an instance to become ready (the provisioning deadline)
    pub instance_ready: Duration,

    /// Interval between status poll requests
    pub poll_interval: Duration,

    /// HTTP request timeout
    pub http_request: Duration,
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self {
            instance_ready: Duration::from_secs(600), // 10 minutes
            poll_interval: Duration::from_secs(5),
            http_request: Duration::from_secs(30),
        }
    }
}

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Civo,
}

impl ProviderType {
    /// Get all supported provider types
    pub fn all() -> &'static [ProviderType] {
        &[Self::Civo]
    }

    /// Get provider name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Civo => "civo",
        }
    }

    /// Get list of supported provider names
    pub fn supported_names() -> Vec<String> {
        Self::all().iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Parse provider type from string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "civo" => Some(Self::Civo),
            _ => None,
        }
    }

    /// Environment variable the provider's own tooling reads the API key from
    pub fn token_env_var(&self) -> &'static str {
        match self {
            Self::Civo => "CIVO_TOKEN",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
