use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DevOpsMateError, Result};
use crate::provider::{ProviderTimeouts, ProviderType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_disk_image")]
    pub disk_image: String,
    #[serde(default = "default_ssh_key_path")]
    pub ssh_key_path: String,
    /// Provider-side id of an uploaded SSH key to install on the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_id: Option<String>,
    #[serde(default = "default_provision_timeout")]
    pub provision_timeout: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    #[serde(default = "default_install_step_timeout")]
    pub install_step_timeout: String,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

/// Kubernetes cluster created by the managed-cluster install step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    pub size: String,
    pub nodes: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "my-cluster".to_string(),
            size: "g3.k3s.medium".to_string(),
            nodes: 3,
        }
    }
}

fn default_provider() -> String {
    "civo".to_string()
}

fn default_region() -> String {
    "LON1".to_string()
}

fn default_size() -> String {
    "g3.medium".to_string()
}

fn default_disk_image() -> String {
    crate::provider::config::DEFAULT_DISK_IMAGE.to_string()
}

fn default_ssh_key_path() -> String {
    "~/.ssh/id_ed25519".to_string()
}

fn default_provision_timeout() -> String {
    "10m".to_string()
}

fn default_poll_interval() -> String {
    "5s".to_string()
}

fn default_install_step_timeout() -> String {
    "30m".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            region: default_region(),
            size: default_size(),
            disk_image: default_disk_image(),
            ssh_key_path: default_ssh_key_path(),
            ssh_key_id: None,
            provision_timeout: default_provision_timeout(),
            poll_interval: default_poll_interval(),
            install_step_timeout: default_install_step_timeout(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| DevOpsMateError::Config("HOME environment variable not set".to_string()))?;
        Ok(PathBuf::from(home).join(".config").join("devopsmate"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Load the config file, falling back to defaults when it doesn't exist.
    ///
    /// The API key is taken from the environment when the file doesn't set one.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| DevOpsMateError::Config(format!("Invalid config: {}", e)))
    }

    fn apply_env(&mut self) {
        if !self.api_key.is_empty() {
            return;
        }

        let provider_var = self
            .provider_type()
            .map(|p| p.token_env_var())
            .unwrap_or("CIVO_TOKEN");

        for var in ["DEVOPSMATE_API_KEY", provider_var] {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    self.api_key = key;
                    return;
                }
            }
        }
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| DevOpsMateError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.provider_type().is_none() {
            return Err(DevOpsMateError::Config(format!(
                "Unknown provider '{}'. Supported providers: {:?}",
                self.provider,
                ProviderType::supported_names()
            )));
        }

        for (field, value) in [
            ("provision_timeout", &self.provision_timeout),
            ("poll_interval", &self.poll_interval),
            ("install_step_timeout", &self.install_step_timeout),
        ] {
            parse_positive_duration(field, value)?;
        }

        if self.cluster.nodes == 0 {
            return Err(DevOpsMateError::Config(
                "cluster.nodes must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn provider_type(&self) -> Option<ProviderType> {
        ProviderType::from_name(&self.provider)
    }

    /// SSH private key path with `~` expanded.
    pub fn ssh_key_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.ssh_key_path).as_ref())
    }

    pub fn provider_timeouts(&self) -> Result<ProviderTimeouts> {
        Ok(ProviderTimeouts {
            instance_ready: parse_positive_duration("provision_timeout", &self.provision_timeout)?,
            poll_interval: parse_positive_duration("poll_interval", &self.poll_interval)?,
            ..ProviderTimeouts::default()
        })
    }

    pub fn install_step_timeout(&self) -> Result<Duration> {
        parse_positive_duration("install_step_timeout", &self.install_step_timeout)
    }

    /// Apply a `config set` style key/value update.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "provider" => self.provider = value.to_string(),
            "api_key" | "api-key" => self.api_key = value.to_string(),
            "region" => self.region = value.to_string(),
            "size" => self.size = value.to_string(),
            "disk_image" | "disk-image" => self.disk_image = value.to_string(),
            "ssh_key" | "ssh-key" => self.ssh_key_path = value.to_string(),
            "ssh_key_id" | "ssh-key-id" => {
                self.ssh_key_id = Some(value.to_string()).filter(|v| !v.is_empty())
            }
            "provision_timeout" | "provision-timeout" => self.provision_timeout = value.to_string(),
            "poll_interval" | "poll-interval" => self.poll_interval = value.to_string(),
            "install_step_timeout" | "install-step-timeout" => {
                self.install_step_timeout = value.to_string()
            }
            "cluster.name" => self.cluster.name = value.to_string(),
            "cluster.size" => self.cluster.size = value.to_string(),
            "cluster.nodes" => {
                self.cluster.nodes = value.parse().map_err(|_| {
                    DevOpsMateError::Config(format!("cluster.nodes must be a number, got '{}'", value))
                })?
            }
            _ => {
                return Err(DevOpsMateError::Config(format!(
                    "Unknown config key '{}'. Available keys: {}",
                    key,
                    CONFIG_KEYS.join(", ")
                )))
            }
        }

        self.validate()
    }
}

pub const CONFIG_KEYS: &[&str] = &[
    "provider",
    "api_key",
    "region",
    "size",
    "disk_image",
    "ssh_key",
    "ssh_key_id",
    "provision_timeout",
    "poll_interval",
    "install_step_timeout",
    "cluster.name",
    "cluster.size",
    "cluster.nodes",
];

fn parse_positive_duration(field: &str, value: &str) -> Result<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(DevOpsMateError::Config(format!(
            "Invalid {} '{}'. Use format like '10m', '5s', '1h' or '600'",
            field, value
        ))),
    }
}

pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(seconds) = s.strip_suffix('s') {
        seconds.parse::<u64>().ok().map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("90M"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("600"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("  2h  "), Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("2x"), None);
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "civo");
        assert_eq!(config.region, "LON1");
        assert_eq!(config.disk_image, "ubuntu-focal");
        assert_eq!(config.cluster, ClusterConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = AppConfig::default().provider_timeouts().unwrap();
        assert_eq!(timeouts.instance_ready, Duration::from_secs(600));
        assert_eq!(timeouts.poll_interval, Duration::from_secs(5));
        assert_eq!(
            AppConfig::default().install_step_timeout().unwrap(),
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn test_ssh_key_path_expands_tilde() {
        let config = AppConfig {
            ssh_key_path: "/tmp/key".to_string(),
            ..Default::default()
        };
        assert_eq!(config.ssh_key_path(), PathBuf::from("/tmp/key"));

        let config = AppConfig::default();
        assert!(!config.ssh_key_path().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_config_serialization_skips_empty_secrets() {
        let yaml = serde_yaml::to_string(&AppConfig::default()).unwrap();
        assert!(yaml.contains("provider: civo"));
        assert!(yaml.contains("region: LON1"));
        assert!(!yaml.contains("api_key"));
        assert!(!yaml.contains("ssh_key_id"));
    }

    #[test]
    fn test_config_deserialization_partial() {
        let yaml = r#"
region: NYC1
ssh_key_path: /home/user/.ssh/id_rsa
provision_timeout: 15m
cluster:
  name: ci
  size: g3.k3s.small
  nodes: 1
"#;

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider, "civo");
        assert_eq!(config.region, "NYC1");
        assert_eq!(config.size, "g3.medium");
        assert_eq!(config.poll_interval, "5s");
        assert_eq!(config.cluster.name, "ci");
        assert_eq!(config.cluster.nodes, 1);
        assert_eq!(
            config.provider_timeouts().unwrap().instance_ready,
            Duration::from_secs(900)
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.yaml");

        let config = AppConfig {
            api_key: "secret".to_string(),
            region: "FRA1".to_string(),
            ssh_key_id: Some("key-1".to_string()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.api_key, "secret");
        assert_eq!(loaded.region, "FRA1");
        assert_eq!(loaded.ssh_key_id.as_deref(), Some("key-1"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&temp_dir.path().join("missing.yaml")).unwrap();
        assert_eq!(config.region, "LON1");
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "cluster: [not, a, map]").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = AppConfig {
            provider: "aws".to_string(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("Unknown provider"));

        let config = AppConfig {
            poll_interval: "0s".to_string(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("poll_interval"));

        let config = AppConfig {
            cluster: ClusterConfig {
                nodes: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_set_value() {
        let mut config = AppConfig::default();
        config.set_value("region", "NYC1").unwrap();
        config.set_value("cluster.nodes", "5").unwrap();
        config.set_value("ssh-key-id", "abc").unwrap();

        assert_eq!(config.region, "NYC1");
        assert_eq!(config.cluster.nodes, 5);
        assert_eq!(config.ssh_key_id.as_deref(), Some("abc"));

        assert!(config.set_value("cluster.nodes", "many").is_err());
        assert!(config.set_value("poll_interval", "soon").is_err());
        assert!(config.set_value("colour", "blue").is_err());
    }
}
