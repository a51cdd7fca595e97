use std::time::Duration;

use thiserror::Error;

use crate::install::InstallError;
use crate::provider::ProviderError;

#[derive(Error, Debug)]
pub enum DevOpsMateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Error in creating provider client: {0}")]
    ClientInit(#[source] ProviderError),

    #[error("Failed to create a new instance config: {0}")]
    InstanceConfig(#[source] ProviderError),

    #[error("Failed to create a new instance: {0}")]
    Create(#[source] ProviderError),

    #[error("Error retrieving instance details: {0}")]
    Poll(#[source] ProviderError),

    #[error(
        "Operation timed out after {}{}",
        crate::utils::format_duration(.elapsed.as_secs()),
        .instance_id
            .as_ref()
            .map(|id| format!(" (instance {} was created and left running)", id))
            .unwrap_or_default()
    )]
    Timeout {
        elapsed: Duration,
        instance_id: Option<String>,
    },

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("Interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DevOpsMateError>;
