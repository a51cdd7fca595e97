use std::net::IpAddr;
use std::path::PathBuf;

use console::style;

use crate::config::AppConfig;
use crate::error::{DevOpsMateError, Result};
use crate::install::{default_steps, run_all, SshExecutor};
use crate::provision::InstanceConnection;
use crate::utils::format_duration;

/// Locate the local ssh client before any remote work starts.
pub fn find_ssh() -> Result<PathBuf> {
    which::which("ssh").map_err(|_| {
        DevOpsMateError::Config(
            "ssh client not found in PATH. Install OpenSSH to run the install steps.".to_string(),
        )
    })
}

pub async fn execute(
    config: &AppConfig,
    host: String,
    user: String,
    ssh_key: Option<PathBuf>,
    api_key: Option<String>,
    verbose: bool,
) -> Result<()> {
    let address = resolve_host(&host).await?;

    let credential_ref = ssh_key.unwrap_or_else(|| config.ssh_key_path());
    if !credential_ref.exists() {
        return Err(DevOpsMateError::Config(format!(
            "SSH key not found: {}",
            credential_ref.display()
        )));
    }

    let connection = InstanceConnection {
        instance_id: host,
        address,
        user,
        credential_ref,
        generated_secret: String::new(),
    };

    let api_key = api_key.or_else(|| Some(config.api_key.clone()));
    run_install(config, &connection, find_ssh()?, api_key, verbose).await
}

/// Accept an IP literal or a DNS name; names resolve to their first address.
async fn resolve_host(host: &str) -> Result<IpAddr> {
    if let Ok(address) = host.parse::<IpAddr>() {
        return Ok(address);
    }

    let mut addresses = tokio::net::lookup_host((host, 22))
        .await
        .map_err(|e| DevOpsMateError::Config(format!("Cannot resolve host '{}': {}", host, e)))?;

    addresses
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| DevOpsMateError::Config(format!("Host '{}' has no addresses", host)))
}

/// Run the install sequence against `connection`, honouring Ctrl-C.
pub async fn run_install(
    config: &AppConfig,
    connection: &InstanceConnection,
    ssh_program: PathBuf,
    api_key: Option<String>,
    verbose: bool,
) -> Result<()> {
    let steps = default_steps(config, api_key);
    let executor = SshExecutor::new(ssh_program, config.install_step_timeout()?).verbose(verbose);

    println!(
        "{} Installing {} components on {}",
        style("*").cyan().bold(),
        steps.len(),
        style(connection.target()).cyan()
    );

    let started = std::time::Instant::now();

    tokio::select! {
        result = run_all(&steps, connection, &executor) => result?,
        _ = tokio::signal::ctrl_c() => return Err(DevOpsMateError::Interrupted),
    }

    println!(
        "{} Installation complete in {}",
        style("✓").green().bold(),
        style(format_duration(started.elapsed().as_secs())).dim()
    );

    Ok(())
}
