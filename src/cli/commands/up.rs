use std::path::PathBuf;

use console::style;

use crate::config::AppConfig;
use crate::error::{DevOpsMateError, Result};
use crate::provider::{create_provider, InstanceRequest};
use crate::provision::{InstanceConnection, Provisioner};
use crate::utils::format_duration;

use super::install::{find_ssh, run_install};

/// Flags of `devopsmate up` that override the config file.
#[derive(Debug, Default)]
pub struct UpOptions {
    pub api_key: Option<String>,
    pub region: Option<String>,
    pub ssh_key: Option<PathBuf>,
    pub size: Option<String>,
    pub timeout: Option<String>,
    pub skip_install: bool,
    pub verbose: bool,
}

pub async fn execute(mut config: AppConfig, options: UpOptions) -> Result<()> {
    apply_overrides(&mut config, &options);
    config.validate()?;

    // Pre-flight checks: key on disk, ssh client available
    let ssh_key_path = config.ssh_key_path();
    if !ssh_key_path.exists() {
        return Err(DevOpsMateError::Config(format!(
            "SSH key not found: {}",
            ssh_key_path.display()
        )));
    }
    let ssh_program = if options.skip_install {
        None
    } else {
        Some(find_ssh()?)
    };

    let provider = create_provider(&config)?;
    let timeouts = config.provider_timeouts()?;
    let request = build_request(&config, generate_hostname());

    println!(
        "{} Creating {} in {} ({})",
        style("*").cyan().bold(),
        style(&request.hostname).white().bold(),
        style(&config.region).cyan(),
        style(&config.size).dim()
    );
    println!(
        "  {}",
        style(format!(
            "Waiting up to {} for the instance to become active",
            format_duration(timeouts.instance_ready.as_secs())
        ))
        .dim()
    );

    let provisioner = Provisioner::new(provider, &timeouts);
    let connection = tokio::select! {
        result = provisioner.provision(request, ssh_key_path) => result?,
        _ = tokio::signal::ctrl_c() => return Err(DevOpsMateError::Interrupted),
    };

    print_connection(&connection);

    match ssh_program {
        Some(program) => {
            let api_key = Some(config.api_key.clone());
            run_install(&config, &connection, program, api_key, options.verbose).await
        }
        None => Ok(()),
    }
}

fn apply_overrides(config: &mut AppConfig, options: &UpOptions) {
    if let Some(key) = options.api_key.as_ref().filter(|k| !k.is_empty()) {
        config.api_key = key.clone();
    }
    if let Some(region) = &options.region {
        config.region = region.clone();
    }
    if let Some(size) = &options.size {
        config.size = size.clone();
    }
    if let Some(timeout) = &options.timeout {
        config.provision_timeout = timeout.clone();
    }
    if let Some(path) = &options.ssh_key {
        config.ssh_key_path = path.display().to_string();
    }
}

fn build_request(config: &AppConfig, hostname: String) -> InstanceRequest {
    InstanceRequest::new(hostname, &config.region, &config.size)
        .with_disk_image(&config.disk_image)
        .with_ssh_key_id(config.ssh_key_id.clone())
        .with_tag("devopsmate")
}

fn generate_hostname() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("devopsmate-{}", &id[..8])
}

fn print_connection(connection: &InstanceConnection) {
    println!(
        "{} Instance created with Public IP: {}",
        style("✓").green().bold(),
        style(connection.address).cyan().bold()
    );
    println!(
        "  SSH Key:  {}",
        style(connection.credential_ref.display()).dim()
    );
    println!("  Password: {}", style(&connection.generated_secret).yellow());
    println!(
        "  Connect:  {}",
        style(format!(
            "ssh -i {} {}",
            connection.credential_ref.display(),
            connection.target()
        ))
        .dim()
    );
}
