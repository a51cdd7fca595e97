pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "devopsmate")]
#[command(version)]
#[command(about = "Provision a cloud instance and install a DevOps toolchain on it")]
#[command(long_about = "Creates a Civo instance, waits for it to come up, then installs Jenkins, SonarQube, Buildpacks and a managed Kubernetes cluster over SSH.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an instance and install the toolchain on it
    Up {
        /// Civo API key
        #[arg(long, env = "CIVO_TOKEN", hide_env_values = true)]
        api_key: Option<String>,

        /// Region for the instance (e.g., LON1)
        #[arg(short, long)]
        region: Option<String>,

        /// SSH private key used to reach the instance
        #[arg(long)]
        ssh_key: Option<PathBuf>,

        /// Instance size (e.g., g3.medium)
        #[arg(short, long)]
        size: Option<String>,

        /// Provisioning deadline (e.g., 10m)
        #[arg(short, long)]
        timeout: Option<String>,

        /// Stop once the instance is reachable
        #[arg(long)]
        skip_install: bool,
    },

    /// Install the toolchain on an existing host
    Install {
        /// IP address or DNS name of the host
        #[arg(long)]
        host: String,

        /// Login user on the host
        #[arg(short, long, default_value = crate::provider::config::DEFAULT_INITIAL_USER)]
        user: String,

        /// SSH private key used to reach the host
        #[arg(long)]
        ssh_key: Option<PathBuf>,

        /// Civo API key for the remote civo CLI
        #[arg(long, env = "CIVO_TOKEN", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// List the install steps in order
    Steps {
        /// Print each step's script
        #[arg(long)]
        script: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Print the configuration file path
    Path,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let verbose = self.verbose;

        match self.command {
            Commands::Up {
                api_key,
                region,
                ssh_key,
                size,
                timeout,
                skip_install,
            } => {
                let config = AppConfig::load()?;
                let options = commands::up::UpOptions {
                    api_key,
                    region,
                    ssh_key,
                    size,
                    timeout,
                    skip_install,
                    verbose,
                };
                commands::up::execute(config, options).await
            }
            Commands::Install {
                host,
                user,
                ssh_key,
                api_key,
            } => {
                let config = AppConfig::load()?;
                commands::install::execute(&config, host, user, ssh_key, api_key, verbose).await
            }
            Commands::Steps { script } => {
                let config = AppConfig::load()?;
                commands::steps::execute(&config, script)
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => commands::config::show(),
                ConfigCommands::Set { key, value } => commands::config::set(&key, &value),
                ConfigCommands::Path => commands::config::path(),
            },
        }
    }
}
