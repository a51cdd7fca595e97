use console::style;

use crate::config::AppConfig;
use crate::error::Result;
use crate::utils::redact;

pub fn show() -> Result<()> {
    let config_path = AppConfig::config_path()?;
    let config = AppConfig::load()?;

    if !config_path.exists() {
        println!("{}", style("No configuration file found, using defaults.").dim());
        println!();
    }

    println!("{}", style("Current Configuration").bold().cyan());
    println!();
    println!("  Provider:       {}", style(&config.provider).white());
    print!("  API key:        ");
    if config.api_key.is_empty() {
        println!("{}", style("(not set)").dim());
    } else {
        println!("{}", style(redact(&config.api_key)).white());
    }
    println!("  Region:         {}", style(&config.region).white());
    println!("  Size:           {}", style(&config.size).white());
    println!("  Disk image:     {}", style(&config.disk_image).white());
    println!("  SSH key:        {}", style(&config.ssh_key_path).dim());
    print!("  SSH key id:     ");
    match &config.ssh_key_id {
        Some(id) => println!("{}", style(id).white()),
        None => println!("{}", style("(none)").dim()),
    }
    println!("  Timeout:        {}", style(&config.provision_timeout).yellow());
    println!("  Poll interval:  {}", style(&config.poll_interval).yellow());
    println!("  Step timeout:   {}", style(&config.install_step_timeout).yellow());
    println!(
        "  Cluster:        {} ({} x {})",
        style(&config.cluster.name).white(),
        config.cluster.nodes,
        style(&config.cluster.size).dim()
    );
    println!();
    println!("Config file: {}", style(config_path.display()).dim());

    Ok(())
}

pub fn set(key: &str, value: &str) -> Result<()> {
    let path = AppConfig::config_path()?;
    // Environment keys are not persisted
    let mut config = AppConfig::load_from(&path)?;

    config.set_value(key, value)?;
    config.save_to(&path)?;

    let shown = if key.replace('-', "_") == "api_key" {
        redact(value)
    } else {
        value.to_string()
    };
    println!(
        "{} Set {} = {}",
        style("✓").green().bold(),
        style(key).cyan(),
        style(shown).white()
    );

    Ok(())
}

pub fn path() -> Result<()> {
    println!("{}", AppConfig::config_path()?.display());
    Ok(())
}
