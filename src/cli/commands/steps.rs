use console::style;

use crate::config::AppConfig;
use crate::error::Result;
use crate::install::default_steps;

pub fn execute(config: &AppConfig, show_script: bool) -> Result<()> {
    let api_key = Some(config.api_key.clone());
    let steps = default_steps(config, api_key);

    println!("{}", style("Install steps").bold().cyan());
    println!();

    for (index, step) in steps.iter().enumerate() {
        println!("  {} {}", style(format!("{}.", index + 1)).dim(), step.name());

        if show_script {
            for line in step.script().lines() {
                println!("       {}", style(line).dim());
            }
            println!();
        }
    }

    Ok(())
}
