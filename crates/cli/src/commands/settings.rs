//! Local CLI configuration commands

use anyhow::Result;

use crate::config::Config;
use crate::output::{print_info, print_json, OutputFormat};

pub fn set_api_url(mut config: Config, url: &str) -> Result<()> {
    url::Url::parse(url)?;
    config.api_url = Some(url.to_string());
    config.save()?;
    print_info(&format!("API URL set to {}", url));
    Ok(())
}

pub fn set_format(mut config: Config, format: OutputFormat) -> Result<()> {
    let name = match format {
        OutputFormat::Table => "table",
        OutputFormat::Json => "json",
    };
    config.default_format = Some(name.to_string());
    config.save()?;
    print_info(&format!("Default output format set to {}", name));
    Ok(())
}

pub fn show(config: &Config, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(config);
    }
    println!("Config file:    {}", Config::config_path()?.display());
    println!(
        "API URL:        {}",
        config.api_url.as_deref().unwrap_or("(default)")
    );
    println!(
        "Default format: {}",
        config.default_format.as_deref().unwrap_or("table")
    );
    Ok(())
}
