//! Adaptive controller CLI
//!
//! Queries a running controller for its chosen model, per-model estimates,
//! bandit ranking, forecasts and health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{controller, settings};

#[derive(Parser)]
#[command(name = "actl")]
#[command(author, version, about = "CLI for the adaptive forecast-selection controller", long_about = None)]
pub struct Cli {
    /// Controller API URL (can also be set via ACTL_API_URL or the config file)
    #[arg(long, env = "ACTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format (defaults to the config file setting, then table)
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the active policy, chosen model and open decision
    Status,

    /// List every model with its error estimate and bandit statistics
    Models,

    /// Show the top-k models by bandit score
    Rank {
        /// Number of models to show (controller default if omitted)
        #[arg(long, short)]
        k: Option<usize>,
    },

    /// Show the chosen model's forecast for a period
    Forecast {
        /// Period index; values past the horizon clamp to the last forecast
        #[arg(long, short, default_value_t = 0)]
        period: usize,
    },

    /// Show component health
    Health,

    /// Manage the local CLI configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration
    Show,

    /// Set the default controller API URL
    SetUrl {
        url: String,
    },

    /// Set the default output format
    SetFormat {
        format: output::OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_name)
        })
        .unwrap_or_default();

    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url.as_deref()))?;

    match cli.command {
        Commands::Status => controller::show_status(&client, format).await?,
        Commands::Models => controller::list_models(&client, format).await?,
        Commands::Rank { k } => controller::show_ranking(&client, k, format).await?,
        Commands::Forecast { period } => controller::show_forecast(&client, period, format).await?,
        Commands::Health => controller::show_health(&client, format).await?,
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => settings::show(&config, format)?,
            ConfigCommands::SetUrl { url } => settings::set_api_url(config, &url)?,
            ConfigCommands::SetFormat { format } => settings::set_format(config, format)?,
        },
    }

    Ok(())
}
