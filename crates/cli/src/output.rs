//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    /// Parse a format name stored in the CLI config file
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Print rows as a table, or the serializable value as JSON
pub fn print_rows<T: Tabled, J: Serialize + ?Sized>(rows: Vec<T>, json: &J, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(json),
        OutputFormat::Table => {
            if rows.is_empty() {
                print_warning("No items found");
                return Ok(());
            }
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
            Ok(())
        }
    }
}

pub fn print_json<J: Serialize + ?Sized>(value: &J) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an error estimate; infinite means the model had nothing to compare yet
pub fn format_rmse(rmse: Option<f64>) -> String {
    match rmse {
        Some(v) if v.is_finite() => format!("{:.3}", v),
        Some(_) => "inf".to_string(),
        None => "-".to_string(),
    }
}

pub fn format_value(value: f64) -> String {
    format!("{:.4}", value)
}

pub fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Highlight the model currently driving scaling
pub fn mark_chosen(name: &str, chosen: bool) -> String {
    if chosen {
        format!("{} {}", "▶".green().bold(), name.bold())
    } else {
        format!("  {}", name)
    }
}
