//! Commands that query a running controller

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, ControllerStatus};
use crate::output::{
    color_status, format_rmse, format_timestamp, format_value, mark_chosen, print_info,
    print_json, print_rows, OutputFormat,
};

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "Forecasts")]
    buffer_len: usize,
    #[tabled(rename = "RMSE")]
    rmse: String,
    #[tabled(rename = "Q")]
    value: String,
    #[tabled(rename = "N")]
    visits: u64,
}

#[derive(Tabled)]
struct RankRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Model")]
    model: String,
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;

    if format == OutputFormat::Json {
        return print_json(&status);
    }

    println!("Policy:        {}", status.policy);
    println!("Chosen model:  {}", status.chosen_model);
    println!("Cycle:         {}", status.cycle);
    println!("Bandit round:  {}", status.bandit_round);
    println!(
        "Open decision: {}",
        status.open_decision.as_deref().unwrap_or("-")
    );
    if let Some(last) = status.chosen_forecast.last() {
        println!("Last forecast: {}", format_value(*last));
    }
    println!("Updated:       {}", format_timestamp(status.generated_at));
    Ok(())
}

pub async fn list_models(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;
    let rows = model_rows(&status);
    print_rows(rows, &status.models, format)
}

fn model_rows(status: &ControllerStatus) -> Vec<ModelRow> {
    status
        .models
        .iter()
        .map(|m| ModelRow {
            name: mark_chosen(&m.name, m.name == status.chosen_model),
            buffer_len: m.buffer_len,
            rmse: format_rmse(m.rmse),
            value: format_value(m.value),
            visits: m.visits,
        })
        .collect()
}

pub async fn show_ranking(client: &ApiClient, k: Option<usize>, format: OutputFormat) -> Result<()> {
    let ranking = client.ranking(k).await?;
    let rows = ranking
        .ranking
        .iter()
        .enumerate()
        .map(|(i, model)| RankRow {
            rank: i + 1,
            model: model.clone(),
        })
        .collect();
    print_rows(rows, &ranking, format)
}

pub async fn show_forecast(client: &ApiClient, period: usize, format: OutputFormat) -> Result<()> {
    let forecast = client.forecast(period).await?;

    if format == OutputFormat::Json {
        return print_json(&forecast);
    }
    print_info(&format!(
        "Period {} forecast from '{}': {}",
        forecast.period,
        forecast.model,
        format_value(forecast.value)
    ));
    Ok(())
}

pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    if format == OutputFormat::Json {
        return print_json(&health);
    }
    println!("Overall: {}", color_status(&health.status));
    let rows = health
        .components
        .iter()
        .map(|(name, c)| ComponentRow {
            name: name.clone(),
            status: color_status(&c.status),
            message: c.message.clone().unwrap_or_default(),
        })
        .collect();
    print_rows(rows, &health, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ModelStatus;

    fn status() -> ControllerStatus {
        ControllerStatus {
            cycle: 2,
            policy: "accuracy".to_string(),
            chosen_model: "fft".to_string(),
            chosen_index: 1,
            bandit_round: 0,
            open_decision: None,
            models: vec![
                ModelStatus {
                    name: "basic".to_string(),
                    buffer_len: 12,
                    rmse: Some(4.0),
                    value: 0.0,
                    visits: 0,
                },
                ModelStatus {
                    name: "fft".to_string(),
                    buffer_len: 12,
                    rmse: Some(1.5),
                    value: 0.0,
                    visits: 0,
                },
            ],
            ranking: vec!["basic".to_string(), "fft".to_string()],
            chosen_forecast: vec![0.0, 3.0, 4.0],
            generated_at: 0,
        }
    }

    #[test]
    fn test_model_rows_mark_chosen() {
        let rows = model_rows(&status());
        assert_eq!(rows.len(), 2);
        assert!(rows[1].name.contains("fft"));
        assert!(rows[1].name.contains('▶'));
        assert!(!rows[0].name.contains('▶'));
        assert_eq!(rows[1].rmse, "1.500");
    }
}
