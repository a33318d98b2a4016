//! Birth chart command handlers

use colored::Colorize;
use prettytable::{format, row, Table};

use super::{api_client, print_json};
use crate::api::{BirthChart, NewBirthChart};
use crate::cli::ChartCommand;
use crate::config::Config;
use crate::error::Result;

/// Dispatch a `charts` subcommand
pub async fn handle_charts(config: &Config, command: ChartCommand) -> Result<()> {
    let (api, _) = api_client(config)?;

    match command {
        ChartCommand::List { json } => {
            let charts = api.list_charts().await?;
            if json {
                return print_json(&charts);
            }
            if charts.is_empty() {
                println!("{}", "No charts saved yet.".yellow());
                println!(
                    "Create one with {}.",
                    "astrochat charts create --name <name> --date <YYYY-MM-DD> --location <place>"
                        .cyan()
                );
                return Ok(());
            }
            println!();
            charts_table(&charts, &[]).printstd();
            println!();
        }
        ChartCommand::Show { id, json } => {
            let chart = api.get_chart(&id).await?;
            if json {
                return print_json(&chart);
            }
            print_chart(&chart);
        }
        ChartCommand::Create {
            name,
            date,
            time,
            location,
            latitude,
            longitude,
            timezone,
        } => {
            let chart = api
                .create_chart(&NewBirthChart {
                    name,
                    birth_date: date,
                    birth_time: time,
                    birth_location: location,
                    latitude,
                    longitude,
                    timezone,
                })
                .await?;
            println!(
                "{}",
                format!("Created chart '{}' ({})", chart.name, chart.id).green()
            );
        }
        ChartCommand::Delete { id } => {
            api.delete_chart(&id).await?;
            println!("{}", format!("Deleted chart {}", id).green());
        }
    }

    Ok(())
}

/// Table of charts, marking the ids in `selected`.
pub fn charts_table(charts: &[BirthChart], selected: &[String]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row![
        "".bold(),
        "ID".bold(),
        "Name".bold(),
        "Born".bold(),
        "Place".bold()
    ]);

    for chart in charts {
        let mark = if selected.contains(&chart.id) { "*" } else { "" };
        let born = match &chart.birth_time {
            Some(time) => format!("{} {}", chart.birth_date, time),
            None => chart.birth_date.to_string(),
        };
        table.add_row(row![
            mark.green(),
            chart.id.cyan(),
            chart.name,
            born,
            chart.birth_location
        ]);
    }
    table
}

fn print_chart(chart: &BirthChart) {
    println!();
    println!("{} {}", chart.name.bold(), format!("({})", chart.id).dimmed());
    println!("  Born:     {}", chart.birth_date);
    if let Some(time) = &chart.birth_time {
        println!("  Time:     {}", time);
    }
    println!("  Place:    {}", chart.birth_location);
    if let (Some(lat), Some(lon)) = (chart.latitude, chart.longitude) {
        println!("  Coords:   {:.4}, {:.4}", lat, lon);
    }
    if let Some(tz) = &chart.timezone {
        println!("  Timezone: {}", tz);
    }
    if let Some(data) = &chart.chart_data {
        match serde_json::to_string_pretty(data) {
            Ok(text) => {
                println!("  Placements:");
                for line in text.lines() {
                    println!("    {}", line);
                }
            }
            Err(e) => tracing::warn!("could not render chart data: {}", e),
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn chart(id: &str) -> BirthChart {
        BirthChart {
            id: id.to_string(),
            name: "Me".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 4, 12).unwrap(),
            birth_time: Some("06:30".to_string()),
            birth_location: "Lisbon".to_string(),
            latitude: None,
            longitude: None,
            timezone: None,
            chart_data: None,
            created_at: None,
        }
    }

    #[test]
    fn test_charts_table_has_header_and_rows() {
        let table = charts_table(&[chart("a"), chart("b")], &["b".to_string()]);
        assert_eq!(table.len(), 3);
    }
}
