//! Subscription and usage command handlers

use colored::Colorize;
use prettytable::{format, row, Table};

use super::api_client;
use crate::api::Plan;
use crate::chat::UsageSnapshot;
use crate::cli::BillingCommand;
use crate::config::Config;
use crate::error::Result;

/// Dispatch a `billing` subcommand
pub async fn handle_billing(config: &Config, command: BillingCommand) -> Result<()> {
    let (api, _) = api_client(config)?;

    match command {
        BillingCommand::Usage => {
            let usage = api.usage().await?;
            println!("{}", describe_usage(&usage));
            if !usage.can_send() {
                println!(
                    "{}",
                    "You've used every message this period. Run `astrochat billing plans` to upgrade."
                        .yellow()
                );
            }
        }
        BillingCommand::Plans => {
            let plans = api.plans().await?;
            println!();
            plans_table(&plans).printstd();
            println!();
            println!(
                "Upgrade with {}.",
                "astrochat billing checkout <PLAN_ID>".cyan()
            );
        }
        BillingCommand::Subscription => {
            let sub = api.subscription().await?;
            println!("Plan:   {}", sub.plan.cyan());
            println!("Status: {}", sub.status);
            if let Some(end) = sub.current_period_end {
                let label = if sub.cancel_at_period_end {
                    "Ends"
                } else {
                    "Renews"
                };
                println!("{}: {}", label, end.format("%Y-%m-%d"));
            }
        }
        BillingCommand::Checkout { plan } => {
            let session = api.create_checkout(&plan, &config.billing).await?;
            println!("Complete your purchase in the browser:");
            println!("  {}", session.checkout_url.cyan().underline());
        }
        BillingCommand::Cancel => {
            let sub = api.cancel_subscription().await?;
            match sub.current_period_end {
                Some(end) => println!(
                    "{}",
                    format!(
                        "Subscription cancelled. You keep {} until {}.",
                        sub.plan,
                        end.format("%Y-%m-%d")
                    )
                    .green()
                ),
                None => println!("{}", "Subscription cancelled.".green()),
            }
        }
    }

    Ok(())
}

/// One-line usage summary, shared with the chat `/status` command.
pub fn describe_usage(usage: &UsageSnapshot) -> String {
    let plan = if usage.plan.is_empty() {
        "current"
    } else {
        usage.plan.as_str()
    };
    if usage.is_unlimited() {
        format!("{} plan: unlimited messages ({} used)", plan, usage.used)
    } else {
        format!(
            "{} plan: {} of {} messages left",
            plan,
            usage.messages_remaining().unwrap_or(0),
            usage.limit.unwrap_or(0)
        )
    }
}

fn plans_table(plans: &[Plan]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row![
        "ID".bold(),
        "Name".bold(),
        "Price".bold(),
        "Messages".bold(),
        "Features".bold()
    ]);
    for plan in plans {
        let price = match &plan.interval {
            Some(interval) => format!("${:.2}/{}", plan.price_cents as f64 / 100.0, interval),
            None => format!("${:.2}", plan.price_cents as f64 / 100.0),
        };
        let messages = plan
            .messages_per_month
            .map(|n| format!("{}/month", n))
            .unwrap_or_else(|| "unlimited".to_string());
        table.add_row(row![
            plan.id.cyan(),
            plan.name,
            price,
            messages,
            plan.features.join(", ")
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_limited_usage() {
        let usage = UsageSnapshot {
            plan: "free".to_string(),
            ..UsageSnapshot::limited(10, 3)
        };
        assert_eq!(describe_usage(&usage), "free plan: 3 of 10 messages left");
    }

    #[test]
    fn test_describe_unlimited_usage() {
        let usage = UsageSnapshot {
            plan: "pro".to_string(),
            used: 42,
            ..UsageSnapshot::unlimited()
        };
        assert_eq!(
            describe_usage(&usage),
            "pro plan: unlimited messages (42 used)"
        );
    }
}
