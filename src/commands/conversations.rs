//! Conversation history command handlers

use colored::Colorize;
use prettytable::{format, row, Table};

use super::{api_client, print_json};
use crate::api::ConversationSummary;
use crate::chat::Role;
use crate::cli::ConversationCommand;
use crate::config::Config;
use crate::error::Result;

/// Dispatch a `conversations` subcommand
pub async fn handle_conversations(config: &Config, command: ConversationCommand) -> Result<()> {
    let (api, _) = api_client(config)?;

    match command {
        ConversationCommand::List { json } => {
            let conversations = api.list_conversations().await?;
            if json {
                return print_json(&conversations);
            }
            if conversations.is_empty() {
                println!("{}", "No conversations yet.".yellow());
                return Ok(());
            }

            println!("\nConversation History:");
            conversations_table(&conversations).printstd();
            println!();
            println!(
                "Use {} to continue a conversation.",
                "astrochat chat --resume <ID>".cyan()
            );
            println!();
        }
        ConversationCommand::Show { id, json } => {
            let detail = api.get_conversation(&id).await?;
            if json {
                return print_json(&detail);
            }
            let title = detail.summary.title.as_deref().unwrap_or("Untitled");
            println!("\n{} {}\n", title.bold(), format!("({})", id).dimmed());
            for message in &detail.messages {
                let who = match message.role {
                    Role::User => "You".cyan().bold(),
                    Role::Assistant => "Astrologer".magenta().bold(),
                };
                println!("{}: {}\n", who, message.content);
            }
        }
        ConversationCommand::Delete { id } => {
            api.delete_conversation(&id).await?;
            println!("{}", format!("Deleted conversation {}", id).green());
        }
    }

    Ok(())
}

fn conversations_table(conversations: &[ConversationSummary]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for conversation in conversations {
        let title = conversation.title.as_deref().unwrap_or("Untitled");
        let title = if title.chars().count() > 40 {
            format!("{}...", title.chars().take(37).collect::<String>())
        } else {
            title.to_string()
        };
        let updated = conversation
            .updated_at
            .unwrap_or(conversation.created_at)
            .format("%Y-%m-%d %H:%M")
            .to_string();
        let count = conversation
            .message_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(row![conversation.id.cyan(), title, count, updated]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_long_titles_are_truncated() {
        let conversation = ConversationSummary {
            id: "c1".to_string(),
            title: Some("ā".repeat(60)),
            created_at: Utc::now(),
            updated_at: None,
            message_count: None,
        };
        let table = conversations_table(&[conversation]);
        let rendered = table.to_string();
        assert!(rendered.contains("..."));
        assert!(!rendered.contains(&"ā".repeat(41)));
    }
}
