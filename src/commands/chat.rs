//! Interactive chat handler.
//!
//! Starts a [`ChatClient`] over the WebSocket connector, spawns a printer
//! task that renders [`ChatEvent`]s, and runs a readline loop that sends
//! each line through the [`ChatHandle`]. Lines starting with `/` are
//! handled locally (see [`super::special_commands`]).

use std::sync::Arc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::broadcast;

use super::billing::describe_usage;
use super::charts::charts_table;
use super::special_commands::{parse_special_command, print_help, SpecialCommand};
use super::api_client;
use crate::api::ApiClient;
use crate::chat::transport::websocket::WebSocketConnector;
use crate::chat::{
    ChatClient, ChatEvent, ChatHandle, ChatMessage, ConnectionState, NoticeLevel, Role,
    SendOutcome,
};
use crate::config::Config;
use crate::error::{AstroChatError, Result};

/// Start interactive chat
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `charts` - Charts selected before the first message
/// * `resume` - Conversation to continue
pub async fn run_chat(config: Config, charts: Vec<String>, resume: Option<String>) -> Result<()> {
    let (api, tokens) = api_client(&config)?;
    // The WebSocket handshake cannot refresh on rejection, so do it up front.
    api.ensure_fresh_token().await?;
    let api = Arc::new(api);

    let history = match &resume {
        Some(id) => {
            let detail = api.get_conversation(id).await?;
            Some((id.clone(), detail.messages))
        }
        None => None,
    };

    let (client, handle) =
        ChatClient::new(&config, Arc::new(WebSocketConnector::new()), tokens);
    let client = client.with_usage_source(api.clone());
    let printer = tokio::spawn(print_events(handle.subscribe()));
    let mut replies = handle.subscribe();
    let driver = tokio::spawn(client.run());

    print_welcome_banner();

    if let Some((id, messages)) = history {
        println!("{}", format!("Continuing conversation {}", id).dimmed());
        for message in &messages {
            print_message(message.role, &message.content);
        }
        let messages = messages.into_iter().map(ChatMessage::from).collect();
        handle.resume_conversation(id, messages).await?;
    }
    for chart in charts {
        handle.toggle_chart(chart).await?;
    }

    let mut rl = DefaultEditor::new()?;
    let prompt = format!("{} ", "✦>".magenta().bold());

    loop {
        let line = tokio::task::block_in_place(|| rl.readline(&prompt));
        match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match parse_special_command(trimmed) {
                    Ok(SpecialCommand::None) => {}
                    Ok(SpecialCommand::Exit) => break,
                    Ok(command) => {
                        if let Err(e) = handle_special_command(command, &handle, &api).await {
                            println!("{}", format!("Error: {}", e).red());
                        }
                        continue;
                    }
                    Err(e) => {
                        println!("{}", e.to_string().red());
                        continue;
                    }
                }

                let _ = rl.add_history_entry(trimmed);

                drain(&mut replies);
                // Every other outcome has already been reported by the printer.
                if let SendOutcome::Sent(_) = handle.send_message(trimmed).await? {
                    wait_for_reply(&mut replies).await;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("EOF");
                break;
            }
            Err(err) => {
                tracing::error!("Readline error: {:?}", err);
                break;
            }
        }
    }

    handle.shutdown().await?;
    driver
        .await
        .map_err(|e| AstroChatError::Transport(format!("chat driver panicked: {}", e)))??;
    printer.abort();
    println!("Goodbye!");
    Ok(())
}

async fn handle_special_command(
    command: SpecialCommand,
    handle: &ChatHandle,
    api: &ApiClient,
) -> Result<()> {
    match command {
        SpecialCommand::ListCharts => {
            let charts = api.list_charts().await?;
            if charts.is_empty() {
                println!("{}", "No charts saved yet.".yellow());
            } else {
                let selected = handle.snapshot().await?.selected_charts;
                charts_table(&charts, &selected).printstd();
            }
        }
        SpecialCommand::SelectChart(id) => handle.toggle_chart(id).await?,
        SpecialCommand::ClearCharts => handle.clear_charts().await?,
        SpecialCommand::ShowStatus => {
            let snap = handle.snapshot().await?;
            println!();
            println!("Connection:   {}", state_label(snap.state));
            println!(
                "Conversation: {}",
                snap.conversation_id.as_deref().unwrap_or("(new)")
            );
            let charts = if snap.selected_charts.is_empty() {
                "(none)".to_string()
            } else {
                snap.selected_charts.join(", ")
            };
            println!("Charts:       {}", charts);
            println!("Messages:     {}", snap.messages.len());
            if let Some(usage) = &snap.usage {
                println!("Usage:        {}", describe_usage(usage));
            }
            if snap.reconnect_attempts > 0 {
                println!("Reconnects:   {}", snap.reconnect_attempts);
            }
            println!();
        }
        SpecialCommand::Reconnect => handle.connect().await?,
        SpecialCommand::Help => print_help(),
        SpecialCommand::Exit | SpecialCommand::None => {}
    }
    Ok(())
}

fn drain(rx: &mut broadcast::Receiver<ChatEvent>) {
    loop {
        match rx.try_recv() {
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

/// Block the prompt until the pending send resolves or the user presses
/// Ctrl-C.
async fn wait_for_reply(rx: &mut broadcast::Receiver<ChatEvent>) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(ChatEvent::LoadingChanged(false)) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "(stopped waiting; the reply will still appear)".dimmed());
                return;
            }
        }
    }
}

async fn print_events(mut rx: broadcast::Receiver<ChatEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(text) = render_event(&event) {
                    println!("{}", text);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("chat printer skipped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Terminal rendering of one event; `None` for events that print nothing.
fn render_event(event: &ChatEvent) -> Option<String> {
    match event {
        ChatEvent::StateChanged(state) => Some(format!("[{}]", state_label(*state))),
        ChatEvent::MessageAppended(message) if message.role == Role::Assistant => {
            let mut text = format_message(message.role, &message.content);
            for call in &message.tool_calls {
                let status = if call.success { "ok" } else { "failed" };
                text.push_str(&format!("\n  {}", format!("↳ {} ({})", call.name, status).dimmed()));
            }
            if !message.chart_references.is_empty() {
                text.push_str(&format!(
                    "\n  {}",
                    format!("charts: {}", message.chart_references.join(", ")).dimmed()
                ));
            }
            Some(text)
        }
        ChatEvent::MessageAppended(_) => None,
        ChatEvent::MessageRemoved { .. } => Some("(your last message was not delivered)".dimmed().to_string()),
        ChatEvent::LoadingChanged(true) => Some("✦ consulting the stars...".dimmed().to_string()),
        ChatEvent::LoadingChanged(false) => None,
        ChatEvent::ConversationBound(id) => {
            tracing::debug!(conversation_id = %id, "conversation bound");
            None
        }
        ChatEvent::Notice { level, text } => Some(match level {
            NoticeLevel::Error => text.red().to_string(),
            NoticeLevel::Info => text.cyan().to_string(),
        }),
        ChatEvent::UpgradeRequired => Some(
            format!(
                "Upgrade to keep chatting: {}",
                "astrochat billing plans".bold()
            )
            .yellow()
            .to_string(),
        ),
        ChatEvent::UsageRefreshRequested => None,
        ChatEvent::UsageUpdated(usage) => match usage.messages_remaining() {
            Some(left) if !usage.is_unlimited() && left <= 3 => Some(
                format!("{} messages left this period", left)
                    .yellow()
                    .to_string(),
            ),
            _ => None,
        },
        ChatEvent::ChartsChanged(charts) if charts.is_empty() => {
            Some("charts: (none)".dimmed().to_string())
        }
        ChatEvent::ChartsChanged(charts) => {
            Some(format!("charts: {}", charts.join(", ")).dimmed().to_string())
        }
    }
}

fn state_label(state: ConnectionState) -> String {
    match state {
        ConnectionState::Connected => "● connected".green().to_string(),
        ConnectionState::Connecting => "◌ connecting".yellow().to_string(),
        ConnectionState::Disconnected => "○ disconnected".dimmed().to_string(),
        ConnectionState::Error => "✖ connection lost (/reconnect to retry)".red().to_string(),
    }
}

fn format_message(role: Role, content: &str) -> String {
    let who = match role {
        Role::User => "You".cyan().bold(),
        Role::Assistant => "Astrologer".magenta().bold(),
    };
    format!("{}: {}", who, content)
}

fn print_message(role: Role, content: &str) {
    println!("{}", format_message(role, content));
}

fn print_welcome_banner() {
    println!();
    println!("{}", "astrochat".magenta().bold());
    println!("Ask about your charts. Type {} for commands.", "/help".cyan());
    println!();
}
