/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `auth`           - Log in, sign up, log out, show the account
- `charts`         - Birth chart management
- `conversations`  - Conversation history
- `billing`        - Subscription, usage and checkout
- `chat`           - Interactive chat over the WebSocket connection

The handlers stay small: they build an [`ApiClient`] or a
[`crate::chat::ChatClient`] from configuration and render the results.
*/

use std::sync::Arc;

use crate::api::ApiClient;
use crate::auth::{build_token_store, TokenStore};
use crate::config::Config;
use crate::error::{AstroChatError, Result};

// Slash-command parser for the interactive chat
pub mod special_commands;

pub mod billing;
pub mod charts;
pub mod chat;
pub mod conversations;

/// Build the REST client and the token store it shares with chat.
pub fn api_client(config: &Config) -> Result<(ApiClient, Arc<dyn TokenStore>)> {
    let tokens = build_token_store(&config.auth);
    let api = ApiClient::new(&config.api, tokens.clone())?;
    Ok((api, tokens))
}

/// Read one line from the terminal, failing on Ctrl-C / Ctrl-D.
fn prompt_line(label: &str) -> Result<String> {
    let mut rl = rustyline::DefaultEditor::new()?;
    let line = rl
        .readline(label)
        .map_err(|e| AstroChatError::Config(format!("input aborted: {}", e)))?;
    Ok(line.trim().to_string())
}

fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => prompt_line(label),
    }
}

/// Print a value as pretty JSON.
fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// Account command handlers
pub mod auth {
    //! Account handlers.
    //!
    //! Login and signup store the returned tokens in the configured
    //! [`TokenStore`](crate::auth::TokenStore) so later commands (and the
    //! chat connection) pick them up.

    use super::*;
    use crate::cli::AuthCommand;
    use colored::Colorize;

    /// Dispatch an `auth` subcommand
    pub async fn handle_auth(config: &Config, command: AuthCommand) -> Result<()> {
        let (api, _) = api_client(config)?;

        match command {
            AuthCommand::Login { email, password } => {
                let email = value_or_prompt(email, "Email: ")?;
                let password = value_or_prompt(password, "Password: ")?;
                api.login(&email, &password).await?;
                println!("{}", format!("Logged in as {}", email).green());
            }
            AuthCommand::Signup {
                email,
                password,
                name,
            } => {
                let email = value_or_prompt(email, "Email: ")?;
                let password = value_or_prompt(password, "Password: ")?;
                api.signup(&email, &password, name.as_deref()).await?;
                println!("{}", format!("Account created for {}", email).green());
            }
            AuthCommand::Logout => {
                api.logout().await?;
                println!("{}", "Logged out.".green());
            }
            AuthCommand::Whoami => match api.token_store().load()? {
                None => println!("{}", "Not logged in.".yellow()),
                Some(_) => {
                    let user = api.me().await?;
                    println!("Email: {}", user.email.cyan());
                    if let Some(name) = &user.full_name {
                        println!("Name:  {}", name);
                    }
                    println!("ID:    {}", user.id);
                }
            },
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenStoreKind;

    #[test]
    fn test_api_client_uses_configured_store() {
        let mut config = Config::default();
        config.auth.token_store = TokenStoreKind::Memory;
        let (api, tokens) = api_client(&config).unwrap();
        assert!(tokens.load().unwrap().is_none());
        assert!(Arc::ptr_eq(api.token_store(), &tokens));
    }

    #[test]
    fn test_value_or_prompt_prefers_given_value() {
        assert_eq!(
            value_or_prompt(Some("a@b.c".to_string()), "Email: ").unwrap(),
            "a@b.c"
        );
    }
}
