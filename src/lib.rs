//! astrochat - terminal client for an AI astrology service
//!
//! This library provides the chat connection manager for the astrologer
//! assistant together with the REST wrappers, credential storage and
//! configuration the terminal front end needs.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `chat`: WebSocket connection manager, message reducer, usage gate,
//!   reconnect policy and the send path state machine
//! - `api`: REST client for auth, birth charts, conversations and billing
//! - `auth`: Token storage (OS keyring or in-memory)
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Handlers behind each CLI command
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use astrochat::auth::build_token_store;
//! use astrochat::chat::transport::websocket::WebSocketConnector;
//! use astrochat::chat::ChatClient;
//! use astrochat::cli::Cli;
//! use astrochat::Config;
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cli = Cli::parse_from(["astrochat", "chat"]);
//!     let config = Config::load(Path::new("config.yaml"), &cli)?;
//!     config.validate()?;
//!
//!     let tokens = build_token_store(&config.auth);
//!     let (client, handle) =
//!         ChatClient::new(&config, Arc::new(WebSocketConnector::new()), tokens);
//!     tokio::spawn(client.run());
//!     handle.send_message("What does my Moon in Scorpio mean?").await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use api::ApiClient;
pub use chat::{ChatClient, ChatEvent, ChatHandle, ConnectionState, SendOutcome};
pub use config::Config;
pub use error::{AstroChatError, Result};
