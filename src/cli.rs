//! Command-line interface definition for astrochat
//!
//! This module defines the CLI structure using clap's derive API: account
//! management, birth charts, conversation history, billing, and the
//! interactive chat.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// astrochat - talk to your AI astrologer from the terminal
///
/// Manage your birth charts and subscription, and chat with an assistant
/// that reads your charts.
#[derive(Parser, Debug, Clone)]
#[command(name = "astrochat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL, overriding config and environment
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Log in, sign up, log out, or show the current account
    Auth {
        /// Account subcommand
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Manage saved birth charts
    Charts {
        /// Chart subcommand
        #[command(subcommand)]
        command: ChartCommand,
    },

    /// Browse past conversations
    Conversations {
        /// Conversation subcommand
        #[command(subcommand)]
        command: ConversationCommand,
    },

    /// Subscription, usage and upgrades
    Billing {
        /// Billing subcommand
        #[command(subcommand)]
        command: BillingCommand,
    },

    /// Start an interactive chat with the astrologer
    Chat {
        /// Chart to include with every message (repeatable)
        #[arg(long = "chart", value_name = "CHART_ID")]
        charts: Vec<String>,

        /// Continue an existing conversation
        #[arg(short, long, value_name = "CONVERSATION_ID")]
        resume: Option<String>,
    },
}

/// Account subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Log in with email and password
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,

        /// Account password (prompted when omitted)
        #[arg(long, env = "ASTROCHAT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account
    Signup {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,

        /// Password (prompted when omitted)
        #[arg(long, env = "ASTROCHAT_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Log out and forget stored tokens
    Logout,

    /// Show the logged-in account
    Whoami,
}

/// Birth chart subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ChartCommand {
    /// List saved charts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one chart
    Show {
        /// Chart id
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Save a new chart
    Create {
        /// Label for the chart
        #[arg(short, long)]
        name: String,

        /// Date of birth (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        /// Local time of birth (HH:MM)
        #[arg(short, long)]
        time: Option<String>,

        /// Place of birth
        #[arg(short, long)]
        location: String,

        /// Latitude of the birthplace
        #[arg(long, allow_hyphen_values = true)]
        latitude: Option<f64>,

        /// Longitude of the birthplace
        #[arg(long, allow_hyphen_values = true)]
        longitude: Option<f64>,

        /// IANA time zone of the birthplace
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Delete a chart
    Delete {
        /// Chart id
        id: String,
    },
}

/// Conversation history subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConversationCommand {
    /// List past conversations
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one conversation
    Show {
        /// Conversation id
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a conversation
    Delete {
        /// Conversation id
        id: String,
    },
}

/// Billing subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum BillingCommand {
    /// Messages used and remaining this period
    Usage,

    /// Plans available for purchase
    Plans,

    /// Current subscription
    Subscription,

    /// Start a hosted checkout for a plan
    Checkout {
        /// Plan id (see `billing plans`)
        plan: String,
    },

    /// Cancel the subscription at period end
    Cancel,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
