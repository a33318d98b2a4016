//! astrochat - terminal client for an AI astrology service
//!
#![doc = "astrochat - terminal client for an AI astrology service"]
#![doc = "Main entry point for the astrochat binary."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use astrochat::cli::{Cli, Commands};
use astrochat::commands;
use astrochat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Auth { command } => {
            tracing::debug!("Starting auth command");
            commands::auth::handle_auth(&config, command).await?;
        }
        Commands::Charts { command } => {
            tracing::debug!("Starting charts command");
            commands::charts::handle_charts(&config, command).await?;
        }
        Commands::Conversations { command } => {
            tracing::debug!("Starting conversations command");
            commands::conversations::handle_conversations(&config, command).await?;
        }
        Commands::Billing { command } => {
            tracing::debug!("Starting billing command");
            commands::billing::handle_billing(&config, command).await?;
        }
        Commands::Chat { charts, resume } => {
            tracing::info!("Starting interactive chat");
            if let Some(id) = &resume {
                tracing::debug!("Resuming conversation: {}", id);
            }
            commands::chat::run_chat(config, charts, resume).await?;
        }
    }

    Ok(())
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug output for
/// this crate.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "astrochat=debug"
    } else {
        "astrochat=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
