//! Waypoint CLI - the main entry point.
//!
//! Commands:
//! - `chat`   : Interactive booking conversation or single-message mode
//! - `serve`  : Start the HTTP gateway
//! - `graph`  : Print the node graph as a Mermaid flowchart
//! - `config` : Show, validate or locate the configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "waypoint",
    about = "Waypoint - conversational travel booking orchestrator",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the booking assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Conversation thread to continue
        #[arg(short, long, default_value = "cli")]
        thread: String,

        /// Keep state in memory only, ignoring the configured store
        #[arg(long)]
        ephemeral: bool,
    },

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the node graph as Mermaid
    Graph,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Load and validate the configuration
    Validate,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            thread,
            ephemeral,
        } => commands::chat::run(message, thread, ephemeral).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Graph => commands::graph::run()?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Path => commands::config_cmd::path()?,
        },
    }

    Ok(())
}
