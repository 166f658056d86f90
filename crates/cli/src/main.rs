//! Jarvis CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Write the default config
//! - `serve`: Start the HTTP gateway and web client
//! - `chat`: Interactive chat or single-message mode
//! - `classify`: Show which capability a message would force
//! - `mcp`: Serve the calendar tools to MCP clients over stdio

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "jarvis",
    about = "Jarvis: personal voice assistant for your calendar and the weather",
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
    /// Write the default configuration to ~/.jarvis/config.toml
    Onboard,

    /// Start the HTTP gateway (API + web client)
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with Jarvis from the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Print the capability the intent classifier would force for TEXT
    Classify {
        text: String,
    },

    /// Serve view_calendar and create_event to MCP clients over stdio
    Mcp,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Classify { text } => commands::classify::run(&text),
        Commands::Mcp => commands::mcp::run().await?,
    }

    Ok(())
}
