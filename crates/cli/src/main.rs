//! Delve CLI — the main entry point.
//!
//! Commands:
//! - `gateway` — Start the HTTP API server
//! - `ask`     — Ask one question and stream the reply
//! - `config`  — Show the effective or default configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "delve",
    about = "Delve — streaming research agent",
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
    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a question and stream the reply
    Ask {
        /// The question
        message: String,

        /// Run the research loop instead of a single reply
        #[arg(short, long)]
        research: bool,

        /// Comma-separated tools to enable (default: from config)
        #[arg(short, long, value_delimiter = ',')]
        tools: Option<Vec<String>>,

        /// Override the turn limit
        #[arg(long)]
        max_turns: Option<u32>,
    },

    /// Show configuration
    Config {
        /// Print the built-in defaults instead of the loaded config
        #[arg(long)]
        default: bool,

        /// Print the config file path only
        #[arg(long, conflicts_with = "default")]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
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
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Ask {
            message,
            research,
            tools,
            max_turns,
        } => {
            commands::ask::run(commands::ask::AskOptions {
                message,
                research,
                tools,
                max_turns,
            })
            .await?
        }
        Commands::Config { default, path } => {
            if path {
                commands::config_cmd::path().await?
            } else {
                commands::config_cmd::show(default).await?
            }
        }
    }

    Ok(())
}
