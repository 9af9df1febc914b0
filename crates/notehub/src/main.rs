//! notehub - personal hierarchical notes over MCP
//!
//! Subcommands:
//! - `notehub serve` - Run the MCP HTTP server
//! - `notehub paths|get|put|delete` - Work with the configured store directly
//! - `notehub config` - Show the resolved configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use noteconf::NoteConfig;
use std::path::PathBuf;

use notehub::{commands, serve, telemetry};

#[derive(Parser)]
#[command(name = "notehub")]
#[command(about = "Personal hierarchical notes served as MCP tools")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./notehub.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server
    Serve {
        /// HTTP port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List node paths
    Paths {
        /// Owner (user id) whose nodes to list
        #[arg(short, long)]
        owner: String,

        /// Only this node and its descendants
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Show one node
    Get {
        #[arg(short, long)]
        owner: String,

        path: String,
    },

    /// Create or update a node
    Put {
        #[arg(short, long)]
        owner: String,

        path: String,

        content: String,

        /// Version from a previous get; omit to create
        #[arg(long)]
        if_match: Option<String>,

        /// New roll-up content for the parent node
        #[arg(long)]
        parent_rollup: Option<String>,
    },

    /// Delete a node
    Delete {
        #[arg(short, long)]
        owner: String,

        path: String,
    },

    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = NoteConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // Serve gets OTLP when configured; everything else logs to stderr only.
    if matches!(cli.command, Commands::Serve { .. }) {
        telemetry::init(&config.telemetry)?;
    } else {
        telemetry::init_console(&config.telemetry.log_level);
    }

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.bind.http_port = port;
            }
            serve::run(config).await?;
            telemetry::shutdown();
        }
        Commands::Paths { owner, prefix } => {
            commands::paths(&config, &owner, prefix.as_deref()).await?;
        }
        Commands::Get { owner, path } => {
            commands::get(&config, &owner, &path).await?;
        }
        Commands::Put {
            owner,
            path,
            content,
            if_match,
            parent_rollup,
        } => {
            commands::put(
                &config,
                &owner,
                &path,
                &content,
                if_match.as_deref(),
                parent_rollup.as_deref(),
            )
            .await?;
        }
        Commands::Delete { owner, path } => {
            commands::delete(&config, &owner, &path).await?;
        }
        Commands::Config => {
            commands::show_config(&config, &sources);
        }
    }

    Ok(())
}
