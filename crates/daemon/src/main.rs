//! AudioBrowser Daemon
//!
//! Command-line front end for the AudioBrowser core.

use std::path::PathBuf;

use anyhow::Context;
use audiobrowser::config::Config;
use audiobrowser::orchestrator::Orchestrator;
use audiobrowser::protocol::messages::{
    FileEntryType, FileListRequest, FileListResponse, FlagState, FlagUpdateRequest,
};
use audiobrowser::protocol::{FILES_CHANGED_EVENT, HEARD_FLAG};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

/// Capacity of the channel the serve loop receives change notifications on.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 16;

/// AudioBrowser Daemon - watch, browse and stream a tree of audio files.
#[derive(Parser, Debug)]
#[command(name = "audiobrowser")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch the root directory and log change notifications until Ctrl-C
    Serve,

    /// List a directory below the root
    List {
        /// Root-relative directory (defaults to the root)
        #[arg(default_value = "")]
        path: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Stream a file below the root
    Resolve {
        /// Root-relative file path
        path: String,

        /// Write the bytes to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Read or change per-file flags
    #[command(subcommand)]
    Flag(FlagCommands),
}

/// Subcommands for flag management.
#[derive(Subcommand, Debug, Clone)]
pub enum FlagCommands {
    /// Show a flag's stored value
    Get {
        /// Root-relative file path
        path: String,

        /// Flag name
        #[arg(default_value = HEARD_FLAG)]
        name: String,
    },

    /// Store a flag value
    Set {
        /// Root-relative file path
        path: String,

        /// Flag name
        name: String,

        /// New value
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Flip a flag, treating an unset flag as false
    Toggle {
        /// Root-relative file path
        path: String,

        /// Flag name
        #[arg(default_value = HEARD_FLAG)]
        name: String,
    },

    /// Remove a flag
    Clear {
        /// Root-relative file path
        path: String,

        /// Flag name
        #[arg(default_value = HEARD_FLAG)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Initialize tracing
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(config_path) = &cli.config {
        tracing::debug!("Using config file: {:?}", config_path);
    }

    let orchestrator = Orchestrator::new(config)?;

    match cli.command {
        Commands::Serve => serve(&orchestrator).await?,
        Commands::List { path, json } => {
            let listing = orchestrator.handle_list(&FileListRequest { path })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print_listing(&listing);
            }
        }
        Commands::Resolve { path, output } => stream_file(&orchestrator, &path, output).await?,
        Commands::Flag(cmd) => {
            let state = match cmd {
                FlagCommands::Get { path, name } => orchestrator.get_flag(&path, &name)?,
                FlagCommands::Set { path, name, value } => {
                    orchestrator.update_flag(&FlagUpdateRequest {
                        path,
                        name,
                        value: Some(value),
                    })?
                }
                FlagCommands::Toggle { path, name } => {
                    orchestrator.update_flag(&FlagUpdateRequest {
                        path,
                        name,
                        value: None,
                    })?
                }
                FlagCommands::Clear { path, name } => orchestrator.clear_flag(&path, &name)?,
            };
            print_flag(&state);
        }
    }

    Ok(())
}

/// Run the watcher until Ctrl-C, logging every change notification.
async fn serve(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let (handle, mut changes) = orchestrator.subscribe_channel(NOTIFICATION_CHANNEL_CAPACITY);
    orchestrator.start().await?;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Received shutdown signal");
                break;
            }
            change = changes.recv() => {
                if change.is_none() {
                    break;
                }
                tracing::info!("Emitting {}", FILES_CHANGED_EVENT);
            }
        }
    }

    orchestrator.unsubscribe(handle);
    orchestrator.stop().await;
    Ok(())
}

/// Copy a resolved file to `output` or stdout.
async fn stream_file(
    orchestrator: &Orchestrator,
    reference: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let file = orchestrator.resolve(reference).await?;
    tracing::debug!(
        "Streaming {} ({}, {} bytes)",
        file.file_name(),
        file.content_type(),
        file.len()
    );

    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin> = match &output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut stream = file.into_stream();
    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk.context("Failed to read file")?;
        writer.write_all(&chunk).await?;
    }
    writer.flush().await?;

    Ok(())
}

fn print_listing(listing: &FileListResponse) {
    let shown = if listing.relative_path.is_empty() {
        "/"
    } else {
        listing.relative_path.as_str()
    };
    println!("{}", shown);

    if listing.entries.is_empty() {
        println!("  (empty)");
        return;
    }

    for entry in &listing.entries {
        let (marker, size) = match entry.entry_type {
            FileEntryType::Directory => ("d", String::new()),
            FileEntryType::File => ("-", entry.display_size()),
            FileEntryType::Other => ("?", String::new()),
        };
        let heard = if entry.heard { "*" } else { " " };
        println!("{} {} {:>10}  {}", marker, heard, size, entry.name);
    }
}

fn print_flag(state: &FlagState) {
    let value = match state.value {
        Some(true) => "true",
        Some(false) => "false",
        None => "unset",
    };
    println!("{} {}={}", state.path, state.name, value);
}
