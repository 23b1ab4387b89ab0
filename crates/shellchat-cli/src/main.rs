//! shellchat CLI
//!
//! Serverless peer-to-peer chat with an encrypted local history.

mod chat;
mod config;
mod display;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use shellchat_core::Host;
use shellchat_discovery::DiscoveryManager;
use shellchat_store::MessageStore;

use chat::ChatSession;
use config::Config;
use display::{Spinner, format_message};

/// shellchat - zero-server P2P encrypted chat
#[derive(Parser)]
#[command(name = "shellchat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (default: <config dir>/shellchat/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the encrypted message database
    Init,

    /// Start a chat session
    Chat {
        /// Listen port (overrides node.listen_port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print stored messages for a conversation
    History {
        /// Peer id, or "global-room"
        #[arg(default_value = chat::GLOBAL_ROOM)]
        peer: String,

        /// Number of messages (default: storage.history_limit)
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },

    /// Delete all stored messages
    #[command(name = "clearhistory")]
    ClearHistory,

    /// Delete the database file
    Obliterate {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load_or_default(cli.config.as_deref())?;
    config.validate()?;

    // Initialize logging
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Init => init_database(&config, cli.config.as_deref()).await?,
        Commands::Chat { port } => run_chat(port, &config).await?,
        Commands::History { peer, limit } => show_history(&peer, limit, &config).await?,
        Commands::ClearHistory => clear_history(&config).await?,
        Commands::Obliterate { yes } => obliterate(yes, &config).await?,
    }

    Ok(())
}

/// Read a password without echo
fn prompt_password(prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .context("Failed to read password")
}

/// Derive the key and open the store at `path`
async fn unlock(path: &Path, password: &str) -> anyhow::Result<MessageStore> {
    let spinner = Spinner::new("Unlocking database...");
    match MessageStore::open(path, password).await {
        Ok(store) => {
            spinner.finish_with_message("Database unlocked");
            Ok(store)
        }
        Err(e) => {
            spinner.abandon();
            Err(e).with_context(|| format!("Failed to open {}", path.display()))
        }
    }
}

/// Prompt for the password and open an existing database
async fn open_existing(config: &Config) -> anyhow::Result<MessageStore> {
    let path = config.database_path()?;
    if !path.exists() {
        anyhow::bail!(
            "No database at {}; run `shellchat init` first",
            path.display()
        );
    }

    let password = prompt_password("Master password: ")?;
    unlock(&path, &password).await
}

/// Create the database and its salt, and write the configuration in use
/// if no config file exists yet
async fn init_database(config: &Config, config_path: Option<&Path>) -> anyhow::Result<()> {
    let path = config.database_path()?;
    if path.exists() {
        anyhow::bail!(
            "Database already exists at {}; run `shellchat obliterate` to start over",
            path.display()
        );
    }

    let password = prompt_password("Enter new master password: ")?;
    let confirm = prompt_password("Confirm master password: ")?;
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    if *password != *confirm {
        anyhow::bail!("Passwords do not match");
    }

    let store = unlock(&path, &password).await?;
    store.close().await;

    tracing::info!(path = %path.display(), "database initialized");
    println!("Database initialized at {}", path.display());

    let config_path = config_path.map(Path::to_path_buf).or_else(Config::default_path);
    if let Some(config_path) = config_path {
        if config.save_if_missing(&config_path)? {
            println!("Configuration written to {}", config_path.display());
        }
    }
    Ok(())
}

/// Start the node, discovery and the interactive session
async fn run_chat(port: Option<u16>, config: &Config) -> anyhow::Result<()> {
    let path = config.database_path()?;
    let password = prompt_password("Master password: ")?;
    let store = unlock(&path, &password).await?;
    drop(password);

    println!("Initializing P2P node...");
    let (host, inbound) =
        Host::create(config.host_config(port)?, None).context("Failed to start node")?;
    println!("I am {}", host.local_peer_id());

    let discovery = DiscoveryManager::new(host.clone(), config.discovery_settings());
    if let Err(e) = discovery.start().await {
        tracing::warn!(error = %e, "discovery not started");
    }

    println!("Type /help for commands.");
    let session = ChatSession::new(host.clone(), store.clone(), config.storage.history_limit);
    let result = chat::run(session, inbound).await;

    discovery.shutdown().await;
    host.shutdown().await;
    store.close().await;
    println!("Bye.");

    result
}

/// Print stored messages for one conversation
async fn show_history(peer: &str, limit: Option<u32>, config: &Config) -> anyhow::Result<()> {
    let store = open_existing(config).await?;
    let limit = limit.unwrap_or(config.storage.history_limit);

    let messages = store.get_recent(peer, limit).await?;
    if messages.is_empty() {
        println!("No messages with {peer}");
    }
    for message in &messages {
        println!("{}", format_message(message));
    }

    store.close().await;
    Ok(())
}

/// Delete every message, keeping the database
async fn clear_history(config: &Config) -> anyhow::Result<()> {
    let store = open_existing(config).await?;
    let deleted = store.clear_all().await?;
    store.close().await;

    println!("Chat history cleared ({deleted} messages).");
    Ok(())
}

/// Delete the database file and its journal
async fn obliterate(yes: bool, config: &Config) -> anyhow::Result<()> {
    let path = config.database_path()?;

    if !yes {
        print!("Are you sure you want to delete all data? This cannot be undone. (y/N): ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y") {
            println!("Operation cancelled.");
            return Ok(());
        }
    }

    if shellchat_store::destroy(&path).await? {
        println!("Database obliterated.");
    } else {
        println!("Database file does not exist.");
    }
    Ok(())
}
