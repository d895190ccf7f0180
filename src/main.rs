use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;

use chat_relay::application::errors::{ConfigError, RelayError, TransportError};
use chat_relay::application::services::{PresenceWatcher, RelayEngine, SubscriberRepository};
use chat_relay::domain::traits::{SubscriberStore, Transport};
use chat_relay::infrastructure::adapters::{ChatConnection, ConsoleTransport};
use chat_relay::infrastructure::config::Config;
use chat_relay::infrastructure::database::SqliteStore;

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Presence-aware publish/subscribe relay for chat servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay
    Run {
        /// Serve a single channel from stdin instead of the chat server
        #[arg(long, value_name = "CHANNEL")]
        console: Option<String>,
    },
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
    /// Manage moderators
    Moderator {
        #[command(subcommand)]
        action: ModeratorAction,
    },
}

#[derive(Subcommand)]
enum ModeratorAction {
    /// Grant moderator rights
    Add { account: String },
    /// Revoke moderator rights
    Remove { account: String },
    /// List moderators
    List,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { console } => run_relay(&cli.config, console),
        Commands::Version => {
            println!("chat-relay v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(),
        Commands::Moderator { action } => manage_moderators(&cli.config, action),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(config_path: &str) -> Result<Config, ConfigError> {
    if Path::new(config_path).exists() {
        let mut config = Config::load(config_path)?;
        config.apply_env();
        Ok(config)
    } else {
        tracing::warn!("{} not found, using defaults and environment", config_path);
        Ok(Config::load_env())
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, RelayError> {
    tokio::runtime::Runtime::new().map_err(|e| RelayError::Internal(format!("Failed to start runtime: {}", e)))
}

fn run_relay(config_path: &str, console: Option<String>) -> Result<(), RelayError> {
    let config = load_config(config_path)?;
    if console.is_none() {
        config.validate()?;
    }

    runtime()?.block_on(serve(config, console))
}

async fn serve(config: Config, console: Option<String>) -> Result<(), RelayError> {
    let store = Arc::new(SqliteStore::open(&config.database.path)?);
    tracing::info!("Database opened at {}", config.database.path.display());

    // The cache has to mirror the store before any engine takes traffic
    let repository = Arc::new(SubscriberRepository::new(store, config.channel_names()));
    repository.sync().await?;

    let mut engines = JoinSet::new();

    if let Some(channel) = &console {
        if config.channel(channel).is_none() {
            return Err(ConfigError::InvalidValue(format!("unknown channel: {}", channel)).into());
        }
        let transport: Arc<dyn Transport> = Arc::new(ConsoleTransport::new(channel));
        let engine = Arc::new(RelayEngine::new(channel, transport, repository.clone()));
        engine.open().await?;
        engines.spawn(engine.serve());
    } else {
        for channel in &config.channels {
            let transport: Arc<dyn Transport> = Arc::new(
                ChatConnection::new(&config.server.address, &channel.username, &channel.password)
                    .with_login_timeout(config.login_timeout()),
            );
            let engine = Arc::new(RelayEngine::new(&channel.name, transport, repository.clone()));
            engine.open().await?;
            engines.spawn(engine.serve());
        }
    }

    if let Some(tail) = config.tail_config() {
        tracing::info!("Watching presence log {}", tail.path.display());
        tokio::spawn(PresenceWatcher::new(tail, repository.clone()).run());
    }

    tracing::info!("Relay running for {} channel(s)", engines.len());

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
        Some(joined) = engines.join_next() => match joined {
            // stdin running dry ends a console session normally
            Ok(Err(RelayError::Transport(TransportError::Closed))) if console.is_some() => Ok(()),
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => Err(RelayError::Internal("relay engine stopped".to_string())),
            Err(e) => Err(RelayError::Internal(format!("relay engine panicked: {}", e))),
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn manage_moderators(config_path: &str, action: ModeratorAction) -> Result<(), RelayError> {
    let config = load_config(config_path)?;
    let store = SqliteStore::open(&config.database.path)?;

    runtime()?.block_on(async {
        match action {
            ModeratorAction::Add { account } => {
                store.add_moderator(&account).await?;
                println!("{} is now a moderator", account.to_lowercase());
            }
            ModeratorAction::Remove { account } => {
                if store.remove_moderator(&account).await? {
                    println!("{} is no longer a moderator", account.to_lowercase());
                } else {
                    println!("{} was not a moderator", account.to_lowercase());
                }
            }
            ModeratorAction::List => {
                let moderators = store.find_moderators().await?;
                if moderators.is_empty() {
                    println!("No moderators");
                }
                for account in moderators {
                    println!("{}", account);
                }
            }
        }
        Ok::<(), RelayError>(())
    })
}

fn init_config() -> Result<(), RelayError> {
    let yaml = Config::default().to_yaml()?;
    println!("{}", yaml);
    println!("\nSave this to config.yaml and adjust as needed.");
    Ok(())
}
