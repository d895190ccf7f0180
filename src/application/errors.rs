//! Application layer errors

use thiserror::Error;

/// Fatal relay errors surfaced to the supervising process
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Subscriber repository errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Durable store errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Chat connection errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Connection not open")]
    NotOpen,

    #[error("Connection closed by peer")]
    Closed,
}

/// Presence log watcher errors
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Event stream ended")]
    EventsClosed,
}

/// Command execution errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
