use async_trait::async_trait;
use crate::application::errors::TransportError;

/// Transport trait - abstraction over the chat connection a relay engine owns
///
/// Reads and writes may happen concurrently: the engine's read loop sits in
/// `recv_line` while fan-out tasks call `send_to`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and authenticate
    async fn open(&self) -> Result<(), TransportError>;

    /// Receive the next raw line, `Ok(None)` once the peer has closed
    async fn recv_line(&self) -> Result<Option<String>, TransportError>;

    /// Send text to a single account
    async fn send_to(&self, account: &str, text: &str) -> Result<(), TransportError>;

    /// Close the connection
    async fn close(&self) -> Result<(), TransportError>;

    /// Identity info
    fn info(&self) -> TransportInfo;
}

/// Identity the transport is logged in as
#[derive(Debug, Clone)]
pub struct TransportInfo {
    pub kind: String,
    pub username: String,
}
