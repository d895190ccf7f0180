//! Console transport for development/testing
//!
//! Reads command lines such as `<from nokka> @` from stdin and prints
//! outbound messages instead of sending them.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::application::errors::TransportError;
use crate::domain::traits::{Transport, TransportInfo};

pub struct ConsoleTransport {
    info: TransportInfo,
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleTransport {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            info: TransportInfo {
                kind: "console".to_string(),
                username: channel.into(),
            },
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn open(&self) -> Result<(), TransportError> {
        tracing::info!("Starting console transport (dev mode)");
        Ok(())
    }

    async fn recv_line(&self) -> Result<Option<String>, TransportError> {
        let mut lines = self.lines.lock().await;
        Ok(lines.next_line().await?)
    }

    async fn send_to(&self, account: &str, text: &str) -> Result<(), TransportError> {
        println!("[to {}] {}", account, text);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn info(&self) -> TransportInfo {
        self.info.clone()
    }
}
