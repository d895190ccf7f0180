//! Chat server connection
//!
//! Speaks the line-based chat protocol of bnetd/PvPGN servers: a `0x03`
//! protocol byte, then the account name and password on their own lines.
//! Messages to a single account go out as whispers.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::application::errors::TransportError;
use crate::domain::traits::{Transport, TransportInfo};

/// Selects the text chat protocol
const CHAT_PROTOCOL: u8 = 0x03;

/// Greeting sent once the server accepted the login
const LOGIN_OK_PREFIX: &str = "your unique name:";

pub struct ChatConnection {
    address: String,
    username: String,
    password: String,
    login_timeout: Duration,
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl ChatConnection {
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password: password.into(),
            login_timeout: Duration::from_secs(10),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }
}

/// Read one line, lossily decoded and without its line ending.
async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<String>, TransportError> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
    Ok(Some(line))
}

async fn await_login(reader: &mut BufReader<OwnedReadHalf>) -> Result<(), TransportError> {
    loop {
        let line = read_line(reader).await?.ok_or(TransportError::Closed)?;
        let lower = line.trim().to_lowercase();

        if lower.starts_with(LOGIN_OK_PREFIX) {
            return Ok(());
        }
        if lower.contains("failed") || lower.contains("incorrect") {
            return Err(TransportError::Auth(line));
        }
    }
}

/// Whisper command; embedded line breaks would start a new command.
fn whisper(account: &str, text: &str) -> String {
    let text: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    format!("/w {} {}\r\n", account, text)
}

#[async_trait]
impl Transport for ChatConnection {
    async fn open(&self) -> Result<(), TransportError> {
        tracing::info!("Connecting to {} as {}", self.address, self.username);

        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        let (read, mut write) = stream.into_split();

        write.write_all(&[CHAT_PROTOCOL]).await?;
        write
            .write_all(format!("{}\r\n{}\r\n", self.username, self.password).as_bytes())
            .await?;
        write.flush().await?;

        let mut reader = BufReader::new(read);
        tokio::time::timeout(self.login_timeout, await_login(&mut reader))
            .await
            .map_err(|_| TransportError::Auth("login timed out".to_string()))??;

        *self.reader.lock().await = Some(reader);
        *self.writer.lock().await = Some(write);
        Ok(())
    }

    async fn recv_line(&self) -> Result<Option<String>, TransportError> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::NotOpen)?;
        read_line(reader).await
    }

    async fn send_to(&self, account: &str, text: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotOpen)?;
        writer.write_all(whisper(account, text).as_bytes()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.reader.lock().await.take();
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            kind: "chat".to_string(),
            username: self.username.clone(),
        }
    }
}
