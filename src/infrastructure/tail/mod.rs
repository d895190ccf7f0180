//! Rotating log tail
//!
//! Follows an append-only file that its producer rotates (rename or truncate
//! and recreate). [`LogTail::next_line`] yields complete lines written after
//! the tail was opened, or waits for more. Changes are picked up from
//! filesystem notifications on the parent directory, with a periodic poll as
//! a fallback for filesystems that do not deliver them.
//!
//! In-place truncation is only seen while the file is shorter than the read
//! offset. If the producer truncates and writes past the old offset before
//! the next check, the tail carries on from that offset and the lines in
//! between are missed.

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;

use crate::application::errors::WatcherError;

/// Tail timing
#[derive(Debug, Clone)]
pub struct TailConfig {
    pub path: PathBuf,
    /// Delay between open attempts while the file is missing
    pub retry_interval: Duration,
    /// Fallback check for rotation and new data
    pub poll_interval: Duration,
}

impl TailConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry_interval: Duration::from_millis(500),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// Readiness gate: lines are only yielded while `Ready`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// Initial position not yet established
    Unready,
    Ready,
    /// Old file gone, new one not yet open
    Rotated,
}

/// Device and inode of the open file
type FileIdentity = (u64, u64);

pub struct LogTail {
    config: TailConfig,
    state: TailState,
    reader: Option<BufReader<File>>,
    identity: Option<FileIdentity>,
    position: u64,
    pending: Vec<u8>,
    rotation_hint: bool,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
}

impl LogTail {
    /// Open the file and position at its end; existing content is never yielded.
    ///
    /// Waits for the file to appear if it does not exist yet.
    pub async fn open(config: TailConfig) -> Result<Self, WatcherError> {
        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&watch_dir(&config.path), RecursiveMode::NonRecursive)?;

        let mut tail = Self {
            config,
            state: TailState::Unready,
            reader: None,
            identity: None,
            position: 0,
            pending: Vec::new(),
            rotation_hint: false,
            events,
            _watcher: watcher,
        };

        let (mut file, identity) = tail.open_with_retry().await?;
        tail.position = file.seek(SeekFrom::End(0)).await?;
        tail.identity = identity;
        tail.reader = Some(BufReader::new(file));
        tail.state = TailState::Ready;

        tracing::info!("Tailing {} from offset {}", tail.config.path.display(), tail.position);
        Ok(tail)
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    /// Next complete line, without its line ending. Waits while there is none.
    pub async fn next_line(&mut self) -> Result<String, WatcherError> {
        loop {
            if self.state == TailState::Ready {
                if let Some(line) = self.read_line().await? {
                    return Ok(line);
                }
            }

            if self.check_rotation().await? {
                continue;
            }

            self.wait_for_change().await?;
        }
    }

    /// `None` at end of file; a partial last line stays buffered.
    async fn read_line(&mut self) -> Result<Option<String>, WatcherError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let n = reader.read_until(b'\n', &mut self.pending).await?;
        self.position += n as u64;

        if n == 0 || self.pending.last() != Some(&b'\n') {
            return Ok(None);
        }

        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        Ok(Some(line))
    }

    /// Reopen when the path now points at a different or truncated file.
    async fn check_rotation(&mut self) -> Result<bool, WatcherError> {
        let rotated = match tokio::fs::metadata(&self.config.path).await {
            Ok(meta) => {
                let replaced = match (file_identity(&meta), self.identity) {
                    (Some(current), Some(open)) => current != open,
                    _ => self.rotation_hint,
                };
                replaced || meta.len() < self.position
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        if rotated {
            self.rotate().await?;
        }
        Ok(rotated)
    }

    async fn rotate(&mut self) -> Result<(), WatcherError> {
        self.state = TailState::Rotated;
        self.reader = None;
        self.pending.clear();
        tracing::info!("Log rotated, reopening {}", self.config.path.display());

        let (file, identity) = self.open_with_retry().await?;
        self.reader = Some(BufReader::new(file));
        self.identity = identity;
        self.position = 0;
        self.rotation_hint = false;
        self.state = TailState::Ready;

        tracing::info!("Reopened {}", self.config.path.display());
        Ok(())
    }

    /// Open failures are expected mid-rotation and retried until they succeed.
    async fn open_with_retry(&self) -> Result<(File, Option<FileIdentity>), WatcherError> {
        loop {
            match File::open(&self.config.path).await {
                Ok(file) => {
                    let identity = file_identity(&file.metadata().await?);
                    return Ok((file, identity));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("Waiting for {} to be created", self.config.path.display());
                }
                Err(e) => {
                    tracing::warn!("Failed to open {}: {}", self.config.path.display(), e);
                }
            }
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }

    async fn wait_for_change(&mut self) -> Result<(), WatcherError> {
        tokio::select! {
            event = self.events.recv() => match event {
                Some(Ok(event)) => self.note_event(&event),
                Some(Err(e)) => tracing::warn!("File watch error: {}", e),
                None => return Err(WatcherError::EventsClosed),
            },
            _ = tokio::time::sleep(self.config.poll_interval) => {}
        }
        Ok(())
    }

    fn note_event(&mut self, event: &Event) {
        let ours = event
            .paths
            .iter()
            .any(|p| p.file_name() == self.config.path.file_name());
        if !ours {
            return;
        }

        if matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
        ) {
            self.rotation_hint = true;
        }
    }
}

/// Directory to watch; the file itself may be replaced under us.
fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<FileIdentity> {
    None
}
