//! Presence watcher - Keeps subscriber online state in step with the server log

use std::sync::Arc;

use crate::application::errors::{RepositoryError, WatcherError};
use crate::application::messaging::PresenceDecoder;
use crate::application::services::SubscriberRepository;
use crate::infrastructure::tail::{LogTail, TailConfig};

pub struct PresenceWatcher {
    config: TailConfig,
    repository: Arc<SubscriberRepository>,
    decoder: PresenceDecoder,
}

impl PresenceWatcher {
    pub fn new(config: TailConfig, repository: Arc<SubscriberRepository>) -> Self {
        Self {
            config,
            repository,
            decoder: PresenceDecoder::new(),
        }
    }

    /// Tail the log forever. Failures restart the tail after the retry interval.
    pub async fn run(self) {
        loop {
            if let Err(e) = self.watch().await {
                tracing::error!("Presence watcher failed: {}, restarting", e);
            }
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }

    async fn watch(&self) -> Result<(), WatcherError> {
        let mut tail = LogTail::open(self.config.clone()).await?;

        loop {
            let line = tail.next_line().await?;
            if let Err(e) = self.handle_line(&line).await {
                tracing::error!("Failed to update presence: {}", e);
            }
        }
    }

    /// Apply one log line. Returns whether a subscriber was updated.
    pub async fn handle_line(&self, line: &str) -> Result<bool, RepositoryError> {
        let Some(change) = self.decoder.decode(line) else {
            return Ok(false);
        };

        if !self.repository.subscriber_exists(&change.account).await {
            return Ok(false);
        }

        self.repository
            .update_online_status(&change.account, change.online)
            .await?;

        tracing::debug!(
            "{} is now {}",
            change.account,
            if change.online { "online" } else { "offline" }
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::SubscriberStore;
    use crate::infrastructure::database::SqliteStore;
    use std::io::Write;
    use std::time::Duration;

    const LOGOUT: &str = "Aug 28 09:01:48 [info ] conn_destroy: [28] \"nokka\" logged out";
    const LOGIN: &str = "Aug 28 08:25:22 [info ] _client_loginreq2: [28] \"Nokka\" logged in (correct password)";

    async fn repository() -> (Arc<SqliteStore>, Arc<SubscriberRepository>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let repository = Arc::new(SubscriberRepository::new(store.clone(), ["general", "trade"]));
        repository.sync().await.unwrap();
        (store, repository)
    }

    #[tokio::test]
    async fn test_unknown_account_is_ignored() {
        let (store, repository) = repository().await;
        let watcher = PresenceWatcher::new(TailConfig::new("unused.log"), repository.clone());

        assert!(!watcher.handle_line(LOGOUT).await.unwrap());
        assert!(!repository.subscriber_exists("nokka").await);
        assert!(store.find_subscribers("trade").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_known_account_is_updated_everywhere() {
        let (store, repository) = repository().await;
        repository.subscribe("nokka", "trade").await.unwrap();
        repository.subscribe("nokka", "general").await.unwrap();
        let watcher = PresenceWatcher::new(TailConfig::new("unused.log"), repository.clone());

        assert!(watcher.handle_line(LOGOUT).await.unwrap());
        assert!(!repository.find_subscriber("nokka", "trade").await.unwrap().online);
        assert!(!repository.find_subscriber("nokka", "general").await.unwrap().online);
        assert!(!store.find_subscribers("trade").await.unwrap()[0].online);

        assert!(watcher.handle_line(LOGIN).await.unwrap());
        assert!(repository.find_subscriber("nokka", "trade").await.unwrap().online);
    }

    #[tokio::test]
    async fn test_unrelated_lines_are_ignored() {
        let (_store, repository) = repository().await;
        repository.subscribe("nokka", "trade").await.unwrap();
        let watcher = PresenceWatcher::new(TailConfig::new("unused.log"), repository.clone());

        let line = "Aug 28 09:01:48 [debug] sd_tcpinput: [28] read returned -1 (closing connection)";
        assert!(!watcher.handle_line(line).await.unwrap());
        assert!(repository.find_subscriber("nokka", "trade").await.unwrap().online);
    }

    #[tokio::test]
    async fn test_run_applies_new_log_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bnetd.log");
        // history from before startup must not count
        std::fs::write(&path, format!("{}\n", LOGOUT)).unwrap();

        let (_store, repository) = repository().await;
        repository.subscribe("nokka", "trade").await.unwrap();

        let config = TailConfig {
            path: path.clone(),
            retry_interval: Duration::from_millis(20),
            poll_interval: Duration::from_millis(50),
        };
        let task = tokio::spawn(PresenceWatcher::new(config, repository.clone()).run());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(repository.find_subscriber("nokka", "trade").await.unwrap().online);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", LOGOUT).unwrap();
        file.flush().unwrap();

        let mut offline = false;
        for _ in 0..100 {
            if !repository.find_subscriber("nokka", "trade").await.unwrap().online {
                offline = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        task.abort();
        assert!(offline);
    }
}
