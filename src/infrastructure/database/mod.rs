//! SQLite subscriber store - the durable layer

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::application::errors::StorageError;
use crate::domain::entities::Subscriber;
use crate::domain::traits::SubscriberStore;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        init_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a query on the blocking pool; SQLite calls never run on the async workers.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> SqliteResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StorageError::Task("connection lock poisoned".to_string()))?;
            f(&conn).map_err(StorageError::from)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn init_tables(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscribers (
            account TEXT NOT NULL,
            chat TEXT NOT NULL,
            online INTEGER NOT NULL DEFAULT 1,
            banned_until TEXT,
            PRIMARY KEY (account, chat)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS moderators (
            account TEXT PRIMARY KEY
        )",
        [],
    )?;

    // Presence updates are keyed by account alone
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscribers_account ON subscribers(account)",
        [],
    )?;

    Ok(())
}

#[async_trait]
impl SubscriberStore for SqliteStore {
    async fn find_subscribers(&self, channel: &str) -> Result<Vec<Subscriber>, StorageError> {
        let channel = channel.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT account, online, banned_until FROM subscribers WHERE chat = ?1 ORDER BY account",
            )?;

            let rows = stmt.query_map([&channel], |row| {
                Ok(Subscriber {
                    account: row.get(0)?,
                    online: row.get(1)?,
                    banned_until: row.get(2)?,
                })
            })?;

            let mut subs = Vec::new();
            for sub in rows {
                subs.push(sub?);
            }
            Ok(subs)
        })
        .await
    }

    async fn subscribe(&self, account: &str, channel: &str) -> Result<(), StorageError> {
        let (account, channel) = (account.to_string(), channel.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO subscribers (account, chat, online) VALUES (?1, ?2, 1)",
                params![account, channel],
            )?;
            Ok(())
        })
        .await
    }

    async fn unsubscribe(&self, account: &str, channel: &str) -> Result<(), StorageError> {
        let (account, channel) = (account.to_string(), channel.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM subscribers WHERE account = ?1 AND chat = ?2",
                params![account, channel],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_online_status(&self, account: &str, online: bool) -> Result<(), StorageError> {
        let account = account.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE subscribers SET online = ?1 WHERE account = ?2",
                params![online, account],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_banned_until(
        &self,
        account: &str,
        channel: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        let (account, channel) = (account.to_string(), channel.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE subscribers SET banned_until = ?1 WHERE account = ?2 AND chat = ?3",
                params![until, account, channel],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_moderators(&self) -> Result<Vec<String>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT account FROM moderators ORDER BY account")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

            let mut mods = Vec::new();
            for account in rows {
                mods.push(account?);
            }
            Ok(mods)
        })
        .await
    }

    async fn add_moderator(&self, account: &str) -> Result<(), StorageError> {
        let account = account.to_lowercase();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO moderators (account) VALUES (?1)",
                [account],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_moderator(&self, account: &str) -> Result<bool, StorageError> {
        let account = account.to_lowercase();
        self.with_conn(move |conn| {
            let rows = conn.execute("DELETE FROM moderators WHERE account = ?1", [account])?;
            Ok(rows > 0)
        })
        .await
    }
}
