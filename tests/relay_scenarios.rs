//! Relay integration tests
//! Run with: cargo test --test relay_scenarios

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};

use chat_relay::application::errors::{RelayError, TransportError};
use chat_relay::application::services::{EngineState, PresenceWatcher, RelayEngine, SubscriberRepository};
use chat_relay::domain::traits::{SubscriberStore, Transport, TransportInfo};
use chat_relay::infrastructure::database::SqliteStore;
use chat_relay::infrastructure::tail::TailConfig;

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Plays scripted lines, then reports the peer as gone
struct ScriptedTransport {
    inbound: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    fn new(lines: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            inbound: Mutex::new(lines.iter().map(|l| l.to_string()).collect()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent_to(&self, account: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == account)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn recv_line(&self) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.lock().unwrap().pop_front())
    }

    async fn send_to(&self, account: &str, text: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((account.to_string(), text.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            kind: "scripted".to_string(),
            username: "relay".to_string(),
        }
    }
}

async fn repository_with(store: Arc<SqliteStore>) -> Arc<SubscriberRepository> {
    let repository = Arc::new(SubscriberRepository::new(store, ["general", "trade", "hardcore"]));
    repository.sync().await.unwrap();
    repository
}

/// Run one engine over `lines` until the script is exhausted
async fn run_engine(
    channel: &str,
    repository: Arc<SubscriberRepository>,
    lines: &[&str],
) -> Arc<ScriptedTransport> {
    let transport = ScriptedTransport::new(lines);
    let engine = Arc::new(RelayEngine::new(channel, transport.clone(), repository));

    engine.open().await.unwrap();
    assert_eq!(engine.state(), EngineState::Open);

    let result = engine.clone().serve().await;
    assert!(matches!(result, Err(RelayError::Transport(TransportError::Closed))));
    assert_eq!(engine.state(), EngineState::Closed);

    transport
}

#[tokio::test]
async fn test_subscribe_twice() {
    ensure_init();
    let repository = repository_with(Arc::new(SqliteStore::open_in_memory().unwrap())).await;

    let transport = run_engine("trade", repository.clone(), &["<from nokka> @", "<from nokka> @"]).await;

    assert_eq!(
        transport.sent_to("nokka"),
        vec!["subscribed [trade]", "already subscribed to trade"]
    );
    assert!(repository.find_subscriber("nokka", "general").await.is_none());
}

#[tokio::test]
async fn test_banned_subscriber_cannot_publish() {
    ensure_init();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.add_moderator("ops").await.unwrap();
    let repository = repository_with(store.clone()).await;

    let transport = run_engine(
        "trade",
        repository.clone(),
        &[
            "<from nokka> @",
            "<from alpha> @",
            "<from ops> ~ nokka 2",
            "<from nokka> # wts enigma 10.0.0.1",
        ],
    )
    .await;

    let nokka = transport.sent_to("nokka");
    assert_eq!(nokka[0], "subscribed [trade]");
    assert!(nokka[1].starts_with("you have been banned until "));
    assert_eq!(nokka[2], "banned for 2 more days");
    assert_eq!(transport.sent_to("alpha"), vec!["subscribed [trade]"]);

    // the ban reached the durable store as well
    let stored = store.find_subscribers("trade").await.unwrap();
    let nokka = stored.iter().find(|s| s.account == "nokka").unwrap();
    assert!(nokka.banned_until.is_some());
}

#[tokio::test]
async fn test_presence_for_unknown_account_is_no_op() {
    ensure_init();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let repository = repository_with(store.clone()).await;
    repository.subscribe("alpha", "trade").await.unwrap();

    let watcher = PresenceWatcher::new(TailConfig::new("bnetd.log"), repository.clone());
    let changed = watcher
        .handle_line("Aug 28 09:01:48 [info ] conn_destroy: [28] \"nokka\" logged out")
        .await
        .unwrap();

    assert!(!changed);
    assert!(!repository.subscriber_exists("nokka").await);
    for channel in ["general", "trade", "hardcore"] {
        assert!(store
            .find_subscribers(channel)
            .await
            .unwrap()
            .iter()
            .all(|s| s.account != "nokka"));
    }
}

#[tokio::test]
async fn test_offline_subscribers_miss_publishes() {
    ensure_init();
    let repository = repository_with(Arc::new(SqliteStore::open_in_memory().unwrap())).await;
    for account in ["nokka", "alpha", "beta"] {
        repository.subscribe(account, "hardcore").await.unwrap();
    }

    let watcher = PresenceWatcher::new(TailConfig::new("bnetd.log"), repository.clone());
    assert!(watcher
        .handle_line("Aug 28 09:01:48 [info ] conn_destroy: [28] \"beta\" logged out")
        .await
        .unwrap());

    let transport = run_engine("hardcore", repository, &["<from nokka> # lf baal run"]).await;

    assert_eq!(transport.sent_to("alpha"), vec!["[nokka] lf baal run"]);
    assert!(transport.sent_to("beta").is_empty());
}

#[tokio::test]
async fn test_back_to_back_publishes_keep_order() {
    ensure_init();
    let repository = repository_with(Arc::new(SqliteStore::open_in_memory().unwrap())).await;
    for account in ["nokka", "alpha", "beta", "gamma"] {
        repository.subscribe(account, "trade").await.unwrap();
    }

    let lines: Vec<String> = (0..20).map(|i| format!("<from nokka> # offer {}", i)).collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    let transport = run_engine("trade", repository, &lines).await;

    let expected: Vec<String> = (0..20).map(|i| format!("[nokka] offer {}", i)).collect();
    for account in ["alpha", "beta", "gamma"] {
        assert_eq!(transport.sent_to(account), expected);
    }
    assert!(transport.sent_to("nokka").is_empty());
}

#[tokio::test]
async fn test_subscriptions_survive_restart() {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.db");

    {
        let repository = repository_with(Arc::new(SqliteStore::open(&path).unwrap())).await;
        run_engine("general", repository, &["<from nokka> @", "<from alpha> @", "<from alpha> !"]).await;
    }

    let repository = repository_with(Arc::new(SqliteStore::open(&path).unwrap())).await;
    let accounts: Vec<String> = repository
        .find_subscribers("general")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.account)
        .collect();
    assert_eq!(accounts, vec!["nokka"]);
}
