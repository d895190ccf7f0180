//! Relay engine - One per channel identity
//!
//! Reads command lines from its transport, applies membership and moderation
//! through the shared repository, and fans publishes out to eligible members.
//! Subscribe, unsubscribe and ban are handled inline by the read loop so
//! membership changes stay in command order. Publishes are queued to a
//! dedicated fan-out task so a slow recipient never stalls reading.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Mutex};

use crate::application::errors::{CommandError, RelayError, TransportError};
use crate::application::messaging::CommandDecoder;
use crate::application::services::SubscriberRepository;
use crate::domain::entities::{BanStatus, Command, CommandKind, Subscriber};
use crate::domain::traits::Transport;

/// Sent when the durable store rejects a change
const RETRY_NOTICE: &str = "something went wrong, please try again later";

const BAN_USAGE: &str = "usage: ~ <account> <days>";

/// Longest ban a moderator can hand out
const MAX_BAN_DAYS: i64 = 3650;

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Closed,
    Opening,
    Open,
}

pub struct RelayEngine {
    channel: String,
    transport: Arc<dyn Transport>,
    repository: Arc<SubscriberRepository>,
    decoder: CommandDecoder,
    publish_lock: Mutex<()>,
    state: RwLock<EngineState>,
}

impl RelayEngine {
    pub fn new(
        channel: impl Into<String>,
        transport: Arc<dyn Transport>,
        repository: Arc<SubscriberRepository>,
    ) -> Self {
        Self {
            channel: channel.into(),
            transport,
            repository,
            decoder: CommandDecoder::new(),
            publish_lock: Mutex::new(()),
            state: RwLock::new(EngineState::Closed),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn state(&self) -> EngineState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: EngineState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Connect and authenticate the transport.
    pub async fn open(&self) -> Result<(), RelayError> {
        self.set_state(EngineState::Opening);

        if let Err(e) = self.transport.open().await {
            self.set_state(EngineState::Closed);
            return Err(e.into());
        }

        self.set_state(EngineState::Open);
        let info = self.transport.info();
        tracing::info!("[{}] Connected as {} via {}", self.channel, info.username, info.kind);
        Ok(())
    }

    /// Run the read loop until the transport fails or closes.
    ///
    /// Always returns an error: the engine only stops when its connection is
    /// gone, which the supervisor treats as fatal. Queued publishes are
    /// delivered before returning.
    pub async fn serve(self: Arc<Self>) -> Result<(), RelayError> {
        if self.state() != EngineState::Open {
            return Err(TransportError::NotOpen.into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(Arc::clone(&self).fan_out(rx));

        let result = self.read_loop(&tx).await;

        drop(tx);
        if let Err(e) = worker.await {
            tracing::error!("[{}] Fan-out task failed: {}", self.channel, e);
        }

        if let Err(e) = self.transport.close().await {
            tracing::debug!("[{}] Close failed: {}", self.channel, e);
        }
        self.set_state(EngineState::Closed);

        if let Err(ref e) = result {
            tracing::error!("[{}] Read loop stopped: {}", self.channel, e);
        }
        result
    }

    async fn read_loop(&self, publishes: &mpsc::UnboundedSender<Command>) -> Result<(), RelayError> {
        loop {
            let line = self
                .transport
                .recv_line()
                .await?
                .ok_or(TransportError::Closed)?;

            let Some(command) = self.decoder.decode(&line) else {
                continue;
            };

            tracing::debug!("[{}] {} from {}", self.channel, command.kind.as_str(), command.account);

            if command.kind == CommandKind::Publish {
                if publishes.send(command).is_err() {
                    return Err(RelayError::Internal("fan-out task is gone".to_string()));
                }
            } else {
                self.handle(command).await;
            }
        }
    }

    async fn fan_out(self: Arc<Self>, mut publishes: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = publishes.recv().await {
            self.publish(&command).await;
        }
    }

    /// Process one decoded command to completion.
    pub async fn handle(&self, command: Command) {
        match command.kind {
            CommandKind::Subscribe => self.subscribe(&command).await,
            CommandKind::Unsubscribe => self.unsubscribe(&command).await,
            CommandKind::Publish => {
                self.publish(&command).await;
            }
            CommandKind::Ban => self.ban(&command).await,
        }
    }

    async fn subscribe(&self, command: &Command) {
        let account = &command.account;

        if let Some(sub) = self.repository.find_subscriber(account, &self.channel).await {
            if self.reject_if_banned(&sub).await {
                return;
            }
            self.reply(account, &format!("already subscribed to {}", self.channel)).await;
            return;
        }

        match self.repository.subscribe(account, &self.channel).await {
            Ok(()) => {
                tracing::info!("[{}] {} subscribed", self.channel, account);
                self.reply(account, &format!("subscribed [{}]", self.channel)).await;
            }
            Err(e) => {
                tracing::error!("[{}] Failed to subscribe {}: {}", self.channel, account, e);
                self.reply(account, RETRY_NOTICE).await;
            }
        }
    }

    async fn unsubscribe(&self, command: &Command) {
        let account = &command.account;

        let Some(sub) = self.repository.find_subscriber(account, &self.channel).await else {
            self.reply(account, &format!("not subscribed to {}", self.channel)).await;
            return;
        };

        if self.reject_if_banned(&sub).await {
            return;
        }

        match self.repository.unsubscribe(account, &self.channel).await {
            Ok(()) => {
                tracing::info!("[{}] {} unsubscribed", self.channel, account);
                self.reply(account, &format!("unsubscribed [{}]", self.channel)).await;
            }
            Err(e) => {
                tracing::error!("[{}] Failed to unsubscribe {}: {}", self.channel, account, e);
                self.reply(account, RETRY_NOTICE).await;
            }
        }
    }

    /// Deliver a publish to every eligible member except the sender.
    ///
    /// Returns the number of successful deliveries. Publishes from this engine
    /// never interleave: the whole delivery loop runs under the publish lock.
    pub async fn publish(&self, command: &Command) -> usize {
        let sender = &command.account;

        let Some(sub) = self.repository.find_subscriber(sender, &self.channel).await else {
            self.reply(sender, &format!("not subscribed to {}", self.channel)).await;
            return 0;
        };

        if self.reject_if_banned(&sub).await {
            return 0;
        }

        let _guard = self.publish_lock.lock().await;

        let recipients = match self.repository.find_eligible_subscribers(&self.channel).await {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::error!("[{}] Failed to find recipients: {}", self.channel, e);
                return 0;
            }
        };

        let mut delivered = 0;
        for recipient in recipients.iter().filter(|r| &r.account != sender) {
            match self.transport.send_to(&recipient.account, &command.payload).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!("[{}] Failed to deliver to {}: {}", self.channel, recipient.account, e);
                }
            }
        }

        tracing::debug!("[{}] Delivered message from {} to {} subscribers", self.channel, sender, delivered);
        delivered
    }

    async fn ban(&self, command: &Command) {
        let moderator = &command.account;

        if !self.repository.is_moderator(moderator).await {
            self.reply(moderator, "insufficient privileges").await;
            return;
        }

        let (target, days) = match parse_ban(&command.payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("[{}] Bad ban from {}: {}", self.channel, moderator, e);
                self.reply(moderator, BAN_USAGE).await;
                return;
            }
        };

        if self.repository.find_subscriber(&target, &self.channel).await.is_none() {
            self.reply(moderator, &format!("{} not subscribed", target)).await;
            return;
        }

        let until = (days > 0).then(|| Utc::now() + Duration::days(days));

        if let Err(e) = self.repository.update_banned_until(&target, &self.channel, until).await {
            tracing::error!("[{}] Failed to ban {}: {}", self.channel, target, e);
            self.reply(moderator, RETRY_NOTICE).await;
            return;
        }

        match until {
            Some(until) => {
                tracing::info!("[{}] {} banned {} until {}", self.channel, moderator, target, until);
                let until = format_timestamp(until);
                self.reply(moderator, &format!("{} banned until {}", target, until)).await;
                self.reply(&target, &format!("you have been banned until {}", until)).await;
            }
            None => {
                tracing::info!("[{}] {} lifted the ban on {}", self.channel, moderator, target);
                self.reply(moderator, &format!("{} unbanned", target)).await;
                self.reply(&target, "your ban has been lifted").await;
            }
        }
    }

    /// Tell a banned subscriber how long is left; `true` means the command is rejected.
    async fn reject_if_banned(&self, sub: &Subscriber) -> bool {
        match sub.ban_status_at(Utc::now()) {
            BanStatus::NotBanned => false,
            BanStatus::Banned { remaining } => {
                self.reply(&sub.account, &ban_notice(remaining)).await;
                true
            }
        }
    }

    async fn reply(&self, account: &str, text: &str) {
        if let Err(e) = self.transport.send_to(account, text).await {
            tracing::warn!("[{}] Failed to reply to {}: {}", self.channel, account, e);
        }
    }
}

/// `<target> <days>`; zero days lifts a ban.
pub fn parse_ban(payload: &str) -> Result<(String, i64), CommandError> {
    let parts: Vec<&str> = payload.split_whitespace().collect();
    let [target, days] = parts.as_slice() else {
        return Err(CommandError::InvalidArgs(format!("expected 2 arguments, got {}", parts.len())));
    };

    let days: i64 = days
        .parse()
        .map_err(|_| CommandError::InvalidArgs(format!("not a number of days: {}", days)))?;

    if !(0..=MAX_BAN_DAYS).contains(&days) {
        return Err(CommandError::InvalidArgs(format!(
            "days must be between 0 and {}",
            MAX_BAN_DAYS
        )));
    }

    Ok((target.to_lowercase(), days))
}

/// Remaining time rounded up: whole days from one day on, hours below that.
pub fn ban_notice(remaining: Duration) -> String {
    const DAY: i64 = 86_400;
    const HOUR: i64 = 3_600;

    let secs = remaining.num_seconds().max(0);
    if secs >= DAY {
        let days = (secs + DAY - 1) / DAY;
        format!("banned for {} more {}", days, if days == 1 { "day" } else { "days" })
    } else {
        let hours = ((secs + HOUR - 1) / HOUR).max(1);
        format!("banned for {} more {}", hours, if hours == 1 { "hour" } else { "hours" })
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}
