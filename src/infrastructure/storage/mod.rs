//! In-memory subscriber cache
//!
//! Eagerly loaded mirror of the durable store, read on the hot publish path.
//! Every channel is registered up front; operations on anything else fail
//! with `ChannelNotFound`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::application::errors::RepositoryError;
use crate::domain::entities::Subscriber;

struct CacheState {
    /// channel -> account -> subscriber
    channels: HashMap<String, HashMap<String, Subscriber>>,
    moderators: Vec<String>,
}

/// Subscriber and moderator mirror behind a single reader/writer lock
pub struct SubscriberCache {
    state: RwLock<CacheState>,
}

impl SubscriberCache {
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels = channels
            .into_iter()
            .map(|name| (name.into(), HashMap::new()))
            .collect();

        Self {
            state: RwLock::new(CacheState {
                channels,
                moderators: Vec::new(),
            }),
        }
    }

    /// Replace a channel's members with a snapshot from the durable store.
    pub async fn sync_subscribers(
        &self,
        channel: &str,
        subscribers: Vec<Subscriber>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let members = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| RepositoryError::ChannelNotFound(channel.to_string()))?;

        members.clear();
        for sub in subscribers {
            members.insert(sub.account.clone(), sub);
        }
        Ok(())
    }

    pub async fn sync_moderators(&self, moderators: Vec<String>) {
        let mut state = self.state.write().await;
        state.moderators = moderators.into_iter().map(|m| m.to_lowercase()).collect();
    }

    pub async fn channel_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn has_channel(&self, channel: &str) -> bool {
        self.state.read().await.channels.contains_key(channel)
    }

    /// `None` for an unknown channel too: no account is a member of it.
    pub async fn find_subscriber(&self, account: &str, channel: &str) -> Option<Subscriber> {
        let state = self.state.read().await;
        state.channels.get(channel)?.get(account).cloned()
    }

    pub async fn find_subscribers(&self, channel: &str) -> Result<Vec<Subscriber>, RepositoryError> {
        let state = self.state.read().await;
        let members = state
            .channels
            .get(channel)
            .ok_or_else(|| RepositoryError::ChannelNotFound(channel.to_string()))?;

        let mut subs: Vec<Subscriber> = members.values().cloned().collect();
        subs.sort_by(|a, b| a.account.cmp(&b.account));
        Ok(subs)
    }

    /// Online members whose ban, if any, has lapsed by `now`.
    pub async fn find_eligible_subscribers(
        &self,
        channel: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscriber>, RepositoryError> {
        let state = self.state.read().await;
        let members = state
            .channels
            .get(channel)
            .ok_or_else(|| RepositoryError::ChannelNotFound(channel.to_string()))?;

        let mut subs: Vec<Subscriber> = members
            .values()
            .filter(|sub| sub.is_eligible_at(now))
            .cloned()
            .collect();
        subs.sort_by(|a, b| a.account.cmp(&b.account));
        Ok(subs)
    }

    /// No-op when already a member.
    pub async fn subscribe(&self, account: &str, channel: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let members = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| RepositoryError::ChannelNotFound(channel.to_string()))?;

        members
            .entry(account.to_string())
            .or_insert_with(|| Subscriber::new(account));
        Ok(())
    }

    pub async fn unsubscribe(&self, account: &str, channel: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let members = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| RepositoryError::ChannelNotFound(channel.to_string()))?;

        members.remove(account);
        Ok(())
    }

    pub async fn update_banned_until(
        &self,
        account: &str,
        channel: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let members = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| RepositoryError::ChannelNotFound(channel.to_string()))?;

        if let Some(sub) = members.get_mut(account) {
            sub.banned_until = until;
        }
        Ok(())
    }

    /// Presence is per account, so every membership is updated.
    pub async fn update_online_status(&self, account: &str, online: bool) {
        let mut state = self.state.write().await;
        for members in state.channels.values_mut() {
            if let Some(sub) = members.get_mut(account) {
                sub.online = online;
            }
        }
    }

    pub async fn subscriber_exists(&self, account: &str) -> bool {
        let state = self.state.read().await;
        state.channels.values().any(|members| members.contains_key(account))
    }

    pub async fn find_moderators(&self) -> Vec<String> {
        self.state.read().await.moderators.clone()
    }

    pub async fn is_moderator(&self, account: &str) -> bool {
        self.state.read().await.moderators.iter().any(|m| m == account)
    }
}
