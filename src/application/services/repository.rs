//! Subscriber repository - durable store plus in-memory cache
//!
//! Mutations write through: the durable store is written first and the cache
//! is only touched once that write succeeded, so the cache never holds state
//! that would be lost on restart. Hot-path reads come from the cache alone.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::application::errors::RepositoryError;
use crate::domain::entities::Subscriber;
use crate::domain::traits::SubscriberStore;
use crate::infrastructure::storage::SubscriberCache;

pub struct SubscriberRepository {
    store: Arc<dyn SubscriberStore>,
    cache: SubscriberCache,
}

impl SubscriberRepository {
    pub fn new<I, S>(store: Arc<dyn SubscriberStore>, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            cache: SubscriberCache::new(channels),
        }
    }

    /// Load every channel and the moderator list from the durable store.
    ///
    /// Must complete before any engine opens for traffic.
    pub async fn sync(&self) -> Result<(), RepositoryError> {
        for channel in self.cache.channel_names().await {
            let subscribers = self.store.find_subscribers(&channel).await?;
            tracing::info!(channel = %channel, count = subscribers.len(), "Synced subscribers");
            self.cache.sync_subscribers(&channel, subscribers).await?;
        }

        let moderators = self.store.find_moderators().await?;
        tracing::info!(count = moderators.len(), "Synced moderators");
        self.cache.sync_moderators(moderators).await;

        Ok(())
    }

    pub async fn find_subscribers(&self, channel: &str) -> Result<Vec<Subscriber>, RepositoryError> {
        self.cache.find_subscribers(channel).await
    }

    /// Fan-out targets: online and not currently banned.
    pub async fn find_eligible_subscribers(
        &self,
        channel: &str,
    ) -> Result<Vec<Subscriber>, RepositoryError> {
        self.cache.find_eligible_subscribers(channel, Utc::now()).await
    }

    /// Membership lookup; an unknown channel reads as not subscribed.
    pub async fn find_subscriber(&self, account: &str, channel: &str) -> Option<Subscriber> {
        self.cache.find_subscriber(account, channel).await
    }

    pub async fn subscribe(&self, account: &str, channel: &str) -> Result<(), RepositoryError> {
        self.ensure_channel(channel).await?;
        if self.cache.find_subscriber(account, channel).await.is_some() {
            return Ok(());
        }

        self.store.subscribe(account, channel).await?;
        self.cache.subscribe(account, channel).await
    }

    pub async fn unsubscribe(&self, account: &str, channel: &str) -> Result<(), RepositoryError> {
        self.ensure_channel(channel).await?;
        if self.cache.find_subscriber(account, channel).await.is_none() {
            return Ok(());
        }

        self.store.unsubscribe(account, channel).await?;
        self.cache.unsubscribe(account, channel).await
    }

    /// `None` lifts the ban.
    pub async fn update_banned_until(
        &self,
        account: &str,
        channel: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        self.ensure_channel(channel).await?;

        self.store.update_banned_until(account, channel, until).await?;
        self.cache.update_banned_until(account, channel, until).await
    }

    pub async fn update_online_status(&self, account: &str, online: bool) -> Result<(), RepositoryError> {
        self.store.update_online_status(account, online).await?;
        self.cache.update_online_status(account, online).await;
        Ok(())
    }

    pub async fn subscriber_exists(&self, account: &str) -> bool {
        self.cache.subscriber_exists(account).await
    }

    pub async fn find_moderators(&self) -> Vec<String> {
        self.cache.find_moderators().await
    }

    pub async fn is_moderator(&self, account: &str) -> bool {
        self.cache.is_moderator(account).await
    }

    async fn ensure_channel(&self, channel: &str) -> Result<(), RepositoryError> {
        if self.cache.has_channel(channel).await {
            Ok(())
        } else {
            Err(RepositoryError::ChannelNotFound(channel.to_string()))
        }
    }
}
