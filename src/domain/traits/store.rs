use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::application::errors::StorageError;
use crate::domain::entities::Subscriber;

/// SubscriberStore trait - the durable, crash-surviving subscriber layer
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    // Membership
    async fn find_subscribers(&self, channel: &str) -> Result<Vec<Subscriber>, StorageError>;
    async fn subscribe(&self, account: &str, channel: &str) -> Result<(), StorageError>;
    async fn unsubscribe(&self, account: &str, channel: &str) -> Result<(), StorageError>;

    // State
    async fn update_online_status(&self, account: &str, online: bool) -> Result<(), StorageError>;
    async fn update_banned_until(
        &self,
        account: &str,
        channel: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError>;

    // Moderators
    async fn find_moderators(&self) -> Result<Vec<String>, StorageError>;
    async fn add_moderator(&self, account: &str) -> Result<(), StorageError>;
    async fn remove_moderator(&self, account: &str) -> Result<bool, StorageError>;
}
