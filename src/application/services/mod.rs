//! Application services - Relay orchestration

pub mod repository;
pub mod relay;
pub mod presence_watcher;

pub use repository::SubscriberRepository;
pub use relay::{EngineState, RelayEngine};
pub use presence_watcher::PresenceWatcher;
