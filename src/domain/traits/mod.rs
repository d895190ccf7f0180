//! Domain traits - Abstractions for infrastructure implementations

pub mod transport;
pub mod store;

pub use transport::{Transport, TransportInfo};
pub use store::SubscriberStore;
