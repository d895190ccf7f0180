//! Domain layer - Core relay concepts with no I/O
//! 
//! This layer contains:
//! - Entities: Subscriber, Command, StatusChange
//! - Traits: Abstractions for infrastructure (Transport, SubscriberStore)

pub mod entities;
pub mod traits;
