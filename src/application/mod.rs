//! Application layer - Relay logic
//! 
//! This layer contains:
//! - Services: Repository, relay engine, presence watcher
//! - Errors: Domain-specific errors
//! - Messaging: Command and presence line decoding

pub mod errors;
pub mod services;
pub mod messaging;
