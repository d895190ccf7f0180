//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Configuration loading
//! - Database: Durable SQLite subscriber store
//! - Storage: In-memory subscriber cache
//! - Adapters: Chat server connection and console transport
//! - Tail: Rotation-aware log following

pub mod config;
pub mod database;
pub mod storage;
pub mod adapters;
pub mod tail;
