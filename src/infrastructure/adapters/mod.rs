//! Transport adapters - Chat server connection and local console

pub mod chat;
pub mod console;

pub use chat::ChatConnection;
pub use console::ConsoleTransport;
