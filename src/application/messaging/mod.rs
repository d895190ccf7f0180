//! Line decoding - Inbound chat commands and presence log entries

pub mod parser;
pub mod presence;

pub use parser::CommandDecoder;
pub use presence::PresenceDecoder;
