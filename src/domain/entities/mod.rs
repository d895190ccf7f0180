//! Domain entities - Core relay objects with no external dependencies

pub mod subscriber;
pub mod command;
pub mod status;

pub use subscriber::{BanStatus, Subscriber};
pub use command::{Command, CommandKind};
pub use status::StatusChange;
