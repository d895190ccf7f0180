//! Presence-aware publish/subscribe relay for line-based chat servers
//!
//! Subscribers join channels by whispering commands to a channel's bot
//! account; published messages are relayed to every online, unbanned
//! member. Online state follows the chat server's own log.

pub mod domain;
pub mod application;
pub mod infrastructure;
