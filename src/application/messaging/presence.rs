//! Presence decoder - Parses presence log lines into status changes

use once_cell::sync::Lazy;
use regex_lite::Regex;
use crate::domain::entities::StatusChange;

/// Last quoted account on the line followed by the action, e.g.
/// `... conn_destroy: [28] "nokka" logged out`. Bot logins carry a `bot` qualifier.
static PRESENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^.*\s"([a-z0-9_-]+)"\s+(?:bot\s+)?([a-z]+\s+[a-z]+)"#)
        .expect("valid presence regex")
});

/// Stateless decoder for presence log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceDecoder;

impl PresenceDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a log line, `None` unless it is a login or logout
    pub fn decode(&self, line: &str) -> Option<StatusChange> {
        let caps = PRESENCE_RE.captures(line)?;
        let account = caps.get(1)?.as_str();

        let action = caps
            .get(2)?
            .as_str()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let online = match action.as_str() {
            "logged in" => true,
            "logged out" => false,
            _ => return None,
        };

        Some(StatusChange::new(account.to_lowercase(), online))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> Option<StatusChange> {
        PresenceDecoder::new().decode(line)
    }

    #[test]
    fn test_user_login() {
        assert_eq!(
            decode("Aug 28 08:25:22 [info ] _client_loginreq2: [28] \"nokka\" logged in (correct password)"),
            Some(StatusChange::new("nokka", true))
        );
    }

    #[test]
    fn test_user_logout() {
        assert_eq!(
            decode("Aug 28 09:01:48 [info ] conn_destroy: [28] \"nokka\" logged out"),
            Some(StatusChange::new("nokka", false))
        );
    }

    #[test]
    fn test_bot_login_lowercases_account() {
        assert_eq!(
            decode("Aug 28 08:15:05 [info ] handle_telnet_packet: [28] \"Discord\" bot logged in (correct password)"),
            Some(StatusChange::new("discord", true))
        );
    }

    #[test]
    fn test_action_is_case_insensitive() {
        assert_eq!(
            decode("Aug 28 09:15:35 [info ] conn_destroy: [28] \"discord\" Logged OUT"),
            Some(StatusChange::new("discord", false))
        );
    }

    #[test]
    fn test_unrelated_lines_are_rejected() {
        for line in [
            "Aug 28 09:01:48 [debug] sd_tcpinput: [28] read returned -1 (closing connection)",
            "Aug 28 09:01:48 [info ] _client_loginreq2: [28] \"nokka\" failed to log in",
            "Aug 28 09:01:48 [info ] [28] \"nokka\" logged",
            "\"nokka\" logged in",
            "",
        ] {
            assert_eq!(decode(line), None, "line should be rejected: {:?}", line);
        }
    }
}
