//! Command decoder - Parses inbound chat lines into relay commands

use once_cell::sync::Lazy;
use regex_lite::Regex;
use crate::domain::entities::{Command, CommandKind};

/// `<from ACCOUNT> SIGIL [PAYLOAD]`
static COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^<from\s+([a-z0-9_-]+)>\s+([#@!~])\s*(.+)?").expect("valid command regex")
});

/// Dotted quads, which the chat server's alias substitution (`%r`) can leak into text
static IPV4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)(\.(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)){3}")
        .expect("valid ipv4 regex")
});

/// Stateless decoder for inbound command lines
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandDecoder;

impl CommandDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a raw line, `None` when it is not a relay command
    pub fn decode(&self, line: &str) -> Option<Command> {
        let line = line.trim_end_matches(['\r', '\n']);
        let caps = COMMAND_RE.captures(line)?;

        let sender = caps.get(1)?.as_str();
        let sigil = caps.get(2)?.as_str().chars().next()?;
        let kind = CommandKind::from_sigil(sigil)?;
        let payload = caps.get(3).map(|m| m.as_str()).unwrap_or("");

        let command = Command::new(sender.to_lowercase(), kind);

        Some(match kind {
            CommandKind::Publish => {
                let cleaned = strip_ipv4(payload);
                command.with_payload(format!("[{}] {}", sender, cleaned))
            }
            CommandKind::Ban => command.with_payload(payload),
            CommandKind::Subscribe | CommandKind::Unsubscribe => command,
        })
    }
}

/// Remove every IPv4-looking substring from `text`
pub fn strip_ipv4(text: &str) -> String {
    IPV4_RE.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> Option<Command> {
        CommandDecoder::new().decode(line)
    }

    #[test]
    fn test_valid_subscribe() {
        assert_eq!(
            decode("<from nokka> @"),
            Some(Command::new("nokka", CommandKind::Subscribe))
        );
    }

    #[test]
    fn test_subscribe_truncates_trailing_text() {
        assert_eq!(
            decode("<from nokka> @ truncated"),
            Some(Command::new("nokka", CommandKind::Subscribe))
        );
    }

    #[test]
    fn test_valid_unsubscribe() {
        assert_eq!(
            decode("<from nokka> !"),
            Some(Command::new("nokka", CommandKind::Unsubscribe))
        );
    }

    #[test]
    fn test_valid_publish() {
        assert_eq!(
            decode("<from nokka> # hello there"),
            Some(Command::new("nokka", CommandKind::Publish).with_payload("[nokka] hello there"))
        );
    }

    #[test]
    fn test_publish_keeps_display_case_but_lowers_account() {
        let cmd = decode("<FROM NoKKa> # hi").unwrap();
        assert_eq!(cmd.account, "nokka");
        assert_eq!(cmd.payload, "[NoKKa] hi");
    }

    #[test]
    fn test_ban_payload_is_raw() {
        assert_eq!(
            decode("<from Ops> ~ nokka 2"),
            Some(Command::new("ops", CommandKind::Ban).with_payload("nokka 2"))
        );
    }

    #[test]
    fn test_trailing_line_ending_is_ignored() {
        let cmd = decode("<from nokka> # hey\r\n").unwrap();
        assert_eq!(cmd.payload, "[nokka] hey");
    }

    #[test]
    fn test_rejects_malformed_lines() {
        for line in [
            "<from nokka> sub",
            "<from nokka> pub",
            "<from nokka> random message that won't get through",
            "<from nokka> $ money",
            "from nokka # hi",
            "<from > # hi",
            "<from nok ka> # hi",
            "",
            "<from nokka>#hi",
            "some text <from nokka> # hi",
        ] {
            assert_eq!(decode(line), None, "line should be rejected: {:?}", line);
        }
    }

    #[test]
    fn test_publish_strips_ip_addresses() {
        let cmd = decode("<from nokka> # join me at 192.168.1.20 now").unwrap();
        assert_eq!(cmd.payload, "[nokka] join me at  now");

        let cmd = decode("<from nokka> # 10.0.0.1").unwrap();
        assert_eq!(cmd.payload, "[nokka] ");
    }

    #[test]
    fn test_publish_keeps_short_numeric_sequences() {
        let cmd = decode("<from nokka> # patch 1.14.3 is out").unwrap();
        assert_eq!(cmd.payload, "[nokka] patch 1.14.3 is out");
    }

    #[test]
    fn test_strip_ipv4_ignores_out_of_range_octets() {
        assert_eq!(strip_ipv4("999.999.999.999"), "999.999.999.999");
        assert_eq!(strip_ipv4("at 255.255.255.255."), "at .");
    }
}
