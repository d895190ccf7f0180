/// Kind of relay command, selected by the sigil following the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Subscribe,
    Unsubscribe,
    Publish,
    Ban,
}

impl CommandKind {
    pub fn from_sigil(sigil: char) -> Option<Self> {
        match sigil {
            '@' => Some(CommandKind::Subscribe),
            '!' => Some(CommandKind::Unsubscribe),
            '#' => Some(CommandKind::Publish),
            '~' => Some(CommandKind::Ban),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CommandKind::Subscribe => "subscribe",
            CommandKind::Unsubscribe => "unsubscribe",
            CommandKind::Publish => "publish",
            CommandKind::Ban => "ban",
        }
    }
}

/// A command decoded from one inbound line. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lower-cased sender account
    pub account: String,
    pub kind: CommandKind,
    /// Wrapped message for publishes, raw arguments for bans, empty otherwise
    pub payload: String,
}

impl Command {
    pub fn new(account: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            account: account.into(),
            kind,
            payload: String::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }
}
