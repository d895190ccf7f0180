use chrono::{DateTime, Duration, Utc};

/// One account's membership in one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub account: String,
    pub online: bool,
    pub banned_until: Option<DateTime<Utc>>,
}

/// Outcome of evaluating a subscriber's ban at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanStatus {
    NotBanned,
    Banned { remaining: Duration },
}

impl Subscriber {
    /// A fresh membership; an account has to be connected to subscribe.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            online: true,
            banned_until: None,
        }
    }

    pub fn with_online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn with_banned_until(mut self, until: Option<DateTime<Utc>>) -> Self {
        self.banned_until = until;
        self
    }

    /// Expired bans are left in place and simply stop applying.
    pub fn ban_status_at(&self, now: DateTime<Utc>) -> BanStatus {
        match self.banned_until {
            Some(until) if until > now => BanStatus::Banned { remaining: until - now },
            _ => BanStatus::NotBanned,
        }
    }

    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.ban_status_at(now), BanStatus::Banned { .. })
    }

    /// Online and not currently banned.
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.online && !self.is_banned_at(now)
    }
}
