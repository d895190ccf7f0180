/// Online state change read from the presence log. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub account: String,
    pub online: bool,
}

impl StatusChange {
    pub fn new(account: impl Into<String>, online: bool) -> Self {
        Self {
            account: account.into(),
            online,
        }
    }
}
