//! Chat allow-list.

/// Which chats may talk to the bot. Both lists empty admits everyone.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    users: Vec<i64>,
    channels: Vec<String>,
}

impl AccessPolicy {
    pub fn new(users: Vec<i64>, channels: Vec<String>) -> Self {
        Self { users, channels }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.users.is_empty() && self.channels.is_empty()
    }

    /// A chat is admitted by id or by username.
    #[must_use]
    pub fn is_allowed(&self, chat_id: i64, username: Option<&str>) -> bool {
        if self.is_open() || self.users.contains(&chat_id) {
            return true;
        }
        username.is_some_and(|name| self.channels.iter().any(|channel| channel == name))
    }

    /// Chats that receive the startup info card.
    #[must_use]
    pub fn users(&self) -> &[i64] {
        &self.users
    }
}
