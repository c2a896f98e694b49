//! Core message domain model.
//!
//! Constructors take `SystemTime` explicitly; callers own the clock.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::NonEmptyString;

/// Conversation role as understood by chat-completion endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single history entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: String,
    timestamp: SystemTime,
}

impl Message {
    #[must_use]
    pub fn system(content: &NonEmptyString, timestamp: SystemTime) -> Self {
        Self {
            role: Role::System,
            content: content.as_str().to_string(),
            timestamp,
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>, timestamp: SystemTime) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp,
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>, timestamp: SystemTime) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp,
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn role_str(&self) -> &'static str {
        self.role.as_str()
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}
