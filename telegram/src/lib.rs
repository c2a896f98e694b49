//! Telegram front-end for the relay session engine.
//!
//! - [`api`] - typed Bot API calls (`getUpdates`, `sendMessage`, ...)
//! - [`bot`] - long-poll loop routing updates to commands or the engine
//! - [`commands`] - `/start`, `/models`, `/clear` and `model:<id>` callbacks
//! - [`format`] - MarkdownV2 escaping and report rendering
//! - [`access`] - chat allow-list

pub mod access;
pub mod api;
pub mod bot;
pub mod commands;
pub mod format;

pub use access::AccessPolicy;
pub use api::{BotApi, BotIdentity, TelegramError, Update};
pub use bot::{Bot, BotProfile, POLL_RETRY_DELAY};
pub use commands::{BOT_COMMANDS, CallbackAction, Command};
