//! Slash commands and callback payloads.

use crate::api::BotCommand;
use crate::format::MODEL_CALLBACK_PREFIX;

/// Commands registered with `setMyCommands` at startup.
pub const BOT_COMMANDS: &[BotCommand] = &[
    BotCommand {
        command: "start",
        description: "Show bot info",
    },
    BotCommand {
        command: "models",
        description: "Choose a model",
    },
    BotCommand {
        command: "clear",
        description: "Clear conversation memory",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Models,
    Clear,
    /// Any other `/word`. Ignored, and never forwarded to the model.
    Unknown(String),
}

impl Command {
    /// Parse a leading `/command` or `/command@botname`. `None` for ordinary text.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix('/')?;
        let word = rest.split(char::is_whitespace).next()?;
        let name = word.split_once('@').map_or(word, |(name, _)| name);
        if name.is_empty() {
            return None;
        }
        Some(match name {
            "start" => Command::Start,
            "models" => Command::Models,
            "clear" => Command::Clear,
            other => Command::Unknown(other.to_string()),
        })
    }
}

/// Payload of an inline keyboard press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    SelectModel(String),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let model = data.strip_prefix(MODEL_CALLBACK_PREFIX)?;
        (!model.is_empty()).then(|| CallbackAction::SelectModel(model.to_string()))
    }
}
