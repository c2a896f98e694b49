//! Minimal typed Telegram Bot API client.
//!
//! Every method is a JSON `POST` to `{base}/bot{token}/{method}`. The token is
//! part of the URL, so transport errors are stripped of their URL before they
//! can reach a log line.

use std::time::Duration;

use relay_types::BotToken;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Server-side long-poll wait for `getUpdates`.
pub const POLL_TIMEOUT_SECS: u64 = 30;

/// Client timeout; must exceed the long-poll wait.
const HTTP_TIMEOUT: Duration = Duration::from_secs(POLL_TIMEOUT_SECS + 30);

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("telegram request failed: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },
    #[error("telegram {method} rejected: {description}")]
    Api {
        method: &'static str,
        code: Option<i64>,
        description: String,
    },
    #[error("telegram {method} returned an unreadable body: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl From<reqwest::Error> for TelegramError {
    fn from(source: reqwest::Error) -> Self {
        TelegramError::Transport {
            source: source.without_url(),
        }
    }
}

// ============================================================================
// Incoming types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// The message carrying the keyboard. Absent for very old messages.
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

// ============================================================================
// Outgoing types
// ============================================================================

/// A single inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BotCommand {
    pub command: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    MarkdownV2,
    Plain,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: &'a [Vec<InlineButton>],
}

/// Identity of the bot as reported by `getMe`.
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    #[serde(default)]
    pub username: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct BotApi {
    http: reqwest::Client,
    token: BotToken,
    base_url: String,
}

impl BotApi {
    pub fn new(token: BotToken) -> Result<Self, TelegramError> {
        Self::with_base_url(token, DEFAULT_API_BASE)
    }

    /// Point the client at a different Bot API server (self-hosted or a test double).
    pub fn with_base_url(
        token: BotToken,
        base_url: impl Into<String>,
    ) -> Result<Self, TelegramError> {
        let http = relay_providers::http_client_with_timeout(HTTP_TIMEOUT)?;
        Ok(Self {
            http,
            token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.base_url,
            self.token.expose_secret()
        )
    }

    async fn call<B, T>(&self, method: &'static str, body: &B) -> Result<T, TelegramError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.http.post(self.api_url(method)).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let parsed: ApiResponse<T> = serde_json::from_str(&text).map_err(|source| {
            if status.is_success() {
                TelegramError::Decode { method, source }
            } else {
                TelegramError::Api {
                    method,
                    code: Some(i64::from(status.as_u16())),
                    description: text.chars().take(512).collect(),
                }
            }
        })?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                description,
                error_code,
                ..
            } => Err(TelegramError::Api {
                method,
                code: error_code.or(Some(i64::from(status.as_u16()))),
                description: description.unwrap_or_else(|| "missing result".to_string()),
            }),
        }
    }

    pub async fn get_me(&self) -> Result<BotIdentity, TelegramError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &body).await
    }

    /// Send a message; returns the new message id.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        mode: ParseMode,
        keyboard: Option<&[Vec<InlineButton>]>,
    ) -> Result<i64, TelegramError> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: match mode {
                ParseMode::MarkdownV2 => Some("MarkdownV2"),
                ParseMode::Plain => None,
            },
            reply_markup: keyboard.map(|inline_keyboard| InlineKeyboardMarkup { inline_keyboard }),
        };
        let sent: SentMessage = self.call("sendMessage", &body).await?;
        tracing::debug!(chat_id, message_id = sent.message_id, "Message sent");
        Ok(sent.message_id)
    }

    pub async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TelegramError> {
        let _: bool = self
            .call("setMyCommands", &serde_json::json!({ "commands": commands }))
            .await?;
        Ok(())
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), TelegramError> {
        let mut body = serde_json::json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            body["text"] = serde_json::Value::String(text.to_string());
        }
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError> {
        let body = serde_json::json!({ "chat_id": chat_id, "message_id": message_id });
        let _: bool = self.call("deleteMessage", &body).await?;
        Ok(())
    }
}
