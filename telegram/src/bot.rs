//! Long-poll dispatch loop.
//!
//! Commands and callback queries are handled inline on the polling task; chat
//! messages are handed to the engine on a spawned task each, so a slow
//! completion never stalls polling. The engine serializes the turns itself.

use std::sync::Arc;
use std::time::Duration;

use relay_engine::SessionEngine;
use tokio::task::JoinHandle;

use crate::access::AccessPolicy;
use crate::api::{BotApi, CallbackQuery, ParseMode, POLL_TIMEOUT_SECS, TelegramError, Update};
use crate::commands::{BOT_COMMANDS, CallbackAction, Command};
use crate::format::{self, InfoCard};

/// Default back-off after a failed `getUpdates`.
pub const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Facts about this deployment shown on the info card.
#[derive(Debug, Clone)]
pub struct BotProfile {
    pub version: String,
    pub endpoint: String,
}

#[derive(Debug)]
pub struct Bot {
    api: BotApi,
    engine: Arc<SessionEngine>,
    access: AccessPolicy,
    profile: BotProfile,
    poll_retry_delay: Duration,
}

impl Bot {
    pub fn new(
        api: BotApi,
        engine: Arc<SessionEngine>,
        access: AccessPolicy,
        profile: BotProfile,
    ) -> Self {
        Self {
            api,
            engine,
            access,
            profile,
            poll_retry_delay: POLL_RETRY_DELAY,
        }
    }

    /// Override the pause after a failed `getUpdates`.
    pub fn with_poll_retry_delay(mut self, delay: Duration) -> Self {
        self.poll_retry_delay = delay;
        self
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<SessionEngine> {
        &self.engine
    }

    pub async fn register_commands(&self) -> Result<(), TelegramError> {
        self.api.set_my_commands(BOT_COMMANDS).await?;
        tracing::info!(count = BOT_COMMANDS.len(), "Bot commands registered");
        Ok(())
    }

    /// Send the info card to every allow-listed user.
    pub async fn announce_startup(&self) {
        for &chat_id in self.access.users() {
            self.send_info_card(chat_id).await;
        }
    }

    /// Poll forever.
    pub async fn run(self: Arc<Self>) {
        let mut offset: i64 = 0;
        tracing::info!("Telegram bot listening for updates");

        loop {
            let updates = match self.api.get_updates(offset, POLL_TIMEOUT_SECS).await {
                Ok(updates) => updates,
                Err(error) => {
                    tracing::warn!(
                        %error,
                        delay_ms = self.poll_retry_delay.as_millis(),
                        "Telegram poll error"
                    );
                    tokio::time::sleep(self.poll_retry_delay).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                // Spawned turns run detached.
                let _ = self.handle_update(update).await;
            }
        }
    }

    /// Route one update. Returns the handle of the spawned turn, if any.
    pub async fn handle_update(self: &Arc<Self>, update: Update) -> Option<JoinHandle<()>> {
        if let Some(query) = update.callback_query {
            self.handle_callback(query).await;
            return None;
        }

        let message = update.message?;
        let chat_id = message.chat.id;
        if !self.access.is_allowed(chat_id, message.chat.username.as_deref()) {
            tracing::debug!(chat_id, "Ignoring message from chat outside the allow-list");
            return None;
        }
        let Some(text) = message.text else {
            tracing::debug!(chat_id, "Ignoring non-text message");
            return None;
        };

        if let Some(command) = Command::parse(&text) {
            self.handle_command(chat_id, command).await;
            return None;
        }

        tracing::info!(chat_id, chars = text.chars().count(), "Received message");
        let bot = Arc::clone(self);
        Some(tokio::spawn(async move {
            bot.handle_message(chat_id, text).await;
        }))
    }

    async fn handle_command(&self, chat_id: i64, command: Command) {
        tracing::info!(chat_id, ?command, "Handling command");
        match command {
            Command::Start => self.send_info_card(chat_id).await,
            Command::Models => self.send_model_picker(chat_id).await,
            Command::Clear => {
                // Blocks polling until an in-flight turn releases the session.
                tracing::debug!(chat_id, "Waiting for session lock to clear history");
                self.engine.clear().await;
                self.send_plain(chat_id, "Conversation memory cleared.").await;
            }
            Command::Unknown(name) => {
                tracing::debug!(chat_id, command = %name, "Ignoring unknown command");
            }
        }
    }

    async fn handle_callback(&self, query: CallbackQuery) {
        let chat = query.message.as_ref().map(|message| &message.chat);
        let chat_id = chat.map_or(query.from.id, |chat| chat.id);
        let username = chat
            .and_then(|chat| chat.username.as_deref())
            .or(query.from.username.as_deref());
        if !self.access.is_allowed(chat_id, username) {
            tracing::debug!(chat_id, "Ignoring callback from chat outside the allow-list");
            return;
        }

        let action = query.data.as_deref().and_then(CallbackAction::parse);
        let Some(CallbackAction::SelectModel(model)) = action else {
            tracing::warn!(chat_id, data = ?query.data, "Unexpected callback data");
            self.answer_callback(&query.id, None).await;
            return;
        };

        self.engine.select_model(model.clone());
        self.send_plain(chat_id, &format!("Model updated to: {model}"))
            .await;

        if let Some(picker) = &query.message
            && let Err(error) = self.api.delete_message(chat_id, picker.message_id).await
        {
            tracing::warn!(chat_id, %error, "Failed to delete model picker");
        }

        self.answer_callback(&query.id, Some(&format!("Model updated to {model}")))
            .await;
        self.send_info_card(chat_id).await;
    }

    async fn handle_message(&self, chat_id: i64, text: String) {
        let report = self.engine.handle_turn(text).await;
        let markdown = format::render_turn(&report);
        let plain = format::render_turn_plain(&report);
        self.send_formatted(chat_id, &markdown, &plain).await;
    }

    pub async fn send_info_card(&self, chat_id: i64) {
        let model = self.engine.current_model();
        let text = format::render_info_card(&InfoCard {
            started_at: self.engine.started_at(),
            version: &self.profile.version,
            model: &model,
            endpoint: &self.profile.endpoint,
            history_length: self.engine.history_length(),
            window: self.engine.window(),
        });
        if let Err(error) = self
            .api
            .send_message(chat_id, &text, ParseMode::MarkdownV2, None)
            .await
        {
            tracing::warn!(chat_id, %error, "Failed to send info card");
        }
    }

    async fn send_model_picker(&self, chat_id: i64) {
        let models = self.engine.list_models().await;
        if models.is_empty() {
            self.send_plain(chat_id, "No models available.").await;
            return;
        }
        let keyboard = format::model_keyboard(&models);
        match self
            .api
            .send_message(chat_id, "Choose a model:", ParseMode::Plain, Some(&keyboard))
            .await
        {
            Ok(message_id) => {
                tracing::debug!(chat_id, message_id, models = models.len(), "Model picker sent");
            }
            Err(error) => tracing::warn!(chat_id, %error, "Failed to send model picker"),
        }
    }

    /// MarkdownV2 first; on rejection, resend `plain` without a parse mode,
    /// split to fit the message size limit.
    async fn send_formatted(&self, chat_id: i64, markdown: &str, plain: &str) {
        let Err(error) = self
            .api
            .send_message(chat_id, markdown, ParseMode::MarkdownV2, None)
            .await
        else {
            return;
        };
        tracing::warn!(chat_id, %error, "Formatted send failed, falling back to plain text");
        let chunks = format::split_message(plain, format::MAX_MESSAGE_CHARS);
        let total = chunks.len();
        for (index, chunk) in chunks.iter().enumerate() {
            if let Err(error) = self
                .api
                .send_message(chat_id, chunk, ParseMode::Plain, None)
                .await
            {
                tracing::error!(chat_id, chunk = index + 1, total, %error, "Plain send failed");
                return;
            }
        }
    }

    async fn send_plain(&self, chat_id: i64, text: &str) {
        if let Err(error) = self
            .api
            .send_message(chat_id, text, ParseMode::Plain, None)
            .await
        {
            tracing::warn!(chat_id, %error, "Failed to send message");
        }
    }

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) {
        if let Err(error) = self.api.answer_callback_query(query_id, text).await {
            tracing::warn!(%error, "Failed to answer callback query");
        }
    }
}
