//! relay - binary entry point.
//!
//! ```text
//! main() -> config -> OpenAiClient -> SessionEngine -> getMe -> Bot::run()
//! ```
//!
//! Only configuration and Telegram authentication are fatal. Everything after
//! startup is logged and survived.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use relay_config::RelayConfig;
use relay_context::SystemClock;
use relay_engine::{SessionEngine, SessionSettings};
use relay_providers::{ChatBackend, ClientConfig, OpenAiClient, RetryPolicy};
use relay_telegram::{AccessPolicy, Bot, BotApi, BotProfile};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set to `json` for JSON-lines log output.
const LOG_FORMAT_ENV: &str = "RELAY_LOG_FORMAT";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var(LOG_FORMAT_ENV).is_ok_and(|raw| raw.trim().eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn build_engine(config: &RelayConfig) -> Result<Arc<SessionEngine>> {
    let client = OpenAiClient::new(
        ClientConfig::new(config.openai.api_url.clone(), config.api_key())
            .with_request_timeout(config.request_timeout()),
    )
    .context("failed to build completion client")?;
    let backend: Arc<dyn ChatBackend> = Arc::new(client);

    let engine = Arc::new(SessionEngine::new(
        backend,
        Arc::new(SystemClock),
        RetryPolicy::new(config.retry.max_attempts, config.retry_delay()),
        SessionSettings {
            history_length: config.session.history_length,
            window: config.window(),
            system_prompt: config.system_prompt(),
            model: config.default_model().unwrap_or_default().to_string(),
        },
    ));

    engine.resolve_default_model().await;

    Ok(engine)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = RelayConfig::load().context("failed to load configuration")?;
    tracing::info!(
        api_url = %config.openai.api_url,
        history_length = config.session.history_length,
        window_minutes = config.session.history_timeout_minutes,
        system_prompt = config.system_prompt().is_some(),
        "Configuration loaded"
    );

    let engine = build_engine(&config).await?;

    let api = BotApi::new(config.bot_token()).context("failed to build Telegram client")?;
    let me = api
        .get_me()
        .await
        .context("failed to authenticate with Telegram")?;
    tracing::info!(
        username = me.username.as_deref().unwrap_or_default(),
        version = VERSION,
        model = %engine.current_model(),
        api_url = %config.openai.api_url,
        "Bot authorized"
    );

    let bot = Arc::new(Bot::new(
        api,
        engine,
        AccessPolicy::new(
            config.telegram.allowed_users.clone(),
            config.telegram.allowed_channels.clone(),
        ),
        BotProfile {
            version: VERSION.to_string(),
            endpoint: config.openai.api_url.clone(),
        },
    ));

    if let Err(error) = bot.register_commands().await {
        tracing::warn!(%error, "Failed to register bot commands");
    }
    bot.announce_startup().await;

    tokio::select! {
        () = Arc::clone(&bot).run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
