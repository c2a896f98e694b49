//! Shared test utilities and fixtures
//!
//! Mock servers for the completion API and the Telegram Bot API, plus
//! builders for engines and bots wired to them.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_context::ManualClock;
use relay_engine::{SessionEngine, SessionSettings};
use relay_providers::{ClientConfig, OpenAiClient, RetryPolicy};
use relay_telegram::{AccessPolicy, Bot, BotApi, BotProfile};
use relay_types::{ApiKey, BotToken, NonEmptyString};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const BOT_TOKEN: &str = "42:TEST";
pub const WINDOW: Duration = Duration::from_secs(60 * 60);

/// Mount a chat completion reply, optionally with a usage block.
pub async fn mount_chat_response(server: &MockServer, content: &str, usage: Option<(u64, u64)>) {
    let mut body = json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    });
    if let Some((prompt, completion)) = usage {
        body["usage"] = json!({
            "prompt_tokens": prompt,
            "completion_tokens": completion,
            "total_tokens": prompt + completion
        });
    }

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount a completion endpoint that always fails with `status`.
pub async fn mount_chat_failure(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "error": {"code": null, "message": "upstream unavailable", "type": "server_error"}
        })))
        .mount(server)
        .await;
}

pub async fn mount_models(server: &MockServer, ids: &[&str]) {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| json!({"id": id, "object": "model", "created": 0, "owned_by": "system"}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": data
        })))
        .mount(server)
        .await;
}

/// Mount a successful Bot API method returning `result`.
pub async fn mount_telegram(server: &MockServer, api_method: &str, result: Value) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/{api_method}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": result
        })))
        .mount(server)
        .await;
}

/// Mount every Bot API method the dispatcher uses with a generic success.
pub async fn mount_telegram_defaults(server: &MockServer) {
    mount_telegram(server, "sendMessage", json!({"message_id": 1000})).await;
    mount_telegram(server, "deleteMessage", json!(true)).await;
    mount_telegram(server, "answerCallbackQuery", json!(true)).await;
    mount_telegram(server, "setMyCommands", json!(true)).await;
}

pub fn engine(openai: &MockServer, clock: &ManualClock, history_length: u32) -> Arc<SessionEngine> {
    let client = OpenAiClient::new(
        ClientConfig::new(openai.uri(), ApiKey::new("sk-test"))
            .with_request_timeout(Duration::from_secs(5)),
    )
    .unwrap();
    Arc::new(SessionEngine::new(
        Arc::new(client),
        Arc::new(clock.clone()),
        RetryPolicy::new(3, Duration::from_millis(10)),
        SessionSettings {
            history_length,
            window: WINDOW,
            system_prompt: NonEmptyString::non_blank("You are a test."),
            model: "gpt-4o-mini".into(),
        },
    ))
}

pub fn unshared_bot(telegram: &MockServer, engine: Arc<SessionEngine>, access: AccessPolicy) -> Bot {
    let api = BotApi::with_base_url(BotToken::new(BOT_TOKEN), telegram.uri()).unwrap();
    Bot::new(
        api,
        engine,
        access,
        BotProfile {
            version: "0.1.0".into(),
            endpoint: "http://mock/v1".into(),
        },
    )
}

pub fn bot(telegram: &MockServer, engine: Arc<SessionEngine>, access: AccessPolicy) -> Arc<Bot> {
    Arc::new(unshared_bot(telegram, engine, access))
}

pub fn text_update_json(update_id: i64, chat_id: i64, text: &str) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id * 10,
            "chat": {"id": chat_id, "type": "private"},
            "from": {"id": chat_id, "is_bot": false, "first_name": "T"},
            "text": text
        }
    })
}

pub fn text_update(update_id: i64, chat_id: i64, text: &str) -> relay_telegram::Update {
    serde_json::from_value(text_update_json(update_id, chat_id, text)).unwrap()
}

pub fn callback_update(update_id: i64, chat_id: i64, message_id: i64, data: &str) -> relay_telegram::Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "callback_query": {
            "id": format!("cb-{update_id}"),
            "from": {"id": chat_id, "is_bot": false, "first_name": "T"},
            "message": {"message_id": message_id, "chat": {"id": chat_id, "type": "private"}},
            "data": data
        }
    }))
    .unwrap()
}

/// JSON bodies of every request received on `path_suffix`, in arrival order.
pub async fn bodies(server: &MockServer, path_suffix: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request: &&Request| request.url.path().ends_with(path_suffix))
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

/// Wait until `server` has seen at least `count` requests on `path_suffix`.
pub async fn wait_for_requests(server: &MockServer, path_suffix: &str, count: usize) -> Vec<Value> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let seen = bodies(server, path_suffix).await;
        if seen.len() >= count {
            return seen;
        }
        assert!(
            Instant::now() < deadline,
            "expected {count} requests on {path_suffix}, saw {}",
            seen.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
