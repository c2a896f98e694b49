//! Update dispatch against mock Telegram and completion servers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_context::ManualClock;
use relay_telegram::{AccessPolicy, POLL_RETRY_DELAY};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    BOT_TOKEN, bodies, bot, callback_update, engine, mount_chat_response, mount_models,
    mount_telegram_defaults, text_update, text_update_json, unshared_bot, wait_for_requests,
};

fn open() -> AccessPolicy {
    AccessPolicy::new(Vec::new(), Vec::new())
}

#[tokio::test]
async fn chat_message_is_answered_with_markdown_reply() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    mount_chat_response(&openai, "Hello back", Some((7, 3))).await;
    mount_telegram_defaults(&telegram).await;
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), open());

    let turn = bot.handle_update(text_update(1, 100, "hi")).await.unwrap();
    turn.await.unwrap();

    let sent = bodies(&telegram, "/sendMessage").await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], 100);
    assert_eq!(sent[0]["parse_mode"], "MarkdownV2");
    let text = sent[0]["text"].as_str().unwrap();
    assert!(text.contains("Hello back"));
    assert!(text.contains("gpt\\-4o\\-mini"));
    assert!(text.contains("Input: 7 \\(API\\)"));
}

#[tokio::test]
async fn rejected_markdown_falls_back_to_plain_text() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    mount_chat_response(&openai, "raw *reply", None).await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/sendMessage")))
        .and(body_partial_json(json!({"parse_mode": "MarkdownV2"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: can't parse entities"
        })))
        .mount(&telegram)
        .await;
    mount_telegram_defaults(&telegram).await;
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), open());

    let turn = bot.handle_update(text_update(1, 100, "hi")).await.unwrap();
    turn.await.unwrap();

    let sent = bodies(&telegram, "/sendMessage").await;
    assert_eq!(sent.len(), 2);
    assert!(sent[1].get("parse_mode").is_none());
    let fallback = sent[1]["text"].as_str().unwrap();
    assert!(fallback.starts_with("Formatting failed"));
    assert!(fallback.ends_with("raw *reply"));
}

#[tokio::test]
async fn clear_command_resets_history_and_confirms() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    mount_chat_response(&openai, "ok", None).await;
    mount_telegram_defaults(&telegram).await;
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), open());

    let turn = bot.handle_update(text_update(1, 100, "remember me")).await.unwrap();
    turn.await.unwrap();
    assert_eq!(bot.engine().snapshot().await.history.len(), 3);

    assert!(bot.handle_update(text_update(2, 100, "/clear")).await.is_none());

    let snapshot = bot.engine().snapshot().await;
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.remaining_rounds, 5);
    let sent = bodies(&telegram, "/sendMessage").await;
    assert_eq!(sent.last().unwrap()["text"], "Conversation memory cleared.");
}

#[tokio::test]
async fn models_command_sends_two_column_picker() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    mount_models(&openai, &["a", "b", "c"]).await;
    mount_telegram_defaults(&telegram).await;
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), open());

    assert!(bot.handle_update(text_update(1, 100, "/models")).await.is_none());

    let sent = bodies(&telegram, "/sendMessage").await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["text"], "Choose a model:");
    assert_eq!(
        sent[0]["reply_markup"]["inline_keyboard"],
        json!([
            [{"text": "a", "callback_data": "model:a"}, {"text": "b", "callback_data": "model:b"}],
            [{"text": "c", "callback_data": "model:c"}],
        ])
    );
}

#[tokio::test]
async fn model_callback_switches_model_and_removes_picker() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    mount_telegram_defaults(&telegram).await;
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), open());

    let spawned = bot
        .handle_update(callback_update(3, 100, 77, "model:gpt-4o"))
        .await;
    assert!(spawned.is_none());

    assert_eq!(bot.engine().current_model(), "gpt-4o");
    assert_eq!(
        bodies(&telegram, "/deleteMessage").await,
        [json!({"chat_id": 100, "message_id": 77})]
    );
    let answers = bodies(&telegram, "/answerCallbackQuery").await;
    assert_eq!(answers[0]["callback_query_id"], "cb-3");
    assert_eq!(answers[0]["text"], "Model updated to gpt-4o");

    let sent = bodies(&telegram, "/sendMessage").await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["text"], "Model updated to: gpt-4o");
    assert_eq!(sent[1]["parse_mode"], "MarkdownV2");
}

#[tokio::test]
async fn chats_outside_allow_list_are_ignored() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    mount_chat_response(&openai, "ok", None).await;
    mount_telegram_defaults(&telegram).await;
    let access = AccessPolicy::new(vec![1], Vec::new());
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), access);

    assert!(bot.handle_update(text_update(1, 2, "hi")).await.is_none());
    assert!(
        bot.handle_update(callback_update(2, 2, 5, "model:evil"))
            .await
            .is_none()
    );

    assert_eq!(bot.engine().current_model(), "gpt-4o-mini");
    assert!(telegram.received_requests().await.unwrap().is_empty());
    assert!(openai.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn start_command_sends_info_card() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    mount_telegram_defaults(&telegram).await;
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), open());

    assert!(bot.handle_update(text_update(1, 100, "/start")).await.is_none());

    let sent = bodies(&telegram, "/sendMessage").await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["parse_mode"], "MarkdownV2");
    let card = sent[0]["text"].as_str().unwrap();
    assert!(card.contains("Version: 0\\.1\\.0"));
    assert!(card.contains("API URL: http://mock/v1"));
    assert!(card.contains("Round limit: 5"));
    assert!(card.contains("Memory window: 60 minutes"));
}

/// Mount `getUpdates` returning an empty batch after a short hold.
async fn mount_idle_polls(telegram: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/getUpdates")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true, "result": []}))
                .set_delay(Duration::from_millis(20)),
        )
        .mount(telegram)
        .await;
}

fn offsets(polls: &[Value]) -> Vec<i64> {
    polls.iter().map(|poll| poll["offset"].as_i64().unwrap()).collect()
}

#[tokio::test]
async fn poll_loop_advances_offset_past_handled_updates() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/getUpdates")))
        .and(body_partial_json(json!({"offset": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [text_update_json(5, 100, "/start")]
        })))
        .up_to_n_times(1)
        .mount(&telegram)
        .await;
    mount_idle_polls(&telegram).await;
    mount_telegram_defaults(&telegram).await;
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), open());

    let poller = tokio::spawn(Arc::clone(&bot).run());
    let polls = wait_for_requests(&telegram, "/getUpdates", 3).await;
    poller.abort();

    let offsets = offsets(&polls);
    assert_eq!(offsets[0], 0);
    assert!(offsets[1..].iter().all(|&offset| offset == 6));
    assert_eq!(polls[0]["timeout"], 30);
    assert_eq!(bodies(&telegram, "/sendMessage").await.len(), 1);
}

#[tokio::test]
async fn failed_poll_backs_off_then_retries_same_offset() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(1)
        .mount(&telegram)
        .await;
    mount_idle_polls(&telegram).await;
    let delay = Duration::from_millis(300);
    let bot = Arc::new(
        unshared_bot(&telegram, engine(&openai, &ManualClock::default(), 5), open())
            .with_poll_retry_delay(delay),
    );

    let started = Instant::now();
    let poller = tokio::spawn(Arc::clone(&bot).run());
    let polls = wait_for_requests(&telegram, "/getUpdates", 2).await;
    poller.abort();

    assert!(started.elapsed() >= delay);
    assert_eq!(offsets(&polls[..2]), [0, 0]);
    assert_eq!(POLL_RETRY_DELAY, Duration::from_secs(5));
}

#[tokio::test]
async fn startup_registers_commands_and_announces_to_allowed_users() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    mount_telegram_defaults(&telegram).await;
    let access = AccessPolicy::new(vec![11, 22], vec!["news".into()]);
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), access);

    bot.register_commands().await.unwrap();
    bot.announce_startup().await;

    let registered = bodies(&telegram, "/setMyCommands").await;
    assert_eq!(registered.len(), 1);
    let names: Vec<_> = registered[0]["commands"]
        .as_array()
        .unwrap()
        .iter()
        .map(|command| command["command"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["start", "models", "clear"]);

    let cards = bodies(&telegram, "/sendMessage").await;
    let recipients: Vec<_> = cards.iter().map(|card| card["chat_id"].as_i64().unwrap()).collect();
    assert_eq!(recipients, [11, 22]);
    assert!(cards.iter().all(|card| card["parse_mode"] == "MarkdownV2"));
}

#[tokio::test]
async fn oversized_reply_falls_back_to_split_plain_messages() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    let reply = "word ".repeat(1000);
    mount_chat_response(&openai, reply.trim_end(), None).await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/sendMessage")))
        .and(body_partial_json(json!({"parse_mode": "MarkdownV2"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message is too long"
        })))
        .mount(&telegram)
        .await;
    mount_telegram_defaults(&telegram).await;
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), open());

    let turn = bot.handle_update(text_update(1, 100, "talk a lot")).await.unwrap();
    turn.await.unwrap();

    let sent = bodies(&telegram, "/sendMessage").await;
    let plain = &sent[1..];
    assert!(plain.len() > 1);
    assert!(plain[0]["text"].as_str().unwrap().starts_with("Formatting failed"));
    let mut words = 0;
    for message in plain {
        assert!(message.get("parse_mode").is_none());
        let text = message["text"].as_str().unwrap();
        assert!(text.chars().count() <= 4096);
        words += text.split_whitespace().filter(|word| *word == "word").count();
    }
    assert_eq!(words, 1000);
}

#[tokio::test]
async fn clear_waits_for_in_flight_turn() {
    let openai = MockServer::start().await;
    let telegram = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": "slow"}}]}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&openai)
        .await;
    mount_telegram_defaults(&telegram).await;
    let bot = bot(&telegram, engine(&openai, &ManualClock::default(), 5), open());

    let turn = bot.handle_update(text_update(1, 100, "hold on")).await.unwrap();
    wait_for_requests(&openai, "/chat/completions", 1).await;
    assert!(bot.handle_update(text_update(2, 100, "/clear")).await.is_none());

    // The turn finished before the clear ran, so none of it survives.
    let snapshot = bot.engine().snapshot().await;
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.remaining_rounds, 5);
    turn.await.unwrap();
}
