//! Configuration file drives a working engine.

use std::io::Write;
use std::sync::Arc;

use relay_config::{ConfigError, RelayConfig};
use relay_context::ManualClock;
use relay_engine::{SessionEngine, SessionSettings};
use relay_providers::{ClientConfig, OpenAiClient, RetryPolicy};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::bodies;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn engine_built_from_config_file_talks_to_configured_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-from-file"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "configured"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = write_config(&format!(
        r#"
[telegram]
token = "1:abc"
allowed_users = [7]

[openai]
api_key = "sk-from-file"
api_url = "{}/"

[session]
default_model = "local-model"
system_prompt = "Be brief."
history_length = 4
history_timeout_minutes = 15

[retry]
max_attempts = 1
delay_secs = 0
"#,
        server.uri()
    ));
    let config = RelayConfig::load_from(file.path()).unwrap();

    let client = OpenAiClient::new(
        ClientConfig::new(config.openai.api_url.clone(), config.api_key())
            .with_request_timeout(config.request_timeout()),
    )
    .unwrap();
    let engine = SessionEngine::new(
        Arc::new(client),
        Arc::new(ManualClock::default()),
        RetryPolicy::new(config.retry.max_attempts, config.retry_delay()),
        SessionSettings {
            history_length: config.session.history_length,
            window: config.window(),
            system_prompt: config.system_prompt(),
            model: config.default_model().unwrap_or_default().to_string(),
        },
    );

    let report = engine.handle_turn("status?").await;
    assert_eq!(report.outcome.unwrap().reply, "configured");
    assert_eq!(report.remaining_rounds, 3);

    let sent = bodies(&server, "/chat/completions").await;
    assert_eq!(sent[0]["model"], "local-model");
    assert_eq!(sent[0]["messages"][0]["content"], "Be brief.");
    assert_eq!(engine.window().as_secs(), 15 * 60);
}

#[test]
fn invalid_config_file_reports_reason() {
    let file = write_config(
        r#"
[telegram]
token = "1:abc"

[openai]
api_key = "sk"

[retry]
max_attempts = 0
"#,
    );

    let err = RelayConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(ref reason) if reason.contains("max_attempts")));
}
