//! OpenAI-compatible `/chat/completions` and `/models` client.

use std::time::Duration;

use relay_context::TokenEstimator;
use relay_types::{ApiKey, Message, ModelInfo, TokenUsage};

use crate::wire::{ChatRequest, ChatResponse, ErrorEnvelope, ModelList};
use crate::{
    ChatBackend, ChatCompletion, CompletionError, CompletionFut, CompletionRequest,
    http_client_with_timeout, read_capped_error_body,
};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL without the `/chat/completions` suffix, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: ApiKey,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
    estimator: TokenEstimator,
}

impl OpenAiClient {
    pub fn new(config: ClientConfig) -> Result<Self, CompletionError> {
        let http = http_client_with_timeout(config.request_timeout)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            estimator: TokenEstimator,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// One completion round-trip. No retries, no history mutation.
    pub async fn send_chat(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<ChatCompletion, CompletionError> {
        let url = self.endpoint("chat/completions");
        tracing::debug!(%url, model, messages = messages.len(), "Sending completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&ChatRequest::new(model, messages))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = read_capped_error_body(response).await;
            return Err(rejection(status.as_u16(), &body));
        }

        let body = response.text().await?;
        parse_completion(status.as_u16(), &body, messages, &self.estimator)
    }

    pub async fn fetch_models(&self) -> Result<Vec<ModelInfo>, CompletionError> {
        let response = self
            .http
            .get(self.endpoint("models"))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = read_capped_error_body(response).await;
            return Err(rejection(status.as_u16(), &body));
        }

        let body = response.text().await?;
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
            return Err(from_envelope(status.as_u16(), envelope));
        }
        let list: ModelList = serde_json::from_str(&body)
            .map_err(|e| CompletionError::empty(format!("malformed model list: {e}")))?;
        Ok(list.data)
    }
}

impl ChatBackend for OpenAiClient {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFut<'a, ChatCompletion> {
        Box::pin(self.send_chat(request.model, request.messages))
    }

    fn list_models(&self) -> CompletionFut<'_, Vec<ModelInfo>> {
        Box::pin(self.fetch_models())
    }
}

/// Classify a completion body that arrived with a 2xx status.
///
/// An error envelope wins even on success statuses; some gateways answer `200`
/// with `{"error": ...}`.
pub(crate) fn parse_completion(
    status: u16,
    body: &str,
    sent: &[Message],
    estimator: &TokenEstimator,
) -> Result<ChatCompletion, CompletionError> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return Err(from_envelope(status, envelope));
    }

    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::empty(format!("malformed response body: {e}")))?;

    let Some(choice) = parsed.choices.into_iter().next() else {
        return Err(CompletionError::empty("response contained no choices"));
    };
    let Some(reply) = choice.message.content else {
        return Err(CompletionError::empty("first choice has no message content"));
    };

    let usage = match parsed.usage {
        Some(usage) if usage.prompt_tokens > 0 && usage.completion_tokens > 0 => {
            TokenUsage::reported(usage.prompt_tokens, usage.completion_tokens)
        }
        _ => TokenUsage::estimated(
            estimator.estimate_messages(sent),
            estimator.estimate_text(&reply),
        ),
    };

    Ok(ChatCompletion { reply, usage })
}

/// Build the rejection for a non-2xx response body.
fn rejection(status: u16, body: &str) -> CompletionError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => from_envelope(status, envelope),
        Err(_) => CompletionError::UpstreamRejected {
            status,
            code: None,
            kind: None,
            message: body.to_string(),
        },
    }
}

fn from_envelope(status: u16, envelope: ErrorEnvelope) -> CompletionError {
    let code = envelope.error.code_string();
    let ErrorEnvelope { error } = envelope;
    CompletionError::UpstreamRejected {
        status,
        code,
        kind: error.kind,
        message: error.message.unwrap_or_default(),
    }
}
