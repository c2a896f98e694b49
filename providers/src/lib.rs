//! Chat-completion client for OpenAI-compatible endpoints.
//!
//! # Architecture
//!
//! - [`ChatBackend`] - object-safe seam the engine drives; the real
//!   implementation is [`OpenAiClient`], tests substitute scripted backends
//! - [`retry`] - fixed-backoff [`RetryPolicy`] wrapped around any backend call
//! - `wire` - serde shapes of the `/chat/completions` and `/models` bodies
//!
//! # Error Handling
//!
//! A single call fails with a [`CompletionError`] classified as
//! [`ErrorKind::Transport`], [`ErrorKind::UpstreamRejected`] or
//! [`ErrorKind::EmptyResponse`]. Only [`RetryExhausted`] leaves a retried call.
//!
//! The client never touches conversation history. It returns the reply and its
//! token accounting; appending the assistant message is the caller's job.

pub mod retry;

mod error;
mod openai;
mod wire;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use relay_types::{Message, ModelInfo, TokenUsage};

pub use error::{CompletionError, ErrorKind, RetryExhausted};
pub use openai::{ClientConfig, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT, OpenAiClient};
pub use retry::RetryPolicy;

const CONNECT_TIMEOUT_SECS: u64 = 30;

// reqwest only exposes tcp_keepalive (idle time); interval/retries use platform defaults.
const TCP_KEEPALIVE_SECS: u64 = 60;

const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Boxed future returned by [`ChatBackend`] methods.
pub type CompletionFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, CompletionError>> + Send + 'a>>;

/// One completion request: the model id and the exact history to send.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    pub reply: String,
    pub usage: TokenUsage,
}

/// Anything that can answer a chat-completion request and list models.
pub trait ChatBackend: Send + Sync {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFut<'a, ChatCompletion>;

    fn list_models(&self) -> CompletionFut<'_, Vec<ModelInfo>>;
}

impl<B: ChatBackend + ?Sized> ChatBackend for std::sync::Arc<B> {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFut<'a, ChatCompletion> {
        (**self).complete(request)
    }

    fn list_models(&self) -> CompletionFut<'_, Vec<ModelInfo>> {
        (**self).list_models()
    }
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

/// HTTP client with an overall per-request timeout.
pub fn http_client_with_timeout(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    base_client_builder().timeout(timeout).build()
}

/// Read at most [`MAX_ERROR_BODY_BYTES`] of a response body as lossy UTF-8.
///
/// A read failure mid-body ends the read; whatever arrived is returned.
pub async fn read_capped_error_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    while let Ok(Some(chunk)) = response.chunk().await {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
