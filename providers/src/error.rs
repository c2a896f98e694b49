//! Completion error taxonomy.

use thiserror::Error;

/// Coarse classification shared by every failure the engine can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or connection failure; no HTTP response was read.
    Transport,
    /// The API answered with a non-2xx status or a structured error envelope.
    UpstreamRejected,
    /// 2xx status but no usable completion in the body.
    EmptyResponse,
    /// Every retry attempt failed.
    Exhausted,
}

/// Failure of a single completion (or model listing) request.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request failed: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    #[error(
        "API error ({status}): {} - {message}",
        .kind.as_deref().unwrap_or("unknown")
    )]
    UpstreamRejected {
        status: u16,
        code: Option<String>,
        kind: Option<String>,
        message: String,
    },

    #[error("no usable completion: {reason}")]
    EmptyResponse { reason: String },
}

impl CompletionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompletionError::Transport { .. } => ErrorKind::Transport,
            CompletionError::UpstreamRejected { .. } => ErrorKind::UpstreamRejected,
            CompletionError::EmptyResponse { .. } => ErrorKind::EmptyResponse,
        }
    }

    pub(crate) fn empty(reason: impl Into<String>) -> Self {
        CompletionError::EmptyResponse {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(source: reqwest::Error) -> Self {
        CompletionError::Transport { source }
    }
}

/// Terminal failure of a retried call. Wraps the last attempt's error.
#[derive(Debug, Error)]
#[error("all {attempts} attempts failed; last error: {last}")]
pub struct RetryExhausted {
    pub attempts: u32,
    #[source]
    pub last: CompletionError,
}

impl RetryExhausted {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Exhausted
    }
}
