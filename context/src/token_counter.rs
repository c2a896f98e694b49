//! Heuristic token estimation.
//!
//! Used only when the upstream omits its `usage` block. The rule is deliberately
//! crude: split on whitespace and charge `ceil(bytes / 4)` tokens per word.
//! Callers must label the result as estimated (see `TokenSource`).

use relay_types::Message;

const BYTES_PER_TOKEN: usize = 4;

/// What to estimate.
#[derive(Debug, Clone, Copy)]
pub enum EstimateInput<'a> {
    Text(&'a str),
    /// Contents are joined with a trailing space each, roles are not counted.
    Messages(&'a [Message]),
}

/// Stateless word-based token estimator.
///
/// ```
/// use relay_context::{EstimateInput, TokenEstimator};
///
/// assert_eq!(TokenEstimator.estimate(EstimateInput::Text("abcd efgh")), 2);
/// assert_eq!(TokenEstimator.estimate(EstimateInput::Text("abcdefgh")), 2);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    #[must_use]
    pub fn estimate(&self, input: EstimateInput<'_>) -> u64 {
        match input {
            EstimateInput::Text(text) => count_words(text),
            EstimateInput::Messages(messages) => {
                let mut joined = String::new();
                for message in messages {
                    joined.push_str(message.content());
                    joined.push(' ');
                }
                count_words(&joined)
            }
        }
    }

    #[must_use]
    pub fn estimate_text(&self, text: &str) -> u64 {
        self.estimate(EstimateInput::Text(text))
    }

    #[must_use]
    pub fn estimate_messages(&self, messages: &[Message]) -> u64 {
        self.estimate(EstimateInput::Messages(messages))
    }
}

fn count_words(text: &str) -> u64 {
    text.split_whitespace()
        .map(|word| word.len().div_ceil(BYTES_PER_TOKEN) as u64)
        .sum()
}
