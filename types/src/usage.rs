//! Token usage accounting types.

use serde::{Deserialize, Serialize};

/// Where a pair of token counts came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenSource {
    /// Counts reported by the upstream `usage` block.
    Reported,
    /// Counts produced by the local word heuristic.
    Estimated,
}

impl TokenSource {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            TokenSource::Reported => "API",
            TokenSource::Estimated => "estimated",
        }
    }
}

/// Token counts for one completion. The provenance always travels with the numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub source: TokenSource,
}

impl TokenUsage {
    #[must_use]
    pub const fn reported(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            source: TokenSource::Reported,
        }
    }

    #[must_use]
    pub const fn estimated(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            source: TokenSource::Estimated,
        }
    }
}

/// Process-wide running totals. Monotonic; only a restart resets them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

impl UsageTotals {
    pub fn record(&mut self, usage: &TokenUsage) {
        self.total_input_tokens = self.total_input_tokens.saturating_add(usage.input);
        self.total_output_tokens = self.total_output_tokens.saturating_add(usage.output);
    }
}
