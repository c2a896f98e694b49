//! Per-turn result records.

use std::time::{Duration, SystemTime};

use relay_context::RoundOutcome;
use relay_providers::{ChatCompletion, RetryExhausted};
use relay_types::{Message, TokenUsage, UsageTotals};
use uuid::Uuid;

/// Where a turn is in its processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Pruning,
    RoundCheck,
    Calling,
    Accounting,
    Done,
}

impl TurnPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Pruning => "pruning",
            TurnPhase::RoundCheck => "round_check",
            TurnPhase::Calling => "calling",
            TurnPhase::Accounting => "accounting",
            TurnPhase::Done => "done",
        }
    }
}

/// Reply text plus its token accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub reply: String,
    pub usage: TokenUsage,
}

impl From<ChatCompletion> for CompletionOutcome {
    fn from(completion: ChatCompletion) -> Self {
        Self {
            reply: completion.reply,
            usage: completion.usage,
        }
    }
}

/// Everything the transport needs to render one turn.
#[derive(Debug)]
pub struct TurnReport {
    pub turn_id: Uuid,
    pub outcome: Result<CompletionOutcome, RetryExhausted>,
    /// Model the request was sent to.
    pub model: String,
    /// Wall time of the turn, lock wait and retries included.
    pub elapsed: Duration,
    pub round: RoundOutcome,
    pub remaining_rounds: u32,
    /// Time left before the interaction window rolls over.
    pub remaining_window: Duration,
    /// Process-wide totals after this turn.
    pub totals: UsageTotals,
}

impl TurnReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Tokens this turn contributed; zero on failure.
    #[must_use]
    pub fn usage(&self) -> Option<&TokenUsage> {
        self.outcome.as_ref().ok().map(|outcome| &outcome.usage)
    }
}

/// Point-in-time copy of the session, for info cards and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub history: Vec<Message>,
    pub remaining_rounds: u32,
    pub window_start: SystemTime,
    pub interaction_anchor: SystemTime,
    pub totals: UsageTotals,
    pub model: String,
}
