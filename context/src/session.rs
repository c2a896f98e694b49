//! Session store: conversation history with a time window and a round budget.
//!
//! Two independent forgetting mechanisms apply:
//!
//! - **Window**: [`SessionStore::prune`] drops messages older than the window on
//!   every turn, whatever the round count.
//! - **Round budget**: [`SessionStore::reset_if_exhausted`] counts turns down from
//!   `history_length`. A turn that starts at zero wipes the *whole* history,
//!   re-seeds the system prompt, and refills the budget.
//!
//! The store never errors and never limits size; sequencing is the engine's job.

use std::time::{Duration, SystemTime};

use relay_types::{Message, NonEmptyString};

/// What [`SessionStore::reset_if_exhausted`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Budget was positive and has been decremented.
    Decremented,
    /// Budget was exhausted; history was cleared, re-seeded, and the budget refilled.
    Reset,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    history: Vec<Message>,
    remaining_rounds: u32,
    history_length: u32,
    window_start: SystemTime,
    system_prompt: Option<NonEmptyString>,
}

impl SessionStore {
    /// A fresh session seeded with the system prompt (if any) stamped at `now`.
    #[must_use]
    pub fn new(
        history_length: u32,
        system_prompt: Option<NonEmptyString>,
        now: SystemTime,
    ) -> Self {
        let mut store = Self {
            history: Vec::new(),
            remaining_rounds: history_length,
            history_length,
            window_start: now,
            system_prompt,
        };
        store.seed(now);
        store
    }

    pub fn append(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Removes every message stamped before `now - window`. Order-preserving.
    ///
    /// A message exactly `window` old is retained.
    pub fn prune(&mut self, now: SystemTime, window: Duration) -> &[Message] {
        // Window larger than the epoch offset: nothing can be old enough to drop.
        if let Some(cutoff) = now.checked_sub(window) {
            let before = self.history.len();
            self.history.retain(|message| message.timestamp() >= cutoff);
            let dropped = before - self.history.len();
            if dropped > 0 {
                tracing::debug!(
                    dropped,
                    retained = self.history.len(),
                    "Pruned expired history"
                );
            }
        }
        &self.history
    }

    /// Decrement the round budget, or hard-reset the session if it is already spent.
    pub fn reset_if_exhausted(&mut self, now: SystemTime) -> RoundOutcome {
        if self.remaining_rounds > 0 {
            self.remaining_rounds -= 1;
            RoundOutcome::Decremented
        } else {
            tracing::info!(
                discarded = self.history.len(),
                history_length = self.history_length,
                "Round budget exhausted, resetting history"
            );
            self.clear(now);
            RoundOutcome::Reset
        }
    }

    /// Unconditional reset: empty history, system prompt re-seeded, full budget.
    pub fn clear(&mut self, now: SystemTime) {
        self.history.clear();
        self.remaining_rounds = self.history_length;
        self.window_start = now;
        self.seed(now);
    }

    fn seed(&mut self, now: SystemTime) {
        if let Some(prompt) = &self.system_prompt {
            self.history.push(Message::system(prompt, now));
        }
    }

    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    #[must_use]
    pub fn remaining_rounds(&self) -> u32 {
        self.remaining_rounds
    }

    #[must_use]
    pub fn history_length(&self) -> u32 {
        self.history_length
    }

    /// Instant of the most recent reset or clear.
    #[must_use]
    pub fn window_start(&self) -> SystemTime {
        self.window_start
    }
}
