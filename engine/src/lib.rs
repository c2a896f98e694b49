//! Session engine: the single writer of conversation state.
//!
//! One [`SessionEngine`] exists per process. Each call to
//! [`SessionEngine::handle_turn`] walks the phases
//!
//! ```text
//! Idle -> Pruning -> RoundCheck -> Calling -> Accounting -> Done
//! ```
//!
//! while holding the state mutex, so concurrent turns are serialized and no turn
//! observes another's half-applied history. The current model sits outside that
//! mutex; selecting a model never waits for an in-flight completion.
//!
//! Failures never roll back: a turn whose completion is exhausted has already
//! consumed its round and keeps the user message in history.

mod report;


use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use relay_context::{Clock, SessionStore};
use relay_providers::{ChatBackend, CompletionRequest, RetryPolicy};
use relay_types::{Message, ModelInfo, NonEmptyString, UsageTotals};
use tokio::sync::Mutex;
use uuid::Uuid;

pub use report::{CompletionOutcome, SessionSnapshot, TurnPhase, TurnReport};

/// Static session parameters.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Turns before a hard history reset.
    pub history_length: u32,
    /// Messages older than this are dropped before every turn.
    pub window: Duration,
    pub system_prompt: Option<NonEmptyString>,
    /// Initial model id. May be empty if none could be resolved.
    pub model: String,
}

struct EngineState {
    store: SessionStore,
    totals: UsageTotals,
    /// Reference point for the remaining-window countdown.
    interaction: SystemTime,
}

pub struct SessionEngine {
    backend: Arc<dyn ChatBackend>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    window: Duration,
    history_length: u32,
    started_at: SystemTime,
    state: Mutex<EngineState>,
    model: RwLock<String>,
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("retry", &self.retry)
            .field("window", &self.window)
            .field("history_length", &self.history_length)
            .field("model", &self.current_model())
            .finish_non_exhaustive()
    }
}

impl SessionEngine {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        settings: SessionSettings,
    ) -> Self {
        let now = clock.now();
        let store = SessionStore::new(settings.history_length, settings.system_prompt, now);
        Self {
            backend,
            clock,
            retry,
            window: settings.window,
            history_length: settings.history_length,
            started_at: now,
            state: Mutex::new(EngineState {
                store,
                totals: UsageTotals::default(),
                interaction: now,
            }),
            model: RwLock::new(settings.model),
        }
    }

    /// Process one user message end to end.
    ///
    /// Never fails: an exhausted completion is reported in
    /// [`TurnReport::outcome`].
    pub async fn handle_turn(&self, text: impl Into<String>) -> TurnReport {
        let turn_id = Uuid::new_v4();
        let text = text.into();
        let started = self.clock.now();
        trace_phase(turn_id, TurnPhase::Idle);

        let mut state = self.state.lock().await;
        let model = self.current_model();

        trace_phase(turn_id, TurnPhase::Pruning);
        let now = self.clock.now();
        state.store.prune(now, self.window);

        trace_phase(turn_id, TurnPhase::RoundCheck);
        let round = state.store.reset_if_exhausted(now);
        state.store.append(Message::user(text, now));

        trace_phase(turn_id, TurnPhase::Calling);
        let history = state.store.history();
        tracing::info!(
            %turn_id,
            model = %model,
            messages = history.len(),
            remaining_rounds = state.store.remaining_rounds(),
            ?round,
            "Sending turn"
        );
        let backend = &self.backend;
        let result = self
            .retry
            .run(|attempt| {
                tracing::debug!(%turn_id, attempt, "Completion attempt");
                backend.complete(CompletionRequest {
                    model: &model,
                    messages: history,
                })
            })
            .await;

        trace_phase(turn_id, TurnPhase::Accounting);
        let finished = self.clock.now();
        let outcome = match result {
            Ok(completion) => {
                state
                    .store
                    .append(Message::assistant(completion.reply.clone(), finished));
                state.totals.record(&completion.usage);
                Ok(CompletionOutcome::from(completion))
            }
            Err(exhausted) => Err(exhausted),
        };

        if since(finished, state.interaction) >= self.window {
            state.interaction = finished;
        }
        let remaining_window = self
            .window
            .saturating_sub(since(finished, state.interaction));

        let report = TurnReport {
            turn_id,
            outcome,
            model,
            elapsed: since(finished, started),
            round,
            remaining_rounds: state.store.remaining_rounds(),
            remaining_window,
            totals: state.totals,
        };
        drop(state);

        trace_phase(turn_id, TurnPhase::Done);
        match &report.outcome {
            Ok(outcome) => tracing::info!(
                %turn_id,
                elapsed_ms = report.elapsed.as_millis(),
                input_tokens = outcome.usage.input,
                output_tokens = outcome.usage.output,
                source = outcome.usage.source.label(),
                "Turn completed"
            ),
            Err(exhausted) => tracing::warn!(
                %turn_id,
                elapsed_ms = report.elapsed.as_millis(),
                attempts = exhausted.attempts,
                error = %exhausted,
                "Turn failed"
            ),
        }
        report
    }

    /// Drop all history, refill the round budget and restart the window.
    /// Token totals are kept.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        state.store.clear(now);
        state.interaction = now;
        tracing::info!("Session cleared");
    }

    #[must_use]
    pub fn current_model(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switch the model used by subsequent turns. Returns the previous model.
    pub fn select_model(&self, model: impl Into<String>) -> String {
        let model = model.into();
        let mut current = self.model.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(from = %current, to = %model, "Model selected");
        std::mem::replace(&mut *current, model)
    }

    /// Upstream model listing. Failures are logged and yield an empty list.
    pub async fn list_models(&self) -> Vec<ModelInfo> {
        match self.backend.list_models().await {
            Ok(models) => {
                tracing::debug!(count = models.len(), "Fetched model list");
                models
            }
            Err(error) => {
                tracing::warn!(kind = ?error.kind(), error = %error, "Failed to fetch model list");
                Vec::new()
            }
        }
    }

    /// Fill an empty model with the first entry of the upstream listing.
    ///
    /// Returns the model in effect afterwards; `None` if it is still empty.
    pub async fn resolve_default_model(&self) -> Option<String> {
        let current = self.current_model();
        if !current.is_empty() {
            return Some(current);
        }
        let Some(first) = self.list_models().await.into_iter().next() else {
            tracing::warn!("No default model configured and none listed upstream");
            return None;
        };
        self.select_model(first.id.clone());
        Some(first.id)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            history: state.store.history().to_vec(),
            remaining_rounds: state.store.remaining_rounds(),
            window_start: state.store.window_start(),
            interaction_anchor: state.interaction,
            totals: state.totals,
            model: self.current_model(),
        }
    }

    #[must_use]
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn history_length(&self) -> u32 {
        self.history_length
    }
}

fn since(later: SystemTime, earlier: SystemTime) -> Duration {
    later.duration_since(earlier).unwrap_or(Duration::ZERO)
}

fn trace_phase(turn_id: Uuid, phase: TurnPhase) {
    tracing::trace!(%turn_id, phase = phase.as_str(), "Turn phase");
}
