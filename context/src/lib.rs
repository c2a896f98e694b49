//! Conversation window management.
//!
//! This crate provides:
//! - A wall-clock abstraction so window arithmetic is testable
//! - A heuristic token estimator for upstreams that do not report usage
//! - The session store: history, round budget, and time-window pruning
//!
//! # Architecture
//!
//! ```text
//! SessionStore
//! ├── history: Vec<Message> (pruned by age, hard-reset by round budget)
//! ├── remaining_rounds: u32 (counts down once per turn)
//! └── system_prompt: Option<NonEmptyString> (re-seeded on every reset)
//!
//! TokenEstimator (stateless)
//! └── estimate(EstimateInput) -> u64
//! ```

mod clock;
mod session;
mod token_counter;

pub use clock::{Clock, ManualClock, SystemClock};
pub use session::{RoundOutcome, SessionStore};
pub use token_counter::{EstimateInput, TokenEstimator};
