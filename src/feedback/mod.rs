//! Feedback & Rule-Learning Engine
//!
//! Records listener ratings in an append-only log, serves summary stats,
//! few-shot examples and learned defaults from it, and periodically reflects
//! over the log to synthesize global and per-emotion rules.

pub mod error;
pub mod entry;
pub mod store;
pub mod stats;
pub mod retriever;
pub mod defaults;
pub mod rules;
pub mod reflection;
pub mod engine;

pub use error::{FeedbackError, Result};
pub use entry::{FeedbackEntry, NewFeedback, MAX_RATING, MIN_RATING};
pub use store::{AppendReceipt, FeedbackStore};
pub use stats::FeedbackSummary;
pub use retriever::{DEFAULT_EXAMPLE_COUNT, LOW_RATING_THRESHOLD};
pub use defaults::LearnedDefaults;
pub use rules::{EmotionProfile, GlobalRules, LearnedRules, ReflectionState, RuleRepository};
pub use reflection::{ReflectionOutcome, ReflectionPhase, ReflectionScheduler, RuleSynthesizer};
pub use engine::{FeedbackEngine, SubmitOutcome};
