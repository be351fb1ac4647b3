//! music2myears - Feedback & Rule-Learning Library
//!
//! Personalizes generated music over time:
//! - Append-only feedback log with summary stats and few-shot retrieval
//! - Periodic reflection that synthesizes global and per-emotion rules
//! - Learned slider defaults blended into new emotion estimates
//! - Prompt construction that injects what has been learned
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use music2myears::{Config, FeedbackEngine, OpenRouterClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let client = Arc::new(OpenRouterClient::from_keyring(&config.reflection.model)?);
//!     let engine = FeedbackEngine::open(
//!         config.storage.resolve_database_path()?,
//!         &config.reflection,
//!         client,
//!     ).await?;
//!     println!("{:?}", engine.summarize().await?);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod config;
pub mod secrets;
pub mod llm;
pub mod feedback;
pub mod fusion;
pub mod prompt;
pub mod session;
pub mod cli;

pub use config::Config;

pub use llm::{OpenRouterClient, TextGenerator};

pub use feedback::{
    FeedbackEngine,
    FeedbackEntry,
    FeedbackError,
    FeedbackSummary,
    LearnedRules,
    NewFeedback,
    ReflectionOutcome,
    SubmitOutcome,
};

pub use fusion::ProfileFusion;

pub use session::{GenerationSession, SessionId, SessionRegistry};

pub use types::{Dimension, EmotionalProfile, MoodRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Feedback & Rule-Learning Library", NAME, VERSION)
}
