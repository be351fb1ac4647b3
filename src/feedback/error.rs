//! Error types for the feedback engine
//!
//! | Variant | Policy |
//! |---------|--------|
//! | `Storage` / `Io` | fatal to the requested operation, surfaced to the caller |
//! | `InvalidFeedback` | the submission is rejected before anything is written |
//! | `MalformedEntry` | a stored row is skipped on read, aggregation continues |
//! | `Synthesis` | non-fatal, prior rules retained, retried on the next append |

use thiserror::Error;

/// Feedback engine error types
#[derive(Debug, Error)]
pub enum FeedbackError {
    /// The SQLite log could not be read or written
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem failure around the database file
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding of a record failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A submission violates the entry invariants
    #[error("Invalid feedback: {0}")]
    InvalidFeedback(String),

    /// A stored record failed to decode
    #[error("Malformed feedback entry {id}: {reason}")]
    MalformedEntry { id: i64, reason: String },

    /// The rule-extraction call errored or returned unusable structure
    #[error("Rule synthesis failed: {0}")]
    Synthesis(String),
}

impl FeedbackError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidFeedback(message.into())
    }

    pub fn synthesis(message: impl Into<String>) -> Self {
        Self::Synthesis(message.into())
    }

    /// Whether the error came from the backing medium
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, FeedbackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_classification() {
        let io = FeedbackError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(io.is_storage());
        assert!(!FeedbackError::synthesis("bad json").is_storage());
    }

    #[test]
    fn test_malformed_message() {
        let err = FeedbackError::MalformedEntry { id: 7, reason: "rating 9".to_string() };
        assert_eq!(err.to_string(), "Malformed feedback entry 7: rating 9");
    }
}
