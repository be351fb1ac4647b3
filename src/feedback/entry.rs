//! Feedback entries - one immutable record per rating event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{FeedbackError, Result};
use crate::types::{normalize_emotion, EmotionalProfile, GenerationParams, PreferredVersion};

/// Lowest accepted rating
pub const MIN_RATING: u8 = 1;
/// Highest accepted rating
pub const MAX_RATING: u8 = 5;

/// A feedback submission that has not been stored yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFeedback {
    /// How well the music matched the feeling, 1-5
    pub rating: u8,
    /// Would the listener play it again
    pub would_replay: bool,
    /// Profile estimated by the AI before any manual override
    pub ai_profile: EmotionalProfile,
    /// Profile actually used for generation
    pub final_profile: EmotionalProfile,
    /// Text prompt handed to the audio backend
    pub music_prompt: String,
    #[serde(default)]
    pub preferred_version: PreferredVersion,
    #[serde(default)]
    pub user_note: Option<String>,
    #[serde(default)]
    pub gen_params: GenerationParams,
}

impl NewFeedback {
    /// Reject submissions that would break the stored-entry invariants
    pub fn validate(&self) -> Result<()> {
        check_rating(self.rating).map_err(FeedbackError::invalid)?;
        self.ai_profile
            .check_ranges()
            .map_err(|e| FeedbackError::invalid(format!("ai_profile: {}", e)))?;
        self.final_profile
            .check_ranges()
            .map_err(|e| FeedbackError::invalid(format!("final_profile: {}", e)))?;
        Ok(())
    }
}

/// A stored feedback entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    /// Monotonically increasing identifier
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub rating: u8,
    pub would_replay: bool,
    pub ai_profile: EmotionalProfile,
    pub final_profile: EmotionalProfile,
    pub music_prompt: String,
    pub preferred_version: PreferredVersion,
    pub user_note: Option<String>,
    pub gen_params: GenerationParams,
}

impl FeedbackEntry {
    /// Dominant emotion from the AI-estimated profile, normalized
    pub fn emotion_key(&self) -> String {
        normalize_emotion(&self.ai_profile.emotion)
    }

    /// Whether this entry belongs to the given emotion (case-insensitive exact match)
    pub fn matches_emotion(&self, emotion: &str) -> bool {
        self.emotion_key() == normalize_emotion(emotion)
    }
}

pub(crate) fn check_rating(rating: u8) -> std::result::Result<(), String> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(format!("rating {} is outside [{}, {}]", rating, MIN_RATING, MAX_RATING))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Submission for `emotion` with the given rating and prompt
    pub fn feedback(emotion: &str, rating: u8, prompt: &str) -> NewFeedback {
        let profile = EmotionalProfile::neutral(emotion);
        NewFeedback {
            rating,
            would_replay: rating >= 4,
            ai_profile: profile.clone(),
            final_profile: profile,
            music_prompt: prompt.to_string(),
            preferred_version: PreferredVersion::NotApplicable,
            user_note: None,
            gen_params: GenerationParams::default(),
        }
    }

    /// Stored entry built from `feedback`, for pure-function tests
    pub fn entry(id: i64, emotion: &str, rating: u8, prompt: &str) -> FeedbackEntry {
        let f = feedback(emotion, rating, prompt);
        FeedbackEntry {
            id,
            created_at: Utc::now(),
            rating: f.rating,
            would_replay: f.would_replay,
            ai_profile: f.ai_profile,
            final_profile: f.final_profile,
            music_prompt: f.music_prompt,
            preferred_version: f.preferred_version,
            user_note: f.user_note,
            gen_params: f.gen_params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_validate_rating_bounds() {
        assert!(feedback("calm", 1, "p").validate().is_ok());
        assert!(feedback("calm", 5, "p").validate().is_ok());
        assert!(matches!(
            feedback("calm", 0, "p").validate(),
            Err(FeedbackError::InvalidFeedback(_))
        ));
        assert!(feedback("calm", 6, "p").validate().is_err());
    }

    #[test]
    fn test_validate_dimension_bounds() {
        let mut f = feedback("calm", 3, "p");
        f.final_profile.warmth = 140;
        let err = f.validate().unwrap_err();
        assert!(err.to_string().contains("final_profile"));
    }

    #[test]
    fn test_matches_emotion_case_insensitive() {
        let e = entry(1, "Melancholic", 4, "p");
        assert!(e.matches_emotion("melancholic"));
        assert!(e.matches_emotion("MELANCHOLIC"));
        assert!(!e.matches_emotion(" melancholic "));
        assert!(!e.matches_emotion("melancholy"));
    }

    #[test]
    fn test_new_feedback_defaults_from_json() {
        let json = serde_json::json!({
            "rating": 4,
            "would_replay": true,
            "ai_profile": {"emotion": "calm", "energy": 20, "style": 30, "warmth": 40, "arc": 10},
            "final_profile": {"emotion": "calm", "energy": 20, "style": 30, "warmth": 40, "arc": 10},
            "music_prompt": "soft piano"
        });
        let f: NewFeedback = serde_json::from_value(json).unwrap();
        assert_eq!(f.preferred_version, PreferredVersion::NotApplicable);
        assert_eq!(f.gen_params.max_new_tokens, 250);
        assert!(f.user_note.is_none());
    }
}
