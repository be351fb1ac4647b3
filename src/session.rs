//! Generation sessions
//!
//! A session holds everything produced for one generation until the listener
//! rates it; rating converts it into a feedback submission.
//!
//! [`SessionRegistry`] is library API for long-running hosts that keep
//! sessions in memory between requests. The CLI is one process per command,
//! so it stores a [`GenerationSession`] as JSON instead (`prompt --out`,
//! `submit --session`).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::feedback::NewFeedback;
use crate::types::{EmotionalProfile, GenerationParams, MoodRecord, PreferredVersion};

/// Identifier of one generation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Everything produced for one generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSession {
    pub moods: Vec<MoodRecord>,
    pub ai_profile: EmotionalProfile,
    pub final_profile: EmotionalProfile,
    pub music_prompt: String,
    #[serde(default)]
    pub gen_params: GenerationParams,
    #[serde(default)]
    pub preferred_version: PreferredVersion,
}

impl GenerationSession {
    /// Feedback submission for this session
    pub fn into_feedback(self, rating: u8, would_replay: bool, user_note: Option<String>) -> NewFeedback {
        NewFeedback {
            rating,
            would_replay,
            ai_profile: self.ai_profile,
            final_profile: self.final_profile,
            music_prompt: self.music_prompt,
            preferred_version: self.preferred_version,
            user_note: user_note.filter(|n| !n.trim().is_empty()),
            gen_params: self.gen_params,
        }
    }
}

/// Sessions awaiting a rating
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, GenerationSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: GenerationSession) -> SessionId {
        let id = SessionId::new();
        self.sessions.write().await.insert(id, session);
        debug!("Opened generation session {}", id);
        id
    }

    pub async fn get(&self, id: SessionId) -> Option<GenerationSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Record which A/B variant the listener preferred
    pub async fn set_preferred_version(&self, id: SessionId, preferred: PreferredVersion) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id)
            .ok_or_else(|| anyhow!("Session '{}' not found", id))?;
        session.preferred_version = preferred;
        Ok(())
    }

    /// Close the session and turn it into a feedback submission
    pub async fn rate(
        &self,
        id: SessionId,
        rating: u8,
        would_replay: bool,
        user_note: Option<String>,
    ) -> Result<NewFeedback> {
        let session = self.sessions.write().await
            .remove(&id)
            .ok_or_else(|| anyhow!("Session '{}' not found", id))?;
        Ok(session.into_feedback(rating, would_replay, user_note))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dimension;

    fn session() -> GenerationSession {
        let ai_profile = EmotionalProfile::neutral("nostalgic");
        let mut final_profile = ai_profile.clone();
        final_profile.warmth = 20;
        final_profile.overrides = vec![Dimension::Warmth];
        GenerationSession {
            moods: vec![MoodRecord {
                mood: "nostalgic".to_string(),
                moods: vec!["nostalgic".to_string()],
                energy: 0.4,
                source: "text".to_string(),
            }],
            ai_profile,
            final_profile,
            music_prompt: "Dusty vinyl piano".to_string(),
            gen_params: GenerationParams::default(),
            preferred_version: PreferredVersion::NotApplicable,
        }
    }

    #[test]
    fn test_into_feedback_copies_session() {
        let feedback = session().into_feedback(4, true, Some("  ".to_string()));
        assert_eq!(feedback.rating, 4);
        assert!(feedback.would_replay);
        assert_eq!(feedback.final_profile.overrides, vec![Dimension::Warmth]);
        assert_eq!(feedback.music_prompt, "Dusty vinyl piano");
        assert_eq!(feedback.user_note, None);
        assert!(feedback.validate().is_ok());
    }

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[tokio::test]
    async fn test_registry_rate_removes_session() {
        let registry = SessionRegistry::new();
        let id = registry.insert(session()).await;
        registry.set_preferred_version(id, PreferredVersion::B).await.unwrap();

        let feedback = registry.rate(id, 5, false, Some("More reverb".to_string())).await.unwrap();
        assert_eq!(feedback.preferred_version, PreferredVersion::B);
        assert_eq!(feedback.user_note.as_deref(), Some("More reverb"));
        assert!(registry.is_empty().await);
        assert!(registry.rate(id, 5, false, None).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let registry = SessionRegistry::new();
        assert!(registry.get(SessionId::new()).await.is_none());
        assert!(registry
            .set_preferred_version(SessionId::new(), PreferredVersion::A)
            .await
            .is_err());
    }
}
