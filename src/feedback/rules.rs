//! Rule Repository - the latest synthesized rules and reflection counters
//!
//! The whole rule set is held behind a single `Arc` and replaced by one swap,
//! so readers observe either the previous complete set or the new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{normalize_emotion, Dimension};

/// Learned knowledge for one dominant emotion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionProfile {
    pub emotion: String,
    /// Learned default per dimension
    pub defaults: BTreeMap<Dimension, u8>,
    /// What tends to work
    #[serde(default)]
    pub prompt_principles: Vec<String>,
    /// What tends to fail
    #[serde(default)]
    pub anti_patterns: Vec<String>,
    /// Number of entries this profile was derived from
    #[serde(default)]
    pub sample_size: usize,
}

/// Guidance that applies across all emotions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalRules {
    #[serde(default)]
    pub positive: Vec<String>,
    #[serde(default)]
    pub negative: Vec<String>,
}

impl GlobalRules {
    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

/// Process-wide reflection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionState {
    pub reflections_completed: u64,
    /// Entries analyzed by the most recent reflection
    pub entries_analyzed: u64,
    pub entries_since_last_reflection: u64,
}

/// Snapshot of everything the reflection pass produces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnedRules {
    pub state: ReflectionState,
    pub global_rules: GlobalRules,
    /// Profiles keyed by normalized emotion
    pub emotion_profiles: BTreeMap<String, EmotionProfile>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LearnedRules {
    pub fn reflection_count(&self) -> u64 {
        self.state.reflections_completed
    }

    pub fn entries_analyzed(&self) -> u64 {
        self.state.entries_analyzed
    }

    pub fn profile(&self, emotion: &str) -> Option<&EmotionProfile> {
        self.emotion_profiles.get(&normalize_emotion(emotion))
    }

    /// Emotions with a populated profile, sorted
    pub fn emotions_learned(&self) -> Vec<String> {
        self.emotion_profiles.keys().cloned().collect()
    }
}

/// Read-mostly holder of the current rule set
pub struct RuleRepository {
    current: RwLock<Arc<LearnedRules>>,
}

impl RuleRepository {
    pub fn new(initial: LearnedRules) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The complete current rule set
    pub async fn current_rules(&self) -> Arc<LearnedRules> {
        self.current.read().await.clone()
    }

    pub async fn profile_for(&self, emotion: &str) -> Option<EmotionProfile> {
        self.current.read().await.profile(emotion).cloned()
    }

    pub async fn state(&self) -> ReflectionState {
        self.current.read().await.state
    }

    /// Replace the whole rule set with a single swap
    pub(crate) async fn publish(&self, rules: LearnedRules) {
        let mut current = self.current.write().await;
        *current = Arc::new(rules);
        debug!(
            "Published rule set #{} ({} emotion profiles)",
            current.state.reflections_completed,
            current.emotion_profiles.len()
        );
    }

    /// Mirror the persisted pending-entry counter
    pub(crate) async fn record_pending(&self, entries_since_last_reflection: u64) {
        let mut current = self.current.write().await;
        Arc::make_mut(&mut *current).state.entries_since_last_reflection = entries_since_last_reflection;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(emotion: &str) -> EmotionProfile {
        EmotionProfile {
            emotion: emotion.to_string(),
            defaults: BTreeMap::from([(Dimension::Energy, 30)]),
            prompt_principles: vec!["sparse piano".to_string()],
            anti_patterns: vec![],
            sample_size: 3,
        }
    }

    #[tokio::test]
    async fn test_profile_lookup_case_insensitive() {
        let mut rules = LearnedRules::default();
        rules.emotion_profiles.insert("melancholic".to_string(), profile("melancholic"));
        let repo = RuleRepository::new(rules);

        assert!(repo.profile_for("Melancholic").await.is_some());
        assert!(repo.profile_for("joyful").await.is_none());
    }

    #[tokio::test]
    async fn test_readers_keep_old_snapshot_after_publish() {
        let repo = RuleRepository::new(LearnedRules::default());
        let before = repo.current_rules().await;

        let mut next = LearnedRules::default();
        next.state.reflections_completed = 1;
        next.emotion_profiles.insert("calm".to_string(), profile("calm"));
        repo.publish(next).await;

        assert_eq!(before.reflection_count(), 0);
        assert!(before.emotion_profiles.is_empty());
        let after = repo.current_rules().await;
        assert_eq!(after.reflection_count(), 1);
        assert_eq!(after.emotions_learned(), vec!["calm".to_string()]);
    }

    #[tokio::test]
    async fn test_record_pending_leaves_rules_intact() {
        let mut rules = LearnedRules::default();
        rules.global_rules.positive.push("name instruments".to_string());
        let repo = RuleRepository::new(rules);
        let held = repo.current_rules().await;

        repo.record_pending(4).await;

        assert_eq!(held.state.entries_since_last_reflection, 0);
        let now = repo.current_rules().await;
        assert_eq!(now.state.entries_since_last_reflection, 4);
        assert_eq!(now.global_rules.positive, vec!["name instruments".to_string()]);
    }
}
