//! Feedback engine - the single stateful entry point
//!
//! Submissions are serialized by one gate that covers the append, the
//! pending counter and, when the interval is crossed, the inline reflection.
//! Reads go straight to the store and the rule repository. Other processes
//! may append to the same database; their reflections are picked up on the
//! next submission.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::defaults::{learned_defaults, LearnedDefaults};
use super::entry::NewFeedback;
use super::error::Result;
use super::reflection::{ReflectionOutcome, ReflectionPhase, ReflectionScheduler, RuleSynthesizer};
use super::retriever;
use super::rules::{EmotionProfile, LearnedRules, ReflectionState, RuleRepository};
use super::stats::{self, FeedbackSummary};
use super::store::FeedbackStore;
use crate::config::ReflectionConfig;
use crate::llm::TextGenerator;

/// Result of a recorded submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Identifier of the stored entry
    pub id: i64,
    pub reflection: ReflectionOutcome,
}

/// Feedback store, reflection and rule repository behind one API
pub struct FeedbackEngine {
    store: FeedbackStore,
    rules: RuleRepository,
    scheduler: ReflectionScheduler,
    synthesizer: RuleSynthesizer,
    submit_gate: Mutex<()>,
}

impl FeedbackEngine {
    /// Open the engine on the database at `path`
    pub async fn open<P: AsRef<Path>>(
        path: P,
        config: &ReflectionConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self> {
        let store = FeedbackStore::open(path).await?;
        let initial = store.load_rules().await?;
        info!(
            "Feedback engine ready: {} reflections, {} emotion profiles, {} pending",
            initial.state.reflections_completed,
            initial.emotion_profiles.len(),
            initial.state.entries_since_last_reflection
        );

        Ok(Self {
            store,
            rules: RuleRepository::new(initial),
            scheduler: ReflectionScheduler::new(config.interval),
            synthesizer: RuleSynthesizer::new(generator, config.min_samples_per_emotion),
            submit_gate: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &FeedbackStore {
        &self.store
    }

    pub fn reflection_interval(&self) -> u64 {
        self.scheduler.interval()
    }

    /// Record feedback and reflect inline when the interval is reached
    ///
    /// A storage failure is returned as an error and nothing is recorded.
    /// A reflection failure is reported in the outcome; the entry stays recorded.
    pub async fn submit(&self, feedback: NewFeedback) -> Result<SubmitOutcome> {
        let _gate = self.submit_gate.lock().await;

        let receipt = self.store.append(&feedback).await?;
        self.follow_store(&receipt.state).await;
        info!(
            "Recorded feedback #{} (rating {}, emotion '{}')",
            receipt.id, feedback.rating, feedback.ai_profile.emotion
        );

        let reflection = match self.scheduler.phase(&receipt.state) {
            ReflectionPhase::Idle { remaining } => ReflectionOutcome::NotDue { remaining },
            ReflectionPhase::Triggered => self.reflect_locked().await,
        };

        Ok(SubmitOutcome { id: receipt.id, reflection })
    }

    /// Mirror the counters just read from disk, reloading rules another process committed
    async fn follow_store(&self, state: &ReflectionState) {
        if self.rules.state().await.reflections_completed != state.reflections_completed {
            match self.store.load_rules().await {
                Ok(rules) => {
                    debug!("Reloading rules committed elsewhere (reflection #{})", rules.state.reflections_completed);
                    self.rules.publish(rules).await;
                    return;
                }
                Err(e) => warn!("Could not reload rules from disk: {}", e),
            }
        }
        self.rules.record_pending(state.entries_since_last_reflection).await;
    }

    /// Run a reflection now, regardless of the pending counter
    pub async fn reflect_now(&self) -> ReflectionOutcome {
        let _gate = self.submit_gate.lock().await;
        self.reflect_locked().await
    }

    /// Caller must hold `submit_gate`
    async fn reflect_locked(&self) -> ReflectionOutcome {
        match self.try_reflect().await {
            Ok(rules) => {
                let outcome = ReflectionOutcome::Completed {
                    reflections_completed: rules.state.reflections_completed,
                    entries_analyzed: rules.state.entries_analyzed,
                    emotions_learned: rules.emotions_learned(),
                };
                info!(
                    "Reflection #{} complete: {} entries analyzed, {} emotion profiles",
                    rules.state.reflections_completed,
                    rules.state.entries_analyzed,
                    rules.emotion_profiles.len()
                );
                self.rules.publish(rules).await;
                outcome
            }
            Err(e) => {
                warn!("Reflection failed, keeping previous rules: {}", e);
                ReflectionOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    async fn try_reflect(&self) -> Result<LearnedRules> {
        let snapshot = self.store.snapshot().await?;
        let previous = self.rules.current_rules().await;
        let mut rules = self.synthesizer.synthesize(&snapshot.entries, &previous).await?;
        rules.state = self
            .store
            .commit_reflection(&rules, snapshot.state.entries_since_last_reflection)
            .await?;
        Ok(rules)
    }

    /// Summary statistics over the full log
    pub async fn summarize(&self) -> Result<FeedbackSummary> {
        let entries = self.store.read_all().await?;
        let rules = self.rules.current_rules().await;
        Ok(stats::summarize(&entries, &rules, self.scheduler.interval()))
    }

    /// Prompts of the best-rated entries for `emotion`
    pub async fn top_examples(&self, emotion: &str, k: usize) -> Result<Vec<String>> {
        let entries = self.store.read_all().await?;
        Ok(retriever::top_examples(&entries, emotion, k))
    }

    /// Prompts of the worst-rated entries for `emotion`
    pub async fn bottom_examples(&self, emotion: &str, k: usize) -> Result<Vec<String>> {
        let entries = self.store.read_all().await?;
        Ok(retriever::bottom_examples(&entries, emotion, k))
    }

    /// Learned dimension values for `emotion`, empty without history
    pub async fn blended_defaults(&self, emotion: &str) -> LearnedDefaults {
        let rules = self.rules.current_rules().await;
        learned_defaults(&rules, emotion)
    }

    pub async fn current_rules(&self) -> Arc<LearnedRules> {
        self.rules.current_rules().await
    }

    pub async fn profile_for(&self, emotion: &str) -> Option<EmotionProfile> {
        self.rules.profile_for(emotion).await
    }
}
