//! Reflection - periodic re-derivation of rules from the feedback log
//!
//! The scheduler decides when enough new entries have accumulated; the
//! synthesizer asks the text generator to turn the whole log into global
//! and per-emotion guidance and computes the learned dimension defaults
//! itself.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::entry::FeedbackEntry;
use super::error::{FeedbackError, Result};
use super::rules::{EmotionProfile, GlobalRules, LearnedRules, ReflectionState};
use crate::llm::{extract_json_object, TextGenerator};
use crate::types::{normalize_emotion, Dimension};

/// Upper bound on items kept per synthesized list
pub const MAX_RULES_PER_LIST: usize = 5;

/// Entries shown per "rated well" / "rated poorly" section of the prompt
const EXAMPLES_PER_SECTION: usize = 5;

/// Entries rated at or above this count as successes
const HIGH_RATING: u8 = 4;

/// Entries rated at or below this count as failures
const LOW_RATING: u8 = 2;

/// Minimum rating for an entry to shape learned defaults
const DEFAULTS_MIN_RATING: u8 = 3;

/// Where the scheduler stands after an accepted entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionPhase {
    /// Still accumulating; `remaining` more entries until the trigger
    Idle { remaining: u64 },
    /// Counter reached the interval, synthesis should run now
    Triggered,
}

/// Decides when a reflection is due
#[derive(Debug, Clone, Copy)]
pub struct ReflectionScheduler {
    interval: u64,
}

impl ReflectionScheduler {
    pub fn new(interval: u64) -> Self {
        Self { interval: interval.max(1) }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn phase(&self, state: &ReflectionState) -> ReflectionPhase {
        if state.entries_since_last_reflection >= self.interval {
            ReflectionPhase::Triggered
        } else {
            ReflectionPhase::Idle {
                remaining: self.interval - state.entries_since_last_reflection,
            }
        }
    }
}

/// What happened to reflection during a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReflectionOutcome {
    NotDue { remaining: u64 },
    Completed {
        reflections_completed: u64,
        entries_analyzed: u64,
        emotions_learned: Vec<String>,
    },
    /// Prior rules kept, counter not reset
    Failed { reason: String },
}

impl ReflectionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ReflectionOutcome::Completed { .. })
    }
}

/// Shape the text generator must return
#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    global_rules: GlobalRules,
    #[serde(default)]
    emotion_profiles: BTreeMap<String, ProfileGuidance>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileGuidance {
    #[serde(default)]
    prompt_principles: Vec<String>,
    #[serde(default)]
    anti_patterns: Vec<String>,
}

/// Turns the feedback log into a new rule set
pub struct RuleSynthesizer {
    generator: Arc<dyn TextGenerator>,
    min_samples: usize,
}

impl RuleSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, min_samples: usize) -> Self {
        Self {
            generator,
            min_samples: min_samples.max(1),
        }
    }

    /// Analyze `entries` and build the successor of `previous`
    ///
    /// Nothing is written here; the caller persists and publishes the result.
    pub async fn synthesize(&self, entries: &[FeedbackEntry], previous: &LearnedRules) -> Result<LearnedRules> {
        if entries.is_empty() {
            return Err(FeedbackError::synthesis("no feedback recorded yet"));
        }

        let groups = group_by_emotion(entries);
        let eligible: BTreeMap<&str, &Vec<&FeedbackEntry>> = groups
            .iter()
            .filter(|(_, group)| group.len() >= self.min_samples)
            .map(|(emotion, group)| (emotion.as_str(), group))
            .collect();

        info!(
            "Reflecting over {} entries ({} emotions, {} with enough samples)",
            entries.len(),
            groups.len(),
            eligible.len()
        );

        let prompt = build_prompt(entries, &groups, &eligible);
        let reply = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| FeedbackError::synthesis(format!("text generation failed: {:#}", e)))?;
        let response = parse_response(&reply)?;

        let guidance: BTreeMap<String, ProfileGuidance> = response
            .emotion_profiles
            .into_iter()
            .map(|(emotion, g)| (normalize_emotion(&emotion), g))
            .collect();

        let mut emotion_profiles = BTreeMap::new();
        for (emotion, group) in &eligible {
            let text = guidance.get(*emotion);
            emotion_profiles.insert(
                emotion.to_string(),
                EmotionProfile {
                    emotion: emotion.to_string(),
                    defaults: learned_dimension_defaults(group),
                    prompt_principles: text.map(|t| clean_list(&t.prompt_principles)).unwrap_or_default(),
                    anti_patterns: text.map(|t| clean_list(&t.anti_patterns)).unwrap_or_default(),
                    sample_size: group.len(),
                },
            );
        }
        for emotion in guidance.keys().filter(|e| !eligible.contains_key(e.as_str())) {
            debug!("Ignoring guidance for '{}' (not enough samples)", emotion);
        }

        let global_rules = GlobalRules {
            positive: clean_list(&response.global_rules.positive),
            negative: clean_list(&response.global_rules.negative),
        };

        let has_guidance = !global_rules.is_empty()
            || emotion_profiles
                .values()
                .any(|p| !p.prompt_principles.is_empty() || !p.anti_patterns.is_empty());
        if !has_guidance {
            return Err(FeedbackError::synthesis("response contained no rules"));
        }

        Ok(LearnedRules {
            state: ReflectionState {
                reflections_completed: previous.state.reflections_completed + 1,
                entries_analyzed: entries.len() as u64,
                entries_since_last_reflection: 0,
            },
            global_rules,
            emotion_profiles,
            updated_at: Some(Utc::now()),
        })
    }
}

fn group_by_emotion(entries: &[FeedbackEntry]) -> BTreeMap<String, Vec<&FeedbackEntry>> {
    let mut groups: BTreeMap<String, Vec<&FeedbackEntry>> = BTreeMap::new();
    for entry in entries {
        let key = entry.emotion_key();
        if key.is_empty() {
            continue;
        }
        groups.entry(key).or_default().push(entry);
    }
    groups
}

/// Rating-weighted mean of the final profiles that worked
///
/// Uses entries rated 3 or higher; falls back to every entry when none are.
pub fn learned_dimension_defaults(group: &[&FeedbackEntry]) -> BTreeMap<Dimension, u8> {
    let liked: Vec<&FeedbackEntry> = group
        .iter()
        .copied()
        .filter(|e| e.rating >= DEFAULTS_MIN_RATING)
        .collect();
    let basis = if liked.is_empty() { group.to_vec() } else { liked };

    let total_weight: f64 = basis.iter().map(|e| f64::from(e.rating)).sum();
    let mut defaults = BTreeMap::new();
    if total_weight == 0.0 {
        return defaults;
    }

    for dimension in Dimension::ALL {
        let weighted: f64 = basis
            .iter()
            .map(|e| f64::from(e.rating) * f64::from(e.final_profile.get(dimension)))
            .sum();
        let value = (weighted / total_weight).round().clamp(0.0, 100.0) as u8;
        defaults.insert(dimension, value);
    }
    defaults
}

fn build_prompt(
    entries: &[FeedbackEntry],
    groups: &BTreeMap<String, Vec<&FeedbackEntry>>,
    eligible: &BTreeMap<&str, &Vec<&FeedbackEntry>>,
) -> String {
    let average = entries.iter().map(|e| f64::from(e.rating)).sum::<f64>() / entries.len() as f64;

    let mut prompt = String::with_capacity(4096);
    prompt.push_str(
        "You are analyzing listener feedback for an AI music generator to learn what makes a good music prompt.\n\n",
    );
    prompt.push_str(&format!(
        "Feedback history: {} sessions, average rating {:.1}/5.\n\n",
        entries.len(),
        average
    ));

    for (emotion, group) in eligible {
        let group_avg = group.iter().map(|e| f64::from(e.rating)).sum::<f64>() / group.len() as f64;
        prompt.push_str(&format!(
            "## Emotion: {} ({} sessions, average {:.1}/5)\n",
            emotion,
            group.len(),
            group_avg
        ));

        let mut ranked: Vec<&FeedbackEntry> = group.to_vec();
        ranked.sort_by(|a, b| b.rating.cmp(&a.rating).then_with(|| b.id.cmp(&a.id)));

        let good: Vec<_> = ranked.iter().filter(|e| e.rating >= HIGH_RATING).take(EXAMPLES_PER_SECTION).collect();
        if !good.is_empty() {
            prompt.push_str("Rated well:\n");
            for entry in good {
                prompt.push_str(&describe_entry(entry));
                prompt.push('\n');
            }
        }

        let bad: Vec<_> = ranked.iter().rev().filter(|e| e.rating <= LOW_RATING).take(EXAMPLES_PER_SECTION).collect();
        if !bad.is_empty() {
            prompt.push_str("Rated poorly:\n");
            for entry in bad {
                prompt.push_str(&describe_entry(entry));
                prompt.push('\n');
            }
        }
        prompt.push('\n');
    }

    let others: Vec<&FeedbackEntry> = groups
        .iter()
        .filter(|(emotion, _)| !eligible.contains_key(emotion.as_str()))
        .flat_map(|(_, group)| group.iter().copied())
        .collect();
    if !others.is_empty() {
        prompt.push_str("## Other emotions (too few sessions for their own profile)\n");
        for entry in others.iter().rev().take(EXAMPLES_PER_SECTION * 2) {
            prompt.push_str(&describe_entry(entry));
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    let emotion_keys: Vec<&str> = eligible.keys().copied().collect();
    prompt.push_str(&format!(
        r#"Return ONLY a JSON object:
{{
  "global_rules": {{"positive": ["..."], "negative": ["..."]}},
  "emotion_profiles": {{"<emotion>": {{"prompt_principles": ["..."], "anti_patterns": ["..."]}}}}
}}

Rules:
- global_rules describe patterns that recur across several emotions, never emotion-specific ones
- emotion_profiles only for these emotions: {}
- prompt_principles come from the highly rated sessions, anti_patterns from the poorly rated ones
- at most {} short, concrete items per list (instruments, tempo, production, structure)"#,
        if emotion_keys.is_empty() { "(none)".to_string() } else { emotion_keys.join(", ") },
        MAX_RULES_PER_LIST
    ));

    prompt
}

fn describe_entry(entry: &FeedbackEntry) -> String {
    let profile = &entry.final_profile;
    let mut line = format!(
        "- [{}/5{}] {}: \"{}\" (energy {}, style {}, warmth {}, arc {})",
        entry.rating,
        if entry.would_replay { ", replay" } else { "" },
        entry.emotion_key(),
        entry.music_prompt,
        profile.energy,
        profile.style,
        profile.warmth,
        profile.arc
    );
    if !profile.overrides.is_empty() {
        let dims: Vec<&str> = profile.overrides.iter().map(|d| d.as_str()).collect();
        line.push_str(&format!(" user adjusted: {}", dims.join(", ")));
    }
    if let Some(note) = entry.user_note.as_deref().filter(|n| !n.trim().is_empty()) {
        line.push_str(&format!(" note: \"{}\"", note.trim()));
    }
    line
}

fn parse_response(reply: &str) -> Result<SynthesisResponse> {
    let json = extract_json_object(reply)
        .ok_or_else(|| FeedbackError::synthesis("response contained no JSON object"))?;
    serde_json::from_str(json)
        .map_err(|e| FeedbackError::synthesis(format!("unexpected response structure: {}", e)))
}

/// Trim, drop empties and duplicates, cap the length
fn clean_list(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(MAX_RULES_PER_LIST)
        .map(|s| s.to_string())
        .collect()
}
