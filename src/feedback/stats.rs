//! Rolling summary statistics over the feedback log

use serde::{Deserialize, Serialize};

use super::entry::FeedbackEntry;
use super::rules::LearnedRules;

/// What the UI shows after a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub total_sessions: u64,
    /// Mean rating, one decimal
    pub average_rating: f64,
    /// Share of entries marked "would replay", whole percent
    pub replay_rate_percent: u32,
    pub reflections_completed: u64,
    /// Number of populated emotion profiles
    pub rules_active_count: usize,
    pub emotions_learned: Vec<String>,
    /// Submissions left until the next reflection
    pub next_reflection_in: u64,
}

/// Project the log and the current rule set into a summary
pub fn summarize(entries: &[FeedbackEntry], rules: &LearnedRules, interval: u64) -> FeedbackSummary {
    let total = entries.len();

    let (average_rating, replay_rate_percent) = if total == 0 {
        (0.0, 0)
    } else {
        let rating_sum: u64 = entries.iter().map(|e| u64::from(e.rating)).sum();
        let replays = entries.iter().filter(|e| e.would_replay).count();
        let average = rating_sum as f64 / total as f64;
        let rate = replays as f64 * 100.0 / total as f64;
        ((average * 10.0).round() / 10.0, rate.round() as u32)
    };

    FeedbackSummary {
        total_sessions: total as u64,
        average_rating,
        replay_rate_percent,
        reflections_completed: rules.state.reflections_completed,
        rules_active_count: rules.emotion_profiles.len(),
        emotions_learned: rules.emotions_learned(),
        next_reflection_in: interval.saturating_sub(rules.state.entries_since_last_reflection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::entry::fixtures::entry;

    #[test]
    fn test_empty_log() {
        let summary = summarize(&[], &LearnedRules::default(), 10);
        assert_eq!(summary.total_sessions, 0);
        assert_eq!(summary.average_rating, 0.0);
        assert_eq!(summary.replay_rate_percent, 0);
        assert_eq!(summary.rules_active_count, 0);
        assert!(summary.emotions_learned.is_empty());
        assert_eq!(summary.next_reflection_in, 10);
    }

    #[test]
    fn test_average_and_replay_rate() {
        // fixture marks rating >= 4 as would_replay
        let entries = vec![
            entry(1, "calm", 5, "a"),
            entry(2, "calm", 4, "b"),
            entry(3, "joyful", 2, "c"),
        ];
        let mut rules = LearnedRules::default();
        rules.state.entries_since_last_reflection = 3;

        let summary = summarize(&entries, &rules, 10);
        assert_eq!(summary.total_sessions, 3);
        assert_eq!(summary.average_rating, 3.7);
        assert_eq!(summary.replay_rate_percent, 67);
        assert_eq!(summary.next_reflection_in, 7);
    }

    #[test]
    fn test_next_reflection_never_negative() {
        let mut rules = LearnedRules::default();
        rules.state.entries_since_last_reflection = 12;
        assert_eq!(summarize(&[], &rules, 10).next_reflection_in, 0);
    }

    #[test]
    fn test_summary_is_idempotent() {
        let entries = vec![entry(1, "calm", 3, "a")];
        let rules = LearnedRules::default();
        assert_eq!(summarize(&entries, &rules, 10), summarize(&entries, &rules, 10));
    }
}
