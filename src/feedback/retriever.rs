//! Example Retriever - few-shot exemplars per emotion
//!
//! Ranking is by rating, ties broken by recency (higher id wins). Nothing
//! matching is a valid empty answer, not an error.

use std::cmp::Ordering;

use super::entry::FeedbackEntry;

/// Examples returned when the caller does not ask for a count
pub const DEFAULT_EXAMPLE_COUNT: usize = 3;

/// Ratings at or below this are anti-pattern exemplars
pub const LOW_RATING_THRESHOLD: u8 = 2;

/// Prompts of the best-rated entries for `emotion`
pub fn top_examples(entries: &[FeedbackEntry], emotion: &str, k: usize) -> Vec<String> {
    let mut matching = matching(entries, emotion);
    matching.sort_by(|a, b| b.rating.cmp(&a.rating).then_with(|| more_recent_first(a, b)));
    take_prompts(matching, k)
}

/// Prompts of the worst-rated entries for `emotion`
///
/// Entries rated at or below [`LOW_RATING_THRESHOLD`] come first; when there
/// are fewer than `k` of them the lowest-rated remaining entries fill in.
pub fn bottom_examples(entries: &[FeedbackEntry], emotion: &str, k: usize) -> Vec<String> {
    let (mut low, mut rest): (Vec<_>, Vec<_>) = matching(entries, emotion)
        .into_iter()
        .partition(|e| e.rating <= LOW_RATING_THRESHOLD);

    let ascending = |a: &&FeedbackEntry, b: &&FeedbackEntry| {
        a.rating.cmp(&b.rating).then_with(|| more_recent_first(a, b))
    };
    low.sort_by(ascending);
    rest.sort_by(ascending);
    low.extend(rest);

    take_prompts(low, k)
}

fn matching<'a>(entries: &'a [FeedbackEntry], emotion: &str) -> Vec<&'a FeedbackEntry> {
    entries.iter().filter(|e| e.matches_emotion(emotion)).collect()
}

fn more_recent_first(a: &FeedbackEntry, b: &FeedbackEntry) -> Ordering {
    b.id.cmp(&a.id)
}

fn take_prompts(ranked: Vec<&FeedbackEntry>, k: usize) -> Vec<String> {
    ranked.into_iter().take(k).map(|e| e.music_prompt.clone()).collect()
}
