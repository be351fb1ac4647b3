//! Defaults Blender - learned per-emotion dimension values
//!
//! Only the learned value is exposed here. Averaging it with a fresh estimate
//! is the caller's step (see `crate::fusion`).

use std::collections::BTreeMap;

use super::rules::LearnedRules;
use crate::types::Dimension;

/// Learned value per dimension; a missing dimension means "no override"
pub type LearnedDefaults = BTreeMap<Dimension, u8>;

/// Learned defaults for `emotion`, empty when there is no history
pub fn learned_defaults(rules: &LearnedRules, emotion: &str) -> LearnedDefaults {
    rules
        .profile(emotion)
        .map(|profile| profile.defaults.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::rules::EmotionProfile;

    #[test]
    fn test_unknown_emotion_is_empty() {
        assert!(learned_defaults(&LearnedRules::default(), "melancholic").is_empty());
    }

    #[test]
    fn test_known_emotion_exposes_learned_values() {
        let mut rules = LearnedRules::default();
        rules.emotion_profiles.insert(
            "melancholic".to_string(),
            EmotionProfile {
                emotion: "melancholic".to_string(),
                defaults: BTreeMap::from([(Dimension::Energy, 30), (Dimension::Warmth, 35)]),
                prompt_principles: vec![],
                anti_patterns: vec![],
                sample_size: 5,
            },
        );

        let defaults = learned_defaults(&rules, "Melancholic");
        assert_eq!(defaults.get(&Dimension::Energy), Some(&30));
        assert_eq!(defaults.get(&Dimension::Warmth), Some(&35));
        assert_eq!(defaults.get(&Dimension::Arc), None);
    }
}
