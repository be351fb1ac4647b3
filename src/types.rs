//! Shared types used across modules
//!
//! This module contains the profile and generation types that the feedback
//! engine, profile fusion and prompt construction all exchange.

use serde::{Deserialize, Serialize};

/// Upper bound of every profile dimension
pub const DIMENSION_MAX: u8 = 100;

/// One of the four slider dimensions driving prompt construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Energy,
    Style,
    Warmth,
    Arc,
}

impl Dimension {
    /// All dimensions, in display order
    pub const ALL: [Dimension; 4] = [
        Dimension::Energy,
        Dimension::Style,
        Dimension::Warmth,
        Dimension::Arc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Energy => "energy",
            Dimension::Style => "style",
            Dimension::Warmth => "warmth",
            Dimension::Arc => "arc",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Four-dimension emotional descriptor plus the dominant emotion label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionalProfile {
    /// Single most dominant emotion
    pub emotion: String,
    /// Detected emotions, most dominant first
    #[serde(default)]
    pub emotions: Vec<String>,
    pub energy: u8,
    /// 0 = minimal sparse, 100 = cinematic epic
    pub style: u8,
    /// 0 = deep dark moody, 100 = bright sparkling
    pub warmth: u8,
    /// 0 = steady constant, 100 = big dramatic build
    pub arc: u8,
    /// Dimensions the user moved away from the AI default
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<Dimension>,
}

impl EmotionalProfile {
    /// Profile with every dimension at the neutral midpoint
    pub fn neutral(emotion: impl Into<String>) -> Self {
        let emotion = emotion.into();
        Self {
            emotions: vec![emotion.clone()],
            emotion,
            energy: 50,
            style: 50,
            warmth: 50,
            arc: 50,
            overrides: Vec::new(),
        }
    }

    pub fn get(&self, dimension: Dimension) -> u8 {
        match dimension {
            Dimension::Energy => self.energy,
            Dimension::Style => self.style,
            Dimension::Warmth => self.warmth,
            Dimension::Arc => self.arc,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: u8) {
        let value = value.min(DIMENSION_MAX);
        match dimension {
            Dimension::Energy => self.energy = value,
            Dimension::Style => self.style = value,
            Dimension::Warmth => self.warmth = value,
            Dimension::Arc => self.arc = value,
        }
    }

    /// Check that every dimension lies in [0, 100]
    pub fn check_ranges(&self) -> Result<(), String> {
        for dimension in Dimension::ALL {
            let value = self.get(dimension);
            if value > DIMENSION_MAX {
                return Err(format!("{} = {} is outside [0, {}]", dimension, value, DIMENSION_MAX));
            }
        }
        Ok(())
    }
}

/// Output of a content classifier (text, image or voice)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodRecord {
    /// Single most dominant mood
    pub mood: String,
    /// Detected moods, most dominant first
    #[serde(default)]
    pub moods: Vec<String>,
    /// 0.0 = very calm, 1.0 = very intense
    pub energy: f32,
    /// Provenance tag ("text", "image", "voice")
    pub source: String,
}

/// Parameters handed to the audio backend for one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub guidance_scale: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 250,
            temperature: 1.0,
            guidance_scale: 3.0,
        }
    }
}

/// Which A/B variant the listener preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferredVersion {
    A,
    B,
    #[serde(rename = "No preference")]
    NoPreference,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl Default for PreferredVersion {
    fn default() -> Self {
        PreferredVersion::NotApplicable
    }
}

impl std::fmt::Display for PreferredVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreferredVersion::A => write!(f, "A"),
            PreferredVersion::B => write!(f, "B"),
            PreferredVersion::NoPreference => write!(f, "No preference"),
            PreferredVersion::NotApplicable => write!(f, "N/A"),
        }
    }
}

/// Normalize an emotion label for case-insensitive exact matching
pub fn normalize_emotion(emotion: &str) -> String {
    emotion.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_serde_lowercase() {
        let json = serde_json::to_string(&Dimension::Warmth).unwrap();
        assert_eq!(json, "\"warmth\"");
        let parsed: Dimension = serde_json::from_str("\"arc\"").unwrap();
        assert_eq!(parsed, Dimension::Arc);
    }

    #[test]
    fn test_profile_set_clamps() {
        let mut profile = EmotionalProfile::neutral("calm");
        profile.set(Dimension::Energy, 250);
        assert_eq!(profile.energy, 100);
        assert!(profile.check_ranges().is_ok());
    }

    #[test]
    fn test_profile_range_check() {
        let mut profile = EmotionalProfile::neutral("angry");
        profile.arc = 101;
        let err = profile.check_ranges().unwrap_err();
        assert!(err.contains("arc"));
    }

    #[test]
    fn test_preferred_version_serde() {
        let json = serde_json::to_string(&PreferredVersion::NoPreference).unwrap();
        assert_eq!(json, "\"No preference\"");
        let parsed: PreferredVersion = serde_json::from_str("\"N/A\"").unwrap();
        assert_eq!(parsed, PreferredVersion::NotApplicable);
    }

    #[test]
    fn test_normalize_emotion() {
        assert_eq!(normalize_emotion("MeLanCholic"), "melancholic");
        assert_eq!(normalize_emotion(" melancholic "), " melancholic ");
    }
}
