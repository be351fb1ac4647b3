//! Profile fusion
//!
//! Turns classifier mood records into one emotional profile: the text
//! generator estimates the four dimensions, the estimate is blended with the
//! learned defaults for its emotion, and slider moves are applied on top.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::feedback::{FeedbackEngine, LearnedDefaults};
use crate::llm::{extract_json_object, TextGenerator};
use crate::types::{Dimension, EmotionalProfile, MoodRecord, DIMENSION_MAX};

/// Slider positions chosen by the user
pub type SliderValues = BTreeMap<Dimension, u8>;

/// Mean of two dimension values, halves rounded to even
pub fn blend_dimension(ai: u8, learned: u8) -> u8 {
    let sum = ai.min(DIMENSION_MAX) as u16 + learned.min(DIMENSION_MAX) as u16;
    let half = sum / 2;
    let rounded = if sum % 2 == 1 && half % 2 == 1 { half + 1 } else { half };
    rounded as u8
}

/// Blend every dimension that has a learned value; others keep the estimate
pub fn apply_learned_defaults(estimate: &EmotionalProfile, learned: &LearnedDefaults) -> EmotionalProfile {
    let mut blended = estimate.clone();
    for (&dimension, &value) in learned {
        blended.set(dimension, blend_dimension(estimate.get(dimension), value));
    }
    blended
}

/// Final profile: AI profile with every differing slider applied and recorded
pub fn apply_overrides(ai_profile: &EmotionalProfile, sliders: &SliderValues) -> EmotionalProfile {
    let mut final_profile = ai_profile.clone();
    final_profile.overrides.clear();

    for (&dimension, &value) in sliders {
        let value = value.min(DIMENSION_MAX);
        if value != ai_profile.get(dimension) {
            final_profile.set(dimension, value);
            final_profile.overrides.push(dimension);
        }
    }
    final_profile
}

#[derive(Debug, Deserialize)]
struct Estimate {
    #[serde(default)]
    emotions: Vec<String>,
    #[serde(default)]
    emotion: Option<String>,
    energy: f64,
    style: f64,
    warmth: f64,
    arc: f64,
}

fn clamp_dimension(value: f64) -> u8 {
    if value.is_nan() {
        return DIMENSION_MAX / 2;
    }
    value.round().clamp(0.0, DIMENSION_MAX as f64) as u8
}

/// LLM-backed fusion of mood records into an AI profile
pub struct ProfileFusion {
    generator: Arc<dyn TextGenerator>,
}

impl ProfileFusion {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Unified AI profile for `moods`, blended with what the engine has learned
    pub async fn fuse(&self, engine: &FeedbackEngine, moods: &[MoodRecord]) -> Result<EmotionalProfile> {
        if moods.is_empty() {
            bail!("No mood records to fuse");
        }

        let reply = self.generator
            .generate(&estimate_prompt(moods))
            .await
            .context("Emotion estimate request failed")?;
        let estimate = parse_estimate(&reply)?;

        let learned = engine.blended_defaults(&estimate.emotion).await;
        debug!(
            "Fusing '{}' with {} learned dimensions",
            estimate.emotion,
            learned.len()
        );
        Ok(apply_learned_defaults(&estimate, &learned))
    }
}

fn estimate_prompt(moods: &[MoodRecord]) -> String {
    let mut signals = String::new();
    for record in moods {
        let moods = if record.moods.is_empty() {
            vec![record.mood.clone()]
        } else {
            record.moods.clone()
        };
        signals.push_str(&format!(
            "- Source: {}, Moods: {:?}, Energy: {}\n",
            record.source, moods, record.energy
        ));
    }

    format!(
        r#"You are an emotion analyst for a music generation system.

Given these mood signals from user inputs:
{signals}
Produce ONE unified emotional profile as JSON:
{{
  "emotions": ["<1-3 detected emotions, most dominant first>"],
  "emotion": "<single most dominant emotion>",
  "energy": <0-100 integer>,
  "style": <0-100 integer, 0=minimal sparse, 100=cinematic epic>,
  "warmth": <0-100 integer, 0=deep dark moody, 100=bright sparkling>,
  "arc": <0-100 integer, 0=steady constant, 100=big dramatic build>
}}

Blend ALL detected emotions into the values, not just the dominant one.
Return ONLY the JSON object."#
    )
}

fn parse_estimate(reply: &str) -> Result<EmotionalProfile> {
    let json = extract_json_object(reply).context("Emotion estimate contained no JSON object")?;
    let estimate: Estimate = serde_json::from_str(json).context("Malformed emotion estimate")?;

    let emotions: Vec<String> = estimate.emotions
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    let emotion = estimate.emotion
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .or_else(|| emotions.first().cloned())
        .context("Emotion estimate named no emotion")?;

    Ok(EmotionalProfile {
        emotion,
        emotions,
        energy: clamp_dimension(estimate.energy),
        style: clamp_dimension(estimate.style),
        warmth: clamp_dimension(estimate.warmth),
        arc: clamp_dimension(estimate.arc),
        overrides: Vec::new(),
    })
}
